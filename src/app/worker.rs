use std::sync::Arc;

use tokio::sync::mpsc;

use super::AppEvent;
use crate::scan::RecognitionJob;

/// Delivers events to the controller's queue. Returns `false` once the queue
/// is gone.
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(AppEvent) -> bool + Send + Sync>);

impl EventSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(AppEvent) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(deliver))
    }

    pub fn from_sender(sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self::new(move |event| sender.send(event).is_ok())
    }

    pub fn post(&self, event: AppEvent) -> bool {
        (self.0)(event)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EventSink")
    }
}

/// Runs recognition on the blocking pool and posts the outcome back.
pub(super) fn spawn_recognition(job: RecognitionJob, sink: EventSink) {
    tokio::task::spawn_blocking(move || {
        let outcome = job.run();
        if !sink.post(AppEvent::RecognitionFinished(outcome)) {
            tracing::debug!("event queue closed before recognition finished");
        }
    });
}
