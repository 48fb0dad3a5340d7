//! Camera scanning state: capture device ownership, in-flight recognition and
//! speech debouncing.
//!
//! The scanner never blocks on recognition. [`Scanner::begin_recognition`]
//! grabs a frame and hands out a [`RecognitionJob`] that owns the recognizer
//! while it runs elsewhere; [`Scanner::finish_recognition`] takes the
//! recognizer back and decides whether the text should be spoken.

use thiserror::Error;

use crate::capture::{CaptureError, CaptureGuard, FrameBuffer, FrameSource};
use crate::ocr::{OcrError, OcrLanguage, OcrResult, TextRecognizer};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("capture unavailable")]
    CaptureUnavailable(#[source] CaptureError),
    #[error("frame capture failed")]
    Frame(#[source] CaptureError),
    #[error("scanning is off")]
    NotScanning,
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Recognition work detached from the scanner.
pub struct RecognitionJob {
    recognizer: Box<dyn TextRecognizer>,
    frame: FrameBuffer,
    language: OcrLanguage,
    session: u64,
}

impl RecognitionJob {
    pub fn run(mut self) -> RecognitionOutcome {
        let result = self.recognizer.recognize(&self.frame, self.language);
        RecognitionOutcome {
            recognizer: self.recognizer,
            result,
            session: self.session,
        }
    }
}

pub struct RecognitionOutcome {
    recognizer: Box<dyn TextRecognizer>,
    result: OcrResult<String>,
    session: u64,
}

impl std::fmt::Debug for RecognitionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionOutcome")
            .field("result", &self.result)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum ScanUpdate {
    /// New text that should be spoken now.
    Speak(String),
    /// Same text as the last utterance.
    Repeated,
    NothingRecognized,
    Failed(OcrError),
    /// Scanning was turned off, or restarted, while the job ran.
    Discarded,
}

pub struct Scanner {
    language: OcrLanguage,
    device: Option<CaptureGuard>,
    // Bumped on every enable and disable; jobs from an older session are stale.
    session: u64,
    recognizer: Option<Box<dyn TextRecognizer>>,
    last_recognized: String,
    last_spoken: String,
    speaking: bool,
}

impl Scanner {
    pub fn new(recognizer: Box<dyn TextRecognizer>, language: OcrLanguage) -> Self {
        Self {
            language,
            device: None,
            session: 0,
            recognizer: Some(recognizer),
            last_recognized: String::new(),
            last_spoken: String::new(),
            speaking: false,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.device.is_some()
    }

    pub fn is_recognizing(&self) -> bool {
        self.recognizer.is_none()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn last_recognized(&self) -> &str {
        &self.last_recognized
    }

    pub fn last_spoken(&self) -> &str {
        &self.last_spoken
    }

    /// Acquires the capture device. Fails closed: on error scanning stays off.
    pub fn enable(&mut self, source: &dyn FrameSource) -> ScanResult<()> {
        if self.is_scanning() {
            return Ok(());
        }
        let device = source.open().map_err(|err| {
            tracing::warn!(?err, "capture device unavailable");
            ScanError::CaptureUnavailable(err)
        })?;
        self.device = Some(CaptureGuard::new(device));
        self.session += 1;
        tracing::info!(session = self.session, "scanning enabled");
        Ok(())
    }

    /// Releases the capture device.
    pub fn disable(&mut self) {
        if self.device.take().is_some() {
            self.session += 1;
            tracing::info!("scanning disabled");
        }
    }

    /// Captures a frame and detaches a recognition job, or `None` while the
    /// previous job is still running.
    pub fn begin_recognition(&mut self) -> ScanResult<Option<RecognitionJob>> {
        let device = self.device.as_mut().ok_or(ScanError::NotScanning)?;
        if self.recognizer.is_none() {
            tracing::trace!("recognition still running; tick skipped");
            return Ok(None);
        }

        let frame = device.capture_frame().map_err(ScanError::Frame)?;
        let Some(recognizer) = self.recognizer.take() else {
            return Ok(None);
        };
        Ok(Some(RecognitionJob {
            recognizer,
            frame,
            language: self.language,
            session: self.session,
        }))
    }

    pub fn finish_recognition(&mut self, outcome: RecognitionOutcome) -> ScanUpdate {
        self.recognizer = Some(outcome.recognizer);

        if !self.is_scanning() || outcome.session != self.session {
            tracing::debug!(
                job = outcome.session,
                current = self.session,
                "stale recognition discarded"
            );
            return ScanUpdate::Discarded;
        }
        let text = match outcome.result {
            Ok(text) => text,
            Err(err) => return ScanUpdate::Failed(err),
        };

        let trimmed = text.trim();
        self.last_recognized = trimmed.to_string();
        if trimmed.is_empty() {
            return ScanUpdate::NothingRecognized;
        }
        if trimmed == self.last_spoken {
            return ScanUpdate::Repeated;
        }

        self.last_spoken = trimmed.to_string();
        self.speaking = true;
        ScanUpdate::Speak(self.last_spoken.clone())
    }

    /// The last recognized text, to be spoken again regardless of debouncing.
    pub fn read_again(&mut self) -> Option<String> {
        if self.last_recognized.is_empty() {
            return None;
        }
        self.speaking = true;
        Some(self.last_recognized.clone())
    }

    pub fn speech_finished(&mut self) {
        self.speaking = false;
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("language", &self.language)
            .field("scanning", &self.is_scanning())
            .field("recognizing", &self.is_recognizing())
            .field("last_spoken", &self.last_spoken)
            .field("speaking", &self.speaking)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureDevice, FRAME_HEIGHT, FRAME_WIDTH};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct FakeSource {
        available: bool,
        calls: Rc<RefCell<Vec<String>>>,
    }

    struct FakeDevice {
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl FrameSource for FakeSource {
        fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
            self.calls.borrow_mut().push("open".to_string());
            if !self.available {
                return Err(CaptureError::Unavailable {
                    device: "/dev/video9".to_string(),
                    message: "permission denied".to_string(),
                });
            }
            Ok(Box::new(FakeDevice {
                calls: Rc::clone(&self.calls),
            }))
        }
    }

    impl CaptureDevice for FakeDevice {
        fn capture_frame(&mut self) -> Result<FrameBuffer, CaptureError> {
            self.calls.borrow_mut().push("frame".to_string());
            Ok(FrameBuffer::new_rgb8(FRAME_WIDTH, FRAME_HEIGHT))
        }

        fn release(&mut self) {
            self.calls.borrow_mut().push("release".to_string());
        }
    }

    struct ScriptedRecognizer {
        script: VecDeque<OcrResult<String>>,
    }

    impl TextRecognizer for ScriptedRecognizer {
        fn recognize(&mut self, _frame: &FrameBuffer, _language: OcrLanguage) -> OcrResult<String> {
            self.script.pop_front().unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn scanner(script: Vec<OcrResult<String>>) -> Scanner {
        Scanner::new(
            Box::new(ScriptedRecognizer {
                script: script.into(),
            }),
            OcrLanguage::English,
        )
    }

    fn source(available: bool) -> (FakeSource, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        (
            FakeSource {
                available,
                calls: Rc::clone(&calls),
            },
            calls,
        )
    }

    fn tick(scanner: &mut Scanner) -> ScanUpdate {
        let job = scanner
            .begin_recognition()
            .expect("scanning")
            .expect("recognizer idle");
        scanner.finish_recognition(job.run())
    }

    fn ok(text: &str) -> OcrResult<String> {
        Ok(text.to_string())
    }

    #[test]
    fn unavailable_capture_fails_closed() {
        let (source, _) = source(false);
        let mut scanner = scanner(Vec::new());
        let err = scanner.enable(&source).unwrap_err();
        assert!(matches!(err, ScanError::CaptureUnavailable(_)));
        assert!(!scanner.is_scanning());
        assert!(matches!(
            scanner.begin_recognition(),
            Err(ScanError::NotScanning)
        ));
    }

    #[test]
    fn disable_releases_device() {
        let (source, calls) = source(true);
        let mut scanner = scanner(Vec::new());
        scanner.enable(&source).unwrap();
        scanner.enable(&source).unwrap();
        scanner.disable();
        scanner.disable();
        assert_eq!(*calls.borrow(), vec!["open", "release"]);
    }

    #[test]
    fn dropping_scanner_releases_device() {
        let (source, calls) = source(true);
        let mut scanner = scanner(Vec::new());
        scanner.enable(&source).unwrap();
        drop(scanner);
        assert_eq!(calls.borrow().last().map(String::as_str), Some("release"));
    }

    #[test]
    fn unchanged_text_is_spoken_once() {
        let (source, _) = source(true);
        let mut scanner = scanner(vec![
            ok("  FIREBALL  "),
            ok("FIREBALL"),
            ok(""),
            ok("FIREBALL"),
            ok("ICE LANCE"),
            ok("FIREBALL"),
        ]);
        scanner.enable(&source).unwrap();

        let mut spoken = Vec::new();
        for _ in 0..6 {
            if let ScanUpdate::Speak(text) = tick(&mut scanner) {
                spoken.push(text);
            }
        }
        assert_eq!(spoken, vec!["FIREBALL", "ICE LANCE", "FIREBALL"]);
        assert_eq!(scanner.last_spoken(), "FIREBALL");
    }

    #[test]
    fn empty_result_reports_nothing_recognized() {
        let (source, _) = source(true);
        let mut scanner = scanner(vec![ok(" \n ")]);
        scanner.enable(&source).unwrap();
        assert!(matches!(tick(&mut scanner), ScanUpdate::NothingRecognized));
        assert!(!scanner.is_speaking());
    }

    #[test]
    fn only_one_job_in_flight() {
        let (source, calls) = source(true);
        let mut scanner = scanner(vec![ok("A")]);
        scanner.enable(&source).unwrap();

        let job = scanner.begin_recognition().unwrap().expect("first job");
        assert!(scanner.is_recognizing());
        assert!(scanner.begin_recognition().unwrap().is_none());
        assert_eq!(calls.borrow().iter().filter(|c| *c == "frame").count(), 1);

        assert!(matches!(
            scanner.finish_recognition(job.run()),
            ScanUpdate::Speak(_)
        ));
        assert!(!scanner.is_recognizing());
    }

    #[test]
    fn result_after_disable_is_discarded() {
        let (source, _) = source(true);
        let mut scanner = scanner(vec![ok("LATE")]);
        scanner.enable(&source).unwrap();
        let job = scanner.begin_recognition().unwrap().unwrap();
        scanner.disable();

        assert!(matches!(
            scanner.finish_recognition(job.run()),
            ScanUpdate::Discarded
        ));
        assert_eq!(scanner.last_spoken(), "");
        assert!(!scanner.is_recognizing());
    }

    #[test]
    fn result_from_previous_scan_session_is_discarded() {
        let (source, _) = source(true);
        let mut scanner = scanner(vec![ok("OLD FRAME"), ok("NEW FRAME")]);
        scanner.enable(&source).unwrap();
        let job = scanner.begin_recognition().unwrap().unwrap();
        scanner.disable();
        scanner.enable(&source).unwrap();

        assert!(matches!(
            scanner.finish_recognition(job.run()),
            ScanUpdate::Discarded
        ));
        assert_eq!(scanner.last_spoken(), "");
        assert!(matches!(tick(&mut scanner), ScanUpdate::Speak(text) if text == "NEW FRAME"));
    }

    #[test]
    fn failure_after_disable_is_discarded_silently() {
        let (source, _) = source(true);
        let mut scanner = scanner(vec![Err(OcrError::Recognition {
            message: "blurry".to_string(),
        })]);
        scanner.enable(&source).unwrap();
        let job = scanner.begin_recognition().unwrap().unwrap();
        scanner.disable();

        assert!(matches!(
            scanner.finish_recognition(job.run()),
            ScanUpdate::Discarded
        ));
        assert!(!scanner.is_recognizing());
    }

    #[test]
    fn recognition_failure_is_reported_and_recoverable() {
        let (source, _) = source(true);
        let mut scanner = scanner(vec![
            Err(OcrError::Recognition {
                message: "blurry".to_string(),
            }),
            ok("SHIELD"),
        ]);
        scanner.enable(&source).unwrap();

        assert!(matches!(tick(&mut scanner), ScanUpdate::Failed(_)));
        assert!(matches!(tick(&mut scanner), ScanUpdate::Speak(text) if text == "SHIELD"));
    }

    #[test]
    fn read_again_repeats_last_recognized_text() {
        let (source, _) = source(true);
        let mut scanner = scanner(vec![ok("RUNE"), ok("RUNE")]);
        assert!(scanner.read_again().is_none());
        scanner.enable(&source).unwrap();

        tick(&mut scanner);
        scanner.speech_finished();
        assert!(matches!(tick(&mut scanner), ScanUpdate::Repeated));
        assert_eq!(scanner.read_again().as_deref(), Some("RUNE"));
        assert!(scanner.is_speaking());
        scanner.speech_finished();
        assert!(!scanner.is_speaking());
    }
}
