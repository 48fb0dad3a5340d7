//! Event-driven controller.
//!
//! All state lives in [`App`] and is only touched from [`App::handle`]. Timers
//! and worker threads never mutate anything themselves; they post an
//! [`AppEvent`] through the [`EventSink`] and the owner of the queue feeds it
//! back into `handle` in arrival order. Timers and recognition are Tokio
//! tasks, so `handle` must run inside a Tokio runtime.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::capture::FrameSource;
use crate::config::AppConfig;
use crate::deck::{CardImage, DeckChange, DeckCollection, DeckId, DeckStore, NoChange};
use crate::enchantment::{CardFace, EnchantmentView};
use crate::ocr::{resolve_ocr_language, TextRecognizer};
use crate::scan::{RecognitionOutcome, ScanError, ScanUpdate, Scanner};
use crate::schedule::{self, TaskHandle};
use crate::speech::{SpeechOutput, SpeechResult};
use crate::state::{SessionEvent, SessionMachine, SessionPhase};
use crate::storage::{SnapshotStore, StorageResult};

pub mod terminal;
mod worker;

pub use worker::EventSink;

#[derive(Debug)]
pub enum AppEvent {
    DrawCard,
    PreviousCard,
    Begin,
    AssignSlot {
        deck: DeckId,
        slot: usize,
        image: PathBuf,
        label: String,
    },
    PressStart(DeckId),
    PressEnd,
    LongPressElapsed {
        deck: DeckId,
        press: u64,
    },
    JumpBack(DeckId),
    ToggleScan,
    ScanTick,
    RecognitionFinished(RecognitionOutcome),
    SpeechFinished(SpeechResult<()>),
    ReadAgain,
    Quit,
}

/// External collaborators the controller drives.
pub struct AppServices {
    pub frames: Box<dyn FrameSource>,
    pub recognizer: Box<dyn TextRecognizer>,
    pub speech: Box<dyn SpeechOutput>,
}

#[derive(Debug)]
struct PendingPress {
    deck: DeckId,
    press: u64,
    _timer: TaskHandle,
}

pub struct App<S> {
    sink: EventSink,
    session: SessionMachine,
    enchantments: EnchantmentView,
    decks: DeckStore<S>,
    scanner: Scanner,
    frames: Box<dyn FrameSource>,
    speech: Box<dyn SpeechOutput>,
    rng: StdRng,
    long_press: Duration,
    scan_interval: Duration,
    pending_press: Option<PendingPress>,
    next_press: u64,
    scan_timer: Option<TaskHandle>,
    notices: Vec<String>,
}

impl<S: SnapshotStore> App<S> {
    pub fn new(config: &AppConfig, storage: S, services: AppServices, sink: EventSink) -> Self {
        let language = resolve_ocr_language(config.ocr_language.as_deref());
        tracing::debug!(language = language.as_str(), "OCR language resolved");

        Self {
            sink,
            session: SessionMachine::new(),
            enchantments: EnchantmentView::new().with_flip_duration(config.flip_duration()),
            decks: DeckStore::initialize(storage),
            scanner: Scanner::new(services.recognizer, language),
            frames: services.frames,
            speech: services.speech,
            rng: StdRng::from_entropy(),
            long_press: config.long_press(),
            scan_interval: config.scan_interval(),
            pending_press: None,
            next_press: 0,
            scan_timer: None,
            notices: Vec::new(),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn decks(&self) -> &DeckCollection {
        self.decks.collection()
    }

    pub fn deck_store(&self) -> &DeckStore<S> {
        &self.decks
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn enchantments(&self) -> &EnchantmentView {
        &self.enchantments
    }

    /// Current enchantment with freshly rolled flavor fields.
    pub fn enchantment_face(&mut self) -> Option<CardFace> {
        self.enchantments.render(&mut self.rng)
    }

    pub fn is_flipping(&self) -> bool {
        self.enchantments.is_flipping(Instant::now())
    }

    pub fn has_pending_press(&self) -> bool {
        self.pending_press.is_some()
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    fn notice(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(%message, "notice");
        self.notices.push(message);
    }

    /// Applies one event. Breaks once the session should end.
    pub fn handle(&mut self, event: AppEvent) -> ControlFlow<()> {
        tracing::trace!(?event, "handle event");
        match event {
            AppEvent::DrawCard => {
                let view = std::mem::take(&mut self.enchantments);
                self.enchantments = view.draw_new_card(&mut self.rng, Instant::now());
            }
            AppEvent::PreviousCard => {
                let view = std::mem::take(&mut self.enchantments);
                self.enchantments = view.go_to_previous();
            }
            AppEvent::Begin => self.begin(),
            AppEvent::AssignSlot {
                deck,
                slot,
                image,
                label,
            } => self.assign_slot(deck, slot, image, label),
            AppEvent::PressStart(deck) => self.press_start(deck),
            AppEvent::PressEnd => self.cancel_pending_jump(),
            AppEvent::LongPressElapsed { deck, press } => self.long_press_elapsed(deck, press),
            AppEvent::JumpBack(deck) => {
                let result = self.decks.jump_back(deck);
                self.report_deck_result(result);
            }
            AppEvent::ToggleScan => self.toggle_scan(),
            AppEvent::ScanTick => self.scan_tick(),
            AppEvent::RecognitionFinished(outcome) => self.recognition_finished(outcome),
            AppEvent::SpeechFinished(result) => {
                self.scanner.speech_finished();
                if let Err(err) = result {
                    tracing::warn!(?err, "speech failed");
                    self.notice(format!("Speech failed: {err}"));
                }
            }
            AppEvent::ReadAgain => {
                if let Some(text) = self.scanner.read_again() {
                    self.speak(text);
                }
            }
            AppEvent::Quit => {
                self.shutdown();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn begin(&mut self) {
        if let Err(err) = self.session.transition(SessionEvent::Begin) {
            tracing::debug!(?err, "begin ignored");
            return;
        }
        if let Err(err) = self.decks.start() {
            tracing::warn!(?err, "failed to write deck snapshot");
            self.notice(format!("Could not save decks: {err}"));
        }
    }

    fn assign_slot(&mut self, deck: DeckId, slot: usize, path: PathBuf, label: String) {
        let image = match CardImage::from_file(&path) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(?err, "card image rejected");
                self.notice(format!("Could not load image: {err}"));
                return;
            }
        };
        let result = self.decks.assign_slot(deck, slot, image, label);
        self.report_deck_result(result);
    }

    fn press_start(&mut self, deck: DeckId) {
        self.cancel_pending_jump();

        self.next_press += 1;
        let press = self.next_press;
        let sink = self.sink.clone();
        let timer = schedule::schedule_once("long-press", self.long_press, move || {
            sink.post(AppEvent::LongPressElapsed { deck, press });
        });
        self.pending_press = Some(PendingPress {
            deck,
            press,
            _timer: timer,
        });
    }

    /// Drops the pending long-press without touching any deck.
    fn cancel_pending_jump(&mut self) {
        if let Some(pending) = self.pending_press.take() {
            tracing::debug!(deck = %pending.deck, "long press released early");
        }
    }

    fn long_press_elapsed(&mut self, deck: DeckId, press: u64) {
        let current = self
            .pending_press
            .as_ref()
            .is_some_and(|pending| pending.deck == deck && pending.press == press);
        if !current {
            tracing::debug!(deck = %deck, press, "stale long press ignored");
            return;
        }
        self.pending_press = None;

        let result = self.decks.jump_to_random_filled_slot(deck, &mut self.rng);
        self.report_deck_result(result);
    }

    fn report_deck_result(&mut self, result: StorageResult<DeckChange>) {
        match result {
            Ok(DeckChange::Unchanged(NoChange::NoFilledSlots)) => {
                self.notice("This deck has no cards yet");
            }
            Ok(change) => tracing::debug!(?change, "deck event applied"),
            Err(err) => {
                tracing::warn!(?err, "failed to write deck snapshot");
                self.notice(format!("Could not save decks: {err}"));
            }
        }
    }

    fn toggle_scan(&mut self) {
        if self.scanner.is_scanning() {
            self.stop_scan();
            return;
        }

        if !self.session.can_transition(SessionEvent::StartScan) {
            self.notice("Tap begin before scanning");
            return;
        }
        if let Err(err) = self.scanner.enable(self.frames.as_ref()) {
            self.notice(format!("Scanner unavailable: {err}"));
            return;
        }
        if let Err(err) = self.session.transition(SessionEvent::StartScan) {
            tracing::warn!(?err, "scan state out of sync; releasing camera");
            self.scanner.disable();
            return;
        }

        let sink = self.sink.clone();
        self.scan_timer = Some(schedule::schedule_repeating(
            "scan",
            self.scan_interval,
            move || {
                if sink.post(AppEvent::ScanTick) {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(())
                }
            },
        ));
    }

    fn stop_scan(&mut self) {
        self.scan_timer.take();
        self.scanner.disable();
        if let Err(err) = self.session.transition(SessionEvent::StopScan) {
            tracing::debug!(?err, "stop scan outside scanning phase");
        }
    }

    fn scan_tick(&mut self) {
        if !self.scanner.is_scanning() {
            return;
        }
        match self.scanner.begin_recognition() {
            Ok(Some(job)) => worker::spawn_recognition(job, self.sink.clone()),
            Ok(None) => {}
            Err(ScanError::NotScanning) => {}
            Err(err) => tracing::warn!(?err, "scan tick failed"),
        }
    }

    fn recognition_finished(&mut self, outcome: RecognitionOutcome) {
        match self.scanner.finish_recognition(outcome) {
            ScanUpdate::Speak(text) => self.speak(text),
            ScanUpdate::Failed(err) => {
                tracing::warn!(?err, "recognition failed");
                self.notice(format!("Recognition failed: {err}"));
            }
            ScanUpdate::Repeated | ScanUpdate::NothingRecognized | ScanUpdate::Discarded => {}
        }
    }

    fn speak(&mut self, text: String) {
        let sink = self.sink.clone();
        let started = self.speech.speak(
            &text,
            Box::new(move |result| {
                sink.post(AppEvent::SpeechFinished(result));
            }),
        );
        if let Err(err) = started {
            self.scanner.speech_finished();
            tracing::warn!(?err, "speech could not start");
            self.notice(format!("Speech failed: {err}"));
        }
    }

    fn shutdown(&mut self) {
        self.cancel_pending_jump();
        if self.scanner.is_scanning() {
            self.stop_scan();
        }
        tracing::info!("session closed");
    }
}
