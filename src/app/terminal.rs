//! Line-oriented front-end.
//!
//! A `rustyline` reader thread turns input lines into [`Message::Input`];
//! timers and workers arrive as [`Message::App`]. Both go through one Tokio
//! channel, so the controller still sees a single ordered stream of events.

use std::ops::ControlFlow;
use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;

use super::{App, AppEvent, AppServices, EventSink};
use crate::capture::CameraFrameSource;
use crate::config::AppConfig;
use crate::deck::{Deck, DeckCollection, MAX_SLOTS};
use crate::enchantment::CardFace;
use crate::error::AppResult;
use crate::notification;
use crate::ocr::PaddleRecognizer;
use crate::scan::Scanner;
use crate::speech::CommandSpeech;
use crate::storage::{MemoryStore, SnapshotStore, StorageError, StorageService};

const PROMPT: &str = "> ";

const HELP: &str = "\
commands:
  begin                              start the session (decks are saved from now on)
  draw | prev | card                 new enchantment, previous one, show current
  decks | deck <deck>                list decks, show one deck
  assign <deck> <slot> <file> [label] put an image into slot 1..280
  hold <deck> | release              press and hold a deck to jump to a random card
  back <deck>                        return to the card shown before the last jump
  scan | again                       toggle the camera reader, read the last text again
  help | quit";

enum Message {
    Input(String),
    App(AppEvent),
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Help,
    ShowCard,
    ShowDecks,
    ShowDeck(usize),
    Action(Action),
}

/// Parsed form of an [`AppEvent`], with decks still referenced by position.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Begin,
    DrawCard,
    PreviousCard,
    Assign {
        deck: usize,
        slot: usize,
        image: PathBuf,
        label: String,
    },
    Hold(usize),
    Release,
    Back(usize),
    ToggleScan,
    ReadAgain,
    Quit,
}

pub async fn run(config: AppConfig) -> AppResult<()> {
    let storage = open_storage(&config);
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let input_tx = tx.clone();
    // Plain thread: runtime shutdown must not wait on a pending readline.
    std::thread::spawn(move || read_lines(input_tx));

    let sink = EventSink::new(move |event| tx.send(Message::App(event)).is_ok());
    let services = AppServices {
        frames: Box::new(CameraFrameSource::new(config.camera_device())),
        recognizer: Box::new(PaddleRecognizer::new()),
        speech: Box::new(CommandSpeech::new(config.speech_command())),
    };
    let mut app = App::new(&config, storage, services, sink);

    println!("{HELP}\n");
    println!("Tap to begin: type `begin`.");

    while let Some(message) = rx.recv().await {
        let flow = match message {
            Message::Input(line) => handle_line(&mut app, &line),
            Message::App(event) => {
                let speaking = app.scanner().is_speaking();
                let flow = app.handle(event);
                if app.scanner().is_speaking() != speaking {
                    println!("{}", scanner_status(app.scanner()));
                }
                flow
            }
        };
        for notice in app.take_notices() {
            println!("! {notice}");
            notification::send(notice);
        }
        if flow.is_break() {
            break;
        }
    }
    Ok(())
}

/// Feeds edited input lines to the queue. Ctrl-D and Ctrl-C end the session.
fn read_lines(tx: mpsc::UnboundedSender<Message>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            tracing::warn!(?err, "terminal line editor unavailable");
            let _ = tx.send(Message::Input("quit".to_string()));
            return;
        }
    };

    while let ControlFlow::Continue(line) = next_line(editor.readline(PROMPT)) {
        if !line.trim().is_empty() {
            let _ = editor.add_history_entry(line.as_str());
        }
        if tx.send(Message::Input(line)).is_err() {
            return;
        }
    }
    let _ = tx.send(Message::Input("quit".to_string()));
}

fn next_line(read: Result<String, ReadlineError>) -> ControlFlow<(), String> {
    match read {
        Ok(line) => ControlFlow::Continue(line),
        Err(ReadlineError::Eof | ReadlineError::Interrupted) => ControlFlow::Break(()),
        Err(err) => {
            tracing::warn!(?err, "failed to read terminal input");
            ControlFlow::Break(())
        }
    }
}

fn open_storage(config: &AppConfig) -> Box<dyn SnapshotStore> {
    let service = match &config.data_dir {
        Some(dir) => std::fs::create_dir_all(dir)
            .map(|()| StorageService::with_path(dir.clone()))
            .map_err(StorageError::from),
        None => StorageService::with_default_paths(),
    };
    match service {
        Ok(service) => {
            match service.prune_partial_writes() {
                Ok(report) if report.removed_files > 0 => {
                    tracing::info!(removed = report.removed_files, "pruned partial snapshots");
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(?err, "failed to prune partial snapshots"),
            }
            Box::new(service)
        }
        Err(err) => {
            tracing::warn!(?err, "no data directory; decks will not survive this session");
            Box::new(MemoryStore::new())
        }
    }
}

fn handle_line<S: SnapshotStore>(app: &mut App<S>, line: &str) -> ControlFlow<()> {
    let command = match parse_command(line, app.decks()) {
        Ok(Some(command)) => command,
        Ok(None) => return ControlFlow::Continue(()),
        Err(message) => {
            println!("{message}");
            return ControlFlow::Continue(());
        }
    };

    match command {
        Command::Help => println!("{HELP}"),
        Command::ShowCard => print_card(app),
        Command::ShowDecks => println!("{}", render_decks(app.decks())),
        Command::ShowDeck(position) => {
            if let Some(deck) = app.decks().decks().get(position) {
                println!("{}", render_deck(deck));
            }
        }
        Command::Action(action) => {
            let redraw_card = matches!(action, Action::DrawCard | Action::PreviousCard);
            let Some(event) = resolve_event(action, app.decks()) else {
                return ControlFlow::Continue(());
            };
            let flow = app.handle(event);
            if redraw_card {
                print_card(app);
            }
            return flow;
        }
    }
    ControlFlow::Continue(())
}

fn resolve_event(action: Action, decks: &DeckCollection) -> Option<AppEvent> {
    let deck_id = |position: usize| decks.decks().get(position).map(|deck| deck.id);
    let event = match action {
        Action::Begin => AppEvent::Begin,
        Action::DrawCard => AppEvent::DrawCard,
        Action::PreviousCard => AppEvent::PreviousCard,
        Action::Assign {
            deck,
            slot,
            image,
            label,
        } => AppEvent::AssignSlot {
            deck: deck_id(deck)?,
            slot,
            image,
            label,
        },
        Action::Hold(deck) => AppEvent::PressStart(deck_id(deck)?),
        Action::Release => AppEvent::PressEnd,
        Action::Back(deck) => AppEvent::JumpBack(deck_id(deck)?),
        Action::ToggleScan => AppEvent::ToggleScan,
        Action::ReadAgain => AppEvent::ReadAgain,
        Action::Quit => AppEvent::Quit,
    };
    Some(event)
}

/// Decks are named or given as 1-based positions; slots are 1-based too.
fn parse_command(line: &str, decks: &DeckCollection) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let deck_count = decks.decks().len();
    let deck_arg = |word: Option<&str>| -> Result<usize, String> {
        let word = word.ok_or_else(|| "missing deck".to_string())?;
        if let Ok(n) = word.parse::<usize>() {
            if (1..=deck_count).contains(&n) {
                return Ok(n - 1);
            }
        } else if let Some(deck) = decks.find_by_name(word) {
            if let Some(position) = decks.decks().iter().position(|d| d.id == deck.id) {
                return Ok(position);
            }
        }
        Err(format!("unknown deck {word:?}; use a name or 1..={deck_count}"))
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "card" => Command::ShowCard,
        "decks" => Command::ShowDecks,
        "deck" => Command::ShowDeck(deck_arg(words.next())?),
        "begin" | "start" => Command::Action(Action::Begin),
        "draw" | "new" => Command::Action(Action::DrawCard),
        "prev" | "previous" => Command::Action(Action::PreviousCard),
        "assign" => {
            let deck = deck_arg(words.next())?;
            let slot = words
                .next()
                .and_then(|word| word.parse::<usize>().ok())
                .filter(|slot| (1..=MAX_SLOTS).contains(slot))
                .ok_or_else(|| format!("slot must be 1..={MAX_SLOTS}"))?;
            let image = words
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| "missing image file".to_string())?;
            let label = words.collect::<Vec<_>>().join(" ");
            Command::Action(Action::Assign {
                deck,
                slot: slot - 1,
                image,
                label,
            })
        }
        "hold" => Command::Action(Action::Hold(deck_arg(words.next())?)),
        "release" => Command::Action(Action::Release),
        "back" => Command::Action(Action::Back(deck_arg(words.next())?)),
        "scan" => Command::Action(Action::ToggleScan),
        "again" => Command::Action(Action::ReadAgain),
        "quit" | "exit" => Command::Action(Action::Quit),
        other => return Err(format!("unknown command {other:?}; try `help`")),
    };
    Ok(Some(command))
}

fn print_card<S: SnapshotStore>(app: &mut App<S>) {
    let flipping = app.is_flipping();
    match app.enchantment_face() {
        Some(face) => println!("{}", render_card(&face, flipping)),
        None => println!("(no enchantments)"),
    }
}

fn render_card(face: &CardFace, flipping: bool) -> String {
    let flavor = &face.flavor;
    let mut out = String::new();
    if flipping {
        out.push_str("~ flip ~\n");
    }
    out.push_str(&format!("ENCHANTMENT\n{}\n\n", flavor.category));
    out.push_str(&format!("{}\n", face.card.title));
    for line in &face.card.body {
        out.push_str(&format!("{line}\n"));
    }
    out.push_str(&format!("\nSLOTS REQUIRED  {}\n", flavor.slots));
    out.push_str(&format!(
        "DISMANTLE       {}\n                {}\n",
        flavor.material, flavor.component
    ));
    out.push_str(&format!("VALUE           {} Gold Pieces", flavor.value));
    out
}

fn render_decks(collection: &DeckCollection) -> String {
    collection
        .decks()
        .iter()
        .enumerate()
        .map(|(position, deck)| {
            let face = deck.face();
            format!(
                "{}. {:<13} slot {:>3}  {:<20} {}/{} filled",
                position + 1,
                deck.name,
                deck.current_index + 1,
                face.label,
                deck.filled_slots().len(),
                deck.cards.len()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_deck(deck: &Deck) -> String {
    let face = deck.face();
    let shown = match face.image {
        Some(image) => format!("{} ({} bytes)", image.media_type(), image.bytes().len()),
        None => face.cover.to_string(),
    };
    let mut out = format!(
        "{} - slot {}: {} [{}]\n",
        deck.name,
        deck.current_index + 1,
        face.label,
        shown
    );
    for (index, card) in deck.cards.iter().enumerate() {
        if let Some(card) = card {
            out.push_str(&format!("  {:>3}  {}\n", index + 1, card.label));
        }
    }
    if deck.filled_slots().is_empty() {
        out.push_str("  (empty)\n");
    }
    out.push_str(&format!("  history: {} jumps", deck.history.len()));
    out
}

fn scanner_status(scanner: &Scanner) -> String {
    if scanner.is_speaking() {
        format!("Speaking... {}", scanner.last_spoken())
    } else if scanner.is_scanning() {
        "Scanning...".to_string()
    } else {
        "Scanner off".to_string()
    }
}
