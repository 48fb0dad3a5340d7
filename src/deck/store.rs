use rand::Rng;

use super::{CardImage, DeckChange, DeckCollection, DeckId};
use crate::storage::{SnapshotStore, StorageResult, SNAPSHOT_KEY};

/// Owns the deck collection and mirrors it to durable storage.
///
/// Nothing is written until [`DeckStore::start`] has been called; from then on
/// every applied change overwrites the stored snapshot in full.
#[derive(Debug)]
pub struct DeckStore<S> {
    collection: DeckCollection,
    storage: S,
    started: bool,
}

impl<S: SnapshotStore> DeckStore<S> {
    /// Restores the stored snapshot, or lays out the default decks when it is
    /// missing, unreadable or malformed.
    pub fn initialize(storage: S) -> Self {
        let collection = match storage.load(SNAPSHOT_KEY) {
            Ok(Some(body)) => decode_snapshot(&body).unwrap_or_else(|| {
                tracing::warn!("stored deck snapshot is malformed; using default decks");
                DeckCollection::default_layout()
            }),
            Ok(None) => {
                tracing::info!("no stored deck snapshot; using default decks");
                DeckCollection::default_layout()
            }
            Err(err) => {
                tracing::warn!(?err, "failed to read deck snapshot; using default decks");
                DeckCollection::default_layout()
            }
        };

        Self {
            collection,
            storage,
            started: false,
        }
    }

    pub fn collection(&self) -> &DeckCollection {
        &self.collection
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Marks the session active and writes the current collection.
    pub fn start(&mut self) -> StorageResult<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        self.persist()
    }

    pub fn assign_slot(
        &mut self,
        deck_id: DeckId,
        slot: usize,
        image: CardImage,
        label: impl Into<String>,
    ) -> StorageResult<DeckChange> {
        let label = label.into();
        self.apply(|collection| collection.assign_slot(deck_id, slot, image, label))
    }

    pub fn jump_to_random_filled_slot<R: Rng + ?Sized>(
        &mut self,
        deck_id: DeckId,
        rng: &mut R,
    ) -> StorageResult<DeckChange> {
        self.apply(|collection| collection.jump_to_random_filled_slot(deck_id, rng))
    }

    pub fn jump_back(&mut self, deck_id: DeckId) -> StorageResult<DeckChange> {
        self.apply(|collection| collection.jump_back(deck_id))
    }

    /// The in-memory change stays applied even when the write fails.
    fn apply<F>(&mut self, update: F) -> StorageResult<DeckChange>
    where
        F: FnOnce(DeckCollection) -> (DeckCollection, DeckChange),
    {
        let current = std::mem::replace(&mut self.collection, DeckCollection::new(Vec::new()));
        let (next, change) = update(current);
        self.collection = next;

        tracing::debug!(?change, "deck update");
        if change.is_change() && self.started {
            self.persist()?;
        }
        Ok(change)
    }

    pub fn persist(&self) -> StorageResult<()> {
        let body = encode_snapshot(&self.collection)?;
        self.storage.save(SNAPSHOT_KEY, &body)?;
        tracing::debug!(bytes = body.len(), "deck snapshot written");
        Ok(())
    }
}

pub fn encode_snapshot(collection: &DeckCollection) -> serde_json::Result<String> {
    serde_json::to_string(collection)
}

/// `None` when the body is not a valid deck array or breaks a deck invariant.
pub fn decode_snapshot(body: &str) -> Option<DeckCollection> {
    let collection: DeckCollection = match serde_json::from_str(body) {
        Ok(collection) => collection,
        Err(err) => {
            tracing::warn!(?err, "failed to parse deck snapshot");
            return None;
        }
    };
    if let Err(message) = collection.check_invariants() {
        tracing::warn!(%message, "deck snapshot violates invariants");
        return None;
    }
    Some(collection)
}
