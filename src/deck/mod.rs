//! Deck collection model and its update functions.
//!
//! Every update takes the collection by value and hands back the next
//! collection together with a [`DeckChange`] describing what happened.
//! Unknown deck ids, out-of-range slots and empty candidate sets leave the
//! collection untouched and report [`DeckChange::Unchanged`].

use std::collections::HashSet;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod image;
pub mod store;

pub use image::{CardImage, CardImageError};
pub use store::DeckStore;

pub const MAX_SLOTS: usize = 280;
pub const DEFAULT_DECK_NAMES: [&str; 4] = ["Item", "Equipment", "Magic", "Enchantments"];
pub const DEFAULT_COVER: &str = "/heathenlocke_deck_cover.webp";
pub const EMPTY_SLOT_LABEL: &str = "Card";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeckId(Uuid);

impl DeckId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeckId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(Uuid);

impl SlotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSlot {
    pub id: SlotId,
    pub image: CardImage,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    pub cover: String,
    pub cards: Vec<Option<CardSlot>>,
    pub current_index: usize,
    #[serde(default)]
    pub history: Vec<usize>,
}

/// What a deck shows face up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeckFace<'a> {
    pub image: Option<&'a CardImage>,
    pub cover: &'a str,
    pub label: &'a str,
}

impl Deck {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            id: DeckId::new(),
            name: name.into(),
            cover: DEFAULT_COVER.to_string(),
            cards: vec![None; MAX_SLOTS],
            current_index: 0,
            history: Vec::new(),
        }
    }

    pub fn current_card(&self) -> Option<&CardSlot> {
        self.cards.get(self.current_index).and_then(Option::as_ref)
    }

    pub fn face(&self) -> DeckFace<'_> {
        let card = self.current_card();
        DeckFace {
            image: card.map(|card| &card.image),
            cover: &self.cover,
            label: card
                .map(|card| card.label.as_str())
                .filter(|label| !label.is_empty())
                .unwrap_or(EMPTY_SLOT_LABEL),
        }
    }

    pub fn filled_slots(&self) -> Vec<usize> {
        self.cards
            .iter()
            .enumerate()
            .filter_map(|(index, card)| card.as_ref().map(|_| index))
            .collect()
    }

    fn check_invariants(&self) -> Result<(), String> {
        if self.cards.len() != MAX_SLOTS {
            return Err(format!(
                "deck {} has {} slots, expected {MAX_SLOTS}",
                self.name,
                self.cards.len()
            ));
        }
        if self.current_index >= self.cards.len() {
            return Err(format!(
                "deck {} points at slot {} outside 0..{MAX_SLOTS}",
                self.name, self.current_index
            ));
        }
        if let Some(index) = self.history.iter().find(|index| **index >= MAX_SLOTS) {
            return Err(format!(
                "deck {} remembers slot {index} outside 0..{MAX_SLOTS}",
                self.name
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoChange {
    UnknownDeck,
    SlotOutOfRange,
    NoFilledSlots,
    EmptyHistory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeckChange {
    SlotAssigned {
        deck: DeckId,
        slot: usize,
        card: SlotId,
    },
    Jumped {
        deck: DeckId,
        from: usize,
        to: usize,
    },
    JumpedBack {
        deck: DeckId,
        from: usize,
        to: usize,
    },
    Unchanged(NoChange),
}

impl DeckChange {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeckCollection {
    decks: Vec<Deck>,
}

impl DeckCollection {
    pub fn new(decks: Vec<Deck>) -> Self {
        Self { decks }
    }

    /// Four empty decks named after [`DEFAULT_DECK_NAMES`].
    pub fn default_layout() -> Self {
        Self::new(DEFAULT_DECK_NAMES.iter().copied().map(Deck::empty).collect())
    }

    pub fn decks(&self) -> &[Deck] {
        &self.decks
    }

    pub fn deck(&self, id: DeckId) -> Option<&Deck> {
        self.decks.iter().find(|deck| deck.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Deck> {
        self.decks
            .iter()
            .find(|deck| deck.name.eq_ignore_ascii_case(name))
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        if self.decks.is_empty() {
            return Err("collection has no decks".to_string());
        }
        let mut seen = HashSet::with_capacity(self.decks.len());
        if let Some(deck) = self.decks.iter().find(|deck| !seen.insert(deck.id)) {
            return Err(format!("deck id {} appears more than once", deck.id));
        }
        self.decks.iter().try_for_each(Deck::check_invariants)
    }

    fn deck_mut(&mut self, id: DeckId) -> Option<&mut Deck> {
        self.decks.iter_mut().find(|deck| deck.id == id)
    }

    /// Stores a new card in `slot`, replacing whatever was there.
    pub fn assign_slot(
        mut self,
        deck_id: DeckId,
        slot: usize,
        image: CardImage,
        label: impl Into<String>,
    ) -> (Self, DeckChange) {
        let Some(deck) = self.deck_mut(deck_id) else {
            tracing::debug!(deck = %deck_id, "assign ignored: unknown deck");
            return (self, DeckChange::Unchanged(NoChange::UnknownDeck));
        };
        let Some(target) = deck.cards.get_mut(slot) else {
            tracing::debug!(deck = %deck_id, slot, "assign ignored: slot out of range");
            return (self, DeckChange::Unchanged(NoChange::SlotOutOfRange));
        };

        let card = CardSlot {
            id: SlotId::new(),
            image,
            label: label.into(),
        };
        let card_id = card.id;
        *target = Some(card);

        (
            self,
            DeckChange::SlotAssigned {
                deck: deck_id,
                slot,
                card: card_id,
            },
        )
    }

    /// Moves the deck to a uniformly chosen filled slot, remembering where it was.
    pub fn jump_to_random_filled_slot<R: Rng + ?Sized>(
        mut self,
        deck_id: DeckId,
        rng: &mut R,
    ) -> (Self, DeckChange) {
        let Some(deck) = self.deck_mut(deck_id) else {
            tracing::debug!(deck = %deck_id, "jump ignored: unknown deck");
            return (self, DeckChange::Unchanged(NoChange::UnknownDeck));
        };
        let Some(&to) = deck.filled_slots().choose(rng) else {
            tracing::debug!(deck = %deck_id, "jump ignored: no filled slots");
            return (self, DeckChange::Unchanged(NoChange::NoFilledSlots));
        };

        let from = deck.current_index;
        deck.history.push(from);
        deck.current_index = to;

        (
            self,
            DeckChange::Jumped {
                deck: deck_id,
                from,
                to,
            },
        )
    }

    /// Returns the deck to the most recently remembered slot.
    pub fn jump_back(mut self, deck_id: DeckId) -> (Self, DeckChange) {
        let Some(deck) = self.deck_mut(deck_id) else {
            return (self, DeckChange::Unchanged(NoChange::UnknownDeck));
        };
        let Some(to) = deck.history.pop() else {
            return (self, DeckChange::Unchanged(NoChange::EmptyHistory));
        };
        if to >= deck.cards.len() {
            deck.history.push(to);
            tracing::warn!(deck = %deck_id, slot = to, "history entry out of range");
            return (self, DeckChange::Unchanged(NoChange::SlotOutOfRange));
        }

        let from = deck.current_index;
        deck.current_index = to;
        (
            self,
            DeckChange::JumpedBack {
                deck: deck_id,
                from,
                to,
            },
        )
    }
}

impl Default for DeckCollection {
    fn default() -> Self {
        Self::default_layout()
    }
}
