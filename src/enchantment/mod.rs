//! Enchantment card randomizer.
//!
//! [`EnchantmentView`] keeps the linear history of drawn records. Flavor
//! fields are rolled separately on every render through [`FlavorFields::roll`]
//! and are never stored alongside the history.

use std::fmt;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;

pub mod catalog;

pub const DEFAULT_FLIP_DURATION: Duration = Duration::from_millis(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnchantmentCard {
    pub title: String,
    pub body: Vec<String>,
}

impl EnchantmentCard {
    /// Uppercases the record and splits it into a title line and body lines.
    pub fn from_record(record: &str) -> Self {
        let upper = record.to_uppercase();
        let mut lines = upper.split('\n').map(str::to_string);
        let title = lines.next().unwrap_or_default();
        Self {
            title,
            body: lines.collect(),
        }
    }

    pub fn body_text(&self) -> String {
        self.body.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dismantle {
    pub amount: u32,
    pub material: &'static str,
}

impl fmt::Display for Dismantle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Pieces of {}", self.amount, self.material)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlavorFields {
    pub material: Dismantle,
    pub component: Dismantle,
    pub value: u32,
    pub slots: u8,
    pub category: String,
}

impl FlavorFields {
    /// Draws every field independently and uniformly from its catalog.
    pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let values: Vec<u32> = catalog::values().collect();
        let first = pick(rng, catalog::LATIN_WORDS);
        let second = pick(rng, catalog::LATIN_WORDS);

        Self {
            material: Dismantle {
                amount: *pick(rng, catalog::DISMANTLE_AMOUNTS),
                material: *pick(rng, catalog::MATERIAL_TYPES),
            },
            component: Dismantle {
                amount: *pick(rng, catalog::DISMANTLE_AMOUNTS),
                material: *pick(rng, catalog::DISMANTLE_MATERIALS),
            },
            value: *pick(rng, &values),
            slots: *pick(rng, catalog::SLOT_COUNTS),
            category: format!("{first} {second}").to_uppercase(),
        }
    }
}

// Catalogs are non-empty constants.
fn pick<'a, R: Rng + ?Sized, T>(rng: &mut R, items: &'a [T]) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardFace {
    pub card: EnchantmentCard,
    pub flavor: FlavorFields,
}

#[derive(Debug, Clone)]
pub struct EnchantmentView {
    catalog: &'static [&'static str],
    history: Vec<&'static str>,
    index: usize,
    flip_duration: Duration,
    flip_until: Option<Instant>,
}

impl EnchantmentView {
    pub fn new() -> Self {
        Self::with_catalog(catalog::ENCHANTMENTS)
    }

    pub fn with_catalog(catalog: &'static [&'static str]) -> Self {
        Self {
            catalog,
            history: Vec::new(),
            index: 0,
            flip_duration: DEFAULT_FLIP_DURATION,
            flip_until: None,
        }
    }

    pub fn with_flip_duration(mut self, flip_duration: Duration) -> Self {
        self.flip_duration = flip_duration;
        self
    }

    pub fn history(&self) -> &[&'static str] {
        &self.history
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Appends a random record after the current entry, discarding any
    /// entries past it, and starts the flip signal.
    pub fn draw_new_card<R: Rng + ?Sized>(mut self, rng: &mut R, now: Instant) -> Self {
        let Some(record) = self.catalog.choose(rng).copied() else {
            tracing::warn!("enchantment catalog is empty; draw ignored");
            return self;
        };

        if !self.history.is_empty() {
            self.history.truncate(self.index + 1);
        }
        self.history.push(record);
        self.index = self.history.len() - 1;
        self.flip_until = Some(now + self.flip_duration);
        tracing::debug!(index = self.index, len = self.history.len(), "drew enchantment");
        self
    }

    pub fn go_to_previous(mut self) -> Self {
        self.index = self.index.saturating_sub(1);
        self
    }

    /// The record under the pointer, or a fresh random one before the first draw.
    pub fn current_card<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<EnchantmentCard> {
        self.history
            .get(self.index)
            .copied()
            .or_else(|| self.catalog.choose(rng).copied())
            .map(EnchantmentCard::from_record)
    }

    /// Current card plus a new roll of flavor fields.
    pub fn render<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<CardFace> {
        let card = self.current_card(rng)?;
        Some(CardFace {
            card,
            flavor: FlavorFields::roll(rng),
        })
    }

    pub fn is_flipping(&self, now: Instant) -> bool {
        self.flip_until.is_some_and(|until| now < until)
    }
}

impl Default for EnchantmentView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CATALOG: &[&str] = &[
        "ONE:\nFIRST EFFECT",
        "TWO:\nSECOND EFFECT",
        "THREE:\nLINE A\nLINE B",
    ];

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn draw_appends_and_points_at_new_entry() {
        let mut rng = rng();
        let now = Instant::now();
        let view = EnchantmentView::with_catalog(CATALOG)
            .draw_new_card(&mut rng, now)
            .draw_new_card(&mut rng, now);

        assert_eq!(view.history().len(), 2);
        assert_eq!(view.index(), 1);
    }

    #[test]
    fn draw_after_previous_truncates_forward_history() {
        let mut rng = rng();
        let now = Instant::now();
        let view = EnchantmentView::with_catalog(CATALOG)
            .draw_new_card(&mut rng, now)
            .draw_new_card(&mut rng, now)
            .draw_new_card(&mut rng, now)
            .go_to_previous()
            .draw_new_card(&mut rng, now);

        assert_eq!(view.history().len(), view.index() + 1);
        assert_eq!(view.history().len(), 3);
    }

    #[test]
    fn draw_previous_draw_keeps_length_at_index_plus_one() {
        let mut rng = rng();
        let now = Instant::now();
        let view = EnchantmentView::with_catalog(CATALOG)
            .draw_new_card(&mut rng, now)
            .go_to_previous()
            .draw_new_card(&mut rng, now);

        assert_eq!(view.history().len(), view.index() + 1);
    }

    #[test]
    fn previous_is_floored_at_zero() {
        let view = EnchantmentView::with_catalog(CATALOG)
            .go_to_previous()
            .go_to_previous();
        assert_eq!(view.index(), 0);
    }

    #[test]
    fn previous_shows_earlier_record() {
        let mut rng = rng();
        let now = Instant::now();
        let view = EnchantmentView::with_catalog(CATALOG)
            .draw_new_card(&mut rng, now)
            .draw_new_card(&mut rng, now);
        let first = view.history()[0];
        let view = view.go_to_previous();

        let card = view.current_card(&mut rng).expect("history is not empty");
        assert_eq!(card, EnchantmentCard::from_record(first));
    }

    #[test]
    fn current_card_before_any_draw_comes_from_catalog() {
        let mut rng = rng();
        let view = EnchantmentView::with_catalog(CATALOG);
        let card = view.current_card(&mut rng).expect("catalog is not empty");
        assert!(CATALOG
            .iter()
            .any(|record| EnchantmentCard::from_record(record) == card));
        assert!(view.history().is_empty());
    }

    #[test]
    fn empty_catalog_draw_is_ignored() {
        let mut rng = rng();
        let view = EnchantmentView::with_catalog(&[]).draw_new_card(&mut rng, Instant::now());
        assert!(view.history().is_empty());
        assert!(view.current_card(&mut rng).is_none());
    }

    #[test]
    fn card_splits_uppercased_title_and_body() {
        let card = EnchantmentCard::from_record("Quick Step:\nmove twice\nthen rest");
        assert_eq!(card.title, "QUICK STEP:");
        assert_eq!(card.body, vec!["MOVE TWICE", "THEN REST"]);
        assert_eq!(card.body_text(), "MOVE TWICE\nTHEN REST");
    }

    #[test]
    fn flip_signal_expires_after_duration() {
        let mut rng = rng();
        let now = Instant::now();
        let view = EnchantmentView::with_catalog(CATALOG)
            .with_flip_duration(Duration::from_millis(600))
            .draw_new_card(&mut rng, now);

        assert!(view.is_flipping(now));
        assert!(view.is_flipping(now + Duration::from_millis(599)));
        assert!(!view.is_flipping(now + Duration::from_millis(600)));
    }

    #[test]
    fn flavor_fields_stay_within_catalogs() {
        let mut rng = rng();
        for _ in 0..64 {
            let flavor = FlavorFields::roll(&mut rng);
            assert!(catalog::DISMANTLE_AMOUNTS.contains(&flavor.material.amount));
            assert!(catalog::MATERIAL_TYPES.contains(&flavor.material.material));
            assert!(catalog::DISMANTLE_MATERIALS.contains(&flavor.component.material));
            assert!(catalog::values().any(|value| value == flavor.value));
            assert!(catalog::SLOT_COUNTS.contains(&flavor.slots));
            assert_eq!(flavor.category, flavor.category.to_uppercase());
            assert_eq!(flavor.category.split(' ').count(), 2);
        }
    }

    #[test]
    fn dismantle_display_reads_as_pieces() {
        let dismantle = Dismantle {
            amount: 15,
            material: "Fyrite",
        };
        assert_eq!(dismantle.to_string(), "15 Pieces of Fyrite");
    }
}
