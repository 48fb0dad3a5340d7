pub const ENCHANTMENTS: &[&str] = &[
    "UNSTOPPABLE FORCE:\nPERFORM ONE EXTRA ACTION PER TURN",
    "CRITICAL STRIKE:\nPERFORM A FREE ATTACK AFTER EACH CC ATTACK",
];

pub const DISMANTLE_MATERIALS: &[&str] = &[
    "Bloodiron",
    "Bombastium",
    "Chronoton",
    "Darkinium",
    "Draconian Ferite",
    "Element 99",
    "Entropium",
    "Fyrite",
    "Kerocyte",
    "Oriculus",
    "Pandemonic Silver",
    "Trilitium",
    "Xithricite",
];

pub const MATERIAL_TYPES: &[&str] = &[
    "Smithing Material",
    "Crafting Material",
    "Building Material",
    "Repair Material",
    "Magic Material",
    "Upgrade Material",
];

pub const LATIN_WORDS: &[&str] = &[
    "Barbaru", "Corrus", "Arcanum", "Fortis", "Tenebris", "Ignis", "Lunaris", "Nox", "Vita",
    "Umbra",
];

pub const DISMANTLE_AMOUNTS: &[u32] = &[5, 10, 15, 20, 25];

pub const SLOT_COUNTS: &[u8] = &[1, 2, 3];

pub const VALUE_MIN: u32 = 100;
pub const VALUE_MAX: u32 = 500;
pub const VALUE_STEP: u32 = 25;

/// All gold values a card can show, lowest first.
pub fn values() -> impl Iterator<Item = u32> {
    (VALUE_MIN..=VALUE_MAX).step_by(VALUE_STEP as usize)
}
