use serde::{Deserialize, Serialize};

use crate::catalog::{Habitat, WaterType};

/// Stable identity of an owned item. Survives removal of other items.
pub type ItemId = u64;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum GearError {
    #[error("No item at inventory slot {0}")]
    NoSuchItem(usize),

    #[error("Item at inventory slot {0} cannot be equipped as {1:?}")]
    WrongSlot(usize, EquipSlot),

    #[error("Nothing equipped as {0:?}")]
    NothingEquipped(EquipSlot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RodAction {
    Slow,
    Moderate,
    Fast,
    ExtraFast,
}

impl RodAction {
    /// Added to the base hook-set chance.
    pub const fn hook_bonus(self) -> f32 {
        match self {
            Self::Slow => 0.0,
            Self::Moderate => 0.05,
            Self::Fast => 0.1,
            Self::ExtraFast => 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rod {
    pub name: String,
    pub durability: u32,
    pub max_durability: u32,
    /// 1.0 is an ordinary rod.
    pub power: f32,
    pub action: RodAction,
    pub habitat: Habitat,
}

impl Rod {
    pub fn is_broken(&self) -> bool {
        self.durability == 0
    }

    pub fn damage(&mut self, points: u32) {
        self.durability = self.durability.saturating_sub(points);
    }

    pub fn repair(&mut self) {
        self.durability = self.max_durability;
    }
}

/// Scales a lure's pull on one species. A multiplier of zero excludes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesBias {
    pub species: String,
    pub multiplier: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lure {
    pub name: String,
    pub remaining_uses: u32,
    pub uses_per_item: u32,
    pub habitat: Habitat,
    /// Base bite attraction, 1.0 for a plain lure.
    pub attraction: f32,
    #[serde(default)]
    pub biases: Vec<SpeciesBias>,
}

impl Lure {
    pub fn is_empty(&self) -> bool {
        self.remaining_uses == 0
    }

    pub fn consume(&mut self, charges: u32) {
        self.remaining_uses = self.remaining_uses.saturating_sub(charges);
    }

    pub fn restock(&mut self, items: u32) {
        self.remaining_uses = self
            .remaining_uses
            .saturating_add(items.saturating_mul(self.uses_per_item));
    }

    pub fn species_multiplier(&self, species: &str) -> f32 {
        self.biases
            .iter()
            .filter(|bias| bias.species == species)
            .map(|bias| bias.multiplier.max(0.0))
            .product()
    }

    /// Lures fished outside their water still work, only worse.
    pub fn bite_multiplier(&self, water: WaterType) -> f32 {
        let fit = if self.habitat.accepts(water) { 1.0 } else { 0.75 };
        self.attraction.max(0.0) * fit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClothingSlot {
    Hat,
    Coat,
    Boots,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clothing {
    pub name: String,
    pub slot: ClothingSlot,
    /// Percentage points added to bite chance.
    pub luck: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Rod(Rod),
    Lure(Lure),
    Clothing(Clothing),
}

impl Item {
    pub fn fits(&self, slot: EquipSlot) -> bool {
        match (self, slot) {
            (Self::Rod(_), EquipSlot::Rod) | (Self::Lure(_), EquipSlot::Lure) => true,
            (Self::Clothing(clothing), EquipSlot::Hat) => clothing.slot == ClothingSlot::Hat,
            (Self::Clothing(clothing), EquipSlot::Coat) => clothing.slot == ClothingSlot::Coat,
            (Self::Clothing(clothing), EquipSlot::Boots) => clothing.slot == ClothingSlot::Boots,
            _ => false,
        }
    }

    pub fn slot(&self) -> EquipSlot {
        match self {
            Self::Rod(_) => EquipSlot::Rod,
            Self::Lure(_) => EquipSlot::Lure,
            Self::Clothing(clothing) => match clothing.slot {
                ClothingSlot::Hat => EquipSlot::Hat,
                ClothingSlot::Coat => EquipSlot::Coat,
                ClothingSlot::Boots => EquipSlot::Boots,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipSlot {
    Rod,
    Lure,
    Hat,
    Coat,
    Boots,
}

impl EquipSlot {
    pub const ALL: [EquipSlot; 5] = [Self::Rod, Self::Lure, Self::Hat, Self::Coat, Self::Boots];
}

/// Indices into the owner's inventory. They are weak references and must be
/// checked against the inventory on every use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub rod: Option<usize>,
    pub lure: Option<usize>,
    pub hat: Option<usize>,
    pub coat: Option<usize>,
    pub boots: Option<usize>,
}

impl Equipment {
    pub fn get(&self, slot: EquipSlot) -> Option<usize> {
        match slot {
            EquipSlot::Rod => self.rod,
            EquipSlot::Lure => self.lure,
            EquipSlot::Hat => self.hat,
            EquipSlot::Coat => self.coat,
            EquipSlot::Boots => self.boots,
        }
    }

    pub fn slot_mut(&mut self, slot: EquipSlot) -> &mut Option<usize> {
        match slot {
            EquipSlot::Rod => &mut self.rod,
            EquipSlot::Lure => &mut self.lure,
            EquipSlot::Hat => &mut self.hat,
            EquipSlot::Coat => &mut self.coat,
            EquipSlot::Boots => &mut self.boots,
        }
    }
}

pub fn luck_bonus(hat: Option<&Clothing>, coat: Option<&Clothing>, boots: Option<&Clothing>) -> f32 {
    [hat, coat, boots]
        .into_iter()
        .flatten()
        .map(|clothing| clothing.luck)
        .sum()
}

/// Copy of the equipped gear taken when the line is cast.
#[derive(Debug, Clone, PartialEq)]
pub struct GearSnapshot {
    pub rod_id: ItemId,
    pub rod: Rod,
    pub lure_id: ItemId,
    pub lure: Lure,
    pub luck_bonus: f32,
}

/// Session parameters derived from a gear snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GearEffects {
    pub bite_multiplier: f32,
    pub hook_bonus: f32,
    pub reel_multiplier: f32,
    pub fight_multiplier: f32,
    pub luck_bonus: f32,
    /// Durability lost when the line snaps.
    pub rod_wear: u32,
    /// Lure charges spent once a fish strikes.
    pub lure_cost: u32,
}

impl GearEffects {
    pub fn new(gear: &GearSnapshot, water: WaterType) -> Self {
        let power = gear.rod.power.max(0.1);

        Self {
            bite_multiplier: gear.lure.bite_multiplier(water) * (1.0 + gear.luck_bonus / 100.0),
            hook_bonus: gear.rod.action.hook_bonus(),
            reel_multiplier: 1.0 + (power - 1.0) * 0.5,
            fight_multiplier: (1.25 - 0.25 * power).clamp(0.5, 1.25),
            luck_bonus: gear.luck_bonus,
            rod_wear: 1,
            lure_cost: 1,
        }
    }
}
