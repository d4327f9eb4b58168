use std::{fmt::Display, ops::Range};

use serde::{Deserialize, Serialize};

use crate::clock::Season;

/// The kind of water a location holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaterType {
    Freshwater,
    Saltwater,
}

/// Which waters a species lives in, or a rod or lure is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Habitat {
    Freshwater,
    Saltwater,
    Both,
}

impl Habitat {
    pub const fn accepts(self, water: WaterType) -> bool {
        matches!(
            (self, water),
            (Self::Both, _)
                | (Self::Freshwater, WaterType::Freshwater)
                | (Self::Saltwater, WaterType::Saltwater)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Legendary,
}

impl Rarity {
    pub const fn abundance(self) -> f32 {
        match self {
            Self::Common => 60.0,
            Self::Uncommon => 25.0,
            Self::Rare => 10.0,
            Self::Legendary => 2.0,
        }
    }

    /// How much harder than a common fish this one pulls.
    pub const fn fight_factor(self) -> f32 {
        match self {
            Self::Common => 1.0,
            Self::Uncommon => 1.15,
            Self::Rare => 1.35,
            Self::Legendary => 1.6,
        }
    }

    pub const fn is_prized(self) -> bool {
        matches!(self, Self::Rare | Self::Legendary)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FishSpecies {
    pub id: &'static str,
    pub name: &'static str,
    pub habitat: Habitat,
    pub rarity: Rarity,
    /// Kilograms.
    pub weight_range: Range<f32>,
    /// Centimetres.
    pub length_range: Range<f32>,
    pub base_value: u32,
    pub peak_season: Option<Season>,
}

impl FishSpecies {
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        id: &'static str,
        name: &'static str,
        habitat: Habitat,
        rarity: Rarity,
        weight_range: Range<f32>,
        length_range: Range<f32>,
        base_value: u32,
        peak_season: Option<Season>,
    ) -> Self {
        Self {
            id,
            name,
            habitat,
            rarity,
            weight_range,
            length_range,
            base_value,
            peak_season,
        }
    }
}

impl Display for FishSpecies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:.1}kg - {:.1}kg, {:.0}cm - {:.0}cm)",
            self.name,
            self.weight_range.start,
            self.weight_range.end,
            self.length_range.start,
            self.length_range.end
        )
    }
}

use Habitat::{Both, Freshwater, Saltwater};
use Rarity::{Common, Legendary, Rare, Uncommon};

static SPECIES: [FishSpecies; 20] = [
    FishSpecies::new("bluegill", "Bluegill", Freshwater, Common, 0.1..0.6, 10.0..25.0, 8, Some(Season::Summer)),
    FishSpecies::new("yellow_perch", "Yellow Perch", Freshwater, Common, 0.1..0.9, 12.0..30.0, 10, Some(Season::Winter)),
    FishSpecies::new("common_carp", "Common Carp", Freshwater, Common, 1.0..14.0, 30.0..80.0, 12, None),
    FishSpecies::new("largemouth_bass", "Largemouth Bass", Freshwater, Uncommon, 0.5..5.0, 25.0..60.0, 30, Some(Season::Spring)),
    FishSpecies::new("rainbow_trout", "Rainbow Trout", Freshwater, Uncommon, 0.5..4.0, 30.0..70.0, 35, Some(Season::Spring)),
    FishSpecies::new("channel_catfish", "Channel Catfish", Freshwater, Uncommon, 1.0..9.0, 40.0..90.0, 28, Some(Season::Summer)),
    FishSpecies::new("walleye", "Walleye", Freshwater, Uncommon, 0.8..5.5, 35.0..75.0, 32, Some(Season::Autumn)),
    FishSpecies::new("northern_pike", "Northern Pike", Freshwater, Rare, 2.0..12.0, 50.0..120.0, 80, Some(Season::Autumn)),
    FishSpecies::new("lake_sturgeon", "Lake Sturgeon", Freshwater, Legendary, 10.0..90.0, 100.0..220.0, 400, None),
    FishSpecies::new("atlantic_salmon", "Atlantic Salmon", Both, Uncommon, 2.0..12.0, 50.0..110.0, 45, Some(Season::Autumn)),
    FishSpecies::new("american_eel", "American Eel", Both, Uncommon, 0.3..3.0, 40.0..120.0, 25, Some(Season::Summer)),
    FishSpecies::new("striped_bass", "Striped Bass", Both, Rare, 3.0..20.0, 45.0..120.0, 90, Some(Season::Spring)),
    FishSpecies::new("mackerel", "Atlantic Mackerel", Saltwater, Common, 0.3..1.5, 25.0..45.0, 9, Some(Season::Summer)),
    FishSpecies::new("herring", "Herring", Saltwater, Common, 0.1..0.7, 15.0..40.0, 6, Some(Season::Winter)),
    FishSpecies::new("flounder", "Flounder", Saltwater, Common, 0.5..4.0, 25.0..60.0, 14, None),
    FishSpecies::new("sea_bass", "Sea Bass", Saltwater, Uncommon, 1.0..6.0, 35.0..70.0, 33, Some(Season::Summer)),
    FishSpecies::new("red_snapper", "Red Snapper", Saltwater, Uncommon, 1.0..10.0, 35.0..90.0, 40, Some(Season::Summer)),
    FishSpecies::new("cod", "Atlantic Cod", Saltwater, Uncommon, 1.5..12.0, 45.0..120.0, 30, Some(Season::Winter)),
    FishSpecies::new("yellowfin_tuna", "Yellowfin Tuna", Saltwater, Rare, 15.0..180.0, 90.0..230.0, 150, Some(Season::Summer)),
    FishSpecies::new("swordfish", "Swordfish", Saltwater, Legendary, 50.0..550.0, 200.0..450.0, 600, None),
];

pub fn catalog() -> &'static [FishSpecies] {
    &SPECIES
}

pub fn species(id: &str) -> Option<&'static FishSpecies> {
    SPECIES.iter().find(|species| species.id == id)
}
