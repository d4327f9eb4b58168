use std::fmt::Display;

use rand::{seq::SliceRandom, Rng};

use crate::{
    catalog::{catalog, FishSpecies, WaterType},
    clock::Season,
    gear::Lure,
    weather::Weather,
};

const PEAK_SEASON_BOOST: f32 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedSpecies {
    pub species: &'static FishSpecies,
    pub weight: f32,
}

/// Builds the pool of species that can bite at a location.
pub fn eligible_species(
    water: WaterType,
    season: Season,
    weather: &Weather,
    lure: &Lure,
) -> Vec<WeightedSpecies> {
    catalog()
        .iter()
        .filter(|species| species.habitat.accepts(water))
        .map(|species| {
            let peak = if species.peak_season == Some(season) {
                PEAK_SEASON_BOOST
            } else {
                1.0
            };
            let weight = species.rarity.abundance()
                * peak
                * lure.species_multiplier(species.id)
                * weather.catch_multiplier;
            WeightedSpecies { species, weight }
        })
        .filter(|entry| entry.weight > 0.0)
        .collect()
}

/// Luck makes rare and legendary fish proportionally more common.
pub fn apply_luck(pool: &mut [WeightedSpecies], luck_bonus: f32) {
    let factor = (1.0 + luck_bonus / 100.0).max(0.0);
    for entry in pool.iter_mut().filter(|e| e.species.rarity.is_prized()) {
        entry.weight *= factor;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampledCatch {
    pub species: &'static FishSpecies,
    pub weight: f32,
    pub length: f32,
}

impl SampledCatch {
    pub fn value(&self) -> f32 {
        catch_value(self.species, self.weight)
    }
}

impl Display for SampledCatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:.1}kg, {:.0}cm)",
            self.species.name, self.weight, self.length
        )
    }
}

/// Draws a species by weight, then its weight and length independently.
pub fn sample_catch<R: Rng + ?Sized>(pool: &[WeightedSpecies], rng: &mut R) -> Option<SampledCatch> {
    let species = pool.choose_weighted(rng, |entry| entry.weight).ok()?.species;

    Some(SampledCatch {
        species,
        weight: rng.gen_range(species.weight_range.clone()),
        length: rng.gen_range(species.length_range.clone()),
    })
}

/// FishPoints a catch is worth. Heavier fish within the species range pay more.
pub fn catch_value(species: &FishSpecies, weight: f32) -> f32 {
    let range = &species.weight_range;
    let x = (weight - range.start) / (range.end - range.start);
    let multiplier = (x * 1.36 - 0.48).powi(3) + 1.01 + x * 0.11;

    species.base_value as f32 * multiplier
}
