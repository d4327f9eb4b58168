use std::collections::HashMap;

use fishinge_engine::{
    catalog::WaterType,
    catch_table::{apply_luck, eligible_species, sample_catch},
    clock::{Season, TimeOfDay},
    weather::{weather, WeatherKind},
    Player,
};
use rand::{rngs::StdRng, seq::SliceRandom, thread_rng, Rng, SeedableRng};

const ROUNDS: usize = 100_000;

fn main() {
    let mut rng = StdRng::from_rng(thread_rng()).unwrap();

    let angler = Player::with_starter_kit(0);
    let gear = angler.gear_snapshot().unwrap();

    for water in [WaterType::Freshwater, WaterType::Saltwater] {
        for season in Season::ALL {
            let mut skies: HashMap<WeatherKind, usize> = HashMap::new();
            let mut species: HashMap<&str, usize> = HashMap::new();
            let mut total_value = 0.0;
            let mut prized = 0;

            for _ in 0..ROUNDS {
                let time_of_day = *TimeOfDay::ALL.choose(&mut rng).unwrap();
                let sky = weather(season, time_of_day, rng.gen());
                *skies.entry(sky.kind).or_default() += 1;

                let mut pool = eligible_species(water, season, &sky, &gear.lure);
                apply_luck(&mut pool, gear.luck_bonus);

                let catch = sample_catch(&pool, &mut rng).unwrap();
                total_value += catch.value();
                if catch.species.rarity.is_prized() {
                    prized += 1;
                }
                *species.entry(catch.species.name).or_default() += 1;
            }

            let (common_sky, _) = skies.iter().max_by_key(|(_, count)| **count).unwrap();
            let (common_fish, _) = species.iter().max_by_key(|(_, count)| **count).unwrap();

            println!("{water:?} in {season}");
            println!("  Most common weather: {}", common_sky.glyph());
            println!("  Most common catch: {common_fish}");
            println!(
                "  Rare or better: {:.2}%",
                prized as f32 * 100.0 / ROUNDS as f32
            );
            println!(
                "  Average Catch Value: {:.2} FishPoints",
                total_value / ROUNDS as f32
            );
        }
    }
}
