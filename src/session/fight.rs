use tokio::time::Instant;

use crate::{catch_table::SampledCatch, config::FightTuning, gear::GearEffects};

/// How much harder the heaviest fish of a species pulls than the lightest.
const WEIGHT_PULL: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FightStatus {
    pub tension: f32,
    pub progress: f32,
    pub idle_turns: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FightTurn {
    Holding,
    Landed,
    Snapped,
    Escaped,
}

/// How hard a hooked fish pulls, from its rarity and its weight within the species range.
pub fn fish_factor(catch: &SampledCatch) -> f32 {
    let range = &catch.species.weight_range;
    let relative = ((catch.weight - range.start) / (range.end - range.start)).clamp(0.0, 1.0);

    catch.species.rarity.fight_factor() * (1.0 + WEIGHT_PULL * relative)
}

/// The tension and progress meters of one fight.
#[derive(Debug, Clone)]
pub struct Fight {
    tension: f32,
    progress: f32,
    idle_turns: u32,
    fish_factor: f32,
    last_update: Instant,
}

impl Fight {
    pub fn new(fish_factor: f32, now: Instant) -> Self {
        Self {
            tension: 0.0,
            progress: 0.0,
            idle_turns: 0,
            fish_factor,
            last_update: now,
        }
    }

    pub fn status(&self) -> FightStatus {
        FightStatus {
            tension: self.tension,
            progress: self.progress,
            idle_turns: self.idle_turns,
        }
    }

    /// Lets tension ease off for the time since the last update.
    fn relax(&mut self, tuning: &FightTuning, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f32();
        self.tension = (self.tension - tuning.idle_decay_per_sec * elapsed).max(0.0);
        self.last_update = now;
    }

    pub fn reel(&mut self, tuning: &FightTuning, effects: &GearEffects, now: Instant) -> FightTurn {
        self.relax(tuning, now);
        self.idle_turns = 0;

        if self.tension > tuning.safe_tension {
            return FightTurn::Snapped;
        }

        self.progress = (self.progress + tuning.base_reel_gain * effects.reel_multiplier)
            .min(tuning.progress_target);
        if self.progress >= tuning.progress_target {
            return FightTurn::Landed;
        }

        // the fish fights harder the closer it gets
        let pull = tuning.base_pull_penalty
            * self.fish_factor
            * effects.fight_multiplier
            * (1.0 + self.progress / tuning.progress_target);
        self.tension = (self.tension + pull).min(tuning.tension_max);

        FightTurn::Holding
    }

    /// A turn passed without the player reeling.
    pub fn idle(&mut self, tuning: &FightTuning, now: Instant) -> FightTurn {
        self.relax(tuning, now);
        self.progress = (self.progress - tuning.idle_progress_loss).max(0.0);
        self.idle_turns += 1;

        if self.idle_turns >= tuning.max_idle_turns {
            FightTurn::Escaped
        } else {
            FightTurn::Holding
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_relative_eq;
    use test_case::test_case;

    use super::*;
    use crate::catalog;

    fn effects() -> GearEffects {
        GearEffects {
            bite_multiplier: 1.0,
            hook_bonus: 0.0,
            reel_multiplier: 1.0,
            fight_multiplier: 1.0,
            luck_bonus: 0.0,
            rod_wear: 1,
            lure_cost: 1,
        }
    }

    #[test]
    fn three_reels_land_a_common_fish() {
        let tuning = FightTuning::default();
        let now = Instant::now();
        let mut fight = Fight::new(1.0, now);

        assert_eq!(fight.reel(&tuning, &effects(), now), FightTurn::Holding);
        assert_relative_eq!(fight.status().tension, 13.4, epsilon = 1e-4);
        assert_eq!(fight.reel(&tuning, &effects(), now), FightTurn::Holding);
        assert_relative_eq!(fight.status().tension, 30.2, epsilon = 1e-4);
        assert_eq!(fight.reel(&tuning, &effects(), now), FightTurn::Landed);
        assert_relative_eq!(fight.status().progress, 100.0);
    }

    #[test]
    fn reeling_past_the_safe_tension_snaps() {
        let tuning = FightTuning {
            base_reel_gain: 10.0,
            base_pull_penalty: 15.0,
            ..FightTuning::default()
        };
        let now = Instant::now();
        let mut fight = Fight::new(1.0, now);

        let tensions = (0..4)
            .map(|_| {
                assert_eq!(fight.reel(&tuning, &effects(), now), FightTurn::Holding);
                fight.status().tension
            })
            .collect::<Vec<_>>();

        assert!(tensions[..3].iter().all(|&t| t <= tuning.safe_tension));
        assert!(tensions[3] > tuning.safe_tension);
        assert_eq!(fight.reel(&tuning, &effects(), now), FightTurn::Snapped);
    }

    #[test]
    fn waiting_lets_tension_ease() {
        let tuning = FightTuning {
            base_reel_gain: 10.0,
            base_pull_penalty: 15.0,
            ..FightTuning::default()
        };
        let start = Instant::now();
        let mut fight = Fight::new(1.0, start);
        for _ in 0..4 {
            fight.reel(&tuning, &effects(), start);
        }

        // 75 tension minus 5 per second for 2 seconds
        let later = start + Duration::from_secs(2);
        assert_eq!(fight.reel(&tuning, &effects(), later), FightTurn::Holding);
        assert!(fight.status().progress > 40.0);
    }

    #[test]
    fn idle_turns_bleed_progress_then_escape() {
        let tuning = FightTuning::default();
        let now = Instant::now();
        let mut fight = Fight::new(1.0, now);
        fight.reel(&tuning, &effects(), now);

        assert_eq!(fight.idle(&tuning, now), FightTurn::Holding);
        assert_relative_eq!(fight.status().progress, 29.0);
        assert_eq!(fight.idle(&tuning, now), FightTurn::Holding);
        assert_eq!(fight.idle(&tuning, now), FightTurn::Escaped);
        assert_eq!(fight.status().idle_turns, 3);
    }

    #[test]
    fn reeling_resets_idle_turns() {
        let tuning = FightTuning::default();
        let now = Instant::now();
        let mut fight = Fight::new(1.0, now);

        fight.idle(&tuning, now);
        fight.idle(&tuning, now);
        fight.reel(&tuning, &effects(), now);

        assert_eq!(fight.status().idle_turns, 0);
        assert_eq!(fight.idle(&tuning, now), FightTurn::Holding);
    }

    #[test]
    fn meters_stay_in_bounds() {
        let tuning = FightTuning {
            base_pull_penalty: 90.0,
            safe_tension: 100.0,
            ..FightTuning::default()
        };
        let now = Instant::now();
        let mut fight = Fight::new(1.6, now);

        fight.reel(&tuning, &effects(), now);
        for _ in 0..10 {
            fight.idle(&tuning, now);
        }

        let status = fight.status();
        assert_relative_eq!(status.tension, tuning.tension_max);
        assert_relative_eq!(status.progress, 0.0);
    }

    #[test_case("bluegill", 0.0, 1.0 ; "lightest common fish")]
    #[test_case("bluegill", 1.0, 1.25 ; "heaviest common fish")]
    #[test_case("swordfish", 0.0, 1.6 ; "lightest legendary fish")]
    fn heavier_and_rarer_fish_pull_harder(id: &str, relative: f32, expected: f32) {
        let species = catalog::species(id).unwrap();
        let range = &species.weight_range;
        let catch = SampledCatch {
            species,
            weight: range.start + (range.end - range.start) * relative,
            length: species.length_range.start,
        };

        assert_relative_eq!(fish_factor(&catch), expected, epsilon = 1e-5);
    }
}
