use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalRecord {
    pub max_weight: f32,
    pub max_weight_at: DateTime<Utc>,
    pub max_length: f32,
    pub max_length_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub new_weight_record: bool,
    pub new_length_record: bool,
}

impl RecordUpdate {
    pub fn any(&self) -> bool {
        self.new_weight_record || self.new_length_record
    }

    /// Number of FishMaster tokens this update earns.
    pub fn tokens(&self, per_record: u32) -> u32 {
        u32::from(self.new_weight_record) * per_record
            + u32::from(self.new_length_record) * per_record
    }
}

/// Per-species bests for one player. Values only ever go up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordBook(HashMap<String, PersonalRecord>);

impl RecordBook {
    pub fn get(&self, species: &str) -> Option<&PersonalRecord> {
        self.0.get(species)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Records a capture.
    ///
    /// The first capture of a species sets the baseline and raises no flags;
    /// later captures raise a flag for each dimension they strictly improve.
    pub fn update(
        &mut self,
        species: &str,
        weight: f32,
        length: f32,
        at: DateTime<Utc>,
    ) -> RecordUpdate {
        let Some(record) = self.0.get_mut(species) else {
            debug!("First {species} on record: {weight:.2}kg, {length:.1}cm");
            self.0.insert(
                species.to_string(),
                PersonalRecord {
                    max_weight: weight.max(0.0),
                    max_weight_at: at,
                    max_length: length.max(0.0),
                    max_length_at: at,
                },
            );
            return RecordUpdate::default();
        };

        let mut update = RecordUpdate::default();
        if weight > record.max_weight {
            record.max_weight = weight;
            record.max_weight_at = at;
            update.new_weight_record = true;
        }
        if length > record.max_length {
            record.max_length = length;
            record.max_length_at = at;
            update.new_length_record = true;
        }

        if update.any() {
            debug!("New {species} record: {update:?}");
        }

        update
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn second_heavier_catch_is_the_only_weight_record() {
        let mut book = RecordBook::default();

        let first = book.update("walleye", 4.0, 50.0, at(0));
        let second = book.update("walleye", 6.0, 50.0, at(5));

        assert!(!first.new_weight_record);
        assert!(second.new_weight_record);
        assert!(!second.new_length_record);
        assert_relative_eq!(book.get("walleye").unwrap().max_weight, 6.0);
    }

    #[test]
    fn dimensions_improve_independently() {
        let mut book = RecordBook::default();
        book.update("cod", 5.0, 60.0, at(0));

        let update = book.update("cod", 4.0, 70.0, at(10));
        let record = book.get("cod").unwrap();

        assert_eq!(
            update,
            RecordUpdate {
                new_weight_record: false,
                new_length_record: true,
            }
        );
        assert_relative_eq!(record.max_weight, 5.0);
        assert_eq!(record.max_weight_at, at(0));
        assert_relative_eq!(record.max_length, 70.0);
        assert_eq!(record.max_length_at, at(10));
    }

    #[test]
    fn equal_catch_is_not_a_record() {
        let mut book = RecordBook::default();
        book.update("herring", 0.5, 20.0, at(0));

        assert!(!book.update("herring", 0.5, 20.0, at(1)).any());
    }

    #[test]
    fn records_never_decrease() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut book = RecordBook::default();
        let species = ["cod", "eel", "pike"];
        let (mut weights, mut lengths) = (HashMap::new(), HashMap::new());

        for minute in 0..500 {
            let id = species[rng.gen_range(0..species.len())];
            book.update(id, rng.gen_range(0.1..20.0), rng.gen_range(10.0..150.0), at(minute));

            let record = book.get(id).unwrap();
            let weight = weights.entry(id).or_insert(0.0_f32);
            let length = lengths.entry(id).or_insert(0.0_f32);
            assert!(record.max_weight >= *weight);
            assert!(record.max_length >= *length);
            *weight = record.max_weight;
            *length = record.max_length;
        }

        assert_eq!(book.len(), species.len());
    }

    #[test]
    fn tokens_count_each_improved_dimension() {
        let both = RecordUpdate {
            new_weight_record: true,
            new_length_record: true,
        };

        assert_eq!(both.tokens(1), 2);
        assert_eq!(RecordUpdate::default().tokens(3), 0);
    }
}
