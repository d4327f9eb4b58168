//! Procedural weather.
//!
//! Weather is never stored. It is a pure function of the season, the time of
//! day and a seed hashed from `(guild, total game days, local hour)`, so every
//! observer in the same guild and hour sees the same sky.

use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::clock::{GameDate, GuildClock, GuildId, Season, TimeOfDay};

/// Domain separator mixed into every weather seed.
const SEED_DOMAIN: u64 = 0x6669_7368_696e_6765;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeatherKind {
    Clear,
    PartlyCloudy,
    Cloudy,
    LightRain,
    Rain,
    HeavyRain,
    Thunderstorm,
    Fog,
    Snow,
    Windy,
    Heatwave,
}

impl WeatherKind {
    pub const fn catch_rate(self) -> f32 {
        match self {
            Self::Clear => 1.0,
            Self::PartlyCloudy => 1.1,
            Self::Cloudy => 1.2,
            Self::LightRain => 1.3,
            Self::Rain => 1.15,
            Self::HeavyRain => 0.8,
            Self::Thunderstorm => 0.6,
            Self::Fog => 1.1,
            Self::Snow => 0.7,
            Self::Windy => 0.85,
            Self::Heatwave => 0.75,
        }
    }

    /// Wind speed range in mph.
    const fn wind_range(self) -> (u32, u32) {
        match self {
            Self::Clear => (0, 8),
            Self::PartlyCloudy => (2, 10),
            Self::Cloudy => (4, 12),
            Self::LightRain => (4, 12),
            Self::Rain => (8, 16),
            Self::HeavyRain => (12, 24),
            Self::Thunderstorm => (18, 40),
            Self::Fog => (0, 4),
            Self::Snow => (5, 18),
            Self::Windy => (20, 35),
            Self::Heatwave => (0, 6),
        }
    }

    fn adjust_temperature(self, temperature: i32) -> i32 {
        match self {
            Self::Clear | Self::PartlyCloudy => temperature,
            Self::Cloudy => temperature - 2,
            Self::LightRain => temperature - 2,
            Self::Rain => temperature - 4,
            Self::HeavyRain => temperature - 6,
            Self::Thunderstorm => temperature - 4,
            Self::Fog => temperature - 3,
            Self::Windy => temperature - 5,
            Self::Snow => (temperature - 4).min(32),
            Self::Heatwave => (temperature + 10).max(90),
        }
    }

    pub const fn glyph(self) -> &'static str {
        match self {
            Self::Clear => "☀️",
            Self::PartlyCloudy => "⛅",
            Self::Cloudy => "☁️",
            Self::LightRain => "🌦️",
            Self::Rain => "🌧️",
            Self::HeavyRain => "🌧️",
            Self::Thunderstorm => "⛈️",
            Self::Fog => "🌫️",
            Self::Snow => "🌨️",
            Self::Windy => "💨",
            Self::Heatwave => "🔥",
        }
    }
}

const SPRING: [(WeatherKind, u32); 10] = [
    (WeatherKind::Clear, 20),
    (WeatherKind::PartlyCloudy, 20),
    (WeatherKind::Cloudy, 15),
    (WeatherKind::LightRain, 15),
    (WeatherKind::Rain, 12),
    (WeatherKind::HeavyRain, 5),
    (WeatherKind::Thunderstorm, 5),
    (WeatherKind::Fog, 6),
    (WeatherKind::Windy, 6),
    (WeatherKind::Heatwave, 1),
];

const SUMMER: [(WeatherKind, u32); 10] = [
    (WeatherKind::Clear, 30),
    (WeatherKind::PartlyCloudy, 20),
    (WeatherKind::Cloudy, 8),
    (WeatherKind::LightRain, 6),
    (WeatherKind::Rain, 5),
    (WeatherKind::HeavyRain, 3),
    (WeatherKind::Thunderstorm, 10),
    (WeatherKind::Fog, 2),
    (WeatherKind::Windy, 4),
    (WeatherKind::Heatwave, 12),
];

const AUTUMN: [(WeatherKind, u32); 9] = [
    (WeatherKind::Clear, 15),
    (WeatherKind::PartlyCloudy, 15),
    (WeatherKind::Cloudy, 20),
    (WeatherKind::LightRain, 12),
    (WeatherKind::Rain, 12),
    (WeatherKind::HeavyRain, 5),
    (WeatherKind::Thunderstorm, 3),
    (WeatherKind::Fog, 10),
    (WeatherKind::Windy, 8),
];

const WINTER: [(WeatherKind, u32); 9] = [
    (WeatherKind::Clear, 15),
    (WeatherKind::PartlyCloudy, 12),
    (WeatherKind::Cloudy, 20),
    (WeatherKind::LightRain, 4),
    (WeatherKind::Rain, 4),
    (WeatherKind::HeavyRain, 2),
    (WeatherKind::Fog, 10),
    (WeatherKind::Snow, 25),
    (WeatherKind::Windy, 8),
];

fn season_table(season: Season) -> &'static [(WeatherKind, u32)] {
    match season {
        Season::Spring => &SPRING,
        Season::Summer => &SUMMER,
        Season::Autumn => &AUTUMN,
        Season::Winter => &WINTER,
    }
}

/// Season weights with the time-of-day skew applied.
fn weights(season: Season, time_of_day: TimeOfDay) -> Vec<(WeatherKind, u32)> {
    season_table(season)
        .iter()
        .map(|&(kind, weight)| {
            let weight = match (kind, time_of_day) {
                (WeatherKind::Fog, TimeOfDay::Dawn | TimeOfDay::Night) => weight * 2,
                (WeatherKind::Thunderstorm, TimeOfDay::Afternoon | TimeOfDay::Evening) => {
                    weight * 2
                }
                (WeatherKind::Heatwave, TimeOfDay::Dawn | TimeOfDay::Night) => weight / 2,
                _ => weight,
            };
            (kind, weight)
        })
        .collect()
}

/// Base temperature range in °F.
const fn season_temperature(season: Season) -> (i32, i32) {
    match season {
        Season::Spring => (50, 70),
        Season::Summer => (72, 92),
        Season::Autumn => (48, 68),
        Season::Winter => (20, 40),
    }
}

const fn time_of_day_offset(time_of_day: TimeOfDay) -> i32 {
    match time_of_day {
        TimeOfDay::Dawn => -6,
        TimeOfDay::Morning => -2,
        TimeOfDay::Afternoon => 6,
        TimeOfDay::Evening => 2,
        TimeOfDay::Dusk => -2,
        TimeOfDay::Night => -8,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub kind: WeatherKind,
    pub catch_multiplier: f32,
    /// Degrees Fahrenheit.
    pub temperature: i32,
    /// Miles per hour.
    pub wind_speed: u32,
}

impl Display for Weather {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:?}, {}°F, wind {} mph",
            self.kind.glyph(),
            self.kind,
            self.temperature,
            self.wind_speed
        )
    }
}

pub fn weather_seed(guild: GuildId, total_game_days: u64, hour: u32) -> u64 {
    let mut bytes = [0u8; 20];
    bytes[..8].copy_from_slice(&guild.to_le_bytes());
    bytes[8..16].copy_from_slice(&total_game_days.to_le_bytes());
    bytes[16..].copy_from_slice(&hour.to_le_bytes());
    XxHash64::oneshot(SEED_DOMAIN, &bytes)
}

/// Computes the weather for the given inputs.
///
/// The generator lives only for the duration of this call.
pub fn weather(season: Season, time_of_day: TimeOfDay, seed: u64) -> Weather {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let kind = weights(season, time_of_day)
        .choose_weighted(&mut rng, |(_, weight)| *weight)
        .map(|(kind, _)| *kind)
        .unwrap_or(WeatherKind::Clear);

    let (low, high) = season_temperature(season);
    let temperature =
        kind.adjust_temperature(rng.gen_range(low..=high) + time_of_day_offset(time_of_day));

    let (calm, gusty) = kind.wind_range();
    let wind_speed = rng.gen_range(calm..=gusty);

    Weather {
        kind,
        catch_multiplier: kind.catch_rate(),
        temperature,
        wind_speed,
    }
}

/// Everything a session needs to know about the world at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditions {
    pub date: GameDate,
    pub time_of_day: TimeOfDay,
    pub weather: Weather,
}

pub fn conditions(clock: &GuildClock, guild: GuildId, wall_clock: DateTime<Utc>) -> Conditions {
    let date = clock.now(wall_clock);
    let time_of_day = clock.time_of_day(wall_clock);
    let seed = weather_seed(guild, date.total_game_days, clock.local_hour(wall_clock));

    Conditions {
        date,
        time_of_day,
        weather: weather(date.season, time_of_day, seed),
    }
}

/// Conditions for the current hour followed by the next `hours - 1` hours.
pub fn forecast(
    clock: &GuildClock,
    guild: GuildId,
    wall_clock: DateTime<Utc>,
    hours: u32,
) -> Vec<(DateTime<Utc>, Conditions)> {
    (0..hours)
        .map(|offset| {
            let at = wall_clock + Duration::hours(i64::from(offset));
            (at, conditions(clock, guild, at))
        })
        .collect()
}
