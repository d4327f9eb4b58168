use std::{
    collections::HashMap,
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use log::debug;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub type GuildId = u64;

pub const SECONDS_PER_REAL_DAY: f64 = 86_400.0;

static TIMEZONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:UTC|GMT)?(?P<sign>[+-])(?P<hours>\d{1,2})(?::?(?P<minutes>\d{2}))?$").unwrap()
});

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ClockError {
    #[error("Unknown timezone `{0}`")]
    UnknownTimezone(String),

    #[error("A season needs at least one day")]
    EmptySeason,

    #[error("Acceleration must be positive and finite, got {0}")]
    InvalidAcceleration(f64),
}

/// A guild's timezone, kept as a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timezone(FixedOffset);

impl Timezone {
    pub fn utc() -> Self {
        Self(Utc.fix())
    }

    pub fn offset(&self) -> FixedOffset {
        self.0
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self::utc()
    }
}

impl FromStr for Timezone {
    type Err = ClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if ["UTC", "GMT", "Z"]
            .iter()
            .any(|name| trimmed.eq_ignore_ascii_case(name))
        {
            return Ok(Self::utc());
        }

        let unknown = || ClockError::UnknownTimezone(s.to_string());
        let upper = trimmed.to_ascii_uppercase();
        let captures = TIMEZONE_REGEX.captures(&upper).ok_or_else(unknown)?;

        let hours: i32 = captures["hours"].parse().map_err(|_| unknown())?;
        let minutes: i32 = captures
            .name("minutes")
            .map_or(Ok(0), |m| m.as_str().parse())
            .map_err(|_| unknown())?;
        if hours > 14 || minutes >= 60 {
            return Err(unknown());
        }

        let mut seconds = hours * 3600 + minutes * 60;
        if &captures["sign"] == "-" {
            seconds = -seconds;
        }

        FixedOffset::east_opt(seconds).map(Self).ok_or_else(unknown)
    }
}

impl TryFrom<String> for Timezone {
    type Error = ClockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timezone> for String {
    fn from(timezone: Timezone) -> Self {
        timezone.to_string()
    }
}

impl Display for Timezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let seconds = self.0.local_minus_utc();
        if seconds == 0 {
            return write!(f, "UTC");
        }
        let sign = if seconds < 0 { '-' } else { '+' };
        let seconds = seconds.abs();
        write!(f, "{sign}{:02}:{:02}", seconds / 3600, seconds % 3600 / 60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    /// Seasons in the south run two steps behind the north.
    const fn season_offset(self) -> u64 {
        match self {
            Self::North => 0,
            Self::South => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [Self::Spring, Self::Summer, Self::Autumn, Self::Winter];

    fn from_index(index: u64) -> Self {
        match index % 4 {
            0 => Self::Spring,
            1 => Self::Summer,
            2 => Self::Autumn,
            _ => Self::Winter,
        }
    }
}

impl Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Spring => "Spring",
            Self::Summer => "Summer",
            Self::Autumn => "Autumn",
            Self::Winter => "Winter",
        };
        f.write_str(name)
    }
}

/// Fixed partition of the local 24 hour day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeOfDay {
    Dawn,
    Morning,
    Afternoon,
    Evening,
    Dusk,
    Night,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 6] = [
        Self::Dawn,
        Self::Morning,
        Self::Afternoon,
        Self::Evening,
        Self::Dusk,
        Self::Night,
    ];

    /// Start hour (inclusive) and end hour (exclusive). Night wraps past midnight.
    pub const fn hours(self) -> (u32, u32) {
        match self {
            Self::Dawn => (5, 7),
            Self::Morning => (7, 12),
            Self::Afternoon => (12, 17),
            Self::Evening => (17, 19),
            Self::Dusk => (19, 21),
            Self::Night => (21, 5),
        }
    }

    pub fn from_hour(hour: u32) -> Self {
        match hour % 24 {
            5..=6 => Self::Dawn,
            7..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=18 => Self::Evening,
            19..=20 => Self::Dusk,
            _ => Self::Night,
        }
    }

    pub const fn glyph(self) -> &'static str {
        match self {
            Self::Dawn => "🌅",
            Self::Morning => "🌤️",
            Self::Afternoon => "☀️",
            Self::Evening => "🌇",
            Self::Dusk => "🌆",
            Self::Night => "🌙",
        }
    }
}

impl Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.glyph(), self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSettings {
    pub timezone: Timezone,
    pub hemisphere: Hemisphere,
    /// Game days that pass per real day.
    pub acceleration: f64,
    pub days_per_season: u32,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            timezone: Timezone::utc(),
            hemisphere: Hemisphere::North,
            acceleration: 24.0,
            days_per_season: 28,
        }
    }
}

impl ClockSettings {
    pub fn validate(&self) -> Result<(), ClockError> {
        if self.days_per_season == 0 {
            return Err(ClockError::EmptySeason);
        }
        if !self.acceleration.is_finite() || self.acceleration <= 0.0 {
            return Err(ClockError::InvalidAcceleration(self.acceleration));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameDate {
    pub season: Season,
    /// One-based day within the season.
    pub day_of_season: u32,
    /// One-based year.
    pub year: u64,
    pub total_game_days: u64,
}

impl Display for GameDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Day {} of {}, Year {}",
            self.day_of_season, self.season, self.year
        )
    }
}

/// Maps `wall_clock` onto the accelerated calendar anchored at `epoch`.
///
/// Times before the epoch count as day zero, so the result never runs backwards.
pub fn game_date(
    settings: &ClockSettings,
    epoch: DateTime<Utc>,
    wall_clock: DateTime<Utc>,
) -> GameDate {
    let elapsed_seconds = (wall_clock - epoch).num_milliseconds().max(0) as f64 / 1000.0;
    let elapsed_days = elapsed_seconds * settings.acceleration.max(0.0) / SECONDS_PER_REAL_DAY;
    let total_game_days = elapsed_days.floor() as u64;

    let days_per_season = u64::from(settings.days_per_season.max(1));
    let season_count = total_game_days / days_per_season;

    GameDate {
        season: Season::from_index(season_count + settings.hemisphere.season_offset()),
        day_of_season: (total_game_days % days_per_season) as u32 + 1,
        year: season_count / 4 + 1,
        total_game_days,
    }
}

/// Local hour of the day in the guild's timezone.
pub fn local_hour(timezone: Timezone, wall_clock: DateTime<Utc>) -> u32 {
    wall_clock.with_timezone(&timezone.offset()).hour()
}

pub fn time_of_day(timezone: Timezone, wall_clock: DateTime<Utc>) -> TimeOfDay {
    TimeOfDay::from_hour(local_hour(timezone, wall_clock))
}

/// Calendar state for a single guild.
///
/// The epoch is written at most once; the first caller of [`GuildClock::epoch`]
/// fixes it for everybody else.
#[derive(Debug)]
pub struct GuildClock {
    settings: ClockSettings,
    epoch: Arc<OnceCell<DateTime<Utc>>>,
}

impl GuildClock {
    pub fn new(settings: ClockSettings) -> Self {
        Self {
            settings,
            epoch: Arc::new(OnceCell::new()),
        }
    }

    pub fn with_epoch(settings: ClockSettings, epoch: DateTime<Utc>) -> Self {
        Self {
            settings,
            epoch: Arc::new(OnceCell::with_value(epoch)),
        }
    }

    /// A clock with new settings that shares this clock's epoch, set or not.
    fn reconfigured(&self, settings: ClockSettings) -> Self {
        Self {
            settings,
            epoch: Arc::clone(&self.epoch),
        }
    }

    pub fn settings(&self) -> &ClockSettings {
        &self.settings
    }

    /// Restores a persisted epoch. Returns `false` if an epoch was already set.
    pub fn restore_epoch(&self, epoch: DateTime<Utc>) -> bool {
        self.epoch.set(epoch).is_ok()
    }

    pub fn stored_epoch(&self) -> Option<DateTime<Utc>> {
        self.epoch.get().copied()
    }

    pub fn epoch(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        *self.epoch.get_or_init(|| {
            debug!("Initializing clock epoch to {now}");
            now
        })
    }

    pub fn now(&self, wall_clock: DateTime<Utc>) -> GameDate {
        game_date(&self.settings, self.epoch(wall_clock), wall_clock)
    }

    pub fn time_of_day(&self, wall_clock: DateTime<Utc>) -> TimeOfDay {
        time_of_day(self.settings.timezone, wall_clock)
    }

    pub fn local_hour(&self, wall_clock: DateTime<Utc>) -> u32 {
        local_hour(self.settings.timezone, wall_clock)
    }
}

/// Per-guild clocks, created lazily with default settings.
#[derive(Debug, Default)]
pub struct ClockRegistry {
    defaults: ClockSettings,
    clocks: Mutex<HashMap<GuildId, Arc<GuildClock>>>,
}

impl ClockRegistry {
    pub fn new(defaults: ClockSettings) -> Self {
        Self {
            defaults,
            clocks: Mutex::default(),
        }
    }

    pub fn get(&self, guild: GuildId) -> Arc<GuildClock> {
        let mut clocks = self.clocks.lock().unwrap_or_else(PoisonError::into_inner);
        clocks
            .entry(guild)
            .or_insert_with(|| Arc::new(GuildClock::new(self.defaults.clone())))
            .clone()
    }

    /// Replaces a guild's settings. The old and new clock share one epoch.
    pub fn configure(&self, guild: GuildId, settings: ClockSettings) -> Result<(), ClockError> {
        settings.validate()?;

        let mut clocks = self.clocks.lock().unwrap_or_else(PoisonError::into_inner);
        let clock = match clocks.get(&guild) {
            Some(clock) => clock.reconfigured(settings),
            None => GuildClock::new(settings),
        };
        clocks.insert(guild, Arc::new(clock));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use test_case::test_case;

    use super::*;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn settings(hemisphere: Hemisphere) -> ClockSettings {
        ClockSettings {
            hemisphere,
            acceleration: 24.0,
            days_per_season: 28,
            ..Default::default()
        }
    }

    #[test_case(Duration::zero(), Season::Spring, 1, 1 ; "at the epoch")]
    #[test_case(Duration::hours(1), Season::Spring, 2, 1 ; "one real hour is one game day")]
    #[test_case(Duration::hours(28), Season::Summer, 1, 1 ; "first day of summer")]
    #[test_case(Duration::hours(28 * 3 + 5), Season::Winter, 6, 1 ; "winter of year one")]
    #[test_case(Duration::hours(28 * 4), Season::Spring, 1, 2 ; "second year")]
    fn northern_calendar(elapsed: Duration, season: Season, day: u32, year: u64) {
        let date = game_date(&settings(Hemisphere::North), epoch(), epoch() + elapsed);

        assert_eq!(date.season, season);
        assert_eq!(date.day_of_season, day);
        assert_eq!(date.year, year);
    }

    #[test]
    fn hemispheres_are_two_seasons_apart() {
        for hours in [0, 30, 60, 90] {
            let now = epoch() + Duration::hours(hours);
            let north = game_date(&settings(Hemisphere::North), epoch(), now);
            let south = game_date(&settings(Hemisphere::South), epoch(), now);

            let north_index = Season::ALL.iter().position(|s| *s == north.season).unwrap();
            let south_index = Season::ALL.iter().position(|s| *s == south.season).unwrap();
            assert_eq!((north_index + 2) % 4, south_index);
            assert_eq!(north.total_game_days, south.total_game_days);
        }
    }

    #[test]
    fn total_game_days_never_decrease() {
        let settings = ClockSettings {
            acceleration: 7.3,
            days_per_season: 5,
            ..Default::default()
        };
        let mut previous = 0;
        for minutes in (-120..20_000).step_by(37) {
            let date = game_date(&settings, epoch(), epoch() + Duration::minutes(minutes));
            assert!(date.total_game_days >= previous);
            previous = date.total_game_days;
        }
    }

    #[test]
    fn wall_clock_before_epoch_is_day_one() {
        let date = game_date(
            &ClockSettings::default(),
            epoch(),
            epoch() - Duration::days(3),
        );

        assert_eq!(date.total_game_days, 0);
        assert_eq!(date.day_of_season, 1);
    }

    #[test_case(0, TimeOfDay::Night)]
    #[test_case(4, TimeOfDay::Night)]
    #[test_case(5, TimeOfDay::Dawn)]
    #[test_case(7, TimeOfDay::Morning)]
    #[test_case(12, TimeOfDay::Afternoon)]
    #[test_case(17, TimeOfDay::Evening)]
    #[test_case(19, TimeOfDay::Dusk)]
    #[test_case(21, TimeOfDay::Night)]
    #[test_case(23, TimeOfDay::Night)]
    fn time_of_day_buckets(hour: u32, expected: TimeOfDay) {
        assert_eq!(TimeOfDay::from_hour(hour), expected);
    }

    #[test]
    fn buckets_agree_with_their_hour_ranges() {
        for bucket in TimeOfDay::ALL {
            let (start, _) = bucket.hours();
            assert_eq!(TimeOfDay::from_hour(start), bucket);
        }
    }

    #[test]
    fn time_of_day_uses_the_guild_timezone() {
        let noon_utc = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let tokyo: Timezone = "+09:00".parse().unwrap();

        assert_eq!(time_of_day(Timezone::utc(), noon_utc), TimeOfDay::Afternoon);
        assert_eq!(time_of_day(tokyo, noon_utc), TimeOfDay::Night);
    }

    #[test_case("UTC", 0 ; "utc")]
    #[test_case("z", 0 ; "zulu")]
    #[test_case("+02:00", 7200 ; "positive with colon")]
    #[test_case("-0530", -19800 ; "negative without colon")]
    #[test_case("UTC+3", 10800 ; "utc prefixed")]
    #[test_case("gmt-11", -39600 ; "gmt prefixed lowercase")]
    fn parses_timezones(input: &str, offset: i32) {
        let timezone: Timezone = input.parse().unwrap();
        assert_eq!(timezone.offset().local_minus_utc(), offset);
    }

    #[test_case("Europe/Berlin" ; "named zone")]
    #[test_case("+25:00" ; "hours out of range")]
    #[test_case("+02:75" ; "minutes out of range")]
    #[test_case("" ; "empty")]
    fn rejects_unknown_timezones(input: &str) {
        assert!(matches!(
            input.parse::<Timezone>(),
            Err(ClockError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn timezone_display_round_trips() {
        let timezone: Timezone = "-03:30".parse().unwrap();
        assert_eq!(timezone.to_string(), "-03:30");
        assert_eq!(timezone.to_string().parse::<Timezone>().unwrap(), timezone);
    }

    #[test]
    fn concurrent_first_use_converges_on_one_epoch() {
        let clock = GuildClock::new(ClockSettings::default());

        let epochs = std::thread::scope(|scope| {
            let handles = (0..8)
                .map(|i| {
                    let clock = &clock;
                    scope.spawn(move || clock.epoch(epoch() + Duration::seconds(i)))
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert!(epochs.iter().all(|e| *e == epochs[0]));
        assert_eq!(clock.stored_epoch(), Some(epochs[0]));
    }

    #[test]
    fn restored_epoch_never_moves() {
        let clock = GuildClock::with_epoch(ClockSettings::default(), epoch());

        assert!(!clock.restore_epoch(epoch() + Duration::days(1)));
        assert_eq!(clock.epoch(epoch() + Duration::days(5)), epoch());
    }

    #[test]
    fn reconfiguring_keeps_the_epoch() {
        let registry = ClockRegistry::default();
        let first = registry.get(7).epoch(epoch());

        registry
            .configure(
                7,
                ClockSettings {
                    days_per_season: 10,
                    ..Default::default()
                },
            )
            .unwrap();

        let clock = registry.get(7);
        assert_eq!(clock.settings().days_per_season, 10);
        assert_eq!(clock.epoch(epoch() + Duration::days(9)), first);
    }

    #[test]
    fn stale_clock_and_reconfigured_clock_share_one_epoch() {
        let registry = ClockRegistry::default();
        let stale = registry.get(3);

        registry
            .configure(
                3,
                ClockSettings {
                    days_per_season: 5,
                    ..Default::default()
                },
            )
            .unwrap();
        let fresh = registry.get(3);
        assert_eq!(fresh.stored_epoch(), None);

        assert_eq!(stale.epoch(epoch()), epoch());
        assert_eq!(fresh.stored_epoch(), Some(epoch()));
        assert_eq!(fresh.epoch(epoch() + Duration::days(2)), epoch());
    }

    #[test]
    fn rejects_invalid_settings() {
        let registry = ClockRegistry::default();
        let result = registry.configure(
            1,
            ClockSettings {
                days_per_season: 0,
                ..Default::default()
            },
        );

        assert_eq!(result, Err(ClockError::EmptySeason));
    }
}
