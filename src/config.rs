use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::clock::{ClockError, ClockSettings};

pub const CONFIG_PATH_VAR: &str = "FISHINGE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse config")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Invalid clock settings")]
    Clock(#[from] ClockError),

    #[error("Invalid tuning: {0}")]
    Invalid(&'static str),
}

/// Durations written as human strings such as `"30s"` or `"2m 30s"`.
mod human_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTuning {
    #[serde(with = "human_duration")]
    pub bite_window: Duration,
    #[serde(with = "human_duration")]
    pub bite_poll: Duration,
    pub base_bite_rate: f32,
    #[serde(with = "human_duration")]
    pub hook_window: Duration,
    pub base_hook_chance: f32,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            bite_window: Duration::from_secs(30),
            bite_poll: Duration::from_secs(3),
            base_bite_rate: 0.15,
            hook_window: Duration::from_secs(5),
            base_hook_chance: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FightTuning {
    pub progress_target: f32,
    pub tension_max: f32,
    /// Reeling while tension is above this snaps the line.
    pub safe_tension: f32,
    pub base_reel_gain: f32,
    pub base_pull_penalty: f32,
    /// Tension shed per second without reeling.
    pub idle_decay_per_sec: f32,
    /// Progress the fish wins back on every idle turn.
    pub idle_progress_loss: f32,
    #[serde(with = "human_duration")]
    pub turn_window: Duration,
    pub max_idle_turns: u32,
    #[serde(with = "human_duration")]
    pub fight_deadline: Duration,
}

impl Default for FightTuning {
    fn default() -> Self {
        Self {
            progress_target: 100.0,
            tension_max: 100.0,
            safe_tension: 70.0,
            base_reel_gain: 34.0,
            base_pull_penalty: 10.0,
            idle_decay_per_sec: 5.0,
            idle_progress_loss: 5.0,
            turn_window: Duration::from_secs(8),
            max_idle_turns: 3,
            fight_deadline: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordTuning {
    /// FishMaster tokens for each record dimension beaten.
    pub tokens_per_record: u32,
}

impl Default for RecordTuning {
    fn default() -> Self {
        Self {
            tokens_per_record: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionTuning,
    pub fight: FightTuning,
    pub records: RecordTuning,
    /// Settings for guilds that have not configured their own clock.
    pub clock: ClockSettings,
    /// Fixes session randomness, for replays and tests.
    pub rng_seed: Option<u64>,
}

impl Config {
    /// Loads the config from `$FISHINGE_CONFIG`, falling back to the platform
    /// config directory. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                info!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("Reading config from {}", path.display());
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_ron(&text)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.clock.validate()?;

        let probability = 0.0..=1.0;
        if !probability.contains(&self.session.base_bite_rate) {
            return Err(ConfigError::Invalid("base bite rate must be within 0 and 1"));
        }
        if !probability.contains(&self.session.base_hook_chance) {
            return Err(ConfigError::Invalid("base hook chance must be within 0 and 1"));
        }
        if self.session.bite_poll.is_zero() {
            return Err(ConfigError::Invalid("bite poll interval must not be zero"));
        }
        if self.fight.turn_window.is_zero() {
            return Err(ConfigError::Invalid("turn window must not be zero"));
        }
        if self.fight.progress_target <= 0.0 {
            return Err(ConfigError::Invalid("progress target must be positive"));
        }
        if self.fight.safe_tension >= self.fight.tension_max {
            return Err(ConfigError::Invalid("safe tension must be below maximum tension"));
        }
        if self.fight.max_idle_turns == 0 {
            return Err(ConfigError::Invalid("at least one idle turn is required"));
        }

        Ok(())
    }
}

fn config_path() -> Option<PathBuf> {
    env::var_os(CONFIG_PATH_VAR).map(PathBuf::from).or_else(|| {
        ProjectDirs::from("com", "Chronophylos", "Fishinge")
            .map(|dirs| dirs.config_dir().join("config.ron"))
    })
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::clock::Hemisphere;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config = Config::from_ron(
            r#"(
                session: (bite_window: "45s", base_bite_rate: 0.3),
                fight: (turn_window: "1m 30s"),
                clock: (timezone: "+02:00", hemisphere: South),
                rng_seed: Some(7),
            )"#,
        )
        .unwrap();

        assert_eq!(config.session.bite_window, Duration::from_secs(45));
        assert_eq!(config.session.hook_window, Duration::from_secs(5));
        assert_eq!(config.fight.turn_window, Duration::from_secs(90));
        assert_eq!(config.clock.hemisphere, Hemisphere::South);
        assert_eq!(config.clock.timezone.to_string(), "+02:00");
        assert_eq!(config.rng_seed, Some(7));
    }

    #[test_case("(fight: (safe_tension: 120.0))" ; "safe tension above max")]
    #[test_case("(fight: (safe_tension: 100.0, tension_max: 100.0))" ; "safe tension at max")]
    #[test_case("(session: (base_hook_chance: 1.5))" ; "hook chance above one")]
    #[test_case(r#"(session: (bite_poll: "0s"))"# ; "zero poll")]
    #[test_case("(fight: (max_idle_turns: 0))" ; "no idle turns")]
    fn rejects_invalid_tuning(text: &str) {
        assert!(matches!(
            Config::from_ron(text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_bad_clock() {
        assert!(matches!(
            Config::from_ron("(clock: (days_per_season: 0))"),
            Err(ConfigError::Clock(ClockError::EmptySeason))
        ));
        assert!(matches!(
            Config::from_ron(r#"(clock: (timezone: "Mars/Olympus"))"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = env::temp_dir().join("fishinge-engine-does-not-exist.ron");

        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn serialized_defaults_parse_back() {
        let text = ron::ser::to_string_pretty(&Config::default(), Default::default()).unwrap();

        assert_eq!(Config::from_ron(&text).unwrap(), Config::default());
    }
}
