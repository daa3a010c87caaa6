//! Scheduling parameters.
//!
//! [`DeckConfig`] is shared by every normal deck that points at it.
//! [`CollectionState`] holds the collection-wide settings and bookkeeping.
//! Both are stored as JSON and fill missing fields with defaults.

use serde::{Deserialize, Serialize};

use crate::deck::{ConfigId, DeckId};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewCardOrder {
    #[default]
    Due,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeechAction {
    Suspend,
    #[default]
    TagOnly,
}

/// Where new cards go relative to reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewSpread {
    #[default]
    Distribute,
    Last,
    First,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConfig {
    /// Learning steps in minutes.
    #[serde(default = "default_new_delays")]
    pub delays: Vec<f64>,
    /// Graduating interval for Good and Easy, in days.
    #[serde(default = "default_new_intervals")]
    pub intervals: [u32; 2],
    #[serde(default = "default_initial_factor")]
    pub initial_factor: u32,
    #[serde(default = "default_new_per_day")]
    pub per_day: u32,
    #[serde(default)]
    pub order: NewCardOrder,
    /// Bury siblings of an answered new card.
    #[serde(default)]
    pub bury: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_rev_per_day")]
    pub per_day: u32,
    #[serde(default = "default_ease4")]
    pub ease4: f64,
    #[serde(default = "default_one")]
    pub interval_factor: f64,
    #[serde(default = "default_hard_factor")]
    pub hard_factor: f64,
    #[serde(default = "default_max_interval")]
    pub max_interval: u32,
    #[serde(default)]
    pub bury: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapseConfig {
    /// Relearning steps in minutes.
    #[serde(default = "default_lapse_delays")]
    pub delays: Vec<f64>,
    /// Fraction of the old interval kept after a lapse.
    #[serde(default)]
    pub mult: f64,
    #[serde(default = "default_min_interval")]
    pub min_interval: u32,
    #[serde(default = "default_leech_threshold")]
    pub leech_threshold: u32,
    #[serde(default)]
    pub leech_action: LeechAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckConfig {
    pub id: ConfigId,
    #[serde(default = "default_config_name")]
    pub name: String,
    #[serde(default)]
    pub new: NewConfig,
    #[serde(default)]
    pub rev: ReviewConfig,
    #[serde(default)]
    pub lapse: LapseConfig,
    /// Recorded answer time is capped at this many seconds.
    #[serde(default = "default_max_taken_secs")]
    pub max_taken_secs: u32,
}

fn default_new_delays() -> Vec<f64> {
    vec![1.0, 10.0]
}
fn default_new_intervals() -> [u32; 2] {
    [1, 4]
}
fn default_initial_factor() -> u32 {
    2500
}
fn default_new_per_day() -> u32 {
    20
}
fn default_rev_per_day() -> u32 {
    200
}
fn default_ease4() -> f64 {
    1.3
}
fn default_one() -> f64 {
    1.0
}
fn default_hard_factor() -> f64 {
    1.2
}
fn default_max_interval() -> u32 {
    36_500
}
fn default_lapse_delays() -> Vec<f64> {
    vec![10.0]
}
fn default_min_interval() -> u32 {
    1
}
fn default_leech_threshold() -> u32 {
    8
}
fn default_config_name() -> String {
    "Default".into()
}
fn default_max_taken_secs() -> u32 {
    60
}

impl Default for NewConfig {
    fn default() -> Self {
        Self {
            delays: default_new_delays(),
            intervals: default_new_intervals(),
            initial_factor: default_initial_factor(),
            per_day: default_new_per_day(),
            order: NewCardOrder::default(),
            bury: false,
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            per_day: default_rev_per_day(),
            ease4: default_ease4(),
            interval_factor: default_one(),
            hard_factor: default_hard_factor(),
            max_interval: default_max_interval(),
            bury: false,
        }
    }
}

impl Default for LapseConfig {
    fn default() -> Self {
        Self {
            delays: default_lapse_delays(),
            mult: 0.0,
            min_interval: default_min_interval(),
            leech_threshold: default_leech_threshold(),
            leech_action: LeechAction::default(),
        }
    }
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self::with_id(ConfigId::DEFAULT)
    }
}

impl DeckConfig {
    pub fn with_id(id: ConfigId) -> Self {
        Self {
            id,
            name: default_config_name(),
            new: NewConfig::default(),
            rev: ReviewConfig::default(),
            lapse: LapseConfig::default(),
            max_taken_secs: default_max_taken_secs(),
        }
    }

    /// Parse a config written as TOML. Missing keys take their defaults and
    /// the result always carries `id`.
    ///
    /// # Errors
    /// Returns a TOML error for malformed input and a config error when a
    /// value fails [`validate`](Self::validate).
    pub fn from_toml_str(id: ConfigId, input: &str) -> crate::error::Result<Self> {
        let mut table: toml::Table = input.parse()?;
        table.insert("id".into(), toml::Value::Integer(id.0));
        let conf: DeckConfig = table.try_into()?;
        conf.validate()?;
        Ok(conf)
    }

    /// Reject values the scheduler cannot work with.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_delays("new.delays", &self.new.delays)?;
        check_delays("lapse.delays", &self.lapse.delays)?;
        if self.new.intervals.contains(&0) {
            return Err(invalid("new.intervals", "graduating intervals must be at least 1 day"));
        }
        if self.new.initial_factor < 1300 {
            return Err(invalid("new.initial_factor", "must be at least 1300"));
        }
        if !(self.rev.ease4.is_finite() && self.rev.ease4 >= 1.0) {
            return Err(invalid("rev.ease4", "must be at least 1.0"));
        }
        if !(self.rev.interval_factor.is_finite() && self.rev.interval_factor > 0.0) {
            return Err(invalid("rev.interval_factor", "must be positive"));
        }
        if !(self.rev.hard_factor.is_finite() && self.rev.hard_factor > 0.0) {
            return Err(invalid("rev.hard_factor", "must be positive"));
        }
        if self.rev.max_interval == 0 {
            return Err(invalid("rev.max_interval", "must be at least 1 day"));
        }
        if !(0.0..=1.0).contains(&self.lapse.mult) {
            return Err(invalid("lapse.mult", "must be between 0 and 1"));
        }
        if self.lapse.min_interval == 0 {
            return Err(invalid("lapse.min_interval", "must be at least 1 day"));
        }
        if self.lapse.leech_threshold == 0 {
            return Err(invalid("lapse.leech_threshold", "must be at least 1"));
        }
        Ok(())
    }
}

fn check_delays(key: &str, delays: &[f64]) -> Result<(), ConfigError> {
    if delays.iter().any(|d| !d.is_finite() || *d < 0.0) {
        return Err(invalid(key, "steps must be non-negative minutes"));
    }
    Ok(())
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        message: message.into(),
    }
}

/// Collection-wide settings and bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionState {
    /// Creation time, unix seconds. Day numbers count from here.
    pub crt: i64,
    /// Hour (UTC) at which a new day starts.
    #[serde(default = "default_rollover_hour")]
    pub rollover_hour: u8,
    /// Learning cards due within this many seconds may be shown early.
    #[serde(default = "default_collapse_time_secs")]
    pub collapse_time_secs: i64,
    #[serde(default)]
    pub new_spread: NewSpread,
    /// Show day-learning cards before reviews.
    #[serde(default)]
    pub day_learn_first: bool,
    /// Last day buried cards were released.
    #[serde(default)]
    pub last_unburied: i32,
    #[serde(default = "default_current_deck")]
    pub current_deck: DeckId,
}

fn default_rollover_hour() -> u8 {
    4
}
fn default_collapse_time_secs() -> i64 {
    1200
}
fn default_current_deck() -> DeckId {
    DeckId::DEFAULT
}

impl CollectionState {
    pub fn new(crt: i64) -> Self {
        Self {
            crt,
            rollover_hour: default_rollover_hour(),
            collapse_time_secs: default_collapse_time_secs(),
            new_spread: NewSpread::default(),
            day_learn_first: false,
            last_unburied: 0,
            current_deck: default_current_deck(),
        }
    }
}
