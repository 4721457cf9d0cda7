//! # Configuration Module
//!
//! This module handles configuration loading and data directory setup for Daylist.
//! Configuration is read once at startup into an immutable [`Config`] and passed
//! by reference to everything that needs it.
//!
//! ## Data Storage
//!
//! Daylist stores its local catalog database in the platform-standard data directory:
//! - Linux: `~/.local/share/daylist/`
//! - macOS: `~/Library/Application Support/daylist/`
//! - Windows: `%APPDATA%\daylist\`
//!
//! ## Configuration File
//!
//! An optional JSON file (default `<config_dir>/daylist/config.json`). Every key is
//! optional; missing keys fall back to the defaults below.
//!
//! ```json
//! {
//!   "timezone": "Europe/Berlin",
//!   "playlist_target_size": 40,
//!   "filters": { "min_rating_stars": 3.5, "exclude_played_days": 3 },
//!   "period_overrides": { "Morning": { "moods": ["Sunny"], "styles": ["Bossa Nova"] } }
//! }
//! ```

use crate::period::{PeriodDefinition, Schedule, VibeCriteria, DEFAULT_PERIODS};
use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use log::{debug, info};
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Returns the platform-appropriate data directory for Daylist, creating it if needed.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The daylist subdirectory cannot be created due to permissions
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        ))?;

    let daylist_dir = data_dir.join("daylist");
    fs::create_dir_all(&daylist_dir)
        .with_context(|| format!(
            "Failed to create Daylist data directory at {}. Please check file permissions.",
            daylist_dir.display()
        ))?;

    Ok(daylist_dir)
}

/// Returns the platform-appropriate catalog database path (`catalog.db`).
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("catalog.db"))
}

/// Returns the default configuration file location. The file itself may not exist.
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine system configuration directory"))?;
    Ok(config_dir.join("daylist").join("config.json"))
}

/// Rating, recency and skip rules shared by both filter modes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Minimum star rating (0-5); 0 disables the rating rule
    pub min_rating_stars: f64,
    /// Tracks played within this many days are excluded; 0 disables the rule
    pub exclude_played_days: u32,
    /// Tracks skipped more often than this are excluded
    pub max_skip_count: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_rating_stars: 3.0,
            exclude_played_days: 2,
            max_skip_count: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SonicExpansionConfig {
    pub enabled: bool,
    pub seed_count: usize,
    pub per_seed_count: usize,
    pub max_distance: f64,
    /// Share of the missing slots sonic expansion may fill before discovery padding
    pub mix_ratio: f64,
}

impl Default for SonicExpansionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed_count: 5,
            per_seed_count: 10,
            max_distance: 0.35,
            mix_ratio: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SonicAdventureConfig {
    pub enabled: bool,
}

impl Default for SonicAdventureConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SonicSortConfig {
    pub enabled: bool,
    pub similarity_limit: usize,
    pub max_distance: f64,
}

impl Default for SonicSortConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_limit: 25,
            max_distance: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VibeLearningConfig {
    pub enabled: bool,
    pub lookback_days: u32,
    pub top_n_moods: usize,
    pub top_m_styles: usize,
    pub min_occurrences: usize,
}

impl Default for VibeLearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback_days: 30,
            top_n_moods: 3,
            top_m_styles: 2,
            min_occurrences: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub lookback_days: u32,
    pub min_plays: u32,
    /// Minimum star rating for familiar anchors; 0 keeps unrated favourites
    pub min_rating: f64,
    pub target_count: usize,
    pub max_results: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback_days: 60,
            min_plays: 2,
            min_rating: 0.0,
            target_count: 10,
            max_results: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// A playlist built from an exported `[{artist, title}]` pick list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickListJob {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_pick_list_size")]
    pub size: usize,
}

fn default_pick_list_size() -> usize {
    30
}

/// Complete runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local catalog database; defaults to [`get_db_path`]
    pub database: Option<PathBuf>,
    /// IANA timezone name used to decide the current period
    pub timezone: String,
    pub playlist_name: String,
    pub playlist_target_size: usize,
    /// Catalog libraries to search; empty searches all of them
    pub libraries: Vec<String>,
    /// Full schedule replacement; `None` uses the built-in periods
    pub periods: Option<Vec<PeriodDefinition>>,
    /// Per-period `{moods, styles}` replacing a period's base vibe
    pub period_overrides: BTreeMap<String, VibeCriteria>,
    pub filters: FilterConfig,
    pub vibe_anchor_count: usize,
    pub search_limit: usize,
    pub padding_search_limit: usize,
    pub max_tracks_per_artist: usize,
    /// Pause between consecutive similarity requests
    pub similarity_delay_ms: u64,
    pub sonic_expansion: SonicExpansionConfig,
    pub sonic_adventure: SonicAdventureConfig,
    pub sonic_sort: SonicSortConfig,
    pub vibe_learning: VibeLearningConfig,
    pub history: HistoryConfig,
    pub retry: RetryConfig,
    /// Minutes between scheduled cycles; 0 or less runs once
    pub run_interval_minutes: i64,
    pub pick_lists: Vec<PickListJob>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            timezone: "UTC".to_string(),
            playlist_name: "Daily Flow".to_string(),
            playlist_target_size: 40,
            libraries: Vec::new(),
            periods: None,
            period_overrides: BTreeMap::new(),
            filters: FilterConfig::default(),
            vibe_anchor_count: 10,
            search_limit: 150,
            padding_search_limit: 500,
            max_tracks_per_artist: 2,
            similarity_delay_ms: 100,
            sonic_expansion: SonicExpansionConfig::default(),
            sonic_adventure: SonicAdventureConfig::default(),
            sonic_sort: SonicSortConfig::default(),
            vibe_learning: VibeLearningConfig::default(),
            history: HistoryConfig::default(),
            retry: RetryConfig::default(),
            run_interval_minutes: 1440,
            pick_lists: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist. A missing default file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or is not valid JSON for [`Config`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (get_config_path()?, false),
        };

        if !path.exists() {
            if explicit {
                bail!("Configuration file not found: {}", path.display());
            }
            debug!("No configuration file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        // Relative database paths are relative to the config file
        if let (Some(db), Some(dir)) = (config.database.as_ref(), path.parent()) {
            if db.is_relative() {
                config.database = Some(dir.join(db));
            }
        }

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Resolved absolute path of the catalog database
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(path
                .absolutize()
                .with_context(|| format!("Invalid database path: {}", path.display()))?
                .into_owned()),
            None => get_db_path(),
        }
    }

    /// Parsed timezone
    ///
    /// # Errors
    ///
    /// Returns an error for names unknown to the IANA database.
    pub fn time_zone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Unknown timezone '{}': {e}", self.timezone))
    }

    /// Build the day schedule, applying per-period vibe overrides.
    ///
    /// # Errors
    ///
    /// Fails for malformed schedules and for overrides naming unknown periods.
    pub fn schedule(&self) -> Result<Schedule> {
        let mut periods = self
            .periods
            .clone()
            .unwrap_or_else(|| DEFAULT_PERIODS.clone());

        for (name, vibe) in &self.period_overrides {
            let period = periods
                .iter_mut()
                .find(|p| &p.name == name)
                .ok_or_else(|| anyhow!("Override given for unknown period '{name}'"))?;
            period.base = vibe.clone();
        }

        Schedule::new(periods).context("Invalid period schedule")
    }

    /// Check every setting that would otherwise fail halfway through a run.
    pub fn validate(&self) -> Result<()> {
        self.time_zone()?;
        self.schedule()?;

        if self.playlist_name.trim().is_empty() {
            bail!("playlist_name cannot be empty");
        }
        if !(0.0..=5.0).contains(&self.filters.min_rating_stars) {
            bail!("filters.min_rating_stars must be between 0 and 5");
        }
        if !(0.0..=5.0).contains(&self.history.min_rating) {
            bail!("history.min_rating must be between 0 and 5");
        }
        if !(0.0..=1.0).contains(&self.sonic_expansion.mix_ratio) {
            bail!("sonic_expansion.mix_ratio must be between 0 and 1");
        }
        if self.max_tracks_per_artist == 0 {
            bail!("max_tracks_per_artist must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        for job in &self.pick_lists {
            if job.name.trim().is_empty() {
                bail!("Pick list jobs need a playlist name");
            }
        }

        Ok(())
    }
}
