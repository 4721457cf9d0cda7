//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for Daylist using Clap derive macros.
//!
//! ## Commands
//!
//! - `init`: Import a catalog export into the local database
//! - `run`: Generate the flow for the current period and store it
//! - `period`: Show which period is active
//! - `picks`: Store a playlist built from an exported pick list
//! - `schedule`: Run in the foreground, once per configured interval
//! - `daemon`: Run the schedule in the background
//!
//! ## Examples
//!
//! ```bash
//! daylist init ~/exports/library.json
//! daylist run --dry-run
//! daylist run --at 2026-10-17T07:30:00+02:00 --seed 42 --json
//! DAYLIST_TIMEZONE=Europe/Berlin daylist period
//! ```

use crate::config::Config;
use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "daylist")]
#[command(about = "Daylist: time-of-day aware flow playlists from your own library")]
#[command(version)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command. Each one overrides the configuration file.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file (JSON)
    #[arg(long, global = true, env = "DAYLIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Catalog database file
    #[arg(long, global = true, env = "DAYLIST_DB")]
    pub db: Option<PathBuf>,

    /// IANA timezone used to pick the period, e.g. `Europe/Berlin`
    #[arg(long, global = true, env = "DAYLIST_TIMEZONE")]
    pub timezone: Option<String>,

    /// Number of tracks in the generated flow
    #[arg(long, global = true, env = "DAYLIST_TARGET_SIZE")]
    pub target_size: Option<usize>,
}

impl GlobalArgs {
    /// Apply command-line and environment overrides on top of `config`
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(db) = &self.db {
            config.database = Some(db.clone());
        }
        if let Some(timezone) = &self.timezone {
            config.timezone = timezone.clone();
        }
        if let Some(size) = self.target_size {
            config.playlist_target_size = size;
        }
    }
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import a catalog export into the local database
    ///
    /// The export is a JSON document with `tracks`, `similarity` edges and
    /// `plays`. See the `db` module documentation for the format.
    Init {
        /// Path to the JSON export
        export: PathBuf,

        /// Replace an existing database
        #[arg(long)]
        force: bool,
    },

    /// Generate the flow for the current period and store it
    ///
    /// Also runs every configured pick list job unless `--dry-run` is given.
    Run {
        /// Print the flow without storing anything
        #[arg(long)]
        dry_run: bool,

        /// Generate as if it were this time (RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,

        /// Seed the random choices for a reproducible flow
        #[arg(long)]
        seed: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the active period, its hours and its vibe
    Period {
        /// Resolve this time instead of now (RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,

        /// List the whole day schedule
        #[arg(long)]
        all: bool,
    },

    /// Store a playlist built from an exported `[{artist, title}]` pick list
    Picks {
        /// Playlist name
        name: String,

        /// Pick list file (JSON)
        file: PathBuf,

        /// Maximum number of tracks
        #[arg(long, default_value_t = 30)]
        size: usize,
    },

    /// Run now, then once per `run_interval_minutes`, until interrupted
    Schedule,

    /// Manage the background scheduler
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Daemon management actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonAction {
    /// Start the scheduler in the background
    Start,

    /// Stop the running daemon
    Stop,

    /// Check daemon status
    Status,
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp like 2026-10-17T07:30:00+02:00 ({e})"))
}
