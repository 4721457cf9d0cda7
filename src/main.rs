//! # Daylist
//!
//! Curates a "Daily Flow" playlist that follows the time of day: calm in the
//! morning, brighter at noon, winding down at night, shaped by what you
//! actually listen to at those hours.
//!
//! ## Usage
//!
//! ```bash
//! # Import a library export
//! daylist init ~/exports/library.json
//!
//! # Preview the flow for right now
//! daylist run --dry-run
//!
//! # Keep it fresh once a day in the background
//! daylist daemon start
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser};
use daylist::catalog::MediaServer;
use daylist::cli::{self, DaemonAction};
use daylist::config::Config;
use daylist::cycle::{run_cycle, CycleReport, JobResult};
use daylist::db::{CatalogExport, LibraryDb};
use daylist::engine::{FlowGenerator, FlowPlaylist};
use daylist::picks::run_pick_job;
use daylist::retry::{RetryPolicy, Retrying};
use daylist::scheduler::{self, PidFile, Scheduler};
use daylist::{completion, config::PickListJob};
use log::{debug, error, info};
use std::io;
use std::process;
use std::thread;
use std::time::Duration;

/// Load the configuration file and apply command-line overrides
fn load_config(global: &cli::GlobalArgs) -> Result<Config> {
    let mut config = Config::load(global.config.as_deref())?;
    global.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Open the catalog with the configured retry policy
fn open_server(config: &Config) -> Result<Retrying<LibraryDb>> {
    let path = config.database_path()?;
    let db = LibraryDb::open(&path)?;
    Ok(Retrying::new(db, RetryPolicy::from(&config.retry)))
}

fn print_flow(flow: &FlowPlaylist) {
    println!("{} | {} ({} tracks)", flow.name, flow.description(), flow.tracks.len());
    if !flow.learned_moods.is_empty() || !flow.learned_styles.is_empty() {
        println!(
            "Learned from history: moods {:?}, styles {:?}",
            flow.learned_moods, flow.learned_styles
        );
    }
    for (i, track) in flow.tracks.iter().enumerate() {
        let rating = track
            .rating
            .map(|r| format!("{r:.1}★"))
            .unwrap_or_else(|| "unrated".to_string());
        println!("{:>3}. {track} [{rating}]", i + 1);
    }
}

fn print_report(report: &CycleReport) {
    for job in &report.jobs {
        match &job.result {
            JobResult::Stored(publication) => println!("✓ {}: {publication:?}", job.name),
            JobResult::Failed { error } => println!("✗ {}: {error}", job.name),
        }
    }
}

/// One cycle over every job; Ok only if every job succeeded
fn cycle_once<M: MediaServer + ?Sized>(
    server: &M,
    config: &Config,
    generator: &mut FlowGenerator<'_>,
    now: DateTime<Utc>,
    json: bool,
) -> Result<()> {
    let report = run_cycle(server, config, generator, now);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    if !report.is_success() {
        anyhow::bail!("{} of {} jobs failed", report.failures(), report.jobs.len());
    }
    Ok(())
}

/// The schedule loop used by both `schedule` and the daemon
fn run_schedule(config: &Config) -> Result<()> {
    scheduler::install_signal_handlers()?;
    let server = open_server(config)?;
    let mut generator = FlowGenerator::new(config)?;

    let runs = Scheduler::from_minutes(config.run_interval_minutes).run(scheduler::shutdown_flag(), |n| {
        debug!("Starting cycle {}", n + 1);
        let report = run_cycle(&server, config, &mut generator, Utc::now());
        print_report(&report);
    });
    info!("Scheduler finished after {runs} cycles");
    Ok(())
}

fn start_daemon(config: &Config) -> Result<()> {
    let pid_file = PidFile::for_daemon()?;
    if pid_file.is_running()? {
        eprintln!("Daemon is already running");
        return Ok(());
    }

    // SAFETY: no threads have been spawned yet, so fork leaves a consistent child
    match unsafe { libc::fork() } {
        0 => {
            // Child process - detach and run the schedule
            // SAFETY: plain syscall, the child has no controlling state to lose
            unsafe { libc::setsid() };
            pid_file.write_current()?;
            let outcome = run_schedule(config);
            pid_file.remove();
            if let Err(e) = outcome {
                error!("Daemon stopped with an error: {e:#}");
                process::exit(1);
            }
            process::exit(0);
        }
        pid if pid > 0 => {
            println!("Starting daylist daemon...");
            thread::sleep(Duration::from_millis(500));

            if pid_file.is_running()? {
                println!("Daemon started successfully (PID {pid})");
            } else {
                eprintln!("Failed to start daemon");
            }
        }
        _ => {
            eprintln!("Failed to fork process");
        }
    }
    Ok(())
}

/// Main entry point for the Daylist application.
///
/// Initializes logging, parses command-line arguments, and routes commands
/// to the appropriate module functions.
///
/// # Logging
///
/// Controlled via `RUST_LOG` (default `info`):
/// - `RUST_LOG=debug daylist run --dry-run` - Every stage decision
/// - `RUST_LOG=daylist::compose=trace daylist run` - Module-specific logging
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Init { export, force } => {
            let config = load_config(&args.global)?;
            let path = config.database_path()?;
            info!("Importing {} into {}", export.display(), path.display());

            let export = CatalogExport::load(&export)?;
            let db = LibraryDb::init(&path, &export, force)?;
            let stats = db.stats()?;
            println!(
                "Catalog ready at {}: {} tracks, {} similarity edges, {} plays",
                path.display(),
                stats.tracks,
                stats.similarity_edges,
                stats.plays
            );
        }
        cli::Command::Run { dry_run, at, seed, json } => {
            let config = load_config(&args.global)?;
            let server = open_server(&config)?;
            let now = at.unwrap_or_else(Utc::now);

            let mut generator = FlowGenerator::new(&config)?;
            if let Some(seed) = seed {
                generator = generator.with_seed(seed);
            }

            if dry_run {
                let flow = generator.generate(&server, now);
                if json {
                    println!("{}", serde_json::to_string_pretty(&flow)?);
                } else {
                    print_flow(&flow);
                }
            } else {
                cycle_once(&server, &config, &mut generator, now, json)?;
            }
        }
        cli::Command::Period { at, all } => {
            let config = load_config(&args.global)?;
            let schedule = config.schedule()?;
            let tz = config.time_zone()?;
            let now = at.unwrap_or_else(Utc::now).with_timezone(&tz);
            let active = schedule.resolve_at(&now);

            println!("{} at {} ({})", active.name(), now.format("%H:%M"), tz.name());
            println!("  hours:  {:?}", active.active_hours);
            println!("  moods:  {}", active.definition.base.moods.join(", "));
            println!("  styles: {}", active.definition.base.styles.join(", "));

            if all {
                println!();
                for period in schedule.periods() {
                    let marker = if period.name == active.name() { "*" } else { " " };
                    println!("{marker} {:02}:00  {}", period.start_hour, period.name);
                }
            }
        }
        cli::Command::Picks { name, file, size } => {
            let config = load_config(&args.global)?;
            let server = open_server(&config)?;
            let job = PickListJob { name, path: file, size };
            let publication = run_pick_job(&server, &job)?;
            println!("{}: {publication:?}", job.name);
        }
        cli::Command::Schedule => {
            let config = load_config(&args.global)?;
            run_schedule(&config)?;
        }
        cli::Command::Daemon { action } => match action {
            DaemonAction::Start => {
                let config = load_config(&args.global)?;
                start_daemon(&config)?;
            }
            DaemonAction::Stop => {
                PidFile::for_daemon()?.stop()?;
                println!("Daemon stopped");
            }
            DaemonAction::Status => {
                if PidFile::for_daemon()?.is_running()? {
                    println!("Daemon is running");
                } else {
                    println!("Daemon is not running");
                }
            }
        },
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(
                completion::shell_to_completion_shell(shell),
                &mut cmd,
                &mut io::stdout(),
            );
        }
    }

    Ok(())
}
