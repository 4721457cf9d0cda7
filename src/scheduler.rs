//! # Scheduling and Background Daemon
//!
//! `daylist schedule` runs a cycle immediately and then once per
//! `run_interval_minutes`, until SIGINT or SIGTERM arrives. A signal never
//! interrupts a running cycle; it is observed between cycles and while waiting.
//!
//! `daylist daemon start` forks the same loop into the background and records
//! its PID in the data directory, where `daemon status` and `daemon stop` find it.

use crate::config;
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Flag set by the SIGINT/SIGTERM handlers
pub fn shutdown_flag() -> &'static AtomicBool {
    &SHUTDOWN
}

/// Route SIGINT and SIGTERM to [`shutdown_flag`]
pub fn install_signal_handlers() -> Result<()> {
    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe
        let previous = unsafe { libc::signal(signal, on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            bail!("Failed to install handler for signal {signal}");
        }
    }
    debug!("Signal handlers installed");
    Ok(())
}

/// Runs cycles at a fixed interval
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Option<Duration>,
    poll: Duration,
}

impl Scheduler {
    /// Zero or negative minutes mean a single run
    pub fn from_minutes(minutes: i64) -> Self {
        let interval = u64::try_from(minutes)
            .ok()
            .filter(|m| *m > 0)
            .map(|m| Duration::from_secs(m * 60));
        Self::with_interval(interval)
    }

    pub fn with_interval(interval: Option<Duration>) -> Self {
        Self {
            interval,
            poll: Duration::from_millis(500),
        }
    }

    /// How often the shutdown flag is checked while waiting
    #[must_use]
    pub fn poll_every(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Run `cycle` now and then on every interval until `shutdown` is set.
    /// Returns the number of cycles run.
    pub fn run<F: FnMut(usize)>(&self, shutdown: &AtomicBool, mut cycle: F) -> usize {
        let mut runs = 0;

        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping scheduler");
                break;
            }

            cycle(runs);
            runs += 1;

            let Some(interval) = self.interval else {
                debug!("No run interval configured, single run complete");
                break;
            };
            info!("Next run in {} minutes", interval.as_secs() / 60);
            if !self.wait(interval, shutdown) {
                info!("Shutdown requested, stopping scheduler");
                break;
            }
        }

        runs
    }

    /// Sleep for `interval` in small steps. Returns false if shutdown was requested.
    fn wait(&self, interval: Duration, shutdown: &AtomicBool) -> bool {
        let deadline = Instant::now() + interval;
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(self.poll.min(deadline - now));
        }
    }
}

/// PID file of the background daemon
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// The daemon's PID file in the data directory
    pub fn for_daemon() -> Result<Self> {
        Ok(Self::at(config::get_data_dir()?.join("daylist-daemon.pid")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the current process
    pub fn write_current(&self) -> Result<u32> {
        let pid = std::process::id();
        fs::write(&self.path, pid.to_string())
            .with_context(|| format!("Failed to write PID file {}", self.path.display()))?;
        Ok(pid)
    }

    pub fn read(&self) -> Result<Option<u32>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read PID file {}", self.path.display()))?;
        let pid = content.trim().parse().context("Invalid PID in daemon file")?;
        Ok(Some(pid))
    }

    pub fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("Could not remove PID file {}: {e}", self.path.display());
        }
    }

    /// Whether the recorded process is alive. A stale file counts as not running.
    pub fn is_running(&self) -> Result<bool> {
        Ok(self.read()?.is_some_and(process_alive))
    }

    /// Send SIGTERM to the recorded process and remove the file
    pub fn stop(&self) -> Result<u32> {
        let Some(pid) = self.read()? else {
            bail!("Daemon is not running");
        };
        if !process_alive(pid) {
            warn!("Daemon PID {pid} is stale, cleaning up");
            self.remove();
            bail!("Daemon is not running");
        }

        let pid_t = libc::pid_t::try_from(pid).context("PID out of range")?;
        // SAFETY: plain syscall on a PID we just verified
        if unsafe { libc::kill(pid_t, libc::SIGTERM) } != 0 {
            bail!("Failed to stop daemon (PID {pid})");
        }
        self.remove();
        info!("Daemon stopped (PID: {pid})");
        Ok(pid)
    }
}

fn process_alive(pid: u32) -> bool {
    match libc::pid_t::try_from(pid) {
        // SAFETY: signal 0 only checks for existence
        Ok(pid) if pid > 0 => unsafe { libc::kill(pid, 0) == 0 },
        _ => false,
    }
}
