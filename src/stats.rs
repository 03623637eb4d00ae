//! Cumulative measurement statistics.
//!
//! Counts sessions and their outcomes across runs of the agent, without
//! storing any signal data. Updated from listener callbacks by the CLI; the
//! session core itself never touches this.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Atomics-based statistics for the current process, optionally persisted.
#[derive(Debug)]
pub struct StatsLog {
    sessions_started: AtomicU64,
    sessions_succeeded: AtomicU64,
    sessions_lead_off: AtomicU64,
    sessions_cancelled: AtomicU64,
    samples_collected: AtomicU64,
    lead_off_warnings: AtomicU64,
    process_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl StatsLog {
    pub fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            sessions_succeeded: AtomicU64::new(0),
            sessions_lead_off: AtomicU64::new(0),
            sessions_cancelled: AtomicU64::new(0),
            samples_collected: AtomicU64::new(0),
            lead_off_warnings: AtomicU64::new(0),
            process_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a stats log that loads from and saves to the given file.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::debug!(error = %e, "no previous stats loaded");
        }

        log
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_succeeded(&self) {
        self.sessions_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_lead_off(&self) {
        self.sessions_lead_off.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_cancelled(&self) {
        self.sessions_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_samples_collected(&self, count: u64) {
        self.samples_collected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_lead_off_warning(&self) {
        self.lead_off_warnings.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_succeeded: self.sessions_succeeded.load(Ordering::Relaxed),
            sessions_lead_off: self.sessions_lead_off.load(Ordering::Relaxed),
            sessions_cancelled: self.sessions_cancelled.load(Ordering::Relaxed),
            samples_collected: self.samples_collected.load(Ordering::Relaxed),
            lead_off_warnings: self.lead_off_warnings.load(Ordering::Relaxed),
            process_start: self.process_start,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Measurement Statistics:\n\
             - Sessions started: {}\n\
             - Completed successfully: {}\n\
             - Aborted on lead-off: {}\n\
             - Cancelled: {}\n\
             - Samples collected: {}\n\
             - Lead-off warnings: {}",
            stats.sessions_started,
            stats.sessions_succeeded,
            stats.sessions_lead_off,
            stats.sessions_cancelled,
            stats.samples_collected,
            stats.lead_off_warnings
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                sessions_started: stats.sessions_started,
                sessions_succeeded: stats.sessions_succeeded,
                sessions_lead_off: stats.sessions_lead_off,
                sessions_cancelled: stats.sessions_cancelled,
                samples_collected: stats.samples_collected,
                lead_off_warnings: stats.lead_off_warnings,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk, adding persisted counts onto the counters.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.sessions_started
                    .store(persisted.sessions_started, Ordering::Relaxed);
                self.sessions_succeeded
                    .store(persisted.sessions_succeeded, Ordering::Relaxed);
                self.sessions_lead_off
                    .store(persisted.sessions_lead_off, Ordering::Relaxed);
                self.sessions_cancelled
                    .store(persisted.sessions_cancelled, Ordering::Relaxed);
                self.samples_collected
                    .store(persisted.samples_collected, Ordering::Relaxed);
                self.lead_off_warnings
                    .store(persisted.lead_off_warnings, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for StatsLog {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of the statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub sessions_started: u64,
    pub sessions_succeeded: u64,
    pub sessions_lead_off: u64,
    pub sessions_cancelled: u64,
    pub samples_collected: u64,
    pub lead_off_warnings: u64,
    pub process_start: DateTime<Utc>,
}

/// Shape written to disk.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    sessions_started: u64,
    sessions_succeeded: u64,
    sessions_lead_off: u64,
    sessions_cancelled: u64,
    samples_collected: u64,
    lead_off_warnings: u64,
    last_updated: DateTime<Utc>,
}

/// Shared stats log for use across threads.
pub type SharedStatsLog = Arc<StatsLog>;

/// Create a shared stats log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedStatsLog {
    Arc::new(StatsLog::with_persistence(path))
}
