pub mod slurm;


use crate::shell::ShellError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use slurm::SlurmScheduler;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler rejected {script}: {reason}")]
    Rejected { script: PathBuf, reason: String },
    #[error("Unexpected scheduler reply: {0}")]
    Reply(String),
    #[error("Failed to reach the scheduler")]
    Shell(#[from] ShellError),
}

/// Result of handing a run script to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: String,
    /// the exact command used, written to `submit.sh` for manual replay
    pub command: String,
}

/// One line of the scheduler queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueRow {
    pub directory: PathBuf,
    pub id: String,
    pub state_code: String,
    pub state_name: String,
}

impl QueueRow {
    /// states in which a job must not be submitted again
    pub fn is_active(&self) -> bool {
        matches!(
            self.state_name.as_str(),
            "COMPLETING" | "CONFIGURING" | "PENDING" | "RUNNING"
        )
    }
}

/// Interval between two queue polls, never below [`PollInterval::FLOOR`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval(Duration);

impl PollInterval {
    /// going lower than this hammers a shared scheduler
    pub const FLOOR: Duration = Duration::from_secs(1);

    pub fn new(interval: Duration) -> Self {
        if interval < Self::FLOOR {
            warn!(
                requested = ?interval,
                floor = ?Self::FLOOR,
                "Poll interval is below the floor, clamping"
            );
            Self(Self::FLOOR)
        } else {
            Self(interval)
        }
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(Duration::from_secs(3))
    }
}

/// Flat, ordered map of scheduler submission flags.
///
/// Keys are stored without leading dashes and with `_` in place of `-`, so
/// `--kill-on-invalid-dep` and `kill_on_invalid_dep` are the same option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchOptions(IndexMap<String, String>);

fn normalize(key: &str) -> String {
    key.trim_start_matches('-').replace('-', "_")
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.0.insert(normalize(key), value.into());
        self
    }

    /// insert only when the key is absent, returns whether it was inserted
    pub fn set_default(&mut self, key: &str, value: impl Into<String>) -> bool {
        let key = normalize(key);

        if self.0.contains_key(&key) {
            false
        } else {
            self.0.insert(key, value.into());
            true
        }
    }

    /// set-default every entry of `defaults`, explicit values always win
    pub fn merge_defaults(&mut self, defaults: &BatchOptions) {
        for (key, value) in defaults.iter() {
            self.set_default(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&normalize(key)).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(&normalize(key))
    }

    /// whether any spelling of an option (e.g. `D` / `chdir`) is present
    pub fn contains_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.contains(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(&normalize(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Start after job `id` finishes in any terminal state.
    ///
    /// Repeated calls accumulate into a single `afterany:<a>:<b>` directive,
    /// and the job is cancelled by the scheduler if a dependency can never
    /// be satisfied.
    pub fn add_dependency(&mut self, id: &str) {
        let directive = match self.0.get("dependency") {
            Some(existing) if existing.split(&[':', ','][..]).any(|part| part == id) => {
                existing.clone()
            }
            Some(existing) if existing.starts_with("afterany:") && !existing.contains(',') => {
                format!("{existing}:{id}")
            }
            Some(existing) => format!("{existing},afterany:{id}"),
            None => format!("afterany:{id}"),
        };

        self.0.insert(String::from("dependency"), directive);
        self.0
            .insert(String::from("kill_on_invalid_dep"), String::from("yes"));
    }

    /// command line arguments in the scheduler's flag syntax
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.0.len());

        for (key, value) in self.0.iter() {
            if key.chars().count() == 1 {
                args.push(format!("-{key}"));
                if !value.is_empty() {
                    args.push(value.clone());
                }
            } else if value.is_empty() {
                args.push(format!("--{}", key.replace('_', "-")));
            } else {
                args.push(format!("--{}={value}", key.replace('_', "-")));
            }
        }

        args
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for BatchOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = BatchOptions::new();

        for (key, value) in iter {
            options.set(key.as_ref(), value);
        }

        options
    }
}

/// A cluster batch scheduler.
///
/// The orchestration layer only ever talks to the scheduler through these
/// calls, so swapping Slurm for something else means one new implementation.
pub trait BatchScheduler: Debug + Send + Sync {
    /// whether the scheduler binaries are reachable at all
    fn has_scheduler(&self) -> bool;

    fn submit(&self, script: &Path, options: &BatchOptions) -> Result<Submission, SchedulerError>;

    fn queue_snapshot(&self) -> Result<Vec<QueueRow>, SchedulerError>;

    /// queue row of the job running in `workdir`, if any
    fn workdir_info(&self, workdir: &Path) -> Result<Option<QueueRow>, SchedulerError> {
        Ok(self
            .queue_snapshot()?
            .into_iter()
            .find(|row| row.directory == workdir))
    }

    fn is_queued(&self, id: &str) -> Result<bool, SchedulerError> {
        Ok(self.queue_snapshot()?.iter().any(|row| row.id == id))
    }

    /// block until `id` has left the queue
    fn wait(&self, id: &str, interval: PollInterval) -> Result<(), SchedulerError> {
        info!(id = id, interval = ?interval.duration(), "Waiting for scheduler job");

        while self.is_queued(id)? {
            debug!(id = id, "Job still queued");
            thread::sleep(interval.duration());
        }

        info!(id = id, "Scheduler job left the queue");

        Ok(())
    }
}
