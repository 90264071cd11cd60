use crate::{
    scheduler::{BatchOptions, PollInterval},
    target::{Host, Target},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env,
    fs::{self, File},
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, warn};

pub const CONFIG_ENV: &str = "QCFLOW_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "qcflow.yaml";

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

/// look up a bare program name on `PATH`
fn find_on_path(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return Some(program.to_path_buf());
    }

    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    })
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file {0}")]
    Read(PathBuf, #[source] Error),
    #[error("Config file is not valid")]
    Parse(#[from] serde_yaml::Error),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[source] Error),
    #[error("Target {0} is not defined")]
    UnknownTarget(String),
    #[error("Target {0} is remote but has no root directory")]
    MissingRoot(String),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    // execution targets by name, `local` is used by jobs without explicit targets
    #[serde(default = "default_targets")]
    pub targets: BTreeMap<String, TargetConfig>,
    #[serde(default)]
    pub engines: EnginesConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    // where files for remote targets are written before upload
    #[serde(default = "default_staging")]
    pub staging: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    // seconds between two queue polls while waiting
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    // command used to invoke this tool inside run scripts and on remote hosts
    #[serde(default = "default_cli_command")]
    pub cli_command: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    // ssh host, absent for the local machine
    pub host: Option<String>,
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub batch: IndexMap<String, String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub ssh_options: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct EnginesConfig {
    #[serde(default = "default_orca")]
    pub orca: PathBuf,
    // AMS installation, falls back to $AMSBIN at run time
    pub ams_home: Option<PathBuf>,
    #[serde(default = "default_xtb")]
    pub xtb: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    // seconds before a local run script is killed, unlimited when absent
    pub timeout: Option<u64>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            targets: default_targets(),
            engines: EnginesConfig::default(),
            local: LocalConfig::default(),
            cache: CacheConfig::default(),
            staging: default_staging(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            cli_command: default_cli_command(),
        }
    }
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            orca: default_orca(),
            ams_home: None,
            xtb: default_xtb(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

impl TargetConfig {
    pub fn to_target(&self, name: &str) -> Result<Target, ConfigErrors> {
        let host = match &self.host {
            None => Host::Local,
            Some(host) => Host::Remote {
                host: host.clone(),
                root: self
                    .root
                    .clone()
                    .ok_or_else(|| ConfigErrors::MissingRoot(name.to_owned()))?,
            },
        };

        Ok(Target {
            name: name.to_owned(),
            host,
            batch_defaults: self.batch.iter().collect::<BatchOptions>(),
            ssh_options: self.ssh_options.clone(),
        })
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigErrors> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigErrors::Read(path.to_path_buf(), e))?;

        debug!(path = ?path, "Loaded config");

        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Find the config: explicit path, then `$QCFLOW_CONFIG`, then
    /// `./qcflow.yaml`, then built-in defaults.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, ConfigErrors> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::load(PathBuf::from(path));
        }

        let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            Self::load(fallback)
        } else {
            debug!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn poll_interval(&self) -> PollInterval {
        PollInterval::new(Duration::from_secs(self.scheduler.poll_interval))
    }

    pub fn local_timeout(&self) -> Option<Duration> {
        self.local.timeout.map(Duration::from_secs)
    }

    pub fn target(&self, name: &str) -> Result<(Target, f64), ConfigErrors> {
        let config = self
            .targets
            .get(name)
            .ok_or_else(|| ConfigErrors::UnknownTarget(name.to_owned()))?;

        Ok((config.to_target(name)?, config.weight))
    }

    /// target used by jobs that did not register any
    pub fn default_target(&self) -> Target {
        self.target("local")
            .map(|(target, _)| target)
            .unwrap_or_else(|_| Target::local())
    }

    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.scheduler.cli_command.trim().is_empty() {
            error!("scheduler.cli_command must not be empty, run scripts use it to probe their status");
            contains_error = true;
        }

        if Duration::from_secs(self.scheduler.poll_interval) < PollInterval::FLOOR {
            warn!(
                "scheduler.poll_interval ({}) is below the floor of {:?} and will be clamped",
                self.scheduler.poll_interval,
                PollInterval::FLOOR
            );
        }

        if self.targets.is_empty() {
            error!("No target was defined, define at least `local`");
            contains_error = true;
        } else if !self.targets.contains_key("local") {
            warn!("No `local` target defined, jobs without targets use the built-in local target");
        }

        for (name, target) in self.targets.iter() {
            if target.host.is_some() && target.root.is_none() {
                error!("targets.{name}.root is required for remote targets");
                contains_error = true;
            }

            if target.host.is_none() && target.root.is_some() {
                warn!("targets.{name}.root is ignored for local targets");
            }

            if !target.weight.is_finite() || target.weight <= 0.0 {
                error!(
                    "targets.{name}.weight ({}) must be a positive number",
                    target.weight
                );
                contains_error = true;
            }
        }

        for (name, program) in [("orca", &self.engines.orca), ("xtb", &self.engines.xtb)] {
            match find_on_path(program) {
                None => warn!(
                    "engines.{name} ({}) was not found, jobs for it can only run remotely",
                    program.to_string_lossy()
                ),
                Some(path) => match check_executable(&path) {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        "engines.{name} target {} is not executable, this might cause problems",
                        path.to_string_lossy()
                    ),
                    Err(e) => warn!(
                        "Failed to determine if engines.{name} ({}) is an executable: {e}",
                        path.to_string_lossy()
                    ),
                },
            }
        }

        if let Some(ref home) = self.engines.ams_home {
            if !home.join("bin").join("ams").is_file() {
                warn!("engines.ams_home ({}) does not contain bin/ams", home.to_string_lossy());
            }
        }

        if self.cache.capacity == 0 {
            warn!("cache.capacity is 0, using 1 instead");
        }

        contains_error
    }
}

fn default_targets() -> BTreeMap<String, TargetConfig> {
    BTreeMap::from([(
        String::from("local"),
        TargetConfig {
            host: None,
            root: None,
            batch: IndexMap::new(),
            weight: default_weight(),
            ssh_options: Vec::new(),
        },
    )])
}

fn default_staging() -> PathBuf {
    PathBuf::from(".qcflow/staging")
}

fn default_poll_interval() -> u64 {
    3
}

fn default_cli_command() -> String {
    String::from("qcflow")
}

fn default_weight() -> f64 {
    1.0
}

fn default_orca() -> PathBuf {
    PathBuf::from("orca")
}

fn default_xtb() -> PathBuf {
    PathBuf::from("xtb")
}

fn default_cache_capacity() -> usize {
    16
}
