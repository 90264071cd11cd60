use crate::scheduler::BatchOptions;
use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};
use std::path::{self, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TargetError {
    #[error("Target {name} has invalid weight {weight}, weights must be positive and finite")]
    InvalidWeight { name: String, weight: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Host {
    Local,
    /// remote host reachable by ssh, jobs live below `root`
    Remote { host: String, root: PathBuf },
}

/// A place where a job can run plus its default resource requests
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub host: Host,
    pub batch_defaults: BatchOptions,
    /// extra arguments passed to ssh and scp
    pub ssh_options: Vec<String>,
}

impl Target {
    pub fn local() -> Self {
        Self {
            name: String::from("local"),
            host: Host::Local,
            batch_defaults: BatchOptions::new(),
            ssh_options: Vec::new(),
        }
    }

    pub fn remote(name: impl Into<String>, host: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            host: Host::Remote {
                host: host.into(),
                root: root.into(),
            },
            batch_defaults: BatchOptions::new(),
            ssh_options: Vec::new(),
        }
    }

    pub fn with_default(mut self, key: &str, value: impl Into<String>) -> Self {
        self.batch_defaults.set(key, value);
        self
    }

    pub fn is_local(&self) -> bool {
        matches!(self.host, Host::Local)
    }

    /// Working directory of job `name` in `run_directory` on this target.
    ///
    /// Local directories are resolved against the current directory, the
    /// result is always absolute.
    pub fn workdir(&self, run_directory: &Path, name: &str) -> PathBuf {
        match &self.host {
            Host::Local => {
                let workdir = run_directory.join(name);
                path::absolute(&workdir).unwrap_or(workdir)
            }
            Host::Remote { root, .. } => root.join(run_directory).join(name),
        }
    }
}

/// Candidate targets of a job with their relative selection weights
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetSet {
    targets: Vec<Target>,
    weights: Vec<f64>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, target: Target, weight: f64) -> Result<(), TargetError> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(TargetError::InvalidWeight {
                name: target.name,
                weight,
            });
        }

        self.targets.push(target);
        self.weights.push(weight);

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn get(&self, index: usize) -> Option<&Target> {
        self.targets.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// weighted random choice of a target index
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        match self.targets.len() {
            0 => None,
            1 => Some(0),
            _ => WeightedIndex::new(&self.weights)
                .ok()
                .map(|distribution| distribution.sample(rng)),
        }
    }
}
