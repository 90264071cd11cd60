use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Charge and spin state of a job's molecule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Electronic {
    #[serde(default)]
    pub charge: i32,
    /// number of unpaired electrons
    #[serde(default)]
    pub spin_polarization: u32,
    #[serde(default)]
    pub unrestricted: bool,
}

impl Electronic {
    pub fn multiplicity(&self) -> u32 {
        self.spin_polarization + 1
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobFlags {
    /// build the job files but do not run or submit them
    #[serde(default)]
    pub test_mode: bool,
    /// wipe an existing working directory before building
    #[serde(default)]
    pub overwrite: bool,
    /// block until the scheduler reports the job as gone
    #[serde(default)]
    pub wait_for_finish: bool,
    #[serde(default)]
    pub delete_on_finish: bool,
    #[serde(default)]
    pub delete_on_fail: bool,
}

/// Script run after the engine, e.g. to extract a converged geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostScript {
    pub script: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Ordering constraint towards another job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyLink {
    pub name: String,
    pub workdir: PathBuf,
    /// `None` when the other job was not submitted to a scheduler
    pub scheduler_job_id: Option<String>,
}
