pub mod local;
pub mod remote;

use crate::{connector::Backend, shell::ShellError};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

pub use local::LocalExecutor;
pub use remote::RemoteExecutor;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to start {0}")]
    Spawn(PathBuf, #[source] io::Error),
    #[error("{script} was killed after {timeout:?}")]
    Timeout { script: PathBuf, timeout: Duration },
    #[error("Failed to capture the output of {0}")]
    Capture(PathBuf, #[source] io::Error),
    #[error("Failed to run on the remote host")]
    Shell(#[from] ShellError),
}

/// Result of running a job's run script directly, without a scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub exit_code: i32,
    pub runtime: u128,
    /// `<name>.log` next to the run script
    pub log: PathBuf,
}

#[derive(Debug, Clone)]
/// All direct execution variants, see [`LocalExecutor`] and [`RemoteExecutor`]
pub enum Executors {
    Local(LocalExecutor),
    Remote(RemoteExecutor),
}

impl Executors {
    pub fn for_backend(backend: &Backend, timeout: Option<Duration>) -> Self {
        if backend.shell.is_remote() {
            Self::Remote(RemoteExecutor::new(backend.shell.clone()))
        } else {
            Self::Local(LocalExecutor::new(timeout))
        }
    }

    /// run `<workdir>/<name>.run` inside `workdir` and wait for it
    pub fn execute(&self, workdir: &Path, name: &str) -> Result<Execution, ExecutorError> {
        match self {
            Self::Local(executor) => executor.execute(workdir, name),
            Self::Remote(executor) => executor.execute(workdir, name),
        }
    }
}
