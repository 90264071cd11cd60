pub mod cache;
pub mod log;
pub mod remote;
pub mod status;

#[cfg(test)]
mod log_test;

use serde::Serialize;
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub use self::log::LogStatusProbe;
pub use remote::RemoteStatusProbe;
pub use status::{Status, StatusName};

#[derive(Debug, Error)]
pub enum IngestorError {
    #[error("Failed to serialize reading")]
    Serialize(#[from] serde_yaml::Error),
    #[error("Key {0} does not exist in the reading")]
    UnknownKey(String),
}

/// Reports whether a working directory holds a finished or running
/// calculation. Must never fail: a missing directory is `UNKNOWN`.
pub trait StatusProbe: Debug + Send + Sync {
    fn read_status(&self, workdir: &Path) -> Status;
}

#[derive(Debug)]
/// All probe variants, see [`LogStatusProbe`] and [`RemoteStatusProbe`]
pub enum Probes {
    Log(LogStatusProbe),
    Remote(RemoteStatusProbe),
}

impl StatusProbe for Probes {
    fn read_status(&self, workdir: &Path) -> Status {
        match self {
            Self::Log(probe) => probe.read_status(workdir),
            Self::Remote(probe) => probe.read_status(workdir),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Files {
    pub input: bool,
    pub run_script: bool,
    pub output: bool,
    pub submit: bool,
}

/// Everything the `read` command reports about a working directory
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub workdir: PathBuf,
    pub engine: Option<String>,
    pub status: Status,
    pub files: Files,
}

impl Reading {
    pub fn collect(probe: &LogStatusProbe, workdir: &Path) -> Self {
        let (engine, status) = probe.inspect(workdir);
        let name = workdir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let exists = |file: String| workdir.join(file).is_file();

        Self {
            workdir: workdir.to_path_buf(),
            engine: engine.map(String::from),
            status,
            files: Files {
                input: exists(format!("{name}.in")),
                run_script: exists(format!("{name}.run")),
                output: exists(format!("{name}.out")),
                submit: exists(String::from("submit.sh")),
            },
        }
    }

    /// value at a dotted `key`, e.g. `status.name` or `files.output`
    pub fn select(&self, key: &str) -> Result<serde_yaml::Value, IngestorError> {
        let mut value = serde_yaml::to_value(self)?;

        for part in key.split('.').filter(|part| !part.is_empty()) {
            value = match value {
                serde_yaml::Value::Mapping(mut mapping) => mapping
                    .remove(part)
                    .ok_or_else(|| IngestorError::UnknownKey(key.to_owned()))?,
                serde_yaml::Value::Sequence(mut sequence) => {
                    let index = part
                        .parse::<usize>()
                        .ok()
                        .filter(|index| *index < sequence.len())
                        .ok_or_else(|| IngestorError::UnknownKey(key.to_owned()))?;
                    sequence.swap_remove(index)
                }
                _ => return Err(IngestorError::UnknownKey(key.to_owned())),
            };
        }

        Ok(value)
    }
}
