use super::{
    cache::ReaderCache,
    status::{Status, StatusName},
    StatusProbe,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Text markers an engine prints when it stops
#[derive(Debug)]
pub struct Markers {
    pub engine: &'static str,
    pub failure: &'static [&'static str],
    pub warning: &'static [&'static str],
    pub success: &'static [&'static str],
}

pub const MARKERS: [Markers; 3] = [
    Markers {
        engine: "orca",
        failure: &["ORCA finished by error termination", "aborting the run"],
        warning: &["SCF NOT CONVERGED", "The optimization did not converge"],
        success: &["****ORCA TERMINATED NORMALLY****"],
    },
    Markers {
        engine: "ams",
        failure: &["ERROR:", "ERROR DETECTED", "Execution of AMS failed"],
        warning: &["NORMAL TERMINATION with warnings"],
        success: &["NORMAL TERMINATION"],
    },
    Markers {
        engine: "xtb",
        failure: &["abnormal termination of xtb", "[ERROR]"],
        warning: &["[WARNING]"],
        success: &["normal termination of xtb"],
    },
];

/// lines of `text` containing any of `needles`, trimmed
fn matching_lines(text: &str, needles: &[&str]) -> Vec<String> {
    text.lines()
        .filter(|line| needles.iter().any(|needle| line.contains(needle)))
        .map(|line| line.trim().to_owned())
        .collect()
}

/// Classify an engine output.
///
/// Errors take precedence over termination messages since some engines
/// print both. Output without any marker belongs to a run still in progress.
pub fn classify(text: &str) -> (Option<&'static str>, Status) {
    for markers in MARKERS.iter() {
        let failures = matching_lines(text, markers.failure);
        if !failures.is_empty() {
            let status = failures
                .into_iter()
                .fold(Status::new(StatusName::Failed), Status::with_reason);
            return (Some(markers.engine), status);
        }
    }

    for markers in MARKERS.iter() {
        if markers.success.iter().any(|needle| text.contains(needle)) {
            let warnings = matching_lines(text, markers.warning);

            let status = if warnings.is_empty() {
                Status::success()
            } else {
                warnings
                    .into_iter()
                    .fold(Status::new(StatusName::SuccessWithWarnings), Status::with_reason)
            };

            return (Some(markers.engine), status);
        }
    }

    (None, Status::running())
}

/// path of the engine output inside a working directory
pub fn output_path(workdir: &Path) -> Option<PathBuf> {
    let name = workdir.file_name()?.to_string_lossy().into_owned();

    Some(workdir.join(format!("{name}.out")))
}

/// Status probe reading the engine output of a local working directory
#[derive(Debug)]
pub struct LogStatusProbe {
    cache: Mutex<ReaderCache>,
}

impl LogStatusProbe {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(ReaderCache::new(capacity)),
        }
    }

    /// like [`StatusProbe::read_status`] but also reports the detected engine
    pub fn inspect(&self, workdir: &Path) -> (Option<&'static str>, Status) {
        if !workdir.is_dir() {
            return (None, Status::unknown("working directory does not exist"));
        }

        let Some(output) = output_path(workdir).filter(|path| path.is_file()) else {
            return (None, Status::unknown("no engine output found"));
        };

        let mut cache = self.cache.lock();
        let mut scope = cache.scope();

        match scope.read(&output) {
            Ok(text) => {
                let (engine, status) = classify(&text);
                debug!(workdir = ?workdir, engine = ?engine, status = %status.name, "Read status");

                (engine, status)
            }
            Err(error) => {
                warn!(error = ?error, output = ?output, "Failed to read engine output");

                (None, Status::unknown(format!("failed to read output: {error}")))
            }
        }
    }
}

impl StatusProbe for LogStatusProbe {
    fn read_status(&self, workdir: &Path) -> Status {
        self.inspect(workdir).1
    }
}
