#![allow(dead_code)]

use parking_lot::Mutex;
use qcflow::{
    connector::{Backend, Connector},
    ingest::{Status, StatusProbe},
    job::JobContext,
    molecule::Molecule,
    scheduler::{BatchOptions, BatchScheduler, QueueRow, SchedulerError, Submission},
    shell::LocalShell,
    target::Target,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Once},
};
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests, logs are only shown for failing tests.
///
/// Enable levels with e.g. `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Status probe answering from a table, `UNKNOWN` for everything else
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    statuses: Mutex<HashMap<PathBuf, Status>>,
}

impl ScriptedProbe {
    pub fn set(&self, workdir: impl Into<PathBuf>, status: Status) {
        self.statuses.lock().insert(workdir.into(), status);
    }
}

impl StatusProbe for ScriptedProbe {
    fn read_status(&self, workdir: &Path) -> Status {
        self.statuses
            .lock()
            .get(workdir)
            .cloned()
            .unwrap_or_else(|| Status::unknown("not scripted"))
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub id: String,
    pub script: PathBuf,
    pub options: BatchOptions,
}

/// Scheduler that keeps every submission pending, or finishes it right away
/// with a `SUCCESS` status when `complete_on_submit` is set.
#[derive(Debug)]
pub struct RecordingScheduler {
    submissions: Mutex<Vec<Recorded>>,
    finished: Mutex<Vec<String>>,
    probe: Arc<ScriptedProbe>,
    complete_on_submit: bool,
}

impl RecordingScheduler {
    pub fn new(probe: Arc<ScriptedProbe>) -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            probe,
            complete_on_submit: false,
        }
    }

    pub fn completing(probe: Arc<ScriptedProbe>) -> Self {
        Self {
            complete_on_submit: true,
            ..Self::new(probe)
        }
    }

    pub fn submissions(&self) -> Vec<Recorded> {
        self.submissions.lock().clone()
    }

    /// submission of the job whose working directory ends in `name`
    pub fn submission(&self, name: &str) -> Option<Recorded> {
        self.submissions()
            .into_iter()
            .find(|recorded| recorded.script.parent().is_some_and(|dir| dir.ends_with(name)))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.submissions()
            .iter()
            .position(|recorded| recorded.script.parent().is_some_and(|dir| dir.ends_with(name)))
    }

    /// take a job out of the queue
    pub fn finish(&self, id: &str) {
        self.finished.lock().push(id.to_owned());
    }
}

impl BatchScheduler for RecordingScheduler {
    fn has_scheduler(&self) -> bool {
        true
    }

    fn submit(&self, script: &Path, options: &BatchOptions) -> Result<Submission, SchedulerError> {
        let mut submissions = self.submissions.lock();
        let id = (1000 + submissions.len()).to_string();

        submissions.push(Recorded {
            id: id.clone(),
            script: script.to_path_buf(),
            options: options.clone(),
        });

        if self.complete_on_submit {
            self.finished.lock().push(id.clone());
            if let Some(workdir) = script.parent() {
                self.probe.set(workdir, Status::success());
            }
        }

        Ok(Submission {
            command: format!("sbatch {} {}", options.to_args().join(" "), script.display()),
            id,
        })
    }

    fn queue_snapshot(&self) -> Result<Vec<QueueRow>, SchedulerError> {
        let submissions = self.submissions.lock();
        let finished = self.finished.lock();

        Ok(submissions
            .iter()
            .filter(|recorded| !finished.contains(&recorded.id))
            .map(|recorded| QueueRow {
                directory: recorded
                    .options
                    .get("chdir")
                    .map(PathBuf::from)
                    .unwrap_or_default(),
                id: recorded.id.clone(),
                state_code: String::from("PD"),
                state_name: String::from("PENDING"),
            })
            .collect())
    }
}

/// Connector handing out the same fakes for every target
#[derive(Debug)]
pub struct FakeConnector {
    pub probe: Arc<dyn StatusProbe>,
    pub scheduler: Option<Arc<RecordingScheduler>>,
}

impl Connector for FakeConnector {
    fn connect(&self, _target: &Target) -> Backend {
        Backend {
            shell: Arc::new(LocalShell::new()),
            probe: self.probe.clone(),
            scheduler: self
                .scheduler
                .clone()
                .map(|scheduler| scheduler as Arc<dyn BatchScheduler>),
        }
    }
}

/// Everything a test needs to drive jobs against a fake cluster
pub struct Cluster {
    pub probe: Arc<ScriptedProbe>,
    pub scheduler: Arc<RecordingScheduler>,
    pub context: JobContext,
}

impl Cluster {
    pub fn new() -> Self {
        let probe = Arc::new(ScriptedProbe::default());
        Self::with_scheduler(probe.clone(), RecordingScheduler::new(probe))
    }

    pub fn completing() -> Self {
        let probe = Arc::new(ScriptedProbe::default());
        Self::with_scheduler(probe.clone(), RecordingScheduler::completing(probe))
    }

    fn with_scheduler(probe: Arc<ScriptedProbe>, scheduler: RecordingScheduler) -> Self {
        let scheduler = Arc::new(scheduler);
        let context = JobContext::new(Arc::new(FakeConnector {
            probe: probe.clone(),
            scheduler: Some(scheduler.clone()),
        }));

        Self {
            probe,
            scheduler,
            context,
        }
    }
}

/// `path` spelled relative to the current directory
pub fn relative_to_cwd(path: &Path) -> PathBuf {
    // `..` walks the physical parents
    let cwd = std::env::current_dir()
        .and_then(std::fs::canonicalize)
        .expect("current directory");
    let mut relative = cwd.components().skip(1).map(|_| "..").collect::<PathBuf>();
    relative.push(path.strip_prefix("/").expect("absolute path"));
    relative
}

pub fn water() -> Molecule {
    Molecule::from_xyz("3\nwater\nO 0 0 0\nH 0.757 0.586 0\nH -0.757 0.586 0\n")
        .expect("valid xyz")
}

pub fn donor_acceptor() -> Molecule {
    Molecule::from_xyz(
        "4\n\nH 0.0 0.0 0.0\nF 0.0 0.0 0.9\nLi 0.0 0.0 3.0\nH 0.0 0.0 4.6\n",
    )
    .expect("valid xyz")
}
