use crate::scheduler::{
    BatchOptions, BatchScheduler, PollInterval, QueueRow, SchedulerError, Submission,
};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug)]
struct StaticQueue(Vec<QueueRow>);

impl BatchScheduler for StaticQueue {
    fn has_scheduler(&self) -> bool {
        true
    }

    fn submit(&self, script: &Path, _options: &BatchOptions) -> Result<Submission, SchedulerError> {
        Err(SchedulerError::Rejected {
            script: script.to_path_buf(),
            reason: String::from("read only queue"),
        })
    }

    fn queue_snapshot(&self) -> Result<Vec<QueueRow>, SchedulerError> {
        Ok(self.0.clone())
    }
}

fn row(directory: &str, id: &str, state_name: &str) -> QueueRow {
    QueueRow {
        directory: PathBuf::from(directory),
        id: id.to_owned(),
        state_code: state_name[..2].to_owned(),
        state_name: state_name.to_owned(),
    }
}

#[yare::parameterized(
    pending = { "PENDING", true },
    running = { "RUNNING", true },
    completing = { "COMPLETING", true },
    configuring = { "CONFIGURING", true },
    completed = { "COMPLETED", false },
    cancelled = { "CANCELLED", false },
    timeout = { "TIMEOUT", false },
)]
fn active_queue_states(state_name: &str, active: bool) {
    assert_eq!(row("/calc/SP", "1", state_name).is_active(), active);
}

#[test]
fn poll_interval_is_clamped() {
    assert_eq!(
        PollInterval::new(Duration::from_millis(10)).duration(),
        PollInterval::FLOOR
    );
    assert_eq!(
        PollInterval::new(Duration::from_secs(30)).duration(),
        Duration::from_secs(30)
    );
    assert_eq!(PollInterval::default().duration(), Duration::from_secs(3));
}

#[test]
fn option_keys_are_normalized() {
    let mut options = BatchOptions::new();
    options.set("--cpus-per-task", "4");

    assert_eq!(options.get("cpus_per_task"), Some("4"));
    assert!(options.contains("-cpus-per-task"));
    assert!(options.contains_any(&["D", "cpus-per-task"]));
    assert_eq!(options.remove("cpus_per_task"), Some(String::from("4")));
    assert!(options.is_empty());
}

#[test]
fn explicit_options_beat_defaults() {
    let mut options: BatchOptions = [("time", "1:00:00"), ("p", "short")].into_iter().collect();
    let defaults: BatchOptions = [("time", "48:00:00"), ("mem", "8G")].into_iter().collect();

    options.merge_defaults(&defaults);

    assert_eq!(options.get("time"), Some("1:00:00"));
    assert_eq!(options.get("mem"), Some("8G"));
    assert!(!options.set_default("mem", "1G"));
    assert_eq!(options.get("mem"), Some("8G"));
}

#[test]
fn dependencies_accumulate_into_one_directive() {
    let mut options = BatchOptions::new();
    options.add_dependency("101");
    options.add_dependency("102");
    options.add_dependency("101");

    assert_eq!(options.get("dependency"), Some("afterany:101:102"));
    assert_eq!(options.get("kill-on-invalid-dep"), Some("yes"));
}

#[test]
fn foreign_dependency_directive_is_extended() {
    let mut options = BatchOptions::new();
    options.set("dependency", "afterok:7");
    options.add_dependency("8");

    assert_eq!(options.get("dependency"), Some("afterok:7,afterany:8"));
}

#[test]
fn args_use_short_and_long_syntax() {
    let mut options = BatchOptions::new();
    options
        .set("N", "1")
        .set("cpus_per_task", "8")
        .set("exclusive", "");
    options.add_dependency("5");

    assert_eq!(
        options.to_args(),
        vec![
            "-N",
            "1",
            "--cpus-per-task=8",
            "--exclusive",
            "--dependency=afterany:5",
            "--kill-on-invalid-dep=yes",
        ]
    );
}

#[test]
fn workdir_info_finds_matching_row() {
    let queue = StaticQueue(vec![
        row("/calc/A", "11", "RUNNING"),
        row("/calc/B", "12", "PENDING"),
    ]);

    let info = queue.workdir_info(Path::new("/calc/B")).unwrap().unwrap();
    assert_eq!(info.id, "12");
    assert!(queue.workdir_info(Path::new("/calc/C")).unwrap().is_none());
    assert!(queue.is_queued("11").unwrap());
    assert!(!queue.is_queued("13").unwrap());
}

#[test]
fn wait_returns_once_job_left_queue() {
    let queue = StaticQueue(vec![row("/calc/A", "11", "RUNNING")]);

    queue.wait("99", PollInterval::default()).unwrap();
}
