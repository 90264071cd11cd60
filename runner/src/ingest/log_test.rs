use super::{
    cache::ReaderCache,
    log::{classify, LogStatusProbe},
    status::StatusName,
    StatusProbe,
};
use std::fs;
use tempfile::tempdir;

#[yare::parameterized(
    orca_success = { "...\n****ORCA TERMINATED NORMALLY****\n", Some("orca"), StatusName::Success },
    orca_warning = { "SCF NOT CONVERGED AFTER 125 CYCLES\n****ORCA TERMINATED NORMALLY****\n", Some("orca"), StatusName::SuccessWithWarnings },
    orca_error = { "ORCA finished by error termination in SCF\n", Some("orca"), StatusName::Failed },
    ams_success = { "NORMAL TERMINATION\n", Some("ams"), StatusName::Success },
    ams_warnings = { "NORMAL TERMINATION with warnings\n", Some("ams"), StatusName::SuccessWithWarnings },
    ams_error = { "ERROR: SCF did not converge\nNORMAL TERMINATION\n", Some("ams"), StatusName::Failed },
    xtb_success = { " * finished run\n normal termination of xtb\n", Some("xtb"), StatusName::Success },
    in_progress = { "  cycle 12   energy -76.4\n", None, StatusName::Running },
)]
fn output_classification(text: &str, engine: Option<&str>, name: StatusName) {
    let (detected, status) = classify(text);

    assert_eq!(detected, engine);
    assert_eq!(status.name, name);
    assert_eq!(status.fatal, name.is_fatal());
    assert_eq!(status.code, name.code());
}

#[test]
fn failure_reasons_are_collected() {
    let (_, status) = classify("line\nORCA finished by error termination in GTOInt\naborting the run\n");

    assert_eq!(
        status.reasons,
        vec![
            "ORCA finished by error termination in GTOInt",
            "aborting the run"
        ]
    );
}

#[test]
fn unmarked_output_of_a_stopped_run_is_unknown() {
    let (_, status) = classify("  cycle 1   energy -76.0\n");
    let stopped = status.stopped();

    assert_eq!(stopped.name, StatusName::Unknown);
    assert!(stopped.fatal);
    assert_eq!(stopped.reasons.len(), 1);

    let (_, finished) = classify("****ORCA TERMINATED NORMALLY****\n");
    assert_eq!(finished.clone().stopped(), finished);
}

#[test]
fn missing_directory_is_unknown() {
    let root = tempdir().unwrap();
    let probe = LogStatusProbe::new(4);

    let status = probe.read_status(&root.path().join("never_built"));

    assert_eq!(status.name, StatusName::Unknown);
    assert!(status.fatal);
}

#[test]
fn directory_without_output_is_unknown() {
    let root = tempdir().unwrap();
    let workdir = root.path().join("SP");
    fs::create_dir(&workdir).unwrap();
    fs::write(workdir.join("SP.in"), "! HF def2-SVP\n").unwrap();

    let status = LogStatusProbe::new(4).read_status(&workdir);

    assert_eq!(status.name, StatusName::Unknown);
}

#[test]
fn finished_output_is_read() {
    let root = tempdir().unwrap();
    let workdir = root.path().join("SP");
    fs::create_dir(&workdir).unwrap();
    fs::write(workdir.join("SP.out"), "****ORCA TERMINATED NORMALLY****\n").unwrap();

    let probe = LogStatusProbe::new(4);
    let (engine, status) = probe.inspect(&workdir);

    assert_eq!(engine, Some("orca"));
    assert_eq!(status.name, StatusName::Success);
    assert!(!status.fatal);

    // a rerun that rewrote the output must be seen
    fs::write(workdir.join("SP.out"), "ORCA finished by error termination\n").unwrap();
    assert_eq!(probe.read_status(&workdir).name, StatusName::Failed);
}

#[test]
fn cache_scope_releases_readers() {
    let root = tempdir().unwrap();
    let first = root.path().join("a.out");
    let second = root.path().join("b.out");
    fs::write(&first, "a").unwrap();
    fs::write(&second, "b").unwrap();

    let mut cache = ReaderCache::new(4);
    cache.load(&first).unwrap();

    {
        let mut scope = cache.scope();
        assert_eq!(&*scope.read(&second).unwrap(), "b");
    }

    assert!(cache.contains(&first));
    assert!(!cache.contains(&second));
}

#[test]
fn cache_evicts_oldest_reader() {
    let root = tempdir().unwrap();
    let paths = ["a", "b", "c"].map(|name| {
        let path = root.path().join(name);
        fs::write(&path, name).unwrap();
        path
    });

    let mut cache = ReaderCache::new(2);
    for path in &paths {
        cache.load(path).unwrap();
    }

    assert_eq!(cache.len(), 2);
    assert!(!cache.contains(&paths[0]));
    assert!(cache.contains(&paths[2]));
}
