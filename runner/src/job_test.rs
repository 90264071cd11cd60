use crate::{
    connector::{Backend, Connector},
    engines::{Engines, OrcaBuilder, XtbBuilder},
    ingest::LogStatusProbe,
    job::{Job, JobContext, JobError, JobState, RunOutcome},
    molecule::Molecule,
    settings::OptionValue,
    shell::LocalShell,
    target::Target,
};
use rand::{rngs::StdRng, SeedableRng};
use std::{fs, path::Path, sync::Arc};
use tempfile::tempdir;

/// this machine without a batch scheduler
#[derive(Debug)]
pub(crate) struct LocalConnector {
    probe: Arc<LogStatusProbe>,
}

impl Connector for LocalConnector {
    fn connect(&self, _target: &Target) -> Backend {
        Backend {
            shell: Arc::new(LocalShell::new()),
            probe: self.probe.clone(),
            scheduler: None,
        }
    }
}

pub(crate) fn local_context() -> JobContext {
    JobContext::new(Arc::new(LocalConnector {
        probe: Arc::new(LogStatusProbe::new(8)),
    }))
}

pub(crate) fn water() -> Molecule {
    Molecule::from_xyz("O 0 0 0\nH 0.757 0.586 0\nH -0.757 0.586 0\n").unwrap()
}

fn orca_job(name: &str, run_directory: &Path) -> Job<Engines> {
    let mut job = Job::new(
        name,
        run_directory,
        Engines::from(OrcaBuilder::new("HF").basis("def2-SVP")),
        local_context(),
    );
    job.set_molecule(water()).unwrap();
    job.flags_mut().test_mode = true;
    job
}

fn finish(workdir: &Path, name: &str) {
    fs::create_dir_all(workdir).unwrap();
    fs::write(
        workdir.join(format!("{name}.out")),
        "****ORCA TERMINATED NORMALLY****\n",
    )
    .unwrap();
}

#[test]
fn single_point_is_built_then_skipped() {
    let root = tempdir().unwrap();
    let calc = root.path().join("calc");
    let mut job = orca_job("SP", &calc);
    job.flags_mut().overwrite = true;

    let outcome = job.run().unwrap();

    assert!(matches!(outcome, RunOutcome::Built(_)));
    assert_eq!(job.state(), JobState::Built);
    assert!(calc.join("SP").join("SP.in").is_file());
    assert!(calc.join("SP").join("SP.run").is_file());

    finish(&calc.join("SP"), "SP");

    let mut again = orca_job("SP", &calc);
    again.flags_mut().overwrite = true;
    assert!(again.can_skip());
    assert_eq!(again.run().unwrap(), RunOutcome::Skipped);
    assert_eq!(again.state(), JobState::Skipped);
    // the finished output was not wiped
    assert!(calc.join("SP").join("SP.out").is_file());
}

#[test]
fn failed_run_is_not_skipped() {
    let root = tempdir().unwrap();
    let workdir = root.path().join("SP");
    fs::create_dir_all(&workdir).unwrap();
    fs::write(workdir.join("SP.out"), "ORCA finished by error termination\n").unwrap();

    let job = orca_job("SP", root.path());

    assert!(!job.can_skip());
}

#[test]
fn settings_freeze_after_build() {
    let root = tempdir().unwrap();
    let mut job = orca_job("SP", root.path());
    job.set("scf.maxiter", 50).unwrap();

    job.run().unwrap();

    assert!(matches!(job.set("scf.maxiter", 10), Err(JobError::Frozen(ref name)) if name == "SP"));
    assert!(job.set_molecule(water()).is_err());
    assert_eq!(
        job.snapshot().and_then(|snapshot| snapshot.get("scf.maxiter").cloned()),
        Some(OptionValue::Int(50))
    );
}

#[test]
fn build_failure_is_reported() {
    let root = tempdir().unwrap();
    let mut job = Job::new(
        "opt",
        root.path(),
        Engines::from(XtbBuilder::new().gfn(9)),
        local_context(),
    );
    job.set_molecule(water()).unwrap();

    assert_eq!(job.run().unwrap(), RunOutcome::BuildFailed);
    assert_eq!(job.state(), JobState::BuildFailed);
    assert!(job.snapshot().is_none());
    assert!(!root.path().join("opt").exists());
    // still configurable after a failed build
    assert!(job.builder_mut().is_ok());
}

#[test]
fn missing_molecule_fails_the_build() {
    let root = tempdir().unwrap();
    let mut job = Job::new("SP", root.path(), Engines::from(OrcaBuilder::new("HF")), local_context());

    assert_eq!(job.run().unwrap(), RunOutcome::BuildFailed);
}

#[test]
fn run_script_carries_hooks_in_order() {
    let root = tempdir().unwrap();
    let mut job = orca_job("SP", root.path());
    job.preamble("module load orca")
        .postamble("cp SP.gbw ../guess.gbw")
        .post_script("/opt/tools/extract.sh", ["--last", "geometry"]);
    job.flags_mut().delete_on_fail = true;
    job.flags_mut().delete_on_finish = true;

    job.run().unwrap();

    let workdir = root.path().join("SP");
    let script = fs::read_to_string(workdir.join("SP.run")).unwrap();
    let lines = script.lines().filter(|line| !line.is_empty()).collect::<Vec<_>>();
    let workdir = workdir.to_string_lossy();

    assert_eq!(lines[0], "#!/bin/bash");
    assert_eq!(lines[1], "module load orca");
    assert_eq!(lines[2], "orca SP.in > SP.out");
    assert_eq!(lines[3], "cp SP.gbw ../guess.gbw");
    assert_eq!(lines[4], "/opt/tools/extract.sh --last geometry");
    assert!(lines[5].starts_with("case \"$(qcflow read "));
    assert!(lines[5].contains("-s)\" in FAILED|RUNNING|UNKNOWN) rm -rf "));
    assert!(lines[5].ends_with(" ;; esac"));
    assert!(lines[6].starts_with("rm -rf ") && lines[6].ends_with(workdir.as_ref()));
}

#[test]
fn target_choice_is_memoized() {
    let mut job = orca_job("SP", Path::new("calc"));
    job.add_target(Target::local(), 1.0).unwrap();
    job.add_target(Target::remote("cluster", "login.hpc", "/scratch"), 1.0)
        .unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    let first = job.resolve_target_with(&mut rng);

    for _ in 0..20 {
        assert_eq!(job.resolve_target_with(&mut rng), first);
    }
    assert_eq!(job.selected_target(), Some(&first));
    assert_eq!(job.workdir(), first.workdir(Path::new("calc"), "SP"));
}

#[test]
fn invalid_weight_is_rejected() {
    let mut job = orca_job("SP", Path::new("calc"));

    assert!(matches!(
        job.add_target(Target::local(), -2.0),
        Err(JobError::Target(_))
    ));
    assert!(job.targets().is_empty());
}

#[test]
fn default_target_without_targets() {
    let mut job = orca_job("SP", Path::new("calc"));

    assert_eq!(job.selected_target(), Some(&Target::local()));
    assert_eq!(
        job.workdir(),
        std::env::current_dir().unwrap().join("calc").join("SP")
    );
}

#[test]
fn target_defaults_do_not_override_explicit_options() {
    let root = tempdir().unwrap();
    let mut job = orca_job("SP", root.path());
    job.batch("time", "0:30:00");
    job.add_target(
        Target::local()
            .with_default("time", "48:00:00")
            .with_default("mem", "4G"),
        1.0,
    )
    .unwrap();

    job.run().unwrap();

    assert_eq!(job.batch_options().get("time"), Some("0:30:00"));
    assert_eq!(job.batch_options().get("mem"), Some("4G"));
}

#[test]
fn finished_dependency_is_not_linked() {
    let root = tempdir().unwrap();
    let done = orca_job("done", root.path());
    finish(&root.path().join("done"), "done");
    let mut job = orca_job("next", root.path());
    let before = job.batch_options().clone();

    assert!(!job.dependency(&done));
    assert_eq!(job.batch_options(), &before);
    assert!(job.dependencies().is_empty());
}

#[test]
fn pending_dependency_is_linked() {
    let root = tempdir().unwrap();
    let pending = orca_job("pending", root.path());
    let mut job = orca_job("next", root.path());

    assert!(job.dependency(&pending));

    let link = &job.dependencies()[0];
    assert_eq!(link.name, "pending");
    assert_eq!(link.workdir, root.path().join("pending"));
    assert_eq!(link.scheduler_job_id, None);
    // without a scheduler id there is nothing to tell the scheduler
    assert!(!job.batch_options().contains("dependency"));
}

#[test]
fn derived_jobs_are_independent() {
    let mut job = orca_job("SP", Path::new("calc"));
    job.set("scf.maxiter", 100).unwrap();
    job.batch("cpus-per-task", "4")
        .batch("dependency", "afterany:41")
        .batch("kill-on-invalid-dep", "yes");

    let mut derived = job.derive("SP_ZeroIter");
    derived.set("scf.maxiter", 0).unwrap();

    assert_eq!(derived.name(), "SP_ZeroIter");
    assert_eq!(derived.run_directory(), Path::new("calc"));
    assert_eq!(derived.molecule(), job.molecule());
    assert_eq!(derived.batch_options().get("cpus_per_task"), Some("4"));
    assert!(!derived.batch_options().contains("dependency"));
    assert!(!derived.batch_options().contains("kill_on_invalid_dep"));
    assert_eq!(job.settings().get("scf.maxiter"), Some(&OptionValue::Int(100)));
    assert_eq!(derived.state(), JobState::Configured);
    assert_eq!(derived.flags(), job.flags());
}

#[test]
fn inherit_keeps_own_settings_on_top() {
    let mut parent = orca_job("complex", Path::new("calc"));
    parent
        .set("scf.maxiter", 200)
        .and_then(|job| job.set("moinp", "guess.gbw"))
        .and_then(|job| job.set("scf.flipspin", 1))
        .unwrap();
    parent.preamble("module load orca").batch("mem", "8G");
    parent.flags_mut().overwrite = true;

    let mut child = Job::new(
        "frag_A",
        "calc",
        Engines::from(XtbBuilder::new()),
        local_context(),
    );
    child.set("scf.maxiter", 50).unwrap();
    child.preamble("export OMP_NUM_THREADS=1").batch("mem", "2G");

    child.inherit(&parent, &["moinp", "scf.flipspin"]);

    assert_eq!(child.settings().get("scf.maxiter"), Some(&OptionValue::Int(50)));
    assert!(!child.settings().contains("moinp"));
    assert!(!child.settings().contains("scf.flipspin"));
    assert!(parent.settings().contains("moinp"));
    assert_eq!(child.preambles(), ["module load orca", "export OMP_NUM_THREADS=1"]);
    assert_eq!(child.batch_options().get("mem"), Some("2G"));
    assert!(child.flags().overwrite);
    assert!(matches!(child.builder(), Engines::Orca(_)));
}
