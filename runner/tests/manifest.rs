mod common;

use common::{init_tracing, Cluster};
use qcflow::{
    config::Config,
    job::RunOutcome,
    manifest::{Manifest, ManifestError},
};
use std::fs;
use tempfile::tempdir;

const MANIFEST: &str = r#"
jobs:
  - name: SP
    engine: orca
    run_directory: calc
    molecule: water.xyz
    method: B3LYP
    basis: def2-SVP
    keywords: [TightSCF]
    settings:
      scf.maxiter: 250
    batch:
      ntasks: "4"
    preambles:
      - module load orca

  - name: broken
    engine: orca
    molecule: missing.xyz
    method: HF

  - name: complex_parent_dir
    engine: orca
    molecule: dimer.xyz
    method: HF
    fragments:
      - name: Donor
        atoms: [1, 2]
      - name: Acceptor
        atoms: [3, 4]
        charge: -1
    passes: [zero_iteration]
"#;

const WATER: &str = "3\nwater\nO 0 0 0\nH 0.757 0.586 0\nH -0.757 0.586 0\n";
const DIMER: &str = "4\n\nH 0.0 0.0 0.0\nF 0.0 0.0 0.9\nLi 0.0 0.0 3.0\nH 0.0 0.0 4.6\n";

#[test]
fn manifest_runs_every_entry_in_test_mode() {
    init_tracing();
    let root = tempdir().unwrap();
    fs::write(root.path().join("water.xyz"), WATER).unwrap();
    fs::write(root.path().join("dimer.xyz"), DIMER).unwrap();
    let path = root.path().join("jobs.yaml");
    fs::write(&path, MANIFEST).unwrap();

    let cluster = Cluster::new();
    let manifest = Manifest::load(&path).unwrap();
    let reports = manifest.run(&Config::default(), &cluster.context, true);

    assert_eq!(reports.len(), 3);
    assert!(reports[1].outcomes.is_none());
    assert!(cluster.scheduler.submissions().is_empty());

    let single = reports[0].outcomes.as_ref().unwrap();
    assert!(matches!(single["SP"], RunOutcome::Built(_)));

    let input = fs::read_to_string(root.path().join("calc").join("SP").join("SP.in")).unwrap();
    assert!(input.starts_with("! B3LYP def2-SVP SP TightSCF\n"));
    assert!(input.contains("%scf\n  maxiter 250\nend\n"));
    let script = fs::read_to_string(root.path().join("calc").join("SP").join("SP.run")).unwrap();
    assert!(script.contains("module load orca\n"));

    let composite = reports[2].outcomes.as_ref().unwrap();
    assert_eq!(
        composite.keys().collect::<Vec<_>>(),
        vec!["frag_Donor", "frag_Acceptor", "complex", "complex_ZeroIter"]
    );

    let directory = root.path().join("complex_parent_dir");
    let parent = fs::read_to_string(directory.join("complex").join("complex.in")).unwrap();
    assert!(parent.contains("* xyz -1 1\n"));
    assert!(directory.join("frag_Donor").join("frag_Donor.run").is_file());
}

#[test]
fn manifest_rejects_unknown_fields() {
    let result = Manifest::from_str_in(
        "jobs:\n  - name: SP\n    engine: orca\n    method: HF\n    charg: 1\n",
        ".",
    );

    assert!(matches!(result, Err(ManifestError::Parse(_))));
}

#[test]
fn manifest_rejects_unknown_engines() {
    let result = Manifest::from_str_in("jobs:\n  - name: SP\n    engine: gaussian\n", ".");

    assert!(matches!(result, Err(ManifestError::Parse(_))));
}

#[test]
fn orca_entry_needs_a_method() {
    init_tracing();
    let root = tempdir().unwrap();
    fs::write(root.path().join("water.xyz"), WATER).unwrap();
    let manifest = Manifest::from_str_in(
        "jobs:\n  - name: SP\n    engine: orca\n    molecule: water.xyz\n",
        root.path(),
    )
    .unwrap();

    let cluster = Cluster::new();
    let reports = manifest.run(&Config::default(), &cluster.context, true);

    assert!(reports[0].outcomes.is_none());
    assert!(!root.path().join("SP").exists());
}

#[test]
fn unknown_target_fails_the_entry() {
    init_tracing();
    let root = tempdir().unwrap();
    fs::write(root.path().join("water.xyz"), WATER).unwrap();
    let manifest = Manifest::from_str_in(
        "jobs:\n  - name: SP\n    engine: xtb\n    molecule: water.xyz\n    targets:\n      - name: nowhere\n",
        root.path(),
    )
    .unwrap();

    let cluster = Cluster::new();
    let reports = manifest.run(&Config::default(), &cluster.context, false);

    assert!(reports[0].outcomes.is_none());
    assert!(cluster.scheduler.submissions().is_empty());
}

#[test]
fn xtb_entry_is_submitted() {
    init_tracing();
    let root = tempdir().unwrap();
    fs::write(root.path().join("water.xyz"), WATER).unwrap();
    let manifest = Manifest::from_str_in(
        "jobs:\n  - name: opt\n    engine: xtb\n    task: opt\n    gfn: 1\n    molecule: water.xyz\n    targets:\n      - name: local\n        weight: 2\n",
        root.path(),
    )
    .unwrap();

    let cluster = Cluster::new();
    let reports = manifest.run(&Config::default(), &cluster.context, false);

    let outcomes = reports[0].outcomes.as_ref().unwrap();
    assert_eq!(outcomes["opt"], RunOutcome::Submitted { id: String::from("1000") });

    let workdir = root.path().join("opt");
    assert!(workdir.join("coords.xyz").is_file());
    let script = fs::read_to_string(workdir.join("opt.run")).unwrap();
    assert!(script.contains("xtb coords.xyz --input opt.in --gfn 1 --opt > opt.out 2>&1\n"));
}
