use crate::target::{Host, Target, TargetError, TargetSet};
use rand::{rngs::StdRng, SeedableRng};
use std::{
    env,
    path::{Path, PathBuf},
};

#[test]
fn workdir_depends_on_host() {
    let local = Target::local();
    let remote = Target::remote("cluster", "login.hpc", "/scratch/me");

    let workdir = local.workdir(Path::new("calc"), "SP");
    assert!(workdir.is_absolute());
    assert_eq!(workdir, env::current_dir().unwrap().join("calc").join("SP"));
    assert_eq!(
        local.workdir(Path::new("/calc"), "SP"),
        PathBuf::from("/calc/SP")
    );
    assert_eq!(
        remote.workdir(Path::new("calc"), "SP"),
        PathBuf::from("/scratch/me/calc/SP")
    );
    assert!(local.is_local());
    assert!(matches!(remote.host, Host::Remote { ref host, .. } if host == "login.hpc"));
}

#[test]
fn defaults_are_normalized() {
    let target = Target::local().with_default("--cpus-per-task", "16");

    assert_eq!(target.batch_defaults.get("cpus_per_task"), Some("16"));
}

#[yare::parameterized(
    zero = { 0.0 },
    negative = { -1.0 },
    infinite = { f64::INFINITY },
    nan = { f64::NAN },
)]
fn invalid_weights_are_rejected(weight: f64) {
    let mut targets = TargetSet::new();

    let error = targets.add(Target::local(), weight).unwrap_err();

    assert!(matches!(error, TargetError::InvalidWeight { ref name, .. } if name == "local"));
    assert!(targets.is_empty());
}

#[test]
fn single_target_is_always_chosen() {
    let mut targets = TargetSet::new();
    targets.add(Target::local(), 0.1).unwrap();

    assert_eq!(targets.choose(&mut StdRng::seed_from_u64(1)), Some(0));
    assert_eq!(TargetSet::new().choose(&mut StdRng::seed_from_u64(1)), None);
}

#[test]
fn choice_follows_weights() {
    let mut targets = TargetSet::new();
    targets.add(Target::local(), 1.0).unwrap();
    targets
        .add(Target::remote("cluster", "login.hpc", "/scratch"), 3.0)
        .unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let mut counts = [0usize; 2];
    for _ in 0..4000 {
        counts[targets.choose(&mut rng).unwrap()] += 1;
    }

    // expected 1000 / 3000
    assert!((800..1200).contains(&counts[0]), "{counts:?}");
    assert_eq!(counts[0] + counts[1], 4000);
    assert_eq!(targets.weights(), &[1.0, 3.0]);
}
