use qcflow::{
    cli::{self, Command},
    config::Config,
    ingest::{LogStatusProbe, Reading},
    job::JobContext,
    logging,
    manifest::Manifest,
};
use std::{path::Path, process::exit};
use tracing::{error, info};

fn read(config: &Config, workdir: &Path, status: bool, print: bool, keys: &[String]) -> i32 {
    let probe = LogStatusProbe::new(config.cache.capacity);
    let reading = Reading::collect(&probe, workdir);

    if status {
        println!("{}", reading.status.name);
        return 0;
    }

    if print || keys.is_empty() {
        match serde_yaml::to_string(&reading) {
            Ok(text) => print!("{text}"),
            Err(e) => {
                error!(error = ?e, "Failed to serialize reading");
                return 1;
            }
        }
    }

    for key in keys {
        match reading.select(key).and_then(|value| Ok(serde_yaml::to_string(&value)?)) {
            Ok(text) => println!("{}", text.trim_end()),
            Err(e) => {
                error!(key = %key, error = %e, "Failed to read key");
                return 1;
            }
        }
    }

    0
}

fn run(config: &Config, manifest: &Path, test_mode: bool) -> i32 {
    if config.preflight_checks() {
        error!("Config contains errors, aborting");
        return 1;
    }

    let manifest = match Manifest::load(manifest) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!(error = ?e, "Failed to load manifest");
            return 1;
        }
    };

    let context = JobContext::from_config(config);
    let reports = manifest.run(config, &context, test_mode);
    let failed = reports.iter().filter(|report| report.outcomes.is_none()).count();

    for report in &reports {
        for (name, outcome) in report.outcomes.iter().flatten() {
            info!(entry = %report.name, job = %name, state = %outcome.state(), "Job done");
        }
    }

    info!(entries = reports.len(), failed = failed, "Manifest done");

    if failed > 0 {
        1
    } else {
        0
    }
}

fn main() {
    let cli = cli::parse();
    logging::init_logging(cli.log_level);

    let config = match Config::locate(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = ?e, "Failed to load config");
            exit(1);
        }
    };

    let code = match cli.command {
        Command::Read {
            ref workdir,
            status,
            print,
            ref keys,
        } => read(&config, workdir, status, print, keys),
        Command::Run {
            ref manifest,
            test_mode,
        } => run(&config, manifest, test_mode),
    };

    exit(code)
}
