use crate::{
    config::Config,
    ingest::{LogStatusProbe, Probes, RemoteStatusProbe, StatusProbe},
    scheduler::{BatchScheduler, SlurmScheduler},
    shell::{LocalShell, Shell, SshShell},
    target::{Host, Target},
};
use parking_lot::Mutex;
use std::{collections::HashMap, fmt::Debug, sync::Arc};
use tracing::debug;

/// The collaborators a job needs on one target
#[derive(Debug, Clone)]
pub struct Backend {
    pub shell: Arc<dyn Shell>,
    pub probe: Arc<dyn StatusProbe>,
    /// `None` when no batch scheduler is reachable on the target
    pub scheduler: Option<Arc<dyn BatchScheduler>>,
}

/// Resolves a [`Target`] into a [`Backend`]
pub trait Connector: Debug + Send + Sync {
    fn connect(&self, target: &Target) -> Backend;
}

/// Connector using the real machine: `sh` locally, `ssh` for remote hosts
/// and Slurm wherever `sbatch` is found.
#[derive(Debug)]
pub struct SystemConnector {
    cli_command: String,
    local_probe: Arc<Probes>,
    backends: Mutex<HashMap<String, Backend>>,
}

impl SystemConnector {
    pub fn new(config: &Config) -> Self {
        Self {
            cli_command: config.scheduler.cli_command.clone(),
            local_probe: Arc::new(Probes::Log(LogStatusProbe::new(config.cache.capacity))),
            backends: Mutex::new(HashMap::new()),
        }
    }

    fn open(&self, target: &Target) -> Backend {
        let (shell, probe): (Arc<dyn Shell>, Arc<dyn StatusProbe>) = match &target.host {
            Host::Local => {
                let shell: Arc<dyn Shell> = Arc::new(LocalShell::new());
                let probe: Arc<dyn StatusProbe> = self.local_probe.clone();

                (shell, probe)
            }
            Host::Remote { host, .. } => {
                let shell: Arc<dyn Shell> =
                    Arc::new(SshShell::new(host.clone(), target.ssh_options.clone()));
                let probe: Arc<dyn StatusProbe> = Arc::new(Probes::Remote(
                    RemoteStatusProbe::new(shell.clone(), &self.cli_command),
                ));

                (shell, probe)
            }
        };

        let slurm = SlurmScheduler::new(shell.clone());
        let scheduler: Option<Arc<dyn BatchScheduler>> = if slurm.has_scheduler() {
            Some(Arc::new(slurm))
        } else {
            None
        };

        debug!(
            target_name = %target.name,
            host = shell.label(),
            scheduler = scheduler.is_some(),
            "Connected to target"
        );

        Backend {
            shell,
            probe,
            scheduler,
        }
    }
}

impl Connector for SystemConnector {
    fn connect(&self, target: &Target) -> Backend {
        let mut backends = self.backends.lock();

        backends
            .entry(target.name.clone())
            .or_insert_with(|| self.open(target))
            .clone()
    }
}
