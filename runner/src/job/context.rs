use crate::{
    config::Config,
    connector::{Connector, SystemConnector},
    scheduler::PollInterval,
    target::Target,
};
use std::{path::PathBuf, sync::Arc, time::Duration};

/// Shared collaborators and settings of every job in one run
#[derive(Debug, Clone)]
pub struct JobContext {
    pub connector: Arc<dyn Connector>,
    /// used by jobs that never registered a target
    pub default_target: Target,
    pub poll_interval: PollInterval,
    /// command of this tool inside run scripts, used to re-probe status
    pub cli_command: String,
    pub local_timeout: Option<Duration>,
    /// local directory holding files of remote jobs before upload
    pub staging_root: PathBuf,
}

impl JobContext {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let defaults = Config::default();

        Self {
            connector,
            default_target: Target::local(),
            poll_interval: PollInterval::default(),
            cli_command: defaults.scheduler.cli_command,
            local_timeout: None,
            staging_root: defaults.staging,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            connector: Arc::new(SystemConnector::new(config)),
            default_target: config.default_target(),
            poll_interval: config.poll_interval(),
            cli_command: config.scheduler.cli_command.clone(),
            local_timeout: config.local_timeout(),
            staging_root: config.staging.clone(),
        }
    }
}
