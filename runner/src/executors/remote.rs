use super::{Execution, ExecutorError};
use crate::shell::{quote, quote_path, Shell};
use std::{path::Path, sync::Arc};
use tracing::{info, instrument};

/// Executor for remote targets without a batch scheduler, the run script is
/// started through the target's shell and blocks until it returns.
#[derive(Debug, Clone)]
pub struct RemoteExecutor {
    shell: Arc<dyn Shell>,
}

impl RemoteExecutor {
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        Self { shell }
    }

    #[instrument(skip(self), level = "info")]
    pub fn execute(&self, workdir: &Path, name: &str) -> Result<Execution, ExecutorError> {
        let script = quote(&format!("./{name}.run"));
        let log = quote(&format!("{name}.log"));
        let command = format!(
            "cd {} && chmod +x {script} && {script} > {log} 2>&1",
            quote_path(workdir)
        );

        let output = self.shell.execute(&command)?;

        info!(
            host = self.shell.label(),
            workdir = ?workdir,
            exit_code = output.status,
            runtime = output.runtime,
            "Remote run script finished"
        );

        Ok(Execution {
            exit_code: output.status,
            runtime: output.runtime,
            log: workdir.join(format!("{name}.log")),
        })
    }
}
