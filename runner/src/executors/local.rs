use super::{Execution, ExecutorError};
use std::{
    fs::{self, File},
    os::unix::fs::PermissionsExt,
    path::Path,
    process::{Command, Stdio},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

/// Executor running a run script as a child process of this one
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    timeout: Option<Duration>,
}

impl LocalExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// run the script, stdout and stderr go to `<name>.log`
    #[instrument(skip(self), level = "info")]
    pub fn execute(&self, workdir: &Path, name: &str) -> Result<Execution, ExecutorError> {
        // relative programs resolve differently once current_dir is set
        let script = workdir.join(format!("{name}.run"));
        let script = fs::canonicalize(&script).map_err(|e| ExecutorError::Spawn(script, e))?;
        let log = workdir.join(format!("{name}.log"));

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))
            .map_err(|e| ExecutorError::Spawn(script.clone(), e))?;

        let stdout = File::create(&log).map_err(|e| ExecutorError::Capture(log.clone(), e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| ExecutorError::Capture(log.clone(), e))?;

        let start = Instant::now();
        let mut child = Command::new(&script)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| ExecutorError::Spawn(script.clone(), e))?;

        debug!("Started {:?} as {}", script, child.id());

        let status = match self.timeout {
            Some(timeout) => match child
                .wait_timeout(timeout)
                .map_err(|e| ExecutorError::Spawn(script.clone(), e))?
            {
                Some(status) => status,
                None => {
                    // child hasn't exited yet
                    if let Err(e) = child.kill() {
                        warn!(error = ?e, "Failed to kill {:?}", script);
                    }
                    let _ = child.wait();

                    return Err(ExecutorError::Timeout { script, timeout });
                }
            },
            None => child
                .wait()
                .map_err(|e| ExecutorError::Spawn(script.clone(), e))?,
        };

        let execution = Execution {
            exit_code: status.code().unwrap_or(-1),
            runtime: start.elapsed().as_millis(),
            log,
        };

        info!(
            workdir = ?workdir,
            exit_code = execution.exit_code,
            runtime = execution.runtime,
            "Run script finished"
        );

        Ok(execution)
    }
}
