use super::{
    status::{Status, StatusName},
    StatusProbe,
};
use crate::shell::{quote_path, Shell};
use std::{path::Path, sync::Arc};
use tracing::{debug, warn};

/// Status probe for a remote host.
///
/// Instead of reading result files over the network this runs the `read`
/// command of the CLI on the remote side and parses its one-word answer.
#[derive(Debug, Clone)]
pub struct RemoteStatusProbe {
    shell: Arc<dyn Shell>,
    cli_command: String,
}

impl RemoteStatusProbe {
    pub fn new(shell: Arc<dyn Shell>, cli_command: impl Into<String>) -> Self {
        Self {
            shell,
            cli_command: cli_command.into(),
        }
    }
}

impl StatusProbe for RemoteStatusProbe {
    fn read_status(&self, workdir: &Path) -> Status {
        let command = format!("{} read {} -s", self.cli_command, quote_path(workdir));

        match self.shell.execute(&command) {
            Ok(output) if output.success() => match output.stdout.trim().parse::<StatusName>() {
                Ok(name) => {
                    debug!(host = self.shell.label(), workdir = ?workdir, status = %name, "Read remote status");
                    Status::new(name)
                }
                Err(error) => Status::unknown(error.to_string()),
            },
            Ok(output) => Status::unknown(format!(
                "remote status query exited with {}: {}",
                output.status,
                output.stderr.trim()
            )),
            Err(error) => {
                warn!(host = self.shell.label(), error = ?error, "Remote status query failed");
                Status::unknown(error.to_string())
            }
        }
    }
}
