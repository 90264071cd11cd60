use super::{BatchOptions, BatchScheduler, QueueRow, SchedulerError, Submission};
use crate::shell::{quote, quote_path, Shell};
use itertools::Itertools;
use once_cell::sync::OnceCell;
use std::{path::Path, path::PathBuf, sync::Arc};
use tracing::{debug, info};

const QUEUE_FORMAT: &str = "%Z|%A|%t|%T";

/// Slurm adapter issuing `sbatch` and `squeue` through a [`Shell`], which
/// makes it usable on this machine as well as over ssh.
#[derive(Debug)]
pub struct SlurmScheduler {
    shell: Arc<dyn Shell>,
    available: OnceCell<bool>,
}

impl SlurmScheduler {
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        Self {
            shell,
            available: OnceCell::new(),
        }
    }
}

/// extract the job id from `sbatch --parsable` or plain `sbatch` output
pub fn parse_submission(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).find(|line| !line.is_empty())?;
    let candidate = match line.strip_prefix("Submitted batch job") {
        Some(rest) => rest.trim(),
        None => line.split(';').next().unwrap_or(line).trim(),
    };

    if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit() || c == '_') {
        Some(candidate.to_owned())
    } else {
        None
    }
}

/// parse `squeue` rows printed with [`QUEUE_FORMAT`]
pub fn parse_queue(stdout: &str) -> Vec<QueueRow> {
    stdout
        .lines()
        .filter_map(|line| {
            let (directory, id, state_code, state_name) =
                line.trim().splitn(4, '|').collect_tuple()?;

            Some(QueueRow {
                directory: PathBuf::from(directory),
                id: id.to_owned(),
                state_code: state_code.to_owned(),
                state_name: state_name.to_owned(),
            })
        })
        .collect()
}

impl BatchScheduler for SlurmScheduler {
    fn has_scheduler(&self) -> bool {
        *self.available.get_or_init(|| {
            let available = self
                .shell
                .execute("command -v sbatch")
                .map(|output| output.success() && !output.stdout.trim().is_empty())
                .unwrap_or(false);

            debug!(host = self.shell.label(), available = available, "Probed for sbatch");

            available
        })
    }

    fn submit(&self, script: &Path, options: &BatchOptions) -> Result<Submission, SchedulerError> {
        let command = ["sbatch", "--parsable"]
            .into_iter()
            .map(String::from)
            .chain(options.to_args().iter().map(|arg| quote(arg)))
            .chain(std::iter::once(quote_path(script)))
            .join(" ");

        let output = self.shell.execute(&command)?;

        if !output.success() {
            return Err(SchedulerError::Rejected {
                script: script.to_path_buf(),
                reason: output.stderr.trim().to_owned(),
            });
        }

        let id = parse_submission(&output.stdout)
            .ok_or_else(|| SchedulerError::Reply(output.stdout.trim().to_owned()))?;

        info!(host = self.shell.label(), id = %id, script = ?script, "Submitted to slurm");

        Ok(Submission { id, command })
    }

    fn queue_snapshot(&self) -> Result<Vec<QueueRow>, SchedulerError> {
        let output = self.shell.execute(&format!(
            "squeue --me --noheader --format={}",
            quote(QUEUE_FORMAT)
        ))?;

        if !output.success() {
            return Err(SchedulerError::Reply(output.stderr.trim().to_owned()));
        }

        Ok(parse_queue(&output.stdout))
    }
}
