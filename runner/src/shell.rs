use std::{
    fmt::Debug,
    fs, io,
    path::Path,
    process::{Command, Output},
    time::Instant,
};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with status {status}: {stderr}")]
    Failed {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("Failed to stage files")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Default)]
/// container for everything a finished shell command reported
pub struct ShellOutput {
    pub runtime: u128,
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl ShellOutput {
    fn from_output(output: Output, start: Instant) -> Self {
        Self {
            runtime: start.elapsed().as_millis(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Place where shell commands can be executed, either this machine or a
/// remote host. Status queries and scheduler calls go through this so they
/// work the same on every target.
pub trait Shell: Debug + Send + Sync {
    /// host name used in logs
    fn label(&self) -> &str;

    fn is_remote(&self) -> bool;

    /// run `command` through `sh -c` (or the remote login shell)
    fn execute(&self, command: &str) -> Result<ShellOutput, ShellError>;

    /// copy the contents of the local directory `local` into `remote`
    fn upload(&self, local: &Path, remote: &Path) -> Result<(), ShellError>;
}

/// quote a string for use as a single shell word
pub fn quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        word.to_owned()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

pub fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

fn run(mut command: Command, program: &str) -> Result<ShellOutput, ShellError> {
    let start = Instant::now();
    let output = command.output().map_err(|source| ShellError::Spawn {
        program: program.to_owned(),
        source,
    })?;
    let output = ShellOutput::from_output(output, start);

    trace!(
        program = program,
        status = output.status,
        stdout = %output.stdout,
        "Shell command finished"
    );

    Ok(output)
}

#[derive(Debug, Clone)]
pub struct LocalShell {
    hostname: String,
}

impl LocalShell {
    pub fn new() -> Self {
        let hostname = nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| String::from("localhost"));

        Self { hostname }
    }
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let destination = to.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &destination)?;
        } else {
            fs::copy(entry.path(), destination)?;
        }
    }

    Ok(())
}

impl Shell for LocalShell {
    fn label(&self) -> &str {
        &self.hostname
    }

    fn is_remote(&self) -> bool {
        false
    }

    fn execute(&self, command: &str) -> Result<ShellOutput, ShellError> {
        debug!(host = %self.hostname, command = command, "Executing local command");

        let mut process = Command::new("sh");
        process.arg("-c").arg(command);

        run(process, "sh")
    }

    fn upload(&self, local: &Path, remote: &Path) -> Result<(), ShellError> {
        if local == remote {
            return Ok(());
        }

        copy_tree(local, remote)?;

        Ok(())
    }
}

/// Shell on a remote host reached through the `ssh` and `scp` binaries
#[derive(Debug, Clone)]
pub struct SshShell {
    host: String,
    options: Vec<String>,
}

impl SshShell {
    pub fn new(host: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            host: host.into(),
            options,
        }
    }

    fn check(&self, output: ShellOutput, command: &str) -> Result<ShellOutput, ShellError> {
        if output.success() {
            Ok(output)
        } else {
            Err(ShellError::Failed {
                command: format!("{} ({command})", self.host),
                status: output.status,
                stderr: output.stderr.trim().to_owned(),
            })
        }
    }
}

impl Shell for SshShell {
    fn label(&self) -> &str {
        &self.host
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn execute(&self, command: &str) -> Result<ShellOutput, ShellError> {
        debug!(host = %self.host, command = command, "Executing remote command");

        let mut process = Command::new("ssh");
        process
            .args(&self.options)
            .arg(&self.host)
            .arg(command);

        run(process, "ssh")
    }

    fn upload(&self, local: &Path, remote: &Path) -> Result<(), ShellError> {
        let mkdir = format!("mkdir -p {}", quote_path(remote));
        let output = self.execute(&mkdir)?;
        self.check(output, &mkdir)?;

        let entries = fs::read_dir(local)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, _>>()?;

        if entries.is_empty() {
            return Ok(());
        }

        let mut process = Command::new("scp");
        process
            .args(&self.options)
            .arg("-rp")
            .args(&entries)
            .arg(format!("{}:{}/", self.host, remote.to_string_lossy()));

        let output = run(process, "scp")?;
        self.check(output, "scp")?;

        debug!(host = %self.host, remote = ?remote, files = entries.len(), "Uploaded staged files");

        Ok(())
    }
}
