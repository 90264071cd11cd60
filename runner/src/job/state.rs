use crate::{engines::BuildArtifacts, ingest::Status};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Configured,
    Skipped,
    Building,
    /// the builder refused the configuration, nothing was dispatched
    BuildFailed,
    /// files are written, dispatch was suppressed by test mode
    Built,
    Submitted,
    Succeeded,
    Failed,
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Skipped
                | Self::BuildFailed
                | Self::Built
                | Self::Succeeded
                | Self::Failed
                | Self::Unknown
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configured => "configured",
            Self::Skipped => "skipped",
            Self::Building => "building",
            Self::BuildFailed => "build failed",
            Self::Built => "built",
            Self::Submitted => "submitted",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };

        f.write_str(name)
    }
}

/// What a call to `run` ended with
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Skipped,
    BuildFailed,
    Built(BuildArtifacts),
    Submitted { id: String },
    Finished(Status),
}

impl RunOutcome {
    /// state the job is left in after this outcome
    pub fn state(&self) -> JobState {
        match self {
            Self::Skipped => JobState::Skipped,
            Self::BuildFailed => JobState::BuildFailed,
            Self::Built(_) => JobState::Built,
            Self::Submitted { .. } => JobState::Submitted,
            Self::Finished(status) => JobState::from(status),
        }
    }
}

impl From<&Status> for JobState {
    fn from(status: &Status) -> Self {
        use crate::ingest::StatusName;

        match status.name {
            StatusName::Success | StatusName::SuccessWithWarnings => Self::Succeeded,
            StatusName::Failed => Self::Failed,
            // still running after a local run returned means the engine died
            StatusName::Running | StatusName::Unknown => Self::Unknown,
        }
    }
}
