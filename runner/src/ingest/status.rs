use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusName {
    Success,
    SuccessWithWarnings,
    Running,
    Failed,
    Unknown,
}

impl StatusName {
    pub fn code(self) -> char {
        match self {
            Self::Success => 'S',
            Self::SuccessWithWarnings => 'W',
            Self::Running => 'R',
            Self::Failed => 'F',
            Self::Unknown => 'U',
        }
    }

    /// fatal states are the ones that require a (re)run
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Failed | Self::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::SuccessWithWarnings => "SUCCESS_WITH_WARNINGS",
            Self::Running => "RUNNING",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StatusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status `{}`", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for StatusName {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "SUCCESS" => Ok(Self::Success),
            "SUCCESS_WITH_WARNINGS" | "SUCCESS(W)" => Ok(Self::SuccessWithWarnings),
            "RUNNING" => Ok(Self::Running),
            "FAILED" => Ok(Self::Failed),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Disposition of a calculation found in a working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub fatal: bool,
    pub name: StatusName,
    pub code: char,
    pub reasons: Vec<String>,
}

impl Status {
    pub fn new(name: StatusName) -> Self {
        Self {
            fatal: name.is_fatal(),
            name,
            code: name.code(),
            reasons: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    pub fn success() -> Self {
        Self::new(StatusName::Success)
    }

    pub fn running() -> Self {
        Self::new(StatusName::Running)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new(StatusName::Failed).with_reason(reason)
    }

    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::new(StatusName::Unknown).with_reason(reason)
    }

    /// Status of a calculation whose process is known to be gone.
    ///
    /// Output that still looks like a run in progress becomes `UNKNOWN`.
    pub fn stopped(self) -> Self {
        if self.name != StatusName::Running {
            return self;
        }

        self.reasons.into_iter().fold(
            Self::unknown("engine stopped without a termination marker"),
            Self::with_reason,
        )
    }
}
