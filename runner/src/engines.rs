pub mod ams;
pub mod orca;
pub mod xtb;

use crate::{
    job::options::Electronic,
    molecule::{Molecule, MoleculeError},
    script::RunScript,
    settings::Settings,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Debug},
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;

pub use ams::{AmsBuilder, AmsEngine};
pub use orca::OrcaBuilder;
pub use xtb::XtbBuilder;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Job {0} has no molecule")]
    MissingMolecule(String),
    #[error("{engine} does not support {feature}")]
    Unsupported {
        engine: &'static str,
        feature: String,
    },
    #[error("Invalid value for option {key}: {reason}")]
    InvalidOption { key: String, reason: String },
    #[error("Invalid molecule")]
    Molecule(#[from] MoleculeError),
    #[error("Failed to write job files")]
    Io(#[from] io::Error),
}

/// Extra calculations a fragment job can derive from its complex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedPass {
    ZeroIteration,
    Electrostatic,
    Counterpoise,
}

impl fmt::Display for DerivedPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ZeroIteration => "zero iteration pass",
            Self::Electrostatic => "electrostatic pass",
            Self::Counterpoise => "counterpoise pass",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    #[default]
    SinglePoint,
    GeometryOptimization,
    TransitionStateSearch,
    Frequencies,
}

impl FromStr for Task {
    type Err = BuildError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "sp" | "singlepoint" => Ok(Self::SinglePoint),
            "opt" | "geometryoptimization" | "geometryoptimisation" => {
                Ok(Self::GeometryOptimization)
            }
            "ts" | "optts" | "transitionstatesearch" => Ok(Self::TransitionStateSearch),
            "freq" | "frequencies" | "hessian" => Ok(Self::Frequencies),
            other => Err(BuildError::InvalidOption {
                key: String::from("task"),
                reason: format!("unknown task `{other}`"),
            }),
        }
    }
}

/// Everything a builder may read while producing the job files
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub name: &'a str,
    /// final working directory on the selected target
    pub workdir: &'a Path,
    /// local directory the files are written to, equal to `workdir` for
    /// local targets
    pub staging: &'a Path,
    pub settings: &'a Settings,
    pub molecule: Option<&'a Molecule>,
    pub electronic: &'a Electronic,
    /// fragment name to the result artifact of the fragment's job
    pub fragment_references: &'a IndexMap<String, PathBuf>,
    pub preambles: &'a [String],
    pub postambles: &'a [String],
}

impl<'a> BuildContext<'a> {
    pub fn molecule(&self) -> Result<&'a Molecule, BuildError> {
        self.molecule
            .ok_or_else(|| BuildError::MissingMolecule(self.name.to_owned()))
    }

    /// index of the fragment an atom belongs to, 1-based in declaration order
    pub fn fragment_index(&self, fragment: &str) -> Option<usize> {
        self.fragment_references
            .get_index_of(fragment)
            .map(|index| index + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifacts {
    pub input: PathBuf,
    pub run_script: PathBuf,
}

/// Engine specific logic turning settings and molecule into job files.
///
/// New simulation engines are added by implementing this trait and adding a
/// variant to [`Engines`].
pub trait ArtifactBuilder: Clone + Debug + Send + Sync {
    fn engine(&self) -> &'static str;

    /// contents of `<name>.in`
    fn render_input(&self, ctx: &BuildContext) -> Result<String, BuildError>;

    /// shell lines starting the engine from inside the working directory
    fn invocation(&self, ctx: &BuildContext) -> Result<Vec<String>, BuildError>;

    /// additional `(file name, contents)` pairs written next to the input
    fn auxiliary_files(&self, _ctx: &BuildContext) -> Result<Vec<(String, String)>, BuildError> {
        Ok(Vec::new())
    }

    /// file a dependent job reads the converged result of this job from
    fn result_artifact(&self, workdir: &Path, name: &str) -> PathBuf;

    /// settings that must not be inherited by fragment jobs
    fn fragment_excluded_keys(&self) -> &'static [&'static str] {
        &[]
    }

    fn supports(&self, pass: DerivedPass) -> bool;

    /// limit the self consistent field to zero cycles
    fn set_zero_iterations(&self, settings: &mut Settings);

    /// replace the fragment density by its fitted representation
    fn set_fitted_density(&self, _settings: &mut Settings) -> Result<(), BuildError> {
        Err(BuildError::Unsupported {
            engine: self.engine(),
            feature: DerivedPass::Electrostatic.to_string(),
        })
    }

    /// Write `<name>.in`, auxiliary files and an executable `<name>.run`
    /// into the staging directory.
    ///
    /// Everything is rendered before the first file is written, so a
    /// configuration problem never leaves a half built directory behind.
    fn build(&self, ctx: &BuildContext) -> Result<BuildArtifacts, BuildError> {
        let input = self.render_input(ctx)?;
        let auxiliary = self.auxiliary_files(ctx)?;
        let script = RunScript::new()
            .preambles(ctx.preambles.iter().cloned())
            .invocation(self.invocation(ctx)?)
            .postambles(ctx.postambles.iter().cloned());

        fs::create_dir_all(ctx.staging)?;

        let input_path = ctx.staging.join(format!("{}.in", ctx.name));
        fs::write(&input_path, input)?;

        for (file, contents) in auxiliary {
            fs::write(ctx.staging.join(file), contents)?;
        }

        let run_script = ctx.staging.join(format!("{}.run", ctx.name));
        script.write(&run_script)?;

        debug!(engine = self.engine(), staging = ?ctx.staging, "Built job files");

        Ok(BuildArtifacts {
            input: input_path,
            run_script,
        })
    }
}

/// All builder variants, see [`OrcaBuilder`], [`AmsBuilder`] and [`XtbBuilder`]
#[derive(Debug, Clone)]
pub enum Engines {
    Orca(OrcaBuilder),
    Ams(AmsBuilder),
    Xtb(XtbBuilder),
}

impl From<OrcaBuilder> for Engines {
    fn from(builder: OrcaBuilder) -> Self {
        Self::Orca(builder)
    }
}

impl From<AmsBuilder> for Engines {
    fn from(builder: AmsBuilder) -> Self {
        Self::Ams(builder)
    }
}

impl From<XtbBuilder> for Engines {
    fn from(builder: XtbBuilder) -> Self {
        Self::Xtb(builder)
    }
}

impl ArtifactBuilder for Engines {
    fn engine(&self) -> &'static str {
        match self {
            Self::Orca(builder) => builder.engine(),
            Self::Ams(builder) => builder.engine(),
            Self::Xtb(builder) => builder.engine(),
        }
    }

    fn render_input(&self, ctx: &BuildContext) -> Result<String, BuildError> {
        match self {
            Self::Orca(builder) => builder.render_input(ctx),
            Self::Ams(builder) => builder.render_input(ctx),
            Self::Xtb(builder) => builder.render_input(ctx),
        }
    }

    fn invocation(&self, ctx: &BuildContext) -> Result<Vec<String>, BuildError> {
        match self {
            Self::Orca(builder) => builder.invocation(ctx),
            Self::Ams(builder) => builder.invocation(ctx),
            Self::Xtb(builder) => builder.invocation(ctx),
        }
    }

    fn auxiliary_files(&self, ctx: &BuildContext) -> Result<Vec<(String, String)>, BuildError> {
        match self {
            Self::Orca(builder) => builder.auxiliary_files(ctx),
            Self::Ams(builder) => builder.auxiliary_files(ctx),
            Self::Xtb(builder) => builder.auxiliary_files(ctx),
        }
    }

    fn result_artifact(&self, workdir: &Path, name: &str) -> PathBuf {
        match self {
            Self::Orca(builder) => builder.result_artifact(workdir, name),
            Self::Ams(builder) => builder.result_artifact(workdir, name),
            Self::Xtb(builder) => builder.result_artifact(workdir, name),
        }
    }

    fn fragment_excluded_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Orca(builder) => builder.fragment_excluded_keys(),
            Self::Ams(builder) => builder.fragment_excluded_keys(),
            Self::Xtb(builder) => builder.fragment_excluded_keys(),
        }
    }

    fn supports(&self, pass: DerivedPass) -> bool {
        match self {
            Self::Orca(builder) => builder.supports(pass),
            Self::Ams(builder) => builder.supports(pass),
            Self::Xtb(builder) => builder.supports(pass),
        }
    }

    fn set_zero_iterations(&self, settings: &mut Settings) {
        match self {
            Self::Orca(builder) => builder.set_zero_iterations(settings),
            Self::Ams(builder) => builder.set_zero_iterations(settings),
            Self::Xtb(builder) => builder.set_zero_iterations(settings),
        }
    }

    fn set_fitted_density(&self, settings: &mut Settings) -> Result<(), BuildError> {
        match self {
            Self::Orca(builder) => builder.set_fitted_density(settings),
            Self::Ams(builder) => builder.set_fitted_density(settings),
            Self::Xtb(builder) => builder.set_fitted_density(settings),
        }
    }
}
