use super::{ArtifactBuilder, BuildContext, BuildError, DerivedPass, Task};
use crate::{
    settings::{Node, Settings},
    shell::quote_path,
};
use std::{
    fmt::Write,
    path::{Path, PathBuf},
};

const COORDINATES: &str = "coords.xyz";

#[derive(Debug, Clone, PartialEq)]
pub struct XtbBuilder {
    executable: PathBuf,
    gfn: u8,
    task: Task,
}

impl Default for XtbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl XtbBuilder {
    pub fn new() -> Self {
        Self {
            executable: PathBuf::from("xtb"),
            gfn: 2,
            task: Task::SinglePoint,
        }
    }

    pub fn executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    /// parametrisation, GFN0, GFN1 or GFN2
    pub fn gfn(mut self, gfn: u8) -> Self {
        self.gfn = gfn;
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.task = task;
        self
    }
}

impl ArtifactBuilder for XtbBuilder {
    fn engine(&self) -> &'static str {
        "xtb"
    }

    /// xcontrol file, the geometry goes to a separate xyz file
    fn render_input(&self, ctx: &BuildContext) -> Result<String, BuildError> {
        let molecule = ctx.molecule()?;

        if molecule.atoms.iter().any(|atom| atom.ghost) {
            return Err(BuildError::Unsupported {
                engine: self.engine(),
                feature: String::from("ghost atoms"),
            });
        }

        if self.gfn > 2 {
            return Err(BuildError::InvalidOption {
                key: String::from("gfn"),
                reason: format!("GFN{} does not exist", self.gfn),
            });
        }

        let mut out = String::new();
        let _ = writeln!(out, "$chrg {}", ctx.electronic.charge);
        let _ = writeln!(out, "$spin {}", ctx.electronic.spin_polarization);

        for (key, node) in ctx.settings.iter() {
            match node {
                Node::Value(value) => {
                    let _ = writeln!(out, "${key} {value}");
                }
                Node::Branch(block) => {
                    let _ = writeln!(out, "${key}");
                    for (option, value) in block.flatten() {
                        let _ = writeln!(out, "   {option}={value}");
                    }
                }
            }
        }

        out.push_str("$end\n");

        Ok(out)
    }

    fn auxiliary_files(&self, ctx: &BuildContext) -> Result<Vec<(String, String)>, BuildError> {
        Ok(vec![(String::from(COORDINATES), ctx.molecule()?.to_xyz())])
    }

    fn invocation(&self, ctx: &BuildContext) -> Result<Vec<String>, BuildError> {
        let task = match self.task {
            Task::SinglePoint => "",
            Task::GeometryOptimization => " --opt",
            Task::Frequencies => " --hess",
            Task::TransitionStateSearch => {
                return Err(BuildError::Unsupported {
                    engine: self.engine(),
                    feature: String::from("transition state searches"),
                })
            }
        };

        Ok(vec![format!(
            "{} {COORDINATES} --input {name}.in --gfn {}{task} > {name}.out 2>&1",
            quote_path(&self.executable),
            self.gfn,
            name = ctx.name
        )])
    }

    fn result_artifact(&self, workdir: &Path, _name: &str) -> PathBuf {
        workdir.join("xtbrestart")
    }

    fn supports(&self, pass: DerivedPass) -> bool {
        pass == DerivedPass::ZeroIteration
    }

    fn set_zero_iterations(&self, settings: &mut Settings) {
        settings.set("scc.maxiterations", 0);
    }
}
