use super::{ArtifactBuilder, BuildContext, BuildError, DerivedPass, Task};
use crate::{
    settings::{Node, OptionValue, Settings},
    shell::quote_path,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Write,
    path::{Path, PathBuf},
};

/// Engine block inside an AMS input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmsEngine {
    #[default]
    Adf,
    Band,
    Dftb,
}

impl AmsEngine {
    fn keyword(self) -> &'static str {
        match self {
            Self::Adf => "ADF",
            Self::Band => "BAND",
            Self::Dftb => "DFTB",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmsBuilder {
    engine: AmsEngine,
    /// AMS installation, `$AMSBIN` of the run environment when absent
    ams_home: Option<PathBuf>,
    xc: Option<String>,
    basis: Option<String>,
    task: Task,
}

impl AmsBuilder {
    pub fn new(engine: AmsEngine) -> Self {
        Self {
            engine,
            ams_home: None,
            xc: None,
            basis: None,
            task: Task::SinglePoint,
        }
    }

    pub fn ams_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.ams_home = Some(home.into());
        self
    }

    /// exchange correlation functional, passed to LibXC
    pub fn xc(mut self, functional: impl Into<String>) -> Self {
        self.xc = Some(functional.into());
        self
    }

    pub fn basis(mut self, basis: impl Into<String>) -> Self {
        self.basis = Some(basis.into());
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.task = task;
        self
    }

    fn task_keyword(&self) -> &'static str {
        match self.task {
            Task::SinglePoint | Task::Frequencies => "SinglePoint",
            Task::GeometryOptimization => "GeometryOptimization",
            Task::TransitionStateSearch => "TransitionStateSearch",
        }
    }

    fn executable(&self) -> String {
        match &self.ams_home {
            Some(home) => quote_path(&home.join("bin").join("ams")),
            None => String::from("\"$AMSBIN/ams\""),
        }
    }
}

fn render_value(value: &OptionValue) -> String {
    match value {
        OptionValue::Bool(true) => String::from("Yes"),
        OptionValue::Bool(false) => String::from("No"),
        other => other.to_string(),
    }
}

/// render settings as AMS `Key value` lines and `Key ... End` blocks
fn render_blocks(out: &mut String, settings: &Settings, depth: usize) {
    let indent = "  ".repeat(depth);

    for (key, node) in settings.iter() {
        match node {
            Node::Value(value) => {
                let value = render_value(value);
                if value.is_empty() {
                    let _ = writeln!(out, "{indent}{key}");
                } else {
                    let _ = writeln!(out, "{indent}{key} {value}");
                }
            }
            Node::Branch(nested) => {
                let _ = writeln!(out, "{indent}{key}");
                render_blocks(out, nested, depth + 1);
                let _ = writeln!(out, "{indent}End");
            }
        }
    }
}

impl ArtifactBuilder for AmsBuilder {
    fn engine(&self) -> &'static str {
        "ams"
    }

    fn render_input(&self, ctx: &BuildContext) -> Result<String, BuildError> {
        let molecule = ctx.molecule()?;
        let electronic = ctx.electronic;
        let mut out = String::new();

        if !ctx.fragment_references.is_empty() && self.engine != AmsEngine::Adf {
            return Err(BuildError::Unsupported {
                engine: self.engine(),
                feature: format!("fragment references with the {} engine", self.engine.keyword()),
            });
        }

        let _ = writeln!(out, "Task {}\n", self.task_keyword());

        out.push_str("System\n  Atoms\n");
        for atom in &molecule.atoms {
            let symbol = if atom.ghost {
                format!("Gh.{}", atom.symbol)
            } else {
                atom.symbol.clone()
            };

            let _ = write!(
                out,
                "    {:<6} {:>16.10} {:>16.10} {:>16.10}",
                symbol, atom.coords[0], atom.coords[1], atom.coords[2]
            );

            match atom.fragment() {
                Some(fragment) if ctx.fragment_references.contains_key(fragment) => {
                    let _ = writeln!(out, " adf.f={fragment}");
                }
                _ => out.push('\n'),
            }
        }
        out.push_str("  End\n");
        if electronic.charge != 0 {
            let _ = writeln!(out, "  Charge {}", electronic.charge);
        }
        out.push_str("End\n\n");

        // everything but the engine block belongs to the AMS driver
        let driver = ctx.settings.without(&["engine"]);
        if !driver.is_empty() {
            render_blocks(&mut out, &driver, 0);
            out.push('\n');
        }

        if self.task == Task::Frequencies {
            out.push_str("Properties\n  NormalModes Yes\nEnd\n\n");
        }

        let _ = writeln!(out, "Engine {}", self.engine.keyword());

        if let Some(basis) = &self.basis {
            let _ = writeln!(out, "  Basis\n    Type {basis}\n  End");
        }

        if let Some(xc) = &self.xc {
            let _ = writeln!(out, "  XC\n    LibXC {xc}\n  End");
        }

        if electronic.unrestricted {
            out.push_str("  Unrestricted Yes\n");
            if self.engine == AmsEngine::Adf {
                let _ = writeln!(out, "  SpinPolarization {}", electronic.spin_polarization);
            }
        }

        if !ctx.fragment_references.is_empty() {
            out.push_str("  Fragments\n");
            for (fragment, reference) in ctx.fragment_references {
                let _ = writeln!(out, "    {fragment} {}", reference.to_string_lossy());
            }
            out.push_str("  End\n");
        }

        if let Some(engine) = ctx.settings.branch("engine") {
            render_blocks(&mut out, engine, 1);
        }

        out.push_str("EndEngine\n");

        Ok(out)
    }

    fn invocation(&self, ctx: &BuildContext) -> Result<Vec<String>, BuildError> {
        Ok(vec![
            format!("export AMS_JOBNAME={}", ctx.name),
            format!(
                "{} < {name}.in > {name}.out",
                self.executable(),
                name = ctx.name
            ),
        ])
    }

    fn result_artifact(&self, workdir: &Path, name: &str) -> PathBuf {
        let file = match self.engine {
            AmsEngine::Adf => "adf.rkf",
            AmsEngine::Band => "band.rkf",
            AmsEngine::Dftb => "dftb.rkf",
        };

        workdir.join(format!("{name}.results")).join(file)
    }

    fn fragment_excluded_keys(&self) -> &'static [&'static str] {
        &[
            "engine.removefragorbitals",
            "engine.irrepoccupations",
            "engine.excitations",
            "engine.occupations",
        ]
    }

    fn supports(&self, pass: DerivedPass) -> bool {
        match pass {
            DerivedPass::ZeroIteration => true,
            DerivedPass::Electrostatic | DerivedPass::Counterpoise => self.engine == AmsEngine::Adf,
        }
    }

    fn set_zero_iterations(&self, settings: &mut Settings) {
        match self.engine {
            AmsEngine::Dftb => settings.set("engine.maxscciterations", 0),
            AmsEngine::Adf | AmsEngine::Band => settings.set("engine.scf.iterations", 0),
        };
    }

    fn set_fitted_density(&self, settings: &mut Settings) -> Result<(), BuildError> {
        if self.engine != AmsEngine::Adf {
            return Err(BuildError::Unsupported {
                engine: self.engine(),
                feature: format!("fitted densities with the {} engine", self.engine.keyword()),
            });
        }

        settings.set("engine.stofit", "");

        Ok(())
    }
}
