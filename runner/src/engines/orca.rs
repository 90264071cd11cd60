use super::{ArtifactBuilder, BuildContext, BuildError, DerivedPass, Task};
use crate::{
    settings::{Node, Settings},
    shell::quote_path,
};
use itertools::Itertools;
use std::{
    fmt::Write,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, PartialEq)]
pub struct OrcaBuilder {
    executable: PathBuf,
    method: String,
    basis: Option<String>,
    task: Task,
    keywords: Vec<String>,
}

impl OrcaBuilder {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            executable: PathBuf::from("orca"),
            method: method.into(),
            basis: None,
            task: Task::SinglePoint,
            keywords: Vec::new(),
        }
    }

    /// ORCA must be started with its absolute path for parallel runs
    pub fn executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
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

    /// extra simple input keyword for the `!` line, e.g. `TightSCF`
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    fn task_keyword(&self) -> &'static str {
        match self.task {
            Task::SinglePoint => "SP",
            Task::GeometryOptimization => "Opt",
            Task::TransitionStateSearch => "OptTS",
            Task::Frequencies => "Freq",
        }
    }
}

fn render_nested(out: &mut String, settings: &Settings, depth: usize) {
    let indent = "  ".repeat(depth);

    for (key, node) in settings.iter() {
        match node {
            Node::Value(value) => {
                let _ = writeln!(out, "{indent}{key} {value}");
            }
            Node::Branch(nested) => {
                let _ = writeln!(out, "{indent}{key}");
                render_nested(out, nested, depth + 1);
                let _ = writeln!(out, "{indent}end");
            }
        }
    }
}

/// render settings as `%block ... end` sections
fn render_blocks(settings: &Settings) -> String {
    let mut out = String::new();

    for (key, node) in settings.iter() {
        match node {
            Node::Value(value) => {
                let _ = writeln!(out, "%{key} {value}");
            }
            Node::Branch(nested) => {
                let _ = writeln!(out, "%{key}");
                render_nested(&mut out, nested, 1);
                let _ = writeln!(out, "end");
            }
        }
    }

    out
}

impl ArtifactBuilder for OrcaBuilder {
    fn engine(&self) -> &'static str {
        "orca"
    }

    fn render_input(&self, ctx: &BuildContext) -> Result<String, BuildError> {
        let molecule = ctx.molecule()?;
        let mut out = String::new();

        let simple = [self.method.as_str()]
            .into_iter()
            .chain(self.basis.as_deref())
            .chain([self.task_keyword()])
            .chain(self.keywords.iter().map(String::as_str))
            .chain(ctx.electronic.unrestricted.then_some("UKS"))
            .join(" ");
        let _ = writeln!(out, "! {simple}");

        let blocks = render_blocks(ctx.settings);
        if !blocks.is_empty() {
            let _ = write!(out, "\n{blocks}");
        }

        if !ctx.fragment_references.is_empty() {
            out.push('\n');
            for (index, (fragment, reference)) in ctx.fragment_references.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "# fragment {} {fragment}: {}",
                    index + 1,
                    reference.to_string_lossy()
                );
            }
        }

        let _ = writeln!(
            out,
            "\n* xyz {} {}",
            ctx.electronic.charge,
            ctx.electronic.multiplicity()
        );

        for atom in &molecule.atoms {
            let mut label = atom.symbol.clone();

            if let Some(index) = atom.fragment().and_then(|f| ctx.fragment_index(f)) {
                let _ = write!(label, "({index})");
            }

            if atom.ghost {
                label.push(':');
            }

            let _ = writeln!(
                out,
                "  {:<8} {:>16.10} {:>16.10} {:>16.10}",
                label, atom.coords[0], atom.coords[1], atom.coords[2]
            );
        }

        out.push_str("*\n");

        Ok(out)
    }

    fn invocation(&self, ctx: &BuildContext) -> Result<Vec<String>, BuildError> {
        Ok(vec![format!(
            "{} {name}.in > {name}.out",
            quote_path(&self.executable),
            name = ctx.name
        )])
    }

    fn result_artifact(&self, workdir: &Path, name: &str) -> PathBuf {
        workdir.join(format!("{name}.gbw"))
    }

    fn fragment_excluded_keys(&self) -> &'static [&'static str] {
        &["moinp", "tddft", "cis", "scf.flipspin", "scf.finalms"]
    }

    fn supports(&self, pass: DerivedPass) -> bool {
        matches!(pass, DerivedPass::ZeroIteration | DerivedPass::Counterpoise)
    }

    fn set_zero_iterations(&self, settings: &mut Settings) {
        settings.set("scf.maxiter", 0);
    }
}
