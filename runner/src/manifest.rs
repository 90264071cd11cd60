use crate::{
    composite::{CompositeError, FragmentJob},
    config::{Config, ConfigErrors, EnginesConfig},
    engines::{AmsBuilder, AmsEngine, BuildError, DerivedPass, Engines, OrcaBuilder, Task, XtbBuilder},
    job::{Electronic, Job, JobContext, JobError, JobFlags, PostScript, RunOutcome},
    molecule::{Molecule, MoleculeError},
    settings::OptionValue,
    target::Target,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest {0}")]
    Read(PathBuf, #[source] io::Error),
    #[error("Manifest is not valid")]
    Parse(#[from] serde_yaml::Error),
    #[error("Job {job} needs the field {field}")]
    MissingField { job: String, field: &'static str },
    #[error("Failed to load molecule {path}")]
    Molecule {
        path: PathBuf,
        #[source]
        source: MoleculeError,
    },
    #[error("Invalid target")]
    Target(#[from] ConfigErrors),
    #[error("Invalid engine options")]
    Build(#[from] BuildError),
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Orca,
    Adf,
    Band,
    Dftb,
    Xtb,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct TargetEntry {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct FragmentEntry {
    pub name: String,
    /// 1-based atom numbers, as printed by most viewers
    pub atoms: Vec<usize>,
    #[serde(default)]
    pub charge: i32,
    #[serde(default)]
    pub spin_polarization: u32,
    #[serde(default)]
    pub unrestricted: bool,
}

impl FragmentEntry {
    fn electronic(&self) -> Electronic {
        Electronic {
            charge: self.charge,
            spin_polarization: self.spin_polarization,
            unrestricted: self.unrestricted,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct JobEntry {
    pub name: String,
    pub engine: EngineKind,
    // relative to the manifest
    #[serde(default = "default_run_directory")]
    pub run_directory: PathBuf,
    // xyz file, relative to the manifest
    pub molecule: Option<PathBuf>,
    // ORCA method or AMS functional
    pub method: Option<String>,
    pub basis: Option<String>,
    pub task: Option<String>,
    // xTB parametrisation
    pub gfn: Option<u8>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub charge: i32,
    #[serde(default)]
    pub spin_polarization: u32,
    #[serde(default)]
    pub unrestricted: bool,
    // dotted option paths, e.g. `scf.maxiter: 200`
    #[serde(default)]
    pub settings: IndexMap<String, OptionValue>,
    #[serde(default)]
    pub batch: IndexMap<String, String>,
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
    #[serde(default)]
    pub flags: JobFlags,
    #[serde(default)]
    pub preambles: Vec<String>,
    #[serde(default)]
    pub postambles: Vec<String>,
    #[serde(default)]
    pub post_scripts: Vec<PostScript>,
    #[serde(default)]
    pub fragments: Vec<FragmentEntry>,
    // read fragments from the `frag` flags of the molecule
    #[serde(default)]
    pub infer_fragments: bool,
    #[serde(default)]
    pub passes: Vec<DerivedPass>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub jobs: Vec<JobEntry>,
    #[serde(skip)]
    base: PathBuf,
}

/// Outcome of one manifest entry, `None` when it failed
#[derive(Debug, Clone)]
pub struct EntryReport {
    pub name: String,
    pub outcomes: Option<IndexMap<String, RunOutcome>>,
}

/// Everything a manifest entry needs that can fail before a job exists
struct Prepared {
    builder: Engines,
    molecule: Option<Molecule>,
    targets: Vec<(Target, f64)>,
}

impl JobEntry {
    fn is_composite(&self) -> bool {
        self.infer_fragments || !self.fragments.is_empty() || !self.passes.is_empty()
    }

    fn builder(&self, engines: &EnginesConfig) -> Result<Engines, ManifestError> {
        let task = self
            .task
            .as_deref()
            .map(str::parse::<Task>)
            .transpose()?
            .unwrap_or_default();

        let ams = |engine: AmsEngine| {
            let mut builder = AmsBuilder::new(engine).task(task);
            if let Some(ref home) = engines.ams_home {
                builder = builder.ams_home(home);
            }
            if let Some(ref xc) = self.method {
                builder = builder.xc(xc);
            }
            if let Some(ref basis) = self.basis {
                builder = builder.basis(basis);
            }
            Engines::Ams(builder)
        };

        Ok(match self.engine {
            EngineKind::Orca => {
                let method = self.method.as_ref().ok_or_else(|| ManifestError::MissingField {
                    job: self.name.clone(),
                    field: "method",
                })?;

                let mut builder = OrcaBuilder::new(method)
                    .executable(&engines.orca)
                    .task(task);
                if let Some(ref basis) = self.basis {
                    builder = builder.basis(basis);
                }
                for keyword in &self.keywords {
                    builder = builder.keyword(keyword);
                }

                Engines::Orca(builder)
            }
            EngineKind::Adf => ams(AmsEngine::Adf),
            EngineKind::Band => ams(AmsEngine::Band),
            EngineKind::Dftb => ams(AmsEngine::Dftb),
            EngineKind::Xtb => Engines::Xtb(
                XtbBuilder::new()
                    .executable(&engines.xtb)
                    .gfn(self.gfn.unwrap_or(2))
                    .task(task),
            ),
        })
    }

    fn prepare(&self, base: &Path, config: &Config) -> Result<Prepared, ManifestError> {
        let molecule = match self.molecule {
            Some(ref path) => {
                let path = base.join(path);
                Some(
                    Molecule::load(&path)
                        .map_err(|source| ManifestError::Molecule { path, source })?,
                )
            }
            None => None,
        };

        let targets = self
            .targets
            .iter()
            .map(|entry| {
                config
                    .target(&entry.name)
                    .map(|(target, _)| (target, entry.weight))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Prepared {
            builder: self.builder(&config.engines)?,
            molecule,
            targets,
        })
    }

    /// apply everything but fragments to `job`
    fn configure(&self, job: &mut Job<Engines>, prepared: &Prepared, test_mode: bool) -> Result<(), JobError> {
        if let Some(ref molecule) = prepared.molecule {
            job.set_molecule(molecule.clone())?;
        }

        for (path, value) in self.settings.iter() {
            job.set(path, value.clone())?;
        }

        job.set_electronic(Electronic {
            charge: self.charge,
            spin_polarization: self.spin_polarization,
            unrestricted: self.unrestricted,
        });

        for line in &self.preambles {
            job.preamble(line.clone());
        }

        for line in &self.postambles {
            job.postamble(line.clone());
        }

        for post in &self.post_scripts {
            job.post_script(post.script.clone(), post.args.iter().cloned());
        }

        for (key, value) in self.batch.iter() {
            job.batch(key, value.clone());
        }

        for (target, weight) in prepared.targets.iter() {
            job.add_target(target.clone(), *weight)?;
        }

        *job.flags_mut() = self.flags;
        if test_mode {
            job.flags_mut().test_mode = true;
        }

        Ok(())
    }

    fn configure_composite(
        &self,
        composite: &mut FragmentJob<Engines>,
        prepared: &Prepared,
        test_mode: bool,
    ) -> Result<(), CompositeError> {
        self.configure(composite.parent_template_mut(), prepared, test_mode)?;

        if self.infer_fragments {
            composite.fragments_from_molecule()?;
        }

        for fragment in &self.fragments {
            let atoms = fragment
                .atoms
                .iter()
                .map(|&number| {
                    number.checked_sub(1).ok_or(CompositeError::AtomIndex {
                        fragment: fragment.name.clone(),
                        index: number,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            composite
                .add_fragment(&fragment.name, &atoms)?
                .set_electronic(fragment.electronic());
        }

        for pass in &self.passes {
            composite.enable(*pass)?;
        }

        Ok(())
    }
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|e| ManifestError::Read(path.to_path_buf(), e))?;

        let mut manifest: Manifest = serde_yaml::from_str(&contents)?;
        manifest.base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(manifest)
    }

    pub fn from_str_in(contents: &str, base: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let mut manifest: Manifest = serde_yaml::from_str(contents)?;
        manifest.base = base.into();

        Ok(manifest)
    }

    /// Run every job in order.
    ///
    /// A failing entry is logged and reported, the remaining entries are
    /// still attempted.
    pub fn run(&self, config: &Config, context: &JobContext, test_mode: bool) -> Vec<EntryReport> {
        let mut reports = Vec::with_capacity(self.jobs.len());

        for entry in &self.jobs {
            let prepared = match entry.prepare(&self.base, config) {
                Ok(prepared) => prepared,
                Err(e) => {
                    error!(job = %entry.name, error = ?e, "Failed to prepare job, continuing");
                    reports.push(EntryReport {
                        name: entry.name.clone(),
                        outcomes: None,
                    });
                    continue;
                }
            };

            let outcomes = if entry.is_composite() {
                let mut composite = FragmentJob::new(
                    entry.name.clone(),
                    self.base.join(&entry.run_directory),
                    prepared.builder.clone(),
                    context.clone(),
                );

                composite.configure_and_run(|composite| {
                    entry.configure_composite(composite, &prepared, test_mode)
                })
            } else {
                let mut job = Job::new(
                    entry.name.clone(),
                    self.base.join(&entry.run_directory),
                    prepared.builder.clone(),
                    context.clone(),
                );

                job.configure_and_run(|job| entry.configure(job, &prepared, test_mode))
                    .map(|outcome| IndexMap::from([(entry.name.clone(), outcome)]))
            };

            match outcomes {
                Some(ref outcomes) => info!(job = %entry.name, jobs = outcomes.len(), "Manifest entry done"),
                None => warn!(job = %entry.name, "Manifest entry failed"),
            }

            reports.push(EntryReport {
                name: entry.name.clone(),
                outcomes,
            });
        }

        reports
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_run_directory() -> PathBuf {
    PathBuf::from(".")
}
