pub mod derived;
pub mod fragment;

use crate::{
    engines::{ArtifactBuilder, BuildError, DerivedPass},
    job::{Electronic, Job, JobContext, JobError, JobState, RunOutcome},
    molecule::MoleculeError,
};
use indexmap::IndexMap;
use std::{panic::Location, path::PathBuf};
use thiserror::Error;
use tracing::{error, info, instrument};

pub use fragment::Fragment;

/// name of the job holding the whole complex
pub const PARENT_NAME: &str = "complex";

#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("Composite job {0} has no fragments")]
    NoFragments(String),
    #[error("Composite job {0} has no molecule")]
    MissingMolecule(String),
    #[error("Fragment {0} has no atoms")]
    EmptyFragment(String),
    #[error("Fragment {0} is defined twice")]
    DuplicateFragment(String),
    #[error("Atom {index} of fragment {fragment} does not exist")]
    AtomIndex { fragment: String, index: usize },
    #[error("Atom {atom} is part of both {first} and {second}")]
    FragmentOverlap {
        atom: usize,
        first: String,
        second: String,
    },
    #[error("Atom {0} does not belong to any fragment")]
    UncoveredAtom(usize),
    #[error("Atom {0} has no frag flag")]
    UntaggedAtom(usize),
    #[error("Molecule flag {key} has invalid value {value}")]
    InvalidFlag { key: String, value: String },
    #[error("{engine} does not support the {pass}")]
    Unsupported {
        engine: &'static str,
        pass: DerivedPass,
    },
    #[error("Invalid fragment molecule")]
    Molecule(#[from] MoleculeError),
    #[error("Invalid derived job")]
    Build(#[from] BuildError),
    #[error("Job failed")]
    Job(#[from] JobError),
}

/// Fragment decomposition of one complex.
///
/// Every fragment becomes a child job in `run_directory/<name>/frag_<fragment>`.
/// The parent job `complex` in the same directory reads the children's
/// results and depends on all of them. Derived passes add further jobs next
/// to them at run time.
#[derive(Debug)]
pub struct FragmentJob<B: ArtifactBuilder> {
    name: String,
    /// configuration shared by every job, named like the parent job
    template: Job<B>,
    fragments: IndexMap<String, Fragment>,
    children: IndexMap<String, Job<B>>,
    passes: Vec<DerivedPass>,
    parent: Option<Job<B>>,
    derived: IndexMap<&'static str, Vec<Job<B>>>,
}

impl<B: ArtifactBuilder> FragmentJob<B> {
    pub fn new(
        name: impl Into<String>,
        run_directory: impl Into<PathBuf>,
        builder: B,
        context: JobContext,
    ) -> Self {
        let name = name.into();
        let directory = run_directory.into().join(&name);

        Self {
            template: Job::new(PARENT_NAME, directory, builder, context),
            name,
            fragments: IndexMap::new(),
            children: IndexMap::new(),
            passes: Vec::new(),
            parent: None,
            derived: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// configuration of the complex, inherited by every child
    pub fn parent_template(&self) -> &Job<B> {
        &self.template
    }

    pub fn parent_template_mut(&mut self) -> &mut Job<B> {
        &mut self.template
    }

    /// the parent job, assembled by [`FragmentJob::run`]
    pub fn parent(&self) -> Option<&Job<B>> {
        self.parent.as_ref()
    }

    pub fn fragments(&self) -> &IndexMap<String, Fragment> {
        &self.fragments
    }

    pub fn children(&self) -> &IndexMap<String, Job<B>> {
        &self.children
    }

    pub fn child(&self, fragment: &str) -> Option<&Job<B>> {
        self.children.get(fragment)
    }

    pub fn child_mut(&mut self, fragment: &str) -> Option<&mut Job<B>> {
        self.children.get_mut(fragment)
    }

    pub fn passes(&self) -> &[DerivedPass] {
        &self.passes
    }

    /// derived jobs by suffix, e.g. `_Ghost`
    pub fn derived(&self, suffix: &str) -> &[Job<B>] {
        self.derived
            .get(suffix)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Register a fragment made of the 0-based `atoms` of the complex.
    ///
    /// Returns the child job so fragment specific options such as the charge
    /// can be set on it.
    pub fn add_fragment(
        &mut self,
        name: &str,
        atoms: &[usize],
    ) -> Result<&mut Job<B>, CompositeError> {
        let molecule = self
            .template
            .molecule()
            .ok_or_else(|| CompositeError::MissingMolecule(self.name.clone()))?;

        if self.fragments.contains_key(name) {
            return Err(CompositeError::DuplicateFragment(name.to_owned()));
        }

        if atoms.is_empty() {
            return Err(CompositeError::EmptyFragment(name.to_owned()));
        }

        for &index in atoms {
            if index >= molecule.len() {
                return Err(CompositeError::AtomIndex {
                    fragment: name.to_owned(),
                    index,
                });
            }

            if let Some((other, _)) = self
                .fragments
                .iter()
                .find(|(_, fragment)| fragment.contains(index))
            {
                return Err(CompositeError::FragmentOverlap {
                    atom: index,
                    first: other.clone(),
                    second: name.to_owned(),
                });
            }
        }

        let subset = molecule.subset(atoms)?;
        let mut child = Job::new(
            format!("frag_{name}"),
            self.template.run_directory(),
            self.template.builder().clone(),
            self.template.context().clone(),
        );
        child.set_molecule(subset)?;

        self.fragments.insert(
            name.to_owned(),
            Fragment {
                atoms: atoms.to_vec(),
            },
        );

        Ok(self.children.entry(name.to_owned()).or_insert(child))
    }

    /// Register every fragment tagged in the molecule, see
    /// [`fragment::infer`].
    pub fn fragments_from_molecule(&mut self) -> Result<(), CompositeError> {
        let molecule = self
            .template
            .molecule()
            .ok_or_else(|| CompositeError::MissingMolecule(self.name.clone()))?;

        for inferred in fragment::infer(molecule)? {
            self.add_fragment(&inferred.name, &inferred.atoms)?
                .set_electronic(inferred.electronic);
        }

        Ok(())
    }

    /// enable a derived pass, fails if the engine cannot run it
    pub fn enable(&mut self, pass: DerivedPass) -> Result<&mut Self, CompositeError> {
        let builder = self.template.builder();

        if !builder.supports(pass) {
            return Err(CompositeError::Unsupported {
                engine: builder.engine(),
                pass,
            });
        }

        if !self.passes.contains(&pass) {
            self.passes.push(pass);
        }

        Ok(self)
    }

    fn validate(&self) -> Result<(), CompositeError> {
        let molecule = self
            .template
            .molecule()
            .ok_or_else(|| CompositeError::MissingMolecule(self.name.clone()))?;

        if self.fragments.is_empty() {
            return Err(CompositeError::NoFragments(self.name.clone()));
        }

        for index in 0..molecule.len() {
            if !self.fragments.values().any(|fragment| fragment.contains(index)) {
                return Err(CompositeError::UncoveredAtom(index));
            }
        }

        Ok(())
    }

    /// The complex with fragment tags and references to the child results,
    /// without dependencies.
    fn assemble(&mut self) -> Job<B> {
        let mut complex = self.template.derive(PARENT_NAME);
        let mut electronic = Electronic {
            unrestricted: self.template.electronic().unrestricted,
            ..Electronic::default()
        };

        if let Some(molecule) = complex.molecule_mut() {
            for (name, fragment) in self.fragments.iter() {
                for &index in &fragment.atoms {
                    if let Some(atom) = molecule.atoms.get_mut(index) {
                        atom.flags.insert(String::from("frag"), name.clone());
                    }
                }
            }
        }

        for (name, child) in self.children.iter_mut() {
            let workdir = child.workdir();
            let artifact = child.builder().result_artifact(&workdir, child.name());
            complex.set_fragment_reference(name, artifact);

            let child_electronic = child.electronic();
            electronic.charge += child_electronic.charge;
            electronic.spin_polarization += child_electronic.spin_polarization;
            electronic.unrestricted |= child_electronic.unrestricted;
        }

        complex.set_electronic(electronic);

        complex
    }

    /// Run children, then the parent, then every enabled derived pass.
    ///
    /// Children are always submitted before the parent, which depends on
    /// every one of them. Returns the outcome of every job by name in
    /// submission order.
    #[instrument(skip(self), fields(composite = %self.name), level = "info")]
    pub fn run(&mut self) -> Result<IndexMap<String, RunOutcome>, CompositeError> {
        self.validate()?;

        let mut outcomes = IndexMap::new();
        let excluded = self.template.builder().fragment_excluded_keys();

        // every job of the decomposition has to land on the same target
        self.template.resolve_target();

        for child in self.children.values_mut() {
            if child.state() == JobState::Configured {
                child.inherit(&self.template, excluded);
            }

            let outcome = child.run()?;
            outcomes.insert(child.name().to_owned(), outcome);
        }

        let complex = self.assemble();

        let mut parent = complex.derive(PARENT_NAME);
        for child in self.children.values() {
            parent.dependency(child);
        }

        info!(
            children = self.children.len(),
            charge = parent.electronic().charge,
            spin_polarization = parent.electronic().spin_polarization,
            "Assembled parent job"
        );

        outcomes.insert(parent.name().to_owned(), parent.run()?);
        self.parent = Some(parent);

        for pass in self.passes.clone() {
            match pass {
                DerivedPass::ZeroIteration => self.zero_iteration_pass(&complex, &mut outcomes)?,
                DerivedPass::Electrostatic => self.electrostatic_pass(&complex, &mut outcomes)?,
                DerivedPass::Counterpoise => self.counterpoise_pass(&complex, &mut outcomes)?,
            }
        }

        Ok(outcomes)
    }

    /// Configure the composite job and run it, logging instead of returning
    /// errors, see [`Job::configure_and_run`].
    #[track_caller]
    pub fn configure_and_run<F>(&mut self, configure: F) -> Option<IndexMap<String, RunOutcome>>
    where
        F: FnOnce(&mut Self) -> Result<(), CompositeError>,
    {
        let caller = Location::caller();

        match configure(self).and_then(|_| self.run()) {
            Ok(outcomes) => Some(outcomes),
            Err(e) => {
                error!(
                    file = caller.file(),
                    line = caller.line(),
                    composite = %self.name,
                    error = ?e,
                    "Composite job failed, continuing"
                );
                None
            }
        }
    }
}
