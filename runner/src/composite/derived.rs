use super::{CompositeError, FragmentJob, PARENT_NAME};
use crate::{
    engines::ArtifactBuilder,
    job::{Electronic, Job, RunOutcome},
};
use indexmap::IndexMap;
use itertools::Itertools;
use tracing::{debug, info};

pub const ZERO_ITERATION: &str = "_ZeroIter";
pub const FITTED_DENSITY: &str = "_STOFIT";
pub const NO_ELECTRONS: &str = "_NoElectrons";
pub const ELECTROSTATIC: &str = "_Elstat";
pub const GHOST: &str = "_Ghost";

/// The two stand-ins for a fragment in the electrostatic pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    FittedDensity,
    NoElectrons,
}

impl Variant {
    fn suffix(self) -> &'static str {
        match self {
            Self::FittedDensity => FITTED_DENSITY,
            Self::NoElectrons => NO_ELECTRONS,
        }
    }

    fn label(self) -> &'static str {
        &self.suffix()[1..]
    }
}

impl<B: ArtifactBuilder> FragmentJob<B> {
    fn record(&mut self, suffix: &'static str, job: Job<B>) {
        self.derived.entry(suffix).or_default().push(job);
    }

    fn find_derived(&self, suffix: &str, name: &str) -> Option<&Job<B>> {
        self.derived
            .get(suffix)
            .and_then(|jobs| jobs.iter().find(|job| job.name() == name))
    }

    /// the complex again with zero SCF cycles, on top of the children
    pub(super) fn zero_iteration_pass(
        &mut self,
        complex: &Job<B>,
        outcomes: &mut IndexMap<String, RunOutcome>,
    ) -> Result<(), CompositeError> {
        let mut job = complex.derive(format!("{PARENT_NAME}{ZERO_ITERATION}"));
        complex.builder().set_zero_iterations(job.settings_mut()?);

        for child in self.children.values() {
            job.dependency(child);
        }

        info!(workdir = ?job.workdir(), "Running zero iteration pass");

        outcomes.insert(job.name().to_owned(), job.run()?);
        self.record(ZERO_ITERATION, job);

        Ok(())
    }

    /// Run a fitted density and an electron free version of every fragment,
    /// then the complex for every combination of the two.
    pub(super) fn electrostatic_pass(
        &mut self,
        complex: &Job<B>,
        outcomes: &mut IndexMap<String, RunOutcome>,
    ) -> Result<(), CompositeError> {
        let mut variants = Vec::new();

        for (fragment, child) in self.children.iter() {
            let mut fitted = child.derive(format!("{}{FITTED_DENSITY}", child.name()));
            child.builder().set_fitted_density(fitted.settings_mut()?)?;

            let mut bare = child.derive(format!("{}{NO_ELECTRONS}", child.name()));
            let nuclear_charge = bare
                .molecule()
                .map(|molecule| molecule.nuclear_charge())
                .transpose()?
                .unwrap_or(0);
            bare.set_electronic(Electronic {
                charge: i32::try_from(nuclear_charge).unwrap_or(i32::MAX),
                spin_polarization: 0,
                unrestricted: false,
            });

            debug!(fragment = %fragment, nuclear_charge = nuclear_charge, "Removed all electrons");

            variants.push((FITTED_DENSITY, fitted));
            variants.push((NO_ELECTRONS, bare));
        }

        for (suffix, mut job) in variants {
            outcomes.insert(job.name().to_owned(), job.run()?);
            self.record(suffix, job);
        }

        let fragments = self.children.keys().cloned().collect_vec();
        let combinations = fragments
            .iter()
            .map(|_| [Variant::FittedDensity, Variant::NoElectrons])
            .multi_cartesian_product();

        for combination in combinations {
            let label = fragments
                .iter()
                .zip(combination.iter())
                .map(|(fragment, variant)| format!("{fragment}{}", variant.label()))
                .join("_");

            let mut job = complex.derive(format!("{PARENT_NAME}{ELECTROSTATIC}_{label}"));
            complex.builder().set_zero_iterations(job.settings_mut()?);
            job.clear_fragment_references();

            let mut electronic = Electronic::default();

            for (fragment, variant) in fragments.iter().zip(combination) {
                let Some(child) = self.children.get(fragment) else {
                    continue;
                };
                let name = format!("{}{}", child.name(), variant.suffix());

                let Some(source) = self.find_derived(variant.suffix(), &name) else {
                    continue;
                };

                let artifact = source.builder().result_artifact(
                    &source
                        .selected_target()
                        .map(|target| target.workdir(source.run_directory(), source.name()))
                        .unwrap_or_else(|| source.run_directory().join(source.name())),
                    source.name(),
                );
                job.set_fragment_reference(fragment, artifact);

                electronic.charge += source.electronic().charge;
                electronic.spin_polarization += source.electronic().spin_polarization;
                electronic.unrestricted |= source.electronic().unrestricted;

                job.dependency(source);
            }

            job.set_electronic(electronic);

            outcomes.insert(job.name().to_owned(), job.run()?);
            self.record(ELECTROSTATIC, job);
        }

        Ok(())
    }

    /// The complex once per fragment with every other atom as a ghost
    pub(super) fn counterpoise_pass(
        &mut self,
        complex: &Job<B>,
        outcomes: &mut IndexMap<String, RunOutcome>,
    ) -> Result<(), CompositeError> {
        let mut jobs = Vec::new();

        for (fragment, child) in self.children.iter() {
            let Some(atoms) = self.fragments.get(fragment).map(|f| f.atoms.clone()) else {
                continue;
            };

            let mut job = complex.derive(format!("{}{GHOST}", child.name()));
            job.clear_fragment_references();
            job.set_electronic(*child.electronic());

            if let Some(molecule) = job.molecule_mut() {
                for (index, atom) in molecule.atoms.iter_mut().enumerate() {
                    atom.ghost = !atoms.contains(&index);
                    atom.flags.shift_remove("frag");
                }
            }

            jobs.push(job);
        }

        for mut job in jobs {
            outcomes.insert(job.name().to_owned(), job.run()?);
            self.record(GHOST, job);
        }

        Ok(())
    }
}
