pub mod context;
pub mod options;
pub mod state;

use crate::{
    engines::{ArtifactBuilder, BuildContext},
    executors::{ExecutorError, Executors},
    ingest::{Status, StatusName},
    molecule::Molecule,
    scheduler::{BatchOptions, QueueRow, SchedulerError},
    script::RunScript,
    settings::{OptionValue, Settings},
    shell::{quote, quote_path, ShellError},
    target::{Target, TargetError, TargetSet},
};
use indexmap::IndexMap;
use itertools::Itertools;
use rand::Rng;
use std::{
    fs, io,
    panic::Location,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub use context::JobContext;
pub use options::{DependencyLink, Electronic, JobFlags, PostScript};
pub use state::{JobState, RunOutcome};

pub const SUBMIT_SCRIPT: &str = "submit.sh";

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Settings of job {0} are frozen, its files were already built")]
    Frozen(String),
    #[error("Invalid target")]
    Target(#[from] TargetError),
    #[error("Submission to the batch scheduler failed")]
    Submission(#[from] SchedulerError),
    #[error("Failed to run the job")]
    Dispatch(#[from] ExecutorError),
    #[error("Failed to transfer job files")]
    Transfer(#[from] ShellError),
    #[error("Failed to prepare the working directory")]
    Io(#[from] io::Error),
}

/// One calculation of one engine.
///
/// A job is configured through its setters and then materialized by
/// [`Job::run`]. The working directory is `run_directory/name` on the
/// selected target. Everything engine specific lives in the builder `B`.
#[derive(Debug)]
pub struct Job<B: ArtifactBuilder> {
    name: String,
    run_directory: PathBuf,
    builder: B,
    context: JobContext,
    settings: Settings,
    /// settings the files were built from, set once the build succeeded
    snapshot: Option<Arc<Settings>>,
    molecule: Option<Molecule>,
    electronic: Electronic,
    preambles: Vec<String>,
    postambles: Vec<String>,
    post_scripts: Vec<PostScript>,
    batch_options: BatchOptions,
    targets: TargetSet,
    selected_target: Option<usize>,
    flags: JobFlags,
    fragment_references: IndexMap<String, PathBuf>,
    scheduler_job_id: Option<String>,
    dependencies: Vec<DependencyLink>,
    state: JobState,
}

impl<B: ArtifactBuilder> Job<B> {
    pub fn new(
        name: impl Into<String>,
        run_directory: impl Into<PathBuf>,
        builder: B,
        context: JobContext,
    ) -> Self {
        Self {
            name: name.into(),
            run_directory: run_directory.into(),
            builder,
            context,
            settings: Settings::new(),
            snapshot: None,
            molecule: None,
            electronic: Electronic::default(),
            preambles: Vec::new(),
            postambles: Vec::new(),
            post_scripts: Vec::new(),
            batch_options: BatchOptions::new(),
            targets: TargetSet::new(),
            selected_target: None,
            flags: JobFlags::default(),
            fragment_references: IndexMap::new(),
            scheduler_job_id: None,
            dependencies: Vec::new(),
            state: JobState::Configured,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_directory(&self) -> &Path {
        &self.run_directory
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn context(&self) -> &JobContext {
        &self.context
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn snapshot(&self) -> Option<&Arc<Settings>> {
        self.snapshot.as_ref()
    }

    pub fn molecule(&self) -> Option<&Molecule> {
        self.molecule.as_ref()
    }

    pub fn electronic(&self) -> &Electronic {
        &self.electronic
    }

    pub fn preambles(&self) -> &[String] {
        &self.preambles
    }

    pub fn postambles(&self) -> &[String] {
        &self.postambles
    }

    pub fn batch_options(&self) -> &BatchOptions {
        &self.batch_options
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    pub fn flags(&self) -> &JobFlags {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut JobFlags {
        &mut self.flags
    }

    pub fn fragment_references(&self) -> &IndexMap<String, PathBuf> {
        &self.fragment_references
    }

    pub fn scheduler_job_id(&self) -> Option<&str> {
        self.scheduler_job_id.as_deref()
    }

    pub fn dependencies(&self) -> &[DependencyLink] {
        &self.dependencies
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn ensure_mutable(&self) -> Result<(), JobError> {
        match self.snapshot {
            Some(_) => Err(JobError::Frozen(self.name.clone())),
            None => Ok(()),
        }
    }

    pub fn settings_mut(&mut self) -> Result<&mut Settings, JobError> {
        self.ensure_mutable()?;
        Ok(&mut self.settings)
    }

    /// set the option at the dotted `path`, last write wins
    pub fn set(&mut self, path: &str, value: impl Into<OptionValue>) -> Result<&mut Self, JobError> {
        self.settings_mut()?.set(path, value);
        Ok(self)
    }

    pub fn builder_mut(&mut self) -> Result<&mut B, JobError> {
        self.ensure_mutable()?;
        Ok(&mut self.builder)
    }

    pub fn set_molecule(&mut self, molecule: Molecule) -> Result<&mut Self, JobError> {
        self.ensure_mutable()?;
        self.molecule = Some(molecule);
        Ok(self)
    }

    pub fn set_charge(&mut self, charge: i32) -> &mut Self {
        self.electronic.charge = charge;
        self
    }

    pub fn set_spin_polarization(&mut self, spin_polarization: u32) -> &mut Self {
        self.electronic.spin_polarization = spin_polarization;
        self
    }

    pub fn set_unrestricted(&mut self, unrestricted: bool) -> &mut Self {
        self.electronic.unrestricted = unrestricted;
        self
    }

    pub fn set_electronic(&mut self, electronic: Electronic) -> &mut Self {
        self.electronic = electronic;
        self
    }

    pub fn preamble(&mut self, line: impl Into<String>) -> &mut Self {
        self.preambles.push(line.into());
        self
    }

    pub fn postamble(&mut self, line: impl Into<String>) -> &mut Self {
        self.postambles.push(line.into());
        self
    }

    pub fn post_script<I, S>(&mut self, script: impl Into<PathBuf>, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.post_scripts.push(PostScript {
            script: script.into(),
            args: args.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// explicit scheduler flag, never overwritten by target defaults
    pub fn batch(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.batch_options.set(key, value);
        self
    }

    pub fn add_target(&mut self, target: Target, weight: f64) -> Result<&mut Self, JobError> {
        self.targets.add(target, weight)?;
        Ok(self)
    }

    pub(crate) fn set_fragment_reference(&mut self, fragment: &str, artifact: PathBuf) {
        self.fragment_references.insert(fragment.to_owned(), artifact);
    }

    pub(crate) fn clear_fragment_references(&mut self) {
        self.fragment_references.clear();
    }

    pub(crate) fn molecule_mut(&mut self) -> Option<&mut Molecule> {
        self.molecule.as_mut()
    }

    /// targets the job may end up on, the default target when none was added
    fn candidate_targets(&self) -> Vec<Target> {
        if self.targets.is_empty() {
            vec![self.context.default_target.clone()]
        } else {
            self.targets.iter().cloned().collect()
        }
    }

    /// the chosen target, if [`Job::resolve_target`] already ran
    pub fn selected_target(&self) -> Option<&Target> {
        match self.selected_target {
            Some(index) => self.targets.get(index),
            None if self.targets.is_empty() => Some(&self.context.default_target),
            None => None,
        }
    }

    pub fn resolve_target(&mut self) -> Target {
        self.resolve_target_with(&mut rand::thread_rng())
    }

    /// Choose a target by weight on first use and keep it for the lifetime
    /// of the job.
    pub fn resolve_target_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Target {
        if let Some(target) = self.selected_target.and_then(|index| self.targets.get(index)) {
            return target.clone();
        }

        match self.targets.choose(rng) {
            Some(index) => {
                self.selected_target = Some(index);
                let target = self.targets.get(index).cloned();

                if let Some(ref target) = target {
                    debug!(job = %self.name, target_name = %target.name, "Selected target");
                }

                target.unwrap_or_else(|| self.context.default_target.clone())
            }
            None => self.context.default_target.clone(),
        }
    }

    /// working directory on the selected target, resolving it if necessary
    pub fn workdir(&mut self) -> PathBuf {
        self.resolve_target()
            .workdir(&self.run_directory, &self.name)
    }

    /// working directory for logs and links, without resolving a target
    fn known_workdir(&self) -> PathBuf {
        match self.selected_target() {
            Some(target) => target.workdir(&self.run_directory, &self.name),
            None => Target::local().workdir(&self.run_directory, &self.name),
        }
    }

    fn staging_dir(&self, target: &Target, workdir: &Path) -> PathBuf {
        if target.is_local() {
            workdir.to_path_buf()
        } else {
            self.context
                .staging_root
                .join(&target.name)
                .join(&self.run_directory)
                .join(&self.name)
        }
    }

    /// Whether the work of this job is already done or underway on any of
    /// its targets.
    ///
    /// A finished calculation or an active scheduler queue entry for the
    /// working directory both count. Unknown and failed runs are never
    /// skipped. Output without a termination marker only counts while the
    /// scheduler still lists the directory, otherwise the engine died.
    pub fn can_skip(&self) -> bool {
        for target in self.candidate_targets() {
            let backend = self.context.connector.connect(&target);
            let workdir = target.workdir(&self.run_directory, &self.name);
            let status = backend.probe.read_status(&workdir);

            if !status.fatal && status.name != StatusName::Running {
                info!(
                    workdir = ?workdir,
                    target_name = %target.name,
                    status = %status.name,
                    "Skipping job, found a non-fatal status"
                );
                return true;
            }

            if let Some(scheduler) = backend.scheduler {
                match scheduler.workdir_info(&workdir) {
                    Ok(Some(row)) if row.is_active() => {
                        info!(
                            workdir = ?workdir,
                            target_name = %target.name,
                            id = %row.id,
                            state = %row.state_name,
                            "Skipping job, it is already queued"
                        );
                        return true;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = ?e, workdir = ?workdir, "Failed to query the queue"),
                }
            }

            if status.name == StatusName::Running {
                info!(
                    workdir = ?workdir,
                    target_name = %target.name,
                    "Output has no termination marker and nothing is queued, running again"
                );
            }
        }

        false
    }

    /// Queue entry of this job, matched by the id it was submitted as or by
    /// an active row for its working directory.
    ///
    /// The second match finds jobs submitted by an earlier invocation.
    pub fn queue_entry(&self) -> Option<QueueRow> {
        let targets = match self.selected_target() {
            Some(target) => vec![target.clone()],
            None => self.candidate_targets(),
        };

        for target in targets {
            let Some(scheduler) = self.context.connector.connect(&target).scheduler else {
                continue;
            };
            let workdir = target.workdir(&self.run_directory, &self.name);

            match scheduler.queue_snapshot() {
                Ok(rows) => {
                    let own_id = self.scheduler_job_id.as_deref();
                    let entry = rows.into_iter().find(|row| {
                        own_id == Some(row.id.as_str())
                            || (row.directory == workdir && row.is_active())
                    });

                    if entry.is_some() {
                        return entry;
                    }
                }
                Err(e) => warn!(error = ?e, workdir = ?workdir, "Failed to query the queue"),
            }
        }

        None
    }

    pub fn is_queued(&self) -> bool {
        self.queue_entry().is_some()
    }

    /// Make this job start after `other` finished in any state.
    ///
    /// Nothing is recorded when `other` is done and not queued. A queued
    /// `other` that was submitted by an earlier invocation is linked through
    /// the id of its queue entry. Returns whether a link was added.
    pub fn dependency<C: ArtifactBuilder>(&mut self, other: &Job<C>) -> bool {
        let workdir = other.known_workdir();
        let queued = other.queue_entry();

        if queued.is_none() && other.can_skip() {
            info!(
                workdir = ?self.known_workdir(),
                dependency = ?workdir,
                "Dependency is already done, not linking"
            );
            return false;
        }

        let scheduler_job_id = other
            .scheduler_job_id
            .clone()
            .or_else(|| queued.map(|row| row.id));

        match &scheduler_job_id {
            Some(id) => {
                self.batch_options.add_dependency(id);
                info!(
                    workdir = ?self.known_workdir(),
                    dependency = ?workdir,
                    id = %id,
                    "Added scheduler dependency"
                );
            }
            None => info!(
                workdir = ?self.known_workdir(),
                dependency = ?workdir,
                "Dependency has no scheduler id, relying on submission order"
            ),
        }

        self.dependencies.push(DependencyLink {
            name: other.name.clone(),
            workdir,
            scheduler_job_id,
        });

        true
    }

    /// user postambles followed by post-scripts and cleanup lines
    fn compose_postambles(&self, workdir: &Path) -> Vec<String> {
        let mut lines = self.postambles.clone();
        let workdir = quote_path(workdir);

        for post in &self.post_scripts {
            lines.push(
                std::iter::once(quote_path(&post.script))
                    .chain(post.args.iter().map(|arg| quote(arg)))
                    .join(" "),
            );
        }

        // the engine has stopped here, unmarked output means it died
        if self.flags.delete_on_fail {
            lines.push(format!(
                "case \"$({} read {workdir} -s)\" in {}|{}|{}) rm -rf {workdir} ;; esac",
                self.context.cli_command,
                StatusName::Failed,
                StatusName::Running,
                StatusName::Unknown
            ));
        }

        if self.flags.delete_on_finish {
            lines.push(format!("rm -rf {workdir}"));
        }

        lines
    }

    /// batch options of the submission, with the flags every submission needs
    fn submission_options(&self, workdir: &Path) -> BatchOptions {
        let mut options = self.batch_options.clone();

        if !options.contains_any(&["D", "chdir"]) {
            options.set("chdir", workdir.to_string_lossy());
        }

        if !options.contains_any(&["o", "output"]) {
            options.set("output", workdir.join("slurm.out").to_string_lossy());
        }

        if !options.contains_any(&["J", "job_name"]) {
            options.set("job_name", self.name.clone());
        }

        options
    }

    /// Materialize and dispatch the job.
    ///
    /// Build failures are logged and reported as [`RunOutcome::BuildFailed`],
    /// submission failures are returned as errors.
    #[instrument(skip(self), fields(job = %self.name), level = "info")]
    pub fn run(&mut self) -> Result<RunOutcome, JobError> {
        if self.can_skip() {
            self.state = JobState::Skipped;
            return Ok(RunOutcome::Skipped);
        }

        let target = self.resolve_target();
        self.batch_options.merge_defaults(&target.batch_defaults);

        let backend = self.context.connector.connect(&target);
        let workdir = target.workdir(&self.run_directory, &self.name);
        let staging = self.staging_dir(&target, &workdir);

        if self.flags.overwrite {
            if staging.exists() {
                debug!(workdir = ?workdir, "Removing previous working directory");
                fs::remove_dir_all(&staging)?;
            }

            if !target.is_local() {
                backend
                    .shell
                    .execute(&format!("rm -rf {}", quote_path(&workdir)))?;
            }
        } else if !target.is_local() && staging.exists() {
            // stale files from an earlier upload
            fs::remove_dir_all(&staging)?;
        }

        let postambles = self.compose_postambles(&workdir);

        self.state = JobState::Building;
        let snapshot = Arc::new(self.settings.clone());
        let ctx = BuildContext {
            name: &self.name,
            workdir: &workdir,
            staging: &staging,
            settings: &snapshot,
            molecule: self.molecule.as_ref(),
            electronic: &self.electronic,
            fragment_references: &self.fragment_references,
            preambles: &self.preambles,
            postambles: &postambles,
        };

        let artifacts = match self.builder.build(&ctx) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                error!(workdir = ?workdir, error = ?e, "Failed to build job files, not submitting");
                self.state = JobState::BuildFailed;
                return Ok(RunOutcome::BuildFailed);
            }
        };

        self.snapshot = Some(snapshot);

        if self.flags.test_mode {
            info!(workdir = ?workdir, "Test mode, not submitting");
            self.state = JobState::Built;
            return Ok(RunOutcome::Built(artifacts));
        }

        if !target.is_local() {
            backend.shell.upload(&staging, &workdir)?;
        }

        let run_script = workdir.join(format!("{}.run", self.name));

        let Some(scheduler) = backend.scheduler.clone() else {
            info!(workdir = ?workdir, host = backend.shell.label(), "Running job directly");

            let execution =
                Executors::for_backend(&backend, self.context.local_timeout).execute(&workdir, &self.name)?;
            let status = Status::stopped(backend.probe.read_status(&workdir));

            info!(
                workdir = ?workdir,
                exit_code = execution.exit_code,
                status = %status.name,
                "Job finished"
            );

            self.state = JobState::from(&status);
            return Ok(RunOutcome::Finished(status));
        };

        let options = self.submission_options(&workdir);
        let submission = scheduler.submit(&run_script, &options)?;

        RunScript::new()
            .invocation([submission.command.clone()])
            .write(&staging.join(SUBMIT_SCRIPT))?;

        if !target.is_local() {
            backend.shell.upload(&staging, &workdir)?;
        }

        info!(workdir = ?workdir, id = %submission.id, "Submitted job");

        self.scheduler_job_id = Some(submission.id.clone());
        self.state = JobState::Submitted;

        if !self.flags.wait_for_finish {
            return Ok(RunOutcome::Submitted { id: submission.id });
        }

        scheduler.wait(&submission.id, self.context.poll_interval)?;
        let status = Status::stopped(backend.probe.read_status(&workdir));

        info!(workdir = ?workdir, status = %status.name, "Job left the queue");

        self.state = JobState::from(&status);

        Ok(RunOutcome::Finished(status))
    }

    /// Configure the job and run it, logging instead of returning errors.
    ///
    /// Any error from `configure` or [`Job::run`] is logged together with
    /// the caller's location so that later jobs of the same script are
    /// still attempted.
    #[track_caller]
    pub fn configure_and_run<F>(&mut self, configure: F) -> Option<RunOutcome>
    where
        F: FnOnce(&mut Self) -> Result<(), JobError>,
    {
        let caller = Location::caller();

        match configure(self).and_then(|_| self.run()) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(
                    file = caller.file(),
                    line = caller.line(),
                    job = %self.name,
                    error = ?e,
                    "Job failed, continuing"
                );
                None
            }
        }
    }

    /// Fresh job sharing this job's configuration.
    ///
    /// Builder, targets (including the selection), flags, hooks and batch
    /// options are copied. Settings are replaced by `settings`, run state is
    /// not carried over.
    pub(crate) fn spawn(
        &self,
        name: impl Into<String>,
        run_directory: impl Into<PathBuf>,
        settings: Settings,
    ) -> Job<B> {
        let mut job = Job::new(name, run_directory, self.builder.clone(), self.context.clone());

        job.settings = settings;
        job.electronic = self.electronic;
        job.preambles = self.preambles.clone();
        job.postambles = self.postambles.clone();
        job.post_scripts = self.post_scripts.clone();
        job.batch_options = self.batch_options.clone();
        // links belong to the job that declared them
        job.batch_options.remove("dependency");
        job.batch_options.remove("kill_on_invalid_dep");
        job.targets = self.targets.clone();
        job.selected_target = self.selected_target;
        job.flags = self.flags;

        job
    }

    /// Take over the configuration of `parent`, keeping this job's own
    /// settings, hooks and batch options on top of the inherited ones.
    ///
    /// `excluded` settings of the parent are not inherited. The settings are
    /// copied, later changes to either job do not affect the other.
    pub(crate) fn inherit(&mut self, parent: &Job<B>, excluded: &[&str]) {
        let mut settings = parent.settings.without(excluded);
        settings.merge(&self.settings);
        self.settings = settings;
        self.builder = parent.builder.clone();

        self.preambles = parent
            .preambles
            .iter()
            .chain(self.preambles.iter())
            .cloned()
            .collect();
        self.postambles = parent
            .postambles
            .iter()
            .chain(self.postambles.iter())
            .cloned()
            .collect();
        self.post_scripts = parent
            .post_scripts
            .iter()
            .chain(self.post_scripts.iter())
            .cloned()
            .collect();

        let mut inherited = parent.batch_options.clone();
        inherited.remove("dependency");
        inherited.remove("kill_on_invalid_dep");
        self.batch_options.merge_defaults(&inherited);

        if self.targets.is_empty() {
            self.targets = parent.targets.clone();
            self.selected_target = parent.selected_target;
        }

        self.flags = parent.flags;
    }

    /// fresh job with an identical configuration under another name
    pub(crate) fn derive(&self, name: impl Into<String>) -> Job<B> {
        let mut job = self.spawn(name, self.run_directory.clone(), self.settings.clone());

        job.molecule = self.molecule.clone();
        job.fragment_references = self.fragment_references.clone();

        job
    }
}
