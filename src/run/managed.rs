// Wed Oct 14 2026 - Alex

use crate::config::RunConfig;
use crate::engine::{CancellationToken, Pipeline, PipelineReport};
use crate::run::error::RunError;
use crate::run::marker::{self, RunOutcome};
use crate::run::signal;
use crate::run::tmp::TmpDir;
use crate::utils::relative_path;
use anyhow::Context;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    TmpPrepared,
    PreRun,
    Running,
    PostRun,
    TmpCleaned,
    Success,
    Failure,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Success | RunState::Failure | RunState::Aborted)
    }
}

impl From<RunOutcome> for RunState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success => RunState::Success,
            RunOutcome::Failure => RunState::Failure,
            RunOutcome::Aborted => RunState::Aborted,
        }
    }
}

/// Paths a hook may need. Cloned out of the run so hooks can't touch the
/// pipeline while it executes.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub working_dir: PathBuf,
    pub output_dir: PathBuf,
    pub scratch_dir: Option<PathBuf>,
    pub tmp_dir: PathBuf,
}

impl RunContext {
    pub fn join<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.output_dir.join(path)
    }

    pub fn relpath<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        relative_path(path.as_ref(), &self.working_dir)
    }
}

pub trait RunHooks {
    fn prerun(&mut self, _ctx: &RunContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn postrun(&mut self, _ctx: &RunContext, _report: &PipelineReport) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct NoHooks;

impl RunHooks for NoHooks {}

/// A pipeline wrapped with directory bookkeeping, hooks and marker files.
///
/// `run` never fails outward: the outcome is returned and also published as
/// exactly one marker file in the output directory.
pub struct ManagedRun {
    config: RunConfig,
    output_dir: PathBuf,
    pipeline: Pipeline,
    hooks: Box<dyn RunHooks>,
    state: RunState,
    run_id: String,
    report: Option<PipelineReport>,
}

impl ManagedRun {
    pub fn new(config: RunConfig, pipeline: Pipeline) -> Result<Self, RunError> {
        config.validate().map_err(RunError::InvalidConfig)?;

        let output_dir = config
            .output_dir
            .clone()
            .ok_or_else(|| RunError::InvalidConfig("output_dir must be set".to_string()))?;

        check_dir("working", &config.working_dir)?;
        check_dir("output", &output_dir)?;
        if let Some(scratch) = &config.scratch_dir {
            check_dir("scratch", scratch)?;
        }

        let pipeline = if config.debug { pipeline.with_debug(true) } else { pipeline };

        Ok(Self {
            config,
            output_dir,
            pipeline,
            hooks: Box::new(NoHooks),
            state: RunState::Created,
            run_id: Uuid::new_v4().to_string(),
            report: None,
        })
    }

    pub fn with_hooks<H: RunHooks + 'static>(mut self, hooks: H) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn working_dir(&self) -> &Path {
        &self.config.working_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.output_dir.join(&self.config.tmp_name)
    }

    pub fn join<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.output_dir.join(path)
    }

    pub fn relpath<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        relative_path(path.as_ref(), &self.config.working_dir)
    }

    /// Stages may still be added until `run` is called.
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.pipeline.cancel_token()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The pipeline report, once the pipeline has returned.
    pub fn report(&self) -> Option<&PipelineReport> {
        self.report.as_ref()
    }

    pub fn marker_path(&self, outcome: RunOutcome) -> PathBuf {
        marker::marker_path(&self.output_dir, &self.config.marker_prefix, outcome)
    }

    pub fn run(&mut self) -> RunOutcome {
        if self.state != RunState::Created {
            log::error!("run {} was already executed", self.run_id);
            return RunOutcome::Failure;
        }

        log::info!(
            "run {} starting: output {}, {} stage(s)",
            self.run_id,
            self.output_dir.display(),
            self.pipeline.len()
        );

        if let Err(e) = marker::clear_markers(&self.output_dir, &self.config.marker_prefix) {
            log::error!("run {} failed: removing markers of a previous run: {}", self.run_id, e);
            self.publish(RunOutcome::Failure);
            self.transition(RunState::Failure);
            return RunOutcome::Failure;
        }

        let registration = if self.config.handle_signals {
            signal::register(self.cancel_token(), self.marker_path(RunOutcome::Aborted))
        } else {
            None
        };

        let outcome = match self.execute() {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("run {} failed: {:?}", self.run_id, e);
                RunOutcome::Failure
            }
        };

        let outcome = match registration {
            Some(registration) => registration.finish(outcome, |outcome| self.publish(outcome)),
            None => {
                self.publish(outcome);
                outcome
            }
        };

        self.transition(outcome.into());
        outcome
    }

    fn publish(&self, outcome: RunOutcome) {
        if let Err(e) = marker::write_marker(&self.output_dir, &self.config.marker_prefix, outcome) {
            log::error!("could not write {} marker: {}", outcome, e);
        }
    }

    fn execute(&mut self) -> anyhow::Result<RunOutcome> {
        let tmp = TmpDir::prepare(self.tmp_dir(), self.config.scratch_dir.as_deref())
            .with_context(|| format!("preparing tmp directory {}", self.tmp_dir().display()))?;
        self.transition(RunState::TmpPrepared);

        let ctx = self.context(&tmp);

        self.transition(RunState::PreRun);
        self.hooks.prerun(&ctx).context("prerun hook failed")?;

        self.transition(RunState::Running);
        let report = self.pipeline.run()?;
        let cancelled = report.cancelled;
        self.report = Some(report);

        if cancelled {
            tmp.cleanup().context("removing tmp directory")?;
            self.transition(RunState::TmpCleaned);
            return Ok(RunOutcome::Aborted);
        }

        self.transition(RunState::PostRun);
        if let Some(report) = &self.report {
            self.hooks.postrun(&ctx, report).context("postrun hook failed")?;
        }

        tmp.cleanup().context("removing tmp directory")?;
        self.transition(RunState::TmpCleaned);

        Ok(RunOutcome::Success)
    }

    fn context(&self, tmp: &TmpDir) -> RunContext {
        RunContext {
            run_id: self.run_id.clone(),
            working_dir: self.config.working_dir.clone(),
            output_dir: self.output_dir.clone(),
            scratch_dir: self.config.scratch_dir.clone(),
            tmp_dir: tmp.path().to_path_buf(),
        }
    }

    fn transition(&mut self, next: RunState) {
        log::info!("run {}: {:?} -> {:?}", self.run_id, self.state, next);
        self.state = next;
    }
}

fn check_dir(kind: &'static str, path: &Path) -> Result<(), RunError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(RunError::InvalidDirectory {
            kind,
            path: path.to_path_buf(),
        })
    }
}
