// Mon Oct 12 2026 - Alex

use crate::engine::cancel::CancellationToken;
use crate::engine::error::PipelineError;
use crate::engine::queue::{QueueControl, TaskQueue};
use crate::engine::stage::{
    FailureSlot, Stage, StageContext, StageHandle, StageKind, StageOptions, StageReport, StageRunner,
    StageState, StageStats, TaskIter, TaskSource,
};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A named graph of generator and processor stages connected by queues.
///
/// Stages are added with the `add_*` calls and executed together by [`run`],
/// one OS thread per stage. `run` is a full barrier: it returns only once
/// every stage, including everything downstream, has drained and exited.
///
/// [`run`]: Pipeline::run
pub struct Pipeline {
    stages: IndexMap<String, Box<dyn StageRunner>>,
    names: Vec<String>,
    debug: bool,
    cancel: CancellationToken,
    started: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            stages: IndexMap::new(),
            names: Vec::new(),
            debug: false,
            cancel: CancellationToken::new(),
            started: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn add_generator<T, I, F>(&mut self, source: F) -> Result<StageHandle<T>, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce() -> I + Send + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        self.add_generator_with(StageOptions::new(), source)
    }

    pub fn add_generator_with<T, I, F>(
        &mut self,
        options: StageOptions<T>,
        source: F,
    ) -> Result<StageHandle<T>, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce() -> I + Send + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        self.add_try_generator_with(options, move || {
            source().into_iter().map(Ok::<T, std::convert::Infallible>)
        })
    }

    /// Generator whose source yields `Result`s. The first `Err` fails the
    /// stage and aborts the pipeline.
    pub fn add_try_generator_with<T, E, I, F>(
        &mut self,
        options: StageOptions<T>,
        source: F,
    ) -> Result<StageHandle<T>, PipelineError>
    where
        T: Send + 'static,
        E: Into<anyhow::Error> + 'static,
        F: FnOnce() -> I + Send + 'static,
        I: IntoIterator<Item = Result<T, E>>,
        I::IntoIter: 'static,
    {
        self.ensure_open()?;
        let (name, output) = options.into_parts();
        let name = self.claim_name(name)?;

        let task_source: TaskSource<T> = Box::new(move |_: &StageContext| -> TaskIter<T> {
            Box::new(source().into_iter().map(|item| item.map_err(Into::into)))
        });

        let stage = Stage::generator(output.clone(), task_source);
        Ok(self.insert(name, output, Box::new(stage)))
    }

    pub fn add_processor<I, O, F>(
        &mut self,
        input: impl Into<Arc<TaskQueue<I>>>,
        work: F,
    ) -> Result<StageHandle<O>, PipelineError>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: FnMut(I) -> anyhow::Result<O> + Send + 'static,
    {
        self.add_processor_with(input, StageOptions::new(), work)
    }

    pub fn add_processor_with<I, O, F>(
        &mut self,
        input: impl Into<Arc<TaskQueue<I>>>,
        options: StageOptions<O>,
        work: F,
    ) -> Result<StageHandle<O>, PipelineError>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: FnMut(I) -> anyhow::Result<O> + Send + 'static,
    {
        self.ensure_open()?;
        let (name, output) = options.into_parts();
        let name = self.claim_name(name)?;

        let stage = Stage::processor(input.into(), output.clone(), work);
        Ok(self.insert(name, output, Box::new(stage)))
    }

    fn ensure_open(&self) -> Result<(), PipelineError> {
        if self.started {
            Err(PipelineError::AlreadyStarted)
        } else {
            Ok(())
        }
    }

    fn claim_name(&self, name: Option<String>) -> Result<String, PipelineError> {
        let name = name.unwrap_or_else(|| format!("node-{:02}", self.names.len()));
        if self.names.contains(&name) {
            return Err(PipelineError::DuplicateStage(name));
        }
        Ok(name)
    }

    fn insert<T>(&mut self, name: String, output: Arc<TaskQueue<T>>, stage: Box<dyn StageRunner>) -> StageHandle<T> {
        log::debug!("added {:?} stage '{}'", stage.kind(), name);
        self.stages.insert(name.clone(), stage);
        self.names.push(name.clone());
        StageHandle::new(name, output)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stage names in insertion order. Still available after `run`.
    pub fn stage_names(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Starts every stage thread and joins all of them.
    ///
    /// Returns the first stage failure, if any. The pipeline can run once.
    pub fn run(&mut self) -> Result<PipelineReport, PipelineError> {
        self.ensure_open()?;
        self.started = true;

        let start = Instant::now();
        let mut stages = std::mem::take(&mut self.stages);

        let queues: Vec<Arc<dyn QueueControl>> = stages.values().flat_map(|stage| stage.queues()).collect();
        let failures = Arc::new(FailureSlot::new(queues));

        // Every producer is registered before the first thread starts, so no
        // consumer can observe an empty queue with zero producers too early.
        for stage in stages.values_mut() {
            stage.arm();
        }

        log::info!("starting pipeline with {} stage(s)", stages.len());

        let mut running: Vec<RunningStage> = Vec::with_capacity(stages.len());
        for (name, stage) in stages {
            let kind = stage.kind();
            let stats = Arc::new(StageStats::new());
            let ctx = StageContext {
                name: name.clone(),
                kind,
                debug: self.debug,
                cancel: self.cancel.clone(),
                stats: stats.clone(),
                failures: failures.clone(),
            };

            let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                ctx.stats.start();
                let state = stage.execute(&ctx);
                ctx.stats.finish(state);
                log::debug!("stage '{}' finished: {:?}", ctx.name, state);
            });

            let handle = match spawned {
                Ok(handle) => Some(handle),
                Err(source) => {
                    stats.finish(StageState::Failed);
                    failures.record(PipelineError::Spawn {
                        stage: name.clone(),
                        source,
                    });
                    None
                }
            };

            running.push(RunningStage {
                name,
                kind,
                stats,
                handle,
            });
        }

        for stage in running.iter_mut() {
            if let Some(handle) = stage.handle.take() {
                if handle.join().is_err() {
                    stage.stats.finish(StageState::Failed);
                    failures.record(PipelineError::StagePanicked {
                        stage: stage.name.clone(),
                        message: "stage thread panicked outside its work loop".to_string(),
                    });
                }
            }
        }

        if let Some(error) = failures.take() {
            return Err(error);
        }

        let report = PipelineReport {
            stages: running.iter().map(|s| s.stats.report(&s.name, s.kind)).collect(),
            elapsed: start.elapsed(),
            cancelled: self.cancel.is_cancelled(),
        };

        log::info!(
            "pipeline finished in {}{}",
            crate::utils::format_duration(report.elapsed),
            if report.cancelled { " (cancelled)" } else { "" }
        );

        Ok(report)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

struct RunningStage {
    name: String,
    kind: StageKind,
    stats: Arc<StageStats>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl PipelineReport {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn total_consumed(&self) -> usize {
        self.stages.iter().map(|s| s.consumed).sum()
    }

    pub fn total_produced(&self) -> usize {
        self.stages.iter().map(|s| s.produced).sum()
    }

    pub fn all_completed(&self) -> bool {
        self.stages.iter().all(|s| s.succeeded())
    }
}
