// Mon Oct 12 2026 - Alex

use crate::engine::cancel::CancellationToken;
use crate::engine::error::PipelineError;
use crate::engine::queue::{ProducerGuard, QueueControl, TaskQueue};
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageKind {
    Generator,
    Processor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageState {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl StageState {
    pub fn is_finished(&self) -> bool {
        matches!(self, StageState::Completed | StageState::Failed | StageState::Cancelled)
    }
}

/// Build-time options for a stage.
pub struct StageOptions<T> {
    name: Option<String>,
    output: Option<Arc<TaskQueue<T>>>,
    capacity: Option<usize>,
}

impl<T> StageOptions<T> {
    pub fn new() -> Self {
        Self {
            name: None,
            output: None,
            capacity: None,
        }
    }

    pub fn named(name: &str) -> Self {
        Self::new().with_name(name)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Publish into an existing queue instead of a fresh one (fan-in).
    pub fn with_output(mut self, output: impl Into<Arc<TaskQueue<T>>>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Bound the fresh output queue. Ignored when an output queue is given.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub(crate) fn into_parts(self) -> (Option<String>, Arc<TaskQueue<T>>) {
        let output = match (self.output, self.capacity) {
            (Some(queue), _) => queue,
            (None, Some(capacity)) => Arc::new(TaskQueue::bounded(capacity)),
            (None, None) => Arc::new(TaskQueue::new()),
        };
        (self.name, output)
    }
}

impl<T> Default for StageOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// What the build calls hand back: the stage name and its output queue.
pub struct StageHandle<T> {
    name: String,
    output: Arc<TaskQueue<T>>,
}

impl<T> StageHandle<T> {
    pub(crate) fn new(name: String, output: Arc<TaskQueue<T>>) -> Self {
        Self { name, output }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_queue(&self) -> Arc<TaskQueue<T>> {
        self.output.clone()
    }
}

impl<T> Clone for StageHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            output: self.output.clone(),
        }
    }
}

impl<T> From<&StageHandle<T>> for Arc<TaskQueue<T>> {
    fn from(handle: &StageHandle<T>) -> Self {
        handle.output.clone()
    }
}

impl<T> From<StageHandle<T>> for Arc<TaskQueue<T>> {
    fn from(handle: StageHandle<T>) -> Self {
        handle.output
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub kind: StageKind,
    pub state: StageState,
    pub consumed: usize,
    pub produced: usize,
    pub duration: Duration,
}

impl StageReport {
    pub fn succeeded(&self) -> bool {
        self.state == StageState::Completed
    }
}

pub(crate) struct StageStats {
    state: Mutex<StageState>,
    consumed: AtomicUsize,
    produced: AtomicUsize,
    start_time: Mutex<Option<Instant>>,
    end_time: Mutex<Option<Instant>>,
}

impl StageStats {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(StageState::Created),
            consumed: AtomicUsize::new(0),
            produced: AtomicUsize::new(0),
            start_time: Mutex::new(None),
            end_time: Mutex::new(None),
        }
    }

    pub(crate) fn start(&self) {
        *self.state.lock() = StageState::Running;
        *self.start_time.lock() = Some(Instant::now());
    }

    pub(crate) fn finish(&self, state: StageState) {
        *self.state.lock() = state;
        *self.end_time.lock() = Some(Instant::now());
    }

    pub(crate) fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn state(&self) -> StageState {
        *self.state.lock()
    }

    pub(crate) fn duration(&self) -> Duration {
        match (*self.start_time.lock(), *self.end_time.lock()) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub(crate) fn report(&self, name: &str, kind: StageKind) -> StageReport {
        StageReport {
            name: name.to_string(),
            kind,
            state: self.state(),
            consumed: self.consumed.load(Ordering::Relaxed),
            produced: self.produced.load(Ordering::Relaxed),
            duration: self.duration(),
        }
    }
}

/// First-failure cell shared by all stages of one run.
///
/// Recording the first failure closes every queue of the pipeline so no
/// stage stays blocked on a producer or consumer that is gone.
pub(crate) struct FailureSlot {
    first: Mutex<Option<PipelineError>>,
    queues: Vec<Arc<dyn QueueControl>>,
}

impl FailureSlot {
    pub(crate) fn new(queues: Vec<Arc<dyn QueueControl>>) -> Self {
        Self {
            first: Mutex::new(None),
            queues,
        }
    }

    pub(crate) fn record(&self, error: PipelineError) {
        let mut first = self.first.lock();
        if first.is_some() {
            log::warn!("additional stage failure after abort: {:#}", anyhow::Error::new(error));
            return;
        }

        log::error!("{}, aborting pipeline", error);
        *first = Some(error);
        drop(first);

        for queue in &self.queues {
            queue.close();
        }
    }

    pub(crate) fn is_tripped(&self) -> bool {
        self.first.lock().is_some()
    }

    pub(crate) fn take(&self) -> Option<PipelineError> {
        self.first.lock().take()
    }
}

/// Everything a running stage needs besides its own work function.
#[derive(Clone)]
pub(crate) struct StageContext {
    pub(crate) name: String,
    pub(crate) kind: StageKind,
    pub(crate) debug: bool,
    pub(crate) cancel: CancellationToken,
    pub(crate) stats: Arc<StageStats>,
    pub(crate) failures: Arc<FailureSlot>,
}

impl StageContext {
    pub(crate) fn trace(&self, message: std::fmt::Arguments<'_>) {
        if self.debug {
            log::debug!(">>> {}: {}", self.name, message);
        }
    }
}

pub(crate) type TaskIter<T> = Box<dyn Iterator<Item = anyhow::Result<T>>>;
pub(crate) type TaskSource<T> = Box<dyn FnOnce(&StageContext) -> TaskIter<T> + Send>;

/// Object-safe view of a stage, independent of its task type.
pub(crate) trait StageRunner: Send {
    fn kind(&self) -> StageKind;

    fn queues(&self) -> Vec<Arc<dyn QueueControl>>;

    /// Registers the stage as a producer of its output queue. Must run for
    /// every stage before any stage thread starts.
    fn arm(&mut self);

    fn execute(self: Box<Self>, ctx: &StageContext) -> StageState;
}

/// A thread-bound unit of the pipeline.
///
/// A generator wraps a task source. A processor is a generator whose source
/// drains an input queue through a work function, so it is a consumer of one
/// queue and a producer of another at the same time.
pub(crate) struct Stage<T> {
    kind: StageKind,
    output: Arc<TaskQueue<T>>,
    inputs: Vec<Arc<dyn QueueControl>>,
    source: TaskSource<T>,
    guard: Option<ProducerGuard<T>>,
}

impl<T: Send + 'static> Stage<T> {
    pub(crate) fn generator(output: Arc<TaskQueue<T>>, source: TaskSource<T>) -> Self {
        Self {
            kind: StageKind::Generator,
            output,
            inputs: Vec::new(),
            source,
            guard: None,
        }
    }

    pub(crate) fn processor<I, F>(input: Arc<TaskQueue<I>>, output: Arc<TaskQueue<T>>, work: F) -> Self
    where
        I: Send + 'static,
        F: FnMut(I) -> anyhow::Result<T> + Send + 'static,
    {
        let control: Arc<dyn QueueControl> = input.clone();
        Self {
            kind: StageKind::Processor,
            output,
            inputs: vec![control],
            source: drain_source(input, work),
            guard: None,
        }
    }
}

fn drain_source<I, O, F>(input: Arc<TaskQueue<I>>, mut work: F) -> TaskSource<O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I) -> anyhow::Result<O> + Send + 'static,
{
    Box::new(move |ctx: &StageContext| -> TaskIter<O> {
        let ctx = ctx.clone();
        Box::new(std::iter::from_fn(move || {
            ctx.trace(format_args!("Getting new task..."));
            let task = match input.pop(&ctx.name) {
                Some(task) => task,
                None => {
                    ctx.trace(format_args!("Got task: None"));
                    return None;
                }
            };
            ctx.stats.record_consumed();
            ctx.trace(format_args!("Got task"));
            Some(work(task))
        }))
    })
}

impl<T: Send + 'static> StageRunner for Stage<T> {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn queues(&self) -> Vec<Arc<dyn QueueControl>> {
        let output: Arc<dyn QueueControl> = self.output.clone();
        let mut queues = self.inputs.clone();
        queues.push(output);
        queues
    }

    fn arm(&mut self) {
        if self.guard.is_none() {
            self.guard = Some(ProducerGuard::new(self.output.clone()));
        }
    }

    fn execute(self: Box<Self>, ctx: &StageContext) -> StageState {
        let Stage {
            output,
            source,
            guard,
            ..
        } = *self;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| drive(source, &output, ctx)));

        let state = match outcome {
            Ok(Ok(state)) => state,
            Ok(Err(error)) => {
                ctx.failures.record(PipelineError::StageFailed {
                    stage: ctx.name.clone(),
                    source: error,
                });
                StageState::Failed
            }
            Err(payload) => {
                ctx.failures.record(PipelineError::StagePanicked {
                    stage: ctx.name.clone(),
                    message: panic_message(payload.as_ref()),
                });
                StageState::Failed
            }
        };

        // Unregister only after any failure is recorded, so downstream
        // consumers never mistake an aborted stream for a complete one.
        drop(guard);
        state
    }
}

fn drive<T>(source: TaskSource<T>, output: &TaskQueue<T>, ctx: &StageContext) -> anyhow::Result<StageState> {
    let mut tasks = source(ctx);

    loop {
        if ctx.kind == StageKind::Generator && ctx.cancel.is_cancelled() {
            log::warn!("{}: cancelled, no more tasks will be generated", ctx.name);
            return Ok(StageState::Cancelled);
        }

        let task = match tasks.next() {
            Some(task) => task?,
            None => break,
        };

        if output.push(task).is_err() {
            ctx.trace(format_args!("output queue closed, stopping"));
            return Ok(StageState::Cancelled);
        }
        ctx.stats.record_produced();
    }

    if ctx.failures.is_tripped() {
        Ok(StageState::Cancelled)
    } else {
        Ok(StageState::Completed)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
