// Tue Jan 15 2026 - Alex

pub mod config;
pub mod engine;
pub mod run;
pub mod ui;
pub mod utils;

pub use config::RunConfig;
pub use engine::{CancellationToken, Pipeline, PipelineError, PipelineReport, StageHandle, StageOptions, TaskQueue};
pub use run::{ManagedRun, RunError, RunHooks, RunOutcome};
