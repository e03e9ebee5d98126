// Mon Oct 12 2026 - Alex

pub mod cancel;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod stage;

pub use cancel::CancellationToken;
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineReport};
pub use queue::{ProducerGuard, QueueControl, QueueError, TaskQueue};
pub use stage::{StageHandle, StageKind, StageOptions, StageReport, StageState};
