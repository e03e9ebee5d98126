// Mon Oct 12 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Duplicated stage name '{0}'")]
    DuplicateStage(String),
    #[error("Pipeline already started, stages can no longer be added or run")]
    AlreadyStarted,
    #[error("Failed to spawn thread for stage '{stage}'")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Stage '{stage}' failed")]
    StageFailed {
        stage: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Stage '{stage}' panicked: {message}")]
    StagePanicked { stage: String, message: String },
}

impl PipelineError {
    /// Name of the stage that caused the error, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::Spawn { stage, .. }
            | PipelineError::StageFailed { stage, .. }
            | PipelineError::StagePanicked { stage, .. } => Some(stage),
            PipelineError::DuplicateStage(name) => Some(name),
            PipelineError::AlreadyStarted => None,
        }
    }
}
