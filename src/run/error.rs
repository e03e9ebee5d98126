// Tue Oct 13 2026 - Alex

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("Non-existing {kind} directory: {path:?}")]
    InvalidDirectory { kind: &'static str, path: PathBuf },
}
