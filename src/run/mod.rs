// Tue Oct 13 2026 - Alex

pub mod error;
pub mod managed;
pub mod marker;
pub mod signal;
pub mod tmp;

pub use error::RunError;
pub use managed::{ManagedRun, NoHooks, RunContext, RunHooks, RunState};
pub use marker::RunOutcome;
pub use tmp::TmpDir;
