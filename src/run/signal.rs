// Wed Oct 14 2026 - Alex

use crate::engine::CancellationToken;
use crate::run::marker::{self, RunOutcome};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// The outcome of a signalled run is carried by its marker file only.
const SIGNAL_EXIT_CODE: i32 = 0;

struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
    abort_marker: PathBuf,
    interrupted: bool,
    abort_written: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    /// Nothing left to drain: end the process now.
    Exit,
    /// ABORTED was published and the runs were asked to drain.
    Cancelled,
}

static ACTIVE_RUNS: Lazy<Mutex<Vec<ActiveRun>>> = Lazy::new(|| Mutex::new(Vec::new()));
static HANDLER_INSTALLED: OnceCell<bool> = OnceCell::new();
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[cfg(test)]
pub(crate) static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Installs the process-wide SIGINT/SIGTERM handler once. Returns whether a
/// handler owned by this module is active.
pub fn install_handler() -> bool {
    *HANDLER_INSTALLED.get_or_init(|| match ctrlc::set_handler(on_signal) {
        Ok(()) => {
            log::debug!("interrupt/terminate handler installed");
            true
        }
        Err(e) => {
            log::warn!("could not install signal handler: {}", e);
            false
        }
    })
}

/// Registers a run so interrupts reach its cancellation token. `None` when
/// no handler could be installed.
pub(crate) fn register(cancel: CancellationToken, abort_marker: PathBuf) -> Option<SignalRegistration> {
    if !install_handler() {
        return None;
    }

    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    ACTIVE_RUNS.lock().push(ActiveRun {
        id,
        cancel,
        abort_marker,
        interrupted: false,
        abort_written: false,
    });

    Some(SignalRegistration { id, finished: false })
}

pub(crate) struct SignalRegistration {
    id: u64,
    finished: bool,
}

impl SignalRegistration {
    /// Deregisters the run and publishes its final marker while the handler
    /// is locked out. An interrupted run keeps the ABORTED marker the handler
    /// already wrote, whatever `outcome` the run reached.
    pub(crate) fn finish(mut self, outcome: RunOutcome, publish: impl FnOnce(RunOutcome)) -> RunOutcome {
        let mut runs = ACTIVE_RUNS.lock();

        let (interrupted, abort_written) = runs
            .iter()
            .find(|run| run.id == self.id)
            .map(|run| (run.interrupted, run.abort_written))
            .unwrap_or((false, false));
        runs.retain(|run| run.id != self.id);

        let outcome = if interrupted { RunOutcome::Aborted } else { outcome };
        if abort_written {
            log::info!("run was interrupted, keeping the {} marker", outcome);
        } else {
            publish(outcome);
        }

        drop(runs);
        self.finished = true;
        outcome
    }
}

impl Drop for SignalRegistration {
    fn drop(&mut self) {
        if !self.finished {
            ACTIVE_RUNS.lock().retain(|run| run.id != self.id);
        }
    }
}

fn on_signal() {
    let mut runs = ACTIVE_RUNS.lock();

    match dispatch(&mut runs) {
        SignalAction::Cancelled => {
            log::warn!("interrupt received: ABORTED written, draining queued tasks; interrupt again to exit now");
        }
        SignalAction::Exit => {
            log::warn!("interrupted, exiting without waiting for stages");
            std::process::exit(SIGNAL_EXIT_CODE);
        }
    }
}

fn dispatch(runs: &mut [ActiveRun]) -> SignalAction {
    if runs.is_empty() || runs.iter().any(|run| run.interrupted) {
        return SignalAction::Exit;
    }

    for run in runs.iter_mut() {
        run.interrupted = true;
        match marker::touch(&run.abort_marker) {
            Ok(()) => {
                run.abort_written = true;
                log::info!("wrote marker {}", run.abort_marker.display());
            }
            Err(e) => log::error!("could not write {}: {}", run.abort_marker.display(), e),
        }
        run.cancel.cancel();
    }
    SignalAction::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn active(id: u64, dir: &Path) -> ActiveRun {
        ActiveRun {
            id,
            cancel: CancellationToken::new(),
            abort_marker: dir.join(format!("ABORTED-{}", id)),
            interrupted: false,
            abort_written: false,
        }
    }

    #[test]
    fn test_first_interrupt_writes_abort_markers_and_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let mut runs = vec![active(1, dir.path()), active(2, dir.path())];

        assert_eq!(dispatch(&mut runs), SignalAction::Cancelled);
        for run in &runs {
            assert!(run.cancel.is_cancelled());
            assert!(run.abort_written);
            assert!(run.abort_marker.is_file());
        }

        assert_eq!(dispatch(&mut runs), SignalAction::Exit);
    }

    #[test]
    fn test_unwritable_abort_marker_is_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let mut runs = vec![active(1, &dir.path().join("missing"))];

        assert_eq!(dispatch(&mut runs), SignalAction::Cancelled);
        assert!(runs[0].interrupted);
        assert!(!runs[0].abort_written);
    }

    #[test]
    fn test_programmatic_cancel_does_not_escalate() {
        let dir = tempfile::tempdir().unwrap();
        let mut runs = vec![active(1, dir.path())];
        runs[0].cancel.cancel();
        assert_eq!(dispatch(&mut runs), SignalAction::Cancelled);
    }

    #[test]
    fn test_no_active_runs_exits() {
        assert_eq!(dispatch(&mut []), SignalAction::Exit);
    }

    #[test]
    fn test_finish_publishes_unless_interrupted() {
        let _serial = TEST_LOCK.lock();
        let dir = tempfile::tempdir().unwrap();

        let Some(registration) = register(CancellationToken::new(), dir.path().join("ABORTED")) else {
            return;
        };
        let id = registration.id;
        assert!(ACTIVE_RUNS.lock().iter().any(|run| run.id == id));

        let mut published = Vec::new();
        let outcome = registration.finish(RunOutcome::Success, |o| published.push(o));
        assert_eq!(outcome, RunOutcome::Success);
        assert_eq!(published, vec![RunOutcome::Success]);
        assert!(!ACTIVE_RUNS.lock().iter().any(|run| run.id == id));

        let cancel = CancellationToken::new();
        let Some(registration) = register(cancel.clone(), dir.path().join("ABORTED")) else {
            return;
        };
        assert_eq!(dispatch(&mut ACTIVE_RUNS.lock()), SignalAction::Cancelled);
        assert!(cancel.is_cancelled());

        let mut published = Vec::new();
        let outcome = registration.finish(RunOutcome::Failure, |o| published.push(o));
        assert_eq!(outcome, RunOutcome::Aborted);
        assert!(published.is_empty());
        assert!(dir.path().join("ABORTED").is_file());
    }

    #[test]
    fn test_dropped_registration_is_removed() {
        let _serial = TEST_LOCK.lock();
        let dir = tempfile::tempdir().unwrap();

        let Some(registration) = register(CancellationToken::new(), dir.path().join("ABORTED")) else {
            return;
        };
        let id = registration.id;
        drop(registration);
        assert!(!ACTIVE_RUNS.lock().iter().any(|run| run.id == id));
    }
}
