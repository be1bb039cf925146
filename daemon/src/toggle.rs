//! Hotkey-driven visibility toggling, serialized against overlapping
//! triggers.
//!
//! The controller owns a single in-flight flag.  A trigger that arrives
//! while a toggle is still running is dropped outright; the hotkey channel
//! must never queue up chrome operations.  The flag is an atomic
//! compare-and-set because trigger delivery and the chrome call finishing
//! race on real threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::window::{WindowChrome, WindowStateQuery, WindowVisibility};

pub struct HotkeyToggleController {
    query: WindowStateQuery,
    chrome: Arc<dyn WindowChrome>,
    toggle_in_flight: Arc<AtomicBool>,
}

impl HotkeyToggleController {
    pub fn new(chrome: Arc<dyn WindowChrome>) -> Self {
        Self {
            query: WindowStateQuery::new(Arc::clone(&chrome)),
            chrome,
            toggle_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handles one hotkey trigger.
    ///
    /// Returns the handle of the spawned chrome operation, or `None` when
    /// the trigger was dropped because a toggle is already in flight.  The
    /// in-flight guard clears when the operation completes, success or
    /// failure.
    pub fn trigger(&self) -> Option<JoinHandle<()>> {
        if self
            .toggle_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("toggle already in flight; dropping trigger");
            return None;
        }

        let query = self.query.clone();
        let chrome = Arc::clone(&self.chrome);
        let guard = Arc::clone(&self.toggle_in_flight);
        // Chrome calls are synchronous OS calls; keep them off the runtime's
        // async workers.
        Some(tokio::task::spawn_blocking(move || {
            run_toggle(&query, chrome.as_ref());
            guard.store(false, Ordering::Release);
        }))
    }
}

fn run_toggle(query: &WindowStateQuery, chrome: &dyn WindowChrome) {
    match query.current() {
        Ok(WindowVisibility::Normal) | Ok(WindowVisibility::Maximized) => {
            if let Err(err) = chrome.minimize() {
                warn!(error = %err, "minimize failed");
            }
        }
        Ok(WindowVisibility::Minimized) => {
            if let Err(err) = chrome.restore() {
                warn!(error = %err, "restore failed");
            }
        }
        Ok(WindowVisibility::Closed) => {
            // Terminal state: never call chrome against a closed window.
            warn!("overlay window is closed; ignoring toggle");
        }
        Err(err) => {
            warn!(error = %err, "window state query failed; ignoring toggle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::error::ChromeError;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Minimize,
        Restore,
    }

    struct FakeChrome {
        state: Mutex<WindowVisibility>,
        calls: Mutex<Vec<Call>>,
        /// When set, `minimize` blocks until a token arrives.
        gate: Option<Mutex<std_mpsc::Receiver<()>>>,
        fail_ops: bool,
    }

    impl FakeChrome {
        fn new(state: WindowVisibility) -> Self {
            Self {
                state: Mutex::new(state),
                calls: Mutex::new(Vec::new()),
                gate: None,
                fail_ops: false,
            }
        }

        fn gated(state: WindowVisibility) -> (Self, std_mpsc::Sender<()>) {
            let (tx, rx) = std_mpsc::channel();
            let chrome = Self {
                state: Mutex::new(state),
                calls: Mutex::new(Vec::new()),
                gate: Some(Mutex::new(rx)),
                fail_ops: false,
            };
            (chrome, tx)
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl WindowChrome for FakeChrome {
        fn current_state(&self) -> Result<WindowVisibility, ChromeError> {
            Ok(*self.state.lock().unwrap())
        }

        fn minimize(&self) -> Result<(), ChromeError> {
            if let Some(gate) = &self.gate {
                gate.lock().unwrap().recv().unwrap();
            }
            self.calls.lock().unwrap().push(Call::Minimize);
            if self.fail_ops {
                return Err(ChromeError::Platform("access denied".into()));
            }
            *self.state.lock().unwrap() = WindowVisibility::Minimized;
            Ok(())
        }

        fn restore(&self) -> Result<(), ChromeError> {
            self.calls.lock().unwrap().push(Call::Restore);
            if self.fail_ops {
                return Err(ChromeError::Platform("access denied".into()));
            }
            *self.state.lock().unwrap() = WindowVisibility::Normal;
            Ok(())
        }
    }

    // ── basic toggling ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn normal_window_gets_minimized() {
        let chrome = Arc::new(FakeChrome::new(WindowVisibility::Normal));
        let controller = HotkeyToggleController::new(Arc::clone(&chrome) as Arc<dyn WindowChrome>);

        let handle = controller.trigger().expect("first trigger must run");
        timeout(WAIT, handle).await.unwrap().unwrap();

        assert_eq!(chrome.calls(), vec![Call::Minimize]);
    }

    #[tokio::test]
    async fn maximized_window_gets_minimized() {
        let chrome = Arc::new(FakeChrome::new(WindowVisibility::Maximized));
        let controller = HotkeyToggleController::new(Arc::clone(&chrome) as Arc<dyn WindowChrome>);

        let handle = controller.trigger().unwrap();
        timeout(WAIT, handle).await.unwrap().unwrap();

        assert_eq!(chrome.calls(), vec![Call::Minimize]);
    }

    #[tokio::test]
    async fn minimized_window_gets_restored() {
        let chrome = Arc::new(FakeChrome::new(WindowVisibility::Minimized));
        let controller = HotkeyToggleController::new(Arc::clone(&chrome) as Arc<dyn WindowChrome>);

        let handle = controller.trigger().unwrap();
        timeout(WAIT, handle).await.unwrap().unwrap();

        assert_eq!(chrome.calls(), vec![Call::Restore]);
    }

    #[tokio::test]
    async fn toggling_twice_round_trips() {
        let chrome = Arc::new(FakeChrome::new(WindowVisibility::Normal));
        let controller = HotkeyToggleController::new(Arc::clone(&chrome) as Arc<dyn WindowChrome>);

        timeout(WAIT, controller.trigger().unwrap()).await.unwrap().unwrap();
        timeout(WAIT, controller.trigger().unwrap()).await.unwrap().unwrap();

        assert_eq!(chrome.calls(), vec![Call::Minimize, Call::Restore]);
    }

    // ── overlap protection ────────────────────────────────────────────────────

    #[tokio::test]
    async fn overlapping_trigger_is_dropped() {
        let (chrome, release) = FakeChrome::gated(WindowVisibility::Normal);
        let chrome = Arc::new(chrome);
        let controller = HotkeyToggleController::new(Arc::clone(&chrome) as Arc<dyn WindowChrome>);

        let first = controller.trigger().expect("first trigger must run");
        // The first toggle is blocked inside minimize(); a second trigger
        // must be dropped without any extra chrome call.
        assert!(controller.trigger().is_none());
        assert!(controller.trigger().is_none());

        release.send(()).unwrap();
        timeout(WAIT, first).await.unwrap().unwrap();
        assert_eq!(chrome.calls(), vec![Call::Minimize]);

        // Once the guard cleared, triggers work again.
        let next = controller.trigger().expect("guard must clear after completion");
        timeout(WAIT, next).await.unwrap().unwrap();
        assert_eq!(chrome.calls(), vec![Call::Minimize, Call::Restore]);
    }

    // ── failure handling ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn chrome_failure_clears_the_guard_without_retry() {
        let mut chrome = FakeChrome::new(WindowVisibility::Normal);
        chrome.fail_ops = true;
        let chrome = Arc::new(chrome);
        let controller = HotkeyToggleController::new(Arc::clone(&chrome) as Arc<dyn WindowChrome>);

        timeout(WAIT, controller.trigger().unwrap()).await.unwrap().unwrap();
        // Exactly one attempt; no automatic retry.
        assert_eq!(chrome.calls(), vec![Call::Minimize]);

        // The guard is clear, so the next trigger runs.
        assert!(controller.trigger().is_some());
    }

    #[tokio::test]
    async fn closed_window_is_a_no_op() {
        let chrome = Arc::new(FakeChrome::new(WindowVisibility::Closed));
        let controller = HotkeyToggleController::new(Arc::clone(&chrome) as Arc<dyn WindowChrome>);

        timeout(WAIT, controller.trigger().unwrap()).await.unwrap().unwrap();
        assert!(chrome.calls().is_empty());
        assert!(controller.trigger().is_some());
    }
}
