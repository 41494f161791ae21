//! Interrupt handling (SIGINT/SIGTERM)
//!
//! On the first signal the shared [`SignalState`] is flagged; bounded waits
//! poll the flag and stop with an `Interrupted` error. Nothing is rolled
//! back: a volume or instance that was being created keeps existing, and the
//! pending resource is reported so it can be cleaned up later.
//!
//! On a second signal the process exits immediately with code 130.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

/// Exit code for interrupted invocations (128 + SIGINT)
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Signal handler state
#[derive(Debug, Default)]
pub struct SignalState {
    /// First signal received
    interrupted: AtomicBool,
    /// Signal count (for tracking double-SIGINT)
    signal_count: AtomicU8,
    /// Remote resources currently being waited on, as "kind id"
    pending: Mutex<Vec<String>>,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an interrupt has been received
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Get the number of signals received
    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Handle a signal and return the action to take
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);

        if count == 0 {
            self.interrupted.store(true, Ordering::SeqCst);
            SignalAction::StopWaiting
        } else if count == 1 {
            SignalAction::ImmediateExit
        } else {
            SignalAction::Ignore
        }
    }

    /// Note a remote resource that is still being provisioned
    pub fn register_pending(&self, resource: impl Into<String>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(resource.into());
        }
    }

    /// Forget a resource once its wait has finished
    pub fn unregister_pending(&self, resource: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|r| r != resource);
        }
    }

    /// Resources still being provisioned
    pub fn pending(&self) -> Vec<String> {
        self.pending.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: abort the current wait
    StopWaiting,
    /// Second signal: exit now
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Cloneable handle to the process-wide interrupt flag
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    state: Arc<SignalState>,
}

impl Interrupt {
    /// A flag that is only set by [`Interrupt::trigger`] (no OS handler)
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the SIGINT/SIGTERM handler and return the shared flag.
    ///
    /// Must be called at most once per process.
    pub fn install() -> Result<Self, ctrlc::Error> {
        let interrupt = Self::new();
        let state = Arc::clone(&interrupt.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::StopWaiting => {
                let pending = state.pending();
                if pending.is_empty() {
                    warn!("interrupt received, stopping");
                } else {
                    warn!(
                        pending = %pending.join(", "),
                        "interrupt received; resources still provisioning remotely are left as-is"
                    );
                }
            }
            SignalAction::ImmediateExit => {
                eprintln!("\nReceived second interrupt, exiting immediately...");
                std::process::exit(EXIT_CODE_INTERRUPTED);
            }
            SignalAction::Ignore => {}
        })?;
        Ok(interrupt)
    }

    /// Check if an interrupt has been received
    pub fn is_set(&self) -> bool {
        self.state.is_interrupted()
    }

    /// Raise the flag as if a signal had arrived
    pub fn trigger(&self) {
        self.state.handle_signal();
    }

    pub fn state(&self) -> &SignalState {
        &self.state
    }
}
