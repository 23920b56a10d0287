//! Hand over the result of a program or erase operation from the event context to the caller.
//!
//! The medium reports completions from an interrupt handler or an event queue callback. The
//! synchronizer is usually placed in a `static` so that context can reach it:
//!
//! ```
//! use nvm_store::completion::{CompletionSynchronizer, Outcome};
//!
//! static SYNC: CompletionSynchronizer = CompletionSynchronizer::new();
//!
//! SYNC.begin_operation();
//! // ... from the flash event handler
//! SYNC.signal_completion(Outcome::Success);
//! assert_eq!(SYNC.await_completion(), Outcome::Success);
//! ```

use core::cell::Cell;

use embassy_futures::block_on;
use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex},
    signal::Signal,
};

/// Result of a program or erase operation, as reported by the medium
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Pending,
}

/// Single slot completion channel for one in-flight operation
pub struct CompletionSynchronizer {
    state: Mutex<CriticalSectionRawMutex, Cell<State>>,
    signal: Signal<CriticalSectionRawMutex, Outcome>,
}

impl Default for CompletionSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSynchronizer {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(State::Idle)),
            signal: Signal::new(),
        }
    }

    /// Mark an operation as in flight. Must be called before submitting it to the medium, a
    /// completion signaled before this call would be lost.
    ///
    /// Only one operation can be in flight, beginning a second one is a bug in the caller.
    pub fn begin_operation(&self) {
        let previous = self.state.lock(|s| s.replace(State::Pending));
        debug_assert_eq!(previous, State::Idle, "flash operation already in flight");
        self.signal.reset();
    }

    /// Report the outcome of the operation in flight. Safe to call from interrupt context.
    pub fn signal_completion(&self, outcome: Outcome) {
        self.signal.signal(outcome);
    }

    /// Return to idle after the medium refused the operation, nothing is in flight.
    pub fn rejected(&self) {
        self.signal.reset();
        self.finish();
    }

    /// Whether an operation was started and its outcome not consumed yet
    pub fn is_pending(&self) -> bool {
        self.state.lock(|s| s.get() == State::Pending)
    }

    /// Consume the outcome if it was already signaled
    pub fn try_complete(&self) -> Option<Outcome> {
        let outcome = self.signal.try_take()?;
        self.finish();
        Some(outcome)
    }

    /// Block until the outcome is signaled, polling without bound.
    pub fn await_completion(&self) -> Outcome {
        let outcome = block_on(self.signal.wait());
        self.finish();
        outcome
    }

    /// Check for the outcome, then poll again at most `max_polls` times.
    ///
    /// An outcome signaled before the call is always returned, even with `max_polls == 0`. On
    /// `None` the operation stays pending, the medium still owes a completion. See
    /// [`Self::try_complete`] to consume it later.
    pub fn await_completion_bounded(&self, max_polls: u32) -> Option<Outcome> {
        let mut polls = 0;
        loop {
            if let Some(outcome) = self.try_complete() {
                return Some(outcome);
            }
            if polls == max_polls {
                return None;
            }
            polls += 1;
            core::hint::spin_loop();
        }
    }

    /// Wait for the outcome without blocking the executor.
    ///
    /// Dropping the future before it resolves leaves the operation pending.
    pub async fn completion(&self) -> Outcome {
        let outcome = self.signal.wait().await;
        self.finish();
        outcome
    }

    fn finish(&self) {
        self.state.lock(|s| s.set(State::Idle));
    }
}
