//! Error types for the simulation kernel.
//!
//! Misuse the kernel can detect (scheduling into the past, time overflow,
//! nested `run`) is reported at the call site. Errors returned by event
//! payloads are carried through [`SimError::Event`] untouched.

use thiserror::Error;

use crate::event::EventError;
use crate::time::{TimeError, VirtualTime};
use crate::types::SequenceNumber;

#[derive(Error, Debug)]
pub enum SimError {
    /// A scheduling call was given a negative delay.
    #[error("cannot schedule with negative delay {delay}")]
    InvalidDelay { delay: VirtualTime },

    #[error(transparent)]
    Overflow(#[from] TimeError),

    /// A payload was about to run a second time. This is a kernel bug.
    #[error("event #{seq} invoked more than once")]
    DoubleInvocation { seq: SequenceNumber },

    /// `run` was called from inside an event.
    #[error("run() called while the engine is already running")]
    ReentrantRun,

    /// Error returned by an event payload.
    #[error(transparent)]
    Event(EventError),
}

impl SimError {
    /// Whether this error came from consumer code rather than the kernel.
    pub fn is_event_error(&self) -> bool {
        matches!(self, SimError::Event(_))
    }

    /// Recovers the payload's own error, if that is what this is.
    pub fn into_event_error(self) -> Result<EventError, SimError> {
        match self {
            SimError::Event(err) => Ok(err),
            other => Err(other),
        }
    }
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
