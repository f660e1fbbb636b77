//! Session epochs: the cancellation mechanism for utterances.
//!
//! The controller owns the only [`SessionEpoch`] and advances it on every
//! `speak()`/`stop()`. Everything else holds a [`SessionToken`] captured at
//! session start and compares it against the live epoch at each resume point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic session counter. Not `Clone`: there is exactly one writer.
#[derive(Debug, Default)]
pub struct SessionEpoch {
    current: Arc<AtomicU64>,
}

impl SessionEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session, invalidating every outstanding token.
    pub fn advance(&self) -> SessionToken {
        let id = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        SessionToken {
            id,
            current: Arc::clone(&self.current),
        }
    }

    /// Id of the live session (0 before the first `advance`).
    pub fn current_id(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

/// Read-only handle identifying one session.
#[derive(Debug, Clone)]
pub struct SessionToken {
    id: u64,
    current: Arc<AtomicU64>,
}

impl SessionToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True while no newer session has been started.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.id
    }
}
