//! Audio output abstraction.
//!
//! The sequencer only needs to start a unit, pause/resume/stop it, and learn
//! exactly once how that unit ended. `RodioOutput` is the device-backed
//! implementation; tests inject a fake.

mod rodio_output;

use tokio::sync::oneshot;

use crate::tts::{AudioUnit, TtsError};

pub use rodio_output::RodioOutput;

/// Resolves once with the outcome of one played unit.
#[derive(Debug)]
pub struct PlaybackCompletion {
    rx: oneshot::Receiver<Result<(), TtsError>>,
}

impl PlaybackCompletion {
    /// Create a completion handle and the sender that resolves it.
    pub fn channel() -> (oneshot::Sender<Result<(), TtsError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Wait for the unit to end. A dropped sender counts as an interruption.
    pub async fn wait(self) -> Result<(), TtsError> {
        self.rx.await.unwrap_or(Err(TtsError::Interrupted))
    }
}

/// A playable-media sink owned by the playback sequencer.
///
/// `play` must begin output before it returns, so that a `stop` issued after
/// it is guaranteed to apply to that unit.
pub trait AudioOutput: Send + Sync {
    /// Load and start playing one unit.
    fn play(&self, unit: AudioUnit) -> Result<PlaybackCompletion, TtsError>;

    /// Pause the unit currently playing, if any.
    fn pause(&self);

    /// Resume a paused unit.
    fn resume(&self);

    /// Halt output immediately and release the current unit. The pending
    /// completion resolves with [`TtsError::Interrupted`].
    fn stop(&self);
}
