//! Incremental speech pipeline.
//!
//! Text is segmented into sentence units, synthesized one at a time, and each
//! unit is played as soon as it is ready while the next one is generated.
//! Every piece of work carries a session token; a newer `speak()` or a
//! `stop()` makes all older work inert.

mod controller;
mod generation;
mod sequencer;
mod session;

pub use controller::{EngineOptions, SessionController, SessionEvents, SessionSnapshot, SessionState};
pub use generation::{
    GenerationOutcome, GenerationPipeline, GenerationReport, DEFAULT_INTER_CALL_DELAY,
};
pub use sequencer::{PlaybackPhase, PlaybackSequencer};
pub use session::{SessionEpoch, SessionToken};
