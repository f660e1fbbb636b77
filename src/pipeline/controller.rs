//! Session controller: the public face of the engine.
//!
//! Owns the session epoch, the generation pipeline and the playback
//! sequencer. `speak()` always supersedes whatever came before it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use super::generation::{
    GenerationOutcome, GenerationPipeline, GenerationReport, DEFAULT_INTER_CALL_DELAY,
};
use super::sequencer::{PlaybackPhase, PlaybackSequencer};
use super::session::SessionEpoch;
use crate::playback::AudioOutput;
use crate::tts::{Segmenter, SpeechSynthesizer, TtsError, VoiceParams};

/// Tunables for a [`SessionController`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub voice: VoiceParams,
    pub segmenter: Segmenter,
    pub inter_call_delay: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            voice: VoiceParams::default(),
            segmenter: Segmenter::default(),
            inter_call_delay: DEFAULT_INTER_CALL_DELAY,
        }
    }
}

/// Externally visible state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Generating,
    Playing,
    GeneratingAndPlaying,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Playing => "playing",
            Self::GeneratingAndPlaying => "generating_and_playing",
            Self::Error => "error",
        }
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub is_generating: bool,
    pub is_playing: bool,
    pub last_error: Option<TtsError>,
}

#[derive(Debug, Clone, Default)]
struct GenerationStatus {
    /// Session currently generating, if any.
    generating: Option<u64>,
    last_error: Option<TtsError>,
}

fn derive_snapshot(status: &GenerationStatus, phase: PlaybackPhase) -> SessionSnapshot {
    let is_generating = status.generating.is_some();
    let is_playing = phase.is_active();
    let state = match (is_generating, is_playing) {
        (true, true) => SessionState::GeneratingAndPlaying,
        (true, false) => SessionState::Generating,
        (false, true) => SessionState::Playing,
        (false, false) if status.last_error.is_some() => SessionState::Error,
        (false, false) => SessionState::Idle,
    };
    SessionSnapshot {
        state,
        is_generating,
        is_playing,
        last_error: status.last_error.clone(),
    }
}

/// Change feed over the engine's state.
pub struct SessionEvents {
    phase: watch::Receiver<PlaybackPhase>,
    status: watch::Receiver<GenerationStatus>,
}

impl SessionEvents {
    pub fn snapshot(&self) -> SessionSnapshot {
        let phase = *self.phase.borrow();
        derive_snapshot(&self.status.borrow(), phase)
    }

    /// Wait for the next change. Returns `None` once the controller is gone.
    pub async fn changed(&mut self) -> Option<SessionSnapshot> {
        tokio::select! {
            r = self.phase.changed() => r.ok()?,
            r = self.status.changed() => r.ok()?,
        }
        Some(self.snapshot())
    }
}

/// Drives utterances from text to speaker, one session at a time.
pub struct SessionController {
    epoch: SessionEpoch,
    segmenter: Segmenter,
    pipeline: Arc<GenerationPipeline>,
    sequencer: Arc<PlaybackSequencer>,
    voice: Mutex<VoiceParams>,
    status: Arc<watch::Sender<GenerationStatus>>,
}

impl SessionController {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        options: EngineOptions,
    ) -> Self {
        let (status, _) = watch::channel(GenerationStatus::default());
        let pipeline =
            GenerationPipeline::new(synthesizer).with_inter_call_delay(options.inter_call_delay);
        Self {
            epoch: SessionEpoch::new(),
            segmenter: options.segmenter,
            pipeline: Arc::new(pipeline),
            sequencer: PlaybackSequencer::new(output),
            voice: Mutex::new(options.voice),
            status: Arc::new(status),
        }
    }

    pub fn synthesizer_name(&self) -> String {
        self.pipeline.synthesizer_name()
    }

    /// Voice used by sessions started after this call.
    pub fn set_voice_params(&self, params: VoiceParams) {
        *self.voice.lock().unwrap_or_else(|e| e.into_inner()) = params;
    }

    pub fn voice_params(&self) -> VoiceParams {
        self.voice.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Start speaking `text`, cancelling any current session.
    ///
    /// Returns the new session id, or `None` when the text held nothing
    /// speakable (no synthesis calls are made in that case).
    pub fn speak(&self, text: &str) -> Option<u64> {
        let token = self.epoch.advance();
        let session = token.id();
        self.sequencer.stop();

        let units = self.segmenter.segment(text);
        if units.is_empty() {
            debug!(session, "Nothing speakable, staying idle");
            self.status.send_modify(|s| s.generating = None);
            return None;
        }

        info!(session, units = units.len(), chars = text.len(), "Speak");
        self.sequencer.begin(session);
        self.status.send_modify(|s| {
            s.generating = Some(session);
            s.last_error = None;
        });

        let params = self.voice_params();
        let pipeline = Arc::clone(&self.pipeline);
        let sequencer = Arc::clone(&self.sequencer);
        let status = Arc::clone(&self.status);

        tokio::spawn(async move {
            let on_ready = {
                let sequencer = Arc::clone(&sequencer);
                move |unit| {
                    if sequencer.enqueue(session, unit) {
                        sequencer.start();
                    }
                }
            };
            let on_done = {
                let sequencer = Arc::clone(&sequencer);
                let status = Arc::clone(&status);
                move |_: &GenerationReport| {
                    sequencer.finish(session);
                    clear_generating(&status, session);
                }
            };

            let outcome = pipeline.run(units, &params, &token, on_ready, on_done).await;

            if let GenerationOutcome::Halted(err) = outcome {
                if token.is_current() {
                    sequencer.stop_session(session);
                }
                status.send_if_modified(|s| {
                    if s.generating != Some(session) {
                        return false;
                    }
                    s.generating = None;
                    s.last_error = Some(err);
                    true
                });
            }
        });

        Some(session)
    }

    /// Cancel the current session and silence output. Safe in any state.
    pub fn stop(&self) {
        let token = self.epoch.advance();
        self.sequencer.stop();
        self.status.send_if_modified(|s| s.generating.take().is_some());
        debug!(session = token.id(), "Stopped");
    }

    pub fn pause(&self) {
        self.sequencer.pause();
    }

    pub fn resume(&self) {
        self.sequencer.resume();
    }

    pub fn state(&self) -> SessionState {
        self.snapshot().state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        derive_snapshot(&self.status.borrow(), self.sequencer.phase())
    }

    pub fn is_generating(&self) -> bool {
        self.status.borrow().generating.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_playing()
    }

    pub fn last_error(&self) -> Option<TtsError> {
        self.status.borrow().last_error.clone()
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.sequencer.phase()
    }

    pub fn subscribe(&self) -> SessionEvents {
        SessionEvents {
            phase: self.sequencer.subscribe(),
            status: self.status.subscribe(),
        }
    }

    /// Resolve once nothing is generating or playing.
    pub async fn wait_until_idle(&self) {
        let mut events = self.subscribe();
        loop {
            let snapshot = events.snapshot();
            if !snapshot.is_generating && !snapshot.is_playing {
                return;
            }
            if events.changed().await.is_none() {
                return;
            }
        }
    }
}

fn clear_generating(status: &watch::Sender<GenerationStatus>, session: u64) {
    status.send_if_modified(|s| {
        if s.generating == Some(session) {
            s.generating = None;
            true
        } else {
            false
        }
    });
}
