//! In-memory synthesizer and audio output used by the engine tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use crate::pipeline::PlaybackPhase;
use crate::playback::{AudioOutput, PlaybackCompletion};
use crate::tts::{AudioFormat, AudioUnit, SpeechSynthesizer, SynthesizedAudio, TtsError, VoiceParams};

/// Synthesizer whose payload is the UTF-8 text it was given.
pub(crate) struct FakeSynthesizer {
    latency: Duration,
    failures: Mutex<HashMap<String, TtsError>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSynthesizer {
    pub(crate) fn new(latency: Duration) -> Self {
        Self {
            latency,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fail_on(self, text: &str, err: TtsError) -> Self {
        self.failures.lock().unwrap().insert(text.to_string(), err);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl SpeechSynthesizer for FakeSynthesizer {
    fn synthesize(
        &self,
        text: &str,
        _params: &VoiceParams,
    ) -> Pin<Box<dyn Future<Output = Result<SynthesizedAudio, TtsError>> + Send + '_>> {
        let text = text.to_string();
        Box::pin(async move {
            self.calls.lock().unwrap().push(text.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.latency).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if let Some(err) = self.failures.lock().unwrap().get(&text) {
                return Err(err.clone());
            }
            Ok(SynthesizedAudio {
                format: AudioFormat::Wav,
                bytes: text.into_bytes(),
            })
        })
    }

    fn name(&self) -> String {
        "Fake".into()
    }
}

#[derive(Default)]
struct FakeOutputState {
    current: Option<(u64, oneshot::Sender<Result<(), TtsError>>)>,
    next_id: u64,
    paused: bool,
    played: Vec<String>,
    finished: Vec<String>,
    stops: usize,
}

/// Audio output that "plays" each unit for a fixed stretch of tokio time.
#[derive(Clone)]
pub(crate) struct FakeOutput {
    unit_duration: Duration,
    broken_payloads: Arc<HashSet<String>>,
    state: Arc<Mutex<FakeOutputState>>,
}

impl FakeOutput {
    pub(crate) fn new(unit_duration: Duration) -> Self {
        Self {
            unit_duration,
            broken_payloads: Arc::new(HashSet::new()),
            state: Arc::new(Mutex::new(FakeOutputState::default())),
        }
    }

    /// Units whose payload equals one of `texts` fail as malformed.
    pub(crate) fn with_broken(mut self, texts: &[&str]) -> Self {
        self.broken_payloads = Arc::new(texts.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Payloads handed to `play`, in order.
    pub(crate) fn played(&self) -> Vec<String> {
        self.state.lock().unwrap().played.clone()
    }

    /// Payloads that played to their natural end.
    pub(crate) fn finished(&self) -> Vec<String> {
        self.state.lock().unwrap().finished.clone()
    }

    pub(crate) fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub(crate) fn has_current(&self) -> bool {
        self.state.lock().unwrap().current.is_some()
    }
}

impl AudioOutput for FakeOutput {
    fn play(&self, unit: AudioUnit) -> Result<PlaybackCompletion, TtsError> {
        let text = String::from_utf8_lossy(&unit.bytes).into_owned();
        let (done, completion) = PlaybackCompletion::channel();

        if self.broken_payloads.contains(&text) {
            let _ = done.send(Err(TtsError::Playback(format!("malformed unit {}", unit.index))));
            return Ok(completion);
        }

        let id = {
            let mut state = self.state.lock().unwrap();
            if let Some((_, prev)) = state.current.take() {
                let _ = prev.send(Err(TtsError::Interrupted));
            }
            state.next_id += 1;
            let id = state.next_id;
            state.current = Some((id, done));
            state.paused = false;
            state.played.push(text.clone());
            id
        };

        let state = Arc::clone(&self.state);
        let duration = self.unit_duration;
        tokio::spawn(async move {
            let tick = Duration::from_millis(10);
            let mut elapsed = Duration::ZERO;
            loop {
                tokio::time::sleep(tick).await;
                let mut guard = state.lock().unwrap();
                match &guard.current {
                    Some((current_id, _)) if *current_id == id => {}
                    _ => return,
                }
                if !guard.paused {
                    elapsed += tick;
                }
                if elapsed >= duration {
                    if let Some((_, done)) = guard.current.take() {
                        guard.finished.push(text.clone());
                        let _ = done.send(Ok(()));
                    }
                    return;
                }
            }
        });

        Ok(completion)
    }

    fn pause(&self) {
        self.state.lock().unwrap().paused = true;
    }

    fn resume(&self) {
        self.state.lock().unwrap().paused = false;
    }

    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stops += 1;
        state.paused = false;
        if let Some((_, done)) = state.current.take() {
            let _ = done.send(Err(TtsError::Interrupted));
        }
    }
}

/// Wait (bounded) until the sequencer reaches a phase matching `pred`.
pub(crate) async fn wait_for_phase(
    rx: &mut watch::Receiver<PlaybackPhase>,
    pred: impl FnMut(&PlaybackPhase) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(30), rx.wait_for(pred))
        .await
        .expect("timed out waiting for playback phase")
        .expect("sequencer dropped");
}
