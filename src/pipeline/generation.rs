//! Sequential synthesis of text units.
//!
//! Units are synthesized strictly in index order with one request in flight,
//! so completed audio comes out already ordered. Each unit is handed to the
//! caller as soon as it is ready; perceived latency is time-to-first-unit.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::session::SessionToken;
use crate::tts::{AudioUnit, SpeechSynthesizer, TextUnit, TtsError, VoiceParams};

/// Pause between successive synthesis requests.
pub const DEFAULT_INTER_CALL_DELAY: Duration = Duration::from_millis(100);

/// Summary of one completed generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed_indices: Vec<usize>,
}

/// How a generation run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Every unit was attempted; `on_done` was called.
    Completed(GenerationReport),
    /// A newer session took over. Nothing further was emitted.
    Superseded,
    /// The synthesis service is unusable; the run stopped early.
    Halted(TtsError),
}

/// Drives text units through a synthesizer one at a time.
pub struct GenerationPipeline {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    inter_call_delay: Duration,
}

impl GenerationPipeline {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            synthesizer,
            inter_call_delay: DEFAULT_INTER_CALL_DELAY,
        }
    }

    pub fn with_inter_call_delay(mut self, delay: Duration) -> Self {
        self.inter_call_delay = delay;
        self
    }

    pub fn synthesizer_name(&self) -> String {
        self.synthesizer.name()
    }

    /// Synthesize `units` in order for the session identified by `token`.
    ///
    /// `on_unit_ready` receives each successful unit (ownership moves to the
    /// callee). `on_done` runs once after the last unit was attempted. If the
    /// token goes stale at any resume point, the run ends with
    /// [`GenerationOutcome::Superseded`] and neither callback fires again.
    pub async fn run<R, D>(
        &self,
        units: Vec<TextUnit>,
        params: &VoiceParams,
        token: &SessionToken,
        mut on_unit_ready: R,
        on_done: D,
    ) -> GenerationOutcome
    where
        R: FnMut(AudioUnit),
        D: FnOnce(&GenerationReport),
    {
        let session = token.id();
        let total = units.len();
        let mut report = GenerationReport::default();

        info!(session, units = total, engine = %self.synthesizer.name(), "Starting generation");

        for (pos, unit) in units.into_iter().enumerate() {
            if pos > 0 && !self.inter_call_delay.is_zero() {
                tokio::time::sleep(self.inter_call_delay).await;
            }
            if !token.is_current() {
                debug!(session, index = unit.index, "Session superseded before synthesis");
                return GenerationOutcome::Superseded;
            }

            report.attempted += 1;
            let result = self.synthesizer.synthesize(&unit.text, params).await;

            if !token.is_current() {
                debug!(session, index = unit.index, "Session superseded, discarding result");
                return GenerationOutcome::Superseded;
            }

            match result {
                Ok(audio) => {
                    debug!(
                        session,
                        index = unit.index,
                        progress = format!("{}/{}", pos + 1, total),
                        bytes = audio.bytes.len(),
                        "Unit synthesized"
                    );
                    report.succeeded += 1;
                    on_unit_ready(AudioUnit::new(unit.index, audio));
                }
                Err(e) if e.is_session_fatal() => {
                    error!(session, index = unit.index, error = %e, "Synthesis unavailable, halting");
                    return GenerationOutcome::Halted(e);
                }
                Err(e) => {
                    warn!(session, index = unit.index, error = %e, "Unit synthesis failed, skipping");
                    report.failed_indices.push(unit.index);
                }
            }
        }

        info!(
            session,
            succeeded = report.succeeded,
            failed = report.failed_indices.len(),
            "Generation complete"
        );
        on_done(&report);
        GenerationOutcome::Completed(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::pipeline::session::SessionEpoch;
    use crate::test_support::FakeSynthesizer;
    use crate::tts::Segmenter;

    fn units(text: &str) -> Vec<TextUnit> {
        Segmenter::default().segment(text)
    }

    fn payload(unit: &AudioUnit) -> String {
        String::from_utf8(unit.bytes.clone()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_units_delivered_in_order() {
        let synth = Arc::new(FakeSynthesizer::new(Duration::from_millis(50)));
        let pipeline = GenerationPipeline::new(synth.clone());
        let epoch = SessionEpoch::new();
        let token = epoch.advance();

        let mut ready = Vec::new();
        let mut done_calls = 0;
        let outcome = pipeline
            .run(
                units("Hello there. How are you? Fine!"),
                &VoiceParams::default(),
                &token,
                |u| ready.push((u.index, payload(&u))),
                |_| done_calls += 1,
            )
            .await;

        assert_eq!(
            ready,
            vec![
                (0, "Hello there.".to_string()),
                (1, "How are you?".to_string()),
                (2, "Fine!".to_string()),
            ]
        );
        assert_eq!(done_calls, 1);
        assert_eq!(
            outcome,
            GenerationOutcome::Completed(GenerationReport {
                attempted: 3,
                succeeded: 3,
                failed_indices: vec![],
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_request_in_flight() {
        let synth = Arc::new(FakeSynthesizer::new(Duration::from_millis(30)));
        let pipeline = GenerationPipeline::new(synth.clone()).with_inter_call_delay(Duration::ZERO);
        let token = SessionEpoch::new().advance();

        pipeline
            .run(
                units("First one here. Second one here. Third one here. Fourth one here."),
                &VoiceParams::default(),
                &token,
                |_| {},
                |_| {},
            )
            .await;

        assert_eq!(synth.calls().len(), 4);
        assert_eq!(synth.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_call_delay_between_requests() {
        let synth = Arc::new(FakeSynthesizer::new(Duration::ZERO));
        let pipeline = GenerationPipeline::new(synth);
        let token = SessionEpoch::new().advance();

        let start = tokio::time::Instant::now();
        pipeline
            .run(
                units("Hello there. How are you? Fine!"),
                &VoiceParams::default(),
                &token,
                |_| {},
                |_| {},
            )
            .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= DEFAULT_INTER_CALL_DELAY * 2, "elapsed {:?}", elapsed);
        assert!(elapsed < DEFAULT_INTER_CALL_DELAY * 3, "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_unit_is_skipped() {
        let synth = Arc::new(
            FakeSynthesizer::new(Duration::from_millis(10))
                .fail_on("How are you?", TtsError::Synthesis("500".into())),
        );
        let pipeline = GenerationPipeline::new(synth.clone());
        let token = SessionEpoch::new().advance();

        let mut ready = Vec::new();
        let mut report_seen = None;
        let outcome = pipeline
            .run(
                units("Hello there. How are you? Fine!"),
                &VoiceParams::default(),
                &token,
                |u| ready.push(u.index),
                |r| report_seen = Some(r.clone()),
            )
            .await;

        assert_eq!(ready, vec![0, 2]);
        assert_eq!(synth.calls().len(), 3);
        let report = report_seen.expect("on_done not called");
        assert_eq!(report.failed_indices, vec![1]);
        assert_eq!(outcome, GenerationOutcome::Completed(report));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_token_makes_no_calls() {
        let synth = Arc::new(FakeSynthesizer::new(Duration::from_millis(10)));
        let pipeline = GenerationPipeline::new(synth.clone());
        let epoch = SessionEpoch::new();
        let token = epoch.advance();
        epoch.advance();

        let mut ready = 0;
        let mut done = false;
        let outcome = pipeline
            .run(
                units("Hello there. How are you?"),
                &VoiceParams::default(),
                &token,
                |_| ready += 1,
                |_| done = true,
            )
            .await;

        assert_eq!(outcome, GenerationOutcome::Superseded);
        assert!(synth.calls().is_empty());
        assert_eq!(ready, 0);
        assert!(!done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_between_units() {
        let synth = Arc::new(FakeSynthesizer::new(Duration::from_millis(10)));
        let pipeline = GenerationPipeline::new(synth.clone());
        let epoch = SessionEpoch::new();
        let token = epoch.advance();

        let mut ready = 0;
        let outcome = pipeline
            .run(
                units("Hello there. How are you? Fine!"),
                &VoiceParams::default(),
                &token,
                |_| {
                    ready += 1;
                    epoch.advance();
                },
                |_| panic!("on_done after supersede"),
            )
            .await;

        assert_eq!(outcome, GenerationOutcome::Superseded);
        assert_eq!(ready, 1);
        assert_eq!(synth.calls(), vec!["Hello there.".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_discarded() {
        let synth = Arc::new(FakeSynthesizer::new(Duration::from_millis(100)));
        let pipeline = Arc::new(GenerationPipeline::new(synth.clone()));
        let epoch = SessionEpoch::new();
        let token = epoch.advance();
        let ready = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let pipeline = Arc::clone(&pipeline);
            let ready = Arc::clone(&ready);
            tokio::spawn(async move {
                pipeline
                    .run(
                        units("Hello there. How are you?"),
                        &VoiceParams::default(),
                        &token,
                        move |u| ready.lock().unwrap().push(u.index),
                        |_| {},
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(40)).await;
        epoch.advance();

        assert_eq!(task.await.unwrap(), GenerationOutcome::Superseded);
        assert_eq!(synth.calls().len(), 1);
        assert!(ready.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_halts_run() {
        let synth = Arc::new(
            FakeSynthesizer::new(Duration::from_millis(10))
                .fail_on("How are you?", TtsError::Unavailable("network down".into())),
        );
        let pipeline = GenerationPipeline::new(synth.clone());
        let token = SessionEpoch::new().advance();

        let mut ready = Vec::new();
        let outcome = pipeline
            .run(
                units("Hello there. How are you? Fine!"),
                &VoiceParams::default(),
                &token,
                |u| ready.push(u.index),
                |_| panic!("on_done after halt"),
            )
            .await;

        assert_eq!(
            outcome,
            GenerationOutcome::Halted(TtsError::Unavailable("network down".into()))
        );
        assert_eq!(ready, vec![0]);
        assert_eq!(synth.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_units_complete_immediately() {
        let synth = Arc::new(FakeSynthesizer::new(Duration::from_millis(10)));
        let pipeline = GenerationPipeline::new(synth.clone());
        let token = SessionEpoch::new().advance();

        let mut done = false;
        let outcome = pipeline
            .run(Vec::new(), &VoiceParams::default(), &token, |_| {}, |_| done = true)
            .await;

        assert!(done);
        assert_eq!(outcome, GenerationOutcome::Completed(GenerationReport::default()));
        assert!(synth.calls().is_empty());
    }
}
