//! Ordered playback of synthesized units.
//!
//! A single worker task pops units from the queue and awaits each one's
//! completion before moving to the next. Starting a unit and stopping output
//! both happen under the queue lock, so a `stop()` can never be overtaken by
//! a unit the worker was about to start.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::playback::{AudioOutput, PlaybackCompletion};
use crate::tts::{AudioUnit, TtsError};

/// Observable state of the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    /// Unit with this index is being output.
    Playing(usize),
    /// Unit with this index is paused mid-way.
    Paused(usize),
    /// Queue ran dry but the producer has more units coming.
    WaitingForNext,
}

impl PlaybackPhase {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[derive(Default)]
struct SequencerInner {
    /// Session whose units are accepted. 0 means none.
    session: u64,
    queue: VecDeque<AudioUnit>,
    last_index: Option<usize>,
    producer_done: bool,
    /// Bumped by `stop()`; a worker with an older id exits silently.
    run_id: u64,
    worker: Option<JoinHandle<()>>,
}

/// Plays queued units strictly in index order.
pub struct PlaybackSequencer {
    output: Arc<dyn AudioOutput>,
    inner: Mutex<SequencerInner>,
    wake: Notify,
    phase_tx: watch::Sender<PlaybackPhase>,
}

impl PlaybackSequencer {
    pub fn new(output: Arc<dyn AudioOutput>) -> Arc<Self> {
        let (phase_tx, _) = watch::channel(PlaybackPhase::Idle);
        Arc::new(Self {
            output,
            inner: Mutex::new(SequencerInner::default()),
            wake: Notify::new(),
            phase_tx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SequencerInner> {
        // Poisoning only follows a panic in another holder; the queue state
        // itself is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: PlaybackPhase) {
        self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }

    pub fn phase(&self) -> PlaybackPhase {
        *self.phase_tx.borrow()
    }

    pub fn is_playing(&self) -> bool {
        self.phase().is_active()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackPhase> {
        self.phase_tx.subscribe()
    }

    /// Units queued but not yet started.
    pub fn queued_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Open a fresh queue for `session`. Call after `stop()`.
    pub fn begin(&self, session: u64) {
        let mut inner = self.lock();
        inner.session = session;
        inner.queue.clear();
        inner.last_index = None;
        inner.producer_done = false;
    }

    /// Queue a unit for `session`. Returns false if the unit was rejected
    /// (other session, or not after the last accepted index).
    pub fn enqueue(&self, session: u64, unit: AudioUnit) -> bool {
        {
            let mut inner = self.lock();
            if inner.session != session || inner.producer_done {
                debug!(session, index = unit.index, "Dropping unit for inactive session");
                return false;
            }
            if let Some(last) = inner.last_index {
                if unit.index <= last {
                    warn!(session, index = unit.index, last, "Dropping out-of-order unit");
                    return false;
                }
            }
            inner.last_index = Some(unit.index);
            inner.queue.push_back(unit);
        }
        self.wake.notify_one();
        true
    }

    /// Mark that `session` will enqueue nothing more.
    pub fn finish(&self, session: u64) {
        {
            let mut inner = self.lock();
            if inner.session != session {
                return;
            }
            inner.producer_done = true;
        }
        self.wake.notify_one();
    }

    /// Start the first queued unit and the worker that plays the rest.
    /// No effect if a worker is already running or nothing is queued.
    pub fn start(self: &Arc<Self>) {
        let mut inner = self.lock();
        if inner.worker.is_some() {
            return;
        }
        let Some(first) = self.play_next(&mut inner) else {
            return;
        };
        let run_id = inner.run_id;
        let this = Arc::clone(self);
        inner.worker = Some(tokio::spawn(async move { this.run_worker(run_id, first).await }));
    }

    /// Halt output, drop queued units, and return to Idle. Safe in any state.
    pub fn stop(&self) {
        let mut inner = self.lock();
        self.stop_locked(&mut inner);
    }

    /// Like `stop()`, but only if `session` still owns the queue.
    pub fn stop_session(&self, session: u64) {
        let mut inner = self.lock();
        if inner.session == session {
            self.stop_locked(&mut inner);
        }
    }

    fn stop_locked(&self, inner: &mut SequencerInner) {
        let dropped = inner.queue.len();
        let was_active = self.phase().is_active();

        inner.run_id += 1;
        inner.session = 0;
        inner.queue.clear();
        inner.last_index = None;
        inner.producer_done = true;
        if let Some(worker) = inner.worker.take() {
            worker.abort();
        }
        self.output.stop();
        self.set_phase(PlaybackPhase::Idle);

        if was_active || dropped > 0 {
            info!(dropped, "Playback stopped");
        }
    }

    /// Pause the unit currently playing. No effect in any other phase.
    pub fn pause(&self) {
        let _inner = self.lock();
        if let PlaybackPhase::Playing(index) = self.phase() {
            self.output.pause();
            self.set_phase(PlaybackPhase::Paused(index));
            debug!(index, "Playback paused");
        }
    }

    /// Resume a paused unit. No effect in any other phase.
    pub fn resume(&self) {
        let _inner = self.lock();
        if let PlaybackPhase::Paused(index) = self.phase() {
            self.output.resume();
            self.set_phase(PlaybackPhase::Playing(index));
            debug!(index, "Playback resumed");
        }
    }

    /// Pop queued units until one starts. Called with the lock held.
    fn play_next(&self, inner: &mut SequencerInner) -> Option<(usize, PlaybackCompletion)> {
        while let Some(unit) = inner.queue.pop_front() {
            let index = unit.index;
            match self.output.play(unit) {
                Ok(completion) => {
                    self.set_phase(PlaybackPhase::Playing(index));
                    return Some((index, completion));
                }
                Err(e) => warn!(index, error = %e, "Unit playback failed to start, advancing"),
            }
        }
        None
    }

    async fn run_worker(self: Arc<Self>, run_id: u64, first: (usize, PlaybackCompletion)) {
        let (mut index, mut completion) = first;
        loop {
            match completion.wait().await {
                Ok(()) => debug!(index, "Unit finished"),
                Err(TtsError::Interrupted) => debug!(index, "Unit interrupted"),
                Err(e) => warn!(index, error = %e, "Unit playback failed, advancing"),
            }

            loop {
                let next = {
                    let mut inner = self.lock();
                    if inner.run_id != run_id {
                        return;
                    }
                    match self.play_next(&mut inner) {
                        Some(next) => Some(next),
                        None if inner.producer_done => {
                            inner.worker = None;
                            self.set_phase(PlaybackPhase::Idle);
                            debug!("Playback queue drained");
                            return;
                        }
                        None => {
                            self.set_phase(PlaybackPhase::WaitingForNext);
                            None
                        }
                    }
                };
                match next {
                    Some(next) => {
                        (index, completion) = next;
                        break;
                    }
                    None => self.wake.notified().await,
                }
            }
        }
    }
}
