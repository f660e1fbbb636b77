//! Rodio device output for TTS units.
//!
//! `rodio::OutputStream` is not `Send`, so the stream lives on a dedicated
//! audio thread. Commands arrive over a channel; each unit gets its own
//! `Sink`, which is dropped as soon as the unit ends or is stopped.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tokio::sync::oneshot;

use super::{AudioOutput, PlaybackCompletion};
use crate::tts::decode::decode_to_f32;
use crate::tts::{AudioUnit, TtsError};

/// How often the audio thread checks whether the current sink drained.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

enum OutputCommand {
    Play {
        unit: AudioUnit,
        done: oneshot::Sender<Result<(), TtsError>>,
    },
    Pause,
    Resume,
    Stop,
}

/// Device-backed [`AudioOutput`].
pub struct RodioOutput {
    commands: Mutex<mpsc::Sender<OutputCommand>>,
}

impl RodioOutput {
    /// Open the named output device (or the default one) on a new audio
    /// thread. `volume` is clamped to 0.0..=2.0.
    pub fn open(output_device: Option<&str>, volume: f32) -> Result<Self, TtsError> {
        let (tx, rx) = mpsc::channel::<OutputCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), TtsError>>();
        let device = output_device.map(str::to_string);
        let volume = volume.clamp(0.0, 2.0);

        std::thread::Builder::new()
            .name("tts-audio-output".into())
            .spawn(move || {
                let (_stream, handle) = match open_output_stream(device.as_deref()) {
                    Ok(pair) => {
                        let _ = ready_tx.send(Ok(()));
                        pair
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_output_loop(&handle, rx, volume);
                tracing::debug!("Audio output thread exiting");
            })
            .map_err(|e| TtsError::Device(format!("Failed to spawn audio thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| TtsError::Device("Audio thread exited during startup".into()))??;

        tracing::info!(device = ?output_device, volume, "Audio output ready");
        Ok(Self {
            commands: Mutex::new(tx),
        })
    }

    fn send(&self, cmd: OutputCommand) -> Result<(), TtsError> {
        let guard = self
            .commands
            .lock()
            .map_err(|e| TtsError::Device(format!("Failed to lock output channel: {}", e)))?;
        guard
            .send(cmd)
            .map_err(|_| TtsError::Device("Audio output thread is gone".into()))
    }
}

impl AudioOutput for RodioOutput {
    fn play(&self, unit: AudioUnit) -> Result<PlaybackCompletion, TtsError> {
        let (done, completion) = PlaybackCompletion::channel();
        self.send(OutputCommand::Play { unit, done })?;
        Ok(completion)
    }

    fn pause(&self) {
        if let Err(e) = self.send(OutputCommand::Pause) {
            tracing::warn!("Pause failed: {}", e);
        }
    }

    fn resume(&self) {
        if let Err(e) = self.send(OutputCommand::Resume) {
            tracing::warn!("Resume failed: {}", e);
        }
    }

    fn stop(&self) {
        if let Err(e) = self.send(OutputCommand::Stop) {
            tracing::warn!("Stop failed: {}", e);
        }
    }
}

/// Audio thread body: one sink per unit, completion reported when drained.
fn run_output_loop(handle: &OutputStreamHandle, rx: mpsc::Receiver<OutputCommand>, volume: f32) {
    let mut current: Option<(Sink, oneshot::Sender<Result<(), TtsError>>)> = None;

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(OutputCommand::Play { unit, done }) => {
                if let Some((sink, prev)) = current.take() {
                    sink.stop();
                    let _ = prev.send(Err(TtsError::Interrupted));
                }
                let index = unit.index;
                match start_unit(handle, &unit, volume) {
                    Ok(sink) => current = Some((sink, done)),
                    Err(e) => {
                        tracing::warn!(index, error = %e, "Unit could not be played");
                        let _ = done.send(Err(e));
                    }
                }
            }
            Ok(OutputCommand::Pause) => {
                if let Some((sink, _)) = &current {
                    sink.pause();
                }
            }
            Ok(OutputCommand::Resume) => {
                if let Some((sink, _)) = &current {
                    sink.play();
                }
            }
            Ok(OutputCommand::Stop) => {
                if let Some((sink, done)) = current.take() {
                    sink.stop();
                    let _ = done.send(Err(TtsError::Interrupted));
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let drained = matches!(&current, Some((sink, _)) if sink.empty());
        if drained {
            if let Some((_, done)) = current.take() {
                let _ = done.send(Ok(()));
            }
        }
    }

    if let Some((sink, done)) = current.take() {
        sink.stop();
        let _ = done.send(Err(TtsError::Interrupted));
    }
}

/// Decode a unit and start it on a fresh sink.
fn start_unit(handle: &OutputStreamHandle, unit: &AudioUnit, volume: f32) -> Result<Sink, TtsError> {
    let decoded = decode_to_f32(&unit.bytes, unit.format)?;

    tracing::debug!(
        index = unit.index,
        samples = decoded.samples.len(),
        sample_rate = decoded.sample_rate,
        duration_secs = format!("{:.2}", decoded.duration_secs()),
        "Starting unit playback"
    );

    let sink = Sink::try_new(handle)
        .map_err(|e| TtsError::Device(format!("Failed to create audio sink: {}", e)))?;
    sink.set_volume(volume);
    sink.append(rodio::buffer::SamplesBuffer::new(
        1,
        decoded.sample_rate,
        decoded.samples,
    ));
    Ok(sink)
}

/// Open the audio output stream for a named or default device.
fn open_output_stream(
    output_device_name: Option<&str>,
) -> Result<(OutputStream, OutputStreamHandle), TtsError> {
    if let Some(name) = output_device_name {
        let host = cpal::default_host();
        let device = host
            .output_devices()
            .map_err(|e| TtsError::Device(format!("Failed to enumerate output devices: {}", e)))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false));

        match device {
            Some(dev) => {
                tracing::info!(device = %name, "Using configured output device");
                return OutputStream::try_from_device(&dev).map_err(|e| {
                    TtsError::Device(format!("Failed to open output device '{}': {}", name, e))
                });
            }
            None => {
                tracing::warn!(
                    device = %name,
                    "Configured output device not found, falling back to default"
                );
            }
        }
    }

    OutputStream::try_default()
        .map_err(|e| TtsError::Device(format!("No audio output device available: {}", e)))
}
