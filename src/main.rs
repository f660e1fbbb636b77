//! Voice TTS engine host.
//!
//! Communicates with the host process via JSON-line IPC on stdin/stdout.
//! Initializes logging, configuration, the synthesis client and the audio
//! output, then runs the command loop.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::{error, info, warn};

use voice_tts::config::{get_config_path, read_tts_config, TtsConfig};
use voice_tts::ipc::bridge::{emit_error, emit_event, spawn_stdin_reader};
use voice_tts::ipc::{TtsCommand, TtsEvent};
use voice_tts::logger;
use voice_tts::pipeline::{SessionController, SessionEvents};
use voice_tts::playback::RodioOutput;
use voice_tts::tts::{available_voices, create_synthesizer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = logger::try_init() {
        logger::init_stderr_only();
        warn!("File logging unavailable: {:#}", e);
    }

    // Emit starting event immediately so the host knows we're alive.
    emit_event(&TtsEvent::Starting {});

    let result = run().await;
    if let Err(e) = &result {
        error!("Fatal: {:#}", e);
        emit_error(&format!("{:#}", e));
    }
    info!("Voice TTS shutting down");
    result
}

async fn run() -> anyhow::Result<()> {
    let config = read_tts_config();
    info!(
        path = %get_config_path().display(),
        provider = %config.provider,
        format = %config.format,
        has_api_key = config.api_key().is_some(),
        "Configuration loaded"
    );
    if config.api_key().is_none() {
        warn!(
            "No API key configured; set {} or api_key in the config file",
            config.api_key_env_var()
        );
    }

    let synthesizer = create_synthesizer(&config.provider, config.api_key())
        .context("Failed to create TTS client")?;

    let device = config.output_device.clone();
    let volume = config.volume;
    let output = tokio::task::spawn_blocking(move || RodioOutput::open(device.as_deref(), volume))
        .await
        .context("Audio output init task failed")?
        .context("Failed to open audio output")?;

    let controller = SessionController::new(synthesizer, Arc::new(output), config.engine_options());
    let utterance = Arc::new(Mutex::new(String::new()));
    spawn_event_forwarder(controller.subscribe(), Arc::clone(&utterance));

    let mut cmd_rx = spawn_stdin_reader();

    emit_event(&TtsEvent::Ready {
        engine: controller.synthesizer_name(),
    });
    info!(engine = %controller.synthesizer_name(), "Voice TTS ready");

    loop {
        match cmd_rx.recv().await {
            Some(command) => {
                if !handle_command(command, &controller, &config, &utterance) {
                    break;
                }
            }
            None => {
                info!("stdin closed, shutting down");
                controller.stop();
                break;
            }
        }
    }

    Ok(())
}

/// Handle a single command from the host.
/// Returns `false` if the main loop should exit.
fn handle_command(
    cmd: TtsCommand,
    controller: &SessionController,
    config: &TtsConfig,
    utterance: &Mutex<String>,
) -> bool {
    match cmd {
        TtsCommand::Speak { text } => {
            *utterance.lock().unwrap_or_else(|e| e.into_inner()) = text.clone();
            if controller.speak(&text).is_none() {
                info!("Nothing speakable in request");
            }
        }

        TtsCommand::Stop {} => controller.stop(),

        TtsCommand::Pause {} => controller.pause(),

        TtsCommand::Resume {} => controller.resume(),

        TtsCommand::SetVoice { voice, speed } => {
            let mut params = controller.voice_params();
            params.voice = voice;
            if let Some(speed) = speed {
                params.speed = speed.clamp(0.5, 2.0);
            }
            info!(voice = %params.voice, speed = params.speed, "Voice changed");
            controller.set_voice_params(params);
        }

        TtsCommand::ListVoices {} => {
            emit_event(&TtsEvent::VoiceList {
                voices: available_voices(&config.provider),
            });
        }

        TtsCommand::Ping {} => {
            emit_event(&TtsEvent::Pong {});
        }

        TtsCommand::Shutdown {} => {
            controller.stop();
            emit_event(&TtsEvent::Stopping {});
            return false;
        }
    }

    true
}

/// Translate engine state changes into IPC events.
fn spawn_event_forwarder(mut events: SessionEvents, utterance: Arc<Mutex<String>>) {
    tokio::spawn(async move {
        let mut last = events.snapshot();
        while let Some(snapshot) = events.changed().await {
            if snapshot.state != last.state {
                emit_event(&TtsEvent::StateChange {
                    state: snapshot.state,
                });
            }
            if snapshot.is_playing && !last.is_playing {
                let text = utterance.lock().unwrap_or_else(|e| e.into_inner()).clone();
                emit_event(&TtsEvent::SpeakingStart { text });
            } else if !snapshot.is_playing && last.is_playing {
                emit_event(&TtsEvent::SpeakingEnd {});
            }
            if snapshot.last_error != last.last_error {
                if let Some(e) = &snapshot.last_error {
                    emit_error(&e.to_string());
                }
            }
            last = snapshot;
        }
    });
}
