//! Configuration reading and data directory paths.

pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pipeline::EngineOptions;
use crate::tts::{AudioFormat, Segmenter, VoiceParams, DEFAULT_GEMINI_VOICE};
use paths::get_data_dir;

/// tts_config.json shape. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// "kokoro" or "gemini".
    pub provider: String,
    /// Kokoro preset voice.
    pub voice: String,
    /// Gemini prebuilt voice.
    pub gemini_voice: String,
    pub format: AudioFormat,
    pub speed: f32,
    /// Output gain, 0.0 to 2.0.
    pub volume: f32,
    /// Output device name; the system default when unset or not found.
    pub output_device: Option<String>,
    pub api_key: Option<String>,
    pub inter_call_delay_ms: u64,
    pub min_unit_chars: usize,
    pub max_unit_chars: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        let voice = VoiceParams::default();
        let segmenter = Segmenter::default();
        Self {
            provider: "kokoro".into(),
            voice: voice.voice,
            gemini_voice: DEFAULT_GEMINI_VOICE.into(),
            format: voice.format,
            speed: voice.speed,
            volume: 1.0,
            output_device: None,
            api_key: None,
            inter_call_delay_ms: crate::pipeline::DEFAULT_INTER_CALL_DELAY.as_millis() as u64,
            min_unit_chars: segmenter.min_chars(),
            max_unit_chars: segmenter.max_chars(),
        }
    }
}

impl TtsConfig {
    /// Environment variable holding the API key for the configured provider.
    pub fn api_key_env_var(&self) -> &'static str {
        match self.provider.as_str() {
            "gemini" => "GEMINI_API_KEY",
            _ => "DEEPINFRA_API_KEY",
        }
    }

    /// Fill in values the file left out from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            self.api_key = lookup(self.api_key_env_var()).filter(|k| !k.is_empty());
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Voice parameters for the configured provider.
    pub fn voice_params(&self) -> VoiceParams {
        let voice = match self.provider.as_str() {
            "gemini" => self.gemini_voice.clone(),
            _ => self.voice.clone(),
        };
        VoiceParams {
            voice,
            format: self.format,
            speed: self.speed.clamp(0.5, 2.0),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            voice: self.voice_params(),
            segmenter: Segmenter::new(self.min_unit_chars, self.max_unit_chars),
            inter_call_delay: Duration::from_millis(self.inter_call_delay_ms),
        }
    }
}

/// Read tts_config.json from the data directory, with environment fallbacks.
pub fn read_tts_config() -> TtsConfig {
    let path = get_config_path();
    let mut config: TtsConfig = read_json_file(&path).unwrap_or_default();
    config.apply_env(|name| std::env::var(name).ok());
    config
}

/// Path to tts_config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("tts_config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
