//! Text-to-Speech synthesis clients and shared types.
//!
//! Provides a trait-based abstraction for remote synthesis with
//! implementations for:
//! - Kokoro-82M hosted on DeepInfra (HTTP REST, default)
//! - Gemini TTS (HTTP REST, raw PCM wrapped in WAV)
//!
//! Synthesis output is an opaque encoded payload plus a format tag. Decoding
//! to PCM happens at playback time (see `decode`).

pub mod decode;
mod gemini;
mod kokoro;
pub mod segment;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use gemini::{GeminiTts, DEFAULT_GEMINI_VOICE};
pub use kokoro::{KokoroTts, KokoroVoice};
pub use segment::{Segmenter, TextUnit};

/// Hard cap on the text sent in a single request. Both providers reject or
/// truncate beyond roughly this size.
pub const MAX_REQUEST_CHARS: usize = 1000;

// ── Audio types ─────────────────────────────────────────────────────

/// Encoding of a synthesized payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Flac,
    /// Raw signed 16-bit little-endian mono PCM at 24 kHz.
    Pcm,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Pcm => "pcm",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            "flac" => Ok(Self::Flac),
            "pcm" => Ok(Self::Pcm),
            other => Err(TtsError::Synthesis(format!(
                "Unsupported audio format: {}",
                other
            ))),
        }
    }
}

/// Voice parameters passed with every synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub voice: String,
    pub format: AudioFormat,
    pub speed: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            voice: "af_bella".into(),
            format: AudioFormat::Mp3,
            speed: 1.0,
        }
    }
}

/// Encoded audio returned by a synthesizer for one piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

/// Synthesized audio for one [`TextUnit`], tagged with that unit's index.
///
/// Moved into the playback queue once ready; the producer keeps no copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUnit {
    pub index: usize,
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

impl AudioUnit {
    pub fn new(index: usize, audio: SynthesizedAudio) -> Self {
        Self {
            index,
            format: audio.format,
            bytes: audio.bytes,
        }
    }
}

// ── Synthesizer trait ───────────────────────────────────────────────

/// Common trait for remote synthesis clients (dyn-compatible).
///
/// One call turns one piece of text into one encoded payload. Callers are
/// expected to pre-segment text; implementations clamp oversized input to
/// [`MAX_REQUEST_CHARS`].
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(
        &self,
        text: &str,
        params: &VoiceParams,
    ) -> Pin<Box<dyn Future<Output = Result<SynthesizedAudio, TtsError>> + Send + '_>>;

    /// Human-readable engine name for logs.
    fn name(&self) -> String;
}

// ── TTS Error ───────────────────────────────────────────────────────

/// Errors raised while synthesizing or playing speech.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TtsError {
    /// One request failed (bad status, malformed payload). Scoped to a unit.
    #[error("TTS synthesis error: {0}")]
    Synthesis(String),
    /// The synthesis service cannot be reached or refuses our credentials.
    #[error("TTS service unavailable: {0}")]
    Unavailable(String),
    /// A unit could not be decoded or played.
    #[error("TTS playback error: {0}")]
    Playback(String),
    /// The audio output device could not be opened.
    #[error("Audio output error: {0}")]
    Device(String),
    /// Playback of a unit was cut short by `stop()`.
    #[error("TTS playback interrupted")]
    Interrupted,
}

impl TtsError {
    /// Whether this error ends the whole session rather than a single unit.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Device(_))
    }

    /// Classify a transport error from reqwest.
    pub(crate) fn from_request(provider: &str, e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Self::Unavailable(format!("{} unreachable: {}", provider, e))
        } else {
            Self::Synthesis(format!("{} request failed: {}", provider, e))
        }
    }

    /// Classify a non-success HTTP status.
    pub(crate) fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let msg = format!("{} API error {}: {}", provider, status, body);
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            Self::Unavailable(msg)
        } else {
            Self::Synthesis(msg)
        }
    }
}

/// Clamp text to at most `max_chars` characters, respecting char boundaries.
pub(crate) fn clamp_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

// ── Synthesizer Factory ─────────────────────────────────────────────

/// Create a synthesis client for the named provider.
///
/// `provider` is one of: "kokoro", "gemini". A missing API key is not an
/// error here; it surfaces as [`TtsError::Unavailable`] on the first call.
pub fn create_synthesizer(
    provider: &str,
    api_key: Option<&str>,
) -> Result<Arc<dyn SpeechSynthesizer>, TtsError> {
    match provider {
        "kokoro" => {
            tracing::info!("Created Kokoro TTS client");
            Ok(Arc::new(KokoroTts::new(api_key)))
        }
        "gemini" => {
            tracing::info!("Created Gemini TTS client");
            Ok(Arc::new(GeminiTts::new(api_key)))
        }
        other => Err(TtsError::Synthesis(format!(
            "Unknown TTS provider: {}",
            other
        ))),
    }
}

/// Voice ids offered by the named provider.
pub fn available_voices(provider: &str) -> Vec<String> {
    match provider {
        "gemini" => GeminiTts::available_voices()
            .iter()
            .map(|(name, _)| name.to_string())
            .collect(),
        _ => KokoroTts::available_voices()
            .iter()
            .map(|v| v.id.to_string())
            .collect(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
