//! Kokoro-82M synthesis via the DeepInfra inference API.
//!
//! POST `https://api.deepinfra.com/v1/inference/hexgrad/Kokoro-82M`
//! Body: `{"text": ..., "preset_voice": ["af_bella"], "output_format": "mp3", "speed": 1.0}`
//! Returns JSON whose `audio` field is a base64 data URL.

use std::future::Future;
use std::pin::Pin;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    clamp_chars, AudioFormat, SpeechSynthesizer, SynthesizedAudio, TtsError, VoiceParams,
    MAX_REQUEST_CHARS,
};

const KOKORO_URL: &str = "https://api.deepinfra.com/v1/inference/hexgrad/Kokoro-82M";

/// A Kokoro preset voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KokoroVoice {
    pub id: &'static str,
    pub name: &'static str,
    pub language: &'static str,
}

const VOICES: &[KokoroVoice] = &[
    KokoroVoice { id: "af_bella", name: "Bella", language: "en-US" },
    KokoroVoice { id: "af_sarah", name: "Sarah", language: "en-US" },
    KokoroVoice { id: "af_nicole", name: "Nicole", language: "en-US" },
    KokoroVoice { id: "af_sky", name: "Sky", language: "en-US" },
    KokoroVoice { id: "af_heart", name: "Heart", language: "en-US" },
    KokoroVoice { id: "am_adam", name: "Adam", language: "en-US" },
];

#[derive(Serialize)]
struct KokoroRequest<'a> {
    text: &'a str,
    preset_voice: [&'a str; 1],
    output_format: &'a str,
    speed: f32,
}

#[derive(Deserialize)]
struct KokoroResponse {
    #[serde(default)]
    audio: Option<String>,
}

/// Kokoro TTS client (DeepInfra hosted).
pub struct KokoroTts {
    api_key: Option<String>,
    endpoint: String,
    client: reqwest::Client,
}

impl KokoroTts {
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_endpoint(api_key, KOKORO_URL)
    }

    pub fn with_endpoint(api_key: Option<&str>, endpoint: &str) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()).map(str::to_string),
            endpoint: endpoint.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Available preset voices.
    pub fn available_voices() -> &'static [KokoroVoice] {
        VOICES
    }

    async fn request(&self, text: String, params: VoiceParams) -> Result<SynthesizedAudio, TtsError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TtsError::Unavailable("Kokoro TTS requires a DeepInfra API key".into()))?;

        if text.trim().is_empty() {
            return Err(TtsError::Synthesis("Empty text".into()));
        }

        let text = clamp_chars(&text, MAX_REQUEST_CHARS);
        info!(voice = %params.voice, format = %params.format, text_len = text.len(), "Kokoro TTS request");

        let body = KokoroRequest {
            text,
            preset_voice: [params.voice.as_str()],
            output_format: params.format.as_str(),
            speed: params.speed,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::from_request("Kokoro TTS", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TtsError::from_status("Kokoro TTS", status, &body));
        }

        let payload: KokoroResponse = resp
            .json()
            .await
            .map_err(|e| TtsError::Synthesis(format!("Malformed Kokoro response: {}", e)))?;

        let data_url = payload
            .audio
            .ok_or_else(|| TtsError::Synthesis("No audio data in Kokoro response".into()))?;
        let (format, bytes) = decode_data_url(&data_url, params.format)?;

        debug!(bytes = bytes.len(), %format, "Kokoro TTS audio received");
        Ok(SynthesizedAudio { format, bytes })
    }
}

impl SpeechSynthesizer for KokoroTts {
    fn synthesize(
        &self,
        text: &str,
        params: &VoiceParams,
    ) -> Pin<Box<dyn Future<Output = Result<SynthesizedAudio, TtsError>> + Send + '_>> {
        let text = text.to_string();
        let params = params.clone();
        Box::pin(self.request(text, params))
    }

    fn name(&self) -> String {
        "Kokoro (DeepInfra)".into()
    }
}

/// Decode a `data:audio/<fmt>;base64,<payload>` URL.
///
/// The MIME subtype overrides `requested` when it names a known format; a
/// bare base64 string is accepted as-is.
fn decode_data_url(url: &str, requested: AudioFormat) -> Result<(AudioFormat, Vec<u8>), TtsError> {
    let (format, encoded) = match url.strip_prefix("data:") {
        Some(rest) => {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or_else(|| TtsError::Synthesis("Malformed audio data URL".into()))?;
            if !meta.ends_with(";base64") {
                return Err(TtsError::Synthesis("Audio data URL is not base64".into()));
            }
            let mime = meta.trim_end_matches(";base64");
            let format = match mime.strip_prefix("audio/") {
                Some("mpeg") | Some("mp3") => AudioFormat::Mp3,
                Some("wav") | Some("x-wav") | Some("wave") => AudioFormat::Wav,
                Some("flac") => AudioFormat::Flac,
                Some("pcm") | Some("L16") => AudioFormat::Pcm,
                _ => requested,
            };
            (format, payload)
        }
        None => (requested, url),
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| TtsError::Synthesis(format!("Invalid base64 audio: {}", e)))?;
    if bytes.is_empty() {
        return Err(TtsError::Synthesis("Empty audio in Kokoro response".into()));
    }
    Ok((format, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kokoro_creation() {
        let engine = KokoroTts::new(Some("key"));
        assert!(engine.name().contains("Kokoro"));
        assert_eq!(KokoroTts::available_voices()[0].id, "af_bella");
    }

    #[test]
    fn test_request_body_shape() {
        let body = KokoroRequest {
            text: "Hello there.",
            preset_voice: ["af_sky"],
            output_format: "mp3",
            speed: 1.25,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["preset_voice"], serde_json::json!(["af_sky"]));
        assert_eq!(json["output_format"], "mp3");
        assert_eq!(json["speed"], 1.25);
    }

    #[test]
    fn test_decode_data_url_mp3() {
        let (format, bytes) =
            decode_data_url("data:audio/mpeg;base64,SUQz", AudioFormat::Wav).unwrap();
        assert_eq!(format, AudioFormat::Mp3);
        assert_eq!(bytes, b"ID3");
    }

    #[test]
    fn test_decode_data_url_unknown_mime_keeps_requested() {
        let (format, _) = decode_data_url("data:audio/ogg;base64,AAAA", AudioFormat::Flac).unwrap();
        assert_eq!(format, AudioFormat::Flac);
    }

    #[test]
    fn test_decode_bare_base64() {
        let (format, bytes) = decode_data_url("AAEC", AudioFormat::Pcm).unwrap();
        assert_eq!(format, AudioFormat::Pcm);
        assert_eq!(bytes, vec![0, 1, 2]);
    }

    #[test]
    fn test_decode_data_url_errors() {
        assert!(decode_data_url("data:audio/mpeg;base64", AudioFormat::Mp3).is_err());
        assert!(decode_data_url("data:text/plain,hello", AudioFormat::Mp3).is_err());
        assert!(decode_data_url("data:audio/mpeg;base64,!!!", AudioFormat::Mp3).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let engine = KokoroTts::new(None);
        let err = engine
            .synthesize("Hello there.", &VoiceParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Unavailable(_)));
        assert!(err.is_session_fatal());
    }
}
