//! Gemini TTS via the Generative Language REST API.
//!
//! POST `{base}/gemini-2.5-flash-preview-tts:generateContent`
//! The response carries base64 raw PCM (16-bit, 24 kHz, mono) which is
//! wrapped in a WAV container so it can be handled like any other payload.

use std::future::Future;
use std::pin::Pin;

use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::decode::PCM_SAMPLE_RATE;
use super::{
    clamp_chars, AudioFormat, SpeechSynthesizer, SynthesizedAudio, TtsError, VoiceParams,
    MAX_REQUEST_CHARS,
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Default prebuilt voice.
pub const DEFAULT_GEMINI_VOICE: &str = "Kore";

/// Prebuilt Gemini voices as (name, style).
const VOICES: &[(&str, &str)] = &[
    ("Zephyr", "Bright"),
    ("Puck", "Upbeat"),
    ("Charon", "Informative"),
    ("Kore", "Firm"),
    ("Fenrir", "Excitable"),
    ("Leda", "Youthful"),
    ("Orus", "Firm"),
    ("Aoede", "Breezy"),
    ("Callirhoe", "Easy-going"),
    ("Autonoe", "Bright"),
    ("Enceladus", "Breathy"),
    ("Iapetus", "Clear"),
    ("Umbriel", "Easy-going"),
    ("Algieba", "Smooth"),
    ("Despina", "Smooth"),
];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    data: String,
}

/// Gemini TTS client.
pub struct GeminiTts {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiTts {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()).map(str::to_string),
            base_url: GEMINI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Available prebuilt voices as (name, style).
    pub fn available_voices() -> &'static [(&'static str, &'static str)] {
        VOICES
    }

    fn build_body(text: &str, voice: &str) -> serde_json::Value {
        json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": voice }
                    }
                }
            }
        })
    }

    async fn request(&self, text: String, params: VoiceParams) -> Result<SynthesizedAudio, TtsError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TtsError::Unavailable("Gemini TTS requires an API key".into()))?;

        if text.trim().is_empty() {
            return Err(TtsError::Synthesis("Empty text".into()));
        }

        let text = clamp_chars(&text, MAX_REQUEST_CHARS);
        info!(voice = %params.voice, text_len = text.len(), "Gemini TTS request");

        let url = format!("{}/{}:generateContent", self.base_url, GEMINI_TTS_MODEL);
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&Self::build_body(text, &params.voice))
            .send()
            .await
            .map_err(|e| TtsError::from_request("Gemini TTS", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TtsError::from_status("Gemini TTS", status, &body));
        }

        let payload: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| TtsError::Synthesis(format!("Malformed Gemini response: {}", e)))?;

        let pcm = extract_pcm(payload)?;
        let bytes = wrap_pcm_in_wav(&pcm)?;
        debug!(pcm_bytes = pcm.len(), wav_bytes = bytes.len(), "Gemini TTS audio received");

        Ok(SynthesizedAudio {
            format: AudioFormat::Wav,
            bytes,
        })
    }
}

impl SpeechSynthesizer for GeminiTts {
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
        format!("Gemini TTS ({})", GEMINI_TTS_MODEL)
    }
}

fn extract_pcm(payload: GenerateResponse) -> Result<Vec<u8>, TtsError> {
    let data = payload
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().find_map(|p| p.inline_data))
        .map(|d| d.data)
        .ok_or_else(|| TtsError::Synthesis("No audio data in Gemini response".into()))?;

    let pcm = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| TtsError::Synthesis(format!("Invalid base64 audio: {}", e)))?;
    if pcm.len() < 2 {
        return Err(TtsError::Synthesis("Empty audio in Gemini response".into()));
    }
    Ok(pcm)
}

/// Wrap 16-bit mono 24 kHz PCM in a WAV container.
fn wrap_pcm_in_wav(pcm: &[u8]) -> Result<Vec<u8>, TtsError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: PCM_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| TtsError::Synthesis(format!("WAV header write failed: {}", e)))?;
        let mut samples = writer.get_i16_writer(pcm.len() as u32 / 2);
        for chunk in pcm.chunks_exact(2) {
            samples.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]));
        }
        samples
            .flush()
            .map_err(|e| TtsError::Synthesis(format!("WAV write failed: {}", e)))?;
        writer
            .finalize()
            .map_err(|e| TtsError::Synthesis(format!("WAV finalize failed: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::decode::decode_to_f32;

    #[test]
    fn test_gemini_creation() {
        let engine = GeminiTts::new(Some("key"));
        assert!(engine.name().contains("Gemini"));
        assert!(GeminiTts::available_voices()
            .iter()
            .any(|(name, _)| *name == DEFAULT_GEMINI_VOICE));
    }

    #[test]
    fn test_body_carries_voice_and_modality() {
        let body = GeminiTts::build_body("Hello there.", "Puck");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello there.");
        assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
    }

    #[test]
    fn test_extract_pcm_from_response() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"inlineData":{"mimeType":"audio/L16;rate=24000","data":"AAABAA=="}}]}}]}"#;
        let payload: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_pcm(payload).unwrap(), vec![0, 0, 1, 0]);
    }

    #[test]
    fn test_extract_pcm_missing_audio() {
        let payload: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(extract_pcm(payload), Err(TtsError::Synthesis(_))));
    }

    #[test]
    fn test_wav_wrapping_decodes_back() {
        let pcm: Vec<u8> = (0..960i16).flat_map(|s| (s * 10).to_le_bytes()).collect();
        let wav = wrap_pcm_in_wav(&pcm).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let decoded = decode_to_f32(&wav, AudioFormat::Wav).unwrap();
        assert_eq!(decoded.sample_rate, PCM_SAMPLE_RATE);
        assert_eq!(decoded.samples.len(), 960);
    }
}
