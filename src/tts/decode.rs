//! Encoded audio to f32 PCM decoding via Symphonia.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioFormat, TtsError};

/// Sample rate of raw PCM payloads (Gemini and Kokoro `pcm` output).
pub const PCM_SAMPLE_RATE: u32 = 24_000;

/// Mono f32 samples ready for the output device.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode an encoded payload to mono f32 PCM.
pub fn decode_to_f32(bytes: &[u8], format: AudioFormat) -> Result<DecodedAudio, TtsError> {
    if bytes.is_empty() {
        return Err(TtsError::Playback("Empty audio payload".into()));
    }

    match format {
        AudioFormat::Pcm => Ok(DecodedAudio {
            samples: pcm16_to_f32(bytes),
            sample_rate: PCM_SAMPLE_RATE,
        }),
        AudioFormat::Mp3 | AudioFormat::Wav | AudioFormat::Flac => decode_container(bytes, format),
    }
}

/// Convert signed 16-bit little-endian PCM to f32 samples.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect()
}

fn decode_container(bytes: &[u8], format: AudioFormat) -> Result<DecodedAudio, TtsError> {
    // MediaSourceStream needs an owned ('static) source.
    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.as_str());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| TtsError::Playback(format!("{} probe failed: {}", format, e)))?;

    let mut reader = probed.format;
    let track = reader
        .default_track()
        .ok_or_else(|| TtsError::Playback(format!("No audio track in {}", format)))?;
    let track_id = track.id;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1)
        .max(1);
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(PCM_SAMPLE_RATE);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| TtsError::Playback(format!("{} decoder init failed: {}", format, e)))?;

    let mut all_samples = Vec::new();

    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(TtsError::Playback(format!("{} decode error: {}", format, e)));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("{} packet decode error (skipping): {}", format, e);
                continue;
            }
        };
        let spec = *decoded.spec();
        sample_rate = spec.rate;
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let samples = sample_buf.samples();

        if channels == 1 {
            all_samples.extend_from_slice(samples);
        } else {
            for frame in samples.chunks(channels) {
                let sum: f32 = frame.iter().sum();
                all_samples.push(sum / channels as f32);
            }
        }
    }

    if all_samples.is_empty() {
        return Err(TtsError::Playback(format!("{} payload contained no audio", format)));
    }

    Ok(DecodedAudio {
        samples: all_samples,
        sample_rate,
    })
}
