//! Voice TTS: cancellable incremental text-to-speech.
//!
//! Text is split into sentences, each sentence is synthesized by a remote
//! provider (Kokoro via DeepInfra, or Gemini) and played as soon as it
//! arrives while the next one is being generated. A new `speak()` or a
//! `stop()` cancels everything in progress.

pub mod config;
pub mod ipc;
pub mod logger;
pub mod pipeline;
pub mod playback;
pub mod tts;

#[cfg(test)]
mod test_support;
