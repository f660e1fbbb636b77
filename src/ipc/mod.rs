//! IPC protocol types for the host process.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (engine -> host).
//! Commands use `{"command": "<name>", ...}` format (host -> engine).

pub mod bridge;

use serde::{Deserialize, Serialize};

use crate::pipeline::SessionState;

// ---------------------------------------------------------------------------
// Events: engine -> host (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the host via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum TtsEvent {
    Starting {},
    Ready { engine: String },
    StateChange { state: SessionState },
    SpeakingStart { text: String },
    SpeakingEnd {},
    Error { message: String },
    Pong {},
    VoiceList { voices: Vec<String> },
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: host -> engine (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the host via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum TtsCommand {
    Speak {
        text: String,
    },
    Stop {},
    Pause {},
    Resume {},
    SetVoice {
        voice: String,
        #[serde(default)]
        speed: Option<f32>,
    },
    ListVoices {},
    Ping {},
    Shutdown {},
}
