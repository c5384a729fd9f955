//! Wire types exchanged with the client, independent of the concrete transport.
//!
//! ## Inbound
//!
//! Binary messages are raw PCM16 audio. Text messages are JSON control
//! messages tagged by `type`:
//!
//! | Message | JSON |
//! |---------|------|
//! | `Flush` | `{"type":"flush"}` |
//! | `Resume` | `{"type":"resume"}` |
//! | `Interrupt` | `{"type":"interrupt"}` |
//! | `SelectVoice` | `{"type":"selectVoice","voice":"zh-CN-XiaoxiaoNeural"}` |
//! | `TextQuery` | `{"type":"textQuery","text":"hello"}` |
//! | `Close` | `{"type":"close"}` (alias `stop`) |
//!
//! The keyed shorthand `{"selectVoice":"id"}` / `{"textQuery":"hi"}` and a bare
//! type name (`flush`) are accepted too.
//!
//! ## Outbound
//!
//! Playback frames go out as binary messages; everything else is a JSON
//! [`ServerEvent`].

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    engine::TurnState,
    error::{ParleyError, Result},
};

// ---------------------------------------------------------------------------
// Inbound control messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Close the buffered utterance now and start a turn.
    Flush,
    /// Leave the `Interrupted` state and listen again.
    Resume,
    /// Cancel the reply in progress.
    Interrupt,
    SelectVoice {
        #[serde(alias = "id", alias = "voiceId")]
        voice: String,
    },
    /// Typed input; skips recognition.
    TextQuery { text: String },
    #[serde(alias = "stop")]
    Close,
}

impl ClientMessage {
    /// Parse a text frame.
    ///
    /// # Errors
    /// `ParleyError::MalformedControl` for anything that is not a known message.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParleyError::MalformedControl("empty message".into()));
        }

        let value = if trimmed.starts_with('{') {
            let parsed: Value = serde_json::from_str(trimmed)
                .map_err(|e| ParleyError::MalformedControl(e.to_string()))?;
            normalize_keyed_shorthand(parsed)
        } else {
            let mut obj = Map::new();
            obj.insert("type".into(), Value::String(trimmed.to_string()));
            Value::Object(obj)
        };

        serde_json::from_value(value).map_err(|e| ParleyError::MalformedControl(e.to_string()))
    }
}

/// `{"selectVoice":"x"}` → `{"type":"selectVoice","voice":"x"}`.
fn normalize_keyed_shorthand(value: Value) -> Value {
    let Value::Object(obj) = value else {
        return value;
    };
    if obj.contains_key("type") || obj.len() != 1 {
        return Value::Object(obj);
    }
    let Some((key, inner)) = obj.into_iter().next() else {
        return Value::Object(Map::new());
    };
    let mut out = Map::new();
    match key.as_str() {
        "selectVoice" => {
            out.insert("voice".into(), inner);
        }
        "textQuery" => {
            out.insert("text".into(), inner);
        }
        _ => {}
    }
    out.insert("type".into(), Value::String(key));
    Value::Object(out)
}

// ---------------------------------------------------------------------------
// Outbound events
// ---------------------------------------------------------------------------

/// Every JSON event the engine sends to the client. `generation` identifies the
/// reply cycle the event belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Recognized (or typed) user text.
    Transcript { generation: u64, text: String },
    /// One streamed piece of the reply.
    ReplyTextDelta { generation: u64, delta: String },
    /// The complete reply text.
    ReplyText { generation: u64, text: String },
    /// First playback frame of a generation is about to follow.
    TtsBegin { generation: u64 },
    /// Inline playback frame (base64 PCM16) for transports without binary frames.
    TtsChunk {
        generation: u64,
        seq: u64,
        audio: String,
    },
    /// Playback for a generation is over; `interrupted` when cut short.
    TtsEnd { generation: u64, interrupted: bool },
    TurnState { generation: u64, state: TurnState },
    Error {
        kind: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        generation: Option<u64>,
    },
}

impl ServerEvent {
    pub fn tts_chunk(generation: u64, seq: u64, pcm16: &[u8]) -> Self {
        ServerEvent::TtsChunk {
            generation,
            seq,
            audio: base64::engine::general_purpose::STANDARD.encode(pcm16),
        }
    }

    pub fn error(err: &ParleyError, generation: Option<u64>) -> Self {
        ServerEvent::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
            generation,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
