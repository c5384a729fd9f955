use thiserror::Error;

/// All errors produced by parley-core.
#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("malformed audio: {len} bytes is not a whole number of 16-bit samples")]
    MalformedAudio { len: usize },

    #[error("malformed control message: {0}")]
    MalformedControl(String),

    #[error("resampler error: {0}")]
    Resampler(String),

    #[error("transcription unavailable: {0}")]
    Transcription(String),

    #[error("reply generation failed: {0}")]
    Reply(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("{stage} timed out after {timeout_ms} ms")]
    CollaboratorTimeout { stage: &'static str, timeout_ms: u64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ParleyError {
    /// Bad input from the client. The offending message is dropped and the
    /// session keeps running.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            ParleyError::MalformedAudio { .. } | ParleyError::MalformedControl(_)
        )
    }

    /// A recognizer / reply / synthesis call failed or timed out. Aborts the
    /// current turn only.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            ParleyError::Transcription(_)
                | ParleyError::Reply(_)
                | ParleyError::Synthesis(_)
                | ParleyError::CollaboratorTimeout { .. }
        )
    }

    /// Short machine-readable tag used in outbound `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            ParleyError::MalformedAudio { .. } => "malformedAudio",
            ParleyError::MalformedControl(_) => "malformedControl",
            ParleyError::Resampler(_) => "resampler",
            ParleyError::Transcription(_) => "transcription",
            ParleyError::Reply(_) => "reply",
            ParleyError::Synthesis(_) => "synthesis",
            ParleyError::CollaboratorTimeout { .. } => "timeout",
            ParleyError::Other(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_helpers_split_input_and_collaborator_failures() {
        let odd = ParleyError::MalformedAudio { len: 3 };
        assert!(odd.is_malformed_input());
        assert!(!odd.is_collaborator_failure());

        let timeout = ParleyError::CollaboratorTimeout {
            stage: "transcribe",
            timeout_ms: 10,
        };
        assert!(timeout.is_collaborator_failure());
        assert!(!timeout.is_malformed_input());
        assert_eq!(timeout.to_string(), "transcribe timed out after 10 ms");
        assert_eq!(timeout.kind(), "timeout");
    }
}
