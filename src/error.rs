use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("configuration error: {message}")]
    Config { message: String },
    #[error("resource exhausted: {what} exceeds limit {limit}")]
    ResourceExhausted { what: &'static str, limit: usize },
    #[error("score overflow at frame {frame}: best score {score} is positive")]
    ScoreOverflow { frame: u32, score: i32 },
    #[error("score underflow at frame {frame}: best score {score} plus beam crosses log-zero")]
    ScoreUnderflow { frame: u32, score: i32 },
    #[error("disconnected search graph: no active HMM at frame {frame}")]
    DisconnectedGraph { frame: u32 },
    #[error("decoding cancelled at frame {frame}")]
    Cancelled { frame: u32 },
    #[error("acoustic scorer failed at frame {frame}: {message}")]
    Acoustic { frame: u32, message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl DecoderError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn exhausted(what: &'static str, limit: usize) -> Self {
        Self::ResourceExhausted { what, limit }
    }

    pub fn acoustic(frame: u32, err: impl std::fmt::Display) -> Self {
        Self::Acoustic {
            frame,
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// True for failures that only affect the utterance being decoded.
    pub fn is_per_utterance(&self) -> bool {
        matches!(
            self,
            Self::ScoreOverflow { .. }
                | Self::ScoreUnderflow { .. }
                | Self::DisconnectedGraph { .. }
                | Self::Cancelled { .. }
                | Self::Acoustic { .. }
                | Self::ResourceExhausted { .. }
                | Self::InvalidInput { .. }
        )
    }
}
