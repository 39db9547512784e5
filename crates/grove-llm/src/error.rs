/// Failures talking to a completion or embedding backend.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request could not be sent: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed backend payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{provider} kept rejecting requests after {attempts} attempts (status {status})")]
    Throttled {
        provider: &'static str,
        attempts: u32,
        status: u16,
    },

    #[error("{provider} answered {status}: {detail}")]
    Backend {
        provider: &'static str,
        status: u16,
        detail: String,
    },

    #[error("{provider} returned no text")]
    NoContent { provider: &'static str },

    #[error("{provider} stream broke off: {message}")]
    Stream {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} has no embedding model configured")]
    EmbeddingsUnavailable { provider: &'static str },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Backend that produced the error, when known.
    #[must_use]
    pub fn provider(&self) -> Option<&'static str> {
        match self {
            Self::Throttled { provider, .. }
            | Self::Backend { provider, .. }
            | Self::NoContent { provider }
            | Self::Stream { provider, .. }
            | Self::EmbeddingsUnavailable { provider } => Some(*provider),
            Self::Transport(_) | Self::Decode(_) | Self::Other(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_message_includes_detail() {
        let e = LlmError::Backend {
            provider: "openai",
            status: 401,
            detail: "invalid api key".into(),
        };
        assert_eq!(e.to_string(), "openai answered 401: invalid api key");
        assert_eq!(e.provider(), Some("openai"));
    }

    #[test]
    fn untagged_errors_have_no_provider() {
        assert_eq!(LlmError::Other("x".into()).provider(), None);
    }
}
