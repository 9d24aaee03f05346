use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single adapter attempt. The orchestrator logs it and moves on.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider is not available")]
    Unavailable,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("call exceeded {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("provider declined: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("timed out: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}
