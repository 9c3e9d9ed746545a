//! Error types for the dialogue engine.

use sous_core::error::SousError;

use crate::capability::Capability;

/// Errors from the dialogue engine.
///
/// Only the request-validation variants ever reach the caller of
/// [`crate::ChatOrchestrator::handle_message`]; everything else is logged and
/// degraded to a chat reply inside the turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat is disabled")]
    Disabled,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("upstream timed out: {0}")]
    UpstreamTimeout(String),
    #[error("upstream HTTP error: {message}")]
    UpstreamHttp {
        status: Option<u16>,
        message: String,
    },
    #[error("malformed completion: {0}")]
    MalformedCompletion(String),
    #[error("no capability selected")]
    NoCapabilitySelected,
    #[error("selection {index} is out of range for {len} suggestions")]
    SelectionOutOfRange { index: usize, len: usize },
    #[error("unknown capability: {0}")]
    UnknownCapability(String),
    #[error("no handler registered for capability: {0}")]
    UnregisteredCapability(Capability),
    #[error("invalid capability arguments: {0}")]
    InvalidArguments(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("session store error: {0}")]
    SessionStore(String),
}

impl ChatError {
    /// Whether a single retry at the HTTP boundary may help.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::UpstreamTimeout(_) => true,
            ChatError::UpstreamHttp { status, .. } => match status {
                Some(code) => *code >= 500,
                None => true,
            },
            _ => false,
        }
    }

    /// Whether this error is a request-validation failure owed to the caller.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            ChatError::Disabled | ChatError::EmptyMessage | ChatError::MessageTooLong(_)
        )
    }
}

impl From<SousError> for ChatError {
    fn from(err: SousError) -> Self {
        ChatError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::UpstreamTimeout(err.to_string())
        } else {
            ChatError::UpstreamHttp {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}
