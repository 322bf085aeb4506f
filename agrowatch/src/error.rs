//! Error taxonomy for the query stack.
//!
//! Every failure that can reach a caller is one [`QueryError`] variant. The
//! variant is chosen once, where a raw HTTP or transport result is first
//! classified (see [`crate::fetch::classify`]); everything downstream matches
//! on the tag and never re-inspects response text.
//!
//! # Retry classes
//!
//! | Variant | Retried by the fetch core |
//! |---------|---------------------------|
//! | `NoData` | never |
//! | `Api` 400 / other 4xx | never |
//! | `Api` 429, `Api` ≥ 500 | yes, up to the policy bound |
//! | `Timeout`, `Network` | yes, up to the policy bound |
//! | `Cancelled`, `Validation`, `InvalidResponse` | never |

use std::fmt;

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors produced while building, sending or decoding a query.
///
/// `Clone` so that every caller attached to a deduplicated request receives
/// the same settled error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Upstream has no satellite or computed data for the request.
    #[error("{message}")]
    NoData { message: String },

    /// Upstream rejected or failed the request.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// No response arrived within the attempt timeout.
    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    /// Transport failure before any response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// The request was cancelled or superseded by a newer one.
    #[error("Request cancelled")]
    Cancelled,

    /// Malformed input caught before any network call.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A 2xx response that does not match the expected schema.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl QueryError {
    /// Create an API error for the given status.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        QueryError::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a no-data error.
    pub fn no_data(message: impl Into<String>) -> Self {
        QueryError::NoData {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::Validation(message.into())
    }

    /// Whether the fetch core may retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueryError::Api { status, .. } => *status == 429 || *status >= 500,
            QueryError::Timeout { .. } | QueryError::Network(_) => true,
            QueryError::NoData { .. }
            | QueryError::Cancelled
            | QueryError::Validation(_)
            | QueryError::InvalidResponse(_) => false,
        }
    }

    /// Whether this error must never trigger an automatic retry.
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }

    /// Server-side failure severe enough to halt animation playback.
    pub fn is_server_fatal(&self) -> bool {
        matches!(self, QueryError::Api { status, .. } if *status >= 500)
    }

    /// Whether this is the soft "nothing to show" outcome.
    pub fn is_no_data(&self) -> bool {
        matches!(self, QueryError::NoData { .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            QueryError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message to show the user, or `None` when the error should stay silent.
    ///
    /// Cancellation is silent: a superseded request has a newer one behind it.
    pub fn user_message(&self) -> Option<UserMessage> {
        let message = match self {
            QueryError::NoData { message } => return Some(UserMessage::Empty(message.clone())),
            QueryError::Cancelled => return None,
            QueryError::Api { status: 429, .. } => {
                "The service is busy right now. Please wait a moment and try again.".to_string()
            }
            QueryError::Api { status, .. } if *status >= 500 => format!(
                "The server could not complete the request (HTTP {}). Please try again.",
                status
            ),
            QueryError::Api { status, message } => {
                if message.is_empty() {
                    format!("The request was rejected (HTTP {}).", status)
                } else {
                    message.clone()
                }
            }
            QueryError::Timeout { .. } => {
                "The request took too long to complete. Please try again.".to_string()
            }
            QueryError::Network(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            QueryError::Validation(message) => message.clone(),
            QueryError::InvalidResponse(_) => {
                "The server returned an unexpected response. Please try again.".to_string()
            }
        };
        Some(UserMessage::Failure(message))
    }
}

/// What the presentation layer should show for a failed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMessage {
    /// Soft empty state: the query worked but there is nothing to show.
    Empty(String),
    /// Dismissible error banner with actionable text.
    Failure(String),
}

impl UserMessage {
    /// The message text.
    pub fn text(&self) -> &str {
        match self {
            UserMessage::Empty(text) | UserMessage::Failure(text) => text,
        }
    }

    /// Whether this message is an empty state rather than an error.
    pub fn is_empty_state(&self) -> bool {
        matches!(self, UserMessage::Empty(_))
    }
}

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}
