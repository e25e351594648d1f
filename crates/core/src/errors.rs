use thiserror::Error;

/// Error kinds shared across the garagebot crates. Each collaborator keeps
/// its own finer-grained errors and converts into these at the seams.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GarageError {
    /// Malformed addressing options or a missing required sigil.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A name that stayed unresolved after exhausting every directory page.
    #[error("not found: {0}")]
    NotFound(String),
    /// A hardware IPC response that never arrived within the fixed window.
    #[error("timed out after {waited_ms}ms waiting for {operation}")]
    Timeout { operation: String, waited_ms: u64 },
    /// Upstream collaborator failure (Slack Web API, classifier, pipe I/O).
    #[error("integration failure: {0}")]
    Integration(String),
}

impl GarageError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn integration(message: impl Into<String>) -> Self {
        Self::Integration(message.into())
    }

    /// A reply the bot can always fall back to. Chat users should never get
    /// silence on an internal failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "I couldn't make sense of that request.",
            Self::NotFound(_) => "I couldn't find who or what you're referring to.",
            Self::Timeout { .. } | Self::Integration(_) => {
                "Something went wrong on my end. Please try again in a moment."
            }
        }
    }
}
