use thiserror::Error;

/// Top-level error type for Belt.
#[derive(Debug, Error)]
pub enum BeltError {
    /// Error from an AI provider.
    #[error("provider error: {0}")]
    Provider(String),

    /// Error from a messaging channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Memory/storage error.
    #[error("memory error: {0}")]
    Memory(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Provider error codes that are worth another initiation attempt.
pub const RETRYABLE_PROVIDER_CODES: &[&str] = &[
    "twilio-failed-to-connect-call",
    "vonage-failed-to-connect-call",
    "assistant-join-timed-out",
    "phone-call-provider-closed-websocket",
    "unknown-error",
];

/// HTTP statuses that are worth another initiation attempt.
pub const RETRYABLE_HTTP_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Failure reported by an executor contract (voice, messaging, calendar, browser).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    /// The provider answered but rejected the request.
    #[error("{message}")]
    Provider {
        /// Provider-specific error code (e.g. an ended-reason slug).
        code: Option<String>,
        /// HTTP status, when the provider speaks HTTP.
        status: Option<u16>,
        message: String,
    },

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The provider could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The request itself is invalid (bad number, empty body, ...).
    #[error("invalid request: {0}")]
    Validation(String),

    /// The executor lacks required configuration (credentials, outbound number, ...).
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl ExecutorError {
    /// Whether a fresh attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::Provider { code, status, .. } => {
                code.as_deref()
                    .is_some_and(|c| RETRYABLE_PROVIDER_CODES.contains(&c))
                    || status.is_some_and(|s| RETRYABLE_HTTP_STATUSES.contains(&s))
            }
            Self::Validation(_) | Self::NotConfigured(_) => false,
        }
    }

    /// A user-facing remediation hint, where one is known.
    pub fn remediation_hint(&self) -> Option<&'static str> {
        match self {
            Self::NotConfigured(_) => {
                Some("Deze dienst is nog niet ingesteld. Vraag de beheerder om de koppeling te configureren.")
            }
            Self::Validation(_) => {
                Some("Controleer de gegevens, bijvoorbeeld een telefoonnummer als +31612345678.")
            }
            Self::Timeout | Self::Connection(_) => Some("De dienst is even niet bereikbaar. Probeer het later opnieuw."),
            Self::Provider { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(code: Option<&str>, status: Option<u16>) -> ExecutorError {
        ExecutorError::Provider {
            code: code.map(String::from),
            status,
            message: "rejected".into(),
        }
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        assert!(ExecutorError::Timeout.is_retryable());
        assert!(ExecutorError::Connection("reset".into()).is_retryable());
    }

    #[test]
    fn test_provider_code_allowlist() {
        assert!(provider(Some("twilio-failed-to-connect-call"), None).is_retryable());
        assert!(provider(Some("unknown-error"), Some(400)).is_retryable());
        assert!(!provider(Some("customer-busy"), None).is_retryable());
        assert!(!provider(None, None).is_retryable());
    }

    #[test]
    fn test_provider_status_allowlist() {
        assert!(provider(None, Some(429)).is_retryable());
        assert!(provider(None, Some(503)).is_retryable());
        assert!(!provider(None, Some(400)).is_retryable());
        assert!(!provider(None, Some(401)).is_retryable());
    }

    #[test]
    fn test_terminal_errors_never_retry() {
        assert!(!ExecutorError::Validation("bad number".into()).is_retryable());
        assert!(!ExecutorError::NotConfigured("no outbound number".into()).is_retryable());
        assert!(ExecutorError::NotConfigured("x".into())
            .remediation_hint()
            .is_some());
    }
}
