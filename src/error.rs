//! Error types for the Datadog provider.
//!
//! Every failure surfaces as a [`ProviderError`]. The lifecycle driver does not
//! match on individual variants; it asks for the [`ErrorKind`] instead, which
//! decides whether a failure means "the object is gone", "try again", or "stop
//! and tell the user".

use thiserror::Error;

use crate::schema::Diagnostic;

/// Coarse classification of a [`ProviderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote object does not exist (HTTP 404).
    Absent,
    /// Rate limiting, gateway failures, or an elapsed deadline.
    Transient,
    /// The configuration or request was rejected before or by the API.
    Validation,
    /// Credentials were refused, or the request conflicts with remote state.
    AuthOrConflict,
    /// Any other non-success response from the API.
    Remote,
    /// The request never produced a response (DNS, TLS, connection reset).
    Transport,
    /// A bug in the provider, or a response it could not make sense of.
    Internal,
}

/// Errors that can occur while reconciling Datadog resources.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested remote object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A single attribute failed validation.
    #[error("Invalid value for '{attribute}': {message}")]
    InvalidAttribute {
        /// Path of the offending attribute, e.g. `display[0].message`.
        attribute: String,
        /// What is wrong with the value.
        message: String,
    },

    /// The API rejected the request payload (400, 422 and similar).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An internal provider error occurred.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A JSON serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A YAML serialization/deserialization error occurred.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The HTTP request failed before a response arrived.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request conflicts with the current remote state (409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Permission denied (401/403).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Rate limit exceeded (429).
    #[error("Rate limited: {0}")]
    ResourceExhausted(String),

    /// Gateway failure (502/504).
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The operation deadline elapsed.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Any other non-success response.
    #[error("Remote error ({status}): {message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Message assembled from the response body.
        message: String,
    },

    /// Operation not implemented for this resource.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl ProviderError {
    /// Translate a non-success HTTP response into an error.
    ///
    /// `context` names the operation, e.g. `"error creating monitor"`. The
    /// body is searched for Datadog's `{"errors": [...]}` envelope; when it is
    /// absent the raw body text is used instead.
    pub fn from_response(status: u16, body: &[u8], context: &str) -> Self {
        let detail = error_detail(body);
        let message = if detail.is_empty() {
            format!("{context}: HTTP {status}")
        } else {
            format!("{context}: HTTP {status}: {detail}")
        };

        match status {
            404 => Self::NotFound(message),
            401 | 403 => Self::PermissionDenied(message),
            409 => Self::Conflict(message),
            429 => Self::ResourceExhausted(message),
            502 | 504 => Self::Unavailable(message),
            400..=499 => Self::InvalidRequest(message),
            _ => Self::Remote { status, message },
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::Absent,
            Self::ResourceExhausted(_) | Self::Unavailable(_) | Self::DeadlineExceeded(_) => {
                ErrorKind::Transient
            },
            Self::Validation(_)
            | Self::InvalidAttribute { .. }
            | Self::InvalidRequest(_)
            | Self::Configuration(_)
            | Self::UnknownResource(_) => ErrorKind::Validation,
            Self::PermissionDenied(_) | Self::Conflict(_) => ErrorKind::AuthOrConflict,
            Self::Remote { .. } => ErrorKind::Remote,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Internal(_)
            | Self::Serialization(_)
            | Self::Yaml(_)
            | Self::Unimplemented(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same request could succeed.
    ///
    /// An elapsed deadline is transient from the user's point of view but is
    /// never retried within the same operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DeadlineExceeded(_) => false,
            _ => matches!(self.kind(), ErrorKind::Transient | ErrorKind::Transport),
        }
    }

    /// Whether this error means the remote object is gone.
    pub fn is_absent(&self) -> bool {
        self.kind() == ErrorKind::Absent
    }

    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::InvalidRequest(msg)
            | Self::Internal(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::Transport(msg)
            | Self::Conflict(msg)
            | Self::PermissionDenied(msg)
            | Self::ResourceExhausted(msg)
            | Self::Unavailable(msg)
            | Self::DeadlineExceeded(msg)
            | Self::Unimplemented(msg) => msg,
            Self::InvalidAttribute { message, .. } | Self::Remote { message, .. } => message,
            Self::Serialization(_) => "serialization error (see Debug output)",
            Self::Yaml(_) => "yaml error (see Debug output)",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(format_err_chain(&err))
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        let diagnostic = Diagnostic::error(err.to_string());
        match err {
            ProviderError::InvalidAttribute { attribute, .. } => diagnostic.with_attribute(attribute),
            ProviderError::DeadlineExceeded(_) => diagnostic
                .with_detail("The operation did not finish before its deadline. Retrying the apply is safe."),
            _ => diagnostic,
        }
    }
}

/// Format an error and all of its sources as `outer: inner: root`.
pub fn format_err_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

fn error_detail(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return String::from_utf8_lossy(body).trim().to_string();
    };

    let Some(errors) = value.get("errors").and_then(|e| e.as_array()) else {
        return value.to_string();
    };

    errors
        .iter()
        .map(|e| match e {
            serde_json::Value::String(s) => s.clone(),
            // JSON:API error objects
            serde_json::Value::Object(obj) => {
                let title = obj.get("title").and_then(|t| t.as_str()).unwrap_or_default();
                let detail = obj.get("detail").and_then(|d| d.as_str()).unwrap_or_default();
                match (title.is_empty(), detail.is_empty()) {
                    (false, false) => format!("{title}: {detail}"),
                    (false, true) => title.to_string(),
                    (true, false) => detail.to_string(),
                    (true, true) => e.to_string(),
                }
            },
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
