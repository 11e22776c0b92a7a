use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Result with ImportError
pub type Result<T> = std::result::Result<T, ImportError>;

/// Error types for the .eml import pipeline
#[derive(Error, Debug)]
pub enum ImportError {
    /// Root path missing or not a directory
    #[error("Path not found or not a directory: {0}")]
    NotFound(PathBuf),

    /// A candidate file could not be opened or read
    #[error("Cannot read {path}: {source}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Header block could not be parsed
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Gmail rejected the message bytes
    #[error("Message rejected by Gmail: {0}")]
    InvalidMessage(String),

    /// Per-user or per-project quota exhausted
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Authentication or credential failure
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Label lookup or creation failed
    #[error("Label error: {0}")]
    LabelError(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Gmail API returned an error we have no better mapping for
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Run interrupted before this file reached Gmail
    #[error("Import cancelled before the message was sent")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error outside of per-file reads
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ImportError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ImportError::RateLimitExceeded { .. }
                | ImportError::QuotaExceeded(_)
                | ImportError::ServerError { .. }
                | ImportError::NetworkError(_)
        )
    }

    /// Errors that abort a run before any file is processed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ImportError::NotFound(_) | ImportError::AuthError(_) | ImportError::ConfigError(_)
        )
    }

    /// Server-requested delay before the next attempt, if any
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            ImportError::RateLimitExceeded { retry_after } => {
                Some(std::time::Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }
}

/// Reasons Gmail uses in JSON error bodies for quota and rate limiting
const QUOTA_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "quotaExceeded",
    "dailyLimitExceeded",
];

/// Parse the Retry-After header from an HTTP response
///
/// The Retry-After header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Returns the number of seconds to wait. If the header is missing or invalid,
/// returns a default of 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    let Some(value) = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
    else {
        return DEFAULT_RETRY_AFTER;
    };

    if let Ok(seconds) = value.parse::<u64>() {
        return seconds;
    }

    if let Ok(http_date) = httpdate::parse_http_date(value) {
        if let Ok(duration) = http_date.duration_since(std::time::SystemTime::now()) {
            return duration.as_secs();
        }
    }

    DEFAULT_RETRY_AFTER
}

/// Map a decoded Gmail JSON error body onto our taxonomy
///
/// Expected shape: `{"error": {"code": 403, "message": "...", "errors": [{"reason": "..."}]}}`
fn classify_error_body(body: &serde_json::Value) -> ImportError {
    let error = body.get("error").unwrap_or(body);
    let code = error.get("code").and_then(|c| c.as_u64()).unwrap_or(0) as u16;
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("no message")
        .to_string();

    let quota_hit = error
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|errors| {
            errors.iter().any(|e| {
                e.get("reason")
                    .and_then(|r| r.as_str())
                    .is_some_and(|r| QUOTA_REASONS.contains(&r))
            })
        })
        .unwrap_or(false);

    if quota_hit {
        return ImportError::QuotaExceeded(message);
    }

    match code {
        429 => ImportError::QuotaExceeded(message),
        400 => ImportError::BadRequest(message),
        401 => ImportError::AuthError(message),
        403 => ImportError::Forbidden(message),
        404 => ImportError::ApiError(format!("Resource not found: {}", message)),
        500..=599 => ImportError::ServerError {
            status: code,
            message,
        },
        _ => ImportError::ApiError(message),
    }
}

impl From<google_gmail1::Error> for ImportError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => ImportError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    400 => ImportError::BadRequest(message),
                    401 => ImportError::AuthError(message),
                    403 => ImportError::Forbidden(message),
                    404 => ImportError::ApiError(message),
                    500..=599 => ImportError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => ImportError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref body) => classify_error_body(body),
            google_gmail1::Error::MissingToken(ref err) => {
                ImportError::AuthError(format!("No access token: {}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                ImportError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => ImportError::NetworkError(err.to_string()),
            _ => ImportError::ApiError(error.to_string()),
        }
    }
}
