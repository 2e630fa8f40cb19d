//! Failure taxonomy for weather backend calls.
//!
//! Transport errors never escape the client: every failure is classified
//! into a [`FetchError`] from the HTTP status or the reqwest error kind.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Location not found: {0}")]
    NotFound(String),

    #[error("Rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("Weather service rejected credentials")]
    AuthFailure,

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

/// Fieldless discriminant of [`FetchError`], handy for matching and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    Timeout,
    NotFound,
    RateLimited,
    AuthFailure,
    NetworkUnavailable,
    MalformedResponse,
    Unknown,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Timeout => FetchErrorKind::Timeout,
            Self::NotFound(_) => FetchErrorKind::NotFound,
            Self::RateLimited { .. } => FetchErrorKind::RateLimited,
            Self::AuthFailure => FetchErrorKind::AuthFailure,
            Self::NetworkUnavailable(_) => FetchErrorKind::NetworkUnavailable,
            Self::MalformedResponse(_) => FetchErrorKind::MalformedResponse,
            Self::Unknown(_) => FetchErrorKind::Unknown,
        }
    }

    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout => "Request timed out. Please check your internet connection.",
            Self::NotFound(_) => "Location not found. Please check the spelling and try again.",
            Self::RateLimited { .. } => "Too many requests. Please wait a moment and try again.",
            Self::AuthFailure => "Weather service authentication failed. Please try again later.",
            Self::NetworkUnavailable(_) => "Network error. Please check your internet connection.",
            Self::MalformedResponse(_) => {
                "Received an unexpected response from the weather service."
            }
            Self::Unknown(_) => "Failed to fetch weather data. Please try again.",
        }
    }

    /// Whether re-issuing the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited { .. } | Self::NetworkUnavailable(_) | Self::Unknown(_)
        )
    }

    /// Classify a non-2xx status. `detail` is the backend's error body field.
    pub fn from_status(status: u16, retry_after: Option<u64>, detail: Option<String>) -> Self {
        let detail = detail.unwrap_or_default();
        match status {
            // The backend reports unknown cities from upstream as 400.
            400 | 404 => Self::NotFound(if detail.is_empty() {
                "City not found".to_string()
            } else {
                detail
            }),
            401 | 403 => Self::AuthFailure,
            408 | 504 => Self::Timeout,
            429 => Self::RateLimited { retry_after },
            _ => Self::Unknown(format!("HTTP {}: {}", status, detail)),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::NetworkUnavailable(err.to_string())
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), None, None)
        } else if err.is_request() || err.is_body() {
            Self::NetworkUnavailable(err.to_string())
        } else {
            Self::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for FetchError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}
