use nimbus_weather::FetchError;
use thiserror::Error;

/// Why a load did not produce a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Current weather could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A later request for another location became the target first.
    #[error("Superseded by a newer request")]
    Superseded,

    #[error("Empty search query")]
    EmptyQuery,
}

impl LoadError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.user_message(),
            Self::Superseded => "A newer request replaced this one.",
            Self::EmptyQuery => "Please enter a city name",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_retryable(),
            Self::Superseded | Self::EmptyQuery => false,
        }
    }

    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            Self::Fetch(e) => Some(e),
            _ => None,
        }
    }
}
