//! Unified error handling for the track-analytics library.
//!
//! Errors here are contract violations: asking an empty track for its first
//! point, smoothing with zero samples, resampling to zero points. Noisy or
//! sparse data is never an error; the algorithms absorb it.

use thiserror::Error;

/// Unified error type for track operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    /// The operation needs at least one point
    #[error("Track '{name}' is empty")]
    EmptyTrack { name: String },

    /// A numeric argument is outside its valid domain
    #[error("Invalid value for '{parameter}': {message}")]
    InvalidParameter {
        parameter: &'static str,
        message: String,
    },

    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for track operations.
pub type Result<T> = std::result::Result<T, TrackError>;

impl TrackError {
    pub(crate) fn invalid(parameter: &'static str, message: impl Into<String>) -> Self {
        TrackError::InvalidParameter {
            parameter,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for TrackError {
    fn from(err: serde_json::Error) -> Self {
        TrackError::Config {
            message: err.to_string(),
        }
    }
}

/// Extension trait for converting Option to TrackError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an empty-track error.
    fn ok_or_empty(self, track_name: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_empty(self, track_name: &str) -> Result<T> {
        self.ok_or_else(|| TrackError::EmptyTrack {
            name: track_name.to_string(),
        })
    }
}
