//! Error taxonomy for the auto-fit pipeline
//!
//! None of these errors is fatal. Each one is recovered where it is raised:
//! incomplete metadata by retrying, lookup failures by the fallback ratio,
//! bad ratios by the identity adjustment, and apply failures by logging.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutofitError {
    /// The host has not published a usable title yet
    #[error("playback metadata is incomplete")]
    MetadataIncomplete,

    /// The catalog could not be reached or answered with an error
    #[error("aspect-ratio catalog unavailable: {0}")]
    LookupUnavailable(String),

    /// The catalog answered but nothing usable matched
    #[error("no confident aspect-ratio match: {0}")]
    LookupNoMatch(String),

    #[error("ratio out of range (content {content}, screen {screen})")]
    InvalidRatioInput { content: f64, screen: f64 },

    /// The host rejected a zoom or pixel-ratio call
    #[error("failed to apply view mode: {0}")]
    ApplyFailed(String),
}

pub type AutofitResult<T> = std::result::Result<T, AutofitError>;
