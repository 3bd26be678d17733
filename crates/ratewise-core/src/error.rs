//! Error types shared by the ratewise crates.
//!
//! Only two classes ever leave a component: configuration errors, which are
//! fatal for a whole batch, and source errors, which are isolated to the
//! (tenant, endpoint) pair that produced them. Insufficient data and forecast
//! timeouts are absorbed inside the analyzer and never show up here.

use thiserror::Error;

/// Result type alias for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Invalid or unreadable configuration. Fails a run before any per-pair work.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("min_rate_limit ({min}) exceeds max_rate_limit ({max})")]
    InvalidBounds { min: u64, max: u64 },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A series that violates the ordering invariant.
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("timestamps must be strictly increasing (violated at index {index})")]
    NotIncreasing { index: usize },
}

/// A collaborator could not deliver data for one pair.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    #[error("{source_name} unavailable: {message}")]
    Unavailable {
        source_name: String,
        message: String,
    },

    #[error("malformed source data: {0}")]
    Malformed(String),
}

impl From<SeriesError> for SourceError {
    fn from(err: SeriesError) -> Self {
        SourceError::Malformed(err.to_string())
    }
}
