//! Error types for cellfetch.
//!
//! `CellFetchError` is the crate-wide error used by fallible constructors and
//! by the transport and cache layers. `ImageError` is the taxonomy reported
//! through the fetch outcome channel; it never crosses the concurrency
//! boundary as a panic or a thrown error.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Main error type for the cellfetch library.
#[derive(Debug, Error)]
pub enum CellFetchError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Fetch cancelled")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for cellfetch operations.
pub type Result<T> = std::result::Result<T, CellFetchError>;

impl From<std::io::Error> for CellFetchError {
    fn from(err: std::io::Error) -> Self {
        CellFetchError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CellFetchError {
    fn from(err: serde_json::Error) -> Self {
        CellFetchError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for CellFetchError {
    fn from(err: rusqlite::Error) -> Self {
        CellFetchError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for CellFetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CellFetchError::Timeout(std::time::Duration::from_secs(0))
        } else {
            CellFetchError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl From<url::ParseError> for CellFetchError {
    fn from(err: url::ParseError) -> Self {
        CellFetchError::InvalidUrl {
            url: String::new(),
            message: err.to_string(),
        }
    }
}

impl CellFetchError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CellFetchError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether the error came from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CellFetchError::Network { .. }
                | CellFetchError::Timeout(_)
                | CellFetchError::HttpStatus { .. }
        )
    }
}

/// Failure to convert a payload into an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({url})")]
pub struct ConversionError {
    /// URL of the resource whose payload failed to decode.
    pub url: String,
    /// Human readable description, including the decoder's reason.
    pub message: String,
}

impl ConversionError {
    /// Build a conversion error for a cached or freshly downloaded payload.
    pub fn new(url: impl Into<String>, cached: bool, reason: impl std::fmt::Display) -> Self {
        let what = if cached {
            "Failed to convert cached payload to an image"
        } else {
            "Failed to convert downloaded payload to an image"
        };
        Self {
            url: url.into(),
            message: format!("{}: {}", what, reason),
        }
    }
}

/// Failure reported through the fetch outcome channel.
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    /// Transport or HTTP failure.
    #[error("Failed to fetch image: {0}")]
    Generic(Arc<CellFetchError>),

    /// Cached payload could not be decoded; the entry has been evicted.
    #[error("Cached data conversion failed: {0}")]
    CachedDataConversion(ConversionError),

    /// Downloaded payload could not be decoded; it was not cached.
    #[error("Downloaded data conversion failed: {0}")]
    DownloadDataConversion(ConversionError),
}

/// Coarse classification of an [`ImageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageErrorKind {
    TransportFailure,
    CacheCorruption,
    DownloadCorruption,
}

impl ImageError {
    pub fn kind(&self) -> ImageErrorKind {
        match self {
            ImageError::Generic(_) => ImageErrorKind::TransportFailure,
            ImageError::CachedDataConversion(_) => ImageErrorKind::CacheCorruption,
            ImageError::DownloadDataConversion(_) => ImageErrorKind::DownloadCorruption,
        }
    }
}

impl From<CellFetchError> for ImageError {
    fn from(err: CellFetchError) -> Self {
        ImageError::Generic(Arc::new(err))
    }
}

impl std::fmt::Display for ImageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImageErrorKind::TransportFailure => "transport_failure",
            ImageErrorKind::CacheCorruption => "cache_corruption",
            ImageErrorKind::DownloadCorruption => "download_corruption",
        };
        f.write_str(name)
    }
}
