//! Crate-level error type and `Result` alias.
//! Carries the engine's failure taxonomy (geometry, alignment, configuration,
//! model mismatch, incomplete data) alongside wrapped I/O, GDAL and JSON errors,
//! so that batch drivers can tell continuable per-item failures from fatal ones.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Alignment error: {0}")]
    Alignment(String),

    #[error("Invalid configuration: {param}={value}")]
    Config { param: &'static str, value: String },

    #[error("Model expects {expected} bands, raster has {actual}")]
    ModelMismatch { expected: usize, actual: usize },

    #[error("Incomplete data: {what} missing from {location}")]
    IncompleteData { what: String, location: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Coarse classification of an [`Error`], used by batch drivers.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    Geometry,
    Alignment,
    Config,
    ModelMismatch,
    IncompleteData,
    Io,
    Other,
}

impl Error {
    pub fn geometry<S: Into<String>>(msg: S) -> Self {
        Error::Geometry(msg.into())
    }

    pub fn alignment<S: Into<String>>(msg: S) -> Self {
        Error::Alignment(msg.into())
    }

    pub fn config<V: std::fmt::Display>(param: &'static str, value: V) -> Self {
        Error::Config {
            param,
            value: value.to_string(),
        }
    }

    pub fn incomplete<W: Into<String>, L: std::fmt::Display>(what: W, location: L) -> Self {
        Error::IncompleteData {
            what: what.into(),
            location: location.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Geometry(_) => ErrorKind::Geometry,
            Error::Alignment(_) => ErrorKind::Alignment,
            Error::Config { .. } => ErrorKind::Config,
            Error::ModelMismatch { .. } => ErrorKind::ModelMismatch,
            Error::IncompleteData { .. } => ErrorKind::IncompleteData,
            Error::Io(_) | Error::Gdal(_) => ErrorKind::Io,
            Error::Json(_) | Error::Shape(_) | Error::Processing(_) => ErrorKind::Other,
        }
    }

    /// Whether a batch driver may log this failure and move on to the next item.
    /// Configuration errors apply to every item, so they are never continuable.
    pub fn is_continuable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Config)
    }
}
