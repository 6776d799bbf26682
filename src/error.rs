//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O and GDAL errors, and provides the configuration variants
//! that abort a run before any pixel is processed.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("The channel set is empty, at least one source reflectance band is required")]
    EmptyChannelSet,

    #[error("Channel '{name}' is listed more than once in the source bands")]
    DuplicateChannel { name: String },

    #[error("Invalid source product, band '{name}' required")]
    MissingBand { name: String },

    #[error("Invalid source product, raster '{name}' required")]
    MissingRaster { name: String },

    #[error("Unknown set '{name}' of neural nets specified")]
    UnknownModelSet { name: String },

    #[error("The source product must be geo-coded")]
    NotGeocoded,

    #[error("{name}={value} is outside of the valid interval ({min}, {max})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Model files error: {0}")]
    ModelFiles(String),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Processing error: {0}")]
    Processing(String),
}

impl Error {
    /// True for errors detected while validating inputs and parameters,
    /// i.e. before any pixel is computed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::EmptyChannelSet
                | Error::DuplicateChannel { .. }
                | Error::MissingBand { .. }
                | Error::MissingRaster { .. }
                | Error::UnknownModelSet { .. }
                | Error::NotGeocoded
                | Error::OutOfRange { .. }
                | Error::ModelFiles(_)
                | Error::InvalidArgument { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_told_apart() {
        assert!(Error::NotGeocoded.is_configuration());
        assert!(Error::MissingBand { name: "B2".into() }.is_configuration());
        assert!(!Error::Processing("tile failed".into()).is_configuration());
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!io.is_configuration());
    }
}
