//! I/O layer: GDAL-backed product reader, acquisition-time lookup from
//! product metadata, and `writers` for GeoTIFF outputs and JSON sidecars.
pub mod gdal;
pub use gdal::{GdalError, GdalMetadata, GdalProductReader};

pub mod metadata;
pub use metadata::AcquisitionTimes;

pub mod writers;
