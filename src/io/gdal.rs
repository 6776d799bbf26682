use gdal::raster::ResampleAlg;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::{Dataset, Metadata, errors::GdalError as GdalCrateError};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::engine::SceneInputs;
use crate::core::geocoding::{AffineGeoCoding, GridGeoCoding, SceneGeoCoding};
use crate::error::{Error, Result};
use crate::io::metadata::{AcquisitionTimes, acquisition_times};

/// Geometry rasters every product must carry, in `SceneInputs` order.
pub const SUN_ZENITH: &str = "sun_zenith";
pub const SUN_AZIMUTH: &str = "sun_azimuth";
pub const VIEW_ZENITH: &str = "view_zenith_mean";
pub const VIEW_AZIMUTH: &str = "view_azimuth_mean";

const WGS84_PROJ4: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Errors encountered when using GDAL reader
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
}

impl From<GdalCrateError> for Error {
    fn from(e: GdalCrateError) -> Self {
        Error::Gdal(GdalError::Gdal(e))
    }
}

/// Metadata extracted from a GDAL-supported dataset
#[derive(Debug, Clone)]
pub struct GdalMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    /// Affine geotransform coefficients, absent for non-georeferenced rasters
    pub geotransform: Option<[f64; 6]>,
    /// Projection in WKT format, or `EPSG:<code>` when an authority is found
    pub projection: String,
    /// Band descriptions, indexed by band number - 1
    pub band_names: Vec<String>,
    /// Additional metadata key-value pairs
    pub metadata: HashMap<String, String>,
}

/// Reader for multi-band optical products via GDAL. Bands are addressed by
/// their description, which carries the band name.
pub struct GdalProductReader {
    pub path: PathBuf,
    pub dataset: Dataset,
    pub metadata: GdalMetadata,
}

// Helper to extract EPSG code from WKT authority tag
fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            let code = &wkt[start..start + end];
            return Some(format!("EPSG:{}", code));
        }
    }
    None
}

impl GdalProductReader {
    /// Open a GDAL-supported dataset (e.g., GeoTIFF, NetCDF, ENVI, VRT)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dataset = Dataset::open(&path)?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        if bands == 0 {
            return Err(GdalError::UnsupportedFormat("No raster bands found".into()).into());
        }
        let geotransform = dataset.geo_transform().ok();
        let proj = dataset.projection();
        let projection = if proj.starts_with("EPSG:") {
            proj
        } else if let Some(code) = parse_epsg(&proj) {
            code
        } else {
            proj
        };

        let mut band_names = Vec::with_capacity(bands);
        for idx in 1..=bands {
            let band = dataset.rasterband(idx)?;
            let name = match band.description() {
                Ok(d) if !d.is_empty() => d,
                _ => format!("band_{}", idx),
            };
            band_names.push(name);
        }

        // Collect metadata entries (domain "")
        let mut metadata_map = HashMap::new();
        if let Some(entries) = dataset.metadata_domain("") {
            for entry in entries {
                if let Some((key, val)) = entry.split_once('=') {
                    metadata_map.insert(key.to_string(), val.to_string());
                }
            }
        }
        debug!("Opened {:?}: {}x{}, bands {:?}", path, size_x, size_y, band_names);
        Ok(GdalProductReader {
            path,
            dataset,
            metadata: GdalMetadata {
                size_x,
                size_y,
                bands,
                geotransform,
                projection,
                band_names,
                metadata: metadata_map,
            },
        })
    }

    /// 1-based index of the band with the given description.
    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.metadata
            .band_names
            .iter()
            .position(|n| n == name)
            .map(|i| i + 1)
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.band_index(name).is_some()
    }

    /// Read a single band (1-based index) as an f64 ndarray of shape (height, width)
    pub fn read_band(
        &self,
        index: usize,
        e_resample_alg: Option<ResampleAlg>,
    ) -> Result<Array2<f64>> {
        if index == 0 || index > self.metadata.bands {
            return Err(GdalError::UnsupportedFormat(format!(
                "Band index {} out of range",
                index
            ))
            .into());
        }
        let band = self.dataset.rasterband(index)?;
        let window = (self.metadata.size_x, self.metadata.size_y);
        let buf = band.read_as::<f64>((0, 0), window, window, e_resample_alg)?;
        let data_vec = buf.data().to_vec();
        let len = data_vec.len();
        let array = Array2::from_shape_vec((self.metadata.size_y, self.metadata.size_x), data_vec)
            .map_err(|_| {
                GdalError::DimensionMismatch(
                    self.metadata.size_x,
                    self.metadata.size_y,
                    len,
                    1,
                )
            })?;
        Ok(array)
    }

    /// Read a spectral band by name.
    pub fn read_named(&self, name: &str) -> Result<Array2<f64>> {
        let index = self.band_index(name).ok_or_else(|| Error::MissingBand {
            name: name.to_string(),
        })?;
        self.read_band(index, None)
    }

    /// Read an auxiliary raster (geometry, mask) by name.
    fn read_raster(&self, name: &str) -> Result<Array2<f64>> {
        let index = self.band_index(name).ok_or_else(|| Error::MissingRaster {
            name: name.to_string(),
        })?;
        self.read_band(index, None)
    }

    /// Check that every band the retrieval needs is present, without
    /// reading pixel data.
    pub fn check_bands(&self, source_bands: &[String], valid_pixel_band: Option<&str>) -> Result<()> {
        for name in source_bands {
            if !self.has_band(name) {
                return Err(Error::MissingBand { name: name.clone() });
            }
        }
        for name in [SUN_ZENITH, SUN_AZIMUTH, VIEW_ZENITH, VIEW_AZIMUTH]
            .into_iter()
            .chain(valid_pixel_band)
        {
            if !self.has_band(name) {
                return Err(Error::MissingRaster {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Load the reflectance, geometry and mask rasters of a scene.
    pub fn scene_inputs(
        &self,
        source_bands: &[String],
        valid_pixel_band: Option<&str>,
    ) -> Result<SceneInputs> {
        self.check_bands(source_bands, valid_pixel_band)?;
        let reflectances = source_bands
            .iter()
            .map(|name| self.read_named(name))
            .collect::<Result<Vec<_>>>()?;
        let valid = match valid_pixel_band {
            Some(name) => Some(self.read_raster(name)?.mapv(|v| v != 0.0 && !v.is_nan())),
            None => None,
        };
        info!(
            "Loaded {} reflectance bands of {:?}",
            reflectances.len(),
            self.path
        );
        Ok(SceneInputs {
            reflectances,
            sun_zenith: self.read_raster(SUN_ZENITH)?,
            sun_azimuth: self.read_raster(SUN_AZIMUTH)?,
            view_zenith: self.read_raster(VIEW_ZENITH)?,
            view_azimuth: self.read_raster(VIEW_AZIMUTH)?,
            valid,
        })
    }

    /// Pixel geolocation of the product. Rasters in a geographic CRS use
    /// their geotransform directly; projected rasters get per-pixel lat/lon
    /// grids transformed to WGS84.
    pub fn geocoding(&self) -> Result<SceneGeoCoding> {
        let gt = match self.metadata.geotransform {
            Some(gt) if !self.metadata.projection.is_empty() => gt,
            _ => return Err(Error::NotGeocoded),
        };
        let src = self.dataset.spatial_ref().map_err(|_| Error::NotGeocoded)?;
        if src.is_geographic() {
            debug!("Geographic CRS, using affine geocoding");
            return Ok(SceneGeoCoding::Affine(AffineGeoCoding { geotransform: gt }));
        }

        let dst = SpatialRef::from_proj4(WGS84_PROJ4)?;
        let transform = CoordTransform::new(&src, &dst)?;
        let (cols, rows) = (self.metadata.size_x, self.metadata.size_y);
        let affine = AffineGeoCoding { geotransform: gt };
        let mut xs = Vec::with_capacity(cols * rows);
        let mut ys = Vec::with_capacity(cols * rows);
        for row in 0..rows {
            for col in 0..cols {
                let (x, y) = affine.map_xy(col as f64 + 0.5, row as f64 + 0.5);
                xs.push(x);
                ys.push(y);
            }
        }
        let mut zs = vec![0.0; xs.len()];
        transform.transform_coords(&mut xs, &mut ys, &mut zs)?;
        debug!("Projected CRS {}, built {}x{} lat/lon grids", self.metadata.projection, cols, rows);
        let lon = Array2::from_shape_vec((rows, cols), xs)
            .map_err(|e| Error::Processing(e.to_string()))?;
        let lat = Array2::from_shape_vec((rows, cols), ys)
            .map_err(|e| Error::Processing(e.to_string()))?;
        Ok(SceneGeoCoding::Grid(GridGeoCoding { lat, lon }))
    }

    /// Start/stop times from the dataset metadata or accompanying XML.
    pub fn acquisition_times(&self) -> AcquisitionTimes {
        let times = acquisition_times(&self.path, &self.metadata.metadata);
        if !times.is_complete() {
            warn!("Acquisition times of {:?} are incomplete: {:?}", self.path, times);
        }
        times
    }
}
