//! Pixel geolocation and acquisition-time lookups.
use chrono::{DateTime, Utc};
use ndarray::Array2;

/// Geographic position, degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
}

/// Maps a pixel position (pixel centers at +0.5) to a geographic position.
pub trait GeoCoding: Sync {
    fn geo_pos(&self, x: f64, y: f64) -> Option<GeoPos>;
}

/// Geocoding of a raster in a geographic (lon/lat) CRS, from its affine
/// geotransform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineGeoCoding {
    pub geotransform: [f64; 6],
}

impl AffineGeoCoding {
    /// Apply the geotransform to a pixel position, in CRS units.
    pub fn map_xy(&self, x: f64, y: f64) -> (f64, f64) {
        let gt = &self.geotransform;
        (gt[0] + x * gt[1] + y * gt[2], gt[3] + x * gt[4] + y * gt[5])
    }
}

impl GeoCoding for AffineGeoCoding {
    fn geo_pos(&self, x: f64, y: f64) -> Option<GeoPos> {
        let (lon, lat) = self.map_xy(x, y);
        Some(GeoPos { lat, lon })
    }
}

/// Geocoding backed by per-pixel latitude/longitude grids, sampled at pixel
/// centers.
#[derive(Debug, Clone)]
pub struct GridGeoCoding {
    pub lat: Array2<f64>,
    pub lon: Array2<f64>,
}

impl GeoCoding for GridGeoCoding {
    fn geo_pos(&self, x: f64, y: f64) -> Option<GeoPos> {
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let (row, col) = (y.floor() as usize, x.floor() as usize);
        let lat = *self.lat.get((row, col))?;
        let lon = *self.lon.get((row, col))?;
        Some(GeoPos { lat, lon })
    }
}

/// Geocoding of a loaded product.
#[derive(Debug, Clone)]
pub enum SceneGeoCoding {
    Affine(AffineGeoCoding),
    Grid(GridGeoCoding),
}

impl GeoCoding for SceneGeoCoding {
    fn geo_pos(&self, x: f64, y: f64) -> Option<GeoPos> {
        match self {
            SceneGeoCoding::Affine(gc) => gc.geo_pos(x, y),
            SceneGeoCoding::Grid(gc) => gc.geo_pos(x, y),
        }
    }
}

/// Unix time of 2000-01-01T00:00:00Z, milliseconds.
const MJD2000_EPOCH_MILLIS: i64 = 946_684_800_000;

/// Days (fractional) since 2000-01-01T00:00:00Z.
pub fn to_mjd2000(t: DateTime<Utc>) -> f64 {
    (t.timestamp_millis() - MJD2000_EPOCH_MILLIS) as f64 / 86_400_000.0
}

/// Maps a pixel position (pixel centers at +0.5) to an acquisition time.
pub trait TimeCoding: Sync {
    /// Time as days since 2000-01-01, NaN when unknown.
    fn mjd(&self, x: f64, y: f64) -> f64;
}

/// Acquisition time interpolated linearly along image lines between the
/// product start and stop times: the center of the first line maps to the
/// start time, the center of the last line to the stop time. Unknown times
/// yield NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineTimeCoding {
    start: Option<f64>,
    stop: Option<f64>,
    lines: usize,
}

impl LineTimeCoding {
    pub fn new(start: Option<DateTime<Utc>>, stop: Option<DateTime<Utc>>, lines: usize) -> Self {
        Self {
            start: start.map(to_mjd2000),
            stop: stop.map(to_mjd2000),
            lines,
        }
    }
}

impl TimeCoding for LineTimeCoding {
    fn mjd(&self, _x: f64, y: f64) -> f64 {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) if self.lines > 1 => {
                let frac = ((y - 0.5) / (self.lines - 1) as f64).clamp(0.0, 1.0);
                start + (stop - start) * frac
            }
            (Some(start), _) => start,
            (None, Some(stop)) => stop,
            (None, None) => f64::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use ndarray::array;

    #[test]
    fn affine_maps_pixel_centers() {
        let gc = AffineGeoCoding {
            geotransform: [10.0, 0.01, 0.0, 55.0, 0.0, -0.01],
        };
        let pos = gc.geo_pos(0.5, 0.5).unwrap();
        assert_relative_eq!(pos.lon, 10.005, epsilon = 1e-12);
        assert_relative_eq!(pos.lat, 54.995, epsilon = 1e-12);
    }

    #[test]
    fn grid_lookup_and_bounds() {
        let gc = GridGeoCoding {
            lat: array![[50.0, 50.0], [49.0, 49.0]],
            lon: array![[7.0, 8.0], [7.0, 8.0]],
        };
        assert_eq!(gc.geo_pos(1.5, 1.5), Some(GeoPos { lat: 49.0, lon: 8.0 }));
        assert_eq!(gc.geo_pos(2.5, 0.5), None);
        assert_eq!(gc.geo_pos(-0.5, 0.5), None);
    }

    #[test]
    fn mjd2000_of_known_dates() {
        let t = Utc.with_ymd_and_hms(2000, 1, 2, 12, 0, 0).unwrap();
        assert_relative_eq!(to_mjd2000(t), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn line_time_interpolates() {
        let start = Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 0).unwrap();
        let stop = Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 10).unwrap();
        let tc = LineTimeCoding::new(Some(start), Some(stop), 11);
        assert_relative_eq!(tc.mjd(0.5, 0.5), to_mjd2000(start), epsilon = 1e-12);
        assert_relative_eq!(tc.mjd(0.5, 10.5), to_mjd2000(stop), epsilon = 1e-12);
        let mid = Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 5).unwrap();
        assert_relative_eq!(tc.mjd(3.5, 5.5), to_mjd2000(mid), epsilon = 1e-9);
        let nine = Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 9).unwrap();
        assert_relative_eq!(tc.mjd(0.5, 9.5), to_mjd2000(nine), epsilon = 1e-9);
        assert!(LineTimeCoding::new(None, None, 11).mjd(0.5, 0.5).is_nan());
    }

    #[test]
    fn two_line_scene_spans_start_to_stop() {
        let start = Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 0).unwrap();
        let stop = Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 2).unwrap();
        let tc = LineTimeCoding::new(Some(start), Some(stop), 2);
        assert_relative_eq!(tc.mjd(0.5, 0.5), to_mjd2000(start), epsilon = 1e-12);
        assert_relative_eq!(tc.mjd(0.5, 1.5), to_mjd2000(stop), epsilon = 1e-12);
        let single = LineTimeCoding::new(Some(start), Some(stop), 1);
        assert_eq!(single.mjd(0.5, 0.5), to_mjd2000(start));
    }
}
