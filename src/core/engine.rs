//! Tiled compute engine: drives the pixel transform over a whole scene,
//! tiles of image lines in parallel.
use std::time::Instant;

use ndarray::{Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::geocoding::{GeoCoding, TimeCoding};
use crate::core::model::RetrievalModel;
use crate::core::pixel::{Geometry, PixelSample, PixelScratch, PixelTransform};
use crate::core::schema::OutputSchema;
use crate::core::virtual_bands::{Coefficients, VirtualBand};
use crate::error::{Error, Result};

/// Default number of image lines per tile.
pub const DEFAULT_TILE_LINES: usize = 610;

/// Source rasters of a scene, all of shape (lines, columns).
#[derive(Debug, Clone)]
pub struct SceneInputs {
    /// One reflectance raster per source channel, in channel order
    pub reflectances: Vec<Array2<f64>>,
    pub sun_zenith: Array2<f64>,
    pub sun_azimuth: Array2<f64>,
    pub view_zenith: Array2<f64>,
    pub view_azimuth: Array2<f64>,
    /// Valid-pixel mask; every pixel is valid when absent
    pub valid: Option<Array2<bool>>,
}

impl SceneInputs {
    /// (lines, columns)
    pub fn dim(&self) -> (usize, usize) {
        self.sun_zenith.dim()
    }

    /// All rasters must share one shape and match the channel count.
    pub fn check(&self, channel_count: usize) -> Result<()> {
        if self.reflectances.len() != channel_count {
            return Err(Error::Processing(format!(
                "expected {} reflectance rasters, got {}",
                channel_count,
                self.reflectances.len()
            )));
        }
        let dim = self.dim();
        let mismatched = self
            .reflectances
            .iter()
            .map(|a| a.dim())
            .chain([
                self.sun_azimuth.dim(),
                self.view_zenith.dim(),
                self.view_azimuth.dim(),
            ])
            .chain(self.valid.iter().map(|a| a.dim()))
            .any(|d| d != dim);
        if mismatched {
            return Err(Error::Processing(
                "source rasters differ in size, a single raster size is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Computed output rasters. Values are pixel-major, shape
/// (lines, columns, slots), stored as f32; unassigned slots and the flag
/// slot hold NaN. Flag words are kept apart at full u32 precision.
#[derive(Debug, Clone)]
pub struct OutputStack {
    pub schema: OutputSchema,
    pub data: Array3<f32>,
    pub flags: Array2<u32>,
}

impl OutputStack {
    /// (lines, columns)
    pub fn dim(&self) -> (usize, usize) {
        self.flags.dim()
    }

    pub fn slot(&self, slot: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(2), slot)
    }

    pub fn band(&self, name: &str) -> Option<ArrayView2<'_, f32>> {
        self.schema.index_of(name).map(|slot| self.slot(slot))
    }

    pub fn flags(&self) -> ArrayView2<'_, u32> {
        self.flags.view()
    }

    /// Evaluate a virtual band over the whole scene; `None` when the band is
    /// not available for this schema.
    pub fn virtual_band(&self, band: VirtualBand, coefficients: &Coefficients) -> Option<Array2<f64>> {
        if !band.is_available(&self.schema) {
            return None;
        }
        let width = self.schema.width();
        let mut out = Array2::<f64>::zeros(self.dim());
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(self.data.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut out_line, line)| {
                let mut row = vec![f64::NAN; width];
                for (o, lane) in out_line.iter_mut().zip(line.outer_iter()) {
                    for (r, &v) in row.iter_mut().zip(lane.iter()) {
                        *r = v as f64;
                    }
                    *o = band
                        .evaluate(&row, &self.schema, coefficients)
                        .unwrap_or(f64::NAN);
                }
            });
        Some(out)
    }
}

/// Run the pixel transform over every pixel of the scene. Tiles of
/// `tile_lines` lines are processed in parallel; pixels never share state.
pub fn process_scene<M, G, T>(
    inputs: &SceneInputs,
    transform: &PixelTransform,
    model: &M,
    geocoding: &G,
    timecoding: &T,
    tile_lines: usize,
) -> Result<OutputStack>
where
    M: RetrievalModel + ?Sized,
    G: GeoCoding + ?Sized,
    T: TimeCoding + ?Sized,
{
    let schema = transform.schema();
    inputs.check(schema.channel_count())?;
    if tile_lines == 0 {
        return Err(Error::InvalidArgument {
            arg: "tile_lines",
            value: "0".to_string(),
        });
    }

    let (lines, cols) = inputs.dim();
    let width = schema.width();
    let channels = schema.channel_count();
    info!(
        "Processing {}x{} pixels, {} channels, {} output slots",
        cols, lines, channels, width
    );
    let started = Instant::now();

    let mut values = vec![f32::NAN; lines * cols * width];
    let mut flag_words = vec![0u32; lines * cols];
    let tile_pixels = (tile_lines * cols).max(1);

    values
        .par_chunks_mut(tile_pixels * width)
        .zip(flag_words.par_chunks_mut(tile_pixels))
        .enumerate()
        .for_each(|(tile, (chunk, words))| {
            let first_line = tile * tile_lines;
            debug!("Tile {} starting at line {}", tile, first_line);
            let mut refl = vec![0.0; channels];
            let mut row = vec![f64::NAN; width];
            let mut scratch = PixelScratch::with_channels(channels);
            for (i, (out, word)) in chunk.chunks_mut(width).zip(words.iter_mut()).enumerate() {
                let y = first_line + i / cols;
                let x = i % cols;
                for (c, band) in inputs.reflectances.iter().enumerate() {
                    refl[c] = band[[y, x]];
                }
                let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
                let (lat, lon) = match geocoding.geo_pos(px, py) {
                    Some(pos) => (pos.lat, pos.lon),
                    None => (f64::NAN, f64::NAN),
                };
                let sample = PixelSample {
                    x,
                    y,
                    geometry: Geometry {
                        lat,
                        lon,
                        sun_zenith: inputs.sun_zenith[[y, x]],
                        sun_azimuth: inputs.sun_azimuth[[y, x]],
                        view_zenith: inputs.view_zenith[[y, x]],
                        view_azimuth: inputs.view_azimuth[[y, x]],
                    },
                    reflectances: &refl,
                    valid: inputs.valid.as_ref().map_or(true, |v| v[[y, x]]),
                    mjd: timecoding.mjd(px, py),
                };
                row.fill(f64::NAN);
                *word = transform
                    .compute_with(&sample, model, &mut row, &mut scratch)
                    .bits();
                row[schema.flag_slot()] = f64::NAN;
                for (o, &v) in out.iter_mut().zip(&row) {
                    *o = v as f32;
                }
            }
        });

    let data = Array3::from_shape_vec((lines, cols, width), values)
        .map_err(|e| Error::Processing(e.to_string()))?;
    let flags = Array2::from_shape_vec((lines, cols), flag_words)
        .map_err(|e| Error::Processing(e.to_string()))?;
    info!(
        "Processed {} pixels in {:.2?}",
        lines * cols,
        started.elapsed()
    );
    Ok(OutputStack {
        schema: schema.clone(),
        data,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flags::{INPUT_INVALID, VALID_PE};
    use crate::core::geocoding::{AffineGeoCoding, LineTimeCoding};
    use crate::core::model::{ModelInput, RetrievalResult};
    use crate::core::schema::Iop;
    use crate::types::{FeatureToggles, ReflectanceUnit};

    /// Echoes the pixel position into the IOPs.
    struct PositionModel;

    impl RetrievalModel for PositionModel {
        fn process_pixel(&self, input: &ModelInput<'_>) -> RetrievalResult {
            let mut r = RetrievalResult::nan(input.log_reflectances.len());
            r.iops = [input.x as f64, input.y as f64, input.lat, input.lon, 1.0];
            r.flags = 0;
            r
        }
    }

    fn inputs(lines: usize, cols: usize) -> SceneInputs {
        let ones = Array2::from_elem((lines, cols), 0.01);
        SceneInputs {
            reflectances: vec![ones.clone(), ones.clone(), ones.clone()],
            sun_zenith: Array2::from_elem((lines, cols), 30.0),
            sun_azimuth: Array2::from_elem((lines, cols), 120.0),
            view_zenith: Array2::from_elem((lines, cols), 5.0),
            view_azimuth: Array2::from_elem((lines, cols), 100.0),
            valid: None,
        }
    }

    fn transform() -> PixelTransform {
        let schema = OutputSchema::resolve(3, &FeatureToggles::minimal()).unwrap();
        PixelTransform::new(schema, ReflectanceUnit::Rhow, vec![0.0; 3]).unwrap()
    }

    #[test]
    fn every_pixel_lands_in_its_own_lane() {
        let inputs = inputs(7, 5);
        let gc = AffineGeoCoding {
            geotransform: [0.0, 1.0, 0.0, 0.0, 0.0, -1.0],
        };
        let tc = LineTimeCoding::new(None, None, 7);
        let t = transform();
        let out = process_scene(&inputs, &t, &PositionModel, &gc, &tc, 3).unwrap();
        assert_eq!(out.dim(), (7, 5));
        let xs = out.band("iop_apig").unwrap();
        let ys = out.band("iop_adet").unwrap();
        let lats = out.band("iop_agelb").unwrap();
        for y in 0..7 {
            for x in 0..5 {
                assert_eq!(xs[[y, x]], x as f32);
                assert_eq!(ys[[y, x]], y as f32);
                assert_eq!(lats[[y, x]], -(y as f32 + 0.5));
            }
        }
        assert!(out.flags().iter().all(|&f| f == VALID_PE.mask()));
    }

    #[test]
    fn tile_size_does_not_change_results() {
        let inputs = inputs(9, 4);
        let gc = AffineGeoCoding {
            geotransform: [5.0, 0.1, 0.0, 50.0, 0.0, -0.1],
        };
        let tc = LineTimeCoding::new(None, None, 9);
        let t = transform();
        let a = process_scene(&inputs, &t, &PositionModel, &gc, &tc, 1).unwrap();
        let b = process_scene(&inputs, &t, &PositionModel, &gc, &tc, 100).unwrap();
        let c = process_scene(&inputs, &t, &PositionModel, &gc, &tc, 4).unwrap();
        for slot in 0..t.schema().width() {
            for ((va, vb), vc) in a.slot(slot).iter().zip(b.slot(slot).iter()).zip(c.slot(slot).iter()) {
                assert!(va == vb || (va.is_nan() && vb.is_nan()));
                assert!(va == vc || (va.is_nan() && vc.is_nan()));
            }
        }
        assert_eq!(a.flags(), b.flags());
        assert_eq!(a.flags(), c.flags());
    }

    #[test]
    fn invalid_mask_and_bad_pixels() {
        let mut inputs = inputs(2, 2);
        let mut valid = Array2::from_elem((2, 2), true);
        valid[[0, 1]] = false;
        inputs.valid = Some(valid);
        inputs.reflectances[1][[1, 1]] = -0.001;
        let gc = AffineGeoCoding {
            geotransform: [0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        };
        let tc = LineTimeCoding::new(None, None, 2);
        let out = process_scene(&inputs, &transform(), &PositionModel, &gc, &tc, 1).unwrap();
        let flags = out.flags();
        assert_eq!(flags[[0, 0]], VALID_PE.mask());
        assert_eq!(flags[[0, 1]], 0);
        assert_eq!(flags[[1, 1]], VALID_PE.mask() | INPUT_INVALID.mask());
        assert!(out.band("iop_apig").unwrap()[[1, 1]].is_nan());
    }

    /// Seconds since `origin` (days since 2000-01-01) into iop_apig.
    struct ElapsedModel {
        origin: f64,
    }

    impl RetrievalModel for ElapsedModel {
        fn process_pixel(&self, input: &ModelInput<'_>) -> RetrievalResult {
            let mut r = RetrievalResult::nan(input.log_reflectances.len());
            r.iops[0] = (input.mjd - self.origin) * 86_400.0;
            r.flags = 0;
            r
        }
    }

    #[test]
    fn first_and_last_lines_get_start_and_stop_times() {
        use chrono::{TimeZone, Utc};
        use crate::core::geocoding::to_mjd2000;

        let start = Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 0).unwrap();
        let stop = Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 10).unwrap();
        let inputs = inputs(11, 3);
        let gc = AffineGeoCoding {
            geotransform: [0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        };
        let tc = LineTimeCoding::new(Some(start), Some(stop), 11);
        let model = ElapsedModel {
            origin: to_mjd2000(start),
        };
        let out = process_scene(&inputs, &transform(), &model, &gc, &tc, 4).unwrap();
        let elapsed = out.band("iop_apig").unwrap();
        for x in 0..3 {
            assert!(elapsed[[0, x]].abs() < 1e-3);
            assert!((elapsed[[9, x]] - 9.0).abs() < 1e-3);
            assert!((elapsed[[10, x]] - 10.0).abs() < 1e-3);
        }
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let mut inputs = inputs(3, 3);
        inputs.view_zenith = Array2::zeros((3, 2));
        let gc = AffineGeoCoding {
            geotransform: [0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        };
        let tc = LineTimeCoding::new(None, None, 3);
        assert!(process_scene(&inputs, &transform(), &PositionModel, &gc, &tc, 2).is_err());
    }

    #[test]
    fn virtual_bands_are_evaluated_lazily() {
        let inputs = inputs(2, 3);
        let gc = AffineGeoCoding {
            geotransform: [0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        };
        let tc = LineTimeCoding::new(None, None, 2);
        let t = transform();
        let out = process_scene(&inputs, &t, &PositionModel, &gc, &tc, 1).unwrap();
        let btot = out
            .virtual_band(VirtualBand::Btot, &Coefficients::default())
            .unwrap();
        // bpart = lon = x + 0.5, bwit = 1
        assert_eq!(btot[[1, 2]], 2.5 + 1.0);
        assert_eq!(out.schema.iop(Iop::Apig), 6);
        assert!(out
            .virtual_band(VirtualBand::KdZ90max, &Coefficients::default())
            .is_none());
    }
}
