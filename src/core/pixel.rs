//! Per-pixel retrieval: prepare model inputs, run the model, scatter the
//! results into the slots of the output schema.
use std::f64::consts::PI;

use tracing::trace;

use crate::core::flags::{FlagWord, INPUT_INVALID, VALID_PE};
use crate::core::model::{ModelInput, RetrievalModel, RetrievalResult};
use crate::core::params::RetrievalParams;
use crate::core::schema::{BlockKind, Iop, Kd, OutputSchema, Uncertainty};
use crate::error::{Error, Result};
use crate::types::ReflectanceUnit;

/// Sun/view geometry and location of a pixel, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Geometry {
    pub lat: f64,
    pub lon: f64,
    pub sun_zenith: f64,
    pub sun_azimuth: f64,
    pub view_zenith: f64,
    pub view_azimuth: f64,
}

/// Inputs of one pixel.
#[derive(Debug, Clone, Copy)]
pub struct PixelSample<'a> {
    pub x: usize,
    pub y: usize,
    pub geometry: Geometry,
    /// Raw reflectances, one per source channel
    pub reflectances: &'a [f64],
    pub valid: bool,
    /// Acquisition time, modified Julian date (NaN when unknown)
    pub mjd: f64,
}

/// Convert an input reflectance into the model's water-leaving domain.
pub fn to_model_domain(value: f64, input_unit: ReflectanceUnit) -> f64 {
    match input_unit {
        ReflectanceUnit::Rrs => value / PI,
        ReflectanceUnit::Rhow => value,
    }
}

/// Convert a model reflectance into the requested output convention.
/// Exact inverse of [`to_model_domain`].
pub fn from_model_domain(value: f64, output_unit: ReflectanceUnit) -> f64 {
    match output_unit {
        ReflectanceUnit::Rrs => value * PI,
        ReflectanceUnit::Rhow => value,
    }
}

/// Natural log of each reflectance in the model domain. Returns false when
/// any input is not strictly positive (or not finite); `out` then holds
/// non-finite entries for those inputs.
pub fn log_reflectances(values: &[f64], input_unit: ReflectanceUnit, out: &mut Vec<f64>) -> bool {
    out.clear();
    let mut ok = true;
    for &v in values {
        if !(v > 0.0 && v.is_finite()) {
            ok = false;
        }
        out.push(to_model_domain(v, input_unit).ln());
    }
    ok
}

/// Buffers reused across the pixels of one worker.
#[derive(Debug, Default, Clone)]
pub struct PixelScratch {
    log_refl: Vec<f64>,
}

impl PixelScratch {
    pub fn with_channels(channel_count: usize) -> Self {
        Self {
            log_refl: Vec::with_capacity(channel_count),
        }
    }
}

/// The per-pixel procedure, configured once per run.
#[derive(Debug, Clone)]
pub struct PixelTransform {
    schema: OutputSchema,
    input_unit: ReflectanceUnit,
    solar_flux: Vec<f64>,
}

impl PixelTransform {
    pub fn new(schema: OutputSchema, input_unit: ReflectanceUnit, solar_flux: Vec<f64>) -> Result<Self> {
        if solar_flux.len() != schema.channel_count() {
            return Err(Error::InvalidArgument {
                arg: "solar_flux",
                value: format!(
                    "{} values for {} channels",
                    solar_flux.len(),
                    schema.channel_count()
                ),
            });
        }
        Ok(Self {
            schema,
            input_unit,
            solar_flux,
        })
    }

    pub fn from_params(params: &RetrievalParams) -> Result<Self> {
        Self::new(params.schema()?, params.input_unit(), params.solar_flux_values())
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    pub fn input_unit(&self) -> ReflectanceUnit {
        self.input_unit
    }

    /// Compute one pixel into `out`, a row of `schema().width()` slots.
    /// Only assigned slots are written. Returns the flag word, which is also
    /// stored in the flag slot.
    pub fn compute<M: RetrievalModel + ?Sized>(
        &self,
        sample: &PixelSample<'_>,
        model: &M,
        out: &mut [f64],
    ) -> FlagWord {
        let mut scratch = PixelScratch::with_channels(self.schema.channel_count());
        self.compute_with(sample, model, out, &mut scratch)
    }

    /// [`compute`](Self::compute) with caller-owned buffers, for loops over
    /// many pixels.
    pub fn compute_with<M: RetrievalModel + ?Sized>(
        &self,
        sample: &PixelSample<'_>,
        model: &M,
        out: &mut [f64],
        scratch: &mut PixelScratch,
    ) -> FlagWord {
        debug_assert!(out.len() >= self.schema.width());
        debug_assert_eq!(sample.reflectances.len(), self.schema.channel_count());

        let mut flags = FlagWord::default();
        if sample.valid {
            flags.set(VALID_PE);
        }

        let log_refl = &mut scratch.log_refl;
        if !log_reflectances(sample.reflectances, self.input_unit, log_refl) {
            trace!("Non-positive reflectance at ({}, {})", sample.x, sample.y);
            flags.set(INPUT_INVALID);
            self.fill_nan(out);
            out[self.schema.flag_slot()] = flags.as_sample();
            return flags;
        }

        let g = &sample.geometry;
        let input = ModelInput {
            x: sample.x,
            y: sample.y,
            lat: g.lat,
            lon: g.lon,
            log_reflectances: log_refl,
            solar_flux: &self.solar_flux,
            sun_zenith: g.sun_zenith,
            sun_azimuth: g.sun_azimuth,
            view_zenith: g.view_zenith,
            view_azimuth: g.view_azimuth,
            altitude: 0.0,
            valid: sample.valid,
            pressure: 0.0,
            ozone: 0.0,
            mjd: sample.mjd,
        };
        let result = model.process_pixel(&input);

        self.scatter(&result, out);
        flags.merge(result.flags);
        out[self.schema.flag_slot()] = flags.as_sample();
        flags
    }

    /// NaN in every assigned value slot.
    fn fill_nan(&self, out: &mut [f64]) {
        for channel in self.schema.channels() {
            if channel.kind != BlockKind::Flags {
                out[channel.slot] = f64::NAN;
            }
        }
    }

    fn scatter(&self, result: &RetrievalResult, out: &mut [f64]) {
        let schema = &self.schema;
        let unit = schema.output_unit();

        if let Some(block) = schema.block(BlockKind::AcReflectance) {
            for (slot, v) in block.slots().zip(&result.rwa) {
                out[slot] = from_model_domain(*v, unit);
            }
        }
        if let Some(block) = schema.block(BlockKind::NormalizedReflectance) {
            for (slot, v) in block.slots().zip(&result.rwn) {
                out[slot] = from_model_domain(*v, unit);
            }
        }
        if let Some(slot) = schema.out_of_scope() {
            out[slot] = result.rwa_oos;
        }

        for iop in Iop::ALL {
            out[schema.iop(iop)] = result.iops[iop.index()];
        }

        for kd in Kd::ALL {
            if let Some(slot) = schema.kd(kd) {
                out[slot] = match kd {
                    Kd::Kd489 => result.kd489,
                    Kd::Kdmin => result.kdmin,
                };
            }
        }

        // Kd uncertainties resolve to no slot unless kd is emitted.
        for iop in Iop::ALL {
            if let Some(slot) = schema.uncertainty(Uncertainty::Iop(iop)) {
                out[slot] = result.unc_iops[iop.index()];
            }
        }
        for (i, unc) in [Uncertainty::Adg, Uncertainty::Atot, Uncertainty::Btot]
            .into_iter()
            .enumerate()
        {
            if let Some(slot) = schema.uncertainty(unc) {
                out[slot] = result.unc_sums[i];
            }
        }
        for kd in Kd::ALL {
            if let Some(slot) = schema.uncertainty(Uncertainty::Kd(kd)) {
                out[slot] = result.unc_kd[kd.index()];
            }
        }
    }
}
