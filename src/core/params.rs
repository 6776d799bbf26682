use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::model::{ModelFiles, ModelSettings};
use crate::core::schema::OutputSchema;
use crate::core::virtual_bands::Coefficients;
use crate::error::{Error, Result};
use crate::types::{FeatureToggles, ModelSet, ReflectanceUnit};

/// Open intervals accepted for the scene constants.
pub const SALINITY_RANGE: (f64, f64) = (0.000028, 43.0);
pub const TEMPERATURE_RANGE: (f64, f64) = (0.000111, 36.0);

/// Retrieval parameters suitable for config files and CLI overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalParams {
    /// Salinity of the scene, PSU
    pub salinity: f64,
    /// Temperature of the scene, °C
    pub temperature: f64,
    /// TSM = iop_bpart * tsm_fac + iop_bwit * tsm_exp
    pub tsm_fac: f64,
    pub tsm_exp: f64,
    /// CHL = iop_apig ^ chl_exp * chl_fac
    pub chl_exp: f64,
    pub chl_fac: f64,
    /// Out-of-scope threshold for the corrected reflectances
    pub threshold_ac_reflec_oos: f64,
    /// Directory replacing the built-in model set
    pub alternative_model_path: Option<PathBuf>,
    pub model_set: String,
    /// Ordered source reflectance band names
    pub source_bands: Vec<String>,
    /// Band whose non-zero samples mark valid pixels; all pixels are valid when unset
    pub valid_pixel_band: Option<String>,
    /// Inputs are remote-sensing reflectances instead of water-leaving reflectances
    pub input_as_rrs: bool,
    /// Write remote-sensing reflectances instead of water-leaving reflectances
    pub output_as_rrs: bool,
    #[serde(flatten)]
    pub toggles: FeatureToggles,
    /// Solar flux per channel; zeros when not supplied
    pub solar_flux: Option<Vec<f64>>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            salinity: 35.0,
            temperature: 15.0,
            tsm_fac: 1.72,
            tsm_exp: 3.1,
            chl_exp: 1.04,
            chl_fac: 21.0,
            threshold_ac_reflec_oos: 0.1,
            alternative_model_path: None,
            model_set: ModelSet::STANDARD_NAME.to_string(),
            source_bands: Vec::new(),
            valid_pixel_band: None,
            input_as_rrs: true,
            output_as_rrs: false,
            toggles: FeatureToggles::default(),
            solar_flux: None,
        }
    }
}

impl RetrievalParams {
    /// Load parameters from a JSON file; missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&text)?;
        debug!("Loaded retrieval parameters from {:?}", path);
        Ok(params)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check everything that can be checked without opening the product.
    pub fn validate(&self) -> Result<()> {
        check_open_interval("salinity", self.salinity, SALINITY_RANGE)?;
        check_open_interval("temperature", self.temperature, TEMPERATURE_RANGE)?;
        self.model_set.parse::<ModelSet>()?;
        if self.source_bands.is_empty() {
            return Err(Error::EmptyChannelSet);
        }
        if let Some(flux) = &self.solar_flux {
            if flux.len() != self.source_bands.len() {
                return Err(Error::InvalidArgument {
                    arg: "solar_flux",
                    value: format!(
                        "{} values for {} source bands",
                        flux.len(),
                        self.source_bands.len()
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn input_unit(&self) -> ReflectanceUnit {
        ReflectanceUnit::from_rrs_flag(self.input_as_rrs)
    }

    pub fn output_unit(&self) -> ReflectanceUnit {
        ReflectanceUnit::from_rrs_flag(self.output_as_rrs)
    }

    pub fn schema(&self) -> Result<OutputSchema> {
        OutputSchema::for_bands(&self.source_bands, &self.toggles, self.output_unit())
    }

    pub fn model_files(&self) -> Result<ModelFiles> {
        ModelFiles::resolve(&self.model_set, self.alternative_model_path.as_deref())
    }

    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            salinity: self.salinity,
            temperature: self.temperature,
            threshold_ac_reflec_oos: self.threshold_ac_reflec_oos,
            toggles: self.toggles,
        }
    }

    pub fn coefficients(&self) -> Coefficients {
        Coefficients {
            tsm_fac: self.tsm_fac,
            tsm_exp: self.tsm_exp,
            chl_exp: self.chl_exp,
            chl_fac: self.chl_fac,
        }
    }

    pub fn solar_flux_values(&self) -> Vec<f64> {
        self.solar_flux
            .clone()
            .unwrap_or_else(|| vec![0.0; self.source_bands.len()])
    }
}

fn check_open_interval(name: &'static str, value: f64, (min, max): (f64, f64)) -> Result<()> {
    if value > min && value < max {
        Ok(())
    } else {
        Err(Error::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}
