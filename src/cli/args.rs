use clap::Parser;
use std::path::PathBuf;

use aquaret::{ReflectanceUnit, RetrievalParams};

#[derive(Parser)]
#[command(
    name = "aquaret",
    version,
    about = "aquaret CLI: resolve output layouts, decode quality flags and check products for water-quality retrieval"
)]
pub struct CliArgs {
    /// Input product (single file mode)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Input directory containing products (batch mode)
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// JSON file with retrieval parameters; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the effective parameters to this JSON file
    #[arg(long)]
    pub write_config: Option<PathBuf>,

    /// Source reflectance bands, in channel order (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub bands: Option<Vec<String>>,

    /// Band whose non-zero samples mark valid pixels
    #[arg(long)]
    pub valid_band: Option<String>,

    /// Salinity of the scene, PSU
    #[arg(long)]
    pub salinity: Option<f64>,

    /// Temperature of the scene, °C
    #[arg(long)]
    pub temperature: Option<f64>,

    /// TSM factor (TSM = bpart * tsm_fac + bwit * tsm_exp)
    #[arg(long)]
    pub tsm_fac: Option<f64>,

    /// TSM exponent (TSM = bpart * tsm_fac + bwit * tsm_exp)
    #[arg(long)]
    pub tsm_exp: Option<f64>,

    /// Chlorophyll exponent (CHL = apig ^ chl_exp * chl_fac)
    #[arg(long)]
    pub chl_exp: Option<f64>,

    /// Chlorophyll factor (CHL = apig ^ chl_exp * chl_fac)
    #[arg(long)]
    pub chl_fac: Option<f64>,

    /// Out-of-scope threshold for the corrected reflectances
    #[arg(long)]
    pub threshold_oos: Option<f64>,

    /// Model set (C2RCC-Nets or C2X-Nets)
    #[arg(long)]
    pub model_set: Option<String>,

    /// Directory replacing the built-in model set; one .net file per role directory
    #[arg(long)]
    pub alternative_model_path: Option<PathBuf>,

    /// Reflectance convention of the source bands
    #[arg(long, value_enum)]
    pub input_unit: Option<ReflectanceUnit>,

    /// Reflectance convention of the written reflectances
    #[arg(long, value_enum)]
    pub output_unit: Option<ReflectanceUnit>,

    /// Emit atmospherically corrected reflectances
    #[arg(long)]
    pub output_ac_reflectance: Option<bool>,

    /// Emit normalized water-leaving reflectances
    #[arg(long)]
    pub output_rhown: Option<bool>,

    /// Emit the out-of-scope value of the corrected reflectances
    #[arg(long)]
    pub output_oos: Option<bool>,

    /// Emit the attenuation coefficients
    #[arg(long)]
    pub output_kd: Option<bool>,

    /// Emit the uncertainties
    #[arg(long)]
    pub output_uncertainties: Option<bool>,

    /// Print the resolved output layout as JSON
    #[arg(long, default_value_t = false)]
    pub describe_schema: bool,

    /// Include the virtual band definitions when describing the layout
    #[arg(long, default_value_t = false)]
    pub materialize_virtual: bool,

    /// Decode a quality flag word (decimal or 0x-prefixed hex)
    #[arg(long)]
    pub decode_flags: Option<String>,

    /// Print the model files that would be used
    #[arg(long, default_value_t = false)]
    pub list_models: bool,

    /// Enable logging
    #[arg(long, default_value_t = false)]
    pub log: bool,

    /// Batch mode: continue checking other products when one fails
    #[arg(long, default_value_t = false)]
    pub batch: bool,
}

impl CliArgs {
    /// Apply the flags given on the command line on top of `params`.
    pub fn apply_overrides(&self, params: &mut RetrievalParams) {
        if let Some(bands) = &self.bands {
            params.source_bands = bands.clone();
        }
        if let Some(band) = &self.valid_band {
            params.valid_pixel_band = Some(band.clone());
        }
        if let Some(v) = self.salinity {
            params.salinity = v;
        }
        if let Some(v) = self.temperature {
            params.temperature = v;
        }
        if let Some(v) = self.tsm_fac {
            params.tsm_fac = v;
        }
        if let Some(v) = self.tsm_exp {
            params.tsm_exp = v;
        }
        if let Some(v) = self.chl_exp {
            params.chl_exp = v;
        }
        if let Some(v) = self.chl_fac {
            params.chl_fac = v;
        }
        if let Some(v) = self.threshold_oos {
            params.threshold_ac_reflec_oos = v;
        }
        if let Some(set) = &self.model_set {
            params.model_set = set.clone();
        }
        if let Some(path) = &self.alternative_model_path {
            params.alternative_model_path = Some(path.clone());
        }
        if let Some(unit) = self.input_unit {
            params.input_as_rrs = unit == ReflectanceUnit::Rrs;
        }
        if let Some(unit) = self.output_unit {
            params.output_as_rrs = unit == ReflectanceUnit::Rrs;
        }
        let toggles = &mut params.toggles;
        if let Some(v) = self.output_ac_reflectance {
            toggles.output_ac_reflectance = v;
        }
        if let Some(v) = self.output_rhown {
            toggles.output_rhown = v;
        }
        if let Some(v) = self.output_oos {
            toggles.output_oos = v;
        }
        if let Some(v) = self.output_kd {
            toggles.output_kd = v;
        }
        if let Some(v) = self.output_uncertainties {
            toggles.output_uncertainties = v;
        }
    }
}
