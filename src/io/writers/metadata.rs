use gdal::Dataset;
use gdal::Metadata;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::flags::{FLAG_BAND_NAME, FLAG_TABLE, FlagDef, MaskStyle, VALID_PE, mask_styles};
use crate::core::params::RetrievalParams;
use crate::core::schema::OutputSchema;
use crate::core::virtual_bands::{VirtualBandDef, available_bands};
use crate::io::metadata::AcquisitionTimes;

/// Everything a consumer needs to interpret a written product.
#[derive(Debug, Clone, Serialize)]
pub struct ProductMetadata {
    pub processor: &'static str,
    pub processor_version: &'static str,
    pub source_product: String,
    pub schema: OutputSchema,
    pub flag_band: &'static str,
    pub flag_coding: Vec<FlagDef>,
    pub masks: Vec<MaskStyle>,
    pub valid_pixel_expression: String,
    pub virtual_bands: Vec<VirtualBandDef>,
    pub used_model_files: Vec<String>,
    pub acquisition: AcquisitionTimes,
    pub parameters: RetrievalParams,
    pub geotransform: Option<[f64; 6]>,
    pub crs: Option<String>,
}

impl ProductMetadata {
    pub fn new(
        source_product: &Path,
        schema: &OutputSchema,
        params: &RetrievalParams,
        used_model_files: Vec<String>,
        acquisition: AcquisitionTimes,
    ) -> Self {
        let coefficients = params.coefficients();
        Self {
            processor: env!("CARGO_PKG_NAME"),
            processor_version: env!("CARGO_PKG_VERSION"),
            source_product: source_product.display().to_string(),
            schema: schema.clone(),
            flag_band: FLAG_BAND_NAME,
            flag_coding: FLAG_TABLE.to_vec(),
            masks: mask_styles(),
            valid_pixel_expression: format!("{}.{}", FLAG_BAND_NAME, VALID_PE.name),
            virtual_bands: available_bands(schema)
                .iter()
                .map(|b| b.definition(&coefficients))
                .collect(),
            used_model_files,
            acquisition,
            parameters: params.clone(),
            geotransform: None,
            crs: None,
        }
    }

    pub fn with_georeference(mut self, geotransform: Option<[f64; 6]>, crs: Option<&str>) -> Self {
        self.geotransform = geotransform;
        self.crs = crs.filter(|c| !c.is_empty()).map(str::to_string);
        self
    }
}

/// Flat key/value pairs embedded into the GeoTIFF metadata domain.
pub fn extract_metadata_fields(meta: &ProductMetadata) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    let params = &meta.parameters;

    metadata.insert(
        "PROCESSOR".to_string(),
        format!("{} {}", meta.processor, meta.processor_version),
    );
    metadata.insert("SOURCE_PRODUCT".to_string(), meta.source_product.clone());
    metadata.insert("MODEL_SET".to_string(), params.model_set.clone());
    metadata.insert("SALINITY".to_string(), params.salinity.to_string());
    metadata.insert("TEMPERATURE".to_string(), params.temperature.to_string());
    metadata.insert(
        "THRESHOLD_AC_REFLEC_OOS".to_string(),
        params.threshold_ac_reflec_oos.to_string(),
    );
    metadata.insert("REFLECTANCE_UNIT".to_string(), meta.schema.output_unit().to_string());
    metadata.insert("USED_MODEL_FILES".to_string(), meta.used_model_files.join(","));
    metadata.insert("VALID_PIXEL_EXPRESSION".to_string(), meta.valid_pixel_expression.clone());

    if let Some(start) = meta.acquisition.start {
        metadata.insert("PRODUCT_START_TIME".to_string(), start.to_rfc3339());
    }
    if let Some(stop) = meta.acquisition.stop {
        metadata.insert("PRODUCT_STOP_TIME".to_string(), stop.to_rfc3339());
    }

    metadata
}

/// Flag coding as `FLAG_<name>=<mask>` items for the flag raster.
pub fn flag_coding_fields() -> HashMap<String, String> {
    FLAG_TABLE
        .iter()
        .map(|f| (format!("FLAG_{}", f.name), f.mask().to_string()))
        .collect()
}

/// Set georeferencing and metadata items on a written dataset
pub fn embed_tiff_metadata(
    ds: &mut Dataset,
    meta: &ProductMetadata,
    extra: HashMap<String, String>,
) -> Result<(), gdal::errors::GdalError> {
    if let Some(gt) = meta.geotransform {
        ds.set_geo_transform(&gt)?;
        if let Some(crs) = &meta.crs {
            ds.set_projection(crs)?;
        }
    }
    for (key, value) in extract_metadata_fields(meta).into_iter().chain(extra) {
        ds.set_metadata_item(&key, &value, "")?;
    }
    Ok(())
}

/// Write the JSON sidecar next to `output_path`.
pub fn create_metadata_sidecar(
    output_path: &Path,
    meta: &ProductMetadata,
) -> crate::error::Result<PathBuf> {
    let sidecar_path = output_path.with_extension("json");
    let json_string = serde_json::to_string_pretty(meta)?;
    std::fs::write(&sidecar_path, json_string)?;
    info!("Created metadata sidecar: {:?}", sidecar_path);
    Ok(sidecar_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ProductMetadata {
        let params = RetrievalParams {
            source_bands: vec!["B2".into(), "B3".into(), "B4".into(), "B5".into()],
            ..Default::default()
        };
        let schema = params.schema().unwrap();
        ProductMetadata::new(
            Path::new("/data/scene.tif"),
            &schema,
            &params,
            vec!["rw_iop/77x77x77_4497.6.net".into()],
            AcquisitionTimes::default(),
        )
    }

    #[test]
    fn sidecar_lists_flags_virtual_bands_and_models() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("scene_out.tif");
        let path = create_metadata_sidecar(&out, &meta()).unwrap();
        assert_eq!(path, dir.path().join("scene_out.json"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["flag_band"], "quality_flags");
        assert_eq!(json["flag_coding"].as_array().unwrap().len(), FLAG_TABLE.len());
        assert_eq!(json["valid_pixel_expression"], "quality_flags.Valid_PE");
        assert_eq!(json["used_model_files"][0], "rw_iop/77x77x77_4497.6.net");
        let names: Vec<&str> = json["virtual_bands"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"conc_chl"));
        assert!(names.contains(&"kd_z90max"));
        assert!(json["acquisition"]["start"].is_null());
    }

    #[test]
    fn tiff_fields_carry_parameters_and_times() {
        let mut m = meta();
        m.acquisition.start = crate::io::metadata::parse_utc("2020-06-01T10:00:00Z");
        let fields = extract_metadata_fields(&m);
        assert_eq!(fields["MODEL_SET"], "C2RCC-Nets");
        assert_eq!(fields["SALINITY"], "35");
        assert_eq!(fields["PRODUCT_START_TIME"], "2020-06-01T10:00:00+00:00");
        assert!(!fields.contains_key("PRODUCT_STOP_TIME"));
        assert_eq!(flag_coding_fields()["FLAG_Valid_PE"], (1u32 << 31).to_string());
    }

    #[test]
    fn georeference_ignores_empty_crs() {
        let m = meta().with_georeference(Some([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]), Some(""));
        assert!(m.crs.is_none());
        assert!(m.geotransform.is_some());
    }
}
