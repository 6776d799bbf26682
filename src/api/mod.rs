//! High-level library API: validate parameters and resolve the output schema
//! once, then run the retrieval over products on disk or scenes in memory.
//! Prefer these entrypoints over the low-level `core` modules when
//! integrating the retrieval into another application.
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::engine::{DEFAULT_TILE_LINES, OutputStack, SceneInputs, process_scene};
use crate::core::geocoding::{GeoCoding, LineTimeCoding, SceneGeoCoding, TimeCoding};
use crate::core::model::{ModelFiles, ModelSettings, RetrievalModel};
use crate::core::params::RetrievalParams;
use crate::core::pixel::PixelTransform;
use crate::core::schema::OutputSchema;
use crate::error::{Error, Result};
use crate::io::gdal::GdalProductReader;
use crate::io::metadata::AcquisitionTimes;
use crate::io::writers::metadata::ProductMetadata;
use crate::io::writers::{WrittenProduct, save_output_stack};

/// Retrieval run configuration, fully validated. Construction performs
/// every check that does not need the input product.
#[derive(Debug, Clone)]
pub struct Processor {
    params: RetrievalParams,
    transform: PixelTransform,
    model_files: ModelFiles,
    tile_lines: usize,
}

/// A product opened and checked for processing.
pub struct PreparedProduct {
    pub reader: GdalProductReader,
    pub geocoding: SceneGeoCoding,
    pub times: AcquisitionTimes,
}

impl PreparedProduct {
    pub fn timecoding(&self) -> LineTimeCoding {
        LineTimeCoding::new(self.times.start, self.times.stop, self.reader.metadata.size_y)
    }
}

impl Processor {
    pub fn new(params: RetrievalParams) -> Result<Self> {
        params.validate()?;
        let transform = PixelTransform::from_params(&params)?;
        let model_files = params.model_files()?;
        info!(
            "Resolved {} output slots for {} channels, model set {}",
            transform.schema().width(),
            transform.schema().channel_count(),
            params.model_set
        );
        Ok(Self {
            params,
            transform,
            model_files,
            tile_lines: DEFAULT_TILE_LINES,
        })
    }

    pub fn with_tile_lines(mut self, tile_lines: usize) -> Self {
        self.tile_lines = tile_lines;
        self
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    pub fn schema(&self) -> &OutputSchema {
        self.transform.schema()
    }

    pub fn model_files(&self) -> &ModelFiles {
        &self.model_files
    }

    pub fn model_settings(&self) -> ModelSettings {
        self.params.model_settings()
    }

    /// Build the model with the resolved files and settings.
    pub fn load_model<M, F>(&self, loader: F) -> Result<M>
    where
        F: FnOnce(&ModelFiles, &ModelSettings) -> Result<M>,
    {
        loader(&self.model_files, &self.model_settings())
    }

    /// Open `input` and check bands, geocoding and acquisition times.
    pub fn open_product(&self, input: &Path) -> Result<PreparedProduct> {
        let reader = GdalProductReader::open(input)?;
        reader.check_bands(&self.params.source_bands, self.params.valid_pixel_band.as_deref())?;
        let geocoding = reader.geocoding()?;
        let times = reader.acquisition_times();
        Ok(PreparedProduct {
            reader,
            geocoding,
            times,
        })
    }

    /// Run the retrieval over an in-memory scene.
    pub fn process_scene<M, G, T>(
        &self,
        inputs: &SceneInputs,
        model: &M,
        geocoding: &G,
        timecoding: &T,
    ) -> Result<OutputStack>
    where
        M: RetrievalModel + ?Sized,
        G: GeoCoding + ?Sized,
        T: TimeCoding + ?Sized,
    {
        process_scene(inputs, &self.transform, model, geocoding, timecoding, self.tile_lines)
    }

    /// Read `input` and compute its output stack.
    pub fn process_to_stack<M: RetrievalModel + ?Sized>(
        &self,
        input: &Path,
        model: &M,
    ) -> Result<(OutputStack, ProductMetadata)> {
        let product = self.open_product(input)?;
        let inputs = product.reader.scene_inputs(
            &self.params.source_bands,
            self.params.valid_pixel_band.as_deref(),
        )?;
        let stack = self.process_scene(&inputs, model, &product.geocoding, &product.timecoding())?;
        let meta = self.product_metadata(input, model, product.times).with_georeference(
            product.reader.metadata.geotransform,
            Some(product.reader.dataset.projection().as_str()),
        );
        Ok((stack, meta))
    }

    /// Read `input`, compute it and write the product to `output`.
    pub fn process_to_path<M: RetrievalModel + ?Sized>(
        &self,
        input: &Path,
        output: &Path,
        model: &M,
        materialize_virtual: bool,
    ) -> Result<WrittenProduct> {
        let (stack, meta) = self.process_to_stack(input, model)?;
        let coefficients = self.params.coefficients();
        save_output_stack(
            &stack,
            output,
            &meta,
            materialize_virtual.then_some(&coefficients),
        )
    }

    /// Metadata describing a product computed with `model`.
    pub fn product_metadata<M: RetrievalModel + ?Sized>(
        &self,
        input: &Path,
        model: &M,
        times: AcquisitionTimes,
    ) -> ProductMetadata {
        let mut used = model.used_model_names();
        if used.is_empty() {
            used = self.model_files.names();
        }
        ProductMetadata::new(input, self.schema(), &self.params, used, times)
    }
}

/// Batch processing report
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
}

const PRODUCT_EXTENSIONS: [&str; 5] = ["tif", "tiff", "vrt", "nc", "img"];

/// Raster files directly inside `input_dir`, sorted by name.
pub fn iterate_products(input_dir: &Path) -> Result<std::vec::IntoIter<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let path = entry?.path();
        let is_product = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| PRODUCT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if path.is_file() && is_product && !is_own_output(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files.into_iter())
}

fn is_own_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.ends_with("_flags"))
}

/// Output path for `input` inside `output_dir`.
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "product".to_string());
    output_dir.join(format!("{}_aquaret.tif", stem))
}

/// Process every product in `input_dir` into `output_dir`. Products missing
/// required bands are skipped. If `continue_on_error` is true, other errors
/// are counted in the report and processing continues; otherwise, the first
/// error is returned.
pub fn process_directory_to_path<M: RetrievalModel + ?Sized>(
    processor: &Processor,
    input_dir: &Path,
    output_dir: &Path,
    model: &M,
    materialize_virtual: bool,
    continue_on_error: bool,
) -> Result<BatchReport> {
    std::fs::create_dir_all(output_dir)?;
    let mut report = BatchReport::default();

    for path in iterate_products(input_dir)? {
        let output = output_path_for(&path, output_dir);
        match processor.process_to_path(&path, &output, model, materialize_virtual) {
            Ok(_) => report.processed += 1,
            Err(e @ (Error::MissingBand { .. } | Error::MissingRaster { .. })) => {
                warn!("Skipping {:?}: {}", path, e);
                report.skipped += 1;
            }
            Err(e) => {
                report.errors += 1;
                if !continue_on_error {
                    return Err(e);
                }
                warn!("Failed to process {:?}: {}", path, e);
            }
        }
    }

    info!(
        "Batch finished: {} processed, {} skipped, {} errors",
        report.processed, report.skipped, report.errors
    );
    Ok(report)
}
