use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aquaret::api::{BatchReport, Processor, iterate_products};
use aquaret::core::flags::{FLAG_BAND_NAME, MaskStyle, mask_styles};
use aquaret::core::virtual_bands::{VirtualBandDef, available_bands};
use aquaret::io::AcquisitionTimes;
use aquaret::{FlagWord, OutputSchema, RetrievalParams};

use super::args::CliArgs;
use super::errors::AppError;

/// Parse a flag word given in decimal or `0x` hexadecimal.
pub fn parse_flag_word(value: &str) -> Result<u32, AppError> {
    let trimmed = value.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse::<u32>(),
    };
    parsed.map_err(|_| AppError::InvalidFlagWord {
        value: value.to_string(),
    })
}

#[derive(Serialize)]
struct DecodedFlag {
    bit: u32,
    name: &'static str,
    description: &'static str,
}

#[derive(Serialize)]
struct DecodedWord {
    word: u32,
    flags: Vec<DecodedFlag>,
    /// Set bits without a table entry, e.g. model-internal bits
    unknown_bits: Vec<u32>,
}

fn decode_word(word: u32) -> DecodedWord {
    let decoded = FlagWord(word).decode();
    let known = decoded.iter().fold(0u32, |acc, f| acc | f.mask());
    DecodedWord {
        word,
        flags: decoded
            .iter()
            .map(|f| DecodedFlag {
                bit: f.bit,
                name: f.name,
                description: f.description,
            })
            .collect(),
        unknown_bits: (0..32).filter(|b| (word & !known) & (1 << *b) != 0).collect(),
    }
}

#[derive(Serialize)]
struct SchemaDescription<'a> {
    width: usize,
    flag_slot: usize,
    schema: &'a OutputSchema,
    flag_band: &'static str,
    masks: Vec<MaskStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    virtual_bands: Option<Vec<VirtualBandDef>>,
}

fn describe_schema(processor: &Processor, with_virtual: bool) -> Result<String, AppError> {
    let schema = processor.schema();
    let coefficients = processor.params().coefficients();
    let description = SchemaDescription {
        width: schema.width(),
        flag_slot: schema.flag_slot(),
        schema,
        flag_band: FLAG_BAND_NAME,
        masks: mask_styles(),
        virtual_bands: with_virtual.then(|| {
            available_bands(schema)
                .iter()
                .map(|b| b.definition(&coefficients))
                .collect()
        }),
    };
    Ok(serde_json::to_string_pretty(&description)?)
}

#[derive(Serialize)]
struct ProductCheck {
    input: PathBuf,
    size_x: usize,
    size_y: usize,
    bands: Vec<String>,
    geocoding: &'static str,
    acquisition: AcquisitionTimes,
    output_slots: usize,
}

fn check_product(processor: &Processor, input: &Path) -> Result<ProductCheck, AppError> {
    let product = processor.open_product(input)?;
    let geocoding = match product.geocoding {
        aquaret::core::geocoding::SceneGeoCoding::Affine(_) => "affine",
        aquaret::core::geocoding::SceneGeoCoding::Grid(_) => "lat/lon grid",
    };
    let md = &product.reader.metadata;
    info!("{:?} is ready for retrieval", input);
    Ok(ProductCheck {
        input: input.to_path_buf(),
        size_x: md.size_x,
        size_y: md.size_y,
        bands: md.band_names.clone(),
        geocoding,
        acquisition: product.times,
        output_slots: processor.schema().width(),
    })
}

fn load_params(args: &CliArgs) -> Result<RetrievalParams, AppError> {
    let mut params = match &args.config {
        Some(path) => RetrievalParams::from_json_file(path)?,
        None => RetrievalParams::default(),
    };
    args.apply_overrides(&mut params);
    Ok(params)
}

fn check_directory(
    processor: &Processor,
    input_dir: &Path,
    continue_on_error: bool,
) -> Result<BatchReport, AppError> {
    let mut report = BatchReport::default();
    for path in iterate_products(input_dir)? {
        match check_product(processor, &path) {
            Ok(check) => {
                println!("{}", serde_json::to_string_pretty(&check)?);
                report.processed += 1;
            }
            Err(AppError::Retrieval(
                e @ (aquaret::Error::MissingBand { .. } | aquaret::Error::MissingRaster { .. }),
            )) => {
                warn!("Skipping {:?}: {}", path, e);
                report.skipped += 1;
            }
            Err(e) => {
                report.errors += 1;
                if !continue_on_error {
                    return Err(e);
                }
                warn!("Failed to check {:?}: {}", path, e);
            }
        }
    }
    Ok(report)
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.log {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Some(value) = &args.decode_flags {
        let word = parse_flag_word(value)?;
        println!("{}", serde_json::to_string_pretty(&decode_word(word))?);
        if !args.describe_schema && !args.list_models && args.input.is_none() && args.input_dir.is_none() {
            return Ok(());
        }
    }

    let params = load_params(&args)?;
    if let Some(path) = &args.write_config {
        params.to_json_file(path)?;
        info!("Wrote parameters to {:?}", path);
    }

    let wants_processor = args.describe_schema
        || args.list_models
        || args.input.is_some()
        || args.input_dir.is_some();
    if !wants_processor {
        if args.write_config.is_some() {
            return Ok(());
        }
        return Err(AppError::NothingToDo {
            hint: "pass --input, --input-dir, --describe-schema, --list-models or --decode-flags"
                .to_string(),
        }
        .into());
    }

    let processor = Processor::new(params).map_err(AppError::from)?;

    if args.describe_schema {
        println!("{}", describe_schema(&processor, args.materialize_virtual)?);
    }

    if args.list_models {
        for name in processor.model_files().names() {
            println!("{}", name);
        }
    }

    if let Some(input) = &args.input {
        let check = check_product(&processor, input)?;
        println!("{}", serde_json::to_string_pretty(&check)?);
    } else if let Some(input_dir) = &args.input_dir {
        let report = check_directory(&processor, input_dir, args.batch)?;
        info!(
            "Batch check finished: {} ready, {} skipped, {} errors",
            report.processed, report.skipped, report.errors
        );
    }

    Ok(())
}
