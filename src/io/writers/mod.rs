//! Output writers: float32 GeoTIFF for value channels, uint32 GeoTIFF for
//! the flag word, JSON sidecar for the product metadata.
pub mod metadata;
pub mod tiff;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::core::engine::OutputStack;
use crate::core::flags::FLAG_BAND_NAME;
use crate::core::schema::BlockKind;
use crate::core::virtual_bands::{Coefficients, available_bands};
use crate::error::Result;
use metadata::{ProductMetadata, create_metadata_sidecar, embed_tiff_metadata, flag_coding_fields};
use tiff::{NamedBand, write_tiff_multiband_f32, write_tiff_u32};

/// Files written for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenProduct {
    pub values: PathBuf,
    pub flags: PathBuf,
    pub sidecar: PathBuf,
}

/// `<stem>_flags.tif` next to `output`.
pub fn flag_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{}_flags.tif", stem))
}

/// Write an output stack. Every assigned value channel becomes one band of
/// `output`; with `materialize_virtual` the available virtual bands are
/// appended after them.
pub fn save_output_stack(
    stack: &OutputStack,
    output: &Path,
    meta: &ProductMetadata,
    materialize_virtual: Option<&Coefficients>,
) -> Result<WrittenProduct> {
    let (rows, cols) = stack.dim();
    let mut bands: Vec<NamedBand<'_>> = stack
        .schema
        .channels()
        .iter()
        .filter(|c| c.kind != BlockKind::Flags)
        .map(|c| NamedBand {
            name: c.name.as_str(),
            data: stack.slot(c.slot).iter().copied().collect(),
        })
        .collect();

    if let Some(coefficients) = materialize_virtual {
        for band in available_bands(&stack.schema) {
            if let Some(values) = stack.virtual_band(band, coefficients) {
                bands.push(NamedBand {
                    name: band.name(),
                    data: values.iter().map(|&v| v as f32).collect(),
                });
            }
        }
    }

    let band_count = bands.len();
    let mut ds = write_tiff_multiband_f32(output, cols, rows, bands)?;
    embed_tiff_metadata(&mut ds, meta, Default::default())?;
    info!("Wrote {} bands to {:?}", band_count, output);

    let flags = flag_path(output);
    let flag_data = stack.flags().iter().copied().collect();
    let mut flag_ds = write_tiff_u32(&flags, cols, rows, FLAG_BAND_NAME, flag_data)?;
    embed_tiff_metadata(&mut flag_ds, meta, flag_coding_fields())?;
    info!("Wrote flag raster to {:?}", flags);

    let sidecar = create_metadata_sidecar(output, meta)?;
    Ok(WrittenProduct {
        values: output.to_path_buf(),
        flags,
        sidecar,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_raster_sits_next_to_output() {
        assert_eq!(
            flag_path(Path::new("/out/scene_c2rcc.tif")),
            PathBuf::from("/out/scene_c2rcc_flags.tif")
        );
    }
}
