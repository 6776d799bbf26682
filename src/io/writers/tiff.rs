use gdal::raster::{Buffer, ColorInterpretation};
use gdal::{Dataset, DriverManager, Metadata};
use std::path::Path;

use crate::error::Result;

/// One named band of float samples, row-major.
pub struct NamedBand<'a> {
    pub name: &'a str,
    pub data: Vec<f32>,
}

/// Write float bands into one GeoTIFF. Each band gets its name as
/// description and NaN as no-data value.
pub fn write_tiff_multiband_f32(
    output: &Path,
    cols: usize,
    rows: usize,
    bands: Vec<NamedBand<'_>>,
) -> Result<Dataset> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let ds = driver.create_with_band_type::<f32, _>(output, cols, rows, bands.len())?;
    for (i, band) in bands.into_iter().enumerate() {
        let mut handle = ds.rasterband(i + 1)?;
        handle.set_color_interpretation(ColorInterpretation::GrayIndex)?;
        handle.set_description(band.name)?;
        handle.set_no_data_value(Some(f64::NAN))?;
        let mut buf = Buffer::new((cols, rows), band.data);
        handle.write((0, 0), (cols, rows), &mut buf)?;
    }
    Ok(ds)
}

/// Write a single uint32 band, e.g. packed flag words.
pub fn write_tiff_u32(
    output: &Path,
    cols: usize,
    rows: usize,
    name: &str,
    data: Vec<u32>,
) -> Result<Dataset> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let ds = driver.create_with_band_type::<u32, _>(output, cols, rows, 1)?;
    let mut band = ds.rasterband(1)?;
    band.set_description(name)?;
    let mut buf = Buffer::new((cols, rows), data);
    band.write((0, 0), (cols, rows), &mut buf)?;
    Ok(ds)
}
