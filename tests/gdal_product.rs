use std::path::Path;

use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};

use aquaret::core::flags::{INPUT_INVALID, VALID_PE};
use aquaret::io::writers::flag_path;
use aquaret::{
    Error, FlagWord, ModelInput, Processor, RetrievalModel, RetrievalParams, RetrievalResult,
};

const COLS: usize = 6;
const ROWS: usize = 4;

/// Puts the first log reflectance into iop_apig.
struct EchoModel;

impl RetrievalModel for EchoModel {
    fn process_pixel(&self, input: &ModelInput<'_>) -> RetrievalResult {
        let mut r = RetrievalResult::nan(input.log_reflectances.len());
        r.rwa = input.log_reflectances.iter().map(|l| l.exp()).collect();
        r.iops = [input.log_reflectances[0], 0.1, 0.2, 0.3, 0.4];
        r.kd489 = 0.5;
        r.kdmin = 0.25;
        r.flags = 0;
        r
    }
}

fn write_product(path: &Path, band_names: &[&str]) {
    write_bands(path, band_names, true);
}

fn write_bands(path: &Path, band_names: &[&str], georeferenced: bool) {
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut ds = driver
        .create_with_band_type::<f64, _>(path, COLS, ROWS, band_names.len())
        .unwrap();
    if georeferenced {
        ds.set_geo_transform(&[10.0, 0.01, 0.0, 55.0, 0.0, -0.01]).unwrap();
        let wkt = SpatialRef::from_epsg(4326).unwrap().to_wkt().unwrap();
        ds.set_projection(&wkt).unwrap();
    }
    ds.set_metadata_item("PRODUCT_START_TIME", "2020-06-01T10:00:00Z", "")
        .unwrap();
    ds.set_metadata_item("PRODUCT_STOP_TIME", "2020-06-01T10:00:03Z", "")
        .unwrap();

    for (i, name) in band_names.iter().enumerate() {
        let value = match *name {
            "sun_zenith" => 35.0,
            "sun_azimuth" => 150.0,
            "view_zenith_mean" => 4.0,
            "view_azimuth_mean" => 100.0,
            "mask" => 1.0,
            _ => 0.01 * (i + 1) as f64,
        };
        let mut data = vec![value; COLS * ROWS];
        if *name == "B3" {
            // one non-positive reflectance at (row 1, col 2)
            data[COLS + 2] = 0.0;
        }
        let mut band = ds.rasterband(i + 1).unwrap();
        band.set_description(name).unwrap();
        let mut buf = Buffer::new((COLS, ROWS), data);
        band.write((0, 0), (COLS, ROWS), &mut buf).unwrap();
    }
}

fn params() -> RetrievalParams {
    RetrievalParams {
        source_bands: ["B2", "B3", "B4", "B5"].map(String::from).to_vec(),
        valid_pixel_band: Some("mask".to_string()),
        input_as_rrs: false,
        ..Default::default()
    }
}

const ALL_BANDS: [&str; 9] = [
    "B2",
    "B3",
    "B4",
    "B5",
    "sun_zenith",
    "sun_azimuth",
    "view_zenith_mean",
    "view_azimuth_mean",
    "mask",
];

#[test]
fn product_round_trip_through_gdal() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scene.tif");
    let output = dir.path().join("scene_aquaret.tif");
    write_product(&input, &ALL_BANDS);

    let processor = Processor::new(params()).unwrap();
    let product = processor.open_product(&input).unwrap();
    assert!(product.times.is_complete());

    let written = processor
        .process_to_path(&input, &output, &EchoModel, true)
        .unwrap();
    assert_eq!(written.flags, flag_path(&output));

    let out = Dataset::open(&output).unwrap();
    let schema = processor.schema();
    let value_channels = schema.channels().len() - 1;
    let virtual_count = aquaret::core::virtual_bands::available_bands(schema).len();
    assert_eq!(out.raster_count() as usize, value_channels + virtual_count);
    assert_eq!(out.rasterband(1).unwrap().description().unwrap(), "rhow_B2");

    let apig_band = schema
        .channels()
        .iter()
        .position(|c| c.name == "iop_apig")
        .unwrap()
        + 1;
    let apig = out
        .rasterband(apig_band)
        .unwrap()
        .read_as::<f32>((0, 0), (COLS, ROWS), (COLS, ROWS), None)
        .unwrap();
    assert!((apig.data()[0] - (0.01f32).ln()).abs() < 1e-5);
    assert!(apig.data()[COLS + 2].is_nan());

    let flags = Dataset::open(&written.flags).unwrap();
    let words = flags
        .rasterband(1)
        .unwrap()
        .read_as::<u32>((0, 0), (COLS, ROWS), (COLS, ROWS), None)
        .unwrap();
    assert_eq!(words.data()[0], VALID_PE.mask());
    assert!(FlagWord(words.data()[COLS + 2]).contains(INPUT_INVALID));

    let sidecar: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&written.sidecar).unwrap()).unwrap();
    assert_eq!(sidecar["parameters"]["source_bands"][1], "B3");
    assert_eq!(sidecar["used_model_files"].as_array().unwrap().len(), 10);
    assert!(sidecar["acquisition"]["start"].is_string());
}

#[test]
fn missing_bands_fail_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let processor = Processor::new(params()).unwrap();

    let no_b5 = dir.path().join("no_b5.tif");
    write_product(&no_b5, &[
        "B2",
        "B3",
        "B4",
        "sun_zenith",
        "sun_azimuth",
        "view_zenith_mean",
        "view_azimuth_mean",
        "mask",
    ]);
    assert!(matches!(
        processor.open_product(&no_b5),
        Err(Error::MissingBand { name }) if name == "B5"
    ));

    let no_geometry = dir.path().join("no_geometry.tif");
    write_product(&no_geometry, &["B2", "B3", "B4", "B5", "sun_zenith", "mask"]);
    assert!(matches!(
        processor.open_product(&no_geometry),
        Err(Error::MissingRaster { name }) if name == "sun_azimuth"
    ));
}

#[test]
fn products_without_georeference_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("plain.tif");
    write_bands(&input, &ALL_BANDS, false);

    let processor = Processor::new(params()).unwrap();
    let err = processor.open_product(&input).err().unwrap();
    assert!(matches!(err, Error::NotGeocoded));
    assert!(err.is_configuration());

    let output = dir.path().join("plain_aquaret.tif");
    assert!(matches!(
        processor.process_to_path(&input, &output, &EchoModel, false),
        Err(Error::NotGeocoded)
    ));
    assert!(!output.exists());
}
