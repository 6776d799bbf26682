#![doc = r#"
aquaret: pixel-wise water-quality retrieval for geocoded optical reflectance rasters.

For every pixel of a product, aquaret feeds the surface reflectances and the sun/view
geometry to a retrieval model and lays out its results (atmospherically corrected and
normalized reflectances, inherent optical properties, attenuation coefficients, their
uncertainties and a packed 32-bit quality-flag word) in an output stack whose layout is
resolved once from a set of feature toggles.

The retrieval model itself is consumed through the [`RetrievalModel`] trait; aquaret
resolves which network files a model set uses and hands them, together with the scene
constants, to whoever builds the model.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Quick start: resolve a layout
-----------------------------
```rust
use aquaret::{FeatureToggles, OutputSchema};

fn main() -> aquaret::Result<()> {
    let schema = OutputSchema::resolve(4, &FeatureToggles::default())?;
    // IOPs always start at twice the channel count
    assert_eq!(schema.single_channel_offset(), 8);
    assert_eq!(schema.index_of("iop_apig"), Some(8));
    Ok(())
}
```

Process a product to a file
---------------------------
```rust,no_run
use std::path::Path;
use aquaret::{Processor, RetrievalParams, RetrievalModel, ModelInput, RetrievalResult};

struct MyModel;

impl RetrievalModel for MyModel {
    fn process_pixel(&self, input: &ModelInput<'_>) -> RetrievalResult {
        RetrievalResult::nan(input.log_reflectances.len())
    }
}

fn main() -> aquaret::Result<()> {
    let params = RetrievalParams {
        source_bands: ["B1", "B2", "B3", "B4", "B5", "B6", "B7", "B8A"]
            .map(String::from)
            .to_vec(),
        valid_pixel_band: Some("water_mask".to_string()),
        ..Default::default()
    };
    let processor = Processor::new(params)?;
    let model = processor.load_model(|_files, _settings| Ok(MyModel))?;

    let written = processor.process_to_path(
        Path::new("/data/S2_scene.tif"),
        Path::new("/out/S2_scene_aquaret.tif"),
        &model,
        true, // materialize virtual bands
    )?;
    println!("flags in {:?}", written.flags);
    Ok(())
}
```

Decode a flag word
------------------
```rust
use aquaret::FlagWord;

let word = FlagWord((1 << 31) | (1 << 3));
let names: Vec<&str> = word.decode().iter().map(|f| f.name).collect();
assert_eq!(names, vec!["Cloud_risk", "Valid_PE"]);
```

Error handling
--------------
All public functions return `aquaret::Result<T>`. Configuration problems (missing bands,
unknown model set, non-geocoded input, out-of-range scene constants) are reported before
any pixel is processed; per-pixel anomalies are encoded as NaN and flag bits instead.

```rust,no_run
use aquaret::{Error, Processor, RetrievalParams};

fn main() {
    match Processor::new(RetrievalParams::default()) {
        Ok(_) => {}
        Err(Error::EmptyChannelSet) => eprintln!("configure source_bands first"),
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`]: high-level entry points (`Processor`, batch helpers).
- [`core`]: schema resolution, pixel transform, flags, virtual bands, tiled engine.
- [`types`]: reflectance conventions, model sets and feature toggles.
- [`io`]: GDAL product reader, acquisition-time lookup and writers.
- [`error`]: crate-level `Error` and `Result`.
"#]

pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use core::params::RetrievalParams;
pub use error::{Error, Result};
pub use types::{FeatureToggles, ModelSet, ReflectanceUnit};

// Core building blocks
pub use core::engine::{OutputStack, SceneInputs, process_scene};
pub use core::flags::{FLAG_TABLE, FlagDef, FlagWord};
pub use core::geocoding::{GeoCoding, GeoPos, LineTimeCoding, TimeCoding};
pub use core::model::{ModelFiles, ModelInput, ModelSettings, RetrievalModel, RetrievalResult};
pub use core::pixel::{PixelSample, PixelTransform};
pub use core::schema::OutputSchema;
pub use core::virtual_bands::{Coefficients, VirtualBand};

// Readers and writers
pub use io::gdal::{GdalError, GdalMetadata, GdalProductReader};
pub use io::writers::metadata::{ProductMetadata, create_metadata_sidecar};

// High-level API re-exports
pub use api::{
    BatchReport, PreparedProduct, Processor, iterate_products, process_directory_to_path,
};
