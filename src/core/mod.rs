//! Core retrieval building blocks: flag table, output schema resolution,
//! the retrieval model contract, the pixel transform, virtual bands,
//! geocoding and the tiled compute engine. These are the primitives
//! consumed by the high-level `api` module.
pub mod engine;
pub mod flags;
pub mod geocoding;
pub mod model;
pub mod params;
pub mod pixel;
pub mod schema;
pub mod virtual_bands;
