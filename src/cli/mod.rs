//! Command Line Interface (CLI) layer for aquaret.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`). Parameters come from an optional
//! JSON config file overridden by flags, and are validated once before any
//! product is touched.
//!
//! Pixel retrieval needs a `RetrievalModel` implementation and is driven
//! through `aquaret::api`; the CLI covers everything up to that point.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
