// pnml2nupn - streaming PNML to NUPN converter
//
// Reads a PNML P/T net carrying a NUPN toolspecific section and writes the
// NUPN text format. Architecture: a structural index over the source file,
// a phase-ordered extraction engine, and a three-stream writer pipeline.

use std::path::Path;
use tracing::info;

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod safety;

// Shared utilities
pub mod utils;

pub use config::ExportOptions;
pub use error::{ConfigError, DocumentError, ExportError, PipelineError};
pub use export::{ConversionReport, NupnExtractor};
pub use safety::{SafetyChecker, SafetyVerdict};

use document::{IndexCursor, StructuralIndex};

/// Convert the PNML file `input` into the NUPN file `output`.
///
/// No output file is left behind when this returns an error.
pub fn convert(
    input: &Path,
    output: &Path,
    options: &ExportOptions,
) -> Result<ConversionReport, ExportError> {
    let index = StructuralIndex::from_path(input)?;
    info!("Indexed {} elements", index.len());
    NupnExtractor::new(IndexCursor::new(&index), options).extract(output)
}

/// Decide whether the net in `input` is 1-safe using the configured `bounds` tool
pub fn check_safety(input: &Path, options: &ExportOptions) -> SafetyVerdict {
    SafetyChecker::new(options).check(input)
}
