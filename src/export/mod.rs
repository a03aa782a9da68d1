//! PNML to NUPN export.
//!
//! - `extractor.rs` - the phase-ordered extraction engine
//! - `writer.rs` - the three-stream writer pipeline
//! - `formatter.rs` - NUPN line rendering
//! - `interning.rs` - dense id allocation
//! - `invariants.rs` - initial-marking statistics checks

pub mod constants;
pub mod extractor;
pub mod formatter;
pub mod interning;
pub mod invariants;
pub mod paths;
pub mod writer;

pub use extractor::{ConversionReport, MarkedPlace, NupnExtractor, Phase};
pub use formatter::NupnFormatter;
pub use interning::IdTable;
pub use invariants::{check_marking_invariants, MarkingInvariants, MarkingSummary};
pub use writer::{StreamKind, WriterMessage, WriterPipeline};
