// Error types for the PNML to NUPN conversion
//
// Three families mirror the ways a run can go wrong:
// - DocumentError: the source document cannot be read, parsed or queried (fatal)
// - PipelineError: an output stream or its worker failed (fatal)
// - ConfigError: the options file cannot be loaded
//
// Consistency problems inside a readable document are not errors; they are
// logged and the conversion continues.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while reading, parsing or navigating the source document
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("I/O error on source document: {0}")]
    Io(#[from] io::Error),

    #[error("malformed XML at byte {position}: {message}")]
    Parse { position: u64, message: String },

    #[error("invalid query '{query}': {message}")]
    Query { query: String, message: String },

    #[error("no query selected on the cursor")]
    NoQuery,

    #[error("cursor position stack is empty")]
    EmptyStack,

    #[error("document has no root element")]
    EmptyDocument,

    #[error("no element matches '{query}'")]
    MissingElement { query: String },

    #[error("missing attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("invalid numeric value '{value}' in {context}")]
    InvalidNumber { value: String, context: String },
}

/// Failure in one of the output streams
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot open output file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{stream} stream is closed")]
    Closed { stream: &'static str },

    #[error("{stream} writer failed: {source}")]
    Worker {
        stream: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{stream} writer thread panicked")]
    Panicked { stream: &'static str },

    #[error("cannot spawn {stream} writer thread: {source}")]
    Spawn {
        stream: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Any fatal failure of a conversion run
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("I/O error while finalizing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure while loading [`crate::config::ExportOptions`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read options file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid options: {0}")]
    Parse(#[from] toml::de::Error),
}
