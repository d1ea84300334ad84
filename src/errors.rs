//! Unified error surface for the crate.
//!
//! Everything that can go wrong while rewriting source files or shuttling
//! replacements between processes is a [`RetellError`]. Usage errors (starting
//! a second session, comparing without a session) are deliberately *not* here:
//! those are caller bugs and panic instead of returning a `Result` that could
//! be silently dropped.

use std::path::Path;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// All recoverable failures of the rewrite and update machinery.
#[derive(Debug, Error, Diagnostic)]
pub enum RetellError {
    /// The target file is not parseable Rust.
    #[error("{file}: failed to parse source: {message}")]
    #[diagnostic(code(retell::parse_source))]
    ParseSource { file: String, message: String },

    /// A matched expectation call carries something other than a string
    /// literal in its literal slot.
    #[error("{file}: expectation argument is not a string literal")]
    #[diagnostic(
        code(retell::not_a_literal),
        help("the rewriter can only replace literal expectations; write the expected text inline")
    )]
    NotALiteral {
        file: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("this must be a string literal")]
        span: SourceSpan,
    },

    /// Recorded locations that no recognized expectation call accounts for.
    /// The whole file's batch is abandoned when this happens.
    #[error("{file}: no rewritable expectation call at lines {lines:?}")]
    #[diagnostic(code(retell::unmatched_lines))]
    UnmatchedLines { file: String, lines: Vec<u32> },

    #[error("{file}: failed to read source: {source}")]
    #[diagnostic(code(retell::read_source))]
    ReadSource {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}: failed to write rewritten source: {source}")]
    #[diagnostic(code(retell::write_back))]
    WriteBack {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// A malformed record in the replacement stream fed to the child process.
    #[error("replacement stream record {record} is malformed: {message}")]
    #[diagnostic(code(retell::bad_record))]
    BadRecord { record: usize, message: String },

    #[error("failed to spawn the rewriter child process: {source}")]
    #[diagnostic(code(retell::spawn_rewriter))]
    SpawnRewriter {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to stream replacements to the rewriter child: {source}")]
    #[diagnostic(code(retell::stream_records))]
    StreamRecords {
        #[source]
        source: std::io::Error,
    },
}

/// Lossy display form of a path for error messages.
pub(crate) fn display_path(path: &Path) -> String {
    path.display().to_string()
}
