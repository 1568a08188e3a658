//! Error types shared across the engine.

use std::path::PathBuf;

use crate::document::NodeId;
use thiserror::Error;

/// Failures reported by the document model.
///
/// A failed operation never leaves a partial mutation behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// The position references a node that does not exist or is not a paragraph.
    #[error("invalid position: node {node} is not a paragraph of this document")]
    InvalidPosition {
        /// The offending node id.
        node: NodeId,
    },
    /// The offset (or index) lies outside the addressed node.
    #[error("offset {offset} out of range (length {len})")]
    OutOfRange {
        /// Requested offset.
        offset: usize,
        /// Length of the addressed node.
        len: usize,
    },
    /// A table would be nested deeper than the supported bound.
    #[error("table nesting depth {depth} exceeds the maximum of {max}")]
    UnsupportedNesting {
        /// Depth the operation would produce.
        depth: usize,
        /// Maximum supported depth.
        max: usize,
    },
    /// The range endpoints are not ordered or live in different containers.
    #[error("invalid range: {reason}")]
    InvalidRange {
        /// Short description of what is wrong.
        reason: &'static str,
    },
    /// Inserted text cannot live inside a single paragraph.
    #[error("invalid text: {reason}")]
    InvalidText {
        /// Short description of what is wrong.
        reason: &'static str,
    },
}

/// Markup parse failure with a 1-based source location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at {line}:{col}: {reason}")]
pub struct ParseError {
    /// 1-based line.
    pub line: usize,
    /// 1-based column (in characters).
    pub col: usize,
    /// Human readable reason.
    pub reason: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, col: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            col,
            reason: reason.into(),
        }
    }
}

/// Host measurement capability failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("text measurement failed: {0}")]
pub struct MeasureError(pub String);

/// Failures reported by the editing controller and the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// The underlying document rejected the command.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// Undo requested with an empty history.
    #[error("nothing to undo")]
    NothingToUndo,
    /// Redo requested with an empty redo stack.
    #[error("nothing to redo")]
    NothingToRedo,
    /// The document was mutated outside the controller; history was discarded.
    #[error("undo history is stale (document generation {found}, expected {expected})")]
    StaleHistory {
        /// Generation the history was recorded against.
        expected: u64,
        /// Current document generation.
        found: u64,
    },
    /// No pane with that id exists.
    #[error("unknown pane {0}")]
    UnknownPane(usize),
    /// The operation needs a non-empty selection.
    #[error("selection is empty")]
    EmptySelection,
    /// No questionable-range hint with that id exists.
    #[error("unknown hint {0}")]
    UnknownHint(u64),
    /// A search query could not be compiled.
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Search query errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// The provided regex pattern failed to compile.
    #[error("invalid regex: {0}")]
    InvalidRegex(String),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("failed to read config file {config_path:?}: {source}")]
    Read {
        /// File that was read.
        config_path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for [`crate::config::EditorConfig`].
    #[error("failed to parse config file {config_path:?}: {source}")]
    ParseFile {
        /// File that was parsed.
        config_path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// Configuration text is not valid TOML.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Serializing the configuration failed.
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// Writing the configuration file failed.
    #[error("failed to write config file {config_path:?}: {source}")]
    Write {
        /// File that was written.
        config_path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
