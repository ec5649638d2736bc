//! Error types for the compute runtime
//!
//! Each concern owns a small error enum. `RuntimeError` aggregates them for callers
//! that drive several subsystems at once (the particle system, the demo binary).

use thiserror::Error;

use crate::gpu::layout::Encoding;
use crate::memory::BufferKind;

/// Errors raised while declaring a shared host/device layout
#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("layout '{0}' declares no fields")]
    Empty(String),

    #[error("layout '{0}' is already defined")]
    Duplicate(String),

    #[error("layout '{layout}' declares field '{field}' twice")]
    DuplicateField { layout: String, field: String },

    #[error("field '{field}': encoding {encoding:?} cannot hold {width} component(s)")]
    IncompatibleWidth {
        field: String,
        encoding: Encoding,
        width: u32,
    },

    #[error("field '{field}': fixed-size arrays need at least one element")]
    EmptyArray { field: String },

    #[error("unknown layout id {0}")]
    UnknownLayout(usize),

    #[error(transparent)]
    Snippet(#[from] SnippetError),
}

/// Errors raised while converting between packed and unpacked layout values
#[derive(Debug, Error, PartialEq)]
pub enum PackError {
    #[error("layout '{layout}' expects {expected} values, got {actual}")]
    FieldCount {
        layout: String,
        expected: usize,
        actual: usize,
    },

    #[error("field '{field}' expects {expected}")]
    ValueShape { field: String, expected: String },

    #[error("packed data too short: need {needed} words, got {actual}")]
    Truncated { needed: usize, actual: usize },
}

/// Errors raised by the snippet composition graph
#[derive(Debug, Error, PartialEq)]
pub enum SnippetError {
    #[error("snippet '{0}' is already registered")]
    Duplicate(String),

    #[error("unknown snippet '{0}'")]
    Unknown(String),
}

/// Errors raised by the buffer manager
#[derive(Debug, Error, PartialEq)]
pub enum BufferError {
    #[error("buffer handle {0} does not refer to a live buffer")]
    Unknown(u32),

    #[error("temporary buffer from frame {allocated} used after reset (current frame {current})")]
    StaleTemporary { allocated: u32, current: u32 },

    #[error("{0:?} buffers are not host visible")]
    NotHostVisible(BufferKind),

    #[error("{0:?} buffers cannot be freed explicitly")]
    NotFreeable(BufferKind),

    #[error("write of {len} bytes at offset {offset} exceeds buffer size {size}")]
    OutOfRange { offset: u64, len: u64, size: u64 },
}

/// Errors raised by the device sort
#[derive(Debug, Error, PartialEq)]
pub enum SortError {
    #[error("key {index} is the padding sentinel 0x{key:08x}; keys must be below it")]
    ReservedKey { index: usize, key: u32 },

    #[error("{keys} keys but {values} values")]
    LengthMismatch { keys: usize, values: usize },
}

/// Errors reported by a device when building a program
///
/// These are authoring defects; the executor treats them as fatal.
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("program '{0}' has no executable entry on this device")]
    MissingEntry(String),

    #[error("program '{program}' rejected: {log}")]
    Rejected { program: String, log: String },
}

/// Errors raised while loading runtime configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Umbrella error for operations spanning several subsystems
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Snippet(#[from] SnippetError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Sort(#[from] SortError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
