//! Error type shared by every conversion stage.
//!
//! Input-driven failures (unsupported element types, malformed operators,
//! target validation) surface as [`ConvertError`] and abort the conversion of
//! the whole model. Violations of internal graph invariants panic instead.

use std::io;

use thiserror::Error;

use crate::layout::Layout;

pub type Result<T> = std::result::Result<T, ConvertError>;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("tensor <{tensor}> uses element type {dtype} which has no target counterpart")]
    UnsupportedDType { tensor: String, dtype: String },

    #[error("tensor <{tensor}> carries {count} quantization parameters; only per-tensor quantization is supported")]
    MultiElementQuantization { tensor: String, count: usize },

    #[error("tensor <{tensor}> has negative dimension {dim} in shape {shape:?}")]
    NegativeDimension {
        tensor: String,
        dim: i64,
        shape: Vec<i64>,
    },

    #[error("tensor index {index} is out of range for a subgraph with {count} tensors")]
    TensorIndexOutOfRange { index: i64, count: usize },

    #[error("buffer index {index} of tensor <{tensor}> is out of range")]
    BufferIndexOutOfRange { tensor: String, index: usize },

    #[error("initializer <{tensor}> has no data")]
    MissingData { tensor: String },

    #[error("initializer <{tensor}> holds {actual} elements but its shape {shape:?} implies {expected}")]
    DataLengthMismatch {
        tensor: String,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("operator code {code} is not supported")]
    UnsupportedOperator { code: String },

    #[error("operator {op} (#{index}) expects {expected} {side}, found {actual}")]
    Arity {
        op: &'static str,
        index: usize,
        side: &'static str,
        expected: String,
        actual: usize,
    },

    #[error("operator {op} (#{index}) is unsupported: {reason}")]
    UnsupportedAttribute {
        op: &'static str,
        index: usize,
        reason: String,
    },

    #[error("tensor <{tensor}> is registered with layout {registered:?} but a consumer requested {requested}")]
    LayoutConflict {
        tensor: String,
        registered: Option<Layout>,
        requested: Layout,
    },

    #[error("tensor <{tensor}> was registered as a runtime value but is requested as an initializer")]
    InitializerConflict { tensor: String },

    #[error("requires layout description for <{tensor}>")]
    MissingLayout { tensor: String },

    #[error("explicit layout names tensor <{tensor}> which is not part of the subgraph")]
    UnknownTensor { tensor: String },

    #[error("model has {count} subgraphs; exactly one is supported")]
    SubgraphCount { count: usize },

    #[error("target validation failed for <{name}>: {reason}")]
    Validation { name: String, reason: String },

    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ConvertError {
    pub fn validation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConvertError::Validation {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
