//! Element types of the target (channel-first) format.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::source::SourceDType;

/// Target element type; discriminants follow the target schema's numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float,
    Uint8,
    Int8,
    Int16,
    Int32,
    Int64,
    Bool,
    Float16,
    Double,
}

impl DType {
    /// Maps a source element type 1:1; `None` for types with no target counterpart.
    pub fn from_source(dtype: SourceDType) -> Option<Self> {
        match dtype {
            SourceDType::Float32 => Some(DType::Float),
            SourceDType::Float16 => Some(DType::Float16),
            SourceDType::Float64 => Some(DType::Double),
            SourceDType::Int32 => Some(DType::Int32),
            SourceDType::Int64 => Some(DType::Int64),
            SourceDType::Int16 => Some(DType::Int16),
            SourceDType::Int8 => Some(DType::Int8),
            SourceDType::Uint8 => Some(DType::Uint8),
            SourceDType::Bool => Some(DType::Bool),
            SourceDType::String | SourceDType::Complex64 => None,
        }
    }

    /// Numeric element-type tag written by the encoder.
    pub fn code(self) -> i32 {
        match self {
            DType::Float => 1,
            DType::Uint8 => 2,
            DType::Int8 => 3,
            DType::Int16 => 5,
            DType::Int32 => 6,
            DType::Int64 => 7,
            DType::Bool => 9,
            DType::Float16 => 10,
            DType::Double => 11,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(DType::Float),
            2 => Some(DType::Uint8),
            3 => Some(DType::Int8),
            5 => Some(DType::Int16),
            6 => Some(DType::Int32),
            7 => Some(DType::Int64),
            9 => Some(DType::Bool),
            10 => Some(DType::Float16),
            11 => Some(DType::Double),
            _ => None,
        }
    }

    /// Short lowercase name, stable across releases; used in synthetic tensor names.
    pub fn name(self) -> &'static str {
        match self {
            DType::Float => "float32",
            DType::Uint8 => "uint8",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Bool => "bool",
            DType::Float16 => "float16",
            DType::Double => "float64",
        }
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Uint8 | DType::Int8 | DType::Bool => 1,
            DType::Int16 | DType::Float16 => 2,
            DType::Float | DType::Int32 => 4,
            DType::Int64 | DType::Double => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
