//! Dense, typed initializer buffers.

use half::f16;
use serde::{Deserialize, Serialize};

use super::dtype::DType;
use crate::layout::Layout;

/// Flat row-major buffer holding the constant value of an initializer tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    F32(Vec<f32>),
    F16(Vec<f16>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
}

/// Applies `$body` to the inner vector and rewraps the result in the same variant.
macro_rules! map_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            TensorData::F32($v) => TensorData::F32($body),
            TensorData::F16($v) => TensorData::F16($body),
            TensorData::F64($v) => TensorData::F64($body),
            TensorData::U8($v) => TensorData::U8($body),
            TensorData::I8($v) => TensorData::I8($body),
            TensorData::I16($v) => TensorData::I16($body),
            TensorData::I32($v) => TensorData::I32($body),
            TensorData::I64($v) => TensorData::I64($body),
            TensorData::Bool($v) => TensorData::Bool($body),
        }
    };
}

macro_rules! with_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            TensorData::F32($v) => $body,
            TensorData::F16($v) => $body,
            TensorData::F64($v) => $body,
            TensorData::U8($v) => $body,
            TensorData::I8($v) => $body,
            TensorData::I16($v) => $body,
            TensorData::I32($v) => $body,
            TensorData::I64($v) => $body,
            TensorData::Bool($v) => $body,
        }
    };
}

fn chunks<const N: usize>(bytes: &[u8]) -> impl Iterator<Item = [u8; N]> + '_ {
    bytes.chunks_exact(N).map(|chunk| {
        let mut raw = [0u8; N];
        raw.copy_from_slice(chunk);
        raw
    })
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::Float,
            TensorData::F16(_) => DType::Float16,
            TensorData::F64(_) => DType::Double,
            TensorData::U8(_) => DType::Uint8,
            TensorData::I8(_) => DType::Int8,
            TensorData::I16(_) => DType::Int16,
            TensorData::I32(_) => DType::Int32,
            TensorData::I64(_) => DType::Int64,
            TensorData::Bool(_) => DType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        with_data!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reinterprets little-endian bytes as a dense array of `dtype`.
    ///
    /// Returns `None` when the byte count is not a multiple of the element size.
    pub fn from_le_bytes(dtype: DType, bytes: &[u8]) -> Option<Self> {
        if bytes.len() % dtype.size_in_bytes() != 0 {
            return None;
        }
        let data = match dtype {
            DType::Float => TensorData::F32(chunks(bytes).map(f32::from_le_bytes).collect()),
            DType::Float16 => TensorData::F16(chunks(bytes).map(f16::from_le_bytes).collect()),
            DType::Double => TensorData::F64(chunks(bytes).map(f64::from_le_bytes).collect()),
            DType::Uint8 => TensorData::U8(bytes.to_vec()),
            DType::Int8 => TensorData::I8(bytes.iter().map(|&b| b as i8).collect()),
            DType::Int16 => TensorData::I16(chunks(bytes).map(i16::from_le_bytes).collect()),
            DType::Int32 => TensorData::I32(chunks(bytes).map(i32::from_le_bytes).collect()),
            DType::Int64 => TensorData::I64(chunks(bytes).map(i64::from_le_bytes).collect()),
            DType::Bool => TensorData::Bool(bytes.iter().map(|&b| b != 0).collect()),
        };
        Some(data)
    }

    /// Builds an integer-valued buffer of `dtype` (truncating casts).
    pub fn from_i64s(dtype: DType, values: &[i64]) -> Self {
        match dtype {
            DType::Float => TensorData::F32(values.iter().map(|&v| v as f32).collect()),
            DType::Float16 => {
                TensorData::F16(values.iter().map(|&v| f16::from_f64(v as f64)).collect())
            }
            DType::Double => TensorData::F64(values.iter().map(|&v| v as f64).collect()),
            DType::Uint8 => TensorData::U8(values.iter().map(|&v| v as u8).collect()),
            DType::Int8 => TensorData::I8(values.iter().map(|&v| v as i8).collect()),
            DType::Int16 => TensorData::I16(values.iter().map(|&v| v as i16).collect()),
            DType::Int32 => TensorData::I32(values.iter().map(|&v| v as i32).collect()),
            DType::Int64 => TensorData::I64(values.to_vec()),
            DType::Bool => TensorData::Bool(values.iter().map(|&v| v != 0).collect()),
        }
    }

    /// Builds a buffer of `dtype` from floating values (saturating `as` casts for integers).
    pub fn from_f64s(dtype: DType, values: &[f64]) -> Self {
        match dtype {
            DType::Float => TensorData::F32(values.iter().map(|&v| v as f32).collect()),
            DType::Float16 => TensorData::F16(values.iter().map(|&v| f16::from_f64(v)).collect()),
            DType::Double => TensorData::F64(values.to_vec()),
            DType::Uint8 => TensorData::U8(values.iter().map(|&v| v as u8).collect()),
            DType::Int8 => TensorData::I8(values.iter().map(|&v| v as i8).collect()),
            DType::Int16 => TensorData::I16(values.iter().map(|&v| v as i16).collect()),
            DType::Int32 => TensorData::I32(values.iter().map(|&v| v as i32).collect()),
            DType::Int64 => TensorData::I64(values.iter().map(|&v| v as i64).collect()),
            DType::Bool => TensorData::Bool(values.iter().map(|&v| v != 0.0).collect()),
        }
    }

    /// `len` copies of `value` cast to `dtype`.
    pub fn full(dtype: DType, value: f64, len: usize) -> Self {
        Self::from_f64s(dtype, &vec![value; len])
    }

    /// Integer view of the values, `None` for floating buffers.
    pub fn to_i64s(&self) -> Option<Vec<i64>> {
        let values = match self {
            TensorData::U8(v) => v.iter().map(|&x| x as i64).collect(),
            TensorData::I8(v) => v.iter().map(|&x| x as i64).collect(),
            TensorData::I16(v) => v.iter().map(|&x| x as i64).collect(),
            TensorData::I32(v) => v.iter().map(|&x| x as i64).collect(),
            TensorData::I64(v) => v.clone(),
            TensorData::Bool(v) => v.iter().map(|&x| x as i64).collect(),
            TensorData::F32(_) | TensorData::F16(_) | TensorData::F64(_) => return None,
        };
        Some(values)
    }

    fn to_f64s(&self) -> Vec<f64> {
        match self {
            TensorData::F32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::F16(v) => v.iter().map(|x| x.to_f64()).collect(),
            TensorData::F64(v) => v.clone(),
            integer => integer
                .to_i64s()
                .unwrap_or_default()
                .into_iter()
                .map(|x| x as f64)
                .collect(),
        }
    }

    /// Re-casts every element to `dtype`; integer sources keep exact values where representable.
    pub fn cast(&self, dtype: DType) -> Self {
        if self.dtype() == dtype {
            return self.clone();
        }
        match self.to_i64s() {
            Some(values) => Self::from_i64s(dtype, &values),
            None => Self::from_f64s(dtype, &self.to_f64s()),
        }
    }

    /// Permutes the buffer (laid out as `shape`) into `layout`'s target ordering.
    pub fn permute(&self, layout: &Layout, shape: &[usize]) -> Self {
        map_data!(self, v => layout.transform_data(v, shape))
    }

    /// Reorders the values themselves, treating the buffer as a shape vector.
    pub fn reorder(&self, layout: &Layout) -> Self {
        map_data!(self, v => layout.transform(v))
    }
}
