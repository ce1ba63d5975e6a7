//! In-memory view of a decoded source (channel-last) model.
//!
//! The binary decoder is an external collaborator; it hands the converter this
//! typed structure with operator codes, raw buffers, tensors and operators
//! exactly as they appear in the flatbuffer. The structure is serde-friendly
//! so fixtures can be kept as JSON.

use std::{fmt, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Element types of the source format, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceDType {
    Float32,
    Float16,
    Int32,
    Uint8,
    Int64,
    String,
    Bool,
    Int16,
    Complex64,
    Int8,
    Float64,
}

impl fmt::Display for SourceDType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Builtin operator codes referenced by the operator-code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinOperator {
    Conv2d,
    Reshape,
    /// Any code this converter has no operator kind for.
    Other(i32),
}

impl fmt::Display for BuiltinOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuiltinOperator::Other(code) => write!(f, "builtin#{code}"),
            known => write!(f, "{:?}", known),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Buffer {
    #[serde(default)]
    pub data: Vec<u8>,
}

/// Affine quantization parameters; the converter only accepts one element per tensor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quantization {
    pub scale: Vec<f32>,
    pub zero_point: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDesc {
    pub name: String,
    pub shape: Vec<i64>,
    pub dtype: SourceDType,
    /// Index into [`Model::buffers`]; buffer `0` is the conventional empty sentinel.
    #[serde(default)]
    pub buffer: usize,
    #[serde(default)]
    pub quantization: Option<Quantization>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    Same,
    Valid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActivationFunction {
    #[default]
    None,
    Relu,
    ReluN1To1,
    Relu6,
    Tanh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2dOptions {
    pub padding: Padding,
    pub stride_w: u32,
    pub stride_h: u32,
    #[serde(default = "unit_factor")]
    pub dilation_w_factor: u32,
    #[serde(default = "unit_factor")]
    pub dilation_h_factor: u32,
    #[serde(default)]
    pub fused_activation_function: ActivationFunction,
}

fn unit_factor() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReshapeOptions {
    #[serde(default)]
    pub new_shape: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum BuiltinOptions {
    #[default]
    None,
    Conv2d(Conv2dOptions),
    Reshape(ReshapeOptions),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDesc {
    pub opcode_index: usize,
    /// Tensor indices; `-1` marks an omitted optional input.
    pub inputs: Vec<i64>,
    pub outputs: Vec<i64>,
    #[serde(default)]
    pub options: BuiltinOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    #[serde(default)]
    pub name: Option<String>,
    pub tensors: Vec<TensorDesc>,
    pub operators: Vec<OperatorDesc>,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

impl Subgraph {
    /// Resolves a tensor index as stored in operator input/output lists.
    pub fn tensor(&self, index: i64) -> Result<&TensorDesc> {
        usize::try_from(index)
            .ok()
            .and_then(|idx| self.tensors.get(idx))
            .ok_or(ConvertError::TensorIndexOutOfRange {
                index,
                count: self.tensors.len(),
            })
    }

    /// Index of the tensor with the given name, if any.
    pub fn tensor_index(&self, name: &str) -> Option<usize> {
        self.tensors.iter().position(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub description: Option<String>,
    pub operator_codes: Vec<BuiltinOperator>,
    pub buffers: Vec<Buffer>,
    pub subgraphs: Vec<Subgraph>,
}

impl Model {
    pub fn from_json_str(src: &str) -> Result<Self> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Builtin code of the operator, resolved through the operator-code table.
    pub fn opcode(&self, op: &OperatorDesc) -> BuiltinOperator {
        self.operator_codes
            .get(op.opcode_index)
            .copied()
            .unwrap_or(BuiltinOperator::Other(-1))
    }

    /// Raw little-endian bytes backing a tensor; empty for runtime tensors.
    pub fn buffer_data(&self, tensor: &TensorDesc) -> Result<&[u8]> {
        self.buffers
            .get(tensor.buffer)
            .map(|buffer| buffer.data.as_slice())
            .ok_or_else(|| ConvertError::BufferIndexOutOfRange {
                tensor: tensor.name.clone(),
                index: tensor.buffer,
            })
    }
}
