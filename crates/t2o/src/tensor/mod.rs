//! Tensor entities tracked by the per-subgraph registry.

mod data;
mod dtype;

pub use data::TensorData;
pub use dtype::DType;

use std::fmt;

use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::layout::Layout;
use crate::ops::OpId;
use crate::source;
use crate::status::Status;
use crate::target;

/// Default quantization scale for tensors without quantization parameters.
pub const DEFAULT_SCALE: f32 = 1.0;
/// Default quantization zero point for tensors without quantization parameters.
pub const DEFAULT_ZERO_POINT: i64 = 127;

/// Stable handle of a tensor inside its [`TensorRegistry`](crate::registry::TensorRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub u32);

impl TensorId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A value flowing through the graph: runtime activation or constant initializer.
#[derive(Debug, Clone)]
pub struct Tensor {
    id: TensorId,
    name: String,
    /// Index in the source subgraph's tensor table; `None` for synthesized tensors.
    source_index: Option<usize>,
    pub shape: Vec<usize>,
    dtype: Option<DType>,
    is_initializer: bool,
    pub data: Option<TensorData>,
    pub scale: f32,
    pub zero_point: i64,
    layout: Option<Layout>,
    producers: Vec<OpId>,
    consumers: Vec<OpId>,
    status: Status,
}

impl Tensor {
    pub(crate) fn new(
        id: TensorId,
        name: impl Into<String>,
        source_index: Option<usize>,
        layout: Option<Layout>,
        is_initializer: bool,
    ) -> Self {
        Tensor {
            id,
            name: name.into(),
            source_index,
            shape: Vec::new(),
            dtype: None,
            is_initializer,
            data: None,
            scale: DEFAULT_SCALE,
            zero_point: DEFAULT_ZERO_POINT,
            layout,
            producers: Vec::new(),
            consumers: Vec::new(),
            status: Status::Inited,
        }
    }

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_index(&self) -> Option<usize> {
        self.source_index
    }

    /// Element type; panics if the tensor has not been parsed yet.
    pub fn dtype(&self) -> DType {
        self.dtype
            .unwrap_or_else(|| panic!("tensor <{}> has no element type yet", self.name))
    }

    pub fn try_dtype(&self) -> Option<DType> {
        self.dtype
    }

    /// Assigns the element type. A tensor's type may be assigned only once.
    pub fn set_dtype(&mut self, dtype: DType) {
        assert!(
            self.dtype.is_none(),
            "element type of <{}> assigned twice",
            self.name
        );
        self.dtype = Some(dtype);
    }

    /// Re-types an already typed tensor, re-casting initializer data to match.
    pub fn coerce_dtype(&mut self, dtype: DType) {
        assert!(
            self.dtype.is_some(),
            "cannot coerce untyped tensor <{}>",
            self.name
        );
        self.dtype = Some(dtype);
        if let Some(data) = self.data.as_mut() {
            *data = data.cast(dtype);
        }
    }

    pub fn is_initializer(&self) -> bool {
        self.is_initializer
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Tags a synthesized tensor with a layout before the transform pass runs.
    pub(crate) fn set_layout(&mut self, layout: Layout) {
        assert!(
            !self.status.is_transformed(),
            "layout of <{}> changed after transform",
            self.name
        );
        self.layout = Some(layout);
    }

    pub fn producers(&self) -> &[OpId] {
        &self.producers
    }

    pub fn consumers(&self) -> &[OpId] {
        &self.consumers
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements implied by `shape`.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn add_producer(&mut self, op: OpId) {
        if !self.producers.contains(&op) {
            self.producers.push(op);
        }
    }

    pub fn add_consumer(&mut self, op: OpId) {
        if !self.consumers.contains(&op) {
            self.consumers.push(op);
        }
    }

    pub fn remove_consumer(&mut self, op: OpId) {
        self.consumers.retain(|&consumer| consumer != op);
    }

    /// Swaps the producer edge `old` for `new`, keeping its position.
    pub fn replace_producer(&mut self, old: OpId, new: OpId) {
        replace_edge(&mut self.producers, old, new, &self.name, "producer");
    }

    /// Swaps the consumer edge `old` for `new`, keeping its position.
    pub fn replace_consumer(&mut self, old: OpId, new: OpId) {
        replace_edge(&mut self.consumers, old, new, &self.name, "consumer");
    }

    /// Quantized activations use the unsigned 8-bit type.
    pub fn is_quantized(&self) -> bool {
        self.dtype == Some(DType::Uint8)
    }

    /// Rank-0 constant with exactly one element and no layout.
    pub fn is_scalar(&self) -> bool {
        self.layout.is_none()
            && self.shape.is_empty()
            && self.data.as_ref().map_or(false, |data| data.len() == 1)
    }

    pub fn set_parsed(&mut self) {
        self.status.advance(Status::Parsed);
    }

    /// Populates shape, element type, quantization and (for initializers) data
    /// from the source model. A no-op once the tensor has been parsed.
    pub fn parse(&mut self, model: &source::Model, subgraph: &source::Subgraph) -> Result<()> {
        if self.status.is_parsed() {
            return Ok(());
        }
        let index = self
            .source_index
            .unwrap_or_else(|| panic!("synthesized tensor <{}> cannot be parsed", self.name));
        let desc = subgraph.tensor(index as i64)?;
        debug!("Parsing {}...", self.name);

        self.shape = desc
            .shape
            .iter()
            .map(|&dim| {
                usize::try_from(dim).map_err(|_| ConvertError::NegativeDimension {
                    tensor: self.name.clone(),
                    dim,
                    shape: desc.shape.clone(),
                })
            })
            .collect::<Result<_>>()?;

        let dtype =
            DType::from_source(desc.dtype).ok_or_else(|| ConvertError::UnsupportedDType {
                tensor: self.name.clone(),
                dtype: desc.dtype.to_string(),
            })?;
        self.set_dtype(dtype);

        if let Some(quant) = &desc.quantization {
            let count = quant.scale.len().max(quant.zero_point.len());
            if quant.scale.len() != 1 || quant.zero_point.len() != 1 {
                return Err(ConvertError::MultiElementQuantization {
                    tensor: self.name.clone(),
                    count,
                });
            }
            self.scale = quant.scale[0];
            self.zero_point = quant.zero_point[0];
        }

        let bytes = model.buffer_data(desc)?;
        if !bytes.is_empty() {
            self.is_initializer = true;
        }
        if self.is_initializer {
            if bytes.is_empty() {
                return Err(ConvertError::MissingData {
                    tensor: self.name.clone(),
                });
            }
            let data = TensorData::from_le_bytes(dtype, bytes).ok_or_else(|| {
                ConvertError::DataLengthMismatch {
                    tensor: self.name.clone(),
                    shape: self.shape.clone(),
                    expected: self.element_count(),
                    actual: bytes.len() / dtype.size_in_bytes(),
                }
            })?;
            if data.len() != self.element_count() {
                return Err(ConvertError::DataLengthMismatch {
                    tensor: self.name.clone(),
                    shape: self.shape.clone(),
                    expected: self.element_count(),
                    actual: data.len(),
                });
            }
            self.data = Some(data);
        }

        self.set_parsed();
        Ok(())
    }

    /// Applies the tensor's layout to its shape and, for initializers, its data.
    pub fn transform(&mut self) {
        assert!(
            self.status.is_parsed(),
            "tensor <{}> transformed before parse",
            self.name
        );
        if self.status.is_transformed() {
            return;
        }
        let layout = self
            .layout
            .clone()
            .unwrap_or_else(|| panic!("tensor <{}> has no layout to apply", self.name));
        if !layout.is_match() {
            debug!("Transforming {} with layout {}", self.name, layout);
            if let Some(data) = self.data.as_mut() {
                *data = data.permute(&layout, &self.shape);
            }
            self.shape = layout.transform(&self.shape);
        }
        self.status.advance(Status::Transformed);
    }

    /// Builds (and validates) the target representation of this tensor.
    pub fn convert(&mut self) -> Result<target::TensorNode> {
        assert!(
            self.status.is_parsed(),
            "tensor <{}> converted before parse",
            self.name
        );
        debug!("Converting {}...", self.name);
        let node = if self.is_initializer {
            let data = self.data.clone().ok_or_else(|| ConvertError::MissingData {
                tensor: self.name.clone(),
            })?;
            target::TensorNode::initializer(&self.name, self.dtype(), &self.shape, data)
        } else {
            target::TensorNode::value_info(&self.name, self.dtype(), &self.shape)
        };
        target::check_tensor(&node)?;
        self.status.advance(Status::Converted);
        Ok(node)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dtype {
            Some(dtype) => write!(f, "<{}>({},{:?})", self.name, dtype, self.shape),
            None => write!(f, "<{}>(?,{:?})", self.name, self.shape),
        }
    }
}

fn replace_edge(edges: &mut [OpId], old: OpId, new: OpId, tensor: &str, role: &str) {
    let slot = edges
        .iter()
        .position(|&op| op == old)
        .unwrap_or_else(|| panic!("{role} {old:?} is not attached to <{tensor}>"));
    edges[slot] = new;
}
