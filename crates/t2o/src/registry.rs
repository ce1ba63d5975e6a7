//! Per-subgraph tensor registry.
//!
//! The registry owns every [`Tensor`] of one subgraph and guarantees a single
//! instance per name, so producer/consumer edges recorded by different
//! operators land on the same entity. A new registry is created for every
//! subgraph; nothing is shared across subgraphs.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{ConvertError, Result};
use crate::layout::Layout;
use crate::source;
use crate::tensor::{DType, Tensor, TensorData, TensorId};

/// Prefix of every tensor and operator name invented during conversion.
pub const SYNTHETIC_PREFIX: &str = "TFLITE2ONNX";

#[derive(Debug, Default)]
pub struct TensorRegistry {
    tensors: Vec<Tensor>,
    by_name: HashMap<String, TensorId>,
    strict: bool,
}

impl TensorRegistry {
    /// Creates an empty registry. With `strict` set, a cache hit whose layout or
    /// initializer request disagrees with the registered tensor is an error;
    /// otherwise the disagreement is logged and ignored.
    pub fn new(strict: bool) -> Self {
        TensorRegistry {
            tensors: Vec::new(),
            by_name: HashMap::new(),
            strict,
        }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn tensor(&self, id: TensorId) -> &Tensor {
        &self.tensors[id.index()]
    }

    pub fn tensor_mut(&mut self, id: TensorId) -> &mut Tensor {
        &mut self.tensors[id.index()]
    }

    pub fn lookup(&self, name: &str) -> Option<TensorId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.tensors.iter()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = TensorId> {
        (0..self.tensors.len() as u32).map(TensorId)
    }

    fn insert(&mut self, name: &str, make: impl FnOnce(TensorId) -> Tensor) -> TensorId {
        let id = TensorId(self.tensors.len() as u32);
        self.tensors.push(make(id));
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Returns the tensor at `index` of the source subgraph, creating it on first use.
    ///
    /// `layout` and `is_initializer` only seed a newly created tensor; a cached
    /// tensor is returned unchanged.
    pub fn get(
        &mut self,
        subgraph: &source::Subgraph,
        index: i64,
        layout: Option<Layout>,
        is_initializer: bool,
    ) -> Result<TensorId> {
        let desc = subgraph.tensor(index)?;
        let Some(id) = self.lookup(&desc.name) else {
            let source_index = Some(index as usize);
            return Ok(self.insert(&desc.name, |id| {
                Tensor::new(id, &desc.name, source_index, layout, is_initializer)
            }));
        };

        self.check_cache_hit(id, layout.as_ref(), is_initializer)?;
        Ok(id)
    }

    fn check_cache_hit(
        &self,
        id: TensorId,
        layout: Option<&Layout>,
        is_initializer: bool,
    ) -> Result<()> {
        let tensor = self.tensor(id);
        if let Some(requested) = layout {
            if tensor.layout() != Some(requested) {
                let err = ConvertError::LayoutConflict {
                    tensor: tensor.name().to_string(),
                    registered: tensor.layout().cloned(),
                    requested: requested.clone(),
                };
                if self.strict {
                    return Err(err);
                }
                warn!("{err}; keeping the registered layout");
            }
        }
        if is_initializer && tensor.status().is_parsed() && !tensor.is_initializer() {
            let err = ConvertError::InitializerConflict {
                tensor: tensor.name().to_string(),
            };
            if self.strict {
                return Err(err);
            }
            warn!("{err}; keeping it as a runtime value");
        }
        Ok(())
    }

    /// Creates (or returns the cached) tensor `name` derived from `existing`.
    ///
    /// The new tensor inherits element type and quantization parameters but
    /// starts with an empty shape and no data; callers fill those in.
    pub fn get_with_ref(&mut self, existing: TensorId, name: &str, is_initializer: bool) -> TensorId {
        if let Some(id) = self.lookup(name) {
            return id;
        }
        let reference = self.tensor(existing);
        let dtype = reference.try_dtype();
        let (scale, zero_point) = (reference.scale, reference.zero_point);
        debug!("Deriving {} from {}", name, reference.name());
        self.insert(name, |id| {
            let mut tensor = Tensor::new(id, name, None, None, is_initializer);
            if let Some(dtype) = dtype {
                tensor.set_dtype(dtype);
            }
            tensor.scale = scale;
            tensor.zero_point = zero_point;
            tensor
        })
    }

    /// Rank-0 constant holding `value` cast to the element type of `reference`.
    ///
    /// Memoized by element type and value, so equal scalars are shared.
    pub fn create_scalar(&mut self, reference: TensorId, value: f64) -> TensorId {
        let dtype = self.tensor(reference).dtype();
        let name = format!("{SYNTHETIC_PREFIX}_Scalar_{}_{}", dtype.name(), value);
        if let Some(id) = self.lookup(&name) {
            return id;
        }
        self.insert(&name, |id| {
            let mut tensor = Tensor::new(id, &name, None, None, true);
            tensor.set_dtype(dtype);
            tensor.data = Some(TensorData::full(dtype, value, 1));
            tensor.set_parsed();
            tensor
        })
    }

    /// Rank-1 int64 constant named after `owner`, e.g. the target shape of a reshape.
    pub fn create_vector(&mut self, owner: &str, values: &[i64]) -> TensorId {
        let name = format!("{SYNTHETIC_PREFIX}_Vector_{owner}");
        if let Some(id) = self.lookup(&name) {
            return id;
        }
        self.insert(&name, |id| {
            let mut tensor = Tensor::new(id, &name, None, None, true);
            tensor.shape = vec![values.len()];
            tensor.set_dtype(DType::Int64);
            tensor.data = Some(TensorData::I64(values.to_vec()));
            tensor.set_parsed();
            tensor
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceDType, Subgraph, TensorDesc};

    fn subgraph() -> Subgraph {
        let desc = |name: &str| TensorDesc {
            name: name.to_string(),
            shape: vec![1, 4],
            dtype: SourceDType::Float32,
            buffer: 0,
            quantization: None,
        };
        Subgraph {
            name: None,
            tensors: vec![desc("a"), desc("b")],
            operators: Vec::new(),
            inputs: vec![0],
            outputs: vec![1],
        }
    }

    #[test]
    fn get_returns_identical_instance() {
        let sg = subgraph();
        let mut registry = TensorRegistry::new(true);
        let first = registry.get(&sg, 0, None, false).expect("first lookup");
        let second = registry.get(&sg, 0, None, false).expect("second lookup");
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_ne!(registry.get(&sg, 1, None, false).expect("other"), first);
    }

    #[test]
    fn cache_hit_ignores_missing_layout_request() {
        let sg = subgraph();
        let mut registry = TensorRegistry::new(true);
        let nhwc = Layout::new("NHWC", "NCHW");
        let id = registry.get(&sg, 0, Some(nhwc.clone()), false).expect("create");
        let hit = registry.get(&sg, 0, None, false).expect("hit");
        assert_eq!(id, hit);
        assert_eq!(registry.tensor(id).layout(), Some(&nhwc));
    }

    #[test]
    fn strict_registry_rejects_conflicting_layout() {
        let sg = subgraph();
        let mut registry = TensorRegistry::new(true);
        registry.get(&sg, 0, None, false).expect("create");
        let err = registry
            .get(&sg, 0, Some(Layout::new("NHWC", "NCHW")), false)
            .expect_err("conflict must be fatal");
        assert!(matches!(err, ConvertError::LayoutConflict { .. }));
    }

    #[test]
    fn lenient_registry_keeps_registered_layout() {
        let sg = subgraph();
        let mut registry = TensorRegistry::new(false);
        let id = registry.get(&sg, 0, None, false).expect("create");
        registry
            .get(&sg, 0, Some(Layout::new("NHWC", "NCHW")), false)
            .expect("conflict is only logged");
        assert!(registry.tensor(id).layout().is_none());
    }

    #[test]
    fn scalars_are_memoized_by_type_and_value() {
        let sg = subgraph();
        let mut registry = TensorRegistry::new(true);
        let reference = registry.get(&sg, 0, None, false).expect("create");
        registry.tensor_mut(reference).set_dtype(DType::Float);

        let one = registry.create_scalar(reference, 1.0);
        assert_eq!(registry.create_scalar(reference, 1.0), one);
        assert_ne!(registry.create_scalar(reference, 2.0), one);

        let scalar = registry.tensor(one);
        assert_eq!(scalar.name(), "TFLITE2ONNX_Scalar_float32_1");
        assert!(scalar.is_scalar());
        assert!(scalar.is_initializer());
        assert!(scalar.status().is_parsed());
        assert_eq!(scalar.data, Some(TensorData::F32(vec![1.0])));
    }

    #[test]
    fn derived_tensors_inherit_type_only() {
        let sg = subgraph();
        let mut registry = TensorRegistry::new(true);
        let base = registry.get(&sg, 0, None, false).expect("create");
        registry.tensor_mut(base).set_dtype(DType::Uint8);
        registry.tensor_mut(base).scale = 0.5;
        registry.tensor_mut(base).shape = vec![1, 4];

        let derived = registry.get_with_ref(base, "derived", false);
        assert_eq!(registry.get_with_ref(base, "derived", false), derived);
        let tensor = registry.tensor(derived);
        assert_eq!(tensor.dtype(), DType::Uint8);
        assert_eq!(tensor.scale, 0.5);
        assert!(tensor.shape.is_empty());
        assert!(tensor.source_index().is_none());
    }
}
