//! Conversion options.

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::{ConvertError, Result};
use crate::layout::Layout;

pub const DEFAULT_OPSET_VERSION: i64 = 13;
pub const DEFAULT_IR_VERSION: i64 = 7;

/// Layout to assume for a named tensor, e.g. `{"source": "NHWC", "target": "NCHW"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplicitLayout {
    pub source: String,
    pub target: String,
}

impl ExplicitLayout {
    pub fn new(source: &str, target: &str) -> Self {
        ExplicitLayout {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    pub fn to_layout(&self, tensor: &str) -> Result<Layout> {
        Layout::try_new(&self.source, &self.target).map_err(|reason| ConvertError::Validation {
            name: tensor.to_string(),
            reason,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Tensors whose layout is known up front, typically graph inputs and outputs.
    pub explicit_layouts: BTreeMap<String, ExplicitLayout>,
    /// Treat conflicting registry lookups as errors instead of warnings.
    pub strict_registry: bool,
    pub opset_version: i64,
    pub ir_version: i64,
    pub producer_name: String,
    pub producer_version: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            explicit_layouts: BTreeMap::new(),
            strict_registry: env::strict_registry_enabled(),
            opset_version: DEFAULT_OPSET_VERSION,
            ir_version: DEFAULT_IR_VERSION,
            producer_name: env!("CARGO_PKG_NAME").to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_explicit_layout(mut self, tensor: &str, source: &str, target: &str) -> Self {
        self.explicit_layouts
            .insert(tensor.to_string(), ExplicitLayout::new(source, target));
        self
    }

    pub fn with_strict_registry(mut self, strict: bool) -> Self {
        self.strict_registry = strict;
        self
    }

    pub fn with_opset_version(mut self, opset: i64) -> Self {
        self.opset_version = opset;
        self
    }

    pub fn from_json_str(src: &str) -> Result<Self> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
