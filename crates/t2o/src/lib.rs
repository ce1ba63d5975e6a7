//! Conversion of channel-last (TFLite-style) model graphs into channel-first
//! (ONNX-style) graphs.
//!
//! Each source subgraph is loaded into a [`Graph`] that owns a tensor registry
//! and an operator arena. Conversion runs in three passes: `parse` builds
//! tensors and operators from the source model, `transform` applies layouts
//! and splices Transpose operators around layout-agnostic operators such as
//! Reshape, and `convert` emits the target graph.

pub mod config;
pub mod convert;
mod env;
pub mod error;
pub mod graph;
pub mod layout;
pub mod logging;
pub mod ops;
pub mod registry;
pub mod source;
pub mod status;
pub mod target;
pub mod tensor;

pub use config::{ConvertOptions, ExplicitLayout};
pub use convert::{convert_model, convert_subgraph};
pub use error::{ConvertError, Result};
pub use graph::Graph;
pub use layout::Layout;
pub use ops::{OpId, OpKind, Operator};
pub use registry::TensorRegistry;
pub use status::Status;
pub use tensor::{DType, Tensor, TensorData, TensorId};
