//! Target (channel-first) model structures handed to the binary encoder.
//!
//! The protobuf encoder itself lives outside this crate; it consumes these
//! structures verbatim. [`check_tensor`], [`check_node`] and [`check_graph`]
//! enforce the well-formedness rules the encoder relies on.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::tensor::{DType, TensorData};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorNode {
    pub name: String,
    pub dtype: DType,
    pub dims: Vec<i64>,
    /// Present for initializers only.
    pub data: Option<TensorData>,
}

impl TensorNode {
    pub fn initializer(name: &str, dtype: DType, shape: &[usize], data: TensorData) -> Self {
        TensorNode {
            name: name.to_string(),
            dtype,
            dims: shape.iter().map(|&d| d as i64).collect(),
            data: Some(data),
        }
    }

    pub fn value_info(name: &str, dtype: DType, shape: &[usize]) -> Self {
        TensorNode {
            name: name.to_string(),
            dtype,
            dims: shape.iter().map(|&d| d as i64).collect(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Int(i64),
    Ints(Vec<i64>),
    Float(f32),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub op_type: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Node {
    pub fn new(name: &str, op_type: &str, inputs: Vec<String>, outputs: Vec<String>) -> Self {
        Node {
            name: name.to_string(),
            op_type: op_type.to_string(),
            inputs,
            outputs,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: AttributeValue) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub name: String,
    pub nodes: Vec<Node>,
    pub initializers: Vec<TensorNode>,
    pub inputs: Vec<TensorNode>,
    pub outputs: Vec<TensorNode>,
    pub value_infos: Vec<TensorNode>,
}

impl Graph {
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn op_types(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.op_type.as_str()).collect()
    }

    /// Looks a tensor up among initializers, inputs, outputs and value infos.
    pub fn tensor(&self, name: &str) -> Option<&TensorNode> {
        self.initializers
            .iter()
            .chain(&self.inputs)
            .chain(&self.outputs)
            .chain(&self.value_infos)
            .find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub ir_version: i64,
    pub opset_version: i64,
    pub producer_name: String,
    pub producer_version: String,
    pub graph: Graph,
}

impl Model {
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(src: &str) -> Result<Self> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn to_bincode_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bincode_slice(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn save_bincode<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_bincode_bytes()?)?;
        Ok(())
    }
}

/// Validates a tensor node: named, non-negative dims, and data consistent with dims and type.
pub fn check_tensor(tensor: &TensorNode) -> Result<()> {
    if tensor.name.is_empty() {
        return Err(ConvertError::validation("<unnamed>", "tensor has no name"));
    }
    if let Some(dim) = tensor.dims.iter().find(|&&d| d < 0) {
        return Err(ConvertError::validation(
            &tensor.name,
            format!("negative dimension {dim}"),
        ));
    }
    if let Some(data) = &tensor.data {
        if data.dtype() != tensor.dtype {
            return Err(ConvertError::validation(
                &tensor.name,
                format!("data holds {} but tensor is {}", data.dtype(), tensor.dtype),
            ));
        }
        let expected: i64 = tensor.dims.iter().product();
        if data.len() as i64 != expected {
            return Err(ConvertError::validation(
                &tensor.name,
                format!(
                    "{} elements do not fill dims {:?}",
                    data.len(),
                    tensor.dims
                ),
            ));
        }
    }
    Ok(())
}

pub fn check_node(node: &Node) -> Result<()> {
    if node.op_type.is_empty() {
        return Err(ConvertError::validation(&node.name, "node has no op type"));
    }
    if node.outputs.is_empty() || node.outputs.iter().any(String::is_empty) {
        return Err(ConvertError::validation(
            &node.name,
            "node outputs must be named",
        ));
    }
    Ok(())
}

/// Checks that nodes are topologically ordered and every output is defined exactly once.
pub fn check_graph(graph: &Graph) -> Result<()> {
    let mut defined: HashSet<&str> = graph
        .initializers
        .iter()
        .chain(&graph.inputs)
        .map(|t| t.name.as_str())
        .collect();
    for node in &graph.nodes {
        check_node(node)?;
        for input in node.inputs.iter().filter(|name| !name.is_empty()) {
            if !defined.contains(input.as_str()) {
                return Err(ConvertError::validation(
                    &node.name,
                    format!("input {input} is used before it is defined"),
                ));
            }
        }
        for output in &node.outputs {
            if !defined.insert(output.as_str()) {
                return Err(ConvertError::validation(
                    &node.name,
                    format!("output {output} is defined more than once"),
                ));
            }
        }
    }
    for output in &graph.outputs {
        if !defined.contains(output.name.as_str()) {
            return Err(ConvertError::validation(
                &output.name,
                "graph output is never produced",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_tensor_rejects_short_data() {
        let tensor = TensorNode {
            name: "w".into(),
            dtype: DType::Float,
            dims: vec![2, 2],
            data: Some(TensorData::F32(vec![0.0; 3])),
        };
        let err = check_tensor(&tensor).expect_err("length mismatch");
        assert!(err.to_string().contains("do not fill"));
    }

    #[test]
    fn check_tensor_rejects_type_mismatch() {
        let tensor = TensorNode::initializer("s", DType::Int64, &[2], TensorData::I32(vec![1, 2]));
        assert!(check_tensor(&tensor).is_err());
    }

    #[test]
    fn check_graph_requires_topological_order() {
        let x = TensorNode::value_info("x", DType::Float, &[1]);
        let graph = Graph {
            name: "g".into(),
            nodes: vec![
                Node::new("b", "Relu", vec!["a".into()], vec!["b".into()]),
                Node::new("a", "Relu", vec!["x".into()], vec!["a".into()]),
            ],
            initializers: Vec::new(),
            inputs: vec![x],
            outputs: Vec::new(),
            value_infos: Vec::new(),
        };
        assert!(check_graph(&graph).is_err());
    }
}
