//! Operator entities and the per-kind parse/transform/convert contract.
//!
//! Every operator kind goes through the same lifecycle as tensors:
//! `parse` resolves its tensors through the registry and validates structure,
//! `transform` applies layout fixups (possibly splicing new operators into its
//! `pre`/`post` lists) and `convert` emits the target node.

pub mod conv;
pub mod reshape;
pub mod rewrite;
pub mod transpose;

use std::fmt;
use std::ops::RangeInclusive;

use tracing::debug;

pub use conv::{AutoPad, ConvAttrs};
pub use reshape::ReshapeAttrs;
pub use transpose::TransposeAttrs;

use crate::error::{ConvertError, Result};
use crate::graph::Graph;
use crate::source::BuiltinOperator;
use crate::status::Status;
use crate::target;
use crate::tensor::TensorId;

/// Stable handle of an operator inside its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

impl OpId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Operator kind together with its kind-specific attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Conv(ConvAttrs),
    Reshape(ReshapeAttrs),
    Transpose(TransposeAttrs),
}

impl OpKind {
    /// Kind for a source operator code, with default attributes.
    pub fn from_builtin(code: BuiltinOperator) -> Result<Self> {
        match code {
            BuiltinOperator::Conv2d => Ok(OpKind::Conv(ConvAttrs::default())),
            BuiltinOperator::Reshape => Ok(OpKind::Reshape(ReshapeAttrs::default())),
            other => Err(ConvertError::UnsupportedOperator {
                code: other.to_string(),
            }),
        }
    }

    /// Target operator type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            OpKind::Conv(_) => "Conv",
            OpKind::Reshape(_) => "Reshape",
            OpKind::Transpose(_) => "Transpose",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Operator {
    id: OpId,
    /// Position in the source operator list; `None` for synthesized operators.
    index: Option<usize>,
    pub(crate) name: String,
    pub(crate) kind: OpKind,
    pub(crate) inputs: Vec<TensorId>,
    pub(crate) outputs: Vec<TensorId>,
    pub(crate) pre: Vec<OpId>,
    pub(crate) post: Vec<OpId>,
    status: Status,
}

impl Operator {
    pub(crate) fn new(id: OpId, index: Option<usize>, kind: OpKind) -> Self {
        Operator {
            id,
            index,
            name: String::new(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            pre: Vec::new(),
            post: Vec::new(),
            status: Status::Inited,
        }
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_synthetic(&self) -> bool {
        self.index.is_none()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    /// Operators emitted immediately before this one.
    pub fn pre(&self) -> &[OpId] {
        &self.pre
    }

    /// Operators emitted immediately after this one.
    pub fn post(&self) -> &[OpId] {
        &self.post
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn set_parsed(&mut self) {
        self.status.advance(Status::Parsed);
    }

    /// Points the input slot holding `old` at `new`.
    pub(crate) fn replace_input(&mut self, old: TensorId, new: TensorId) {
        let slot = self
            .inputs
            .iter()
            .position(|&t| t == old)
            .unwrap_or_else(|| panic!("{old:?} is not an input of {}", self.name));
        self.inputs[slot] = new;
    }

    /// Points the output slot holding `old` at `new`.
    pub(crate) fn replace_output(&mut self, old: TensorId, new: TensorId) {
        let slot = self
            .outputs
            .iter()
            .position(|&t| t == old)
            .unwrap_or_else(|| panic!("{old:?} is not an output of {}", self.name));
        self.outputs[slot] = new;
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}({})#{}", self.type_name(), self.name, index),
            None => write!(f, "{}({})", self.type_name(), self.name),
        }
    }
}

/// Validates an operand count against the kind's accepted range.
pub(crate) fn check_arity(
    op: &'static str,
    index: usize,
    side: &'static str,
    accepted: RangeInclusive<usize>,
    actual: usize,
) -> Result<()> {
    if accepted.contains(&actual) {
        return Ok(());
    }
    let expected = if accepted.start() == accepted.end() {
        accepted.start().to_string()
    } else {
        format!("{}..={}", accepted.start(), accepted.end())
    };
    Err(ConvertError::Arity {
        op,
        index,
        side,
        expected,
        actual,
    })
}

/// Parses a source operator; a no-op for operators that are already parsed.
pub fn parse(graph: &mut Graph<'_>, op: OpId) -> Result<()> {
    if graph.op(op).status().is_parsed() {
        return Ok(());
    }
    debug!("Parsing {}...", graph.op(op).type_name());
    match graph.op(op).kind.clone() {
        OpKind::Conv(_) => conv::parse(graph, op),
        OpKind::Reshape(_) => reshape::parse(graph, op),
        OpKind::Transpose(_) => panic!("transpose operators are only synthesized"),
    }
}

/// Runs the kind-specific layout handling of a parsed operator.
pub fn transform(graph: &mut Graph<'_>, op: OpId) -> Result<()> {
    let status = graph.op(op).status();
    assert!(
        status.is_parsed(),
        "{} transformed before parse",
        graph.op(op)
    );
    if status.is_transformed() {
        return Ok(());
    }
    debug!("Transforming {}...", graph.op(op));
    match graph.op(op).kind.clone() {
        OpKind::Reshape(attrs) => reshape::transform(graph, op, &attrs)?,
        OpKind::Conv(_) | OpKind::Transpose(_) => {}
    }
    graph.op_mut(op).status.advance(Status::Transformed);
    Ok(())
}

/// Emits the target node for a parsed (and possibly transformed) operator.
pub fn convert(graph: &mut Graph<'_>, op: OpId) -> Result<target::Node> {
    let operator = graph.op(op);
    assert!(
        operator.status().is_parsed(),
        "{} converted before parse",
        operator
    );
    debug!("Converting {}...", operator);
    let names = |ids: &[TensorId]| -> Vec<String> {
        ids.iter()
            .map(|&id| graph.tensor(id).name().to_string())
            .collect()
    };
    let node = target::Node::new(
        &operator.name,
        operator.type_name(),
        names(&operator.inputs),
        names(&operator.outputs),
    );
    let node = match &operator.kind {
        OpKind::Conv(attrs) => conv::attributes(attrs, node),
        OpKind::Reshape(_) => node,
        OpKind::Transpose(attrs) => transpose::attributes(attrs, node),
    };
    target::check_node(&node)?;
    graph.op_mut(op).status.advance(Status::Converted);
    Ok(node)
}
