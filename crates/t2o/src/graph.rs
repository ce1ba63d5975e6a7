//! Per-subgraph conversion context.
//!
//! A [`Graph`] owns the tensor registry and the operator arena for one source
//! subgraph. Tensors and operators refer to each other through [`TensorId`] and
//! [`OpId`] handles, so rewiring during layout fixups is plain index
//! bookkeeping.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info};

use crate::config::ExplicitLayout;
use crate::error::{ConvertError, Result};
use crate::layout::Layout;
use crate::ops::{self, OpId, OpKind, Operator};
use crate::registry::TensorRegistry;
use crate::source;
use crate::status::Status;
use crate::target;
use crate::tensor::{Tensor, TensorId};

pub struct Graph<'m> {
    model: &'m source::Model,
    subgraph: &'m source::Subgraph,
    registry: TensorRegistry,
    ops: Vec<Operator>,
    /// Operators of the source subgraph, in source order.
    order: Vec<OpId>,
    /// Operators synthesized while parsing or transforming.
    created: Vec<OpId>,
    inputs: Vec<TensorId>,
    outputs: Vec<TensorId>,
}

impl<'m> Graph<'m> {
    pub fn new(model: &'m source::Model, subgraph: &'m source::Subgraph, strict: bool) -> Self {
        Graph {
            model,
            subgraph,
            registry: TensorRegistry::new(strict),
            ops: Vec::new(),
            order: Vec::new(),
            created: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn model(&self) -> &'m source::Model {
        self.model
    }

    pub fn subgraph(&self) -> &'m source::Subgraph {
        self.subgraph
    }

    pub fn registry(&self) -> &TensorRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TensorRegistry {
        &mut self.registry
    }

    pub fn tensor(&self, id: TensorId) -> &Tensor {
        self.registry.tensor(id)
    }

    pub fn tensor_mut(&mut self, id: TensorId) -> &mut Tensor {
        self.registry.tensor_mut(id)
    }

    /// Looks a tensor up by name.
    pub fn tensor_named(&self, name: &str) -> Option<&Tensor> {
        self.registry.lookup(name).map(|id| self.tensor(id))
    }

    pub fn op(&self, id: OpId) -> &Operator {
        &self.ops[id.index()]
    }

    pub fn op_mut(&mut self, id: OpId) -> &mut Operator {
        &mut self.ops[id.index()]
    }

    /// Source operators in source order.
    pub fn source_ops(&self) -> &[OpId] {
        &self.order
    }

    /// Operators created during parse/transform, in creation order.
    pub fn created_ops(&self) -> &[OpId] {
        &self.created
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    /// Source descriptor of a non-synthetic operator.
    pub(crate) fn source_op(&self, op: OpId) -> &'m source::OperatorDesc {
        let index = self
            .op(op)
            .index()
            .unwrap_or_else(|| panic!("{} has no source counterpart", self.op(op)));
        &self.subgraph.operators[index]
    }

    fn add_op(&mut self, index: Option<usize>, kind: OpKind) -> OpId {
        let id = OpId(self.ops.len() as u32);
        self.ops.push(Operator::new(id, index, kind));
        id
    }

    /// Adds an operator with no source counterpart and records it in the
    /// created-operator list. Callers wire its tensors and mark it parsed.
    pub(crate) fn add_synthetic_op(&mut self, kind: OpKind, name: String) -> OpId {
        let id = self.add_op(None, kind);
        self.op_mut(id).name = name;
        self.created.push(id);
        id
    }

    /// Resolves input `slot` of a source operator, registering the operator as its consumer.
    pub(crate) fn parse_input(
        &mut self,
        op: OpId,
        slot: usize,
        layout: Option<Layout>,
        is_initializer: bool,
    ) -> Result<TensorId> {
        let index = self.source_op(op).inputs[slot];
        let id = self
            .registry
            .get(self.subgraph, index, layout, is_initializer)?;
        self.registry
            .tensor_mut(id)
            .parse(self.model, self.subgraph)?;
        self.registry.tensor_mut(id).add_consumer(op);
        self.op_mut(op).inputs.push(id);
        Ok(id)
    }

    /// Resolves output `slot` of a source operator, registering the operator as its producer.
    pub(crate) fn parse_output(
        &mut self,
        op: OpId,
        slot: usize,
        layout: Option<Layout>,
    ) -> Result<TensorId> {
        let index = self.source_op(op).outputs[slot];
        let id = self.registry.get(self.subgraph, index, layout, false)?;
        self.registry
            .tensor_mut(id)
            .parse(self.model, self.subgraph)?;
        self.registry.tensor_mut(id).add_producer(op);
        self.op_mut(op).outputs.push(id);
        Ok(id)
    }

    /// Registers tensors whose layout is known before any operator is parsed.
    pub fn apply_explicit_layouts(
        &mut self,
        layouts: &BTreeMap<String, ExplicitLayout>,
    ) -> Result<()> {
        for (name, explicit) in layouts {
            let index = self
                .subgraph
                .tensor_index(name)
                .ok_or_else(|| ConvertError::UnknownTensor {
                    tensor: name.clone(),
                })?;
            let layout = explicit.to_layout(name)?;
            debug!("Explicit layout {} for {}", layout, name);
            let rank = layout.rank();
            let id = self
                .registry
                .get(self.subgraph, index as i64, Some(layout), false)?;
            let tensor = self.registry.tensor_mut(id);
            tensor.parse(self.model, self.subgraph)?;
            if tensor.rank() != rank {
                return Err(ConvertError::validation(
                    name.as_str(),
                    format!(
                        "rank-{} layout cannot tag a rank-{} tensor",
                        rank,
                        tensor.rank()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Parses every source operator in order, then the subgraph's inputs and outputs.
    pub fn parse(&mut self) -> Result<()> {
        let subgraph = self.subgraph;
        for (index, desc) in subgraph.operators.iter().enumerate() {
            let kind = OpKind::from_builtin(self.model.opcode(desc))?;
            let id = self.add_op(Some(index), kind);
            ops::parse(self, id)?;
            self.order.push(id);
        }
        self.inputs = self.resolve_boundary(&subgraph.inputs)?;
        self.outputs = self.resolve_boundary(&subgraph.outputs)?;
        Ok(())
    }

    fn resolve_boundary(&mut self, indices: &[usize]) -> Result<Vec<TensorId>> {
        let (model, subgraph) = (self.model, self.subgraph);
        indices
            .iter()
            .map(|&index| {
                let id = self.registry.get(subgraph, index as i64, None, false)?;
                self.registry.tensor_mut(id).parse(model, subgraph)?;
                Ok(id)
            })
            .collect()
    }

    /// Applies tensor layouts, then runs every operator's layout handling.
    ///
    /// Tensors are permuted first so that operators splicing in conversion
    /// nodes see the target-ordered shapes of their neighbours.
    pub fn transform(&mut self) -> Result<()> {
        let pending: Vec<TensorId> = self
            .registry
            .ids()
            .filter(|&id| {
                let tensor = self.tensor(id);
                tensor.layout().is_some() && tensor.status() == Status::Parsed
            })
            .collect();
        for id in pending {
            self.tensor_mut(id).transform();
        }

        let existing: Vec<OpId> = (0..self.ops.len() as u32).map(OpId).collect();
        for op in existing {
            ops::transform(self, op)?;
        }
        Ok(())
    }

    /// Final linear operator order: each source operator surrounded by its `pre`
    /// and `post` operators.
    pub fn emission_order(&self) -> Vec<OpId> {
        let mut order = Vec::with_capacity(self.ops.len());
        for &op in &self.order {
            self.flatten_into(op, &mut order);
        }
        order
    }

    fn flatten_into(&self, op: OpId, order: &mut Vec<OpId>) {
        let operator = self.op(op);
        for &pre in operator.pre() {
            self.flatten_into(pre, order);
        }
        order.push(op);
        for &post in operator.post() {
            self.flatten_into(post, order);
        }
    }

    /// Emits the target graph from the final operator and tensor sets.
    pub fn convert(&mut self, name: &str) -> Result<target::Graph> {
        let order = self.emission_order();
        let mut nodes = Vec::with_capacity(order.len());
        for &op in &order {
            nodes.push(ops::convert(self, op)?);
        }

        let graph_inputs: HashSet<TensorId> = self.inputs.iter().copied().collect();
        let graph_outputs: HashSet<TensorId> = self.outputs.iter().copied().collect();

        let mut referenced: Vec<TensorId> = self.inputs.clone();
        for &op in &order {
            let operator = self.op(op);
            referenced.extend(operator.inputs().iter().chain(operator.outputs()));
        }
        let mut seen = HashSet::new();
        referenced.retain(|&id| seen.insert(id));

        let mut initializers = Vec::new();
        let mut value_infos = Vec::new();
        let mut inputs = Vec::new();
        let mut outputs = HashMap::new();
        for id in referenced {
            let node = self.tensor_mut(id).convert()?;
            if node.data.is_some() {
                initializers.push(node);
            } else if graph_inputs.contains(&id) {
                inputs.push(node);
            } else if graph_outputs.contains(&id) {
                outputs.insert(id, node);
            } else {
                value_infos.push(node);
            }
        }
        let mut ordered_outputs = Vec::with_capacity(self.outputs.len());
        for id in self.outputs.clone() {
            let node = match outputs.remove(&id) {
                Some(node) => node,
                None => self.tensor_mut(id).convert()?,
            };
            ordered_outputs.push(node);
        }

        let graph = target::Graph {
            name: name.to_string(),
            nodes,
            initializers,
            inputs,
            outputs: ordered_outputs,
            value_infos,
        };
        target::check_graph(&graph)?;
        info!(
            "Converted graph {}: {} nodes ({} synthesized), {} initializers",
            graph.name,
            graph.nodes.len(),
            self.created.len(),
            graph.initializers.len()
        );
        Ok(graph)
    }
}
