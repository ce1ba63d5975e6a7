//! Reshape: the representative layout-agnostic operator.
//!
//! Reshape reinterprets the flat element order of its input, so it is only
//! correct in the layout the source model was authored in. Any layout-tagged
//! neighbour gets a Transpose spliced in by [`rewrite`](super::rewrite).

use tracing::{debug, warn};

use crate::error::{ConvertError, Result};
use crate::graph::Graph;
use crate::layout::Layout;
use crate::ops::{check_arity, rewrite, OpId, OpKind};
use crate::registry::SYNTHETIC_PREFIX;
use crate::source::{BuiltinOperator, BuiltinOptions};
use crate::tensor::DType;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReshapeAttrs {
    /// Set on reshapes that only lift an operand's rank for broadcasting.
    /// Layout handling then rewrites the shape vector instead of splicing.
    pub for_fake_broadcasting: bool,
}

pub(crate) fn parse(graph: &mut Graph<'_>, op: OpId) -> Result<()> {
    let desc = graph.source_op(op);
    let index = graph
        .op(op)
        .index()
        .unwrap_or_else(|| panic!("{} has no source operator", graph.op(op)));
    let opcode = graph.model().opcode(desc);
    assert_eq!(
        opcode,
        BuiltinOperator::Reshape,
        "operator #{index} is not a reshape"
    );
    check_arity("Reshape", index, "inputs", 1..=2, desc.inputs.len())?;
    check_arity("Reshape", index, "outputs", 1..=1, desc.outputs.len())?;

    graph.parse_input(op, 0, None, false)?;

    if desc.inputs.get(1).map_or(false, |&t| t >= 0) {
        let shape = graph.parse_input(op, 1, None, false)?;
        let tensor = graph.tensor_mut(shape);
        // Shape operands are int32 in the source and int64 in the target.
        tensor.coerce_dtype(DType::Int64);
        if tensor.rank() > 1 {
            warn!(
                "Shape operand {} has rank {}; runtimes only accept rank-1 shapes, \
                 flattening initializers and leaving runtime values as they are",
                tensor,
                tensor.rank()
            );
            if tensor.is_initializer() {
                tensor.shape = vec![tensor.element_count()];
            }
        }
    } else {
        let new_shape = match &desc.options {
            BuiltinOptions::Reshape(options) => &options.new_shape,
            _ => {
                return Err(ConvertError::UnsupportedAttribute {
                    op: "Reshape",
                    index,
                    reason: "no shape operand and no new_shape option".to_string(),
                })
            }
        };
        let values: Vec<i64> = new_shape.iter().map(|&dim| i64::from(dim)).collect();
        let owner = graph.subgraph().tensor(desc.outputs[0])?.name.clone();
        let shape = graph.registry_mut().create_vector(&owner, &values);
        debug!("Reshape #{} takes its shape {:?} from options", index, values);
        graph.tensor_mut(shape).add_consumer(op);
        graph.op_mut(op).inputs.push(shape);
    }

    let output = graph.parse_output(op, 0, None)?;
    let name = graph.tensor(output).name().to_string();
    let operator = graph.op_mut(op);
    operator.name = name;
    operator.set_parsed();
    Ok(())
}

pub(crate) fn transform(graph: &mut Graph<'_>, op: OpId, attrs: &ReshapeAttrs) -> Result<()> {
    let input = graph.op(op).inputs()[0];
    let output = graph.op(op).outputs()[0];

    if attrs.for_fake_broadcasting {
        assert_ne!(
            graph.tensor(input).rank(),
            graph.tensor(output).rank(),
            "broadcast reshape {} does not change rank",
            graph.op(op)
        );
        let out = graph.tensor(output);
        let layout = out
            .layout()
            .cloned()
            .ok_or_else(|| ConvertError::MissingLayout {
                tensor: out.name().to_string(),
            })?;
        let shape = graph.op(op).inputs()[1];
        let tensor = graph.tensor_mut(shape);
        let data = tensor
            .data
            .as_ref()
            .ok_or_else(|| ConvertError::MissingData {
                tensor: tensor.name().to_string(),
            })?
            .reorder(&layout);
        tensor.data = Some(data);
        return Ok(());
    }

    if graph.tensor(input).layout().is_some() {
        rewrite::preserve_input_layout(graph, op, 0)?;
    }
    if graph.tensor(output).layout().is_some() {
        rewrite::preserve_output_layout(graph, op, 0)?;
    }
    Ok(())
}

/// Lifts input `slot` of `consumer` to the rank of `layout` by prepending unit
/// dimensions, through a synthetic broadcast reshape placed in the consumer's
/// `pre` list. The reshaped operand is tagged with `layout`.
///
/// Must run after parse and before transform: the new tensor and operator are
/// picked up by the transform pass like any other.
pub fn insert_broadcast_reshape(
    graph: &mut Graph<'_>,
    consumer: OpId,
    slot: usize,
    layout: Layout,
) -> Result<OpId> {
    let status = graph.op(consumer).status();
    assert!(
        status.is_parsed() && !status.is_transformed(),
        "broadcast reshape for {} must be inserted between parse and transform",
        graph.op(consumer)
    );
    let operand = graph.op(consumer).inputs()[slot];
    let source = graph.tensor(operand);
    if source.rank() >= layout.rank() {
        return Err(ConvertError::validation(
            source.name(),
            format!(
                "rank-{} operand cannot be broadcast to rank {}",
                source.rank(),
                layout.rank()
            ),
        ));
    }
    let mut shape = vec![1usize; layout.rank() - source.rank()];
    shape.extend_from_slice(&source.shape);
    let name = format!("{SYNTHETIC_PREFIX}_Reshape_{}", source.name());

    let reshaped = graph.registry_mut().get_with_ref(operand, &name, false);
    let values: Vec<i64> = shape.iter().map(|&dim| dim as i64).collect();
    let shape_vector = graph.registry_mut().create_vector(&name, &values);
    {
        let tensor = graph.tensor_mut(reshaped);
        tensor.shape = shape;
        tensor.set_layout(layout);
        tensor.set_parsed();
    }

    let attrs = ReshapeAttrs {
        for_fake_broadcasting: true,
    };
    let reshape = graph.add_synthetic_op(OpKind::Reshape(attrs), name);
    graph.op_mut(reshape).inputs.extend([operand, shape_vector]);
    graph.tensor_mut(operand).replace_consumer(consumer, reshape);
    graph.tensor_mut(shape_vector).add_consumer(reshape);
    graph.op_mut(consumer).replace_input(operand, reshaped);

    graph.op_mut(reshape).outputs.push(reshaped);
    graph.tensor_mut(reshaped).add_producer(reshape);
    graph.tensor_mut(reshaped).add_consumer(consumer);
    graph.op_mut(reshape).set_parsed();

    graph.op_mut(consumer).pre.push(reshape);
    debug!("Inserted {} before {}", graph.op(reshape), graph.op(consumer));
    Ok(reshape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;
    use crate::source::{Buffer, Model, OperatorDesc, SourceDType, Subgraph, TensorDesc};

    /// `x:[1,4] -> Reshape(s=[4]) -> z:[4]`, no layouts anywhere.
    fn rank_dropping_reshape() -> Model {
        let desc = |name: &str, shape: Vec<i64>, dtype: SourceDType, buffer: usize| TensorDesc {
            name: name.to_string(),
            shape,
            dtype,
            buffer,
            quantization: None,
        };
        Model {
            operator_codes: vec![BuiltinOperator::Reshape],
            buffers: vec![
                Buffer::default(),
                Buffer {
                    data: 4i32.to_le_bytes().to_vec(),
                },
            ],
            subgraphs: vec![Subgraph {
                name: None,
                tensors: vec![
                    desc("x", vec![1, 4], SourceDType::Float32, 0),
                    desc("s", vec![1], SourceDType::Int32, 1),
                    desc("z", vec![4], SourceDType::Float32, 0),
                ],
                operators: vec![OperatorDesc {
                    opcode_index: 0,
                    inputs: vec![0, 1],
                    outputs: vec![2],
                    options: BuiltinOptions::None,
                }],
                inputs: vec![0],
                outputs: vec![2],
            }],
            ..Model::default()
        }
    }

    #[test]
    fn broadcast_reshape_needs_a_tagged_output() {
        let model = rank_dropping_reshape();
        let mut graph = Graph::new(&model, &model.subgraphs[0], true);
        graph.parse().expect("parse");
        let op = graph.source_ops()[0];
        let attrs = ReshapeAttrs {
            for_fake_broadcasting: true,
        };
        let err = transform(&mut graph, op, &attrs).expect_err("untagged output");
        assert!(matches!(err, ConvertError::MissingLayout { ref tensor } if tensor == "z"));
    }

    #[test]
    #[should_panic(expected = "transformed before parse")]
    fn transform_requires_parse() {
        let model = Model::default();
        let subgraph = Subgraph::default();
        let mut graph = Graph::new(&model, &subgraph, true);
        let kind = OpKind::Reshape(ReshapeAttrs::default());
        let op = graph.add_synthetic_op(kind, "r".to_string());
        let _ = ops::transform(&mut graph, op);
    }
}
