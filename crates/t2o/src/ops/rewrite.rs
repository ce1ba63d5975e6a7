//! Layout-preserving splices around layout-agnostic operators.
//!
//! An operator such as Reshape interprets its operand in the layout it was
//! authored in. When a neighbouring tensor has been moved to the target layout,
//! a Transpose is inserted on that edge so the operator still sees (or
//! produces) data in its original layout:
//!
//! ```text
//!   before:  T(NCHW) -> X: Transpose(perm NCHW->NHWC) -> T'(NHWC) -> op
//!   after:   op -> O'(NHWC) -> X: Transpose(perm NHWC->NCHW) -> O(NCHW)
//! ```
//!
//! The synthesized tensors are born in their final shape and are never run
//! through the tensor transform pass.

use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::graph::Graph;
use crate::ops::transpose::TransposeAttrs;
use crate::ops::{OpId, OpKind};
use crate::registry::SYNTHETIC_PREFIX;

/// Inserts a Transpose in front of input `slot` of `op`, undoing the layout
/// conversion of that input. Returns the Transpose, which is shared when an
/// earlier consumer of the same tensor already inserted one.
pub fn preserve_input_layout(graph: &mut Graph<'_>, op: OpId, slot: usize) -> Result<OpId> {
    assert!(
        graph.op(op).status().is_parsed(),
        "{} rewritten before parse",
        graph.op(op)
    );
    let to_transpose = graph.op(op).inputs()[slot];
    let source = graph.tensor(to_transpose);
    let layout = source
        .layout()
        .ok_or_else(|| ConvertError::MissingLayout {
            tensor: source.name().to_string(),
        })?
        .inverse();
    let transposed_name = format!("{SYNTHETIC_PREFIX}_Transposed_{}", source.name());
    let transposed_shape = layout.transform(&source.shape);

    // Another consumer of the same tensor already spliced a Transpose.
    if let Some(existing) = graph.registry().lookup(&transposed_name) {
        if let Some(&trans) = graph.tensor(existing).producers().first() {
            graph.tensor_mut(to_transpose).remove_consumer(op);
            graph.op_mut(op).replace_input(to_transpose, existing);
            graph.tensor_mut(existing).add_consumer(op);
            debug!("Reusing {} for {}", graph.op(trans), graph.op(op));
            return Ok(trans);
        }
    }

    let transposed = graph
        .registry_mut()
        .get_with_ref(to_transpose, &transposed_name, false);
    {
        let tensor = graph.tensor_mut(transposed);
        tensor.shape = transposed_shape;
        tensor.set_layout(layout.clone());
        tensor.set_parsed();
    }

    let attrs = TransposeAttrs::new(layout.perm());
    let trans = graph.add_synthetic_op(OpKind::Transpose(attrs), transposed_name);
    graph.op_mut(trans).inputs.push(to_transpose);
    graph.tensor_mut(to_transpose).replace_consumer(op, trans);
    graph.op_mut(op).replace_input(to_transpose, transposed);

    graph.op_mut(trans).outputs.push(transposed);
    graph.tensor_mut(transposed).add_producer(trans);
    graph.tensor_mut(transposed).add_consumer(op);
    graph.op_mut(trans).set_parsed();

    graph.op_mut(op).pre.push(trans);
    debug!("Inserted {} before {}", graph.op(trans), graph.op(op));
    Ok(trans)
}

/// Inserts a Transpose after output `slot` of `op`, converting what the
/// operator produces into the layout its output tensor is declared with.
/// Returns the new operator.
pub fn preserve_output_layout(graph: &mut Graph<'_>, op: OpId, slot: usize) -> Result<OpId> {
    assert!(
        graph.op(op).status().is_parsed(),
        "{} rewritten before parse",
        graph.op(op)
    );
    let transposed = graph.op(op).outputs()[slot];
    let target = graph.tensor(transposed);
    let forward = target
        .layout()
        .ok_or_else(|| ConvertError::MissingLayout {
            tensor: target.name().to_string(),
        })?
        .clone();
    let layout = forward.inverse();
    let to_transpose_name = format!("{SYNTHETIC_PREFIX}_ToTranspose_{}", target.name());
    let trans_name = format!("{SYNTHETIC_PREFIX}_Transpose_{}", target.name());
    let to_transpose_shape = layout.transform(&target.shape);

    let to_transpose = graph
        .registry_mut()
        .get_with_ref(transposed, &to_transpose_name, false);
    {
        let tensor = graph.tensor_mut(to_transpose);
        tensor.shape = to_transpose_shape;
        tensor.set_layout(layout);
        tensor.set_parsed();
    }

    let attrs = TransposeAttrs::new(forward.perm());
    let trans = graph.add_synthetic_op(OpKind::Transpose(attrs), trans_name);
    graph.op_mut(trans).inputs.push(to_transpose);
    graph.tensor_mut(transposed).replace_producer(op, trans);
    graph.op_mut(op).replace_output(transposed, to_transpose);

    graph.op_mut(trans).outputs.push(transposed);
    graph.tensor_mut(to_transpose).add_producer(op);
    graph.tensor_mut(to_transpose).add_consumer(trans);
    graph.op_mut(trans).set_parsed();

    graph.op_mut(op).post.push(trans);
    debug!("Inserted {} after {}", graph.op(trans), graph.op(op));
    Ok(trans)
}
