//! 2-D convolution, the layout-sensitive producer.
//!
//! Activations are channel-last in the source and channel-first in the target,
//! and weights move from `OHWI` to `OIHW`, so Conv tags every operand with a
//! layout and lets the tensor transform pass permute them.

use crate::error::{ConvertError, Result};
use crate::graph::Graph;
use crate::layout::Layout;
use crate::ops::{check_arity, OpId, OpKind};
use crate::source::{ActivationFunction, BuiltinOperator, BuiltinOptions, Padding};
use crate::target::{AttributeValue, Node};
use crate::tensor::TensorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoPad {
    SameUpper,
    #[default]
    Valid,
}

impl AutoPad {
    pub fn as_str(self) -> &'static str {
        match self {
            AutoPad::SameUpper => "SAME_UPPER",
            AutoPad::Valid => "VALID",
        }
    }
}

impl From<Padding> for AutoPad {
    fn from(padding: Padding) -> Self {
        match padding {
            Padding::Same => AutoPad::SameUpper,
            Padding::Valid => AutoPad::Valid,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvAttrs {
    pub auto_pad: AutoPad,
    pub strides: Vec<i64>,
    pub dilations: Vec<i64>,
    pub kernel_shape: Vec<i64>,
}

pub(crate) fn parse(graph: &mut Graph<'_>, op: OpId) -> Result<()> {
    let desc = graph.source_op(op);
    let index = graph
        .op(op)
        .index()
        .unwrap_or_else(|| panic!("{} has no source operator", graph.op(op)));
    assert_eq!(
        graph.model().opcode(desc),
        BuiltinOperator::Conv2d,
        "operator #{index} is not a convolution"
    );
    check_arity("Conv", index, "inputs", 2..=3, desc.inputs.len())?;
    check_arity("Conv", index, "outputs", 1..=1, desc.outputs.len())?;

    let options = match &desc.options {
        BuiltinOptions::Conv2d(options) => options,
        _ => {
            return Err(ConvertError::UnsupportedAttribute {
                op: "Conv",
                index,
                reason: "missing Conv2D options".to_string(),
            })
        }
    };
    if options.fused_activation_function != ActivationFunction::None {
        return Err(ConvertError::UnsupportedAttribute {
            op: "Conv",
            index,
            reason: format!(
                "fused activation {:?}",
                options.fused_activation_function
            ),
        });
    }

    let activation = Layout::new("NHWC", "NCHW");
    let input = graph.parse_input(op, 0, Some(activation.clone()), false)?;
    check_activation_rank(graph, input)?;

    let weights = graph.parse_input(op, 1, Some(Layout::new("OHWI", "OIHW")), true)?;
    let kernel = graph.tensor(weights);
    if kernel.rank() != 4 {
        return Err(ConvertError::validation(
            kernel.name(),
            format!("convolution weights must be rank 4, found {:?}", kernel.shape),
        ));
    }
    // Source weights are OHWI; spatial dims sit at 1 and 2.
    let kernel_shape = vec![kernel.shape[1] as i64, kernel.shape[2] as i64];

    if desc.inputs.get(2).map_or(false, |&t| t >= 0) {
        graph.parse_input(op, 2, None, true)?;
    }

    let output = graph.parse_output(op, 0, Some(activation))?;
    check_activation_rank(graph, output)?;

    let attrs = ConvAttrs {
        auto_pad: options.padding.into(),
        strides: vec![options.stride_h as i64, options.stride_w as i64],
        dilations: vec![
            options.dilation_h_factor as i64,
            options.dilation_w_factor as i64,
        ],
        kernel_shape,
    };
    let name = graph.tensor(output).name().to_string();
    let operator = graph.op_mut(op);
    operator.kind = OpKind::Conv(attrs);
    operator.name = name;
    operator.set_parsed();
    Ok(())
}

fn check_activation_rank(graph: &Graph<'_>, id: TensorId) -> Result<()> {
    let tensor = graph.tensor(id);
    if tensor.rank() != 4 {
        return Err(ConvertError::validation(
            tensor.name(),
            format!("convolution activations must be rank 4, found {:?}", tensor.shape),
        ));
    }
    Ok(())
}

pub(crate) fn attributes(attrs: &ConvAttrs, node: Node) -> Node {
    node.with_attr(
        "auto_pad",
        AttributeValue::String(attrs.auto_pad.as_str().to_string()),
    )
    .with_attr("dilations", AttributeValue::Ints(attrs.dilations.clone()))
    .with_attr("group", AttributeValue::Int(1))
    .with_attr(
        "kernel_shape",
        AttributeValue::Ints(attrs.kernel_shape.clone()),
    )
    .with_attr("strides", AttributeValue::Ints(attrs.strides.clone()))
}
