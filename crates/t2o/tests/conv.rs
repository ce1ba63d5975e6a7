mod common;

use anyhow::Result;
use common::ModelBuilder;
use t2o::source::{ActivationFunction, Model, Padding};
use t2o::target::AttributeValue;
use t2o::{convert_model, ConvertError, ConvertOptions, Graph, TensorData};

/// `x:[1,3,3,2] -> Conv(w:[1,2,1,2], b:[1]) -> y:[1,2,3,1]`.
fn conv_model(padding: Padding, stride: u32, activation: ActivationFunction) -> Model {
    let mut b = ModelBuilder::new();
    let x = b.activation("x", &[1, 3, 3, 2]);
    let w = b.const_f32("w", &[1, 2, 1, 2], &[0.0, 1.0, 2.0, 3.0]);
    let bias = b.const_f32("bias", &[1], &[0.25]);
    let y = b.activation("y", &[1, 2, 3, 1]);
    b.conv_with(&[x, w, bias], y, padding, stride, activation);
    b.inputs(&[x]).outputs(&[y]);
    b.build()
}

#[test]
fn weights_are_permuted_to_oihw() -> Result<()> {
    let model = conv_model(Padding::Valid, 1, ActivationFunction::None);
    let mut graph = Graph::new(&model, &model.subgraphs[0], true);
    graph.parse()?;
    graph.transform()?;

    let weights = graph.tensor_named("w").expect("weights");
    assert!(weights.is_initializer());
    assert_eq!(weights.shape, vec![1, 2, 2, 1]);
    assert_eq!(weights.data, Some(TensorData::F32(vec![0.0, 2.0, 1.0, 3.0])));

    let bias = graph.tensor_named("bias").expect("bias");
    assert!(bias.layout().is_none());
    assert_eq!(bias.shape, vec![1]);

    assert_eq!(graph.tensor_named("x").expect("x").shape, vec![1, 2, 3, 3]);
    assert_eq!(graph.tensor_named("y").expect("y").shape, vec![1, 1, 2, 3]);
    assert!(graph.created_ops().is_empty());
    Ok(())
}

#[test]
fn conv_node_carries_target_attributes() -> Result<()> {
    let model = conv_model(Padding::Valid, 1, ActivationFunction::None);
    let converted = convert_model(&model, &ConvertOptions::new())?;
    let node = converted.graph.node("y").expect("conv node named after its output");
    assert_eq!(node.op_type, "Conv");
    assert_eq!(node.inputs, vec!["x", "w", "bias"]);
    assert_eq!(
        node.attr("auto_pad"),
        Some(&AttributeValue::String("VALID".to_string()))
    );
    assert_eq!(node.attr("kernel_shape"), Some(&AttributeValue::Ints(vec![2, 1])));
    assert_eq!(node.attr("strides"), Some(&AttributeValue::Ints(vec![1, 1])));
    assert_eq!(node.attr("dilations"), Some(&AttributeValue::Ints(vec![1, 1])));
    assert_eq!(node.attr("group"), Some(&AttributeValue::Int(1)));

    let names: Vec<&str> = converted
        .graph
        .initializers
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(names, vec!["w", "bias"]);
    Ok(())
}

#[test]
fn same_padding_maps_to_same_upper() -> Result<()> {
    let model = conv_model(Padding::Same, 2, ActivationFunction::None);
    let converted = convert_model(&model, &ConvertOptions::new())?;
    let node = converted.graph.node("y").expect("conv node");
    assert_eq!(
        node.attr("auto_pad"),
        Some(&AttributeValue::String("SAME_UPPER".to_string()))
    );
    assert_eq!(node.attr("strides"), Some(&AttributeValue::Ints(vec![2, 2])));
    Ok(())
}

#[test]
fn fused_activation_is_rejected() {
    let model = conv_model(Padding::Valid, 1, ActivationFunction::Relu6);
    let err = convert_model(&model, &ConvertOptions::new()).expect_err("fused relu6");
    assert!(matches!(err, ConvertError::UnsupportedAttribute { op: "Conv", .. }));
}

#[test]
fn runtime_weights_are_rejected() {
    let mut b = ModelBuilder::new();
    let x = b.activation("x", &[1, 3, 3, 2]);
    let w = b.activation("w", &[1, 2, 1, 2]);
    let y = b.activation("y", &[1, 2, 3, 1]);
    b.conv(&[x, w], y, Padding::Valid, 1);
    b.inputs(&[x, w]).outputs(&[y]);
    let model = b.build();

    let err = convert_model(&model, &ConvertOptions::new()).expect_err("weights need data");
    assert!(matches!(err, ConvertError::MissingData { ref tensor } if tensor == "w"));
}

#[test]
fn conv_needs_weights() {
    let mut b = ModelBuilder::new();
    let x = b.activation("x", &[1, 3, 3, 2]);
    let y = b.activation("y", &[1, 3, 3, 2]);
    b.conv(&[x], y, Padding::Valid, 1);
    b.inputs(&[x]).outputs(&[y]);
    let model = b.build();

    let err = convert_model(&model, &ConvertOptions::new()).expect_err("one input");
    assert!(matches!(err, ConvertError::Arity { op: "Conv", actual: 1, .. }));
}

#[test]
fn activations_must_be_rank_four() {
    let mut b = ModelBuilder::new();
    let x = b.activation("x", &[3, 3, 2]);
    let w = b.const_f32("w", &[1, 2, 1, 2], &[0.0, 1.0, 2.0, 3.0]);
    let y = b.activation("y", &[1, 2, 3, 1]);
    b.conv(&[x, w], y, Padding::Valid, 1);
    b.inputs(&[x]).outputs(&[y]);
    let model = b.build();
    let err = convert_model(&model, &ConvertOptions::new()).expect_err("rank-3 input");
    assert!(matches!(err, ConvertError::Validation { ref name, .. } if name == "x"));

    let mut b = ModelBuilder::new();
    let x = b.activation("x", &[1, 3, 3, 2]);
    let w = b.const_f32("w", &[1, 2, 1, 2], &[0.0, 1.0, 2.0, 3.0]);
    let y = b.activation("y", &[2, 3, 1]);
    b.conv(&[x, w], y, Padding::Valid, 1);
    b.inputs(&[x]).outputs(&[y]);
    let model = b.build();
    let err = convert_model(&model, &ConvertOptions::new()).expect_err("rank-3 output");
    assert!(matches!(err, ConvertError::Validation { ref name, .. } if name == "y"));
}
