mod common;

use anyhow::Result;
use common::ModelBuilder;
use t2o::source::Model;
use t2o::{convert_model, ConvertOptions, Graph};

/// `x` feeds two reshapes: `x -> Reshape -> z1` and `x -> Reshape -> z2`.
fn shared_input() -> Model {
    let mut b = ModelBuilder::new();
    let x = b.activation("x", &[1, 2, 3, 4]);
    let s1 = b.const_i32("s1", &[4], &[1, 3, 4, 2]);
    let z1 = b.activation("z1", &[1, 3, 4, 2]);
    let s2 = b.const_i32("s2", &[2], &[1, 24]);
    let z2 = b.activation("z2", &[1, 24]);
    b.reshape(&[x, s1], z1, &[]);
    b.reshape(&[x, s2], z2, &[]);
    b.inputs(&[x]).outputs(&[z1, z2]);
    b.build()
}

#[test]
fn lookups_return_the_same_tensor() -> Result<()> {
    let model = shared_input();
    let subgraph = &model.subgraphs[0];
    let mut graph = Graph::new(&model, subgraph, true);
    graph.parse()?;

    let x = graph.registry().lookup("x").expect("x is registered");
    assert_eq!(graph.registry_mut().get(subgraph, 0, None, false)?, x);
    assert_eq!(graph.registry().len(), subgraph.tensors.len());

    let ops = graph.source_ops().to_vec();
    assert_eq!(graph.op(ops[0]).inputs()[0], x);
    assert_eq!(graph.op(ops[1]).inputs()[0], x);
    assert_eq!(graph.tensor(x).consumers(), ops.as_slice());
    assert!(graph.tensor(x).producers().is_empty());
    assert_eq!(graph.inputs(), &[x]);
    Ok(())
}

#[test]
fn consumers_of_a_tagged_tensor_share_one_transpose() -> Result<()> {
    let model = shared_input();
    let options = ConvertOptions::new().with_explicit_layout("x", "NHWC", "NCHW");
    let mut graph = Graph::new(&model, &model.subgraphs[0], true);
    graph.apply_explicit_layouts(&options.explicit_layouts)?;
    graph.parse()?;
    graph.transform()?;

    assert_eq!(graph.created_ops().len(), 1);
    let trans = graph.created_ops()[0];
    let x = graph.registry().lookup("x").expect("x is registered");
    assert_eq!(graph.tensor(x).consumers(), &[trans]);

    let ops = graph.source_ops().to_vec();
    let transposed = graph.op(trans).outputs()[0];
    assert_eq!(graph.op(ops[0]).inputs()[0], transposed);
    assert_eq!(graph.op(ops[1]).inputs()[0], transposed);
    assert_eq!(graph.tensor(transposed).consumers(), ops.as_slice());
    assert_eq!(graph.op(ops[0]).pre(), &[trans]);
    assert!(graph.op(ops[1]).pre().is_empty());

    let converted = convert_model(&model, &options)?;
    assert_eq!(
        converted.graph.op_types(),
        vec!["Transpose", "Reshape", "Reshape"]
    );
    Ok(())
}

#[test]
fn explicit_layout_on_unknown_tensor_is_rejected() {
    let model = shared_input();
    let options = ConvertOptions::new().with_explicit_layout("missing", "NHWC", "NCHW");
    let err = convert_model(&model, &options).expect_err("unknown tensor");
    assert!(matches!(err, t2o::ConvertError::UnknownTensor { ref tensor } if tensor == "missing"));
}

#[test]
fn malformed_explicit_layout_is_rejected() {
    let model = shared_input();
    let options = ConvertOptions::new().with_explicit_layout("x", "NHWC", "NCW");
    let err = convert_model(&model, &options).expect_err("rank mismatch");
    assert!(matches!(err, t2o::ConvertError::Validation { ref name, .. } if name == "x"));
}

#[test]
fn explicit_layout_must_match_tensor_rank() {
    let model = shared_input();
    let options = ConvertOptions::new().with_explicit_layout("z2", "NHWC", "NCHW");
    let err = convert_model(&model, &options).expect_err("rank-2 tensor");
    assert!(matches!(err, t2o::ConvertError::Validation { ref name, .. } if name == "z2"));
}
