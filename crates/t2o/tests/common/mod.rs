#![allow(dead_code)]

use t2o::source::{
    ActivationFunction, Buffer, BuiltinOperator, BuiltinOptions, Conv2dOptions, Model,
    OperatorDesc, Padding, ReshapeOptions, SourceDType, Subgraph, TensorDesc,
};

/// Incrementally assembles a single-subgraph source model.
pub struct ModelBuilder {
    model: Model,
    subgraph: Subgraph,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    pub fn new() -> Self {
        ModelBuilder {
            model: Model {
                version: 3,
                description: Some("fixture".to_string()),
                operator_codes: Vec::new(),
                // Buffer 0 is the empty sentinel shared by runtime tensors.
                buffers: vec![Buffer::default()],
                subgraphs: Vec::new(),
            },
            subgraph: Subgraph::default(),
        }
    }

    fn push_tensor(&mut self, name: &str, shape: &[i64], dtype: SourceDType, bytes: Vec<u8>) -> i64 {
        let buffer = if bytes.is_empty() {
            0
        } else {
            self.model.buffers.push(Buffer { data: bytes });
            self.model.buffers.len() - 1
        };
        self.subgraph.tensors.push(TensorDesc {
            name: name.to_string(),
            shape: shape.to_vec(),
            dtype,
            buffer,
            quantization: None,
        });
        (self.subgraph.tensors.len() - 1) as i64
    }

    /// Runtime tensor without data.
    pub fn tensor(&mut self, name: &str, shape: &[i64], dtype: SourceDType) -> i64 {
        self.push_tensor(name, shape, dtype, Vec::new())
    }

    pub fn activation(&mut self, name: &str, shape: &[i64]) -> i64 {
        self.tensor(name, shape, SourceDType::Float32)
    }

    pub fn const_i32(&mut self, name: &str, shape: &[i64], values: &[i32]) -> i64 {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push_tensor(name, shape, SourceDType::Int32, bytes)
    }

    pub fn const_f32(&mut self, name: &str, shape: &[i64], values: &[f32]) -> i64 {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push_tensor(name, shape, SourceDType::Float32, bytes)
    }

    /// Mutable access to a tensor descriptor, e.g. to attach quantization.
    pub fn tensor_desc(&mut self, index: i64) -> &mut TensorDesc {
        &mut self.subgraph.tensors[index as usize]
    }

    pub fn op(
        &mut self,
        code: BuiltinOperator,
        inputs: &[i64],
        outputs: &[i64],
        options: BuiltinOptions,
    ) -> usize {
        let opcode_index = match self.model.operator_codes.iter().position(|&c| c == code) {
            Some(index) => index,
            None => {
                self.model.operator_codes.push(code);
                self.model.operator_codes.len() - 1
            }
        };
        self.subgraph.operators.push(OperatorDesc {
            opcode_index,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            options,
        });
        self.subgraph.operators.len() - 1
    }

    pub fn conv(&mut self, inputs: &[i64], output: i64, padding: Padding, stride: u32) -> usize {
        self.conv_with(inputs, output, padding, stride, ActivationFunction::None)
    }

    pub fn conv_with(
        &mut self,
        inputs: &[i64],
        output: i64,
        padding: Padding,
        stride: u32,
        activation: ActivationFunction,
    ) -> usize {
        let options = Conv2dOptions {
            padding,
            stride_w: stride,
            stride_h: stride,
            dilation_w_factor: 1,
            dilation_h_factor: 1,
            fused_activation_function: activation,
        };
        self.op(
            BuiltinOperator::Conv2d,
            inputs,
            &[output],
            BuiltinOptions::Conv2d(options),
        )
    }

    pub fn reshape(&mut self, inputs: &[i64], output: i64, new_shape: &[i32]) -> usize {
        let options = ReshapeOptions {
            new_shape: new_shape.to_vec(),
        };
        self.op(
            BuiltinOperator::Reshape,
            inputs,
            &[output],
            BuiltinOptions::Reshape(options),
        )
    }

    pub fn inputs(&mut self, inputs: &[i64]) -> &mut Self {
        self.subgraph.inputs = inputs.iter().map(|&i| i as usize).collect();
        self
    }

    pub fn outputs(&mut self, outputs: &[i64]) -> &mut Self {
        self.subgraph.outputs = outputs.iter().map(|&i| i as usize).collect();
        self
    }

    pub fn build(mut self) -> Model {
        self.model.subgraphs.push(self.subgraph);
        self.model
    }
}

/// `x:[1,4,4,2] -> Conv(w:[3,1,1,2]) -> y:[1,4,4,3] -> Reshape(s=[1,48]) -> z:[1,48]`.
pub fn conv_then_reshape() -> Model {
    let mut b = ModelBuilder::new();
    let x = b.activation("x", &[1, 4, 4, 2]);
    let w = b.const_f32("w", &[3, 1, 1, 2], &[0.5; 6]);
    let y = b.activation("y", &[1, 4, 4, 3]);
    let s = b.const_i32("s", &[2], &[1, 48]);
    let z = b.activation("z", &[1, 48]);
    b.conv(&[x, w], y, Padding::Valid, 1);
    b.reshape(&[y, s], z, &[]);
    b.inputs(&[x]).outputs(&[z]);
    b.build()
}

/// `x:[1,2,3,4] -> Reshape(s:int32=[1,3,4,2]) -> z:[1,3,4,2]`.
pub fn single_reshape() -> Model {
    let mut b = ModelBuilder::new();
    let x = b.activation("x", &[1, 2, 3, 4]);
    let s = b.const_i32("s", &[4], &[1, 3, 4, 2]);
    let z = b.activation("z", &[1, 3, 4, 2]);
    b.reshape(&[x, s], z, &[]);
    b.inputs(&[x]).outputs(&[z]);
    b.build()
}
