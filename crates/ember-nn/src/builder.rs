use crate::model::{
    ABSENT_TENSOR, ElementType, MAGIC, OpCode, OpOptions, Quantization, SCHEMA_VERSION,
};

struct PendingTensor {
    dtype: ElementType,
    shape: Vec<usize>,
    quant: Quantization,
    data: Vec<u8>,
}

struct PendingOp {
    code: OpCode,
    inputs: Vec<u32>,
    output: usize,
    options: OpOptions,
}

/// Serializes models in the descriptor format read by [`crate::Model::parse`].
///
/// The builder does no validation; `Model::parse` is the single gate.
pub struct ModelBuilder {
    schema_version: u32,
    tensors: Vec<PendingTensor>,
    ops: Vec<PendingOp>,
    io: (usize, usize),
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            tensors: Vec::new(),
            ops: Vec::new(),
            io: (0, 0),
        }
    }

    /// Overrides the header version, e.g. to produce a stale model.
    pub fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    pub fn activation(&mut self, dtype: ElementType, shape: &[usize], quant: Quantization) -> usize {
        self.push(dtype, shape, quant, Vec::new())
    }

    pub fn constant_f32(&mut self, shape: &[usize], values: &[f32]) -> usize {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(ElementType::F32, shape, Quantization::default(), data)
    }

    pub fn constant_i32(&mut self, shape: &[usize], values: &[i32]) -> usize {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(ElementType::I32, shape, Quantization::default(), data)
    }

    pub fn constant_i8(&mut self, shape: &[usize], values: &[i8], quant: Quantization) -> usize {
        let data = values.iter().map(|&v| v as u8).collect();
        self.push(ElementType::I8, shape, quant, data)
    }

    pub fn op(&mut self, code: OpCode, inputs: &[usize], output: usize, options: OpOptions) {
        self.ops.push(PendingOp {
            code,
            inputs: inputs.iter().map(|&i| i as u32).collect(),
            output,
            options,
        });
    }

    /// Like [`Self::op`], with `None` written as an absent input.
    pub fn op_with_optional(
        &mut self,
        code: OpCode,
        inputs: &[Option<usize>],
        output: usize,
        options: OpOptions,
    ) {
        self.ops.push(PendingOp {
            code,
            inputs: inputs
                .iter()
                .map(|i| i.map_or(ABSENT_TENSOR, |i| i as u32))
                .collect(),
            output,
            options,
        });
    }

    pub fn io(&mut self, input: usize, output: usize) {
        self.io = (input, output);
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        put_u32(&mut out, self.schema_version);

        put_u32(&mut out, self.tensors.len() as u32);
        for t in &self.tensors {
            out.push(t.dtype.tag());
            out.push(t.shape.len() as u8);
            for &d in &t.shape {
                put_u32(&mut out, d as u32);
            }
            out.extend_from_slice(&t.quant.scale.to_le_bytes());
            out.extend_from_slice(&t.quant.zero_point.to_le_bytes());
            put_u32(&mut out, t.data.len() as u32);
            out.extend_from_slice(&t.data);
        }

        put_u32(&mut out, self.ops.len() as u32);
        for op in &self.ops {
            out.push(op.code.tag());
            out.push(op.inputs.len() as u8);
            for &i in &op.inputs {
                put_u32(&mut out, i);
            }
            out.push(1);
            put_u32(&mut out, op.output as u32);
            let mut options = Vec::new();
            op.options.encode(&mut options);
            out.extend_from_slice(&(options.len() as u16).to_le_bytes());
            out.extend_from_slice(&options);
        }

        put_u32(&mut out, self.io.0 as u32);
        put_u32(&mut out, self.io.1 as u32);
        out
    }

    fn push(&mut self, dtype: ElementType, shape: &[usize], quant: Quantization, data: Vec<u8>) -> usize {
        self.tensors.push(PendingTensor {
            dtype,
            shape: shape.to_vec(),
            quant,
            data,
        });
        self.tensors.len() - 1
    }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
