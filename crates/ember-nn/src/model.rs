//! Versioned model descriptor.
//!
//! Little-endian layout:
//!
//! ```text
//! magic "EMBR" | u32 schema_version | u32 tensor_count | tensor* |
//! u32 op_count | op* | u32 input_tensor | u32 output_tensor
//!
//! tensor: u8 dtype | u8 rank | u32 dims[rank] | f32 scale | i32 zero_point |
//!         u32 const_len | u8 const[const_len]
//! op:     u8 opcode | u8 n_in | u32 in[n_in] | u8 n_out | u32 out |
//!         u16 options_len | u8 options[options_len]
//! ```
//!
//! Constant tensors borrow their bytes from the model blob, which normally
//! lives in flash; only activations are placed in the tensor arena.

use crate::error::ModelError;

pub const MAGIC: [u8; 4] = *b"EMBR";
pub const SCHEMA_VERSION: u32 = 3;
pub const MAX_RANK: usize = 4;
pub const MAX_OP_INPUTS: usize = 8;
/// Input slot marker for an omitted optional tensor (e.g. a missing bias).
pub const ABSENT_TENSOR: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    F32,
    U8,
    I8,
    I32,
}

impl ElementType {
    pub fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::F32 | Self::I32 => 4,
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::F32 => 0,
            Self::U8 => 1,
            Self::I8 => 2,
            Self::I32 => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, ModelError> {
        match tag {
            0 => Ok(Self::F32),
            1 => Ok(Self::U8),
            2 => Ok(Self::I8),
            3 => Ok(Self::I32),
            other => Err(ModelError::UnknownElementType(other)),
        }
    }
}

/// Per-tensor affine quantization: `real = (stored - zero_point) * scale`.
///
/// A zero scale marks an unquantized integer tensor whose stored values are
/// used as-is.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quantization {
    pub scale: f32,
    pub zero_point: i32,
}

impl Quantization {
    pub fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TensorDesc<'m> {
    pub dtype: ElementType,
    pub shape: Vec<usize>,
    pub quant: Quantization,
    pub data: Option<&'m [u8]>,
}

impl TensorDesc<'_> {
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn byte_len(&self) -> usize {
        self.element_count() * self.dtype.size()
    }

    pub fn is_const(&self) -> bool {
        self.data.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Conv2D,
    DepthwiseConv2D,
    AveragePool2D,
    FullyConnected,
    Softmax,
    Reshape,
    Add,
    Mean,
    Pad,
    Concatenation,
    Mul,
    Minimum,
    Maximum,
    Logistic,
    Quantize,
    Dequantize,
}

impl OpCode {
    pub const ALL: [OpCode; 16] = [
        Self::Conv2D,
        Self::DepthwiseConv2D,
        Self::AveragePool2D,
        Self::FullyConnected,
        Self::Softmax,
        Self::Reshape,
        Self::Add,
        Self::Mean,
        Self::Pad,
        Self::Concatenation,
        Self::Mul,
        Self::Minimum,
        Self::Maximum,
        Self::Logistic,
        Self::Quantize,
        Self::Dequantize,
    ];

    pub(crate) fn tag(self) -> u8 {
        Self::ALL
            .iter()
            .position(|&c| c == self)
            .map_or(u8::MAX, |i| i as u8)
    }

    fn from_tag(tag: u8) -> Result<Self, ModelError> {
        Self::ALL
            .get(tag as usize)
            .copied()
            .ok_or(ModelError::UnknownOpcode(tag))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    #[default]
    Same,
    Valid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    None,
    Relu,
    Relu6,
}

impl Activation {
    #[inline(always)]
    pub fn apply(self, v: f32) -> f32 {
        match self {
            Self::None => v,
            Self::Relu => v.max(0.0),
            Self::Relu6 => v.clamp(0.0, 6.0),
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Relu),
            2 => Some(Self::Relu6),
            _ => None,
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Relu => 1,
            Self::Relu6 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvOptions {
    pub stride_w: usize,
    pub stride_h: usize,
    pub padding: Padding,
    pub activation: Activation,
    /// Output channels per input channel; only read by depthwise convolution.
    pub depth_multiplier: usize,
}

impl Default for ConvOptions {
    fn default() -> Self {
        Self {
            stride_w: 1,
            stride_h: 1,
            padding: Padding::Same,
            activation: Activation::None,
            depth_multiplier: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub filter_w: usize,
    pub filter_h: usize,
    pub stride_w: usize,
    pub stride_h: usize,
    pub padding: Padding,
    pub activation: Activation,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpOptions {
    None,
    Conv(ConvOptions),
    Pool(PoolOptions),
    Fused(Activation),
    Softmax { beta: f32 },
    Concat { axis: i32, activation: Activation },
    Reduce { keep_dims: bool },
}

impl OpOptions {
    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            Self::None => {}
            Self::Conv(c) => {
                out.extend_from_slice(&(c.stride_w as u16).to_le_bytes());
                out.extend_from_slice(&(c.stride_h as u16).to_le_bytes());
                out.push(padding_tag(c.padding));
                out.push(c.activation.tag());
                out.extend_from_slice(&(c.depth_multiplier as u16).to_le_bytes());
            }
            Self::Pool(p) => {
                out.extend_from_slice(&(p.filter_w as u16).to_le_bytes());
                out.extend_from_slice(&(p.filter_h as u16).to_le_bytes());
                out.extend_from_slice(&(p.stride_w as u16).to_le_bytes());
                out.extend_from_slice(&(p.stride_h as u16).to_le_bytes());
                out.push(padding_tag(p.padding));
                out.push(p.activation.tag());
            }
            Self::Fused(a) => out.push(a.tag()),
            Self::Softmax { beta } => out.extend_from_slice(&beta.to_le_bytes()),
            Self::Concat { axis, activation } => {
                out.extend_from_slice(&axis.to_le_bytes());
                out.push(activation.tag());
            }
            Self::Reduce { keep_dims } => out.push(keep_dims as u8),
        }
    }

    fn decode(code: OpCode, bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        let options = match code {
            OpCode::Conv2D | OpCode::DepthwiseConv2D => Self::Conv(ConvOptions {
                stride_w: r.u16().ok()? as usize,
                stride_h: r.u16().ok()? as usize,
                padding: padding_from_tag(r.u8().ok()?)?,
                activation: Activation::from_tag(r.u8().ok()?)?,
                depth_multiplier: r.u16().ok()? as usize,
            }),
            OpCode::AveragePool2D => Self::Pool(PoolOptions {
                filter_w: r.u16().ok()? as usize,
                filter_h: r.u16().ok()? as usize,
                stride_w: r.u16().ok()? as usize,
                stride_h: r.u16().ok()? as usize,
                padding: padding_from_tag(r.u8().ok()?)?,
                activation: Activation::from_tag(r.u8().ok()?)?,
            }),
            OpCode::FullyConnected | OpCode::Add | OpCode::Mul => {
                Self::Fused(Activation::from_tag(r.u8().ok()?)?)
            }
            OpCode::Softmax => Self::Softmax { beta: r.f32().ok()? },
            OpCode::Concatenation => Self::Concat {
                axis: r.i32().ok()?,
                activation: Activation::from_tag(r.u8().ok()?)?,
            },
            OpCode::Mean => Self::Reduce {
                keep_dims: match r.u8().ok()? {
                    0 => false,
                    1 => true,
                    _ => return None,
                },
            },
            OpCode::Reshape
            | OpCode::Pad
            | OpCode::Minimum
            | OpCode::Maximum
            | OpCode::Logistic
            | OpCode::Quantize
            | OpCode::Dequantize => Self::None,
        };
        r.is_empty().then_some(options)
    }
}

fn padding_tag(p: Padding) -> u8 {
    match p {
        Padding::Same => 0,
        Padding::Valid => 1,
    }
}

fn padding_from_tag(tag: u8) -> Option<Padding> {
    match tag {
        0 => Some(Padding::Same),
        1 => Some(Padding::Valid),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub code: OpCode,
    /// `None` marks an omitted optional input.
    pub inputs: Vec<Option<usize>>,
    pub output: usize,
    pub options: OpOptions,
}

/// A parsed, validated model borrowing its constants from the source blob.
#[derive(Debug, Clone, PartialEq)]
pub struct Model<'m> {
    schema_version: u32,
    tensors: Vec<TensorDesc<'m>>,
    operators: Vec<Operator>,
    input: usize,
    output: usize,
}

impl<'m> Model<'m> {
    /// Parses and validates a model blob.
    ///
    /// The schema version is checked right after the magic; nothing else is
    /// interpreted for a blob written against another schema.
    pub fn parse(bytes: &'m [u8]) -> Result<Self, ModelError> {
        let mut r = Reader::new(bytes);

        let magic = r.array4()?;
        if magic != MAGIC {
            return Err(ModelError::BadMagic(magic));
        }
        let schema_version = r.u32()?;
        if schema_version != SCHEMA_VERSION {
            return Err(ModelError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found: schema_version,
            });
        }

        let tensor_count = r.u32()? as usize;
        let mut tensors = Vec::new();
        for tensor in 0..tensor_count {
            tensors.push(parse_tensor(&mut r, tensor)?);
        }

        let op_count = r.u32()? as usize;
        let mut operators = Vec::new();
        for op in 0..op_count {
            operators.push(parse_operator(&mut r, op, tensors.len())?);
        }

        let input = checked_index(r.u32()? as usize, tensors.len())?;
        let output = checked_index(r.u32()? as usize, tensors.len())?;
        if !r.is_empty() {
            return Err(ModelError::TrailingBytes(r.remaining()));
        }

        let model = Self {
            schema_version,
            tensors,
            operators,
            input,
            output,
        };
        model.validate_graph()?;
        Ok(model)
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn tensors(&self) -> &[TensorDesc<'m>] {
        &self.tensors
    }

    pub fn tensor(&self, index: usize) -> Option<&TensorDesc<'m>> {
        self.tensors.get(index)
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    pub fn input_index(&self) -> usize {
        self.input
    }

    pub fn output_index(&self) -> usize {
        self.output
    }

    /// Checks single assignment and that operators are topologically ordered.
    fn validate_graph(&self) -> Result<(), ModelError> {
        for endpoint in [self.input, self.output] {
            if self.tensors[endpoint].is_const() {
                return Err(ModelError::ConstEndpoint(endpoint));
            }
        }

        let mut writer: Vec<Option<usize>> = vec![None; self.tensors.len()];
        for (op_index, op) in self.operators.iter().enumerate() {
            for &tensor in op.inputs.iter().flatten() {
                let desc = &self.tensors[tensor];
                if !desc.is_const() && tensor != self.input && writer[tensor].is_none() {
                    return Err(ModelError::UseBeforeWrite {
                        op: op_index,
                        tensor,
                    });
                }
            }

            if self.tensors[op.output].is_const() {
                return Err(ModelError::ConstOutput {
                    op: op_index,
                    tensor: op.output,
                });
            }
            if op.output == self.input {
                return Err(ModelError::WritesInput { op: op_index });
            }
            if let Some(first) = writer[op.output] {
                return Err(ModelError::MultipleWriters {
                    tensor: op.output,
                    first,
                    second: op_index,
                });
            }
            writer[op.output] = Some(op_index);
        }

        if self.output != self.input && writer[self.output].is_none() {
            return Err(ModelError::UseBeforeWrite {
                op: self.operators.len(),
                tensor: self.output,
            });
        }
        Ok(())
    }
}

fn parse_tensor<'m>(r: &mut Reader<'m>, tensor: usize) -> Result<TensorDesc<'m>, ModelError> {
    let dtype = ElementType::from_tag(r.u8()?)?;
    let rank = r.u8()? as usize;
    if rank > MAX_RANK {
        return Err(ModelError::RankTooLarge {
            tensor,
            rank,
            max: MAX_RANK,
        });
    }

    let mut shape = Vec::with_capacity(rank);
    for _ in 0..rank {
        shape.push(r.u32()? as usize);
    }
    let byte_len = shape
        .iter()
        .try_fold(dtype.size(), |acc, &d| acc.checked_mul(d))
        .filter(|&len| len > 0)
        .ok_or(ModelError::BadShape { tensor })?;

    let quant = Quantization::new(r.f32()?, r.i32()?);
    let const_len = r.u32()? as usize;
    let data = if const_len == 0 {
        None
    } else {
        if const_len != byte_len {
            return Err(ModelError::BufferSize {
                tensor,
                expected: byte_len,
                actual: const_len,
            });
        }
        Some(r.bytes(const_len)?)
    };

    Ok(TensorDesc {
        dtype,
        shape,
        quant,
        data,
    })
}

fn parse_operator(r: &mut Reader<'_>, op: usize, tensor_count: usize) -> Result<Operator, ModelError> {
    let code = OpCode::from_tag(r.u8()?)?;

    let n_in = r.u8()? as usize;
    if n_in > MAX_OP_INPUTS {
        return Err(ModelError::TooManyInputs {
            op,
            count: n_in,
            max: MAX_OP_INPUTS,
        });
    }
    let mut inputs = Vec::with_capacity(n_in);
    for _ in 0..n_in {
        let raw = r.u32()?;
        inputs.push(if raw == ABSENT_TENSOR {
            None
        } else {
            Some(checked_index(raw as usize, tensor_count)?)
        });
    }

    let n_out = r.u8()? as usize;
    if n_out != 1 {
        return Err(ModelError::OutputCount { op, count: n_out });
    }
    let output = checked_index(r.u32()? as usize, tensor_count)?;

    let options_len = r.u16()? as usize;
    let options_bytes = r.bytes(options_len)?;
    let options =
        OpOptions::decode(code, options_bytes).ok_or(ModelError::Options { op, code })?;

    Ok(Operator {
        code,
        inputs,
        output,
        options,
    })
}

fn checked_index(index: usize, count: usize) -> Result<usize, ModelError> {
    if index < count {
        Ok(index)
    } else {
        Err(ModelError::TensorIndex { index, count })
    }
}

/// Bounds-checked little-endian cursor.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], ModelError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ModelError::Truncated { offset: self.pos })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array4(&mut self) -> Result<[u8; 4], ModelError> {
        let b = self.bytes(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn u8(&mut self) -> Result<u8, ModelError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ModelError> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ModelError> {
        Ok(u32::from_le_bytes(self.array4()?))
    }

    fn i32(&mut self) -> Result<i32, ModelError> {
        Ok(i32::from_le_bytes(self.array4()?))
    }

    fn f32(&mut self) -> Result<f32, ModelError> {
        Ok(f32::from_le_bytes(self.array4()?))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ABSENT_TENSOR, ElementType, MAGIC, Model, OpCode, OpOptions, Quantization, SCHEMA_VERSION,
    };
    use crate::builder::ModelBuilder;
    use crate::error::ModelError;

    fn tiny_model() -> ModelBuilder {
        let mut b = ModelBuilder::new();
        let x = b.activation(ElementType::F32, &[1, 4], Quantization::default());
        let y = b.activation(ElementType::F32, &[1, 4], Quantization::default());
        b.op(OpCode::Logistic, &[x], y, OpOptions::None);
        b.io(x, y);
        b
    }

    #[test]
    fn parses_builder_output() {
        let bytes = tiny_model().build();
        let model = Model::parse(&bytes).expect("valid model");
        assert_eq!(model.schema_version(), SCHEMA_VERSION);
        assert_eq!(model.tensors().len(), 2);
        assert_eq!(model.operators()[0].code, OpCode::Logistic);
        assert_eq!(model.input_index(), 0);
        assert_eq!(model.output_index(), 1);
    }

    #[test]
    fn rejects_other_schema_versions() {
        let bytes = tiny_model().schema_version(SCHEMA_VERSION + 1).build();
        assert_eq!(
            Model::parse(&bytes),
            Err(ModelError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found: SCHEMA_VERSION + 1
            })
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = tiny_model().build();
        bytes[0] = b'X';
        assert!(matches!(Model::parse(&bytes), Err(ModelError::BadMagic(_))));
        assert_eq!(&tiny_model().build()[..4], &MAGIC);
    }

    #[test]
    fn every_truncation_is_an_error() {
        let bytes = tiny_model().build();
        for len in 0..bytes.len() {
            assert!(Model::parse(&bytes[..len]).is_err(), "prefix {len} parsed");
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = tiny_model().build();
        bytes.push(0);
        assert_eq!(Model::parse(&bytes), Err(ModelError::TrailingBytes(1)));
    }

    #[test]
    fn constants_borrow_from_blob() {
        let mut b = ModelBuilder::new();
        let x = b.activation(ElementType::F32, &[2], Quantization::default());
        let c = b.constant_f32(&[2], &[1.5, -2.0]);
        let y = b.activation(ElementType::F32, &[2], Quantization::default());
        b.op(OpCode::Add, &[x, c], y, OpOptions::Fused(Default::default()));
        b.io(x, y);
        let bytes = b.build();

        let model = Model::parse(&bytes).expect("valid model");
        let data = model.tensor(c).and_then(|t| t.data).expect("constant");
        assert_eq!(data.len(), 8);
        assert_eq!(f32::from_le_bytes([data[0], data[1], data[2], data[3]]), 1.5);
        let range = bytes.as_ptr_range();
        assert!(range.contains(&data.as_ptr()));
    }

    #[test]
    fn graph_order_is_validated() {
        let mut b = ModelBuilder::new();
        let x = b.activation(ElementType::F32, &[2], Quantization::default());
        let mid = b.activation(ElementType::F32, &[2], Quantization::default());
        let y = b.activation(ElementType::F32, &[2], Quantization::default());
        b.op(OpCode::Logistic, &[mid], y, OpOptions::None);
        b.op(OpCode::Logistic, &[x], mid, OpOptions::None);
        b.io(x, y);
        assert_eq!(
            Model::parse(&b.build()),
            Err(ModelError::UseBeforeWrite { op: 0, tensor: mid })
        );
    }

    #[test]
    fn absent_inputs_parse_as_none() {
        let mut bytes = tiny_model().build();
        // opcode, n_in, then the first input index
        let op_start = bytes
            .windows(2)
            .rposition(|w| w == [OpCode::Logistic.tag(), 1])
            .expect("operator header");
        bytes[op_start + 2..op_start + 6].copy_from_slice(&ABSENT_TENSOR.to_le_bytes());
        let model = Model::parse(&bytes).expect("valid model");
        assert_eq!(model.operators()[0].inputs, vec![None]);
    }

    #[test]
    fn malformed_options_are_rejected() {
        let mut b = ModelBuilder::new();
        let x = b.activation(ElementType::F32, &[2], Quantization::default());
        let y = b.activation(ElementType::F32, &[2], Quantization::default());
        b.op(OpCode::Softmax, &[x], y, OpOptions::None);
        b.io(x, y);
        assert_eq!(
            Model::parse(&b.build()),
            Err(ModelError::Options {
                op: 0,
                code: OpCode::Softmax
            })
        );
    }
}
