use thiserror::Error;

use crate::model::OpCode;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("model schema version {found} is not supported (expected {expected})")]
    SchemaVersion { expected: u32, found: u32 },
    #[error("model truncated at byte {offset}")]
    Truncated { offset: usize },
    #[error("{0} trailing bytes after model")]
    TrailingBytes(usize),
    #[error("unknown element type tag {0}")]
    UnknownElementType(u8),
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("tensor {tensor} has rank {rank} (max {max})")]
    RankTooLarge { tensor: usize, rank: usize, max: usize },
    #[error("tensor {tensor} has an empty or overflowing shape")]
    BadShape { tensor: usize },
    #[error("tensor {tensor} constant holds {actual} bytes, expected {expected}")]
    BufferSize {
        tensor: usize,
        expected: usize,
        actual: usize,
    },
    #[error("tensor index {index} out of range ({count} tensors)")]
    TensorIndex { index: usize, count: usize },
    #[error("operator {op} has {count} inputs (max {max})")]
    TooManyInputs { op: usize, count: usize, max: usize },
    #[error("operator {op} has {count} outputs, expected 1")]
    OutputCount { op: usize, count: usize },
    #[error("operator {op} writes constant tensor {tensor}")]
    ConstOutput { op: usize, tensor: usize },
    #[error("tensor {tensor} is written by operators {first} and {second}")]
    MultipleWriters {
        tensor: usize,
        first: usize,
        second: usize,
    },
    #[error("operator {op} reads tensor {tensor} before it is written")]
    UseBeforeWrite { op: usize, tensor: usize },
    #[error("operator {op} overwrites the model input")]
    WritesInput { op: usize },
    #[error("model input/output tensor {0} must not be constant")]
    ConstEndpoint(usize),
    #[error("operator {op} ({code:?}) has malformed options")]
    Options { op: usize, code: OpCode },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("could not allocate a {size} byte arena from {primary} or {secondary}")]
    Exhausted {
        size: usize,
        primary: &'static str,
        secondary: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    #[error("resolver is full ({capacity} operators)")]
    Full { capacity: usize },
    #[error("operator {0:?} is already registered")]
    Duplicate(OpCode),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("missing input {0}")]
    MissingInput(usize),
    #[error("expected {min}..={max} inputs, got {actual}")]
    InputCount {
        min: usize,
        max: usize,
        actual: usize,
    },
    #[error("input {0} must be a constant tensor")]
    NotConstant(usize),
    #[error("shape mismatch: {0}")]
    Shape(&'static str),
    #[error("wrong options for this operator")]
    Options,
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("operator {op} uses unregistered kernel {code:?}")]
    UnregisteredOperator { op: usize, code: OpCode },
    #[error("tensor plan needs {required} bytes, arena has {available}")]
    ArenaTooSmall { required: usize, available: usize },
    #[error("operator {op} ({code:?}) failed to prepare: {source}")]
    Prepare {
        op: usize,
        code: OpCode,
        source: KernelError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("operator {op} ({code:?}) failed: {source}")]
    Kernel {
        op: usize,
        code: OpCode,
        source: KernelError,
    },
    #[error("operator {op} input overlaps its output in the arena")]
    Aliasing { op: usize },
}
