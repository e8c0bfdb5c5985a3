use crate::error::ArenaError;
use crate::model::Model;

/// Byte alignment of every tensor placed in the arena.
pub const TENSOR_ALIGN: usize = 16;

/// A memory region the tensor arena can be carved from.
pub trait ArenaPool {
    fn name(&self) -> &'static str;
    /// Returns a zeroed buffer, or `None` if the pool cannot satisfy `size`.
    fn allocate(&self, size: usize) -> Option<Box<[u8]>>;
}

/// Heap-backed pool with an optional capacity cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapPool {
    name: &'static str,
    limit: Option<usize>,
}

impl HeapPool {
    /// Large, slower memory tried first (PSRAM on the reference board).
    pub fn external() -> Self {
        Self {
            name: "external",
            limit: None,
        }
    }

    /// Fast on-chip memory used when the external pool fails.
    pub fn internal() -> Self {
        Self {
            name: "internal",
            limit: None,
        }
    }

    pub fn with_limit(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            limit: Some(limit),
        }
    }
}

impl ArenaPool for HeapPool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn allocate(&self, size: usize) -> Option<Box<[u8]>> {
        if self.limit.is_some_and(|limit| size > limit) {
            return None;
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).ok()?;
        buf.resize(size, 0u8);
        Some(buf.into_boxed_slice())
    }
}

/// The fixed working buffer holding every activation tensor.
#[derive(Debug)]
pub struct TensorArena {
    buf: Box<[u8]>,
    source: &'static str,
}

impl TensorArena {
    /// Allocates `size` bytes from `primary`, falling back to `secondary`.
    pub fn allocate(
        size: usize,
        primary: &dyn ArenaPool,
        secondary: &dyn ArenaPool,
    ) -> Result<Self, ArenaError> {
        if let Some(buf) = primary.allocate(size) {
            tracing::debug!(size, pool = primary.name(), "tensor arena allocated");
            return Ok(Self {
                buf,
                source: primary.name(),
            });
        }
        tracing::warn!(
            size,
            primary = primary.name(),
            fallback = secondary.name(),
            "primary pool exhausted, falling back"
        );
        match secondary.allocate(size) {
            Some(buf) => Ok(Self {
                buf,
                source: secondary.name(),
            }),
            None => Err(ArenaError::Exhausted {
                size,
                primary: primary.name(),
                secondary: secondary.name(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Name of the pool the buffer came from.
    pub fn source(&self) -> &'static str {
        self.source
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

/// Offsets of every activation tensor inside the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaPlan {
    offsets: Vec<Option<usize>>,
    required: usize,
}

impl ArenaPlan {
    /// Greedy first-fit placement, largest tensors first.
    ///
    /// A tensor lives from the operator that writes it to the last operator
    /// reading it. The model input and output span the whole invocation.
    /// Tensors whose lifetimes overlap never share bytes.
    pub fn new(model: &Model<'_>) -> Self {
        let tensors = model.tensors();
        let op_count = model.operators().len();
        let mut lifetime: Vec<Option<(usize, usize)>> = vec![None; tensors.len()];

        lifetime[model.input_index()] = Some((0, op_count));
        for (i, op) in model.operators().iter().enumerate() {
            for &t in op.inputs.iter().flatten() {
                if let Some((_, last)) = lifetime[t].as_mut() {
                    *last = (*last).max(i);
                }
            }
            lifetime[op.output] = Some((i, i));
        }
        if let Some((_, last)) = lifetime[model.output_index()].as_mut() {
            *last = op_count;
        }

        let mut order: Vec<usize> = (0..tensors.len())
            .filter(|&t| lifetime[t].is_some() && !tensors[t].is_const())
            .collect();
        order.sort_by(|&a, &b| {
            tensors[b]
                .byte_len()
                .cmp(&tensors[a].byte_len())
                .then(a.cmp(&b))
        });

        let mut offsets = vec![None; tensors.len()];
        let mut placed: Vec<(usize, usize, (usize, usize))> = Vec::with_capacity(order.len());
        let mut required = 0usize;

        for t in order {
            let Some(life) = lifetime[t] else { continue };
            let size = tensors[t].byte_len();

            let mut conflicts: Vec<(usize, usize)> = placed
                .iter()
                .filter(|(_, _, other)| life.0 <= other.1 && other.0 <= life.1)
                .map(|&(start, end, _)| (start, end))
                .collect();
            conflicts.sort_unstable();

            let mut offset = 0usize;
            for (start, end) in conflicts {
                if offset + size <= start {
                    break;
                }
                offset = offset.max(align_up(end));
            }

            offsets[t] = Some(offset);
            placed.push((offset, offset + size, life));
            required = required.max(offset + size);
        }

        Self { offsets, required }
    }

    pub fn offset(&self, tensor: usize) -> Option<usize> {
        self.offsets.get(tensor).copied().flatten()
    }

    /// Arena bytes the plan needs.
    pub fn required(&self) -> usize {
        self.required
    }
}

fn align_up(v: usize) -> usize {
    v.div_ceil(TENSOR_ALIGN) * TENSOR_ALIGN
}
