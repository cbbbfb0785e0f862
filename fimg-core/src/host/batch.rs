// Vertex attribute batcher.
//
// A draw call is split into batches that fit the varying region of the
// scratch buffer. Batch sizes follow the primitive's continuation rules so
// every batch is drawable on its own and connected primitives stay
// connected across batch boundaries.

use smallvec::SmallVec;

use super::pack::{pack_run, pack_vertex, vertex_bytes};
use super::primitive::{Primitive, PrimitiveDescriptor};
use super::scratch::{constant_slot_offset, CONSTANT_REGION_WORDS, VARYING_REGION_WORDS};
use crate::error::{FimgError, Result};
use crate::regs::DataType;

/// Hardware attribute slots.
pub const MAX_ATTRIBUTES: usize = 10;
/// Largest vertex: every slot holding four 32-bit components.
pub const MAX_WORDS_PER_VERTEX: usize = MAX_ATTRIBUTES * 4;

/// Vertices that fit the varying region, by words per vertex.
static VERTICES_PER_TRANSFER: [u16; MAX_WORDS_PER_VERTEX + 1] = {
    let mut table = [0u16; MAX_WORDS_PER_VERTEX + 1];
    let mut words = 1;
    while words <= MAX_WORDS_PER_VERTEX {
        table[words] = (VARYING_REGION_WORDS / words) as u16;
        words += 1;
    }
    // An all-constant layout uses no varying space; cap it like one word.
    table[0] = table[1];
    table
};

/// Vertices per hardware transfer for a layout of `words_per_vertex`.
pub fn vertices_per_transfer(words_per_vertex: usize) -> usize {
    VERTICES_PER_TRANSFER[words_per_vertex.min(MAX_WORDS_PER_VERTEX)] as usize
}

/// Largest batch (excluding extra vertices) for a primitive and layout.
///
/// Zero for primitives without a hardware path.
pub fn calculate_batch_size(primitive: Primitive, words_per_vertex: usize) -> usize {
    let descriptor = primitive.descriptor();
    if descriptor.min == 0 {
        return 0;
    }
    vertices_per_transfer(words_per_vertex).saturating_sub(descriptor.extra)
}

// ---------------------------------------------------------------------------
// Attribute descriptors
// ---------------------------------------------------------------------------

/// Element format of an attribute slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeFormat {
    pub data_type: DataType,
    /// 1 to 4.
    pub components: u8,
}

impl AttributeFormat {
    pub fn new(data_type: DataType, components: u8) -> Self {
        Self {
            data_type,
            components,
        }
    }

    /// Bytes per element.
    pub fn width(&self) -> usize {
        self.data_type.size() * self.components as usize
    }

    /// Words per element in the scratch buffer.
    pub fn words(&self) -> usize {
        self.width().div_ceil(4)
    }
}

/// Where an attribute's data comes from for one draw.
#[derive(Debug, Clone, Copy)]
pub enum AttributeSource<'a> {
    /// One element broadcast to every vertex.
    Constant(&'a [u8]),
    /// One element per vertex, `stride` bytes apart.
    Array { data: &'a [u8], stride: usize },
}

impl<'a> AttributeSource<'a> {
    /// Interpret a pointer/stride pair; stride 0 means a constant.
    pub fn from_pointer(data: &'a [u8], stride: usize) -> Self {
        if stride == 0 {
            AttributeSource::Constant(data)
        } else {
            AttributeSource::Array { data, stride }
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, AttributeSource::Constant(_))
    }
}

/// Attribute sources bound for one draw call.
#[derive(Debug, Clone, Default)]
pub struct VertexArrays<'a> {
    bindings: SmallVec<[(usize, AttributeSource<'a>); MAX_ATTRIBUTES]>,
}

impl<'a> VertexArrays<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, slot: usize, source: AttributeSource<'a>) -> &mut Self {
        self.bindings.push((slot, source));
        self
    }

    pub fn with(mut self, slot: usize, source: AttributeSource<'a>) -> Self {
        self.bind(slot, source);
        self
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn source(&self, slot: usize) -> Option<AttributeSource<'a>> {
        self.bindings
            .iter()
            .find(|(bound, _)| *bound == slot)
            .map(|(_, source)| *source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, AttributeSource<'a>)> + '_ {
        self.bindings.iter().copied()
    }
}

// ---------------------------------------------------------------------------
// Vertex streams
// ---------------------------------------------------------------------------

/// Index buffer of an indexed draw.
#[derive(Debug, Clone, Copy)]
pub enum Indices<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
}

impl Indices<'_> {
    pub fn len(&self) -> usize {
        match self {
            Indices::U8(indices) => indices.len(),
            Indices::U16(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, position: usize) -> usize {
        match self {
            Indices::U8(indices) => indices[position] as usize,
            Indices::U16(indices) => indices[position] as usize,
        }
    }

    pub fn max(&self) -> Option<usize> {
        match self {
            Indices::U8(indices) => indices.iter().max().map(|i| *i as usize),
            Indices::U16(indices) => indices.iter().max().map(|i| *i as usize),
        }
    }
}

/// The sequence of source vertices a draw walks.
#[derive(Debug, Clone, Copy)]
pub enum VertexStream<'a> {
    Direct { first: usize, count: usize },
    Indexed(Indices<'a>),
}

impl VertexStream<'_> {
    pub fn len(&self) -> usize {
        match self {
            VertexStream::Direct { count, .. } => *count,
            VertexStream::Indexed(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source vertex at stream position `position`.
    pub fn vertex(&self, position: usize) -> usize {
        match self {
            VertexStream::Direct { first, .. } => first + position,
            VertexStream::Indexed(indices) => indices.get(position),
        }
    }

    /// Highest source vertex the stream reads, saturating at `usize::MAX`.
    pub fn highest(&self) -> Option<usize> {
        match self {
            VertexStream::Direct { first, count } => count.checked_sub(1).map(|last| first.saturating_add(last)),
            VertexStream::Indexed(indices) => indices.max(),
        }
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Placement of one active attribute in the scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributePlacement {
    pub slot: usize,
    pub format: AttributeFormat,
    pub constant: bool,
    /// Word offset of the constant slot or varying block.
    pub offset: usize,
}

/// Scratch layout of a draw call's attributes, fixed for the whole draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    attributes: SmallVec<[AttributePlacement; MAX_ATTRIBUTES]>,
    words_per_vertex: usize,
    capacity: usize,
}

impl BatchLayout {
    /// Validate bindings against configured slot formats and place them.
    ///
    /// Nothing is mutated when this fails.
    pub fn new(formats: &[Option<AttributeFormat>], arrays: &VertexArrays<'_>) -> Result<Self> {
        if arrays.len() > MAX_ATTRIBUTES {
            return Err(FimgError::TooManyAttributes {
                count: arrays.len(),
                max: MAX_ATTRIBUTES,
            });
        }

        let mut bound: SmallVec<[(usize, AttributeFormat, bool); MAX_ATTRIBUTES]> = SmallVec::new();
        for (slot, source) in arrays.iter() {
            if slot >= MAX_ATTRIBUTES {
                return Err(FimgError::InvalidAttributeSlot(slot));
            }
            if bound.iter().any(|(other, _, _)| *other == slot) {
                return Err(FimgError::InvalidState("attribute slot bound twice"));
            }
            let format = formats
                .get(slot)
                .copied()
                .flatten()
                .ok_or(FimgError::UnconfiguredAttribute(slot))?;
            bound.push((slot, format, source.is_constant()));
        }
        bound.sort_unstable_by_key(|(slot, _, _)| *slot);

        let words_per_vertex: usize = bound
            .iter()
            .filter(|(_, _, constant)| !constant)
            .map(|(_, format, _)| format.words())
            .sum();
        let capacity = vertices_per_transfer(words_per_vertex);

        let mut next_block = CONSTANT_REGION_WORDS;
        let attributes = bound
            .into_iter()
            .map(|(slot, format, constant)| {
                let offset = if constant {
                    constant_slot_offset(slot)
                } else {
                    let offset = next_block;
                    next_block += format.words() * capacity;
                    offset
                };
                AttributePlacement {
                    slot,
                    format,
                    constant,
                    offset,
                }
            })
            .collect();

        Ok(Self {
            attributes,
            words_per_vertex,
            capacity,
        })
    }

    pub fn attributes(&self) -> &[AttributePlacement] {
        &self.attributes
    }

    /// Words per vertex over varying attributes.
    pub fn words_per_vertex(&self) -> usize {
        self.words_per_vertex
    }

    /// Vertices per transfer, extra vertices included.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes of scratch a transfer has to carry.
    pub fn transfer_bytes(&self) -> usize {
        4 * (CONSTANT_REGION_WORDS + self.words_per_vertex * self.capacity)
    }

    /// Check that every source covers what the stream will read.
    pub fn validate_bounds(&self, arrays: &VertexArrays<'_>, stream: &VertexStream<'_>) -> Result<()> {
        let highest = stream.highest();
        for placement in &self.attributes {
            let width = placement.format.width();
            let needed = match arrays.source(placement.slot) {
                Some(AttributeSource::Constant(data)) => (width, data.len()),
                Some(AttributeSource::Array { data, stride }) => match highest {
                    Some(last) => {
                        let end = last.checked_mul(stride).and_then(|offset| offset.checked_add(width));
                        (end.unwrap_or(usize::MAX), data.len())
                    }
                    None => continue,
                },
                None => continue,
            };
            if needed.0 > needed.1 {
                return Err(FimgError::AttributeOutOfBounds {
                    slot: placement.slot,
                    needed: needed.0,
                    available: needed.1,
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Batch planning
// ---------------------------------------------------------------------------

/// One hardware-sized slice of a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    /// Stream position of the first vertex read from the input.
    pub start: usize,
    /// Input vertices covered, overlap included.
    pub size: usize,
    /// Vertices submitted to the hardware (`size + extra`).
    pub emitted: usize,
    /// Input vertices this batch retires (`size - overlap`).
    pub consumed: usize,
}

/// Batch size arithmetic, independent of the vertex data.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    descriptor: &'static PrimitiveDescriptor,
    batch_size: usize,
    cursor: usize,
    remaining: usize,
}

impl BatchPlanner {
    pub fn new(primitive: Primitive, words_per_vertex: usize, count: usize) -> Self {
        Self {
            descriptor: primitive.descriptor(),
            batch_size: calculate_batch_size(primitive, words_per_vertex),
            cursor: 0,
            remaining: count,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Input vertices not yet retired.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl Iterator for BatchPlanner {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let descriptor = self.descriptor;
        if descriptor.min == 0 {
            return None;
        }
        let mut size = self.batch_size.min(self.remaining);
        let exhausts_input = size == self.remaining;
        if descriptor.multiple_of_two {
            size -= size % 2;
        }
        if descriptor.multiple_of_three {
            size -= size % 3;
        }
        if descriptor.even_unless_final && !exhausts_input {
            size -= size % 2;
        }
        if size < descriptor.min {
            return None;
        }

        let consumed = size - descriptor.overlap;
        let batch = Batch {
            start: self.cursor,
            size,
            emitted: size + descriptor.extra,
            consumed,
        };
        self.cursor += consumed;
        self.remaining -= consumed;
        Some(batch)
    }
}

/// Stretch of stream positions emitted for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run {
    Span { start: usize, len: usize },
    Repeat { position: usize, times: usize },
}

impl Run {
    fn len(self) -> usize {
        match self {
            Run::Span { len, .. } => len,
            Run::Repeat { times, .. } => times,
        }
    }
}

fn emission_runs(descriptor: &PrimitiveDescriptor, batch: &Batch) -> SmallVec<[Run; 2]> {
    let mut runs = SmallVec::new();
    if descriptor.repeat_first {
        // The fan center takes the slot of the batch's first vertex.
        runs.push(Run::Repeat {
            position: 0,
            times: 3,
        });
        runs.push(Run::Span {
            start: batch.start + 1,
            len: batch.size - 1,
        });
    } else {
        runs.push(Run::Span {
            start: batch.start,
            len: batch.size,
        });
        if descriptor.repeat_last {
            runs.push(Run::Repeat {
                position: batch.start + batch.size - 1,
                times: 1,
            });
        }
    }
    runs
}

// ---------------------------------------------------------------------------
// Batcher
// ---------------------------------------------------------------------------

/// Plans batches and packs their vertices into the scratch buffer.
pub struct Batcher<'l, 'a> {
    planner: BatchPlanner,
    layout: &'l BatchLayout,
    arrays: &'l VertexArrays<'a>,
    stream: VertexStream<'l>,
}

impl<'l, 'a> Batcher<'l, 'a> {
    pub fn new(
        primitive: Primitive,
        layout: &'l BatchLayout,
        arrays: &'l VertexArrays<'a>,
        stream: VertexStream<'l>,
    ) -> Self {
        Self {
            planner: BatchPlanner::new(primitive, layout.words_per_vertex(), stream.len()),
            layout,
            arrays,
            stream,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.planner.batch_size()
    }

    pub fn remaining(&self) -> usize {
        self.planner.remaining()
    }

    /// Plan the next batch and pack it into `scratch`.
    ///
    /// `None` means nothing more is drawable.
    pub fn next_batch(&mut self, scratch: &mut [u32]) -> Option<Batch> {
        let batch = self.planner.next()?;
        let runs = emission_runs(self.planner.descriptor, &batch);
        for placement in self.layout.attributes() {
            let width = placement.format.width();
            let words = placement.format.words();
            match self.arrays.source(placement.slot) {
                Some(AttributeSource::Constant(data)) => {
                    let slot = &mut scratch[placement.offset..placement.offset + words];
                    pack_vertex(slot, &data[..width]);
                }
                Some(AttributeSource::Array { data, stride }) => {
                    let mut dst = placement.offset;
                    for run in &runs {
                        let len = run.len() * words;
                        self.pack_attribute_run(&mut scratch[dst..dst + len], *run, data, stride, width, words);
                        dst += len;
                    }
                }
                None => {}
            }
        }
        log::trace!(
            "batch start={} size={} emitted={}",
            batch.start,
            batch.size,
            batch.emitted
        );
        Some(batch)
    }

    fn pack_attribute_run(&self, dst: &mut [u32], run: Run, data: &[u8], stride: usize, width: usize, words: usize) {
        match (run, self.stream) {
            (Run::Span { start, len }, VertexStream::Direct { first, .. }) => {
                pack_run(dst, data, stride, width, first + start, len);
            }
            (Run::Span { start, .. }, VertexStream::Indexed(indices)) => {
                for (i, vertex) in dst.chunks_exact_mut(words).enumerate() {
                    pack_vertex(vertex, vertex_bytes(data, stride, width, indices.get(start + i)));
                }
            }
            (Run::Repeat { position, .. }, stream) => {
                let source = vertex_bytes(data, stride, width, stream.vertex(position));
                for vertex in dst.chunks_exact_mut(words) {
                    pack_vertex(vertex, source);
                }
            }
        }
    }
}
