// Primitive types and their batching rules.
//
// Every primitive carries a static descriptor telling the batcher how many
// vertices a batch needs at minimum, how many it must re-send at the start of
// the next batch, and how many it injects per batch.

use crate::error::{FimgError, Result};

hw_enum! {
    /// Primitive type, indexed the way the draw layer hands it over.
    pub enum Primitive: "primitive" {
        PointSprites = 0 => "point_sprites",
        Points = 1 => "points",
        LineStrip = 2 => "line_strip",
        LineLoop = 3 => "line_loop",
        Lines = 4 => "lines",
        TriangleStrip = 5 => "triangle_strip",
        TriangleFan = 6 => "triangle_fan",
        Triangles = 7 => "triangles",
    }
}

/// Batching rules for one primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveDescriptor {
    /// Smallest drawable batch. Zero marks a type without a hardware path.
    pub min: usize,
    /// Vertices re-sent at the start of the next batch.
    pub overlap: usize,
    /// Vertices injected into every batch beyond the input data.
    pub extra: usize,
    pub multiple_of_two: bool,
    pub multiple_of_three: bool,
    /// Batch starts with the first vertex of the whole primitive, three times.
    pub repeat_first: bool,
    /// Batch ends with its last vertex repeated once.
    pub repeat_last: bool,
    /// Batches that do not exhaust the input keep an even size.
    pub even_unless_final: bool,
}

impl PrimitiveDescriptor {
    const fn simple(min: usize, overlap: usize) -> Self {
        Self {
            min,
            overlap,
            extra: 0,
            multiple_of_two: false,
            multiple_of_three: false,
            repeat_first: false,
            repeat_last: false,
            even_unless_final: false,
        }
    }
}

static DESCRIPTORS: [PrimitiveDescriptor; 8] = [
    // point sprites
    PrimitiveDescriptor::simple(1, 0),
    // points
    PrimitiveDescriptor::simple(1, 0),
    // line strip
    PrimitiveDescriptor::simple(2, 1),
    // line loop: decomposed into line strips by the caller
    PrimitiveDescriptor::simple(0, 0),
    // lines
    PrimitiveDescriptor {
        multiple_of_two: true,
        ..PrimitiveDescriptor::simple(2, 0)
    },
    // triangle strip
    PrimitiveDescriptor {
        extra: 1,
        repeat_last: true,
        even_unless_final: true,
        ..PrimitiveDescriptor::simple(3, 2)
    },
    // triangle fan
    PrimitiveDescriptor {
        extra: 2,
        repeat_first: true,
        ..PrimitiveDescriptor::simple(3, 2)
    },
    // triangles
    PrimitiveDescriptor {
        multiple_of_three: true,
        ..PrimitiveDescriptor::simple(3, 0)
    },
];

impl Primitive {
    /// Decode a draw-layer primitive index.
    pub fn from_index(index: u8) -> Result<Self> {
        Self::from_bits(index).ok_or(FimgError::InvalidPrimitiveIndex(index))
    }

    pub fn descriptor(self) -> &'static PrimitiveDescriptor {
        &DESCRIPTORS[self as usize]
    }

    /// Whether the hardware can draw this type without decomposition.
    pub fn is_supported(self) -> bool {
        self.descriptor().min > 0
    }

    /// One-hot code for `FGPE_VERTEX_CONTEXT`.
    pub fn hardware_code(self) -> u8 {
        match self {
            Primitive::PointSprites => 1 << 0,
            Primitive::Points => 1 << 1,
            Primitive::LineStrip => 1 << 2,
            Primitive::LineLoop => 1 << 3,
            Primitive::Lines => 1 << 4,
            Primitive::TriangleStrip => 1 << 5,
            Primitive::TriangleFan => 1 << 6,
            Primitive::Triangles => 1 << 7,
        }
    }
}
