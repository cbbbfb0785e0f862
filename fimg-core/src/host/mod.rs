// Host interface: register channel, primitive table, vertex batching.

pub mod batch;
pub mod channel;
pub mod pack;
pub mod primitive;
pub mod scratch;

pub use batch::{
    calculate_batch_size, AttributeFormat, AttributeSource, Batch, BatchLayout, BatchPlanner, Batcher, Indices,
    VertexArrays, VertexStream, MAX_ATTRIBUTES,
};
pub use channel::{RegisterChannel, RegisterQueue};
pub use primitive::{Primitive, PrimitiveDescriptor};
pub use scratch::VertexScratch;
