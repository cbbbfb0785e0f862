//! Error Handling
//!
//! Error types for the FIMG core using `thiserror`.
//!
//! # Error Categories
//! - **Configuration errors**: unsupported primitive, attribute layout problems.
//!   Detected before any hardware interaction, with no state mutation.
//! - **Device timeouts**: hardware lock, pipeline drain. Lossy but recoverable,
//!   the context stays usable.
//! - **Device rejection**: a request the device refused. Fatal to the operation
//!   in progress.
//!
//! Batching and shader assembly never fail on valid input, so they have no
//! error variants of their own.

use std::time::Duration;

use thiserror::Error;

use crate::device::{BufferHandle, PipelineMask};
use crate::host::primitive::Primitive;

/// Errors reported by the device boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device did not reach the requested state in time.
    #[error("device timed out after {0:?}")]
    Timeout(Duration),

    /// The device refused a request (ioctl failure equivalent).
    #[error("device rejected request: {0}")]
    Rejected(String),

    /// No memory left for a buffer allocation.
    #[error("device out of memory allocating {size} bytes")]
    OutOfMemory { size: usize },

    /// A request referenced a buffer the device does not know.
    #[error("unknown buffer handle {0:?}")]
    InvalidBuffer(BufferHandle),
}

/// FIMG core error type.
#[derive(Error, Debug)]
pub enum FimgError {
    /// The primitive mode has no hardware path (line loops must be
    /// decomposed by the caller).
    #[error("primitive {0:?} cannot be drawn directly")]
    UnsupportedPrimitive(Primitive),

    /// A raw primitive index outside the descriptor table.
    #[error("primitive index {0} is out of range")]
    InvalidPrimitiveIndex(u8),

    /// More attribute arrays than the hardware has input slots.
    #[error("{count} attributes bound, hardware supports {max}")]
    TooManyAttributes { count: usize, max: usize },

    /// Attribute slot index outside the hardware range.
    #[error("attribute slot {0} is out of range")]
    InvalidAttributeSlot(usize),

    /// An array was bound to a slot whose element format was never set.
    #[error("attribute slot {0} has no configured format")]
    UnconfiguredAttribute(usize),

    /// Attribute data ends before the last vertex the draw would read.
    #[error("attribute slot {slot} needs {needed} bytes, only {available} available")]
    AttributeOutOfBounds {
        slot: usize,
        needed: usize,
        available: usize,
    },

    /// Texture unit index outside the supported range.
    #[error("texture unit {0} is out of range")]
    InvalidTextureUnit(usize),

    /// Fixed-function combination the pipeline cannot express.
    #[error("invalid fixed-function state: {0}")]
    InvalidState(&'static str),

    /// Exclusive hardware access was not granted in time.
    #[error("hardware lock not acquired within {0:?}")]
    LockTimeout(Duration),

    /// The pipeline did not drain in time. The device was soft reset.
    #[error("pipeline {mask:?} did not drain within {timeout:?}")]
    PipelineTimeout { mask: PipelineMask, timeout: Duration },

    /// Device-level failure.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// The per-context vertex scratch buffer could not be allocated.
    #[error("scratch buffer allocation failed: {0}")]
    ScratchAllocation(DeviceError),

    /// A name that does not match any variant of a hardware enum.
    #[error("unknown {kind} `{name}`")]
    UnknownName { kind: &'static str, name: String },

    /// Configuration values that cannot work.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read or written.
    #[error("configuration I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl FimgError {
    /// True for errors raised before any hardware interaction.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FimgError::UnsupportedPrimitive(_)
                | FimgError::InvalidPrimitiveIndex(_)
                | FimgError::TooManyAttributes { .. }
                | FimgError::InvalidAttributeSlot(_)
                | FimgError::UnconfiguredAttribute(_)
                | FimgError::AttributeOutOfBounds { .. }
                | FimgError::InvalidTextureUnit(_)
                | FimgError::InvalidState(_)
        )
    }

    /// True for timeouts; the context remains usable afterwards.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FimgError::LockTimeout(_)
                | FimgError::PipelineTimeout { .. }
                | FimgError::Device(DeviceError::Timeout(_))
        )
    }
}

/// Result type for the FIMG core.
pub type Result<T> = std::result::Result<T, FimgError>;
