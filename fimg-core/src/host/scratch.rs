// Per-context vertex scratch buffer.
//
// Layout (32-bit words):
//
//   [0, 40)      constant region, one 4-word slot per attribute index
//   [40, 1024)   varying region, one block per varying attribute
//
// The CPU-side copy is packed by the batcher and copied into a device buffer
// of the same size right before each transfer.

use crate::device::{BufferHandle, Device};
use crate::error::{DeviceError, FimgError, Result};
use crate::host::batch::MAX_ATTRIBUTES;

pub const SCRATCH_BYTES: usize = 4096;
pub const SCRATCH_WORDS: usize = SCRATCH_BYTES / 4;
pub const CONSTANT_SLOT_WORDS: usize = 4;
pub const CONSTANT_REGION_WORDS: usize = CONSTANT_SLOT_WORDS * MAX_ATTRIBUTES;
pub const VARYING_REGION_WORDS: usize = SCRATCH_WORDS - CONSTANT_REGION_WORDS;

/// Word offset of an attribute's constant slot.
pub const fn constant_slot_offset(slot: usize) -> usize {
    slot * CONSTANT_SLOT_WORDS
}

#[derive(Debug)]
pub struct VertexScratch {
    words: Vec<u32>,
    buffer: BufferHandle,
}

impl VertexScratch {
    /// Allocate the device side of the buffer.
    pub fn allocate<D: Device + ?Sized>(device: &mut D) -> Result<Self> {
        let buffer = device
            .alloc_buffer(SCRATCH_BYTES)
            .map_err(FimgError::ScratchAllocation)?;
        Ok(Self {
            words: vec![0; SCRATCH_WORDS],
            buffer,
        })
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }

    /// Copy the first `len` bytes into the device buffer.
    pub fn upload<D: Device + ?Sized>(&self, device: &mut D, len: usize) -> std::result::Result<(), DeviceError> {
        let len = len.min(SCRATCH_BYTES);
        let mapped = device.map_buffer(self.buffer)?;
        let bytes: &[u8] = bytemuck::cast_slice(&self.words);
        let target = mapped.get_mut(..len).ok_or_else(|| {
            DeviceError::Rejected(format!("mapped scratch buffer shorter than {len} bytes"))
        })?;
        target.copy_from_slice(&bytes[..len]);
        Ok(())
    }

    /// Return the device buffer.
    pub fn release<D: Device + ?Sized>(&self, device: &mut D) -> std::result::Result<(), DeviceError> {
        device.free_buffer(self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    #[test]
    fn regions_fill_the_buffer() {
        assert_eq!(SCRATCH_WORDS, 1024);
        assert_eq!(CONSTANT_REGION_WORDS, 40);
        assert_eq!(VARYING_REGION_WORDS, 984);
        assert_eq!(constant_slot_offset(9) + CONSTANT_SLOT_WORDS, CONSTANT_REGION_WORDS);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let mut device = MemoryDevice::new();
        device.fail_allocations(true);
        let err = VertexScratch::allocate(&mut device).unwrap_err();
        assert!(matches!(
            err,
            FimgError::ScratchAllocation(DeviceError::OutOfMemory { size: SCRATCH_BYTES })
        ));
    }

    #[test]
    fn upload_copies_prefix() {
        let mut device = MemoryDevice::new();
        let mut scratch = VertexScratch::allocate(&mut device).unwrap();
        scratch.words_mut()[0] = u32::from_ne_bytes([1, 2, 3, 4]);
        scratch.words_mut()[1] = u32::from_ne_bytes([5, 6, 7, 8]);
        scratch.upload(&mut device, 6).unwrap();
        let mapped = device.map_buffer(scratch.buffer()).unwrap();
        assert_eq!(&mapped[..8], &[1, 2, 3, 4, 5, 6, 0, 0]);
        scratch.release(&mut device).unwrap();
        assert_eq!(device.buffer_count(), 0);
    }
}
