//! Test Utilities
//!
//! Contexts over the in-memory device, vertex data generators and helpers
//! for reading back what the device was asked to do.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use fimg_core::device::memory::{DeviceEvent, RecordedDraw};
use fimg_core::host::scratch::CONSTANT_REGION_WORDS;
use fimg_core::regs::{ColorFormat, DataType};
use fimg_core::{ContextConfig, Gpu, HardwareContext, MemoryDevice};

pub type MockContext = HardwareContext<MemoryDevice>;

pub const COLOR_BUFFER: u32 = 0x5000_0000;

/// Configuration with short timeouts so failure tests finish quickly.
pub fn mock_config() -> ContextConfig {
    ContextConfig {
        lock_timeout_ms: 20,
        pipeline_timeout_ms: 20,
        ..ContextConfig::default()
    }
}

pub fn mock_gpu() -> Arc<Gpu<MemoryDevice>> {
    Gpu::new(MemoryDevice::new())
}

/// Context with a bound 320x240 color buffer and slot 0 configured as one
/// 32-bit word per vertex.
pub fn mock_context(gpu: &Arc<Gpu<MemoryDevice>>) -> MockContext {
    let mut ctx = HardwareContext::new(Arc::clone(gpu), mock_config()).unwrap();
    ctx.bind_color_buffer(COLOR_BUFFER, 320, 240, 320, ColorFormat::Rgb565);
    ctx.set_attribute(0, DataType::UnsignedInt, 1).unwrap();
    ctx
}

/// `count` vertices whose single word is their own index.
pub fn mock_index_vertices(count: u32) -> Vec<u8> {
    (0..count).flat_map(|v| v.to_ne_bytes()).collect()
}

/// Run `f` with exclusive access to the device.
pub fn with_device<R>(gpu: &Arc<Gpu<MemoryDevice>>, f: impl FnOnce(&mut MemoryDevice) -> R) -> R {
    let mut hw = gpu.acquire(Duration::from_secs(1)).unwrap();
    f(&mut *hw)
}

pub fn recorded_draws(gpu: &Arc<Gpu<MemoryDevice>>) -> Vec<RecordedDraw> {
    with_device(gpu, |device| device.draws())
}

pub fn events(gpu: &Arc<Gpu<MemoryDevice>>) -> Vec<DeviceEvent> {
    with_device(gpu, |device| device.events().to_vec())
}

/// Words of the first varying block of a recorded draw, one per vertex.
pub fn varying_words(draw: &RecordedDraw) -> Vec<u32> {
    draw.vertex_buffer
        .chunks_exact(4)
        .skip(CONSTANT_REGION_WORDS)
        .take(draw.vertex_count as usize)
        .map(|bytes| u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}
