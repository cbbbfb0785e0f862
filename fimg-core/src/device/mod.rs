//! Device boundary.
//!
//! The core never touches register space or kernel interfaces directly. It
//! talks to an injected [`Device`] which may block and may fail. A [`Gpu`]
//! wraps one device for all contexts that render on it and serializes access
//! with an exclusive, bounded acquisition.

pub mod memory;

use std::fmt;
use std::ops::{BitOr, BitOrAssign, Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{DeviceError, FimgError};

pub use memory::MemoryDevice;

/// Poll interval while another context holds the hardware.
const LOCK_POLL_INTERVAL: Duration = Duration::from_micros(50);

/// One queued register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterWrite {
    pub register: u32,
    pub value: u32,
}

impl RegisterWrite {
    pub const fn new(register: u32, value: u32) -> Self {
        Self { register, value }
    }
}

/// Opaque handle of a device-allocated buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Selects pipeline stages for [`Device::wait_idle`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineMask(u32);

impl PipelineMask {
    pub const HOST_INTERFACE: Self = Self(1 << 0);
    pub const HOST_FIFO: Self = Self(1 << 1);
    pub const VERTEX_SHADER: Self = Self(1 << 2);
    pub const PRIMITIVE_ENGINE: Self = Self(1 << 3);
    pub const RASTER_ENGINE: Self = Self(1 << 4);
    pub const PIXEL_SHADER: Self = Self(1 << 5);
    pub const PER_FRAGMENT: Self = Self(1 << 6);
    pub const ALL: Self = Self(0x7F);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PipelineMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PipelineMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PipelineMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 7] = ["HI", "FIFO", "VS", "PE", "RA", "PS", "PF"];
        if *self == Self::ALL {
            return f.write_str("ALL");
        }
        let names: Vec<&str> = NAMES
            .iter()
            .enumerate()
            .filter(|(bit, _)| self.0 & (1 << bit) != 0)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", names.join("|"))
    }
}

/// A single unit of work handed to the device.
///
/// One [`Device::submit`] call delivers its whole request list atomically:
/// a request the device cannot accept rejects the submission before any is applied.
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    /// Register writes, applied in order.
    Registers(&'a [RegisterWrite]),
    /// Bulk write of words into instruction or constant memory.
    Memory { address: u32, words: &'a [u32] },
    /// Transfer the first `len` bytes of a buffer into the vertex buffer.
    Transfer { buffer: BufferHandle, len: usize },
    /// Autoincrementing draw of `vertex_count` vertices from the vertex buffer.
    Draw { vertex_count: u32 },
}

/// Capability object for one physical GPU.
///
/// All operations may block and may fail. Implementations must not retry
/// internally; the core decides what a failure means.
pub trait Device: Send {
    /// Read a register at `offset` from the register base.
    fn read_register(&mut self, offset: u32) -> Result<u32, DeviceError>;

    /// Write a register immediately, bypassing any batching.
    fn write_register(&mut self, offset: u32, value: u32) -> Result<(), DeviceError>;

    /// Submit a request list in one operation.
    fn submit(&mut self, requests: &[Request<'_>]) -> Result<(), DeviceError>;

    /// Block until the selected pipeline stages are idle.
    fn wait_idle(&mut self, mask: PipelineMask, timeout: Duration) -> Result<(), DeviceError>;

    /// Reset the GPU core without touching memory.
    fn soft_reset(&mut self) -> Result<(), DeviceError>;

    /// Allocate a GPU-visible buffer of `size` bytes.
    fn alloc_buffer(&mut self, size: usize) -> Result<BufferHandle, DeviceError>;

    /// Map a buffer for CPU access.
    fn map_buffer(&mut self, buffer: BufferHandle) -> Result<&mut [u8], DeviceError>;

    /// Release a buffer.
    fn free_buffer(&mut self, buffer: BufferHandle) -> Result<(), DeviceError>;
}

/// One physical GPU shared by every context rendering on it.
pub struct Gpu<D> {
    device: Mutex<D>,
    /// Context that last held the hardware (0 = none).
    owner: AtomicU64,
    next_context: AtomicU64,
}

impl<D: Device> Gpu<D> {
    pub fn new(device: D) -> Arc<Self> {
        Arc::new(Self {
            device: Mutex::new(device),
            owner: AtomicU64::new(0),
            next_context: AtomicU64::new(1),
        })
    }

    /// Hand out a process-unique context id.
    pub(crate) fn register_context(&self) -> u64 {
        self.next_context.fetch_add(1, Ordering::Relaxed)
    }

    /// Acquire exclusive hardware access, polling until `timeout` elapses.
    ///
    /// The returned guard releases the hardware when dropped, on every exit
    /// path.
    pub fn acquire(&self, timeout: Duration) -> Result<HardwareGuard<'_, D>, FimgError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.device.try_lock() {
                Ok(device) => return Ok(HardwareGuard { device, gpu: self }),
                Err(TryLockError::Poisoned(poisoned)) => {
                    // Register state is replayed from the shadow on the next
                    // claim, so the device value itself is still usable.
                    log::warn!("hardware lock poisoned by a panicking holder, recovering");
                    return Ok(HardwareGuard {
                        device: poisoned.into_inner(),
                        gpu: self,
                    });
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(FimgError::LockTimeout(timeout));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
            }
        }
    }
}

/// Scoped exclusive access to the device.
pub struct HardwareGuard<'a, D> {
    device: MutexGuard<'a, D>,
    gpu: &'a Gpu<D>,
}

impl<D> HardwareGuard<'_, D> {
    /// Record `context` as the current hardware owner.
    ///
    /// Returns true when some other context used the hardware since
    /// `context` last held it, meaning its register state may be gone.
    pub(crate) fn claim(&self, context: u64) -> bool {
        self.gpu.owner.swap(context, Ordering::AcqRel) != context
    }
}

impl<D> Deref for HardwareGuard<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.device
    }
}

impl<D> DerefMut for HardwareGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_mask_combines_and_formats() {
        let mask = PipelineMask::HOST_INTERFACE | PipelineMask::VERTEX_SHADER;
        assert!(mask.contains(PipelineMask::VERTEX_SHADER));
        assert!(!mask.contains(PipelineMask::PIXEL_SHADER));
        assert_eq!(format!("{mask:?}"), "[HI|VS]");
        assert_eq!(format!("{:?}", PipelineMask::ALL), "ALL");
        assert_eq!(PipelineMask::from_bits(0xFFFF_FFFF), PipelineMask::ALL);
    }

    #[test]
    fn acquire_times_out_while_held() {
        let gpu = Gpu::new(MemoryDevice::new());
        let held = gpu.acquire(Duration::from_millis(10)).unwrap();
        let err = match gpu.acquire(Duration::from_millis(5)) {
            Err(err) => err,
            Ok(_) => panic!("second acquisition must time out"),
        };
        assert!(matches!(err, FimgError::LockTimeout(_)));
        drop(held);
        assert!(gpu.acquire(Duration::from_millis(5)).is_ok());
    }

    #[test]
    fn claim_reports_foreign_owner() {
        let gpu = Gpu::new(MemoryDevice::new());
        let a = gpu.register_context();
        let b = gpu.register_context();
        let guard = gpu.acquire(Duration::from_millis(10)).unwrap();
        assert!(guard.claim(a));
        assert!(!guard.claim(a));
        assert!(guard.claim(b));
        assert!(guard.claim(a));
    }
}
