//! In-memory device.
//!
//! Models register space, instruction/constant memory and buffers in plain
//! maps and records every request, so draws can be inspected without
//! hardware. Faults can be scheduled to exercise the error paths.

use std::collections::HashMap;
use std::time::Duration;

use super::{BufferHandle, Device, PipelineMask, RegisterWrite, Request};
use crate::error::DeviceError;
use crate::regs;

/// Value reported by the version register.
pub const MEMORY_DEVICE_VERSION: u32 = 0x0105_0000;

/// Something the device was asked to do, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A batch of queued register writes.
    Registers(Vec<RegisterWrite>),
    /// An immediate register write.
    DirectWrite(RegisterWrite),
    /// Bulk memory write.
    Memory { address: u32, words: Vec<u32> },
    /// Vertex buffer transfer; holds the transferred bytes.
    Transfer { bytes: Vec<u8> },
    /// Draw command.
    Draw { vertex_count: u32 },
    /// Pipeline drain.
    WaitIdle(PipelineMask),
    /// Soft reset.
    SoftReset,
}

/// A draw as the hardware saw it: the vertex buffer contents and count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDraw {
    pub vertex_buffer: Vec<u8>,
    pub vertex_count: u32,
}

#[derive(Debug, Default)]
struct Faults {
    wait_timeouts: usize,
    rejected_submissions: usize,
    memory_rejections: usize,
    fail_allocations: bool,
}

#[derive(Debug, Default)]
pub struct MemoryDevice {
    registers: HashMap<u32, u32>,
    memory: HashMap<u32, u32>,
    buffers: HashMap<u32, Vec<u8>>,
    next_buffer: u32,
    vertex_buffer: Vec<u8>,
    events: Vec<DeviceEvent>,
    faults: Faults,
}

impl MemoryDevice {
    pub fn new() -> Self {
        let mut registers = HashMap::new();
        registers.insert(regs::FGGB_VERSION, MEMORY_DEVICE_VERSION);
        Self {
            registers,
            next_buffer: 1,
            ..Default::default()
        }
    }

    /// Make the next `count` waits time out.
    pub fn fail_next_waits(&mut self, count: usize) {
        self.faults.wait_timeouts = count;
    }

    /// Reject the next `count` submissions.
    pub fn reject_next_submissions(&mut self, count: usize) {
        self.faults.rejected_submissions = count;
    }

    /// Reject the next `count` submissions that carry a memory write.
    pub fn reject_next_memory_writes(&mut self, count: usize) {
        self.faults.memory_rejections = count;
    }

    /// Make buffer allocation fail.
    pub fn fail_allocations(&mut self, fail: bool) {
        self.faults.fail_allocations = fail;
    }

    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Current value of a register, as last written.
    pub fn register(&self, offset: u32) -> Option<u32> {
        self.registers.get(&offset).copied()
    }

    /// Word at a byte address in instruction/constant memory.
    pub fn memory_word(&self, address: u32) -> Option<u32> {
        self.memory.get(&address).copied()
    }

    /// Read `count` consecutive words starting at `address`.
    pub fn memory_words(&self, address: u32, count: usize) -> Vec<u32> {
        (0..count as u32)
            .map(|i| self.memory_word(address + i * 4).unwrap_or(0))
            .collect()
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Every draw so far, paired with the vertex buffer it consumed.
    pub fn draws(&self) -> Vec<RecordedDraw> {
        let mut current = Vec::new();
        let mut draws = Vec::new();
        for event in &self.events {
            match event {
                DeviceEvent::Transfer { bytes } => current = bytes.clone(),
                DeviceEvent::Draw { vertex_count } => draws.push(RecordedDraw {
                    vertex_buffer: current.clone(),
                    vertex_count: *vertex_count,
                }),
                _ => {}
            }
        }
        draws
    }

    /// Number of bulk memory writes that landed in `[start, end)`.
    pub fn memory_writes_in(&self, start: u32, end: u32) -> usize {
        self.events
            .iter()
            .filter(|event| {
                matches!(event, DeviceEvent::Memory { address, .. }
                    if *address >= start && *address < end)
            })
            .count()
    }

    /// Reject a request up front so a submission is applied whole or not at all.
    fn check(&self, request: &Request<'_>) -> Result<(), DeviceError> {
        if let Request::Transfer { buffer, len } = *request {
            let data = self
                .buffers
                .get(&buffer.0)
                .ok_or(DeviceError::InvalidBuffer(buffer))?;
            if len > data.len() {
                return Err(DeviceError::Rejected(format!("transfer of {len} bytes overruns buffer")));
            }
        }
        Ok(())
    }

    fn apply(&mut self, request: &Request<'_>) -> Result<(), DeviceError> {
        match *request {
            Request::Registers(writes) => {
                for write in writes {
                    self.registers.insert(write.register, write.value);
                }
                self.events.push(DeviceEvent::Registers(writes.to_vec()));
            }
            Request::Memory { address, words } => {
                for (i, word) in words.iter().enumerate() {
                    self.memory.insert(address + 4 * i as u32, *word);
                }
                self.events.push(DeviceEvent::Memory {
                    address,
                    words: words.to_vec(),
                });
            }
            Request::Transfer { buffer, len } => {
                let data = self
                    .buffers
                    .get(&buffer.0)
                    .ok_or(DeviceError::InvalidBuffer(buffer))?;
                let bytes = data
                    .get(..len)
                    .ok_or_else(|| DeviceError::Rejected(format!("transfer of {len} bytes overruns buffer")))?
                    .to_vec();
                self.vertex_buffer = bytes.clone();
                self.events.push(DeviceEvent::Transfer { bytes });
            }
            Request::Draw { vertex_count } => {
                self.events.push(DeviceEvent::Draw { vertex_count });
            }
        }
        Ok(())
    }
}

impl Device for MemoryDevice {
    fn read_register(&mut self, offset: u32) -> Result<u32, DeviceError> {
        Ok(self.register(offset).unwrap_or(0))
    }

    fn write_register(&mut self, offset: u32, value: u32) -> Result<(), DeviceError> {
        self.registers.insert(offset, value);
        self.events
            .push(DeviceEvent::DirectWrite(RegisterWrite::new(offset, value)));
        Ok(())
    }

    fn submit(&mut self, requests: &[Request<'_>]) -> Result<(), DeviceError> {
        if self.faults.rejected_submissions > 0 {
            self.faults.rejected_submissions -= 1;
            return Err(DeviceError::Rejected("submission refused".into()));
        }
        let carries_memory = requests
            .iter()
            .any(|request| matches!(request, Request::Memory { .. }));
        if carries_memory && self.faults.memory_rejections > 0 {
            self.faults.memory_rejections -= 1;
            return Err(DeviceError::Rejected("memory write refused".into()));
        }
        for request in requests {
            self.check(request)?;
        }
        for request in requests {
            self.apply(request)?;
        }
        Ok(())
    }

    fn wait_idle(&mut self, mask: PipelineMask, timeout: Duration) -> Result<(), DeviceError> {
        self.events.push(DeviceEvent::WaitIdle(mask));
        if self.faults.wait_timeouts > 0 {
            self.faults.wait_timeouts -= 1;
            return Err(DeviceError::Timeout(timeout));
        }
        Ok(())
    }

    fn soft_reset(&mut self) -> Result<(), DeviceError> {
        // Reset clears register state but keeps memory contents.
        self.registers.clear();
        self.registers.insert(regs::FGGB_VERSION, MEMORY_DEVICE_VERSION);
        self.events.push(DeviceEvent::SoftReset);
        Ok(())
    }

    fn alloc_buffer(&mut self, size: usize) -> Result<BufferHandle, DeviceError> {
        if self.faults.fail_allocations {
            return Err(DeviceError::OutOfMemory { size });
        }
        let handle = self.next_buffer;
        self.next_buffer += 1;
        self.buffers.insert(handle, vec![0; size]);
        Ok(BufferHandle(handle))
    }

    fn map_buffer(&mut self, buffer: BufferHandle) -> Result<&mut [u8], DeviceError> {
        self.buffers
            .get_mut(&buffer.0)
            .map(Vec::as_mut_slice)
            .ok_or(DeviceError::InvalidBuffer(buffer))
    }

    fn free_buffer(&mut self, buffer: BufferHandle) -> Result<(), DeviceError> {
        self.buffers
            .remove(&buffer.0)
            .map(|_| ())
            .ok_or(DeviceError::InvalidBuffer(buffer))
    }
}
