// Register/command channel.
//
// Register writes are mirrored into a shadow register file and queued for the
// device. Writes that do not change the shadow value are dropped, repeated
// writes to the most recently queued register collapse into one entry, and
// the queue is delivered in one submission on flush. When the queue fills up,
// further writes only reach the shadow and the next flush replays the whole
// shadow instead of the queue.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::device::{Device, RegisterWrite, Request};
use crate::error::DeviceError;

/// Inline capacity of the queue; larger configured capacities spill to the
/// heap.
const INLINE_QUEUE_LEN: usize = 64;

/// Bounded FIFO of pending register writes.
#[derive(Debug, Clone)]
pub struct RegisterQueue {
    entries: SmallVec<[RegisterWrite; INLINE_QUEUE_LEN]>,
    capacity: usize,
    overflowed: bool,
}

impl RegisterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: SmallVec::new(),
            capacity,
            overflowed: false,
        }
    }

    /// Queue a write. Returns false when the write was dropped because the
    /// queue is full.
    pub fn push(&mut self, write: RegisterWrite) -> bool {
        if let Some(last) = self.entries.last_mut() {
            if last.register == write.register {
                last.value = write.value;
                return true;
            }
        }
        if self.entries.len() >= self.capacity {
            if !self.overflowed {
                log::warn!(
                    "register queue full ({} entries), dropping writes until next flush",
                    self.capacity
                );
            }
            self.overflowed = true;
            return false;
        }
        self.entries.push(write);
        true
    }

    pub fn entries(&self) -> &[RegisterWrite] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Some writes were dropped since the last clear.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.overflowed = false;
    }
}

/// Queue plus shadow register file for one hardware context.
#[derive(Debug, Clone)]
pub struct RegisterChannel {
    queue: RegisterQueue,
    shadow: BTreeMap<u32, u32>,
    /// The hardware may disagree with the shadow (failed or dropped flush).
    stale: bool,
}

impl RegisterChannel {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue: RegisterQueue::new(queue_capacity),
            shadow: BTreeMap::new(),
            stale: false,
        }
    }

    /// Record a register value and queue it if it differs from the shadow.
    pub fn write(&mut self, register: u32, value: u32) {
        if self.shadow.insert(register, value) == Some(value) {
            return;
        }
        self.queue.push(RegisterWrite::new(register, value));
    }

    /// Shadow value of a register.
    pub fn shadow(&self, register: u32) -> Option<u32> {
        self.shadow.get(&register).copied()
    }

    pub fn pending(&self) -> &[RegisterWrite] {
        self.queue.entries()
    }

    /// The next flush will replay the whole shadow.
    pub fn needs_restore(&self) -> bool {
        self.stale || self.queue.overflowed()
    }

    /// Deliver pending writes to the device.
    ///
    /// The queue is emptied whether or not the submission succeeds; a failed
    /// submission makes the next flush replay the whole shadow.
    pub fn flush<D: Device + ?Sized>(&mut self, device: &mut D) -> Result<(), DeviceError> {
        if self.needs_restore() {
            return self.restore(device);
        }
        if self.queue.is_empty() {
            return Ok(());
        }
        let result = device.submit(&[Request::Registers(self.queue.entries())]);
        self.queue.clear();
        if result.is_err() {
            self.stale = true;
        }
        result
    }

    /// Deliver the whole shadow register file to the device.
    pub fn restore<D: Device + ?Sized>(&mut self, device: &mut D) -> Result<(), DeviceError> {
        let writes: Vec<RegisterWrite> = self
            .shadow
            .iter()
            .map(|(register, value)| RegisterWrite::new(*register, *value))
            .collect();
        log::debug!("replaying {} shadow registers", writes.len());
        self.queue.clear();
        if writes.is_empty() {
            self.stale = false;
            return Ok(());
        }
        let result = device.submit(&[Request::Registers(&writes)]);
        self.stale = result.is_err();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::{DeviceEvent, MemoryDevice};

    #[test]
    fn consecutive_writes_to_one_register_collapse() {
        let mut queue = RegisterQueue::new(4);
        assert!(queue.push(RegisterWrite::new(0x10, 1)));
        assert!(queue.push(RegisterWrite::new(0x10, 2)));
        assert!(queue.push(RegisterWrite::new(0x14, 3)));
        assert!(queue.push(RegisterWrite::new(0x10, 4)));
        assert_eq!(
            queue.entries(),
            &[
                RegisterWrite::new(0x10, 2),
                RegisterWrite::new(0x14, 3),
                RegisterWrite::new(0x10, 4)
            ]
        );
    }

    #[test]
    fn full_queue_drops_writes() {
        let mut queue = RegisterQueue::new(2);
        assert!(queue.push(RegisterWrite::new(0, 0)));
        assert!(queue.push(RegisterWrite::new(4, 0)));
        assert!(!queue.push(RegisterWrite::new(8, 0)));
        assert!(queue.overflowed());
        assert_eq!(queue.len(), 2);
        // Still collapses into the last entry.
        assert!(queue.push(RegisterWrite::new(4, 9)));
        queue.clear();
        assert!(!queue.overflowed());
        assert!(queue.is_empty());
    }

    #[test]
    fn unchanged_values_are_not_queued() {
        let mut channel = RegisterChannel::new(8);
        channel.write(0x100, 5);
        channel.write(0x104, 6);
        channel.write(0x100, 5);
        assert_eq!(channel.pending().len(), 2);
        assert_eq!(channel.shadow(0x100), Some(5));
    }

    #[test]
    fn flush_submits_once_and_empties_queue() {
        let mut device = MemoryDevice::new();
        let mut channel = RegisterChannel::new(8);
        channel.write(0x100, 1);
        channel.write(0x104, 2);
        channel.flush(&mut device).unwrap();
        assert!(channel.pending().is_empty());
        assert_eq!(device.register(0x104), Some(2));
        assert_eq!(
            device.events(),
            &[DeviceEvent::Registers(vec![
                RegisterWrite::new(0x100, 1),
                RegisterWrite::new(0x104, 2)
            ])]
        );
        // Nothing pending, nothing submitted.
        channel.flush(&mut device).unwrap();
        assert_eq!(device.events().len(), 1);
    }

    #[test]
    fn failed_flush_clears_queue_and_replays_shadow_next_time() {
        let mut device = MemoryDevice::new();
        let mut channel = RegisterChannel::new(8);
        channel.write(0x100, 1);
        device.reject_next_submissions(1);
        assert!(channel.flush(&mut device).is_err());
        assert!(channel.pending().is_empty());
        assert!(channel.needs_restore());

        channel.write(0x200, 2);
        channel.flush(&mut device).unwrap();
        assert_eq!(device.register(0x100), Some(1));
        assert_eq!(device.register(0x200), Some(2));
        assert!(!channel.needs_restore());
    }

    #[test]
    fn overflow_replays_full_shadow() {
        let mut device = MemoryDevice::new();
        let mut channel = RegisterChannel::new(2);
        for i in 0..5 {
            channel.write(0x100 + 4 * i, i);
        }
        assert!(channel.needs_restore());
        channel.flush(&mut device).unwrap();
        for i in 0..5 {
            assert_eq!(device.register(0x100 + 4 * i), Some(i));
        }
        assert!(!channel.needs_restore());
    }
}
