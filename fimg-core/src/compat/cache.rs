// Shader program cache.
//
// A fixed array of entries, one per instruction memory slot. Entries are
// keyed by fingerprint; at most one entry holds a given fingerprint. On a
// miss the least recently used entry (ties to the lowest index) is
// overwritten. Empty entries have never been used and go first.

use super::fingerprint::Fingerprint;
use crate::regs::CLEAR_PROGRAM_BASE;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CacheEntry {
    fingerprint: Option<Fingerprint>,
    instruction_count: usize,
    last_used: u64,
}

/// Result of looking a fingerprint up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The program is resident in this slot.
    Hit(usize),
    /// Not resident; this slot is the eviction victim.
    Miss(usize),
}

impl Lookup {
    pub fn slot(self) -> usize {
        match self {
            Lookup::Hit(slot) | Lookup::Miss(slot) => slot,
        }
    }
}

/// Counters of one program cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Successful microcode uploads.
    pub uploads: u64,
}

#[derive(Debug, Clone)]
pub struct ProgramCache {
    entries: Vec<CacheEntry>,
    counter: u64,
    /// Slot whose program range is currently programmed.
    bound: Option<usize>,
    stats: CacheStats,
}

impl ProgramCache {
    /// Cache with `slots` entries sharing the memory below the clear program.
    pub fn new(slots: usize) -> Self {
        Self {
            entries: vec![CacheEntry::default(); slots],
            counter: 0,
            bound: None,
            stats: CacheStats::default(),
        }
    }

    pub fn slots(&self) -> usize {
        self.entries.len()
    }

    /// Instructions available to each slot.
    pub fn slot_len(&self) -> usize {
        CLEAR_PROGRAM_BASE / self.entries.len().max(1)
    }

    /// First instruction of a slot.
    pub fn slot_base(&self, slot: usize) -> usize {
        slot * self.slot_len()
    }

    pub fn lookup(&mut self, fingerprint: &Fingerprint) -> Lookup {
        if let Some(slot) = self
            .entries
            .iter()
            .position(|entry| entry.fingerprint.as_ref() == Some(fingerprint))
        {
            self.stats.hits += 1;
            return Lookup::Hit(slot);
        }
        self.stats.misses += 1;
        let victim = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(i, entry)| (entry.last_used, *i))
            .map(|(i, _)| i)
            .unwrap_or(0);
        Lookup::Miss(victim)
    }

    /// Record a program uploaded into `slot`.
    pub fn commit(&mut self, slot: usize, fingerprint: Fingerprint, instruction_count: usize) {
        if let Some(entry) = self.entries.get_mut(slot) {
            entry.fingerprint = Some(fingerprint);
            entry.instruction_count = instruction_count;
            self.stats.uploads += 1;
        }
    }

    /// Mark `slot` most recently used.
    pub fn touch(&mut self, slot: usize) {
        self.counter += 1;
        if let Some(entry) = self.entries.get_mut(slot) {
            entry.last_used = self.counter;
        }
    }

    /// Forget the program in `slot` (its memory is about to be overwritten).
    pub fn invalidate(&mut self, slot: usize) {
        if let Some(entry) = self.entries.get_mut(slot) {
            entry.fingerprint = None;
            entry.instruction_count = 0;
        }
        if self.bound == Some(slot) {
            self.bound = None;
        }
    }

    /// Forget every program. Use order is kept for victim selection.
    pub fn invalidate_all(&mut self) {
        for entry in &mut self.entries {
            entry.fingerprint = None;
            entry.instruction_count = 0;
        }
        self.bound = None;
    }

    pub fn instruction_count(&self, slot: usize) -> usize {
        self.entries.get(slot).map_or(0, |entry| entry.instruction_count)
    }

    pub fn fingerprint(&self, slot: usize) -> Option<Fingerprint> {
        self.entries.get(slot).and_then(|entry| entry.fingerprint)
    }

    pub fn bound(&self) -> Option<usize> {
        self.bound
    }

    /// Record that the hardware range now selects `slot`. Returns false when
    /// it already did.
    pub fn bind(&mut self, slot: usize) -> bool {
        let changed = self.bound != Some(slot);
        self.bound = Some(slot);
        changed
    }

    /// The hardware range points elsewhere (clear program).
    pub fn unbind(&mut self) {
        self.bound = None;
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
