//! Replay window management for packet deduplication
//!
//! Windows are scoped per (generation, slot): a sequence number only has to
//! be unique among packets keyed by the same slot key.

use std::collections::BTreeMap;

use transec_core::{Generation, RejectReason, SlotIndex};

/// Sequences tracked behind the highest accepted one
pub const REPLAY_WINDOW_SIZE: u64 = 64;

/// Upper bound on (generation, slot) windows held at once
pub const MAX_TRACKED_SLOTS: usize = 4096;

/// Sliding replay window for one (generation, slot)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayWindow {
    /// Highest accepted sequence
    highest: u64,
    /// Bit `i` set when `highest - i` has been accepted
    bitmap: u64,
}

impl ReplayWindow {
    pub fn new() -> Self {
        ReplayWindow::default()
    }

    /// Check if a sequence number is valid (not a replay)
    pub fn check(&self, seq: u64) -> bool {
        if seq > self.highest {
            return true;
        }

        let offset = self.highest - seq;
        if offset >= REPLAY_WINDOW_SIZE {
            // Too old to tell apart from a replay
            return false;
        }

        self.bitmap & (1u64 << offset) == 0
    }

    /// Mark a sequence number as received
    /// Returns true if accepted, false if replay
    pub fn accept(&mut self, seq: u64) -> bool {
        if !self.check(seq) {
            return false;
        }

        if seq > self.highest {
            let advance = seq - self.highest;
            self.bitmap = if advance >= REPLAY_WINDOW_SIZE {
                0
            } else {
                self.bitmap << advance
            };
            self.highest = seq;
        }

        self.bitmap |= 1u64 << (self.highest - seq);
        true
    }

    pub fn highest(&self) -> u64 {
        self.highest
    }
}

/// Replay protection across live (generation, slot) pairs
#[derive(Debug)]
pub struct ReplayGuard {
    windows: BTreeMap<(Generation, SlotIndex), ReplayWindow>,
    /// Slots below this are outside every live drift window
    min_slot: SlotIndex,
    /// Generations below this have no retained secret
    oldest_generation: Generation,
    /// Largest key dropped at capacity; keys at or below it stay closed
    evicted_floor: Option<(Generation, SlotIndex)>,
    capacity: usize,
}

impl ReplayGuard {
    pub fn new() -> Self {
        ReplayGuard::with_capacity(MAX_TRACKED_SLOTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ReplayGuard {
            windows: BTreeMap::new(),
            min_slot: SlotIndex::ZERO,
            oldest_generation: Generation::ZERO,
            evicted_floor: None,
            capacity: capacity.max(1),
        }
    }

    fn admit(&self, generation: Generation, slot: SlotIndex) -> Result<(), RejectReason> {
        if generation < self.oldest_generation {
            return Err(RejectReason::GenerationTooOld);
        }
        if slot < self.min_slot {
            return Err(RejectReason::SlotOutOfWindow);
        }
        // A window dropped at capacity must never come back empty
        if self.evicted_floor.is_some_and(|floor| (generation, slot) <= floor) {
            return Err(RejectReason::SlotOutOfWindow);
        }
        Ok(())
    }

    /// Check without recording
    pub fn check(
        &self,
        generation: Generation,
        slot: SlotIndex,
        seq: u64,
    ) -> Result<(), RejectReason> {
        self.admit(generation, slot)?;
        match self.windows.get(&(generation, slot)) {
            Some(window) if !window.check(seq) => Err(RejectReason::DuplicateSequence),
            _ => Ok(()),
        }
    }

    /// Accept a (generation, slot, sequence) triple at most once
    pub fn check_and_record(
        &mut self,
        generation: Generation,
        slot: SlotIndex,
        seq: u64,
    ) -> Result<(), RejectReason> {
        self.admit(generation, slot)?;

        let window = self.windows.entry((generation, slot)).or_default();
        if !window.accept(seq) {
            return Err(RejectReason::DuplicateSequence);
        }

        while self.windows.len() > self.capacity {
            let Some((key, _)) = self.windows.pop_first() else {
                break;
            };
            // Every live key sits above the floor, so the floor only rises
            self.evicted_floor = Some(key);
            let (generation, slot) = key;
            tracing::debug!(%generation, %slot, "replay window evicted at capacity");
        }
        Ok(())
    }

    /// Move the live horizon forward and drop windows behind it.
    ///
    /// Neither bound ever moves backwards, so an evicted window cannot be
    /// recreated empty.
    pub fn set_horizon(&mut self, min_slot: SlotIndex, oldest_generation: Generation) {
        self.min_slot = self.min_slot.max(min_slot);
        self.oldest_generation = self.oldest_generation.max(oldest_generation);

        let before = self.windows.len();
        let (min_slot, oldest) = (self.min_slot, self.oldest_generation);
        self.windows
            .retain(|(generation, slot), _| *generation >= oldest && *slot >= min_slot);

        let evicted = before - self.windows.len();
        if evicted > 0 {
            tracing::debug!(evicted, %min_slot, %oldest, "replay windows evicted");
        }
    }

    pub fn min_slot(&self) -> SlotIndex {
        self.min_slot
    }

    pub fn oldest_generation(&self) -> Generation {
        self.oldest_generation
    }

    /// Get window for inspection
    pub fn window(&self, generation: Generation, slot: SlotIndex) -> Option<&ReplayWindow> {
        self.windows.get(&(generation, slot))
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        ReplayGuard::new()
    }
}
