//! Identifier types for TRANSEC
//!
//! Slot indices and ratchet generations are 64-bit on the wire and always
//! encoded big-endian.

use std::fmt;

/// Discrete time bucket selecting a key-derivation input.
///
/// Derived from time, never persisted on its own.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SlotIndex(pub u64);

impl SlotIndex {
    pub const ZERO: SlotIndex = SlotIndex(0);

    #[inline]
    pub fn new(index: u64) -> Self {
        SlotIndex(index)
    }

    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        SlotIndex(u64::from_be_bytes(bytes))
    }

    /// Absolute distance between two slots
    #[inline]
    pub fn distance(self, other: SlotIndex) -> u64 {
        self.0.abs_diff(other.0)
    }

    #[inline]
    pub fn saturating_sub(self, n: u64) -> Self {
        SlotIndex(self.0.saturating_sub(n))
    }

    #[inline]
    pub fn saturating_add(self, n: u64) -> Self {
        SlotIndex(self.0.saturating_add(n))
    }
}

impl fmt::Debug for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SlotIndex {
    fn from(index: u64) -> Self {
        SlotIndex(index)
    }
}

/// Ratchet generation - number of OTAR-Lite advances since bootstrap
///
/// Starts at zero and only ever moves forward by one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    #[inline]
    pub fn new(generation: u64) -> Self {
        Generation(generation)
    }

    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Generation(u64::from_be_bytes(bytes))
    }

    /// The generation after this one, if the counter has room
    #[inline]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Generation)
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gen({})", self.0)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Generation {
    fn from(generation: u64) -> Self {
        Generation(generation)
    }
}
