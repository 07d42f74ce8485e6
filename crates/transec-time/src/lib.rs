//! TRANSEC Time - Slot clocks and time sources
//!
//! This crate turns wall-clock time into slot indices:
//! - Time source collaborator (system and manual clocks)
//! - Fixed, adaptive (keyed jitter) and prime-normalized slot numbering
//! - Deterministic primality and curvature helpers

pub mod clock;
pub mod jitter;
pub mod prime;
pub mod source;

pub use clock::*;
pub use jitter::{BoundaryTable, JitterStream};
pub use prime::*;
pub use source::*;
