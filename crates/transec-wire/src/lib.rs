//! TRANSEC Wire Protocol - Binary packet format
//!
//! This crate implements the wire format for TRANSEC packets:
//! - Header (20 bytes, 28 with the ratchet generation)
//! - Encrypted payload
//! - Auth tag (AEAD)

pub mod header;
pub mod packet;

pub use header::*;
pub use packet::*;
