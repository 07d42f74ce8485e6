//! TRANSEC Test Harness - Peer simulation and protocol validation
//!
//! This crate provides:
//! - Lossy link simulation (loss, reordering, duplication)
//! - Two-peer simulator on skewed manual clocks
//! - End-to-end integration testing

pub mod integration;
pub mod link;
pub mod peer;

pub use integration::*;
pub use link::*;
pub use peer::*;
