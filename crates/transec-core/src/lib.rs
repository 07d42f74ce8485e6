//! TRANSEC Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every TRANSEC layer:
//! - Identifiers (SlotIndex, Generation)
//! - Pre-shared secret material
//! - Configuration surface and validation
//! - Error taxonomy

pub mod config;
pub mod error;
pub mod id;
pub mod secret;

pub use config::*;
pub use error::*;
pub use id::*;
pub use secret::*;
