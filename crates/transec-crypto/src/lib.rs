//! TRANSEC Crypto Engine - Slot keys, packet sealing and ratchet management
//!
//! Provides the cryptographic layer of TRANSEC:
//! - Per-slot key derivation (HKDF-SHA256)
//! - AEAD packet codec (ChaCha20-Poly1305)
//! - Replay protection per (generation, slot)
//! - OTAR-Lite hash ratchet
//! - `TransecCipher`, the endpoint tying them to a slot clock

pub mod aead;
pub mod cipher;
pub mod kdf;
pub mod ratchet;
pub mod replay;

pub use aead::*;
pub use cipher::*;
pub use kdf::*;
pub use ratchet::*;
pub use replay::*;
