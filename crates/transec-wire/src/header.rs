//! Packet header for the TRANSEC wire format
//!
//! All integers are big-endian:
//! - Bytes 0-7: Slot index
//! - Bytes 8-15: Sequence number
//! - Bytes 16-19: Nonce entropy
//! - Bytes 20-27: Generation (only when ratcheting is enabled)

use bytes::{Buf, BufMut, BytesMut};

use transec_core::{Generation, SlotIndex, TransecError, TransecResult};

/// Header size without the generation field
pub const BASE_HEADER_SIZE: usize = 20;

/// Size of the optional generation field
pub const GENERATION_FIELD_SIZE: usize = 8;

/// Header size with the generation field
pub const RATCHET_HEADER_SIZE: usize = BASE_HEADER_SIZE + GENERATION_FIELD_SIZE;

/// Random bytes carried in every header and folded into the nonce
pub const NONCE_ENTROPY_SIZE: usize = 4;

/// Which header layout both peers agreed on.
///
/// The wire format carries no flag for the generation field; the layout is
/// fixed by configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeaderLayout {
    /// slot ‖ sequence ‖ entropy
    Plain,
    /// slot ‖ sequence ‖ entropy ‖ generation
    WithGeneration,
}

impl HeaderLayout {
    pub fn for_ratcheting(enabled: bool) -> Self {
        if enabled {
            HeaderLayout::WithGeneration
        } else {
            HeaderLayout::Plain
        }
    }

    #[inline]
    pub fn size(self) -> usize {
        match self {
            HeaderLayout::Plain => BASE_HEADER_SIZE,
            HeaderLayout::WithGeneration => RATCHET_HEADER_SIZE,
        }
    }
}

/// Packet header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    /// Slot the sender derived its key for
    pub slot: SlotIndex,
    /// Sender sequence within (generation, slot)
    pub sequence: u64,
    /// Fresh random bytes from the sender's CSPRNG
    pub nonce_entropy: [u8; NONCE_ENTROPY_SIZE],
    /// Ratchet generation, present only with ratcheting
    pub generation: Option<Generation>,
}

impl PacketHeader {
    pub fn new(
        slot: SlotIndex,
        sequence: u64,
        nonce_entropy: [u8; NONCE_ENTROPY_SIZE],
        generation: Option<Generation>,
    ) -> Self {
        PacketHeader {
            slot,
            sequence,
            nonce_entropy,
            generation,
        }
    }

    #[inline]
    pub fn layout(&self) -> HeaderLayout {
        HeaderLayout::for_ratcheting(self.generation.is_some())
    }

    /// Serialized size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.layout().size()
    }

    /// Generation used for key derivation; zero when ratcheting is off
    #[inline]
    pub fn effective_generation(&self) -> Generation {
        self.generation.unwrap_or(Generation::ZERO)
    }

    /// Parse header from the front of a buffer
    pub fn parse(buf: &[u8], layout: HeaderLayout) -> TransecResult<Self> {
        let expected = layout.size();
        if buf.len() < expected {
            return Err(TransecError::BufferTooShort {
                expected,
                actual: buf.len(),
            });
        }

        let mut cursor = &buf[..expected];

        let slot = SlotIndex::new(cursor.get_u64());
        let sequence = cursor.get_u64();

        let mut nonce_entropy = [0u8; NONCE_ENTROPY_SIZE];
        cursor.copy_to_slice(&mut nonce_entropy);

        let generation = match layout {
            HeaderLayout::Plain => None,
            HeaderLayout::WithGeneration => Some(Generation::new(cursor.get_u64())),
        };

        Ok(PacketHeader {
            slot,
            sequence,
            nonce_entropy,
            generation,
        })
    }

    /// Append the header to a buffer
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());
        buf.put_u64(self.slot.value());
        buf.put_u64(self.sequence);
        buf.put_slice(&self.nonce_entropy);
        if let Some(generation) = self.generation {
            buf.put_u64(generation.value());
        }
    }

    /// Serialize header to a new Vec
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.size());
        self.write_to(&mut buf);
        buf.to_vec()
    }
}
