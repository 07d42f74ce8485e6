//! Complete packet structure for the TRANSEC wire format
//!
//! Packet = Header + Ciphertext + Auth Tag

use bytes::{BufMut, BytesMut};

use transec_core::{TransecError, TransecResult};

use crate::{HeaderLayout, PacketHeader};

/// Auth tag size (AEAD)
pub const AUTH_TAG_SIZE: usize = 16;

/// Smallest valid packet for a layout (empty plaintext)
#[inline]
pub fn min_packet_size(layout: HeaderLayout) -> usize {
    layout.size() + AUTH_TAG_SIZE
}

/// Sealed TRANSEC packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Cleartext header (authenticated as associated data)
    pub header: PacketHeader,
    /// Ciphertext with the auth tag appended
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(header: PacketHeader, body: Vec<u8>) -> Self {
        Packet { header, body }
    }

    /// Parse packet from bytes (without decryption)
    pub fn parse(buf: &[u8], layout: HeaderLayout) -> TransecResult<Self> {
        let min = min_packet_size(layout);
        if buf.len() < min {
            return Err(TransecError::BufferTooShort {
                expected: min,
                actual: buf.len(),
            });
        }

        let header = PacketHeader::parse(buf, layout)?;
        let body = buf[layout.size()..].to_vec();

        Ok(Packet { header, body })
    }

    /// Serialize packet to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.header.write_to(&mut buf);
        buf.put_slice(&self.body);
        buf.to_vec()
    }

    /// Total serialized length
    #[inline]
    pub fn wire_len(&self) -> usize {
        self.header.size() + self.body.len()
    }

    /// Length of the encrypted plaintext
    #[inline]
    pub fn plaintext_len(&self) -> usize {
        self.body.len().saturating_sub(AUTH_TAG_SIZE)
    }
}
