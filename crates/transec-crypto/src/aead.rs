//! AEAD packet codec using ChaCha20-Poly1305
//!
//! The 12-byte nonce is `nonce_entropy || BE64(sequence)`. The serialized
//! header, followed by any caller associated data, is the AEAD's AAD.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use transec_core::{Generation, SlotIndex, TransecError, TransecResult};
use transec_wire::{HeaderLayout, Packet, PacketHeader, AUTH_TAG_SIZE, NONCE_ENTROPY_SIZE};

use crate::SlotKey;

/// Nonce size for ChaCha20-Poly1305
pub const NONCE_SIZE: usize = 12;

/// Tag size for ChaCha20-Poly1305
pub const TAG_SIZE: usize = AUTH_TAG_SIZE;

fn packet_nonce(header: &PacketHeader) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..NONCE_ENTROPY_SIZE].copy_from_slice(&header.nonce_entropy);
    nonce[NONCE_ENTROPY_SIZE..].copy_from_slice(&header.sequence.to_be_bytes());
    nonce
}

fn associated_data(header: &PacketHeader, aad: &[u8]) -> Vec<u8> {
    let mut data = header.to_bytes();
    data.extend_from_slice(aad);
    data
}

/// Seals and opens packets for one header layout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AeadCodec {
    layout: HeaderLayout,
}

impl AeadCodec {
    pub fn new(layout: HeaderLayout) -> Self {
        AeadCodec { layout }
    }

    #[inline]
    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    /// Header for a new packet with fresh nonce entropy from `rng`.
    ///
    /// `generation` is only written when the layout carries it.
    pub fn header<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        slot: SlotIndex,
        sequence: u64,
        generation: Generation,
    ) -> PacketHeader {
        let mut entropy = [0u8; NONCE_ENTROPY_SIZE];
        rng.fill_bytes(&mut entropy);
        let generation = match self.layout {
            HeaderLayout::Plain => None,
            HeaderLayout::WithGeneration => Some(generation),
        };
        PacketHeader::new(slot, sequence, entropy, generation)
    }

    /// Seal with nonce entropy from the OS CSPRNG
    pub fn seal(
        &self,
        key: &SlotKey,
        slot: SlotIndex,
        sequence: u64,
        generation: Generation,
        plaintext: &[u8],
        aad: &[u8],
    ) -> TransecResult<Packet> {
        let header = self.header(&mut OsRng, slot, sequence, generation);
        self.seal_header(key, header, plaintext, aad)
    }

    /// Encrypt `plaintext` under a prepared header
    pub fn seal_header(
        &self,
        key: &SlotKey,
        header: PacketHeader,
        plaintext: &[u8],
        aad: &[u8],
    ) -> TransecResult<Packet> {
        if header.layout() != self.layout {
            return Err(TransecError::Configuration(format!(
                "header layout {:?} does not match codec layout {:?}",
                header.layout(),
                self.layout
            )));
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let nonce = packet_nonce(&header);
        let aad = associated_data(&header, aad);

        let body = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| TransecError::EncryptionFailure)?;

        Ok(Packet::new(header, body))
    }

    /// Verify and decrypt `packet`.
    ///
    /// Every failure is the same opaque [`TransecError::DecryptionFailure`].
    pub fn open(&self, packet: &Packet, key: &SlotKey, aad: &[u8]) -> TransecResult<Vec<u8>> {
        if packet.header.layout() != self.layout || packet.body.len() < TAG_SIZE {
            return Err(TransecError::DecryptionFailure);
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let nonce = packet_nonce(&packet.header);
        let aad = associated_data(&packet.header, aad);

        cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &packet.body,
                    aad: &aad,
                },
            )
            .map_err(|_| TransecError::DecryptionFailure)
    }

    /// Parse then open raw packet bytes
    pub fn open_bytes(&self, bytes: &[u8], key: &SlotKey, aad: &[u8]) -> TransecResult<Vec<u8>> {
        let packet = Packet::parse(bytes, self.layout)?;
        self.open(&packet, key, aad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive_slot_key;
    use proptest::prelude::*;
    use transec_core::SharedSecret;

    fn key(byte: u8) -> SlotKey {
        derive_slot_key(
            &SharedSecret::from_bytes([byte; 32]),
            SlotIndex::new(100),
            Generation::ZERO,
            b"test",
        )
    }

    fn plain_header(sequence: u64) -> PacketHeader {
        PacketHeader::new(SlotIndex::new(100), sequence, [1, 2, 3, 4], None)
    }

    #[test]
    fn test_seal_open() {
        let codec = AeadCodec::new(HeaderLayout::Plain);
        let packet = codec
            .seal(&key(0), SlotIndex::new(100), 1, Generation::ZERO, b"hello", b"")
            .unwrap();

        assert_eq!(packet.header.slot, SlotIndex::new(100));
        assert_eq!(packet.header.generation, None);
        assert_eq!(packet.body.len(), 5 + TAG_SIZE);

        let bytes = packet.to_bytes();
        assert_eq!(&bytes[..8], &100u64.to_be_bytes());
        assert_eq!(codec.open_bytes(&bytes, &key(0), b"").unwrap(), b"hello");
    }

    #[test]
    fn test_generation_written_when_ratcheting() {
        let codec = AeadCodec::new(HeaderLayout::WithGeneration);
        let packet = codec
            .seal(&key(0), SlotIndex::new(3), 1, Generation::new(4), b"x", b"")
            .unwrap();

        assert_eq!(packet.header.generation, Some(Generation::new(4)));
        assert_eq!(codec.open(&packet, &key(0), b"").unwrap(), b"x");
    }

    #[test]
    fn test_nonce_layout() {
        let nonce = packet_nonce(&plain_header(0x0102));
        assert_eq!(nonce, [1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0x01, 0x02]);
    }

    #[test]
    fn test_wrong_key_fails() {
        let codec = AeadCodec::new(HeaderLayout::Plain);
        let packet = codec.seal_header(&key(1), plain_header(1), b"secret", b"").unwrap();

        let result = codec.open(&packet, &key(2), b"");
        assert_eq!(result, Err(TransecError::DecryptionFailure));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let codec = AeadCodec::new(HeaderLayout::Plain);
        let packet = codec
            .seal_header(&key(1), plain_header(1), b"secret", b"correct aad")
            .unwrap();

        assert!(codec.open(&packet, &key(1), b"correct aad").is_ok());
        assert_eq!(
            codec.open(&packet, &key(1), b"wrong aad"),
            Err(TransecError::DecryptionFailure)
        );
    }

    #[test]
    fn test_header_is_authenticated() {
        let codec = AeadCodec::new(HeaderLayout::Plain);
        let packet = codec.seal_header(&key(1), plain_header(1), b"secret", b"").unwrap();

        let mut bytes = packet.to_bytes();
        // Rewrite the sequence number
        bytes[15] ^= 0x01;
        assert_eq!(
            codec.open_bytes(&bytes, &key(1), b""),
            Err(TransecError::DecryptionFailure)
        );
    }

    #[test]
    fn test_layout_mismatch_rejected() {
        let plain = AeadCodec::new(HeaderLayout::Plain);
        let ratcheting = AeadCodec::new(HeaderLayout::WithGeneration);

        let packet = ratcheting
            .seal(&key(1), SlotIndex::new(1), 1, Generation::ZERO, b"data", b"")
            .unwrap();
        assert_eq!(plain.open(&packet, &key(1), b""), Err(TransecError::DecryptionFailure));
        assert!(plain.seal_header(&key(1), packet.header, b"", b"").is_err());
    }

    #[test]
    fn test_truncated_packet() {
        let codec = AeadCodec::new(HeaderLayout::Plain);
        let result = codec.open_bytes(&[0u8; 30], &key(1), b"");
        assert!(matches!(result, Err(TransecError::BufferTooShort { .. })));
    }

    #[test]
    fn test_fresh_entropy_per_packet() {
        let codec = AeadCodec::new(HeaderLayout::Plain);
        let entropies: Vec<[u8; 4]> = (0..8)
            .map(|_| codec.header(&mut OsRng, SlotIndex::new(1), 1, Generation::ZERO).nonce_entropy)
            .collect();
        assert!(entropies.iter().any(|e| *e != entropies[0]));
    }

    proptest! {
        #[test]
        fn prop_seal_open_roundtrip(
            plaintext in proptest::collection::vec(any::<u8>(), 0..512),
            aad in proptest::collection::vec(any::<u8>(), 0..32),
            sequence in 1u64..,
            entropy in any::<[u8; 4]>(),
        ) {
            let codec = AeadCodec::new(HeaderLayout::Plain);
            let header = PacketHeader::new(SlotIndex::new(9), sequence, entropy, None);
            let packet = codec.seal_header(&key(5), header, &plaintext, &aad).unwrap();
            let opened = codec.open_bytes(&packet.to_bytes(), &key(5), &aad).unwrap();
            prop_assert_eq!(opened, plaintext);
        }
    }
}
