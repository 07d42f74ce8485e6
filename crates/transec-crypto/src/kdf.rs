//! Per-slot key derivation
//!
//! ```text
//! info = context || BE64(slot) || BE64(generation)
//! key  = HKDF-SHA256(salt = none, ikm = secret, info, 32)
//! ```

use std::collections::VecDeque;

use hkdf::Hkdf;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use transec_core::{Generation, SharedSecret, SlotIndex, SECRET_SIZE};

/// Key size for ChaCha20-Poly1305
pub const KEY_SIZE: usize = 32;

/// Default number of slot keys kept by [`KeyCache`]
pub const DEFAULT_KEY_CACHE_CAPACITY: usize = 8;

/// Symmetric key for one (generation, slot)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SlotKey([u8; KEY_SIZE]);

impl SlotKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SlotKey(<redacted>)")
    }
}

/// Derive the key for `slot` in `generation`.
///
/// Pure: equal inputs give equal keys on every peer.
pub fn derive_slot_key(
    secret: &SharedSecret,
    slot: SlotIndex,
    generation: Generation,
    context: &[u8],
) -> SlotKey {
    let mut info = Vec::with_capacity(context.len() + 16);
    info.extend_from_slice(context);
    info.extend_from_slice(&slot.to_bytes());
    info.extend_from_slice(&generation.to_bytes());

    let hkdf = Hkdf::<Sha256>::new(None, secret.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(&info, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    info.zeroize();
    SlotKey(key)
}

/// Fresh random secret from the OS CSPRNG
pub fn generate_shared_secret() -> SharedSecret {
    let mut bytes = [0u8; SECRET_SIZE];
    OsRng.fill_bytes(&mut bytes);
    let secret = SharedSecret::from_bytes(bytes);
    bytes.zeroize();
    secret
}

/// Key derivation bound to one domain-separation context
#[derive(Clone, Debug)]
pub struct KeyScheduler {
    context: Vec<u8>,
}

impl KeyScheduler {
    pub fn new(context: impl Into<Vec<u8>>) -> Self {
        KeyScheduler {
            context: context.into(),
        }
    }

    pub fn context(&self) -> &[u8] {
        &self.context
    }

    pub fn derive(
        &self,
        secret: &SharedSecret,
        slot: SlotIndex,
        generation: Generation,
    ) -> SlotKey {
        derive_slot_key(secret, slot, generation, &self.context)
    }
}

/// Small LRU of recently derived slot keys
#[derive(Debug)]
pub struct KeyCache {
    capacity: usize,
    /// Most recently used at the back
    entries: Mutex<VecDeque<((Generation, SlotIndex), SlotKey)>>,
}

impl KeyCache {
    pub fn new(capacity: usize) -> Self {
        KeyCache {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Cached key for (generation, slot), deriving it on a miss
    pub fn get_or_derive(
        &self,
        generation: Generation,
        slot: SlotIndex,
        derive: impl FnOnce() -> SlotKey,
    ) -> SlotKey {
        if self.capacity == 0 {
            return derive();
        }

        let mut entries = self.entries.lock();
        let id = (generation, slot);
        if let Some(pos) = entries.iter().position(|(k, _)| *k == id) {
            if let Some(entry) = entries.remove(pos) {
                let key = entry.1.clone();
                entries.push_back(entry);
                return key;
            }
        }

        let key = derive();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back((id, key.clone()));
        key
    }

    /// Drop every key older than `oldest`
    pub fn purge_before(&self, oldest: Generation) {
        self.entries.lock().retain(|((generation, _), _)| *generation >= oldest);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        KeyCache::new(DEFAULT_KEY_CACHE_CAPACITY)
    }
}
