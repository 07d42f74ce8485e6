//! Keyed jitter stream and adaptive slot boundaries
//!
//! Slot `i` lasts `base + jitter(secret, i)`. The jitter for each slot is a
//! pure function of the shared secret and the slot counter:
//!
//! ```text
//! seed      = HMAC-SHA256(secret, "slot_jitter" || BE64(counter))
//! jitter_ms = ChaCha20Rng(seed).gen_range(min_ms..=max_ms)
//! ```
//!
//! Boundaries have no closed form, so both peers walk the same sequence
//! forward from the shared epoch.

use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::Sha256;

use transec_core::{JitterRange, SharedSecret};

type HmacSha256 = Hmac<Sha256>;

/// Domain label for jitter seeds
const JITTER_LABEL: &[u8] = b"slot_jitter";

/// A boundary is remembered every this many slots
const CHECKPOINT_STRIDE: u64 = 64;

/// Keyed deterministic jitter source
#[derive(Clone, Debug)]
pub struct JitterStream {
    secret: SharedSecret,
    min_ms: u64,
    max_ms: u64,
}

impl JitterStream {
    pub fn new(secret: SharedSecret, range: JitterRange) -> Self {
        JitterStream {
            secret,
            min_ms: millis(range.min),
            max_ms: millis(range.max).max(millis(range.min)),
        }
    }

    /// Jitter for `counter`, in milliseconds within the configured range
    pub fn jitter_millis(&self, counter: u64) -> u64 {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(JITTER_LABEL);
        mac.update(&counter.to_be_bytes());
        let seed: [u8; 32] = mac.finalize().into_bytes().into();

        let mut rng = ChaCha20Rng::from_seed(seed);
        rng.gen_range(self.min_ms..=self.max_ms)
    }

    /// Jitter for `counter` as a duration
    pub fn jitter(&self, counter: u64) -> Duration {
        Duration::from_millis(self.jitter_millis(counter))
    }
}

/// Append-only table of adaptive slot boundaries.
///
/// Stores every `CHECKPOINT_STRIDE`-th boundary plus the furthest boundary
/// evaluated so far, so a lookup re-walks at most one stride.
#[derive(Debug)]
pub struct BoundaryTable {
    stream: JitterStream,
    base_ms: u64,
    /// `checkpoints[k]` is the start of slot `k * CHECKPOINT_STRIDE`
    checkpoints: Vec<u64>,
    /// (slot, start) of the furthest evaluated slot
    frontier: (u64, u64),
}

impl BoundaryTable {
    /// Slot 0 starts at `epoch`
    pub fn new(stream: JitterStream, base: Duration, epoch: Duration) -> Self {
        let epoch_ms = millis(epoch);
        BoundaryTable {
            stream,
            base_ms: millis(base).max(1),
            checkpoints: vec![epoch_ms],
            frontier: (0, epoch_ms),
        }
    }

    #[inline]
    fn epoch_ms(&self) -> u64 {
        self.checkpoints[0]
    }

    /// Length of slot `index` in milliseconds
    pub fn slot_len_ms(&self, index: u64) -> u64 {
        self.base_ms.saturating_add(self.stream.jitter_millis(index))
    }

    /// Evaluate one more slot past the frontier
    fn extend(&mut self) {
        let (index, start) = self.frontier;
        let next = start.saturating_add(self.slot_len_ms(index));
        let next_index = index + 1;
        if next_index % CHECKPOINT_STRIDE == 0 {
            self.checkpoints.push(next);
        }
        self.frontier = (next_index, next);
    }

    /// Start of slot `index`, in milliseconds since the Unix epoch
    pub fn boundary_ms(&mut self, index: u64) -> u64 {
        if index >= self.frontier.0 {
            let from = self.frontier.0;
            while self.frontier.0 < index {
                self.extend();
            }
            if index - from > CHECKPOINT_STRIDE * 1024 {
                tracing::debug!(from, to = index, "adaptive boundary table extended");
            }
            return self.frontier.1;
        }

        let k = index / CHECKPOINT_STRIDE;
        let mut slot = k * CHECKPOINT_STRIDE;
        let mut start = self.checkpoints[k as usize];
        while slot < index {
            start = start.saturating_add(self.slot_len_ms(slot));
            slot += 1;
        }
        start
    }

    /// Slot containing `t_ms`; instants before the epoch belong to slot 0
    pub fn slot_at_ms(&mut self, t_ms: u64) -> u64 {
        if t_ms < self.epoch_ms() {
            return 0;
        }

        while self.frontier.1 <= t_ms {
            self.extend();
        }

        // checkpoints[0] is the epoch, so at least one entry qualifies
        let k = self.checkpoints.partition_point(|&b| b <= t_ms).saturating_sub(1);
        let mut slot = k as u64 * CHECKPOINT_STRIDE;
        let mut start = self.checkpoints[k];
        loop {
            let next = start.saturating_add(self.slot_len_ms(slot));
            if next > t_ms {
                return slot;
            }
            slot += 1;
            start = next;
        }
    }

    /// Number of slots evaluated so far
    pub fn evaluated(&self) -> u64 {
        self.frontier.0
    }

    /// Most slots that can lie between the epoch and `t_ms`
    pub fn max_slots_until(&self, t_ms: u64) -> u64 {
        let shortest = self.base_ms.saturating_add(self.stream.min_ms);
        t_ms.saturating_sub(self.epoch_ms()) / shortest
    }
}

#[inline]
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
