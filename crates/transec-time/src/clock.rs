//! Slot clock - wall-clock time to discrete slot indices
//!
//! Three numbering schemes stack on top of each other:
//! - fixed: `slot = floor((t - epoch) / duration)`
//! - adaptive: keyed jitter stretches every slot, see [`BoundaryTable`]
//! - prime-normalized: the raw index (fixed or adaptive) is mapped onto a
//!   prime, and drift tolerance is tripled to absorb prime gaps

use std::time::Duration;

use parking_lot::Mutex;

use transec_core::{PrimeStrategy, SlotIndex, TransecConfig, TransecError, TransecResult};

use crate::jitter::millis;
use crate::prime::normalize_slot;
use crate::{BoundaryTable, JitterStream, TimeSource};

/// Drift multiplier applied when slots are prime-normalized
pub const PRIME_DRIFT_FACTOR: u64 = 3;

/// Furthest an adaptive clock may have to walk on its first lookup
pub const MAX_ADAPTIVE_WALK: u64 = 1 << 20;

/// How raw slot indices advance with time
enum SlotTiming {
    Fixed { duration_ms: u64, epoch_ms: u64 },
    Adaptive(Mutex<BoundaryTable>),
}

/// Maps timestamps (time since the Unix epoch) to slot indices
pub struct SlotClock {
    timing: SlotTiming,
    prime_strategy: PrimeStrategy,
}

impl SlotClock {
    /// Evenly spaced slots starting at `epoch`
    pub fn fixed(slot_duration: Duration, epoch: Duration) -> Self {
        SlotClock {
            timing: SlotTiming::Fixed {
                duration_ms: millis(slot_duration).max(1),
                epoch_ms: millis(epoch),
            },
            prime_strategy: PrimeStrategy::None,
        }
    }

    /// Jittered slots; slot 0 starts at `epoch`
    pub fn adaptive(stream: JitterStream, base_duration: Duration, epoch: Duration) -> Self {
        SlotClock {
            timing: SlotTiming::Adaptive(Mutex::new(BoundaryTable::new(
                stream,
                base_duration,
                epoch,
            ))),
            prime_strategy: PrimeStrategy::None,
        }
    }

    pub fn with_prime_strategy(mut self, prime_strategy: PrimeStrategy) -> Self {
        self.prime_strategy = prime_strategy;
        self
    }

    /// Build the clock a configuration describes
    pub fn from_config(config: &TransecConfig) -> TransecResult<Self> {
        config.validate()?;

        let clock = match config.jitter_range {
            Some(range) => SlotClock::adaptive(
                JitterStream::new(config.shared_secret.clone(), range),
                config.slot_duration,
                config.origin(),
            ),
            None => SlotClock::fixed(config.slot_duration, config.origin()),
        };

        Ok(clock.with_prime_strategy(config.prime_strategy))
    }

    /// Fail if an adaptive clock would walk more than [`MAX_ADAPTIVE_WALK`]
    /// slots to reach `now`. Fixed clocks always pass.
    pub fn check_reachable(&self, now: Duration) -> TransecResult<()> {
        let SlotTiming::Adaptive(table) = &self.timing else {
            return Ok(());
        };
        let table = table.lock();
        let walk = table.max_slots_until(millis(now)).saturating_sub(table.evaluated());
        if walk > MAX_ADAPTIVE_WALK {
            return Err(TransecError::Configuration(format!(
                "adaptive epoch is up to {} slots in the past (limit {})",
                walk, MAX_ADAPTIVE_WALK
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn is_adaptive(&self) -> bool {
        matches!(self.timing, SlotTiming::Adaptive(_))
    }

    #[inline]
    pub fn prime_strategy(&self) -> PrimeStrategy {
        self.prime_strategy
    }

    /// Slot index before prime normalization
    pub fn raw_slot_at(&self, timestamp: Duration) -> SlotIndex {
        let t_ms = millis(timestamp);
        let raw = match &self.timing {
            SlotTiming::Fixed {
                duration_ms,
                epoch_ms,
            } => t_ms.saturating_sub(*epoch_ms) / duration_ms,
            SlotTiming::Adaptive(table) => table.lock().slot_at_ms(t_ms),
        };
        SlotIndex::new(raw)
    }

    /// Slot index used for key derivation
    pub fn slot_at(&self, timestamp: Duration) -> SlotIndex {
        self.normalize(self.raw_slot_at(timestamp))
    }

    /// Apply the configured prime normalization to a raw index
    #[inline]
    pub fn normalize(&self, raw: SlotIndex) -> SlotIndex {
        normalize_slot(raw, self.prime_strategy)
    }

    pub fn current_raw_slot(&self, source: &dyn TimeSource) -> SlotIndex {
        self.raw_slot_at(source.now())
    }

    pub fn current_slot(&self, source: &dyn TimeSource) -> SlotIndex {
        self.slot_at(source.now())
    }

    /// Drift in raw slots actually tolerated for a configured window
    #[inline]
    pub fn effective_drift(&self, drift_window: u32) -> u64 {
        let drift = u64::from(drift_window);
        if self.prime_strategy.is_active() {
            drift * PRIME_DRIFT_FACTOR
        } else {
            drift
        }
    }

    /// Candidate slots around the raw slot `raw`, ascending and distinct.
    ///
    /// With prime normalization the raw window is widened by
    /// [`PRIME_DRIFT_FACTOR`] and each member mapped to its prime.
    pub fn window(&self, raw: SlotIndex, drift_window: u32) -> Vec<SlotIndex> {
        let drift = self.effective_drift(drift_window);
        let low = raw.value().saturating_sub(drift);
        let high = raw.value().saturating_add(drift);

        let mut candidates: Vec<SlotIndex> = (low..=high)
            .map(|n| self.normalize(SlotIndex::new(n)))
            .collect();
        // Normalization is monotone, so duplicates are adjacent
        candidates.dedup();
        candidates
    }

    /// Start of raw slot `raw` as time since the Unix epoch
    pub fn boundary_time(&self, raw: SlotIndex) -> Duration {
        let ms = match &self.timing {
            SlotTiming::Fixed {
                duration_ms,
                epoch_ms,
            } => epoch_ms.saturating_add(raw.value().saturating_mul(*duration_ms)),
            SlotTiming::Adaptive(table) => table.lock().boundary_ms(raw.value()),
        };
        Duration::from_millis(ms)
    }

    /// Length of raw slot `raw`
    pub fn slot_duration_at(&self, raw: SlotIndex) -> Duration {
        let ms = match &self.timing {
            SlotTiming::Fixed { duration_ms, .. } => *duration_ms,
            SlotTiming::Adaptive(table) => table.lock().slot_len_ms(raw.value()),
        };
        Duration::from_millis(ms)
    }
}

impl std::fmt::Debug for SlotClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotClock")
            .field("adaptive", &self.is_adaptive())
            .field("prime_strategy", &self.prime_strategy)
            .finish_non_exhaustive()
    }
}
