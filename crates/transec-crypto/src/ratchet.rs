//! OTAR-Lite: one-way hash ratchet over the shared secret
//!
//! ```text
//! secret'     = HMAC-SHA256(secret, "otar_ratchet" || BE64(generation))
//! generation' = generation + 1
//! ```
//!
//! Peers that share the initial secret and rotate the same number of times
//! hold the same secret without exchanging anything. A compromised secret
//! does not reveal earlier generations.

use std::collections::VecDeque;
use std::time::Duration;

use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use sha2::Sha256;

use transec_core::{
    Generation, RatchetConfig, SharedSecret, TransecError, TransecResult, SECRET_SIZE,
};

type HmacSha256 = Hmac<Sha256>;

/// Domain label for ratchet steps
const RATCHET_LABEL: &[u8] = b"otar_ratchet";

/// Most generations a receiver will step forward in one catch-up
pub const MAX_CATCH_UP: u64 = 1000;

/// One ratchet step from `secret` at `generation`
pub fn ratchet_secret(secret: &SharedSecret, generation: Generation) -> SharedSecret {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(RATCHET_LABEL);
    mac.update(&generation.to_bytes());
    let next: [u8; SECRET_SIZE] = mac.finalize().into_bytes().into();
    SharedSecret::from_bytes(next)
}

struct RatchetState {
    current: SharedSecret,
    generation: Generation,
    /// Prior generations, newest first
    retained: VecDeque<(Generation, SharedSecret)>,
    /// Start of the current refresh interval
    last_rotation: Duration,
}

impl RatchetState {
    fn oldest(&self) -> Generation {
        self.retained.back().map_or(self.generation, |(generation, _)| *generation)
    }

    fn step(&mut self, retention: usize) -> TransecResult<Generation> {
        let next_generation = self.generation.next().ok_or(TransecError::GenerationExhausted)?;
        let next = ratchet_secret(&self.current, self.generation);
        let previous = std::mem::replace(&mut self.current, next);

        self.retained.push_front((self.generation, previous));
        // Dropped secrets zeroize themselves
        self.retained.truncate(retention);
        self.generation = next_generation;
        Ok(next_generation)
    }
}

/// Ratchet state shared by the seal and open paths
pub struct RatchetManager {
    config: RatchetConfig,
    state: RwLock<RatchetState>,
}

impl RatchetManager {
    /// Start at generation 0 with the refresh interval beginning at `now`
    pub fn new(secret: SharedSecret, config: RatchetConfig, now: Duration) -> TransecResult<Self> {
        config.validate()?;
        Ok(RatchetManager {
            config,
            state: RwLock::new(RatchetState {
                current: secret,
                generation: Generation::ZERO,
                retained: VecDeque::with_capacity(config.retention),
                last_rotation: now,
            }),
        })
    }

    /// Start on a refresh schedule that began at `anchor`.
    ///
    /// Every interval already elapsed by `now` is applied immediately, so
    /// peers sharing an anchor hold the same generation whenever they were
    /// created. More than [`MAX_CATCH_UP`] elapsed intervals is a
    /// configuration error.
    pub fn anchored(
        secret: SharedSecret,
        config: RatchetConfig,
        anchor: Duration,
        now: Duration,
    ) -> TransecResult<Self> {
        let manager = RatchetManager::new(secret, config, anchor)?;
        if !config.auto_refresh {
            return Ok(manager);
        }

        let elapsed = now.saturating_sub(anchor).as_nanos() / config.refresh_interval.as_nanos();
        if elapsed > u128::from(MAX_CATCH_UP) {
            return Err(TransecError::Configuration(format!(
                "refresh schedule started {} intervals ago (limit {})",
                elapsed, MAX_CATCH_UP
            )));
        }
        manager.maybe_rotate(now)?;
        Ok(manager)
    }

    pub fn config(&self) -> &RatchetConfig {
        &self.config
    }

    pub fn generation(&self) -> Generation {
        self.state.read().generation
    }

    /// Oldest generation whose secret is still held
    pub fn oldest_generation(&self) -> Generation {
        self.state.read().oldest()
    }

    /// Consistent snapshot of the current (generation, secret)
    pub fn current(&self) -> (Generation, SharedSecret) {
        let state = self.state.read();
        (state.generation, state.current.clone())
    }

    /// Secret for a received generation
    pub fn secret_for(&self, received: Generation) -> TransecResult<SharedSecret> {
        let state = self.state.read();
        if received == state.generation {
            return Ok(state.current.clone());
        }

        state
            .retained
            .iter()
            .find(|(generation, _)| *generation == received)
            .map(|(_, secret)| secret.clone())
            .ok_or_else(|| TransecError::GenerationMismatch {
                received,
                oldest: state.oldest(),
                current: state.generation,
            })
    }

    /// Advance one generation now
    pub fn rotate(&self, now: Duration) -> TransecResult<Generation> {
        let mut state = self.state.write();
        let generation = state.step(self.config.retention)?;
        state.last_rotation = now;
        tracing::debug!(%generation, "ratchet rotated");
        Ok(generation)
    }

    /// Perform every rotation that has come due; returns how many ran.
    ///
    /// `last_rotation` advances by whole intervals, so peers that started
    /// together keep rotating on the same schedule.
    pub fn maybe_rotate(&self, now: Duration) -> TransecResult<u64> {
        if !self.config.auto_refresh {
            return Ok(0);
        }

        let interval = self.config.refresh_interval;
        if now.saturating_sub(self.state.read().last_rotation) < interval {
            return Ok(0);
        }

        let mut state = self.state.write();
        let elapsed = now.saturating_sub(state.last_rotation);
        let due = u64::try_from(elapsed.as_nanos() / interval.as_nanos()).unwrap_or(u64::MAX);
        if due == 0 {
            // Another thread rotated first
            return Ok(0);
        }

        for _ in 0..due {
            state.step(self.config.retention)?;
        }
        let advance = u32::try_from(due).map_or(elapsed, |n| interval.saturating_mul(n));
        state.last_rotation = state.last_rotation.saturating_add(advance);

        tracing::debug!(rotations = due, generation = %state.generation, "ratchet auto-refreshed");
        Ok(due)
    }

    /// Step forward to `target` along the same one-way chain.
    ///
    /// A target at or behind the current generation is a no-op.
    pub fn advance_to(&self, target: Generation) -> TransecResult<()> {
        let mut state = self.state.write();
        if target <= state.generation {
            return Ok(());
        }

        let steps = target.value() - state.generation.value();
        if steps > MAX_CATCH_UP {
            return Err(TransecError::GenerationMismatch {
                received: target,
                oldest: state.oldest(),
                current: state.generation,
            });
        }

        for _ in 0..steps {
            state.step(self.config.retention)?;
        }
        tracing::debug!(steps, generation = %state.generation, "ratchet caught up");
        Ok(())
    }

    /// Time until the next automatic rotation, `None` when rotation is manual
    pub fn time_until_refresh(&self, now: Duration) -> Option<Duration> {
        if !self.config.auto_refresh {
            return None;
        }
        let due = self.state.read().last_rotation.saturating_add(self.config.refresh_interval);
        Some(due.saturating_sub(now))
    }
}

impl std::fmt::Debug for RatchetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("RatchetManager")
            .field("generation", &state.generation)
            .field("oldest", &state.oldest())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn manager(config: RatchetConfig) -> RatchetManager {
        RatchetManager::new(SharedSecret::from_bytes([0x42; 32]), config, Duration::ZERO).unwrap()
    }

    #[test]
    fn test_ratchet_step_matches_hmac() {
        let secret = SharedSecret::from_bytes([7; 32]);

        let mut mac = HmacSha256::new_from_slice(&[7; 32]).unwrap();
        mac.update(b"otar_ratchet");
        mac.update(&0u64.to_be_bytes());
        let expected: [u8; 32] = mac.finalize().into_bytes().into();

        assert_eq!(ratchet_secret(&secret, Generation::ZERO).as_bytes(), &expected);
    }

    #[test]
    fn test_rotate_advances_generation() {
        let ratchet = manager(RatchetConfig::manual());
        let (g0, s0) = ratchet.current();
        assert_eq!(g0, Generation::ZERO);

        assert_eq!(ratchet.rotate(Duration::ZERO).unwrap(), Generation::new(1));
        let (g1, s1) = ratchet.current();
        assert_eq!(g1, Generation::new(1));
        assert_ne!(s0.as_bytes(), s1.as_bytes());
        assert_eq!(s1.as_bytes(), ratchet_secret(&s0, g0).as_bytes());
    }

    #[test]
    fn test_retention() {
        let ratchet = manager(RatchetConfig::manual().with_retention(2));
        for _ in 0..3 {
            ratchet.rotate(Duration::ZERO).unwrap();
        }

        assert_eq!(ratchet.generation(), Generation::new(3));
        assert_eq!(ratchet.oldest_generation(), Generation::new(1));
        assert!(ratchet.secret_for(Generation::new(3)).is_ok());
        assert!(ratchet.secret_for(Generation::new(2)).is_ok());
        assert!(ratchet.secret_for(Generation::new(1)).is_ok());

        assert_eq!(
            ratchet.secret_for(Generation::ZERO).unwrap_err(),
            TransecError::GenerationMismatch {
                received: Generation::ZERO,
                oldest: Generation::new(1),
                current: Generation::new(3),
            }
        );
        // Newer than current
        assert!(ratchet.secret_for(Generation::new(4)).is_err());
    }

    #[test]
    fn test_zero_retention_keeps_only_current() {
        let ratchet = manager(RatchetConfig::manual().with_retention(0));
        ratchet.rotate(Duration::ZERO).unwrap();

        assert_eq!(ratchet.oldest_generation(), Generation::new(1));
        assert!(ratchet.secret_for(Generation::ZERO).is_err());
    }

    #[test]
    fn test_peers_agree() {
        let a = manager(RatchetConfig::manual());
        let b = manager(RatchetConfig::manual());

        for _ in 0..5 {
            a.rotate(Duration::ZERO).unwrap();
        }
        b.advance_to(Generation::new(5)).unwrap();

        assert_eq!(a.current().1.as_bytes(), b.current().1.as_bytes());
        assert_eq!(b.generation(), Generation::new(5));

        // Behind or equal is a no-op
        b.advance_to(Generation::new(2)).unwrap();
        assert_eq!(b.generation(), Generation::new(5));
    }

    #[test]
    fn test_catch_up_bounded() {
        let ratchet = manager(RatchetConfig::manual());
        let result = ratchet.advance_to(Generation::new(MAX_CATCH_UP + 1));
        assert!(matches!(result, Err(TransecError::GenerationMismatch { .. })));
        assert_eq!(ratchet.generation(), Generation::ZERO);
    }

    #[test]
    fn test_maybe_rotate_on_schedule() {
        let ratchet = manager(RatchetConfig::auto(HOUR));

        assert_eq!(ratchet.maybe_rotate(HOUR - Duration::from_secs(1)).unwrap(), 0);
        let ten_minutes = Duration::from_secs(600);
        assert_eq!(ratchet.time_until_refresh(ten_minutes), Some(HOUR - ten_minutes));

        assert_eq!(ratchet.maybe_rotate(HOUR).unwrap(), 1);
        assert_eq!(ratchet.generation(), Generation::new(1));

        // Three and a half intervals later: three more, aligned to whole hours
        let later = HOUR * 4 + Duration::from_secs(1800);
        assert_eq!(ratchet.maybe_rotate(later).unwrap(), 3);
        assert_eq!(ratchet.generation(), Generation::new(4));
        assert_eq!(ratchet.time_until_refresh(later), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_anchored_peers_share_schedule() {
        let secret = SharedSecret::from_bytes([0x42; 32]);
        let anchor = Duration::from_secs(10_000);
        let early = RatchetManager::anchored(
            secret.clone(),
            RatchetConfig::auto(HOUR),
            anchor,
            anchor + HOUR - Duration::from_secs(60),
        )
        .unwrap();
        let late = RatchetManager::anchored(
            secret,
            RatchetConfig::auto(HOUR),
            anchor,
            anchor + HOUR + Duration::from_secs(60),
        )
        .unwrap();

        assert_eq!(early.generation(), Generation::ZERO);
        assert_eq!(late.generation(), Generation::new(1));
        assert_eq!(late.time_until_refresh(anchor + HOUR * 2), Some(Duration::ZERO));

        // The early peer rotates on the same boundary
        assert_eq!(early.maybe_rotate(anchor + HOUR).unwrap(), 1);
        assert_eq!(early.current().1.as_bytes(), late.current().1.as_bytes());
    }

    #[test]
    fn test_anchored_catch_up_bounded() {
        let config = RatchetConfig::auto(Duration::from_secs(60));
        let now = Duration::from_secs(60 * (MAX_CATCH_UP + 1));
        let secret = SharedSecret::from_bytes([0; 32]);
        let result = RatchetManager::anchored(secret, config, Duration::ZERO, now);
        assert!(matches!(result, Err(TransecError::Configuration(_))));

        // Manual rotation has no schedule to catch up on
        let manual = RatchetManager::anchored(
            SharedSecret::from_bytes([0; 32]),
            RatchetConfig::manual(),
            Duration::ZERO,
            now,
        )
        .unwrap();
        assert_eq!(manual.generation(), Generation::ZERO);
    }

    #[test]
    fn test_manual_never_auto_rotates() {
        let ratchet = manager(RatchetConfig::manual());
        assert_eq!(ratchet.maybe_rotate(HOUR * 100).unwrap(), 0);
        assert_eq!(ratchet.time_until_refresh(HOUR), None);
    }

    #[test]
    fn test_rejects_short_interval() {
        let config = RatchetConfig::auto(Duration::from_secs(59));
        let result = RatchetManager::new(SharedSecret::from_bytes([0; 32]), config, Duration::ZERO);
        assert!(matches!(result, Err(TransecError::Configuration(_))));
    }
}
