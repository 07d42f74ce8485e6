//! Configuration surface for a TRANSEC cipher
//!
//! Every cipher constructor calls [`TransecConfig::validate`] so that a
//! degenerate configuration fails at construction, never per packet.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{SharedSecret, TransecError, TransecResult};

/// Default domain-separation context
pub const DEFAULT_CONTEXT: &[u8] = b"z-sandbox:transec:v1";

/// Default slot duration
pub const DEFAULT_SLOT_DURATION: Duration = Duration::from_secs(5);

/// Default drift tolerance (± slots)
pub const DEFAULT_DRIFT_WINDOW: u32 = 2;

/// Upper bound on the drift window; keeps the candidate set small
pub const MAX_DRIFT_WINDOW: u32 = 1024;

/// Default OTAR-Lite refresh interval
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Shortest refresh interval accepted
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Prior generations kept by default for in-flight packets
pub const DEFAULT_RETENTION: usize = 1;

/// Upper bound on retained prior generations
pub const MAX_RETENTION: usize = 64;

/// How raw slot indices are mapped onto primes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PrimeStrategy {
    /// Raw slot indices
    #[default]
    None,
    /// Nearest prime, ties toward the smaller prime
    Nearest,
    /// Smallest prime >= index
    Next,
}

impl PrimeStrategy {
    #[inline]
    pub fn is_active(self) -> bool {
        self != PrimeStrategy::None
    }
}

impl FromStr for PrimeStrategy {
    type Err = TransecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PrimeStrategy::None),
            "nearest" => Ok(PrimeStrategy::Nearest),
            "next" => Ok(PrimeStrategy::Next),
            other => Err(TransecError::config(format!("invalid prime strategy: {other}"))),
        }
    }
}

impl fmt::Display for PrimeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimeStrategy::None => "none",
            PrimeStrategy::Nearest => "nearest",
            PrimeStrategy::Next => "next",
        };
        f.write_str(name)
    }
}

/// Bounds of the per-slot jitter added in adaptive mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JitterRange {
    pub min: Duration,
    pub max: Duration,
}

impl JitterRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        JitterRange { min, max }
    }

    /// Convenience constructor in whole seconds
    pub fn from_secs(min: u64, max: u64) -> Self {
        JitterRange::new(Duration::from_secs(min), Duration::from_secs(max))
    }
}

/// OTAR-Lite ratchet settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RatchetConfig {
    /// Time between automatic rotations
    pub refresh_interval: Duration,
    /// Rotate automatically once `refresh_interval` has elapsed
    pub auto_refresh: bool,
    /// Prior generations kept alongside the current one
    pub retention: usize,
}

impl RatchetConfig {
    /// Manual rotation only
    pub fn manual() -> Self {
        RatchetConfig {
            auto_refresh: false,
            ..RatchetConfig::default()
        }
    }

    /// Automatic rotation every `refresh_interval`
    pub fn auto(refresh_interval: Duration) -> Self {
        RatchetConfig {
            refresh_interval,
            auto_refresh: true,
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn validate(&self) -> TransecResult<()> {
        if self.refresh_interval < MIN_REFRESH_INTERVAL {
            return Err(TransecError::config(format!(
                "refresh interval must be >= {}s",
                MIN_REFRESH_INTERVAL.as_secs()
            )));
        }
        if self.retention > MAX_RETENTION {
            return Err(TransecError::config(format!(
                "retention {} exceeds maximum {}",
                self.retention, MAX_RETENTION
            )));
        }
        Ok(())
    }
}

impl Default for RatchetConfig {
    fn default() -> Self {
        RatchetConfig {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            auto_refresh: true,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// TRANSEC cipher configuration
#[derive(Clone, Debug)]
pub struct TransecConfig {
    /// Pre-shared 256-bit secret
    pub shared_secret: SharedSecret,
    /// Domain-separation bytes mixed into every key
    pub context: Vec<u8>,
    /// Slot length (base length in adaptive mode)
    pub slot_duration: Duration,
    /// Slots accepted on either side of the local slot
    pub drift_window: u32,
    /// Enables adaptive slot timing when set; requires an explicit `epoch`
    pub jitter_range: Option<JitterRange>,
    /// Prime normalization of slot indices
    pub prime_strategy: PrimeStrategy,
    /// Enables OTAR-Lite (and the generation header field) when set
    pub ratchet: Option<RatchetConfig>,
    /// Origin of slot 0 and of the refresh schedule, as time since the Unix
    /// epoch. Unset means the Unix epoch itself for fixed slots.
    pub epoch: Option<Duration>,
}

impl TransecConfig {
    pub fn new(shared_secret: SharedSecret) -> Self {
        TransecConfig {
            shared_secret,
            context: DEFAULT_CONTEXT.to_vec(),
            slot_duration: DEFAULT_SLOT_DURATION,
            drift_window: DEFAULT_DRIFT_WINDOW,
            jitter_range: None,
            prime_strategy: PrimeStrategy::None,
            ratchet: None,
            epoch: None,
        }
    }

    /// Build from raw secret bytes; anything but 32 bytes is rejected
    pub fn from_secret_bytes(secret: &[u8]) -> TransecResult<Self> {
        Ok(Self::new(SharedSecret::from_slice(secret)?))
    }

    pub fn with_context(mut self, context: impl Into<Vec<u8>>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_slot_duration(mut self, slot_duration: Duration) -> Self {
        self.slot_duration = slot_duration;
        self
    }

    pub fn with_drift_window(mut self, drift_window: u32) -> Self {
        self.drift_window = drift_window;
        self
    }

    pub fn with_jitter_range(mut self, jitter_range: JitterRange) -> Self {
        self.jitter_range = Some(jitter_range);
        self
    }

    pub fn with_prime_strategy(mut self, prime_strategy: PrimeStrategy) -> Self {
        self.prime_strategy = prime_strategy;
        self
    }

    pub fn with_ratchet(mut self, ratchet: RatchetConfig) -> Self {
        self.ratchet = Some(ratchet);
        self
    }

    pub fn with_epoch(mut self, epoch: Duration) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Slot 0 origin, falling back to the Unix epoch
    #[inline]
    pub fn origin(&self) -> Duration {
        self.epoch.unwrap_or(Duration::ZERO)
    }

    /// True when packets carry a generation field
    #[inline]
    pub fn ratcheting_enabled(&self) -> bool {
        self.ratchet.is_some()
    }

    /// Reject degenerate parameters
    pub fn validate(&self) -> TransecResult<()> {
        if self.slot_duration < Duration::from_millis(1) {
            return Err(TransecError::config("slot duration must be at least 1ms"));
        }

        if self.drift_window > MAX_DRIFT_WINDOW {
            return Err(TransecError::config(format!(
                "drift window {} exceeds maximum {}",
                self.drift_window, MAX_DRIFT_WINDOW
            )));
        }

        if let Some(jitter) = self.jitter_range {
            if jitter.min > jitter.max {
                return Err(TransecError::config(format!(
                    "invalid jitter range: min {:?} > max {:?}",
                    jitter.min, jitter.max
                )));
            }
            // Boundaries are computed in whole milliseconds
            if jitter.max.as_millis() > u128::from(u32::MAX) {
                return Err(TransecError::config("jitter max too large"));
            }
            // Adaptive boundaries are walked forward from slot 0
            if self.epoch.is_none() {
                return Err(TransecError::config(
                    "adaptive slot timing requires an explicit session epoch",
                ));
            }
        }

        if let Some(ratchet) = self.ratchet {
            ratchet.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TransecConfig {
        TransecConfig::new(SharedSecret::from_bytes([0u8; 32]))
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.slot_duration, Duration::from_secs(5));
        assert_eq!(config.drift_window, 2);
        assert_eq!(config.prime_strategy, PrimeStrategy::None);
        assert_eq!(config.context, DEFAULT_CONTEXT);
        assert!(!config.ratcheting_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secret_length_rejected() {
        let result = TransecConfig::from_secret_bytes(&[1u8; 31]);
        assert!(matches!(result, Err(TransecError::Configuration(_))));
    }

    #[test]
    fn test_inverted_jitter_rejected() {
        let config = config().with_jitter_range(JitterRange::from_secs(10, 2));
        assert!(matches!(config.validate(), Err(TransecError::Configuration(_))));
    }

    #[test]
    fn test_adaptive_requires_epoch() {
        let jitter = JitterRange::from_secs(2, 10);
        let unanchored = config().with_jitter_range(jitter);
        assert!(matches!(unanchored.validate(), Err(TransecError::Configuration(_))));

        let anchored = unanchored.with_epoch(Duration::from_secs(1_700_000_000));
        assert!(anchored.validate().is_ok());
        assert_eq!(anchored.origin(), Duration::from_secs(1_700_000_000));
        assert_eq!(config().origin(), Duration::ZERO);
    }

    #[test]
    fn test_zero_slot_duration_rejected() {
        let config = config().with_slot_duration(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_drift_window_bound() {
        assert!(config().with_drift_window(MAX_DRIFT_WINDOW).validate().is_ok());
        assert!(config().with_drift_window(MAX_DRIFT_WINDOW + 1).validate().is_err());
    }

    #[test]
    fn test_refresh_interval_floor() {
        let too_fast = config().with_ratchet(RatchetConfig::auto(Duration::from_secs(59)));
        assert!(too_fast.validate().is_err());

        let ok = config().with_ratchet(RatchetConfig::auto(Duration::from_secs(60)));
        assert!(ok.validate().is_ok());
        assert!(ok.ratcheting_enabled());
    }

    #[test]
    fn test_retention_bound() {
        let retention = MAX_RETENTION + 1;
        let config = config().with_ratchet(RatchetConfig::manual().with_retention(retention));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prime_strategy_parse() {
        assert_eq!("none".parse::<PrimeStrategy>(), Ok(PrimeStrategy::None));
        assert_eq!("nearest".parse::<PrimeStrategy>(), Ok(PrimeStrategy::Nearest));
        assert_eq!("next".parse::<PrimeStrategy>(), Ok(PrimeStrategy::Next));
        assert!("closest".parse::<PrimeStrategy>().is_err());
        assert_eq!(PrimeStrategy::Nearest.to_string(), "nearest");
    }
}
