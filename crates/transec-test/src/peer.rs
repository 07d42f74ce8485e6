//! Peer simulator - two TRANSEC endpoints on skewed manual clocks
//!
//! Simulates:
//! - A sender and a receiver sharing one configuration
//! - Independent clock skew on each side
//! - A lossy link between them
//! - Tallies of every open outcome

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use transec_core::{RejectReason, TransecConfig, TransecError, TransecResult};
use transec_crypto::{Opened, TransecCipher};
use transec_time::{ManualTimeSource, TimeSource};

use crate::link::{LinkConfig, LossyLink};

/// Signed offset of a peer's clock from true time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClockSkew {
    #[default]
    None,
    Ahead(Duration),
    Behind(Duration),
}

impl ClockSkew {
    pub fn apply(self, t: Duration) -> Duration {
        match self {
            ClockSkew::None => t,
            ClockSkew::Ahead(d) => t.saturating_add(d),
            ClockSkew::Behind(d) => t.saturating_sub(d),
        }
    }
}

/// Simulated endpoint
pub struct SimulatedPeer {
    pub cipher: TransecCipher,
    clock: Arc<ManualTimeSource>,
    skew: ClockSkew,
}

impl SimulatedPeer {
    pub fn new(config: TransecConfig, true_time: Duration, skew: ClockSkew) -> TransecResult<Self> {
        let clock = Arc::new(ManualTimeSource::new(skew.apply(true_time)));
        let cipher = TransecCipher::with_time_source(config, clock.clone())?;
        Ok(SimulatedPeer { cipher, clock, skew })
    }

    /// Re-read true time through this peer's skew
    fn sync(&self, true_time: Duration) {
        self.clock.set(self.skew.apply(true_time));
    }

    pub fn local_time(&self) -> Duration {
        self.clock.now()
    }

    pub fn skew(&self) -> ClockSkew {
        self.skew
    }
}

/// Open outcome tally
#[derive(Clone, Debug, Default)]
pub struct DeliveryReport {
    pub opened: Vec<Opened>,
    pub duplicates: u64,
    pub drift_exceeded: u64,
    pub generation_mismatch: u64,
    pub decryption_failures: u64,
    pub other: HashMap<String, u64>,
}

impl DeliveryReport {
    fn record(&mut self, result: TransecResult<Opened>) {
        match result {
            Ok(opened) => self.opened.push(opened),
            Err(TransecError::ReplaySuspected(RejectReason::DuplicateSequence)) => {
                self.duplicates += 1
            }
            Err(TransecError::DriftExceeded { .. }) => self.drift_exceeded += 1,
            Err(TransecError::GenerationMismatch { .. }) => self.generation_mismatch += 1,
            Err(TransecError::DecryptionFailure) => self.decryption_failures += 1,
            Err(other) => *self.other.entry(other.to_string()).or_default() += 1,
        }
    }

    pub fn rejected(&self) -> u64 {
        self.duplicates
            + self.drift_exceeded
            + self.generation_mismatch
            + self.decryption_failures
            + self.other.values().sum::<u64>()
    }
}

/// Sender/receiver pair driven by one true clock
pub struct PeerSimulator {
    pub sender: SimulatedPeer,
    pub receiver: SimulatedPeer,
    link: LossyLink,
    true_time: Duration,
    report: DeliveryReport,
}

impl PeerSimulator {
    pub fn new(config: TransecConfig, start: Duration) -> TransecResult<Self> {
        PeerSimulator::with_skew(config, start, ClockSkew::None, ClockSkew::None)
    }

    pub fn with_skew(
        config: TransecConfig,
        start: Duration,
        sender_skew: ClockSkew,
        receiver_skew: ClockSkew,
    ) -> TransecResult<Self> {
        Ok(PeerSimulator {
            sender: SimulatedPeer::new(config.clone(), start, sender_skew)?,
            receiver: SimulatedPeer::new(config, start, receiver_skew)?,
            link: LossyLink::new(LinkConfig::clean(), 0),
            true_time: start,
            report: DeliveryReport::default(),
        })
    }

    pub fn with_link(mut self, config: LinkConfig, seed: u64) -> Self {
        self.link = LossyLink::new(config, seed);
        self
    }

    pub fn true_time(&self) -> Duration {
        self.true_time
    }

    /// Move true time forward on both peers
    pub fn advance(&mut self, dt: Duration) {
        self.true_time = self.true_time.saturating_add(dt);
        self.sender.sync(self.true_time);
        self.receiver.sync(self.true_time);
    }

    /// Seal on the sender and hand the packet to the link
    pub fn send(&mut self, plaintext: &[u8]) -> TransecResult<()> {
        let packet = self.sender.cipher.seal(plaintext)?;
        self.link.send(packet);
        Ok(())
    }

    /// Inject raw bytes, as an attacker on the path would
    pub fn inject(&mut self, packet: Vec<u8>) {
        self.link.send(packet);
    }

    /// Advance time by `dt`, then open everything the link delivers
    pub fn step(&mut self, dt: Duration) {
        self.advance(dt);
        for packet in self.link.tick(dt) {
            let result = self.receiver.cipher.open(&packet);
            self.report.record(result);
        }
    }

    /// Step until nothing is in flight or `limit` elapses
    pub fn drain(&mut self, dt: Duration, limit: Duration) {
        let mut elapsed = Duration::ZERO;
        while self.link.in_flight() > 0 && elapsed < limit {
            self.step(dt);
            elapsed += dt;
        }
        if self.link.in_flight() > 0 {
            tracing::debug!(in_flight = self.link.in_flight(), ?limit, "drain limit reached");
        }
    }

    /// Seal and open directly, bypassing the link
    pub fn exchange(&self, plaintext: &[u8]) -> TransecResult<Opened> {
        let packet = self.sender.cipher.seal(plaintext)?;
        self.receiver.cipher.open(&packet)
    }

    pub fn report(&self) -> &DeliveryReport {
        &self.report
    }

    pub fn link(&self) -> &LossyLink {
        &self.link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transec_core::SharedSecret;

    fn config() -> TransecConfig {
        TransecConfig::new(SharedSecret::from_bytes([3; 32]))
            .with_slot_duration(Duration::from_secs(5))
            .with_drift_window(2)
    }

    #[test]
    fn test_skew_apply() {
        let t = Duration::from_secs(100);
        assert_eq!(ClockSkew::None.apply(t), t);
        assert_eq!(ClockSkew::Ahead(Duration::from_secs(3)).apply(t), Duration::from_secs(103));
        assert_eq!(ClockSkew::Behind(Duration::from_secs(3)).apply(t), Duration::from_secs(97));
        assert_eq!(ClockSkew::Behind(Duration::from_secs(300)).apply(t), Duration::ZERO);
    }

    #[test]
    fn test_peers_follow_true_time() {
        let mut sim = PeerSimulator::with_skew(
            config(),
            Duration::from_secs(1_000),
            ClockSkew::Ahead(Duration::from_secs(2)),
            ClockSkew::Behind(Duration::from_secs(2)),
        )
        .unwrap();

        sim.advance(Duration::from_secs(10));
        assert_eq!(sim.sender.local_time(), Duration::from_secs(1_012));
        assert_eq!(sim.receiver.local_time(), Duration::from_secs(1_008));
    }

    #[test]
    fn test_clean_exchange() {
        let mut sim = PeerSimulator::new(config(), Duration::from_secs(1_000)).unwrap();
        for i in 0..5u8 {
            sim.send(&[i]).unwrap();
        }
        sim.step(Duration::from_millis(10));

        let report = sim.report();
        assert_eq!(report.opened.len(), 5);
        assert_eq!(report.rejected(), 0);
        assert_eq!(report.opened[4].plaintext, vec![4]);
    }

    #[test]
    fn test_injected_replay_counted() {
        let mut sim = PeerSimulator::new(config(), Duration::from_secs(1_000)).unwrap();
        let packet = sim.sender.cipher.seal(b"once").unwrap();

        sim.inject(packet.clone());
        sim.inject(packet);
        sim.step(Duration::ZERO);

        assert_eq!(sim.report().opened.len(), 1);
        assert_eq!(sim.report().duplicates, 1);
    }
}
