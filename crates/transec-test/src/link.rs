//! Lossy link simulation
//!
//! Carries sealed packets between simulated peers under hostile conditions:
//! - Latency with uniform jitter
//! - Packet loss
//! - Reordering
//! - Duplication (an on-path replay)

use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Link conditions
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Base one-way latency
    pub base_latency: Duration,
    /// Extra latency drawn uniformly from this range (milliseconds)
    pub jitter_ms: (u32, u32),
    /// Packet loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    /// Reorder probability
    pub reorder_prob: f64,
    /// Reorder depth (max packets to jump)
    pub reorder_depth: u32,
    /// Duplicate probability
    pub duplicate_prob: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig::clean()
    }
}

impl LinkConfig {
    /// Instant, lossless, in order
    pub fn clean() -> Self {
        LinkConfig {
            base_latency: Duration::ZERO,
            jitter_ms: (0, 0),
            loss_rate: 0.0,
            reorder_prob: 0.0,
            reorder_depth: 0,
            duplicate_prob: 0.0,
        }
    }

    /// Ordinary internet path
    pub fn good() -> Self {
        LinkConfig {
            base_latency: Duration::from_millis(20),
            jitter_ms: (0, 10),
            loss_rate: 0.001,
            reorder_prob: 0.01,
            reorder_depth: 2,
            duplicate_prob: 0.001,
        }
    }

    /// Heavy loss, reordering and replayed duplicates
    pub fn hostile() -> Self {
        LinkConfig {
            base_latency: Duration::from_millis(200),
            jitter_ms: (0, 400),
            loss_rate: 0.15,
            reorder_prob: 0.2,
            reorder_depth: 10,
            duplicate_prob: 0.1,
        }
    }
}

#[derive(Clone, Debug)]
struct InFlight {
    data: Vec<u8>,
    delivery_time: Duration,
    send_time: Duration,
}

/// Link statistics
#[derive(Clone, Debug, Default)]
pub struct LinkStats {
    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub packets_lost: u64,
    pub packets_reordered: u64,
    pub packets_duplicated: u64,
    pub max_latency_ms: u64,
}

impl LinkStats {
    pub fn loss_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.packets_lost as f64 / self.packets_sent as f64
        }
    }
}

/// One-directional lossy link
pub struct LossyLink {
    config: LinkConfig,
    rng: StdRng,
    in_flight: VecDeque<InFlight>,
    current_time: Duration,
    stats: LinkStats,
}

impl LossyLink {
    pub fn new(config: LinkConfig, seed: u64) -> Self {
        LossyLink {
            config,
            rng: StdRng::seed_from_u64(seed),
            in_flight: VecDeque::new(),
            current_time: Duration::ZERO,
            stats: LinkStats::default(),
        }
    }

    fn latency(&mut self) -> Duration {
        let (min, max) = self.config.jitter_ms;
        let jitter = if max > min {
            self.rng.gen_range(min..=max)
        } else {
            min
        };
        self.config.base_latency + Duration::from_millis(u64::from(jitter))
    }

    fn roll(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.rng.gen::<f64>() < probability
    }

    /// Put a packet on the wire
    pub fn send(&mut self, data: Vec<u8>) {
        self.stats.packets_sent += 1;

        if self.roll(self.config.loss_rate) {
            self.stats.packets_lost += 1;
            return;
        }

        let delivery_time = self.current_time + self.latency();
        let packet = InFlight {
            data,
            delivery_time,
            send_time: self.current_time,
        };

        if self.roll(self.config.duplicate_prob) {
            let mut copy = packet.clone();
            copy.delivery_time += self.latency();
            self.in_flight.push_back(copy);
            self.stats.packets_duplicated += 1;
        }

        if !self.in_flight.is_empty() && self.roll(self.config.reorder_prob) {
            let depth = self.config.reorder_depth.min(self.in_flight.len() as u32);
            let pos = self.rng.gen_range(0..=depth) as usize;
            self.in_flight.insert(self.in_flight.len() - pos, packet);
            self.stats.packets_reordered += 1;
        } else {
            self.in_flight.push_back(packet);
        }
    }

    /// Advance link time and take every packet now due, in queue order
    pub fn tick(&mut self, dt: Duration) -> Vec<Vec<u8>> {
        self.current_time += dt;

        let now = self.current_time;
        let (due, pending): (Vec<InFlight>, Vec<InFlight>) =
            self.in_flight.drain(..).partition(|p| p.delivery_time <= now);
        self.in_flight = pending.into();

        due.into_iter()
            .map(|packet| {
                let latency = (packet.delivery_time - packet.send_time).as_millis() as u64;
                self.stats.packets_delivered += 1;
                self.stats.max_latency_ms = self.stats.max_latency_ms.max(latency);
                packet.data
            })
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clean_link_delivers_in_order() {
        let mut link = LossyLink::new(LinkConfig::clean(), 1);
        for i in 0..10u8 {
            link.send(vec![i]);
        }

        let delivered = link.tick(Duration::ZERO);
        assert_eq!(delivered, (0..10u8).map(|i| vec![i]).collect::<Vec<_>>());
        assert_eq!(link.in_flight(), 0);
    }

    #[test]
    fn test_latency_holds_packets() {
        let config = LinkConfig {
            base_latency: Duration::from_millis(100),
            ..LinkConfig::clean()
        };
        let mut link = LossyLink::new(config, 1);
        link.send(vec![1]);

        assert!(link.tick(Duration::from_millis(99)).is_empty());
        assert_eq!(link.tick(Duration::from_millis(1)), vec![vec![1]]);
        assert_eq!(link.stats().max_latency_ms, 100);
    }

    #[test]
    fn test_hostile_link() {
        let mut link = LossyLink::new(LinkConfig::hostile(), 12345);
        for i in 0..1000u32 {
            link.send(i.to_be_bytes().to_vec());
        }
        for _ in 0..200 {
            link.tick(Duration::from_millis(10));
        }

        let stats = link.stats();
        assert!(stats.loss_rate() > 0.05);
        assert!(stats.packets_duplicated > 0);
        assert!(stats.packets_reordered > 0);
        assert_eq!(
            stats.packets_delivered + link.in_flight() as u64,
            stats.packets_sent - stats.packets_lost + stats.packets_duplicated
        );
    }

    proptest! {
        #[test]
        fn prop_link_conserves_packets(seed in any::<u64>(), count in 0usize..200) {
            let mut link = LossyLink::new(LinkConfig::hostile(), seed);
            for i in 0..count {
                link.send(vec![i as u8]);
            }
            let mut delivered = 0u64;
            for _ in 0..200 {
                delivered += link.tick(Duration::from_millis(10)).len() as u64;
            }

            let stats = link.stats();
            prop_assert_eq!(delivered, stats.packets_delivered);
            prop_assert_eq!(link.in_flight(), 0);
            prop_assert_eq!(
                stats.packets_delivered,
                stats.packets_sent - stats.packets_lost + stats.packets_duplicated
            );
        }
    }
}
