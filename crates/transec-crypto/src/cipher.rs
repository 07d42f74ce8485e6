//! TRANSEC cipher - time-slotted sealing and opening
//!
//! Ties the slot clock, key schedule, AEAD codec, replay guard and ratchet
//! together behind one `Send + Sync` object. Peers configured with the same
//! secret and roughly synchronized clocks exchange packets with no handshake.
//!
//! Opening runs a fixed pipeline; the first failing stage decides the error:
//! 1. parse the header (`BufferTooShort`)
//! 2. resolve the generation's secret (`GenerationMismatch`)
//! 3. admit the header slot against the local drift window (`DriftExceeded`)
//! 4. derive the slot key and verify the AEAD tag (`DecryptionFailure`)
//! 5. record the sequence (`ReplaySuspected`)

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use transec_core::{
    Generation, SharedSecret, SlotIndex, TransecConfig, TransecError, TransecResult,
};
use transec_time::{SlotClock, SystemTimeSource, TimeSource};
use transec_wire::{HeaderLayout, Packet};

use crate::{
    AeadCodec, KeyCache, KeyScheduler, RatchetManager, ReplayGuard, SlotKey, MAX_TRACKED_SLOTS,
};

/// Successfully opened packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opened {
    pub plaintext: Vec<u8>,
    /// Slot the sender keyed the packet to
    pub slot: SlotIndex,
    pub sequence: u64,
    pub generation: Generation,
}

/// Last sequence used per (generation, slot) on the sending side
#[derive(Debug, Default)]
struct SequenceTracker {
    last: BTreeMap<(Generation, SlotIndex), u64>,
    /// Largest key forgotten at capacity; treated as fully used
    forgotten: Option<(Generation, SlotIndex)>,
}

impl SequenceTracker {
    fn last(&self, generation: Generation, slot: SlotIndex) -> u64 {
        if self.forgotten.is_some_and(|floor| (generation, slot) <= floor) {
            return u64::MAX;
        }
        self.last.get(&(generation, slot)).copied().unwrap_or(0)
    }

    fn record(&mut self, generation: Generation, slot: SlotIndex, sequence: u64) {
        self.last.insert((generation, slot), sequence);
        while self.last.len() > MAX_TRACKED_SLOTS {
            let Some((key, _)) = self.last.pop_first() else {
                break;
            };
            self.forgotten = Some(key);
        }
    }

    fn purge_before(&mut self, oldest: Generation) {
        self.last.retain(|(generation, _), _| *generation >= oldest);
    }
}

/// Time-synchronized encryption endpoint
pub struct TransecCipher {
    config: TransecConfig,
    clock: SlotClock,
    scheduler: KeyScheduler,
    keys: KeyCache,
    codec: AeadCodec,
    ratchet: Option<RatchetManager>,
    replay: Mutex<ReplayGuard>,
    sequences: Mutex<SequenceTracker>,
    time: Arc<dyn TimeSource>,
}

impl TransecCipher {
    /// Cipher on the system wall clock
    pub fn new(config: TransecConfig) -> TransecResult<Self> {
        TransecCipher::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Cipher on an explicit time source.
    ///
    /// An auto-refresh schedule starts at the configured epoch when one is
    /// set, otherwise at construction.
    pub fn with_time_source(
        config: TransecConfig,
        time: Arc<dyn TimeSource>,
    ) -> TransecResult<Self> {
        config.validate()?;

        let now = time.now();
        let clock = SlotClock::from_config(&config)?;
        clock.check_reachable(now)?;

        let ratchet = match config.ratchet {
            Some(ratchet) => Some(RatchetManager::anchored(
                config.shared_secret.clone(),
                ratchet,
                config.epoch.unwrap_or(now),
                now,
            )?),
            None => None,
        };

        // Room for every (generation, slot) pair the drift window keeps live
        let generations = config.ratchet.map_or(1, |ratchet| ratchet.retention + 1);
        let span = 2 * clock.effective_drift(config.drift_window) + 1;
        let live = generations.saturating_mul(usize::try_from(span).unwrap_or(usize::MAX));

        tracing::debug!(
            adaptive = clock.is_adaptive(),
            prime = %config.prime_strategy,
            ratcheting = ratchet.is_some(),
            drift_window = config.drift_window,
            "transec cipher created"
        );

        Ok(TransecCipher {
            scheduler: KeyScheduler::new(config.context.clone()),
            keys: KeyCache::default(),
            codec: AeadCodec::new(HeaderLayout::for_ratcheting(ratchet.is_some())),
            replay: Mutex::new(ReplayGuard::with_capacity(live.max(MAX_TRACKED_SLOTS))),
            sequences: Mutex::new(SequenceTracker::default()),
            clock,
            ratchet,
            config,
            time,
        })
    }

    pub fn config(&self) -> &TransecConfig {
        &self.config
    }

    pub fn clock(&self) -> &SlotClock {
        &self.clock
    }

    pub fn layout(&self) -> HeaderLayout {
        self.codec.layout()
    }

    /// Run any rotation that has come due
    fn refresh(&self) -> TransecResult<()> {
        if let Some(ratchet) = &self.ratchet {
            if ratchet.maybe_rotate(self.time.now())? > 0 {
                self.forget_old_generations();
            }
        }
        Ok(())
    }

    fn forget_old_generations(&self) {
        let Some(ratchet) = &self.ratchet else {
            return;
        };
        let oldest = ratchet.oldest_generation();
        self.keys.purge_before(oldest);
        self.sequences.lock().purge_before(oldest);
        let mut replay = self.replay.lock();
        let min_slot = replay.min_slot();
        replay.set_horizon(min_slot, oldest);
    }

    /// Current (generation, secret) for sealing
    fn sealing_secret(&self) -> (Generation, SharedSecret) {
        match &self.ratchet {
            Some(ratchet) => ratchet.current(),
            None => (Generation::ZERO, self.config.shared_secret.clone()),
        }
    }

    fn opening_secret(&self, generation: Generation) -> TransecResult<SharedSecret> {
        match &self.ratchet {
            Some(ratchet) => ratchet.secret_for(generation),
            None => Ok(self.config.shared_secret.clone()),
        }
    }

    fn slot_key(
        &self,
        secret: &SharedSecret,
        slot: SlotIndex,
        generation: Generation,
    ) -> SlotKey {
        self.keys.get_or_derive(generation, slot, || {
            self.scheduler.derive(secret, slot, generation)
        })
    }

    fn seal_inner(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        raw_slot: SlotIndex,
        sequence: Option<u64>,
    ) -> TransecResult<Vec<u8>> {
        self.refresh()?;

        let (generation, secret) = self.sealing_secret();
        let slot = self.clock.normalize(raw_slot);

        let mut sequences = self.sequences.lock();
        let last = sequences.last(generation, slot);
        let sequence = match sequence {
            Some(requested) if requested <= last => {
                return Err(TransecError::SequenceReuse { last, requested });
            }
            Some(requested) => requested,
            None => last.checked_add(1).ok_or(TransecError::SequenceExhausted)?,
        };

        let key = self.slot_key(&secret, slot, generation);
        let packet = self
            .codec
            .seal(&key, slot, sequence, generation, plaintext, aad)?;
        sequences.record(generation, slot, sequence);

        tracing::trace!(%slot, sequence, %generation, len = plaintext.len(), "sealed");
        Ok(packet.to_bytes())
    }

    /// Seal for the current slot with the next sequence number
    pub fn seal(&self, plaintext: &[u8]) -> TransecResult<Vec<u8>> {
        self.seal_with_aad(plaintext, &[])
    }

    pub fn seal_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> TransecResult<Vec<u8>> {
        let raw_slot = self.clock.current_raw_slot(self.time.as_ref());
        self.seal_inner(plaintext, aad, raw_slot, None)
    }

    /// Seal for an explicit raw slot and sequence.
    ///
    /// `sequence` must be above every sequence already used for the slot.
    /// Slots too old to still be tracked count as fully used.
    pub fn seal_at(
        &self,
        plaintext: &[u8],
        raw_slot: SlotIndex,
        sequence: u64,
    ) -> TransecResult<Vec<u8>> {
        self.seal_inner(plaintext, &[], raw_slot, Some(sequence))
    }

    pub fn seal_at_with_aad(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        raw_slot: SlotIndex,
        sequence: u64,
    ) -> TransecResult<Vec<u8>> {
        self.seal_inner(plaintext, aad, raw_slot, Some(sequence))
    }

    /// Open against the local clock
    pub fn open(&self, packet: &[u8]) -> TransecResult<Opened> {
        self.open_with_aad(packet, &[])
    }

    pub fn open_with_aad(&self, packet: &[u8], aad: &[u8]) -> TransecResult<Opened> {
        let local = self.clock.current_raw_slot(self.time.as_ref());
        self.open_at(packet, aad, local)
    }

    /// Open as if the local clock read `local_raw_slot`
    pub fn open_at(
        &self,
        packet: &[u8],
        aad: &[u8],
        local_raw_slot: SlotIndex,
    ) -> TransecResult<Opened> {
        let result = self.open_inner(packet, aad, local_raw_slot);
        if let Err(err) = &result {
            tracing::debug!(error = %err, local = %local_raw_slot, "packet rejected");
        }
        result
    }

    fn open_inner(
        &self,
        bytes: &[u8],
        aad: &[u8],
        local_raw_slot: SlotIndex,
    ) -> TransecResult<Opened> {
        self.refresh()?;

        let packet = Packet::parse(bytes, self.codec.layout())?;
        let header = packet.header;
        let generation = header.effective_generation();
        let secret = self.opening_secret(generation)?;

        let window = self.clock.window(local_raw_slot, self.config.drift_window);
        if window.binary_search(&header.slot).is_err() {
            return Err(TransecError::DriftExceeded {
                slot: header.slot,
                local: self.clock.normalize(local_raw_slot),
            });
        }

        let key = self.slot_key(&secret, header.slot, generation);
        let plaintext = self.codec.open(&packet, &key, aad)?;

        {
            let mut replay = self.replay.lock();
            let oldest = self
                .ratchet
                .as_ref()
                .map_or(Generation::ZERO, RatchetManager::oldest_generation);
            if let Some(&min_slot) = window.first() {
                replay.set_horizon(min_slot, oldest);
            }
            replay.check_and_record(generation, header.slot, header.sequence)?;
        }

        tracing::trace!(slot = %header.slot, sequence = header.sequence, %generation, "opened");
        Ok(Opened {
            plaintext,
            slot: header.slot,
            sequence: header.sequence,
            generation,
        })
    }

    /// Advance the ratchet one generation
    pub fn rotate(&self) -> TransecResult<Generation> {
        let ratchet = self
            .ratchet
            .as_ref()
            .ok_or_else(|| TransecError::Configuration("ratcheting is not enabled".into()))?;
        let generation = ratchet.rotate(self.time.now())?;
        self.forget_old_generations();
        Ok(generation)
    }

    /// Catch up with a peer that has rotated further
    pub fn sync_generation(&self, target: Generation) -> TransecResult<()> {
        let ratchet = self
            .ratchet
            .as_ref()
            .ok_or_else(|| TransecError::Configuration("ratcheting is not enabled".into()))?;
        ratchet.advance_to(target)?;
        self.forget_old_generations();
        Ok(())
    }

    /// Current ratchet generation; always zero without ratcheting
    pub fn generation(&self) -> Generation {
        self.ratchet
            .as_ref()
            .map_or(Generation::ZERO, RatchetManager::generation)
    }

    /// Slot used for sealing right now
    pub fn current_slot(&self) -> SlotIndex {
        self.clock.current_slot(self.time.as_ref())
    }

    /// Time until the next automatic rotation, if any
    pub fn time_until_refresh(&self) -> Option<Duration> {
        self.ratchet
            .as_ref()
            .and_then(|ratchet| ratchet.time_until_refresh(self.time.now()))
    }
}

impl std::fmt::Debug for TransecCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransecCipher")
            .field("clock", &self.clock)
            .field("layout", &self.codec.layout())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}
