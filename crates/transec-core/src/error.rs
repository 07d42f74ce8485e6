//! Error types for TRANSEC

use std::fmt;

use thiserror::Error;

use crate::{Generation, SlotIndex};

/// Why the replay guard refused a packet
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Sequence already accepted for this (generation, slot), or too far
    /// behind the highest accepted one to tell
    DuplicateSequence,
    /// Slot no longer inside the live drift window
    SlotOutOfWindow,
    /// Generation older than the oldest retained ratchet secret
    GenerationTooOld,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::DuplicateSequence => "duplicate sequence",
            RejectReason::SlotOutOfWindow => "slot out of window",
            RejectReason::GenerationTooOld => "generation too old",
        };
        f.write_str(reason)
    }
}

/// TRANSEC errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransecError {
    // Construction errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Wire errors
    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    // Per-packet errors
    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Replay suspected: {0}")]
    ReplaySuspected(RejectReason),

    #[error("Drift exceeded: slot {slot} outside window around local slot {local}")]
    DriftExceeded { slot: SlotIndex, local: SlotIndex },

    #[error("Generation mismatch: received {received}, retained {oldest}..={current}")]
    GenerationMismatch {
        received: Generation,
        oldest: Generation,
        current: Generation,
    },

    // Sender errors
    #[error("Sequence reuse: {requested} is not above last used {last}")]
    SequenceReuse { last: u64, requested: u64 },

    #[error("Sequence space exhausted for slot")]
    SequenceExhausted,

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Generation counter exhausted")]
    GenerationExhausted,
}

impl TransecError {
    /// True for failures that reject a single received packet.
    ///
    /// These all collapse to "could not open" at the protocol level; the
    /// detail is for local logging only.
    pub fn is_packet_rejection(&self) -> bool {
        matches!(
            self,
            TransecError::BufferTooShort { .. }
                | TransecError::DecryptionFailure
                | TransecError::ReplaySuspected(_)
                | TransecError::DriftExceeded { .. }
                | TransecError::GenerationMismatch { .. }
        )
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        TransecError::Configuration(msg.into())
    }
}

impl From<RejectReason> for TransecError {
    fn from(reason: RejectReason) -> Self {
        TransecError::ReplaySuspected(reason)
    }
}

/// Result type for TRANSEC operations
pub type TransecResult<T> = Result<T, TransecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_rejection_family() {
        assert!(TransecError::DecryptionFailure.is_packet_rejection());
        assert!(TransecError::from(RejectReason::DuplicateSequence).is_packet_rejection());
        assert!(!TransecError::Configuration("bad".into()).is_packet_rejection());
        assert!(!TransecError::SequenceReuse { last: 2, requested: 1 }.is_packet_rejection());
    }

    #[test]
    fn test_display_carries_reason() {
        let err = TransecError::ReplaySuspected(RejectReason::DuplicateSequence);
        assert_eq!(err.to_string(), "Replay suspected: duplicate sequence");
    }
}
