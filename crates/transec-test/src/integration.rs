//! End-to-end Integration Test Suite
//!
//! Tests that verify complete TRANSEC flows between simulated peers:
//! - Round trips inside the drift window
//! - Drift boundaries under clock skew
//! - Replay rejection on a duplicating link
//! - Ratchet rotation, retention and catch-up
//! - Adaptive and prime-normalized slot timing

use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
