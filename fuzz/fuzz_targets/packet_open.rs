#![no_main]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use transec_core::{RatchetConfig, SharedSecret, SlotIndex, TransecConfig};
use transec_crypto::TransecCipher;
use transec_time::ManualTimeSource;

#[derive(Arbitrary, Debug)]
struct Input {
    ratcheting: bool,
    local_slot: u64,
    aad: Vec<u8>,
    packet: Vec<u8>,
}

fn cipher(ratcheting: bool) -> &'static TransecCipher {
    static PLAIN: OnceLock<TransecCipher> = OnceLock::new();
    static RATCHETING: OnceLock<TransecCipher> = OnceLock::new();

    let (cell, ratchet) = if ratcheting {
        (&RATCHETING, Some(RatchetConfig::manual()))
    } else {
        (&PLAIN, None)
    };
    cell.get_or_init(|| {
        let mut config = TransecConfig::new(SharedSecret::from_bytes([0x42; 32]));
        config.ratchet = ratchet;
        let time = Arc::new(ManualTimeSource::new(Duration::from_secs(1_700_000_000)));
        TransecCipher::with_time_source(config, time).expect("valid fuzz configuration")
    })
}

fuzz_target!(|input: Input| {
    let cipher = cipher(input.ratcheting);
    // Arbitrary bytes must never open, and must never panic
    let result = cipher.open_at(&input.packet, &input.aad, SlotIndex::new(input.local_slot));
    match result {
        Ok(opened) => panic!("forged packet opened: {:?}", opened),
        Err(err) => assert!(err.is_packet_rejection(), "unexpected error {err}"),
    }
});
