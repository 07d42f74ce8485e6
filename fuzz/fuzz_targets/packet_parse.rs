#![no_main]

use libfuzzer_sys::fuzz_target;
use transec_wire::{min_packet_size, HeaderLayout, Packet};

fuzz_target!(|data: &[u8]| {
    for layout in [HeaderLayout::Plain, HeaderLayout::WithGeneration] {
        match Packet::parse(data, layout) {
            Ok(packet) => {
                assert!(data.len() >= min_packet_size(layout));
                assert_eq!(packet.to_bytes(), data);
            }
            Err(err) => assert!(err.is_packet_rejection()),
        }
    }
});
