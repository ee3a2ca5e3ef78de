#![no_main]

use libfuzzer_sys::fuzz_target;
use sdr_link::core::discovery::DiscoveryRecord;
use sdr_link::core::packet::Packet;

fuzz_target!(|data: &[u8]| {
    // Stream datagrams come straight off the network
    if let Ok(packet) = Packet::from_bytes(data) {
        let _ = packet.to_bytes();
        let _ = DiscoveryRecord::from_packet(&packet);
    }
});
