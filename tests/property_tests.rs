//! Property-based tests using proptest
//!
//! These tests validate codec invariants across randomly generated headers,
//! payloads and command lines.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use sdr_link::core::packet::{
    ClassId, FractionalTimestamp, IntegerTimestamp, Packet, PacketHeader, PacketType,
    MIN_PACKET_SIZE,
};
use sdr_link::protocol::message::{InboundMessage, OutboundCommand};

fn integer_kind() -> impl Strategy<Value = IntegerTimestamp> {
    prop_oneof![
        Just(IntegerTimestamp::Utc),
        Just(IntegerTimestamp::Gps),
        Just(IntegerTimestamp::Other),
    ]
}

fn fractional_kind() -> impl Strategy<Value = FractionalTimestamp> {
    prop_oneof![
        Just(FractionalTimestamp::SampleCount),
        Just(FractionalTimestamp::RealTime),
        Just(FractionalTimestamp::FreeRunning),
    ]
}

// Property: streamed data with class id and both timestamps survives a round trip
proptest! {
    #[test]
    fn prop_streamed_packet_roundtrip(
        stream_id in any::<u32>(),
        oui in any::<u32>(),
        information_class in any::<u16>(),
        packet_class in any::<u16>(),
        tsi in integer_kind(),
        seconds in any::<u32>(),
        tsf in fractional_kind(),
        fraction in any::<u64>(),
        sequence in 0u8..16,
        payload in prop::collection::vec(any::<u8>(), 0..2048),
        trailer in proptest::option::of(any::<u32>()),
    ) {
        let header = PacketHeader::new(PacketType::IfDataWithStream)
            .with_stream_id(stream_id)
            .with_class_id(ClassId::new(oui, information_class, packet_class))
            .with_integer_timestamp(tsi, seconds)
            .with_fractional_timestamp(tsf, fraction)
            .with_sequence(sequence);
        let mut packet = Packet::new(header, payload.clone());
        if let Some(trailer) = trailer {
            packet = packet.with_trailer(trailer);
        }

        let bytes = packet.to_bytes().expect("encode");
        prop_assert_eq!(bytes.len(), packet.encoded_len());

        let decoded = Packet::from_bytes(&bytes).expect("decode");
        prop_assert_eq!(decoded.header.packet_type, PacketType::IfDataWithStream);
        prop_assert_eq!(decoded.header.stream_id, Some(stream_id));
        let class_id = decoded.header.class_id.expect("class id");
        prop_assert_eq!(class_id.oui, oui & 0x00FF_FFFF);
        prop_assert_eq!(class_id.information_class, information_class);
        prop_assert_eq!(class_id.packet_class, packet_class);
        prop_assert_eq!(decoded.header.integer_timestamp_kind, tsi);
        prop_assert_eq!(decoded.header.integer_timestamp, Some(seconds));
        prop_assert_eq!(decoded.header.fractional_timestamp_kind, tsf);
        prop_assert_eq!(decoded.header.fractional_timestamp, Some(fraction));
        prop_assert_eq!(decoded.header.sequence, sequence);
        prop_assert_eq!(decoded.trailer, trailer);
        prop_assert_eq!(decoded.payload, payload);
    }
}

// Property: anything shorter than the minimum frame is rejected
proptest! {
    #[test]
    fn prop_short_buffers_rejected(data in prop::collection::vec(any::<u8>(), 0..MIN_PACKET_SIZE)) {
        prop_assert!(Packet::from_bytes(&data).is_err());
    }
}

// Property: decoding arbitrary bytes never panics, and whatever decodes re-encodes to the same frame
proptest! {
    #[test]
    fn prop_decode_arbitrary_bytes(data in prop::collection::vec(any::<u8>(), 0..512)) {
        if let Ok(packet) = Packet::from_bytes(&data) {
            let bytes = packet.to_bytes().expect("decoded packets re-encode");
            prop_assert_eq!(bytes.len(), data.len());
            prop_assert_eq!(Packet::from_bytes(&bytes).expect("re-decode"), packet);
        }
    }
}

// Property: an outbound command reads back as the same sequence and text
proptest! {
    #[test]
    fn prop_command_line_classification(
        sequence in any::<u32>(),
        diagnostic in any::<bool>(),
        text in "[a-z][a-z0-9 =_.]{0,60}",
    ) {
        let line = OutboundCommand::new(sequence, text.clone(), diagnostic).to_line();
        match InboundMessage::parse(&line).expect("command line parses") {
            InboundMessage::Command { sequence: parsed, diagnostic: flag, text: body } => {
                prop_assert_eq!(parsed, Some(sequence));
                prop_assert_eq!(flag, diagnostic);
                prop_assert_eq!(body, text);
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}

// Property: line classification never panics
proptest! {
    #[test]
    fn prop_parse_arbitrary_line(line in "\\PC{0,200}") {
        let _ = InboundMessage::parse(&line);
    }
}
