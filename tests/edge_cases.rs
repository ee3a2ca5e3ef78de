#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case tests for the wire formats
//! Boundary lengths, malformed headers, partial lines and incomplete discovery payloads

use futures::StreamExt;
use sdr_link::core::codec::{LineCodec, MAX_LINE_LENGTH};
use sdr_link::core::discovery::DiscoveryRecord;
use sdr_link::core::packet::{
    ClassId, FractionalTimestamp, IntegerTimestamp, Packet, PacketHeader, PacketType, StreamKind,
    MIN_PACKET_SIZE,
};
use sdr_link::error::ProtocolError;
use sdr_link::protocol::message::InboundMessage;
use tokio_util::codec::FramedRead;

// ============================================================================
// PACKET CODEC EDGE CASES
// ============================================================================

fn minimal_packet() -> Packet {
    Packet::new(
        PacketHeader::new(PacketType::IfDataWithStream).with_stream_id(0x0400_0001),
        vec![0x5A; MIN_PACKET_SIZE - 8],
    )
}

#[test]
fn test_every_short_buffer_rejected() {
    let bytes = minimal_packet().to_bytes().unwrap();
    assert_eq!(bytes.len(), MIN_PACKET_SIZE);

    for len in 0..MIN_PACKET_SIZE {
        match Packet::from_bytes(&bytes[..len]) {
            Err(ProtocolError::PacketTooShort(n)) => assert_eq!(n, len),
            other => panic!("length {len}: unexpected {other:?}"),
        }
    }
}

#[test]
fn test_minimum_size_packet_decodes() {
    let packet = minimal_packet();
    let decoded = Packet::from_bytes(&packet.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded, packet);
    assert_eq!(decoded.header.length_words, 7);
}

#[test]
fn test_unknown_type_nibbles_rejected() {
    let mut bytes = minimal_packet().to_bytes().unwrap();
    for nibble in 6u8..=15 {
        bytes[0] = (nibble << 4) | (bytes[0] & 0x0F);
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(ProtocolError::UnknownPacketType(n)) if n == nibble
        ));
    }
}

#[test]
fn test_declared_length_longer_than_datagram() {
    let mut bytes = minimal_packet().to_bytes().unwrap();
    bytes[3] = 8;
    assert!(matches!(
        Packet::from_bytes(&bytes),
        Err(ProtocolError::LengthMismatch {
            declared: 8,
            actual: 28
        })
    ));
}

#[test]
fn test_truncated_datagram_rejected() {
    let packet = Packet::new(
        PacketHeader::new(PacketType::ExtDataWithStream).with_stream_id(1),
        vec![0; 64],
    );
    let bytes = packet.to_bytes().unwrap();
    assert!(matches!(
        Packet::from_bytes(&bytes[..bytes.len() - 4]),
        Err(ProtocolError::LengthMismatch { .. })
    ));
}

#[test]
fn test_trailer_flag_with_no_room_for_trailer() {
    // 7 header words fill the whole 28-byte frame
    let header = PacketHeader::new(PacketType::ExtContext)
        .with_stream_id(9)
        .with_class_id(ClassId::radio(0x8002))
        .with_integer_timestamp(IntegerTimestamp::Gps, 1)
        .with_fractional_timestamp(FractionalTimestamp::RealTime, 2);
    let mut bytes = Packet::new(header, Vec::new()).to_bytes().unwrap();
    assert_eq!(bytes.len(), 28);

    bytes[0] |= 0x04;
    assert!(matches!(
        Packet::from_bytes(&bytes),
        Err(ProtocolError::InvalidPacket(_))
    ));
}

#[test]
fn test_empty_payload_with_trailer() {
    let header = PacketHeader::new(PacketType::IfContext)
        .with_stream_id(0x4200_0000)
        .with_class_id(ClassId::radio(0x8003))
        .with_integer_timestamp(IntegerTimestamp::Utc, 1_700_000_000)
        .with_fractional_timestamp(FractionalTimestamp::SampleCount, 42);
    let packet = Packet::new(header, Vec::new()).with_trailer(0xDEAD_BEEF);

    let decoded = Packet::from_bytes(&packet.to_bytes().unwrap()).unwrap();
    assert!(decoded.payload.is_empty());
    assert_eq!(decoded.trailer, Some(0xDEAD_BEEF));
    assert_eq!(decoded.header.stream_kind(), Some(StreamKind::Panadapter));
}

#[test]
fn test_encode_rejects_stream_id_on_type_without_one() {
    let header = PacketHeader::new(PacketType::ExtData).with_stream_id(3);
    let packet = Packet::new(header, vec![0; 40]);
    assert!(matches!(
        packet.to_bytes(),
        Err(ProtocolError::InvalidPacket(_))
    ));
}

#[test]
fn test_sequence_wraps_at_sixteen() {
    for sequence in 0u8..40 {
        let header = PacketHeader::new(PacketType::IfDataWithStream)
            .with_stream_id(1)
            .with_sequence(sequence);
        let packet = Packet::new(header, vec![0; 32]);
        let decoded = Packet::from_bytes(&packet.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.header.sequence, sequence % 16);
    }
}

// ============================================================================
// DISCOVERY EDGE CASES
// ============================================================================

#[test]
fn test_discovery_through_packet_codec() {
    let record = DiscoveryRecord::parse(
        "discovery_protocol_version=3.0.0.2 model=FLEX-6400 serial=0621-1104-6401-1234 \
         version=3.8.19.32140 nickname=Shack callsign=N0CALL ip=10.0.0.12 port=4992 \
         status=Available available_clients=2 wan_connected=1",
    )
    .expect("complete record");

    let bytes = record.to_packet(0x0000_0800).to_bytes().unwrap();
    assert_eq!(bytes.len() % 4, 0);

    let packet = Packet::from_bytes(&bytes).unwrap();
    assert_eq!(packet.header.stream_kind(), Some(StreamKind::Discovery));
    let parsed = DiscoveryRecord::from_packet(&packet).unwrap();
    assert_eq!(parsed, record);
    assert_eq!(parsed.wan_connected, Some(true));
    assert_eq!(parsed.available_clients, Some(2));
}

#[test]
fn test_discovery_missing_required_keys() {
    assert!(DiscoveryRecord::parse("model=FLEX-6600 serial=1 ip=10.0.0.1").is_none());
    assert!(DiscoveryRecord::parse("model=FLEX-6600 serial=1 port=4992").is_none());
    assert!(DiscoveryRecord::parse("model= serial=1 ip=10.0.0.1 port=4992").is_none());
    assert!(DiscoveryRecord::parse("model=FLEX-6600 serial=1 ip=10.0.0.1 port=notaport").is_none());
    assert!(DiscoveryRecord::parse("").is_none());
}

#[test]
fn test_discovery_unknown_keys_skipped() {
    let record = DiscoveryRecord::parse(
        "model=FLEX-6600 serial=1 ip=10.0.0.1 port=4992 gui_client_handles=0x1,0x2 bogus",
    )
    .expect("unknown keys do not invalidate the record");
    assert_eq!(record.port, 4992);
    assert_eq!(record.model, "FLEX-6600");
}

#[test]
fn test_non_discovery_packet_rejected() {
    let packet = Packet::new(
        PacketHeader::new(PacketType::ExtDataWithStream)
            .with_stream_id(1)
            .with_class_id(ClassId::radio(0x8002)),
        b"model=FLEX-6600 serial=1 ip=10.0.0.1 port=4992".to_vec(),
    );
    assert!(matches!(
        DiscoveryRecord::from_packet(&packet),
        Err(ProtocolError::InvalidDiscovery(_))
    ));
}

// ============================================================================
// COMMAND LINE EDGE CASES
// ============================================================================

#[test]
fn test_inbound_line_classification_errors() {
    assert!(matches!(
        InboundMessage::parse(""),
        Err(ProtocolError::EmptyLine)
    ));
    assert!(matches!(
        InboundMessage::parse("X12|hello"),
        Err(ProtocolError::UnrecognizedMessage('X'))
    ));
    assert!(matches!(
        InboundMessage::parse("R17"),
        Err(ProtocolError::IncompleteReply(_))
    ));
    assert!(matches!(
        InboundMessage::parse("Rseven|0|"),
        Err(ProtocolError::IncompleteReply(_))
    ));
    assert!(matches!(
        InboundMessage::parse("R7|zz|"),
        Err(ProtocolError::IncompleteReply(_))
    ));
}

#[test]
fn test_reply_with_only_status() {
    let InboundMessage::Reply(reply) = InboundMessage::parse("R3|0").unwrap() else {
        panic!("expected reply");
    };
    assert_eq!(reply.sequence, 3);
    assert!(reply.is_success());
    assert!(reply.message.is_empty());
    assert_eq!(reply.debug, None);
}

#[test]
fn test_reply_message_keeps_extra_pipes_in_debug() {
    let InboundMessage::Reply(reply) =
        InboundMessage::parse("R9|50000016|bad|detail|with|pipes").unwrap()
    else {
        panic!("expected reply");
    };
    assert_eq!(reply.message, "bad");
    assert_eq!(reply.debug.as_deref(), Some("detail|with|pipes"));
}

#[tokio::test]
async fn test_line_framing_over_stream() {
    let input: &[u8] = b"V1.4.0.0\r\nH0000ABCD\nS0|radio slices=4\n\nR0|0|trailing";
    let mut lines = FramedRead::new(input, LineCodec::new());

    let mut received = Vec::new();
    while let Some(line) = lines.next().await {
        received.push(line.unwrap());
    }

    assert_eq!(
        received,
        vec!["V1.4.0.0", "H0000ABCD", "S0|radio slices=4", "", "R0|0|trailing"]
    );
    assert!(matches!(
        InboundMessage::parse(&received[1]).unwrap(),
        InboundMessage::Handle(handle) if handle.as_str() == "ABCD"
    ));
}

#[tokio::test]
async fn test_overlong_line_is_an_error() {
    let input = vec![b'S'; MAX_LINE_LENGTH + 10];
    let mut lines = FramedRead::new(&input[..], LineCodec::new());

    match lines.next().await {
        Some(Err(ProtocolError::LineTooLong(len))) => assert!(len > MAX_LINE_LENGTH),
        other => panic!("Expected LineTooLong, got {other:?}"),
    }
}
