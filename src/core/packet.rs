//! # Stream Packet Format
//!
//! Stateless encode/decode of one VITA-49 derived frame as carried on the
//! UDP stream channel (meters, audio, IQ, display data, discovery).
//!
//! ## Wire Format
//! ```text
//! word 0      [type:4][C:1][T:1][rsv:2] [TSI:2][TSF:2][seq:4] [length in words:16]
//! stream id   present for types 1, 3, 4, 5
//! class id    2 words when C is set: [0:8][OUI:24] [information class:16][packet class:16]
//! int ts      1 word when TSI != none
//! frac ts     2 words when TSF != none
//! payload     any number of bytes
//! trailer     final 4 bytes when T is set
//! ```
//!
//! All multi-byte fields are big-endian. A frame is never shorter than 28 bytes.
//!
//! ## Length policy
//! The declared word count must equal the received byte count rounded up to
//! whole words. Anything else is rejected as [`ProtocolError::LengthMismatch`];
//! the declared length is never used to navigate past the received bytes.

use bytes::BufMut;

use crate::error::{ProtocolError, Result};

/// Smallest frame accepted by [`Packet::from_bytes`]
pub const MIN_PACKET_SIZE: usize = 28;

/// Organizationally unique identifier used by the radio's own streams
pub const RADIO_OUI: u32 = 0x001C_2D;

/// Information class code used by the radio's own streams
pub const RADIO_INFORMATION_CLASS: u16 = 0x534C;

/// Packet class code of discovery broadcasts
pub const DISCOVERY_CLASS_CODE: u16 = 0xFFFF;

const OUI_MASK: u32 = 0x00FF_FFFF;
const TRAILER_SIZE: usize = 4;

/// Packet type carried in the high nibble of the first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    IfData = 0,
    IfDataWithStream = 1,
    ExtData = 2,
    ExtDataWithStream = 3,
    IfContext = 4,
    ExtContext = 5,
}

impl PacketType {
    /// Whether frames of this type carry a stream identifier word
    pub fn has_stream_id(self) -> bool {
        !matches!(self, PacketType::IfData | PacketType::ExtData)
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(nibble: u8) -> Result<Self> {
        match nibble {
            0 => Ok(PacketType::IfData),
            1 => Ok(PacketType::IfDataWithStream),
            2 => Ok(PacketType::ExtData),
            3 => Ok(PacketType::ExtDataWithStream),
            4 => Ok(PacketType::IfContext),
            5 => Ok(PacketType::ExtContext),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// Integer timestamp kind (TSI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum IntegerTimestamp {
    #[default]
    None = 0,
    Utc = 1,
    Gps = 2,
    Other = 3,
}

impl TryFrom<u8> for IntegerTimestamp {
    type Error = ProtocolError;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(IntegerTimestamp::None),
            1 => Ok(IntegerTimestamp::Utc),
            2 => Ok(IntegerTimestamp::Gps),
            3 => Ok(IntegerTimestamp::Other),
            other => Err(ProtocolError::UnknownTimestampKind(other)),
        }
    }
}

/// Fractional timestamp kind (TSF)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FractionalTimestamp {
    #[default]
    None = 0,
    SampleCount = 1,
    RealTime = 2,
    FreeRunning = 3,
}

impl TryFrom<u8> for FractionalTimestamp {
    type Error = ProtocolError;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(FractionalTimestamp::None),
            1 => Ok(FractionalTimestamp::SampleCount),
            2 => Ok(FractionalTimestamp::RealTime),
            3 => Ok(FractionalTimestamp::FreeRunning),
            other => Err(ProtocolError::UnknownTimestampKind(other)),
        }
    }
}

/// Class identifier: OUI plus information and packet class codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId {
    /// 24-bit organizationally unique identifier
    pub oui: u32,
    pub information_class: u16,
    pub packet_class: u16,
}

impl ClassId {
    pub fn new(oui: u32, information_class: u16, packet_class: u16) -> Self {
        Self {
            oui: oui & OUI_MASK,
            information_class,
            packet_class,
        }
    }

    /// Class id used by the radio for the given packet class code
    pub fn radio(packet_class: u16) -> Self {
        Self::new(RADIO_OUI, RADIO_INFORMATION_CLASS, packet_class)
    }
}

/// What a stream packet carries, derived from its packet class code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Meter,
    Panadapter,
    Waterfall,
    OpusAudio,
    DaxIq24,
    DaxIq48,
    DaxIq96,
    DaxIq192,
    DaxAudio,
    DaxReducedBandwidth,
    Discovery,
    Other(u16),
}

impl StreamKind {
    pub fn from_class_code(code: u16) -> Self {
        match code {
            0x8002 => StreamKind::Meter,
            0x8003 => StreamKind::Panadapter,
            0x8004 => StreamKind::Waterfall,
            0x8005 => StreamKind::OpusAudio,
            0x02E3 => StreamKind::DaxIq24,
            0x02E4 => StreamKind::DaxIq48,
            0x02E5 => StreamKind::DaxIq96,
            0x02E6 => StreamKind::DaxIq192,
            0x03E3 => StreamKind::DaxAudio,
            0x0123 => StreamKind::DaxReducedBandwidth,
            DISCOVERY_CLASS_CODE => StreamKind::Discovery,
            other => StreamKind::Other(other),
        }
    }
}

/// Decoded or to-be-encoded frame header
///
/// Optional words are present exactly when their value is `Some`. The
/// timestamp kinds and their values must agree: a kind other than `None`
/// requires a value and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub integer_timestamp_kind: IntegerTimestamp,
    pub fractional_timestamp_kind: FractionalTimestamp,
    /// Mod-16 packet sequence
    pub sequence: u8,
    /// Total frame length in 32-bit words, as declared on the wire
    pub length_words: u16,
    pub stream_id: Option<u32>,
    pub class_id: Option<ClassId>,
    pub integer_timestamp: Option<u32>,
    pub fractional_timestamp: Option<u64>,
}

impl PacketHeader {
    /// Header with no optional words for the given packet type
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            integer_timestamp_kind: IntegerTimestamp::None,
            fractional_timestamp_kind: FractionalTimestamp::None,
            sequence: 0,
            length_words: 0,
            stream_id: None,
            class_id: None,
            integer_timestamp: None,
            fractional_timestamp: None,
        }
    }

    pub fn with_stream_id(mut self, stream_id: u32) -> Self {
        self.stream_id = Some(stream_id);
        self
    }

    pub fn with_class_id(mut self, class_id: ClassId) -> Self {
        self.class_id = Some(class_id);
        self
    }

    pub fn with_integer_timestamp(mut self, kind: IntegerTimestamp, seconds: u32) -> Self {
        self.integer_timestamp_kind = kind;
        self.integer_timestamp = (kind != IntegerTimestamp::None).then_some(seconds);
        self
    }

    pub fn with_fractional_timestamp(mut self, kind: FractionalTimestamp, value: u64) -> Self {
        self.fractional_timestamp_kind = kind;
        self.fractional_timestamp = (kind != FractionalTimestamp::None).then_some(value);
        self
    }

    pub fn with_sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence & 0x0F;
        self
    }

    pub fn has_class_id(&self) -> bool {
        self.class_id.is_some()
    }

    /// Header size in bytes: one word plus every optional word present
    pub fn header_size(&self) -> usize {
        let mut words = 1;
        if self.stream_id.is_some() {
            words += 1;
        }
        if self.class_id.is_some() {
            words += 2;
        }
        if self.integer_timestamp.is_some() {
            words += 1;
        }
        if self.fractional_timestamp.is_some() {
            words += 2;
        }
        words * 4
    }

    /// Classification of the packet class code, if a class id is present
    pub fn stream_kind(&self) -> Option<StreamKind> {
        self.class_id
            .map(|class_id| StreamKind::from_class_code(class_id.packet_class))
    }

    fn validate(&self) -> Result<()> {
        if self.packet_type.has_stream_id() != self.stream_id.is_some() {
            return Err(ProtocolError::InvalidPacket(format!(
                "stream id presence does not match packet type {:?}",
                self.packet_type
            )));
        }
        if (self.integer_timestamp_kind != IntegerTimestamp::None)
            != self.integer_timestamp.is_some()
        {
            return Err(ProtocolError::InvalidPacket(
                "integer timestamp kind and value disagree".into(),
            ));
        }
        if (self.fractional_timestamp_kind != FractionalTimestamp::None)
            != self.fractional_timestamp.is_some()
        {
            return Err(ProtocolError::InvalidPacket(
                "fractional timestamp kind and value disagree".into(),
            ));
        }
        Ok(())
    }
}

/// One stream frame: header, opaque payload and optional trailer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
    pub trailer: Option<u32>,
}

impl Packet {
    /// Build a packet; the header's declared length is computed from the frame
    pub fn new(header: PacketHeader, payload: Vec<u8>) -> Self {
        let mut packet = Self {
            header,
            payload,
            trailer: None,
        };
        packet.header.length_words = packet.computed_length_words();
        packet
    }

    pub fn with_trailer(mut self, trailer: u32) -> Self {
        self.trailer = Some(trailer);
        self.header.length_words = self.computed_length_words();
        self
    }

    /// Frame size in bytes once encoded
    pub fn encoded_len(&self) -> usize {
        let trailer = if self.trailer.is_some() { TRAILER_SIZE } else { 0 };
        self.header.header_size() + self.payload.len() + trailer
    }

    fn computed_length_words(&self) -> u16 {
        u16::try_from(self.encoded_len().div_ceil(4)).unwrap_or(u16::MAX)
    }

    /// Encode the frame into its wire representation
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.header.validate()?;

        let total = self.encoded_len();
        if total < MIN_PACKET_SIZE {
            return Err(ProtocolError::PacketTooShort(total));
        }
        let words = u16::try_from(total.div_ceil(4))
            .map_err(|_| ProtocolError::InvalidPacket(format!("frame of {total} bytes too large")))?;

        let header = &self.header;
        let mut out = Vec::with_capacity(total);

        let mut first = (header.packet_type as u8) << 4;
        if header.class_id.is_some() {
            first |= 0x08;
        }
        if self.trailer.is_some() {
            first |= 0x04;
        }
        out.put_u8(first);
        out.put_u8(
            ((header.integer_timestamp_kind as u8) << 6)
                | ((header.fractional_timestamp_kind as u8) << 4)
                | (header.sequence & 0x0F),
        );
        out.put_u16(words);

        if let Some(stream_id) = header.stream_id {
            out.put_u32(stream_id);
        }
        if let Some(class_id) = header.class_id {
            out.put_u32(class_id.oui & OUI_MASK);
            out.put_u16(class_id.information_class);
            out.put_u16(class_id.packet_class);
        }
        if let Some(seconds) = header.integer_timestamp {
            out.put_u32(seconds);
        }
        if let Some(fraction) = header.fractional_timestamp {
            out.put_u64(fraction);
        }

        out.put_slice(&self.payload);
        if let Some(trailer) = self.trailer {
            out.put_u32(trailer);
        }

        Ok(out)
    }

    /// Decode one frame from a received datagram
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_PACKET_SIZE {
            return Err(ProtocolError::PacketTooShort(data.len()));
        }

        let packet_type = PacketType::try_from(data[0] >> 4)?;
        let has_class_id = data[0] & 0x08 != 0;
        let has_trailer = data[0] & 0x04 != 0;
        let integer_timestamp_kind = IntegerTimestamp::try_from((data[1] >> 6) & 0x03)?;
        let fractional_timestamp_kind = FractionalTimestamp::try_from((data[1] >> 4) & 0x03)?;
        let sequence = data[1] & 0x0F;
        let length_words = u16::from_be_bytes([data[2], data[3]]);

        if usize::from(length_words) != data.len().div_ceil(4) {
            return Err(ProtocolError::LengthMismatch {
                declared: length_words,
                actual: data.len(),
            });
        }

        let mut cursor = WordCursor::new(data);

        let stream_id = if packet_type.has_stream_id() {
            Some(cursor.next_u32()?)
        } else {
            None
        };
        let class_id = if has_class_id {
            let oui = cursor.next_u32()? & OUI_MASK;
            let codes = cursor.next_u32()?;
            Some(ClassId {
                oui,
                information_class: (codes >> 16) as u16,
                packet_class: (codes & 0xFFFF) as u16,
            })
        } else {
            None
        };
        let integer_timestamp = if integer_timestamp_kind != IntegerTimestamp::None {
            Some(cursor.next_u32()?)
        } else {
            None
        };
        let fractional_timestamp = if fractional_timestamp_kind != FractionalTimestamp::None {
            let high = u64::from(cursor.next_u32()?);
            let low = u64::from(cursor.next_u32()?);
            Some((high << 32) | low)
        } else {
            None
        };

        let header_size = cursor.offset;
        let trailer_size = if has_trailer { TRAILER_SIZE } else { 0 };
        if header_size + trailer_size > data.len() {
            return Err(ProtocolError::InvalidPacket(format!(
                "header ({header_size}) and trailer ({trailer_size}) exceed frame of {} bytes",
                data.len()
            )));
        }

        let payload_end = data.len() - trailer_size;
        let trailer = if has_trailer {
            let end = data.len();
            Some(u32::from_be_bytes([
                data[end - 4],
                data[end - 3],
                data[end - 2],
                data[end - 1],
            ]))
        } else {
            None
        };

        Ok(Self {
            header: PacketHeader {
                packet_type,
                integer_timestamp_kind,
                fractional_timestamp_kind,
                sequence,
                length_words,
                stream_id,
                class_id,
                integer_timestamp,
                fractional_timestamp,
            },
            payload: data[header_size..payload_end].to_vec(),
            trailer,
        })
    }
}

/// Sequential reader over the optional header words
struct WordCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> WordCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 4 }
    }

    fn next_u32(&mut self) -> Result<u32> {
        let bytes = self
            .data
            .get(self.offset..self.offset + 4)
            .ok_or_else(|| ProtocolError::InvalidPacket("header runs past end of frame".into()))?;
        self.offset += 4;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn meter_packet(payload: Vec<u8>) -> Packet {
        let header = PacketHeader::new(PacketType::ExtDataWithStream)
            .with_stream_id(0x0000_0700)
            .with_class_id(ClassId::radio(0x8002))
            .with_integer_timestamp(IntegerTimestamp::Utc, 1_700_000_000)
            .with_fractional_timestamp(FractionalTimestamp::RealTime, 0x0000_0001_0000_0002)
            .with_sequence(9);
        Packet::new(header, payload)
    }

    #[test]
    fn full_header_layout() {
        let packet = meter_packet(vec![0xAA, 0xBB, 0xCC, 0xDD]);
        let bytes = packet.to_bytes().expect("encode");

        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[0], 0x38); // type 3, class id, no trailer
        assert_eq!(bytes[1], 0x69); // TSI utc, TSF real time, seq 9
        assert_eq!(&bytes[2..4], &8u16.to_be_bytes());
        assert_eq!(&bytes[4..8], &0x0000_0700u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x1C, 0x2D]);
        assert_eq!(&bytes[12..16], &[0x53, 0x4C, 0x80, 0x02]);
        assert_eq!(&bytes[16..20], &1_700_000_000u32.to_be_bytes());
        assert_eq!(&bytes[20..28], &0x0000_0001_0000_0002u64.to_be_bytes());
        assert_eq!(&bytes[28..], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn streamed_data_roundtrip_preserves_every_field() {
        let packet = meter_packet((0u8..=200).collect());
        let decoded = Packet::from_bytes(&packet.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.header.stream_kind(), Some(StreamKind::Meter));
    }

    #[test]
    fn trailer_is_final_word_with_unaligned_payload() {
        let packet = meter_packet(vec![1, 2, 3, 4, 5]).with_trailer(0xDEAD_BEEF);
        let bytes = packet.to_bytes().unwrap();
        assert_eq!(bytes.len(), 28 + 5 + 4);
        assert_eq!(&bytes[bytes.len() - 4..], &0xDEAD_BEEFu32.to_be_bytes());
        assert_eq!(bytes[0] & 0x04, 0x04);

        let decoded = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.payload, vec![1, 2, 3, 4, 5]);
        assert_eq!(decoded.trailer, Some(0xDEAD_BEEF));
    }

    #[test]
    fn rejects_short_buffers() {
        for len in 0..MIN_PACKET_SIZE {
            assert!(matches!(
                Packet::from_bytes(&vec![0u8; len]),
                Err(ProtocolError::PacketTooShort(l)) if l == len
            ));
        }
    }

    #[test]
    fn rejects_unknown_packet_type() {
        let mut bytes = meter_packet(vec![0; 8]).to_bytes().unwrap();
        for nibble in 6u8..=15 {
            bytes[0] = (nibble << 4) | (bytes[0] & 0x0F);
            assert!(matches!(
                Packet::from_bytes(&bytes),
                Err(ProtocolError::UnknownPacketType(n)) if n == nibble
            ));
        }
    }

    #[test]
    fn rejects_declared_length_mismatch() {
        let mut bytes = meter_packet(vec![0; 8]).to_bytes().unwrap();
        bytes[3] += 1;
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(ProtocolError::LengthMismatch { .. })
        ));

        let mut truncated = meter_packet(vec![0; 16]).to_bytes().unwrap();
        truncated.truncate(truncated.len() - 8);
        assert!(matches!(
            Packet::from_bytes(&truncated),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn oui_is_masked_to_24_bits() {
        let class_id = ClassId::new(0xFF00_1C2D, 0x534C, 0x03E3);
        assert_eq!(class_id.oui, RADIO_OUI);

        let mut bytes = meter_packet(vec![0; 4]).to_bytes().unwrap();
        bytes[8] = 0xFF;
        let decoded = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.header.class_id.unwrap().oui, RADIO_OUI);
    }

    #[test]
    fn data_without_stream_id_has_smaller_header() {
        let header = PacketHeader::new(PacketType::ExtData).with_class_id(ClassId::radio(0x8005));
        let packet = Packet::new(header, vec![7; 20]);
        assert_eq!(packet.header.header_size(), 12);

        let decoded = Packet::from_bytes(&packet.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.header.stream_id, None);
        assert_eq!(decoded.payload, vec![7; 20]);
        assert_eq!(decoded.header.stream_kind(), Some(StreamKind::OpusAudio));
    }

    #[test]
    fn encode_rejects_inconsistent_headers() {
        let missing_stream = Packet::new(PacketHeader::new(PacketType::IfContext), vec![0; 32]);
        assert!(matches!(
            missing_stream.to_bytes(),
            Err(ProtocolError::InvalidPacket(_))
        ));

        let mut header = PacketHeader::new(PacketType::ExtData);
        header.integer_timestamp_kind = IntegerTimestamp::Gps;
        let missing_timestamp = Packet::new(header, vec![0; 32]);
        assert!(matches!(
            missing_timestamp.to_bytes(),
            Err(ProtocolError::InvalidPacket(_))
        ));
    }

    #[test]
    fn encode_rejects_frames_under_minimum() {
        let packet = Packet::new(PacketHeader::new(PacketType::ExtData), vec![0; 4]);
        assert!(matches!(
            packet.to_bytes(),
            Err(ProtocolError::PacketTooShort(8))
        ));
    }

    #[test]
    fn sequence_wraps_mod_16() {
        let header = PacketHeader::new(PacketType::IfDataWithStream)
            .with_stream_id(1)
            .with_sequence(0x1F);
        assert_eq!(header.sequence, 0x0F);
    }

    #[test]
    fn class_codes_classify() {
        assert_eq!(StreamKind::from_class_code(0xFFFF), StreamKind::Discovery);
        assert_eq!(StreamKind::from_class_code(0x02E5), StreamKind::DaxIq96);
        assert_eq!(StreamKind::from_class_code(0x1234), StreamKind::Other(0x1234));
    }
}
