//! Discovery payload parsing and formatting.
//!
//! A discovery broadcast is a stream packet whose packet class code is
//! [`DISCOVERY_CLASS_CODE`]. Its payload is ASCII text made of
//! space-separated `key=value` tokens. Unknown keys are logged and skipped.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::packet::{ClassId, Packet, PacketHeader, PacketType, DISCOVERY_CLASS_CODE};
use crate::error::{ProtocolError, Result};

/// Identity and connectivity parameters advertised by one radio
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub ip: String,
    pub port: u16,
    pub model: String,
    pub serial: String,
    /// Firmware version
    pub version: Option<String>,
    pub nickname: Option<String>,
    pub callsign: Option<String>,
    pub status: Option<String>,
    pub inuse_ip: Option<String>,
    pub inuse_host: Option<String>,
    pub discovery_protocol_version: Option<String>,
    pub max_licensed_version: Option<String>,
    pub radio_license_id: Option<String>,
    pub fpc_mac: Option<String>,
    pub wan_connected: Option<bool>,
    pub licensed_clients: Option<u32>,
    pub available_clients: Option<u32>,
    pub max_panadapters: Option<u32>,
    pub available_panadapters: Option<u32>,
    pub max_slices: Option<u32>,
    pub available_slices: Option<u32>,
    pub min_software_version: Option<String>,
}

impl DiscoveryRecord {
    /// Parse a discovery payload. Returns `None` unless `ip`, `port`,
    /// `model` and `serial` are all present and non-empty.
    pub fn parse(payload: &str) -> Option<Self> {
        let mut record = Self::default();
        let mut port = None;

        for token in payload.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                debug!(token, "Skipping discovery token without value");
                continue;
            };

            match key {
                "ip" => record.ip = value.to_string(),
                "port" => port = value.parse::<u16>().ok(),
                "model" => record.model = value.to_string(),
                "serial" => record.serial = value.to_string(),
                "version" => record.version = Some(value.to_string()),
                "nickname" => record.nickname = Some(value.to_string()),
                "callsign" => record.callsign = Some(value.to_string()),
                "status" => record.status = Some(value.to_string()),
                "inuse_ip" => record.inuse_ip = Some(value.to_string()),
                "inuse_host" => record.inuse_host = Some(value.to_string()),
                "discovery_protocol_version" => {
                    record.discovery_protocol_version = Some(value.to_string())
                }
                "max_licensed_version" => record.max_licensed_version = Some(value.to_string()),
                "radio_license_id" => record.radio_license_id = Some(value.to_string()),
                "fpc_mac" => record.fpc_mac = Some(value.to_string()),
                "wan_connected" => record.wan_connected = parse_flag(value),
                "licensed_clients" => record.licensed_clients = value.parse().ok(),
                "available_clients" => record.available_clients = value.parse().ok(),
                "max_panadapters" => record.max_panadapters = value.parse().ok(),
                "available_panadapters" => record.available_panadapters = value.parse().ok(),
                "max_slices" => record.max_slices = value.parse().ok(),
                "available_slices" => record.available_slices = value.parse().ok(),
                "min_software_version" => record.min_software_version = Some(value.to_string()),
                unknown => warn!(key = unknown, value, "Unknown discovery key"),
            }
        }

        record.port = port?;
        if record.ip.is_empty() || record.model.is_empty() || record.serial.is_empty() {
            return None;
        }
        Some(record)
    }

    /// Parse the payload of a discovery packet
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let class_code = packet.header.class_id.map(|class_id| class_id.packet_class);
        if class_code != Some(DISCOVERY_CLASS_CODE) {
            return Err(ProtocolError::InvalidDiscovery(format!(
                "packet class {class_code:?} is not discovery"
            )));
        }

        let text = String::from_utf8_lossy(&packet.payload);
        // Payloads are padded to a word boundary with NULs
        Self::parse(text.trim_end_matches('\0')).ok_or_else(|| {
            ProtocolError::InvalidDiscovery("missing ip, port, model or serial".into())
        })
    }

    /// Canonical `key=value` payload for this record
    pub fn format(&self) -> String {
        let mut tokens = vec![
            format!("ip={}", self.ip),
            format!("port={}", self.port),
            format!("model={}", self.model),
            format!("serial={}", self.serial),
        ];

        let text_fields = [
            ("version", &self.version),
            ("nickname", &self.nickname),
            ("callsign", &self.callsign),
            ("status", &self.status),
            ("inuse_ip", &self.inuse_ip),
            ("inuse_host", &self.inuse_host),
            ("discovery_protocol_version", &self.discovery_protocol_version),
            ("max_licensed_version", &self.max_licensed_version),
            ("radio_license_id", &self.radio_license_id),
            ("fpc_mac", &self.fpc_mac),
            ("min_software_version", &self.min_software_version),
        ];
        for (key, value) in text_fields {
            if let Some(value) = value {
                tokens.push(format!("{key}={value}"));
            }
        }

        if let Some(wan) = self.wan_connected {
            tokens.push(format!("wan_connected={}", u8::from(wan)));
        }

        let counts = [
            ("licensed_clients", self.licensed_clients),
            ("available_clients", self.available_clients),
            ("max_panadapters", self.max_panadapters),
            ("available_panadapters", self.available_panadapters),
            ("max_slices", self.max_slices),
            ("available_slices", self.available_slices),
        ];
        for (key, value) in counts {
            if let Some(value) = value {
                tokens.push(format!("{key}={value}"));
            }
        }

        tokens.join(" ")
    }

    /// Wrap the formatted payload in a discovery packet
    pub fn to_packet(&self, stream_id: u32) -> Packet {
        let mut payload = self.format().into_bytes();
        let padded = payload.len().div_ceil(4) * 4;
        payload.resize(padded, 0);

        let header = PacketHeader::new(PacketType::ExtDataWithStream)
            .with_stream_id(stream_id)
            .with_class_id(ClassId::radio(DISCOVERY_CLASS_CODE));
        Packet::new(header, payload)
    }

    /// Advertised address, if it parses
    pub fn address(&self) -> Option<IpAddr> {
        self.ip.parse().ok()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "True" => Some(true),
        "0" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = "ip=10.0.0.5 port=4992 model=FLEX-6700 serial=1234-5678-9012-3456";

    #[test]
    fn parses_required_fields() {
        let record = DiscoveryRecord::parse(SAMPLE).expect("valid record");
        assert_eq!(record.ip, "10.0.0.5");
        assert_eq!(record.port, 4992);
        assert_eq!(record.model, "FLEX-6700");
        assert_eq!(record.serial, "1234-5678-9012-3456");
        assert_eq!(record.address(), Some("10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn missing_port_is_not_a_record() {
        let payload = "ip=10.0.0.5 model=FLEX-6700 serial=1234-5678-9012-3456";
        assert!(DiscoveryRecord::parse(payload).is_none());
    }

    #[test]
    fn empty_required_value_is_not_a_record() {
        let payload = "ip=10.0.0.5 port=4992 model= serial=1234";
        assert!(DiscoveryRecord::parse(payload).is_none());
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let payload = format!("{SAMPLE} shiny_new_key=42 version=3.8.19.32140 wan_connected=1");
        let record = DiscoveryRecord::parse(&payload).expect("record still built");
        assert_eq!(record.version.as_deref(), Some("3.8.19.32140"));
        assert_eq!(record.wan_connected, Some(true));
    }

    #[test]
    fn packet_bridge() {
        let mut record = DiscoveryRecord::parse(SAMPLE).unwrap();
        record.nickname = Some("shack".into());
        record.available_slices = Some(4);

        let packet = record.to_packet(0x0800);
        let bytes = packet.to_bytes().unwrap();
        let decoded = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(DiscoveryRecord::from_packet(&decoded).unwrap(), record);
    }

    #[test]
    fn non_discovery_packet_is_rejected() {
        let header = PacketHeader::new(PacketType::ExtDataWithStream)
            .with_stream_id(1)
            .with_class_id(ClassId::radio(0x8002));
        let packet = Packet::new(header, SAMPLE.as_bytes().to_vec());
        assert!(matches!(
            DiscoveryRecord::from_packet(&packet),
            Err(ProtocolError::InvalidDiscovery(_))
        ));
    }
}
