//! Session handshake helpers.
//!
//! The handshake differs between topologies:
//!
//! - **LAN**: TCP connect, UDP bind, wait for the radio to report the client
//!   attached, then `client udpport <port>`.
//! - **WAN**: TLS-upgraded TCP connect, `wan validate handle=<handle>`, UDP
//!   bind, UDP registration datagram bound to the client handle.
//!
//! Radios with firmware major version 2 or later also answer `client ip` with
//! the client's address as seen by the radio.

use std::net::{IpAddr, Ipv4Addr};

use tracing::{debug, instrument, warn};

use crate::protocol::message::{ClientHandle, Reply};

/// Command asking the radio for the client's address as it sees it
pub const CLIENT_IP_COMMAND: &str = "client ip";

/// First firmware major version that answers `client ip`
pub const CLIENT_IP_MIN_MAJOR: u32 = 2;

/// `wan validate handle=<handle>`, forwarding the relay-issued session handle
pub fn wan_validate_command(wan_handle: &str) -> String {
    format!("wan validate handle={wan_handle}")
}

/// `client udpport <port>`, advertising the LAN stream port
pub fn udp_port_command(port: u16) -> String {
    format!("client udpport {port}")
}

/// UDP registration datagram binding this client's stream to its handle
pub fn udp_register_payload(handle: &ClientHandle) -> String {
    format!("client udp_register handle=0x{handle}")
}

/// Result of comparing the supported firmware against the advertised one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareCheck {
    pub supported: String,
    pub advertised: String,
    /// Advertised major version, 0 when it does not parse
    pub major: u32,
    /// Advertised minor version, 0 when it does not parse
    pub minor: u32,
    /// Whether the major.minor.patch triplets differ
    pub mismatch: bool,
}

impl FirmwareCheck {
    /// Compare the first three dotted components of both versions.
    ///
    /// A mismatch is reported as a warning; the connection always proceeds.
    #[instrument(level = "debug")]
    pub fn compare(supported: &str, advertised: &str) -> Self {
        let supported_triplet = triplet(supported);
        let advertised_triplet = triplet(advertised);
        let mismatch = supported_triplet != advertised_triplet;

        let mut parts = advertised.trim().split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

        if mismatch {
            warn!(
                supported,
                advertised, "Radio firmware differs from the supported version"
            );
        } else {
            debug!(advertised, "Radio firmware matches supported version");
        }

        Self {
            supported: supported.to_string(),
            advertised: advertised.to_string(),
            major,
            minor,
            mismatch,
        }
    }

    /// Whether the radio answers `client ip`
    pub fn supports_client_ip(&self) -> bool {
        self.major >= CLIENT_IP_MIN_MAJOR
    }
}

fn triplet(version: &str) -> [&str; 3] {
    let mut parts = version.trim().split('.');
    [
        parts.next().unwrap_or(""),
        parts.next().unwrap_or(""),
        parts.next().unwrap_or(""),
    ]
}

/// Pick the client address from a `client ip` reply.
///
/// Only a successful reply carrying a well-formed dotted quad is used;
/// anything else (including no reply) falls back to `local`.
pub fn resolve_client_ip(reply: Option<&Reply>, local: IpAddr) -> IpAddr {
    let parsed = reply
        .filter(|reply| reply.is_success())
        .and_then(|reply| reply.message.trim().parse::<Ipv4Addr>().ok());

    match parsed {
        Some(ip) => IpAddr::V4(ip),
        None => {
            debug!(%local, "Using local interface address as client address");
            local
        }
    }
}
