//! Command-channel line formats.
//!
//! Outbound commands are written as `C[D]<seq>|<command>`. Inbound lines are
//! classified by their first byte into [`InboundMessage`] variants.

use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

/// A command as written to the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    pub sequence: u32,
    pub diagnostic: bool,
    pub text: String,
}

impl OutboundCommand {
    pub fn new(sequence: u32, text: impl Into<String>, diagnostic: bool) -> Self {
        Self {
            sequence,
            diagnostic,
            text: text.into(),
        }
    }

    /// Wire line without the terminating newline
    pub fn to_line(&self) -> String {
        let marker = if self.diagnostic { "D" } else { "" };
        format!("C{marker}{}|{}", self.sequence, self.text)
    }
}

/// Reply to a previously sent command: `R<seq>|<hex status>|<text>[|<debug>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub sequence: u32,
    /// Zero means success
    pub status: u32,
    pub message: String,
    pub debug: Option<String>,
    /// Text of the command this reply answers, filled in by the reply table
    pub command: String,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    fn parse(body: &str) -> Result<Self> {
        let fields: Vec<&str> = body.splitn(4, '|').collect();
        if fields.len() < 2 {
            return Err(ProtocolError::IncompleteReply(body.to_string()));
        }

        let sequence = fields[0]
            .parse::<u32>()
            .map_err(|_| ProtocolError::IncompleteReply(body.to_string()))?;
        let status = u32::from_str_radix(fields[1], 16)
            .map_err(|_| ProtocolError::IncompleteReply(body.to_string()))?;

        Ok(Self {
            sequence,
            status,
            message: fields.get(2).map(|s| s.to_string()).unwrap_or_default(),
            debug: fields.get(3).map(|s| s.to_string()),
            command: String::new(),
        })
    }
}

/// Connection handle assigned by the radio, leading zeros stripped
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientHandle(String);

impl ClientHandle {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProtocolError::Custom(format!("invalid client handle: {text}")));
        }

        let stripped = digits.trim_start_matches('0');
        let normalized = if stripped.is_empty() { "0" } else { stripped };
        Ok(Self(normalized.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> u32 {
        u32::from_str_radix(&self.0, 16).unwrap_or(0)
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dotted protocol version announced by a `V` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl FromStr for ProtocolVersion {
    type Err = ProtocolError;

    fn from_str(text: &str) -> Result<Self> {
        let mut parts = text.trim().split('.');
        let mut next = |name: &str| -> Result<u32> {
            match parts.next() {
                None => Ok(0),
                Some(part) => part.parse().map_err(|_| {
                    ProtocolError::Custom(format!("invalid {name} in version {text:?}"))
                }),
            }
        };

        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        let build = next("build")?;
        Ok(Self {
            major,
            minor,
            patch,
            build,
        })
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}

/// One classified inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// `C`: a command echoed back by the radio
    Command {
        sequence: Option<u32>,
        diagnostic: bool,
        text: String,
    },
    /// `H`: the handle assigned to this client
    Handle(ClientHandle),
    /// `M`: asynchronous notification
    Notification { code: Option<u32>, text: String },
    /// `R`: reply to a command
    Reply(Reply),
    /// `S`: status broadcast
    Status { handle: String, message: String },
    /// `V`: protocol version announcement
    Version(ProtocolVersion),
}

impl InboundMessage {
    /// Classify one line by its first byte
    pub fn parse(line: &str) -> Result<Self> {
        let mut chars = line.chars();
        let kind = chars.next().ok_or(ProtocolError::EmptyLine)?;
        let body = chars.as_str();

        match kind {
            'C' => {
                let (diagnostic, rest) = match body.strip_prefix('D') {
                    Some(rest) => (true, rest),
                    None => (false, body),
                };
                let (sequence, text) = match rest.split_once('|') {
                    Some((seq, text)) => (seq.parse().ok(), text.to_string()),
                    None => (None, rest.to_string()),
                };
                Ok(InboundMessage::Command {
                    sequence,
                    diagnostic,
                    text,
                })
            }
            'H' => ClientHandle::parse(body).map(InboundMessage::Handle),
            'M' => {
                let (code, text) = match body.split_once('|') {
                    Some((code, text)) => match u32::from_str_radix(code, 16) {
                        Ok(code) => (Some(code), text.to_string()),
                        Err(_) => (None, body.to_string()),
                    },
                    None => (None, body.to_string()),
                };
                Ok(InboundMessage::Notification { code, text })
            }
            'R' => Reply::parse(body).map(InboundMessage::Reply),
            'S' => {
                let (handle, message) = body.split_once('|').unwrap_or((body, ""));
                Ok(InboundMessage::Status {
                    handle: handle.to_string(),
                    message: message.to_string(),
                })
            }
            'V' => body.parse().map(InboundMessage::Version),
            other => Err(ProtocolError::UnrecognizedMessage(other)),
        }
    }
}
