//! Newline framing for the command channel.
//!
//! Inbound bytes are split on `\n`; a trailing `\r` is dropped and invalid
//! UTF-8 is replaced rather than rejected. Outbound lines get exactly one
//! terminating `\n`.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// Longest inbound line accepted before the stream is considered corrupt
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Default)]
pub struct LineCodec {
    /// Bytes already scanned for a newline
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

        match newline {
            Some(offset) => {
                let end = self.next_index + offset;
                self.next_index = 0;

                let line = src.split_to(end + 1);
                let mut text = &line[..end];
                if let Some(stripped) = text.strip_suffix(b"\r") {
                    text = stripped;
                }
                Ok(Some(String::from_utf8_lossy(text).into_owned()))
            }
            None if src.len() > MAX_LINE_LENGTH => {
                let len = src.len();
                src.advance(len);
                self.next_index = 0;
                Err(ProtocolError::LineTooLong(len))
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => {
                // Peer closed mid-line; deliver what arrived
                let rest = src.split();
                self.next_index = 0;
                Ok(Some(String::from_utf8_lossy(&rest).trim_end().to_string()))
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<()> {
        let body = line.trim_end_matches(['\r', '\n']);
        dst.reserve(body.len() + 1);
        dst.put_slice(body.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
