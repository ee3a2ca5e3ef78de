use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::Reply;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Callback invoked exactly once with the reply to its command.
pub type ReplyHandler = Box<dyn FnOnce(Reply) + Send + Sync + 'static>;

/// A command waiting for its reply
struct PendingCommand {
    command: String,
    handler: Option<ReplyHandler>,
}

/// Reply correlation table: sequence number to pending command.
///
/// Entries are inserted before the command's bytes are written, removed when
/// the matching `R` line arrives, and abandoned wholesale on disconnect.
#[derive(Clone)]
pub struct ReplyTable {
    pending: Arc<RwLock<HashMap<u32, PendingCommand>>>,
}

impl Default for ReplyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyTable {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn insert(&self, sequence: u32, command: &str, handler: Option<ReplyHandler>) -> Result<()> {
        let mut pending = self.pending.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_REPLY_TABLE_WRITE_LOCK.to_string())
        })?;

        if pending.contains_key(&sequence) {
            return Err(ProtocolError::DuplicateSequence(sequence));
        }
        pending.insert(
            sequence,
            PendingCommand {
                command: command.to_string(),
                handler,
            },
        );
        Ok(())
    }

    /// Retire the entry matching `reply` and run its handler.
    ///
    /// Returns false when no command with that sequence is pending.
    pub fn complete(&self, mut reply: Reply) -> Result<bool> {
        let entry = {
            let mut pending = self.pending.write().map_err(|_| {
                ProtocolError::Custom(constants::ERR_REPLY_TABLE_WRITE_LOCK.to_string())
            })?;
            pending.remove(&reply.sequence)
        };

        let Some(entry) = entry else {
            debug!(sequence = reply.sequence, "Reply for unknown sequence");
            return Ok(false);
        };

        reply.command = entry.command;
        if !reply.is_success() {
            warn!(
                sequence = reply.sequence,
                status = format_args!("{:08X}", reply.status),
                command = %reply.command,
                message = %reply.message,
                "Command failed"
            );
        }
        if let Some(handler) = entry.handler {
            handler(reply);
        }
        Ok(true)
    }

    /// Remove `sequence` without running its handler
    pub fn cancel(&self, sequence: u32) -> Result<bool> {
        let mut pending = self.pending.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_REPLY_TABLE_WRITE_LOCK.to_string())
        })?;
        Ok(pending.remove(&sequence).is_some())
    }

    /// Abandon every pending entry; handlers are dropped, not invoked
    pub fn flush(&self) -> Result<usize> {
        let mut pending = self.pending.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_REPLY_TABLE_WRITE_LOCK.to_string())
        })?;
        let abandoned = pending.len();
        pending.clear();
        Ok(abandoned)
    }

    pub fn contains(&self, sequence: u32) -> Result<bool> {
        let pending = self.pending.read().map_err(|_| {
            ProtocolError::Custom(constants::ERR_REPLY_TABLE_READ_LOCK.to_string())
        })?;
        Ok(pending.contains_key(&sequence))
    }

    pub fn len(&self) -> Result<usize> {
        let pending = self.pending.read().map_err(|_| {
            ProtocolError::Custom(constants::ERR_REPLY_TABLE_READ_LOCK.to_string())
        })?;
        Ok(pending.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
