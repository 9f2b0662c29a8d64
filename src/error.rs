// Error types for the register transport and the socket layer on top of it.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single request/response exchange across the register blocks.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The responder did not raise its valid flag within the configured bound.
    #[error("no response after {waited:?} ({polls} polls)")]
    TimedOut { waited: Duration, polls: u64 },

    /// The cancellation token fired while polling.
    #[error("transport call cancelled after {polls} polls")]
    Cancelled { polls: u64 },

    /// A previous request is still posted and the responder has not answered it.
    #[error("previous request still outstanding")]
    Busy,

    /// Inline data does not fit the register block's data area.
    #[error("inline payload too large ({len} > {capacity})")]
    PayloadTooLarge { len: usize, capacity: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Refusals from the payload arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// The request is larger than the whole arena.
    #[error("allocation of {size} bytes exceeds arena capacity {capacity}")]
    TooLarge { size: usize, capacity: usize },

    /// Live leases occupy the region the cursor would hand out next.
    #[error("arena exhausted: {size} bytes requested, {outstanding} bytes still leased")]
    Exhausted { size: usize, outstanding: usize },
}

/// Which part of an outgoing message a short write hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStage {
    Header,
    Args,
}

impl std::fmt::Display for SendStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendStage::Header => f.write_str("header"),
            SendStage::Args => f.write_str("args"),
        }
    }
}

/// Failures surfaced by the socket entry points.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("session is not open")]
    NotOpen,

    /// The responder refused to open the channel.
    #[error("open rejected by responder (code {code})")]
    OpenRejected { code: i64 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// The remote accepted a different byte count than was offered.
    #[error("short write on {stage}: expected {expected} bytes, remote reported {actual}")]
    ShortWrite {
        stage: SendStage,
        expected: usize,
        actual: i64,
    },

    /// A payload chunk failed; the remote holds a truncated message.
    #[error("payload chunk failed after {sent} of {total} bytes")]
    ChunkFailed { sent: usize, total: usize },

    /// Header + args + payload does not fit the 32-bit size field.
    #[error("message of {len} bytes does not fit the size field")]
    MessageTooLarge { len: usize },
}

pub type SocketResult<T> = Result<T, SocketError>;

impl From<SocketError> for io::Error {
    fn from(err: SocketError) -> Self {
        let kind = match &err {
            SocketError::NotOpen => io::ErrorKind::NotConnected,
            SocketError::OpenRejected { .. } => io::ErrorKind::ConnectionRefused,
            SocketError::Transport(TransportError::TimedOut { .. }) => io::ErrorKind::TimedOut,
            SocketError::Transport(TransportError::Cancelled { .. }) => io::ErrorKind::Interrupted,
            SocketError::Transport(TransportError::Busy) => io::ErrorKind::WouldBlock,
            SocketError::Transport(TransportError::PayloadTooLarge { .. }) => {
                io::ErrorKind::InvalidInput
            }
            SocketError::Transport(TransportError::Io(e)) => e.kind(),
            SocketError::Arena(_) => io::ErrorKind::OutOfMemory,
            SocketError::ShortWrite { .. } | SocketError::ChunkFailed { .. } => {
                io::ErrorKind::BrokenPipe
            }
            SocketError::MessageTooLarge { .. } => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err)
    }
}
