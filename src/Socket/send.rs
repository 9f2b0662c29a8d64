use super::session::{send_call, Session};
use super::Structs::header::{MessageHeader, HEADER_SIZE};
use crate::error::{SendStage, SocketError, SocketResult};
use crate::Core::cycles::{read_cycles, Op};
use crate::Core::handshake::Transport;
use crate::Core::registers::INLINE_DATA;

impl<T: Transport> Session<T> {
    /// Frame and transmit one message to endpoint `dest`.
    ///
    /// The header goes out in a single call and must be accepted whole. `args`
    /// goes out in one call per register window's worth of bytes, each accepted
    /// whole; empty `args` issue no call at all, which leaves the bytes on the
    /// wire unchanged. `payload` goes out in chunks of at most the session
    /// chunk size; the first failed chunk ends the send, leaving the remote
    /// with a truncated message.
    pub fn send(&mut self, dest: u8, message_type: u16, args: &[u8], payload: &[u8]) -> SocketResult<()> {
        let start = read_cycles();
        let result = self.send_message(dest, message_type, args, payload);
        self.record(Op::Send, start);
        result
    }

    fn send_message(&mut self, dest: u8, message_type: u16, args: &[u8], payload: &[u8]) -> SocketResult<()> {
        let handle = self.open_handle()?;

        let body_len = args.len() + payload.len();
        if HEADER_SIZE + body_len > u32::MAX as usize {
            return Err(SocketError::MessageTooLarge {
                len: HEADER_SIZE + body_len,
            });
        }
        // Source id stays unset; the responder stamps it.
        let header = MessageHeader::outgoing(dest, message_type, body_len as u32);

        let written = send_call(&mut self.transport, handle, &header.encode())?;
        if written != HEADER_SIZE as i64 {
            log::error!("failed to send header ({} bytes accepted)", written);
            return Err(SocketError::ShortWrite {
                stage: SendStage::Header,
                expected: HEADER_SIZE,
                actual: written,
            });
        }

        for piece in args.chunks(INLINE_DATA) {
            let written = send_call(&mut self.transport, handle, piece)?;
            if written != piece.len() as i64 {
                log::error!("failed to send args ({} of {} bytes accepted)", written, piece.len());
                return Err(SocketError::ShortWrite {
                    stage: SendStage::Args,
                    expected: piece.len(),
                    actual: written,
                });
            }
        }

        let mut sent = 0;
        while sent < payload.len() {
            let chunk = (payload.len() - sent).min(self.chunk_size);
            let written = send_call(&mut self.transport, handle, &payload[sent..sent + chunk])?;
            log::trace!("sent {} bytes", written);
            if written <= 0 {
                log::error!(
                    "failed to send payload after {} of {} bytes",
                    sent,
                    payload.len()
                );
                return Err(SocketError::ChunkFailed {
                    sent,
                    total: payload.len(),
                });
            }
            sent += (written as usize).min(chunk);
        }
        Ok(())
    }
}
