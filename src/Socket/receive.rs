use super::session::Session;
use crate::error::SocketResult;
use crate::Core::cycles::{read_cycles, Op};
use crate::Core::handshake::Transport;

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Endpoint id the responder stamped as the sender.
    pub source: u8,
    pub message_type: u16,
    /// Everything after the header: the sender's args followed by its payload.
    pub payload: Vec<u8>,
}

/// Outcome of [`Session::receive_into`] when the head packet matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The body was copied into the front of the buffer and the packet consumed.
    Delivered { source: u8, len: usize },
    /// The buffer is shorter than the body; the packet is still queued.
    TooSmall { needed: usize },
}

impl<T: Transport> Session<T> {
    /// Deliver the head packet if it carries `message_type`.
    ///
    /// When the queue is empty the channel is drained first. Only the head is
    /// inspected: a head of another type blocks delivery of anything behind it
    /// and `None` is returned with the queue untouched.
    ///
    /// `blocking` receives are not supported; they log and return `None`.
    pub fn receive(&mut self, message_type: u16, blocking: bool) -> SocketResult<Option<Received>> {
        let start = read_cycles();
        let result = self.receive_head(message_type, blocking);
        self.record(Op::Receive, start);
        result
    }

    /// Like [`Session::receive`], but copies the body into `out`.
    ///
    /// A matching head whose body does not fit `out` stays queued and
    /// [`Delivery::TooSmall`] reports the size needed.
    pub fn receive_into(
        &mut self,
        message_type: u16,
        blocking: bool,
        out: &mut [u8],
    ) -> SocketResult<Option<Delivery>> {
        let start = read_cycles();
        let result = self.receive_head_into(message_type, blocking, out);
        self.record(Op::Receive, start);
        result
    }

    // Fetch if needed and report whether the head packet carries `message_type`.
    fn head_matches(&mut self, message_type: u16, blocking: bool) -> SocketResult<bool> {
        if blocking {
            log::info!("blocking receive is unsupported, returning no match");
            return Ok(false);
        }
        self.open_handle()?;

        if self.queue.is_empty() {
            self.fetch_packets()?;
        }

        Ok(matches!(
            self.queue.peek_front(),
            Some(head) if head.header.message_type == message_type
        ))
    }

    fn receive_head(&mut self, message_type: u16, blocking: bool) -> SocketResult<Option<Received>> {
        if !self.head_matches(message_type, blocking)? {
            return Ok(None);
        }

        let packet = match self.queue.pop_front() {
            Some(packet) => packet,
            None => return Ok(None),
        };
        let payload = self.arena.bytes(&packet.body).to_vec();
        self.arena.release(packet.body);

        Ok(Some(Received {
            source: packet.header.src_id,
            message_type: packet.header.message_type,
            payload,
        }))
    }

    fn receive_head_into(
        &mut self,
        message_type: u16,
        blocking: bool,
        out: &mut [u8],
    ) -> SocketResult<Option<Delivery>> {
        if !self.head_matches(message_type, blocking)? {
            return Ok(None);
        }
        if let Some(head) = self.queue.peek_front() {
            if head.body.len() > out.len() {
                return Ok(Some(Delivery::TooSmall {
                    needed: head.body.len(),
                }));
            }
        }

        let packet = match self.queue.pop_front() {
            Some(packet) => packet,
            None => return Ok(None),
        };
        let body = self.arena.bytes(&packet.body);
        out[..body.len()].copy_from_slice(body);
        self.arena.release(packet.body);

        Ok(Some(Delivery::Delivered {
            source: packet.header.src_id,
            len: packet.body.len(),
        }))
    }
}
