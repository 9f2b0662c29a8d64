use std::fmt;

use crate::Core::alloc::PayloadArena;
use crate::Core::handshake::RegisterTransport;
use crate::Core::handshake::Transport;
use crate::Socket::Queue::PacketQueue;
use crate::Socket::Session;

/// Debug function for RegisterTransport
///
/// Shows block addresses rather than dereferencing the shared windows.
pub fn debug_register_transport(transport: &RegisterTransport, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RegisterTransport")
        .field("request", &format_args!("{:p}", transport.blocks.request_ptr()))
        .field("response", &format_args!("{:p}", transport.blocks.response_ptr()))
        .field("state", &transport.state)
        .field("timeout", &transport.wait.timeout)
        .field("stall_reports", &transport.stall_reports)
        .finish()
}

/// Debug function for PayloadArena
///
/// Storage is opaque; only the bookkeeping is shown.
pub fn debug_payload_arena(arena: &PayloadArena, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PayloadArena")
        .field("storage", &"<opaque>")
        .field("capacity", &arena.capacity())
        .field("cursor", &arena.cursor())
        .field("outstanding", &arena.outstanding())
        .field("live_leases", &arena.live_leases())
        .finish()
}

pub fn debug_packet_queue(queue: &PacketQueue, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PacketQueue")
        .field("capacity", &queue.capacity())
        .field("front", &queue.front)
        .field("len", &queue.len())
        .field(
            "types",
            &queue.iter().map(|p| p.header.message_type).collect::<Vec<_>>(),
        )
        .finish()
}

pub fn debug_session<T: Transport>(session: &Session<T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Session")
        .field("handle", &session.handle())
        .field("endpoint", &session.endpoint())
        .field("queue", session.queue())
        .field("arena", session.arena())
        .field("stats", &session.stats())
        .finish_non_exhaustive()
}

impl fmt::Debug for RegisterTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_register_transport(self, f)
    }
}

impl fmt::Debug for PacketQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_packet_queue(self, f)
    }
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_session(self, f)
    }
}
