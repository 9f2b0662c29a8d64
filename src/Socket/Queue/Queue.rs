// Bounded FIFO of decoded packets awaiting delivery.

use crate::Core::alloc::Lease;
use crate::Socket::Structs::header::MessageHeader;

/// Default number of packets the queue holds.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A fully framed message whose body sits in the payload arena.
///
/// The lease covers everything after the header (args followed by payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub header: MessageHeader,
    pub body: Lease,
}

/// Fixed-capacity FIFO ring of [`Packet`]s.
///
/// `len` is the only source of truth for occupancy: the queue is empty exactly
/// when `len == 0`, and the rear slot is derived as `(front + len) & mask`.
pub struct PacketQueue {
    pub(crate) slots: Box<[Option<Packet>]>,

    /// Index of the earliest-enqueued packet.
    pub(crate) front: usize,

    /// Number of queued packets.
    pub(crate) len: usize,

    /// `capacity - 1`; capacity is a power of two.
    pub(crate) mask: usize,
}
