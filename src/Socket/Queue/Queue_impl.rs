use std::io;

use super::Queue::{Packet, PacketQueue};

impl PacketQueue {
    /// Create an empty queue. `capacity` must be a non-zero power of two.
    pub fn new(capacity: usize) -> io::Result<Self> {
        if capacity == 0 || (capacity & (capacity - 1)) != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Capacity must be a power of two and greater than zero",
            ));
        }
        Ok(Self {
            slots: vec![None; capacity].into_boxed_slice(),
            front: 0,
            len: 0,
            mask: capacity - 1,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append at the rear. A full queue hands the packet back.
    pub fn push(&mut self, packet: Packet) -> Result<(), Packet> {
        if self.is_full() {
            log::error!(
                "packet queue full ({} entries), dropping type {} message",
                self.len,
                packet.header.message_type
            );
            return Err(packet);
        }
        let rear = (self.front + self.len) & self.mask;
        self.slots[rear] = Some(packet);
        self.len += 1;
        Ok(())
    }

    /// The earliest-enqueued packet, if any.
    pub fn peek_front(&self) -> Option<&Packet> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.front].as_ref()
    }

    /// Remove and return the earliest-enqueued packet.
    pub fn pop_front(&mut self) -> Option<Packet> {
        if self.is_empty() {
            return None;
        }
        let packet = self.slots[self.front].take();
        self.front = (self.front + 1) & self.mask;
        self.len -= 1;
        packet
    }

    /// Forget every queued packet.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.front = 0;
        self.len = 0;
    }

    /// Queued packets, front to rear.
    pub fn iter(&self) -> impl Iterator<Item = &Packet> + '_ {
        (0..self.len).filter_map(move |i| self.slots[(self.front + i) & self.mask].as_ref())
    }
}
