use crate::error::ArenaError;
use std::collections::VecDeque;
use std::io;
mod debug;
mod getters;

/// Default arena size: 2 KiB for each of the 64 default queue slots.
pub const DEFAULT_ARENA_CAPACITY: usize = 64 * 2048;

/// A region of the arena handed to one decoded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    offset: usize,
    len: usize,
}

impl Lease {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Fixed-capacity payload storage with a bump cursor that wraps to 0.
///
/// An allocation never straddles the end of the buffer: if it does not fit in
/// the space left after the cursor, the cursor restarts at offset 0. Live
/// leases are tracked so a wrapped allocation can never land on bytes a queued
/// packet still owns; such an allocation is refused until the owner releases.
pub struct PayloadArena {
    storage: Box<[u8]>,
    cursor: usize,
    live: VecDeque<Lease>,
    outstanding: usize,
}

impl PayloadArena {
    pub fn new(capacity: usize) -> io::Result<Self> {
        if capacity == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "PayloadArena::new(): capacity must be greater than zero",
            ));
        }
        Ok(Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            live: VecDeque::new(),
            outstanding: 0,
        })
    }

    // Offset the next allocation of `size` bytes would start at.
    fn placement(&self, size: usize) -> Result<usize, ArenaError> {
        let capacity = self.storage.len();
        if size > capacity {
            return Err(ArenaError::TooLarge { size, capacity });
        }
        let start = if capacity - self.cursor < size { 0 } else { self.cursor };
        let end = start + size;
        // Empty leases own no bytes and never block a placement.
        if self
            .live
            .iter()
            .any(|lease| !lease.is_empty() && start < lease.end() && lease.offset < end)
        {
            return Err(ArenaError::Exhausted {
                size,
                outstanding: self.outstanding,
            });
        }
        Ok(start)
    }

    /// Check whether `size` bytes could be allocated right now, without
    /// moving the cursor.
    pub fn can_allocate(&self, size: usize) -> Result<(), ArenaError> {
        self.placement(size).map(|_| ())
    }

    /// Hand out `size` bytes at the cursor, wrapping to 0 first if needed.
    pub fn allocate(&mut self, size: usize) -> Result<Lease, ArenaError> {
        let offset = self.placement(size)?;
        let lease = Lease { offset, len: size };
        self.cursor = lease.end();
        self.live.push_back(lease);
        self.outstanding += size;
        Ok(lease)
    }

    /// Return a lease to the arena. Returns false if it was not live.
    pub fn release(&mut self, lease: Lease) -> bool {
        // Leases are normally released in allocation order.
        match self.live.iter().position(|l| *l == lease) {
            Some(idx) => {
                self.live.remove(idx);
                self.outstanding -= lease.len;
                true
            }
            None => false,
        }
    }

    /// Drop every lease and restart the cursor.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.live.clear();
        self.outstanding = 0;
    }

    pub fn bytes(&self, lease: &Lease) -> &[u8] {
        &self.storage[lease.offset..lease.end()]
    }

    pub fn bytes_mut(&mut self, lease: &Lease) -> &mut [u8] {
        &mut self.storage[lease.offset..lease.end()]
    }
}
