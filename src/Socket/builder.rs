use std::io;

use super::session::Session;
use super::Queue::{PacketQueue, DEFAULT_QUEUE_CAPACITY};
use crate::Core::alloc::{PayloadArena, DEFAULT_ARENA_CAPACITY};
use crate::Core::handshake::{RegisterBlocks, RegisterTransport, Transport, WaitConfig};
use crate::Core::registers::INLINE_DATA;

/// Largest number of bytes moved by one send or receive call.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

pub struct SessionBuilder {
    queue_capacity: usize,
    arena_capacity: usize,
    chunk_size: usize,
    wait: WaitConfig,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            wait: WaitConfig::default(),
        }
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_arena_capacity(mut self, capacity: usize) -> Self {
        self.arena_capacity = capacity;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Wait policy for sessions built over register blocks.
    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// Build a session over any transport.
    pub fn build<T: Transport>(self, transport: T) -> io::Result<Session<T>> {
        if self.chunk_size == 0 || self.chunk_size > INLINE_DATA {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "chunk size must be between 1 and {} bytes, got {}",
                    INLINE_DATA, self.chunk_size
                ),
            ));
        }
        let queue = PacketQueue::new(self.queue_capacity)?;
        let arena = PayloadArena::new(self.arena_capacity)?;
        Ok(Session::new(transport, queue, arena, self.chunk_size))
    }

    /// Build a session speaking the register handshake over `blocks`.
    pub fn build_registers(self, blocks: RegisterBlocks) -> io::Result<Session<RegisterTransport>> {
        let transport = RegisterTransport::with_wait(blocks, self.wait.clone());
        self.build(transport)
    }

    /// Build a session over the fixed physical register blocks.
    pub fn build_physical(self) -> io::Result<Session<RegisterTransport>> {
        let blocks = RegisterBlocks::physical()?;
        self.build_registers(blocks)
    }
}
