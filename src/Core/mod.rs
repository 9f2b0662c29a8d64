pub mod SharedMemory;
pub mod alloc;
pub mod cycles;
pub mod handshake;
pub mod registers;

pub use SharedMemory::{
    attach_shared_memory, create_shared_memory, map_physical, remove_shared_memory, HeapMemory,
    RawHandle, SharedMemoryBackend,
};
