mod builder;
mod fetcher;
mod receive;
mod send;
mod session;

pub use builder::{SessionBuilder, DEFAULT_CHUNK_SIZE};
pub use fetcher::{FetchReport, FetchStop};
pub use receive::{Delivery, Received};
pub use session::{Session, SessionStats};

pub mod Queue {
    pub mod Queue;
    pub mod Queue_impl;
    pub use Queue::{Packet, PacketQueue, DEFAULT_QUEUE_CAPACITY}; // re-export for stable path
}

pub mod Structs {
    pub mod header;
    pub use header::{MessageHeader, HEADER_SIZE, NO_ENDPOINT}; // re-export for stable path
}
