// Module naming follows project convention (capitalized top-level areas)
pub mod error;
pub mod ffi;

#[allow(non_snake_case)]
pub mod Core;

#[allow(non_snake_case)]
pub mod Socket;

#[allow(non_snake_case)]
pub mod Sim;

#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub use error::{ArenaError, SocketError, SocketResult, TransportError, TransportResult};
pub use Core::handshake::{CancelToken, RegisterBlocks, RegisterTransport, Transport, WaitConfig};
pub use Socket::{Received, Session, SessionBuilder};
