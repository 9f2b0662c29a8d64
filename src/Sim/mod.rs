//! Host-side stand-in for the companion process: a responder that services
//! the register blocks and an in-memory network to route messages through.

mod loopback;
mod responder;

pub use loopback::{LoopbackNetwork, DEVICE_FAILURE};
pub use responder::{DeviceCall, DeviceHandler, Responder};
