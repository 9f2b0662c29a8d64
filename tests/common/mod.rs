// Shared fixtures: a session wired to a loopback responder thread.
#![allow(dead_code)]

use mmio_sockets::Sim::{LoopbackNetwork, Responder};
use mmio_sockets::{CancelToken, RegisterBlocks, RegisterTransport, Session, SessionBuilder, WaitConfig};
use std::thread::JoinHandle;
use std::time::Duration;

pub struct Rig {
    pub session: Session<RegisterTransport>,
    pub net: LoopbackNetwork,
    stop: CancelToken,
    responder: Option<JoinHandle<LoopbackNetwork>>,
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.responder.take() {
            let _ = handle.join();
        }
    }
}

pub fn test_wait() -> WaitConfig {
    WaitConfig::new().with_timeout(Duration::from_secs(5))
}

/// A session on its own register blocks, served by `net`.
pub fn rig_on(net: &LoopbackNetwork, builder: SessionBuilder) -> Rig {
    let blocks = RegisterBlocks::heap().unwrap();
    let stop = CancelToken::new();
    let responder = Responder::spawn(blocks.clone(), net.clone(), stop.clone());
    let session = builder.with_wait(test_wait()).build_registers(blocks).unwrap();
    Rig {
        session,
        net: net.clone(),
        stop,
        responder: Some(responder),
    }
}

pub fn rig(builder: SessionBuilder) -> Rig {
    rig_on(&LoopbackNetwork::new(), builder)
}

/// An opened rig identifying as `endpoint`. Returns the channel handle too.
pub fn open_rig(endpoint: u8, builder: SessionBuilder) -> (Rig, u64) {
    let mut rig = rig(builder);
    let handle = rig.session.open_by_path("/tmp/mmio.sock", endpoint).unwrap();
    (rig, handle)
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|_| fastrand::u8(..)).collect()
}
