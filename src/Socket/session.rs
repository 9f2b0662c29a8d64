use crate::error::{SocketError, SocketResult};
use crate::Core::alloc::PayloadArena;
use crate::Core::cycles::{read_cycles, CycleLedger, Op, SOCKET_CYCLES};
use crate::Core::handshake::{Request, Transport};
use crate::Core::registers::FunctionId;
use crate::Socket::Queue::PacketQueue;
use crate::Socket::Structs::header::NO_ENDPOINT;

/// Counters describing what the fetch path has seen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Packets framed and enqueued.
    pub fetched: u64,
    /// Messages read off the transport but not enqueued.
    pub dropped: u64,
    /// Fetches aborted mid-message; the stream may be misaligned afterwards.
    pub desyncs: u64,
}

/// One channel to the companion responder.
///
/// Holds the channel handle, the queue of decoded packets and the arena their
/// bodies live in. Every operation takes `&mut self`: one caller, one
/// outstanding request.
pub struct Session<T: Transport> {
    pub(crate) transport: T,
    pub(crate) handle: Option<u64>,
    pub(crate) endpoint: u8,
    pub(crate) queue: PacketQueue,
    pub(crate) arena: PayloadArena,
    pub(crate) chunk_size: usize,
    pub(crate) cycles: CycleLedger,
    pub(crate) stats: SessionStats,
}

impl<T: Transport> Session<T> {
    pub(crate) fn new(transport: T, queue: PacketQueue, arena: PayloadArena, chunk_size: usize) -> Self {
        Self {
            transport,
            handle: None,
            endpoint: NO_ENDPOINT,
            queue,
            arena,
            chunk_size,
            cycles: CycleLedger::new(),
            stats: SessionStats::default(),
        }
    }

    /// Open a channel to a path-addressed server, identifying as `endpoint`.
    ///
    /// Returns the channel handle chosen by the responder.
    pub fn open_by_path(&mut self, path: &str, endpoint: u8) -> SocketResult<u64> {
        let start = read_cycles();
        let bytes = path.as_bytes();
        let request = Request::new(
            FunctionId::OpenPath,
            [bytes.len() as u64, endpoint as u64, 0, 0],
        )
        .with_data(bytes);
        log::debug!("open client by path {:?} as endpoint {}", path, endpoint);
        let result = self.open(&request, endpoint);
        self.record(Op::Open, start);
        result
    }

    /// Open a channel to a port-addressed server, identifying as `endpoint`.
    pub fn open_by_port(&mut self, port: u32, endpoint: u8) -> SocketResult<u64> {
        let start = read_cycles();
        let request = Request::new(FunctionId::OpenPort, [port as u64, endpoint as u64, 0, 0]);
        log::debug!("open client by port {} as endpoint {}", port, endpoint);
        let result = self.open(&request, endpoint);
        self.record(Op::Open, start);
        result
    }

    fn open(&mut self, request: &Request<'_>, endpoint: u8) -> SocketResult<u64> {
        self.queue.clear();
        self.arena.reset();
        self.handle = None;

        let ret = self.transport.call(request, None)? as i64;
        if ret < 0 {
            log::error!("responder rejected open request: {}", ret);
            return Err(SocketError::OpenRejected { code: ret });
        }
        self.handle = Some(ret as u64);
        self.endpoint = endpoint;
        Ok(ret as u64)
    }

    pub(crate) fn record(&self, op: Op, start: u64) {
        let delta = self.cycles.record(op, start);
        SOCKET_CYCLES.add(op, delta);
    }

    pub(crate) fn open_handle(&self) -> SocketResult<u64> {
        self.handle.ok_or(SocketError::NotOpen)
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<u64> {
        self.handle
    }

    /// Endpoint id passed to the last successful open.
    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    /// Decoded packets waiting for a matching receive.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn queue(&self) -> &PacketQueue {
        &self.queue
    }

    pub fn arena(&self) -> &PayloadArena {
        &self.arena
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Cycles spent in this session's entry points.
    pub fn cycles(&self) -> &CycleLedger {
        &self.cycles
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Receive up to `buf.len()` bytes on `handle`. Returns the responder's signed result.
pub(crate) fn recv_call<T: Transport>(
    transport: &mut T,
    handle: u64,
    buf: &mut [u8],
    flags: u64,
) -> SocketResult<i64> {
    let request = Request::new(FunctionId::Recv, [handle, 0, buf.len() as u64, flags]);
    Ok(transport.call(&request, Some(buf))? as i64)
}

/// Send `data` on `handle`. Returns the responder's signed result.
pub(crate) fn send_call<T: Transport>(transport: &mut T, handle: u64, data: &[u8]) -> SocketResult<i64> {
    let request = Request::new(FunctionId::Send, [handle, 0, data.len() as u64, 0]).with_data(data);
    Ok(transport.call(&request, None)? as i64)
}
