// In-memory network behind the responder: routes framed messages between
// channels by endpoint id.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::responder::{DeviceCall, DeviceHandler};
use crate::Core::registers::{FunctionId, MSG_PEEK};
use crate::Socket::Structs::header::{MessageHeader, HEADER_SIZE, NO_ENDPOINT};

/// Result code for a failed call (`-1` as the requester reads it).
pub const DEVICE_FAILURE: u64 = u64::MAX;

#[derive(Debug, Default)]
struct Channel {
    endpoint: u8,
    target: String,
    inbound: VecDeque<u8>,
    // Bytes of a message still being assembled.
    partial: Vec<u8>,
    // Every byte accepted from this channel, in order.
    accepted: Vec<u8>,
    send_calls: Vec<usize>,
}

#[derive(Debug, Default)]
struct NetState {
    channels: HashMap<u64, Channel>,
    next_handle: u64,
    echo_endpoints: HashSet<u8>,
    sends_until_failure: Option<usize>,
    recvs_until_failure: Option<usize>,
    undeliverable: u64,
}

impl NetState {
    fn route(&mut self, from: u64, mut header: MessageHeader, body: Vec<u8>) {
        let sender = match self.channels.get(&from) {
            Some(ch) => ch.endpoint,
            None => return,
        };
        header.src_id = sender;

        if self.echo_endpoints.contains(&header.dst_id) {
            let reply = MessageHeader {
                size: header.size,
                src_id: header.dst_id,
                dst_id: sender,
                message_type: header.message_type,
            };
            if let Some(ch) = self.channels.get_mut(&from) {
                ch.inbound.extend(reply.encode());
                ch.inbound.extend(body);
            }
            return;
        }

        match self
            .channels
            .values_mut()
            .find(|ch| ch.endpoint == header.dst_id && ch.endpoint != NO_ENDPOINT)
        {
            Some(ch) => {
                ch.inbound.extend(header.encode());
                ch.inbound.extend(body);
            }
            None => {
                log::debug!("no endpoint {} on the loopback, dropping message", header.dst_id);
                self.undeliverable += 1;
            }
        }
    }

    fn open(&mut self, target: String, endpoint: u8) -> u64 {
        // Handles start at 3, like the first descriptor a fresh process gets.
        let handle = self.next_handle + 3;
        self.next_handle += 1;
        self.channels.insert(
            handle,
            Channel {
                endpoint,
                target,
                ..Channel::default()
            },
        );
        handle
    }

    fn send(&mut self, handle: u64, data: &[u8]) -> u64 {
        if let Some(left) = self.sends_until_failure.as_mut() {
            if *left == 0 {
                return DEVICE_FAILURE;
            }
            *left -= 1;
        }
        let ch = match self.channels.get_mut(&handle) {
            Some(ch) => ch,
            None => return DEVICE_FAILURE,
        };
        ch.send_calls.push(data.len());
        ch.accepted.extend_from_slice(data);
        ch.partial.extend_from_slice(data);

        let mut complete = Vec::new();
        while ch.partial.len() >= HEADER_SIZE {
            let mut raw = [0u8; HEADER_SIZE];
            raw.copy_from_slice(&ch.partial[..HEADER_SIZE]);
            let header = MessageHeader::decode(&raw);
            if !header.is_well_formed() {
                log::error!("malformed header from handle {}, resetting stream", handle);
                ch.partial.clear();
                break;
            }
            let size = header.size as usize;
            if ch.partial.len() < size {
                break;
            }
            let body = ch.partial[HEADER_SIZE..size].to_vec();
            ch.partial.drain(..size);
            complete.push((header, body));
        }
        for (header, body) in complete {
            self.route(handle, header, body);
        }
        data.len() as u64
    }

    fn recv(&mut self, handle: u64, len: usize, flags: u64, reply: &mut [u8]) -> (u64, usize) {
        if let Some(left) = self.recvs_until_failure.as_mut() {
            if *left == 0 {
                return (DEVICE_FAILURE, 0);
            }
            *left -= 1;
        }
        let ch = match self.channels.get_mut(&handle) {
            Some(ch) => ch,
            None => return (DEVICE_FAILURE, 0),
        };
        // Nothing pending: a non-blocking read would fail, and the loopback never blocks.
        if ch.inbound.is_empty() {
            return (DEVICE_FAILURE, 0);
        }
        let n = len.min(reply.len()).min(ch.inbound.len());
        for (dst, src) in reply[..n].iter_mut().zip(ch.inbound.iter()) {
            *dst = *src;
        }
        if flags & MSG_PEEK == 0 {
            ch.inbound.drain(..n);
        }
        (n as u64, n)
    }
}

/// Loopback network handler. Clones share the same state, so a test can keep
/// one handle while the responder thread owns another.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<NetState>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages addressed to `endpoint` bounce back to their sender, stamped
    /// as coming from `endpoint`.
    pub fn add_echo_endpoint(&self, endpoint: u8) {
        self.state.lock().echo_endpoints.insert(endpoint);
    }

    /// Let `calls` more send calls succeed, then fail every one after.
    pub fn fail_sends_after(&self, calls: usize) {
        self.state.lock().sends_until_failure = Some(calls);
    }

    /// Let `calls` more receive calls succeed, then fail every one after.
    pub fn fail_recvs_after(&self, calls: usize) {
        self.state.lock().recvs_until_failure = Some(calls);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.sends_until_failure = None;
        state.recvs_until_failure = None;
    }

    /// Append raw bytes to the inbound stream of `handle`.
    pub fn inject(&self, handle: u64, bytes: &[u8]) -> bool {
        match self.state.lock().channels.get_mut(&handle) {
            Some(ch) => {
                ch.inbound.extend(bytes.iter().copied());
                true
            }
            None => false,
        }
    }

    /// Frame a message from `source` and append it to the inbound stream of `handle`.
    pub fn inject_message(&self, handle: u64, source: u8, message_type: u16, body: &[u8]) -> bool {
        let mut state = self.state.lock();
        let ch = match state.channels.get_mut(&handle) {
            Some(ch) => ch,
            None => return false,
        };
        let header = MessageHeader {
            size: (HEADER_SIZE + body.len()) as u32,
            src_id: source,
            dst_id: ch.endpoint,
            message_type,
        };
        ch.inbound.extend(header.encode());
        ch.inbound.extend(body.iter().copied());
        true
    }

    /// Lengths of every successful send call on `handle`, in order.
    pub fn send_calls(&self, handle: u64) -> Vec<usize> {
        self.state
            .lock()
            .channels
            .get(&handle)
            .map(|ch| ch.send_calls.clone())
            .unwrap_or_default()
    }

    /// Every byte accepted from `handle`, in order.
    pub fn accepted(&self, handle: u64) -> Vec<u8> {
        self.state
            .lock()
            .channels
            .get(&handle)
            .map(|ch| ch.accepted.clone())
            .unwrap_or_default()
    }

    /// Bytes waiting to be received on `handle`.
    pub fn pending_inbound(&self, handle: u64) -> usize {
        self.state
            .lock()
            .channels
            .get(&handle)
            .map(|ch| ch.inbound.len())
            .unwrap_or(0)
    }

    /// Path (or `port:<n>`) and endpoint id `handle` was opened with.
    pub fn channel_info(&self, handle: u64) -> Option<(String, u8)> {
        self.state
            .lock()
            .channels
            .get(&handle)
            .map(|ch| (ch.target.clone(), ch.endpoint))
    }

    pub fn undeliverable(&self) -> u64 {
        self.state.lock().undeliverable
    }
}

impl DeviceHandler for LoopbackNetwork {
    fn handle(&mut self, call: &DeviceCall<'_>, reply: &mut [u8]) -> (u64, usize) {
        let mut state = self.state.lock();
        match call.function() {
            Some(FunctionId::OpenPath) => {
                let len = (call.args[0] as usize).min(call.data.len());
                let path = String::from_utf8_lossy(&call.data[..len]).into_owned();
                (state.open(path, call.args[1] as u8), 0)
            }
            Some(FunctionId::OpenPort) => {
                let target = format!("port:{}", call.args[0]);
                (state.open(target, call.args[1] as u8), 0)
            }
            Some(FunctionId::Send) => {
                let len = (call.args[2] as usize).min(call.data.len());
                (state.send(call.args[0], &call.data[..len]), 0)
            }
            Some(FunctionId::Recv) => {
                state.recv(call.args[0], call.args[2] as usize, call.args[3], reply)
            }
            None => {
                log::warn!("unknown function id {}", call.func_id);
                (DEVICE_FAILURE, 0)
            }
        }
    }
}
