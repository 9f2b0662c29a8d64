// Drains bytes pending on the channel into framed packets.

use super::session::{recv_call, Session};
use super::Queue::Packet;
use super::Structs::header::{MessageHeader, HEADER_SIZE};
use crate::error::{ArenaError, SocketResult};
use crate::Core::alloc::Lease;
use crate::Core::handshake::Transport;
use crate::Core::registers::{MSG_DONTWAIT, MSG_PEEK};

/// Why a fetch pass stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FetchStop {
    /// Nothing more pending on the channel.
    #[default]
    Drained,
    QueueFull,
    /// Live packets occupy the arena space the next body needs.
    ArenaExhausted,
    /// A body read failed mid-message and the partial packet was dropped.
    Desync,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    pub enqueued: usize,
    pub stop: FetchStop,
}

impl<T: Transport> Session<T> {
    /// Pull every complete message currently pending into the packet queue.
    ///
    /// Stops when nothing is pending, the queue fills, the arena cannot take
    /// the next body, or a body read fails. Only transport failures (timeout,
    /// cancellation) are returned as errors; one that hits mid-body still
    /// releases the partial packet's lease and counts as a desync.
    pub fn fetch_packets(&mut self) -> SocketResult<FetchReport> {
        let handle = self.open_handle()?;
        let mut report = FetchReport::default();

        loop {
            if self.queue.is_full() {
                log::debug!("packet queue full, stop fetch");
                report.stop = FetchStop::QueueFull;
                break;
            }

            let mut raw = [0u8; HEADER_SIZE];
            let peeked = recv_call(&mut self.transport, handle, &mut raw, MSG_PEEK | MSG_DONTWAIT)?;
            if peeked <= 0 {
                break;
            }

            // Refuse before consuming the header so the message stays pending.
            if peeked as usize >= HEADER_SIZE {
                let upcoming = MessageHeader::decode(&raw);
                if let Err(ArenaError::Exhausted { size, outstanding }) =
                    self.arena.can_allocate(upcoming.body_len())
                {
                    log::warn!(
                        "arena cannot take a {} byte body ({} bytes leased), stop fetch",
                        size,
                        outstanding
                    );
                    report.stop = FetchStop::ArenaExhausted;
                    break;
                }
            }

            let got = recv_call(&mut self.transport, handle, &mut raw, 0)?;
            if got != HEADER_SIZE as i64 {
                log::error!("error receiving header; received {} bytes", got);
            }
            let header = MessageHeader::decode(&raw);
            log::trace!(
                "new message: {} bytes, type {}, from {}",
                header.size,
                header.message_type,
                header.src_id
            );

            let lease = match self.arena.allocate(header.body_len()) {
                Ok(lease) => lease,
                Err(ArenaError::TooLarge { size, capacity }) => {
                    log::error!(
                        "message body of {} bytes exceeds arena capacity {}, discarding",
                        size,
                        capacity
                    );
                    self.stats.dropped += 1;
                    match self.discard_body(handle, size) {
                        Ok(true) => continue,
                        Ok(false) => {
                            self.stats.desyncs += 1;
                            report.stop = FetchStop::Desync;
                            return Ok(report);
                        }
                        Err(err) => {
                            self.stats.desyncs += 1;
                            return Err(err);
                        }
                    }
                }
                Err(err @ ArenaError::Exhausted { .. }) => {
                    // Only reachable when the peek came back short; the body is still pending.
                    log::error!("{} after consuming header, stream misaligned", err);
                    self.stats.desyncs += 1;
                    report.stop = FetchStop::Desync;
                    return Ok(report);
                }
            };

            match self.read_body(handle, &lease) {
                Ok(true) => {}
                Ok(false) => {
                    self.arena.release(lease);
                    self.stats.desyncs += 1;
                    report.stop = FetchStop::Desync;
                    return Ok(report);
                }
                Err(err) => {
                    // A dropped packet must not keep its lease.
                    log::error!("transport failed mid-body, dropping partial packet: {}", err);
                    self.arena.release(lease);
                    self.stats.desyncs += 1;
                    return Err(err);
                }
            }

            match self.queue.push(Packet {
                header,
                body: lease,
            }) {
                Ok(()) => {
                    log::trace!("queued packet with type {}", header.message_type);
                    self.stats.fetched += 1;
                    report.enqueued += 1;
                }
                Err(rejected) => {
                    self.arena.release(rejected.body);
                    self.stats.dropped += 1;
                    report.stop = FetchStop::QueueFull;
                    return Ok(report);
                }
            }
        }

        Ok(report)
    }

    // Fill `lease` from the channel in chunks. False on a failed chunk.
    fn read_body(&mut self, handle: u64, lease: &Lease) -> SocketResult<bool> {
        let total = lease.len();
        let mut received = 0;
        while received < total {
            let chunk = (total - received).min(self.chunk_size);
            let buf = &mut self.arena.bytes_mut(lease)[received..received + chunk];
            let got = recv_call(&mut self.transport, handle, buf, 0)?;
            if got <= 0 {
                log::error!(
                    "error receiving message data after {} of {} bytes (result {})",
                    received,
                    total,
                    got
                );
                return Ok(false);
            }
            received += (got as usize).min(chunk);
        }
        Ok(true)
    }

    // Read and throw away `len` body bytes to stay aligned on the stream.
    fn discard_body(&mut self, handle: u64, len: usize) -> SocketResult<bool> {
        let mut scratch = vec![0u8; self.chunk_size];
        let mut skipped = 0;
        while skipped < len {
            let chunk = (len - skipped).min(scratch.len());
            let got = recv_call(&mut self.transport, handle, &mut scratch[..chunk], 0)?;
            if got <= 0 {
                log::error!("error discarding message data after {} of {} bytes", skipped, len);
                return Ok(false);
            }
            skipped += (got as usize).min(chunk);
        }
        Ok(true)
    }
}
