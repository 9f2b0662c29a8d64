use std::collections::VecDeque;
use std::time::Duration;

use mmio_sockets::Core::handshake::Request;
use mmio_sockets::Socket::Structs::MessageHeader;
use mmio_sockets::Socket::FetchStop;
use mmio_sockets::{Session, SessionBuilder, SocketError, Transport, TransportError, TransportResult};

// Plays back one scripted answer per call; receive answers carry reply bytes.
#[derive(Default)]
struct Replay {
    answers: VecDeque<TransportResult<(i64, Vec<u8>)>>,
}

impl Replay {
    fn ok(mut self, ret: i64, bytes: &[u8]) -> Self {
        self.answers.push_back(Ok((ret, bytes.to_vec())));
        self
    }

    fn fail(mut self, err: TransportError) -> Self {
        self.answers.push_back(Err(err));
        self
    }
}

impl Transport for Replay {
    fn call(&mut self, _request: &Request<'_>, reply: Option<&mut [u8]>) -> TransportResult<u64> {
        let (ret, bytes) = self.answers.pop_front().unwrap_or(Ok((-1, Vec::new())))?;
        if let Some(buf) = reply {
            let n = bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&bytes[..n]);
        }
        Ok(ret as u64)
    }
}

fn timed_out() -> TransportError {
    TransportError::TimedOut {
        waited: Duration::from_millis(10),
        polls: 1024,
    }
}

fn header(body_len: usize, message_type: u16) -> [u8; 8] {
    MessageHeader {
        size: (8 + body_len) as u32,
        src_id: 3,
        dst_id: 1,
        message_type,
    }
    .encode()
}

// An open session; `replay` scripts the traffic after the open call.
fn session(mut replay: Replay, arena_capacity: usize) -> Session<Replay> {
    replay.answers.push_front(Ok((5, Vec::new())));
    let mut session = SessionBuilder::new()
        .with_arena_capacity(arena_capacity)
        .build(replay)
        .unwrap();
    session.open_by_port(7000, 1).unwrap();
    session
}

#[test]
fn test_transport_failure_mid_body_releases_lease() {
    let hdr = header(600, 1);
    let replay = Replay::default()
        .ok(8, &hdr)
        .ok(8, &hdr)
        .fail(timed_out());
    let mut session = session(replay, 1000);

    let err = session.receive(1, false).unwrap_err();
    assert!(matches!(err, SocketError::Transport(TransportError::TimedOut { .. })));
    assert_eq!(session.pending(), 0);
    assert_eq!(session.arena().outstanding(), 0);
    assert_eq!(session.arena().live_leases(), 0);
    assert_eq!(session.stats().desyncs, 1);

    // The region the lost packet held is usable again once the cursor wraps.
    let hdr = header(700, 2);
    let body = vec![9u8; 700];
    let t = session.transport_mut();
    t.answers.push_back(Ok((8, hdr.to_vec())));
    t.answers.push_back(Ok((8, hdr.to_vec())));
    t.answers.push_back(Ok((700, body.clone())));
    let msg = session.receive(2, false).unwrap().unwrap();
    assert_eq!(msg.payload, body);
    assert_eq!(session.arena().outstanding(), 0);
}

#[test]
fn test_transport_failure_while_discarding_counts_desync() {
    let hdr = header(3000, 1);
    let replay = Replay::default()
        .ok(8, &hdr)
        .ok(8, &hdr)
        .ok(1024, &[0u8; 1024])
        .fail(TransportError::Cancelled { polls: 2048 });
    let mut session = session(replay, 1024);

    let err = session.fetch_packets().unwrap_err();
    assert!(matches!(err, SocketError::Transport(TransportError::Cancelled { .. })));
    assert_eq!(session.stats().dropped, 1);
    assert_eq!(session.stats().desyncs, 1);
    assert_eq!(session.arena().live_leases(), 0);
}

#[test]
fn test_failed_chunk_result_reports_desync() {
    let hdr = header(100, 1);
    let replay = Replay::default().ok(8, &hdr).ok(8, &hdr).ok(-1, &[]);
    let mut session = session(replay, 1024);

    let report = session.fetch_packets().unwrap();
    assert_eq!(report.stop, FetchStop::Desync);
    assert_eq!(session.arena().outstanding(), 0);
}

#[test]
fn test_queued_header_only_message_does_not_block_wrap() {
    let hdr = header(30, 5);
    let replay = Replay::default().ok(8, &hdr).ok(8, &hdr).ok(30, &[1u8; 30]);
    let mut session = session(replay, 100);
    session.receive(5, false).unwrap().unwrap();
    assert_eq!(session.arena().cursor(), 30);

    // An empty message then an 80 byte one in the same pass: the second must
    // wrap to 0 while the first is still queued.
    let empty = header(0, 4);
    let large = header(80, 6);
    let t = session.transport_mut();
    for (ret, bytes) in [(8, &empty[..]), (8, &empty[..]), (8, &large[..]), (8, &large[..]), (80, &[2u8; 80][..])] {
        t.answers.push_back(Ok((ret, bytes.to_vec())));
    }

    let report = session.fetch_packets().unwrap();
    assert_eq!(report.enqueued, 2);
    assert_eq!(report.stop, FetchStop::Drained);

    assert!(session.receive(4, false).unwrap().unwrap().payload.is_empty());
    assert_eq!(session.receive(6, false).unwrap().unwrap().payload, vec![2u8; 80]);
}
