mod common;

use common::{open_rig, random_bytes, rig, rig_on};
use mmio_sockets::Core::cycles::{Op, SOCKET_CYCLES};
use mmio_sockets::Sim::LoopbackNetwork;
use mmio_sockets::Socket::{Delivery, FetchStop, Received};
use mmio_sockets::{SessionBuilder, SocketError};
use serial_test::serial;

#[test]
fn test_round_trip_through_echo_endpoint() {
    let (mut rig, _handle) = open_rig(1, SessionBuilder::new());
    rig.net.add_echo_endpoint(42);

    let args = 1u32.to_le_bytes();
    let payload = random_bytes(500);
    rig.session.send(42, 7, &args, &payload).unwrap();

    let msg = rig.session.receive(7, false).unwrap().expect("echoed message");
    assert_eq!(msg.source, 42);
    assert_eq!(msg.message_type, 7);
    assert_eq!(&msg.payload[..4], &args);
    assert_eq!(&msg.payload[4..], &payload[..]);
    assert_eq!(rig.session.pending(), 0);
    assert_eq!(rig.session.arena().outstanding(), 0);
}

#[test]
fn test_round_trip_without_args() {
    let (mut rig, _handle) = open_rig(1, SessionBuilder::new());
    rig.net.add_echo_endpoint(42);

    let payload = random_bytes(3000);
    rig.session.send(42, 7, &[], &payload).unwrap();
    let msg = rig.session.receive(7, false).unwrap().unwrap();
    assert_eq!(msg.payload, payload);
}

#[test]
fn test_head_of_line_blocking() {
    let (mut rig, handle) = open_rig(1, SessionBuilder::new());
    rig.net.inject_message(handle, 4, 3, b"three");
    rig.net.inject_message(handle, 6, 5, b"five");

    // Type 5 is queued, but behind a type 3 head.
    assert_eq!(rig.session.receive(5, false).unwrap(), None);
    assert_eq!(rig.session.pending(), 2);
    assert_eq!(rig.session.receive(5, false).unwrap(), None);
    assert_eq!(rig.session.pending(), 2);

    let head = rig.session.receive(3, false).unwrap().unwrap();
    assert_eq!(
        head,
        Received {
            source: 4,
            message_type: 3,
            payload: b"three".to_vec()
        }
    );

    let next = rig.session.receive(5, false).unwrap().unwrap();
    assert_eq!(next.source, 6);
    assert_eq!(next.payload, b"five");
    assert_eq!(rig.session.pending(), 0);
}

#[test]
fn test_fifo_delivery_order() {
    let (mut rig, handle) = open_rig(1, SessionBuilder::new());
    let bodies: Vec<Vec<u8>> = (0..40).map(|_| random_bytes(fastrand::usize(0..1500))).collect();
    for (i, body) in bodies.iter().enumerate() {
        rig.net.inject_message(handle, (i % 200) as u8, 9, body);
    }

    let mut delivered = Vec::new();
    while let Some(msg) = rig.session.receive(9, false).unwrap() {
        delivered.push(msg);
    }

    assert_eq!(delivered.len(), bodies.len());
    for (i, (msg, body)) in delivered.iter().zip(bodies.iter()).enumerate() {
        assert_eq!(msg.source, (i % 200) as u8);
        assert_eq!(&msg.payload, body);
    }
}

#[test]
fn test_queue_capacity_bounds_fetch() {
    let (mut rig, handle) = open_rig(1, SessionBuilder::new().with_queue_capacity(4));
    for i in 0..6u8 {
        rig.net.inject_message(handle, i, 2, &[i; 16]);
    }

    // A non-matching receive still drains the channel into the queue.
    assert_eq!(rig.session.receive(99, false).unwrap(), None);
    assert_eq!(rig.session.pending(), 4);
    assert_eq!(rig.net.pending_inbound(handle), 2 * (8 + 16));

    // No fetch while packets are queued.
    for i in 0..4u8 {
        let msg = rig.session.receive(2, false).unwrap().unwrap();
        assert_eq!(msg.source, i);
        assert!(rig.session.pending() <= 4);
    }
    assert_eq!(rig.net.pending_inbound(handle), 2 * (8 + 16));

    let msg = rig.session.receive(2, false).unwrap().unwrap();
    assert_eq!(msg.source, 4);
    assert_eq!(rig.session.pending(), 1);
    assert_eq!(rig.net.pending_inbound(handle), 0);
}

#[test]
fn test_fetch_report_queue_full() {
    let (mut rig, handle) = open_rig(1, SessionBuilder::new().with_queue_capacity(2));
    for _ in 0..3 {
        rig.net.inject_message(handle, 5, 1, b"x");
    }
    let report = rig.session.fetch_packets().unwrap();
    assert_eq!(report.enqueued, 2);
    assert_eq!(report.stop, FetchStop::QueueFull);
    assert_eq!(rig.session.stats().fetched, 2);
}

#[test]
fn test_body_read_failure_drops_partial_packet() {
    let (mut rig, handle) = open_rig(1, SessionBuilder::new());
    rig.net.inject_message(handle, 5, 1, &random_bytes(3000));

    // peek, header and the first body chunk succeed; the second chunk fails.
    rig.net.fail_recvs_after(3);
    let report = rig.session.fetch_packets().unwrap();
    assert_eq!(report.stop, FetchStop::Desync);
    assert_eq!(report.enqueued, 0);
    assert_eq!(rig.session.pending(), 0);
    assert_eq!(rig.session.stats().desyncs, 1);
    assert_eq!(rig.session.arena().outstanding(), 0);

    rig.net.clear_faults();
    // The rest of the body is still on the stream; that misalignment is not masked.
    assert_eq!(rig.net.pending_inbound(handle), 3000 - 1024);
}

#[test]
fn test_arena_exhaustion_leaves_message_pending() {
    let builder = SessionBuilder::new()
        .with_arena_capacity(4096)
        .with_queue_capacity(8);
    let (mut rig, handle) = open_rig(1, builder);
    for i in 0..3u8 {
        rig.net.inject_message(handle, i, 1, &[i; 2000]);
    }

    let report = rig.session.fetch_packets().unwrap();
    assert_eq!(report.enqueued, 2);
    assert_eq!(report.stop, FetchStop::ArenaExhausted);
    assert_eq!(rig.net.pending_inbound(handle), 8 + 2000);

    assert_eq!(rig.session.receive(1, false).unwrap().unwrap().source, 0);
    assert_eq!(rig.session.receive(1, false).unwrap().unwrap().source, 1);

    // Third body wraps to offset 0 now that the first lease is gone.
    let third = rig.session.receive(1, false).unwrap().unwrap();
    assert_eq!(third.source, 2);
    assert_eq!(third.payload, vec![2u8; 2000]);
    assert_eq!(rig.session.arena().cursor(), 2000);
}

#[test]
fn test_oversized_message_is_skipped() {
    let (mut rig, handle) = open_rig(1, SessionBuilder::new().with_arena_capacity(1024));
    rig.net.inject_message(handle, 3, 4, &random_bytes(3000));
    rig.net.inject_message(handle, 3, 4, b"small");

    let msg = rig.session.receive(4, false).unwrap().unwrap();
    assert_eq!(msg.payload, b"small");
    assert_eq!(rig.session.stats().dropped, 1);
    assert_eq!(rig.session.stats().desyncs, 0);
}

#[test]
fn test_blocking_receive_is_a_no_op() {
    let (mut rig, handle) = open_rig(1, SessionBuilder::new());
    rig.net.inject_message(handle, 5, 1, b"x");

    assert_eq!(rig.session.receive(1, true).unwrap(), None);
    assert_eq!(rig.session.pending(), 0);
    assert_eq!(rig.net.pending_inbound(handle), 9);
}

#[test]
fn test_operations_require_open() {
    let mut rig = rig(SessionBuilder::new());
    assert!(matches!(rig.session.receive(1, false), Err(SocketError::NotOpen)));
    assert!(matches!(rig.session.send(1, 1, &[], b"x"), Err(SocketError::NotOpen)));

    let io: std::io::Error = SocketError::NotOpen.into();
    assert_eq!(io.kind(), std::io::ErrorKind::NotConnected);
}

#[test]
fn test_open_by_port_and_reopen_resets_queue() {
    let mut rig = rig(SessionBuilder::new());
    let first = rig.session.open_by_port(8080, 2).unwrap();
    assert_eq!(rig.net.channel_info(first), Some(("port:8080".to_string(), 2)));
    assert_eq!(rig.session.endpoint(), 2);

    rig.net.inject_message(first, 1, 1, b"a");
    rig.net.inject_message(first, 1, 2, b"b");
    assert_eq!(rig.session.receive(2, false).unwrap(), None);
    assert_eq!(rig.session.pending(), 2);

    let second = rig.session.open_by_path("/run/peer.sock", 3).unwrap();
    assert_ne!(first, second);
    assert_eq!(rig.session.pending(), 0);
    assert_eq!(rig.session.arena().outstanding(), 0);
    assert_eq!(
        rig.net.channel_info(second),
        Some(("/run/peer.sock".to_string(), 3))
    );
}

#[test]
fn test_two_sessions_exchange_messages() {
    let net = LoopbackNetwork::new();
    let mut a = rig_on(&net, SessionBuilder::new());
    let mut b = rig_on(&net, SessionBuilder::new());
    a.session.open_by_path("/tmp/a", 1).unwrap();
    b.session.open_by_path("/tmp/b", 2).unwrap();

    let payload = random_bytes(2048 + 17);
    a.session.send(2, 11, b"hdr!", &payload).unwrap();

    let msg = b.session.receive(11, false).unwrap().unwrap();
    assert_eq!(msg.source, 1);
    assert_eq!(&msg.payload[4..], &payload[..]);
    assert_eq!(a.session.receive(11, false).unwrap(), None);

    b.session.send(1, 12, &[], b"ack").unwrap();
    let ack = a.session.receive(12, false).unwrap().unwrap();
    assert_eq!(ack.source, 2);
    assert_eq!(ack.payload, b"ack");
}

#[test]
fn test_send_is_byte_exact_and_chunked() {
    let (mut rig, handle) = open_rig(1, SessionBuilder::new());
    let args = [7u8; 12];
    let payload = random_bytes(2500);
    rig.session.send(9, 3, &args, &payload).unwrap();

    assert_eq!(rig.net.send_calls(handle), vec![8, 12, 1024, 1024, 452]);
    let wire = rig.net.accepted(handle);
    assert_eq!(wire.len(), 8 + args.len() + payload.len());
    assert_eq!(u32::from_le_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize, wire.len());
    assert_eq!(wire[4], 255);
    assert_eq!(wire[5], 9);
    assert_eq!(&wire[8..20], &args);
    assert_eq!(&wire[20..], &payload[..]);
}

#[test]
fn test_send_stops_at_failed_chunk() {
    let (mut rig, handle) = open_rig(1, SessionBuilder::new());
    rig.net.fail_sends_after(3);

    let err = rig.session.send(9, 3, b"args", &random_bytes(3000)).unwrap_err();
    assert!(matches!(err, SocketError::ChunkFailed { sent: 1024, total: 3000 }));
    assert_eq!(rig.net.send_calls(handle), vec![8, 4, 1024]);
}

#[test]
#[serial]
fn test_cycles_are_accounted() {
    SOCKET_CYCLES.reset();
    let (mut rig, _handle) = open_rig(1, SessionBuilder::new());
    rig.net.add_echo_endpoint(8);
    rig.session.send(8, 1, &[], b"tick").unwrap();
    rig.session.receive(1, false).unwrap().unwrap();

    let cycles = rig.session.cycles();
    assert!(cycles.get(Op::Send) > 0);
    assert!(cycles.get(Op::Receive) > 0);
    assert_eq!(
        cycles.get(Op::Open) + cycles.get(Op::Send) + cycles.get(Op::Receive),
        cycles.total()
    );
    assert!(SOCKET_CYCLES.total() >= cycles.total());
}

#[test]
fn test_args_larger_than_register_window() {
    let (mut rig, handle) = open_rig(1, SessionBuilder::new());
    rig.net.add_echo_endpoint(42);

    let args = random_bytes(5000);
    rig.session.send(42, 8, &args, b"tail").unwrap();
    assert_eq!(rig.net.send_calls(handle), vec![8, 4096, 904, 4]);

    let msg = rig.session.receive(8, false).unwrap().unwrap();
    assert_eq!(&msg.payload[..5000], &args[..]);
    assert_eq!(&msg.payload[5000..], b"tail");
}

#[test]
fn test_receive_into_keeps_packet_when_buffer_short() {
    let (mut rig, handle) = open_rig(1, SessionBuilder::new());
    let body = random_bytes(300);
    rig.net.inject_message(handle, 6, 2, &body);

    let before = rig.session.cycles().get(Op::Receive);
    let mut small = [0u8; 16];
    assert_eq!(
        rig.session.receive_into(2, false, &mut small).unwrap(),
        Some(Delivery::TooSmall { needed: 300 })
    );
    // The fetch ran inside the metered call.
    assert!(rig.session.cycles().get(Op::Receive) > before);
    assert_eq!(rig.session.pending(), 1);
    assert_eq!(rig.session.receive_into(3, false, &mut small).unwrap(), None);

    let mut buf = vec![0u8; 512];
    assert_eq!(
        rig.session.receive_into(2, false, &mut buf).unwrap(),
        Some(Delivery::Delivered { source: 6, len: 300 })
    );
    assert_eq!(&buf[..300], &body[..]);
    assert_eq!(rig.session.pending(), 0);
    assert_eq!(rig.session.arena().outstanding(), 0);
}
