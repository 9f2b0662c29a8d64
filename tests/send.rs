use std::collections::VecDeque;

use mmio_sockets::Core::handshake::Request;
use mmio_sockets::Core::registers::FunctionId;
use mmio_sockets::error::SendStage;
use mmio_sockets::{Session, SessionBuilder, SocketError, Transport, TransportResult};

// Answers each call with the next scripted result and records what was asked.
#[derive(Default)]
struct Scripted {
    results: VecDeque<i64>,
    calls: Vec<(FunctionId, [u64; 4], Vec<u8>)>,
}

impl Scripted {
    fn new(results: &[i64]) -> Self {
        Self {
            results: results.iter().copied().collect(),
            calls: Vec::new(),
        }
    }

    fn sends(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter(|(f, _, _)| *f == FunctionId::Send)
            .map(|(_, args, _)| args[2] as usize)
            .collect()
    }
}

impl Transport for Scripted {
    fn call(&mut self, request: &Request<'_>, _reply: Option<&mut [u8]>) -> TransportResult<u64> {
        self.calls.push((
            request.function,
            request.args,
            request.data.map(|d| d.to_vec()).unwrap_or_default(),
        ));
        Ok(self.results.pop_front().unwrap_or(-1) as u64)
    }
}

// An open session whose transport answers `results` after the open call.
fn opened(results: &[i64]) -> Session<Scripted> {
    let mut script = vec![7];
    script.extend_from_slice(results);
    let mut session = SessionBuilder::new().build(Scripted::new(&script)).unwrap();
    assert_eq!(session.open_by_path("/dev/null", 1).unwrap(), 7);
    session
}

#[test]
fn test_open_request_layout() {
    let session = opened(&[]);
    let (function, args, data) = &session.transport().calls[0];
    assert_eq!(*function, FunctionId::OpenPath);
    assert_eq!(args[0], 9);
    assert_eq!(args[1], 1);
    assert_eq!(data, b"/dev/null");
}

#[test]
fn test_open_rejected() {
    let mut session = SessionBuilder::new().build(Scripted::new(&[-1])).unwrap();
    let err = session.open_by_port(80, 1).unwrap_err();
    assert!(matches!(err, SocketError::OpenRejected { code: -1 }));
    assert!(!session.is_open());
}

#[test]
fn test_short_header_write() {
    let mut session = opened(&[5]);
    let err = session.send(2, 1, b"ab", b"cd").unwrap_err();
    assert!(matches!(
        err,
        SocketError::ShortWrite {
            stage: SendStage::Header,
            expected: 8,
            actual: 5
        }
    ));
    assert_eq!(session.transport().sends(), vec![8]);
}

#[test]
fn test_short_args_write() {
    let mut session = opened(&[8, 1]);
    let err = session.send(2, 1, b"ab", b"cd").unwrap_err();
    assert!(matches!(
        err,
        SocketError::ShortWrite {
            stage: SendStage::Args,
            expected: 2,
            actual: 1
        }
    ));
    assert_eq!(session.transport().sends(), vec![8, 2]);
}

#[test]
fn test_failed_chunk_ends_send() {
    let mut session = opened(&[8, 1024, -1, 1024]);
    let err = session.send(2, 1, &[], &[0u8; 3000]).unwrap_err();
    assert!(matches!(err, SocketError::ChunkFailed { sent: 1024, total: 3000 }));
    // Nothing is attempted after the failed chunk.
    assert_eq!(session.transport().sends(), vec![8, 1024, 1024]);
}

#[test]
fn test_partial_chunk_progress() {
    let mut session = opened(&[8, 600, 1024, 376]);
    session.send(2, 1, &[], &[0u8; 2000]).unwrap();
    assert_eq!(session.transport().sends(), vec![8, 1024, 1024, 376]);

    let payloads: Vec<usize> = session.transport().calls[2..]
        .iter()
        .map(|(_, _, data)| data.len())
        .collect();
    assert_eq!(payloads, vec![1024, 1024, 376]);
}

#[test]
fn test_empty_args_skip_args_call() {
    let mut session = opened(&[8, 3]);
    session.send(4, 6, &[], b"abc").unwrap();
    let sends = session.transport().sends();
    assert_eq!(sends, vec![8, 3]);

    let header = &session.transport().calls[1].2;
    assert_eq!(u32::from_le_bytes([header[0], header[1], header[2], header[3]]), 11);
    assert_eq!(header[4], 255);
    assert_eq!(header[5], 4);
    assert_eq!(u16::from_le_bytes([header[6], header[7]]), 6);
}

#[test]
fn test_send_arguments_carry_handle_and_length() {
    let mut session = opened(&[8]);
    session.send(4, 6, &[], &[]).unwrap();
    let (function, args, _) = &session.transport().calls[1];
    assert_eq!(*function, FunctionId::Send);
    assert_eq!(*args, [7, 0, 8, 0]);
}

#[test]
fn test_chunk_size_is_configurable() {
    let mut session = SessionBuilder::new()
        .with_chunk_size(256)
        .build(Scripted::new(&[7, 8, 256, 256, 88]))
        .unwrap();
    session.open_by_port(9000, 3).unwrap();
    session.send(1, 1, &[], &[1u8; 600]).unwrap();
    assert_eq!(session.transport().sends(), vec![8, 256, 256, 88]);

    assert!(SessionBuilder::new().with_chunk_size(0).build(Scripted::default()).is_err());
    assert!(SessionBuilder::new().with_chunk_size(8192).build(Scripted::default()).is_err());
}

#[test]
fn test_large_args_split_at_register_window() {
    let mut session = opened(&[8, 4096, 904, 3]);
    session.send(2, 1, &[5u8; 5000], b"pay").unwrap();
    assert_eq!(session.transport().sends(), vec![8, 4096, 904, 3]);
}

#[test]
fn test_short_write_on_later_args_piece() {
    let mut session = opened(&[8, 4096, 100]);
    let err = session.send(2, 1, &[5u8; 5000], b"pay").unwrap_err();
    assert!(matches!(
        err,
        SocketError::ShortWrite {
            stage: SendStage::Args,
            expected: 904,
            actual: 100
        }
    ));
    assert_eq!(session.transport().sends(), vec![8, 4096, 904]);
}
