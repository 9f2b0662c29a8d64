use crate::error::SocketError;
use crate::Core::cycles::SOCKET_CYCLES;
use crate::Core::handshake::{RegisterBlocks, RegisterTransport};
use crate::Socket::Structs::NO_ENDPOINT;
use crate::Socket::{Delivery, Session, SessionBuilder};
use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;

// Error codes
const MMIO_SUCCESS: i32 = 0;
const MMIO_ERROR_NULL_POINTER: i32 = -1;
const MMIO_ERROR_INVALID_ARG: i32 = -2;
const MMIO_ERROR_NOT_OPEN: i32 = -3;
const MMIO_ERROR_TIMED_OUT: i32 = -4;
const MMIO_ERROR_SEND_FAILED: i32 = -5;
const MMIO_ERROR_BUFFER_TOO_SMALL: i32 = -6;
const MMIO_ERROR_INTERNAL: i32 = -7;

/// Handle to a session (opaque pointer)
pub struct SessionHandle {
    inner: Session<RegisterTransport>,
}

fn error_code(err: &SocketError) -> i32 {
    match err {
        SocketError::NotOpen | SocketError::OpenRejected { .. } => MMIO_ERROR_NOT_OPEN,
        SocketError::Transport(crate::error::TransportError::TimedOut { .. })
        | SocketError::Transport(crate::error::TransportError::Cancelled { .. }) => {
            MMIO_ERROR_TIMED_OUT
        }
        SocketError::ShortWrite { .. } | SocketError::ChunkFailed { .. } => MMIO_ERROR_SEND_FAILED,
        SocketError::MessageTooLarge { .. } => MMIO_ERROR_INVALID_ARG,
        _ => MMIO_ERROR_INTERNAL,
    }
}

fn into_handle(session: std::io::Result<Session<RegisterTransport>>) -> *mut SessionHandle {
    match session {
        Ok(inner) => Box::into_raw(Box::new(SessionHandle { inner })),
        Err(e) => {
            log::error!("FFI Error: Failed to build session: {}", e);
            ptr::null_mut()
        }
    }
}

// -----------------------------------------------------------------------------
// Session lifecycle
// -----------------------------------------------------------------------------

/// Create a session over the fixed physical register blocks.
///
/// # Returns
/// * Pointer to `SessionHandle`, or NULL on failure.
#[no_mangle]
pub extern "C" fn mmio_session_new_physical() -> *mut SessionHandle {
    into_handle(SessionBuilder::new().build_physical())
}

/// Create a session over register blocks a host responder created under /dev/shm.
///
/// # Arguments
/// * `prefix` - NUL-terminated name prefix passed to the responder.
#[no_mangle]
pub extern "C" fn mmio_session_new_shared(prefix: *const c_char) -> *mut SessionHandle {
    if prefix.is_null() {
        return ptr::null_mut();
    }
    let prefix = match unsafe { CStr::from_ptr(prefix) }.to_str() {
        Ok(p) => p,
        Err(_) => return ptr::null_mut(),
    };
    into_handle(RegisterBlocks::attach_shared(prefix).and_then(|b| SessionBuilder::new().build_registers(b)))
}

/// Open a channel to a path-addressed server.
///
/// # Returns
/// * 0 on success, negative error code otherwise.
#[no_mangle]
pub extern "C" fn mmio_session_open_path(
    handle: *mut SessionHandle,
    path: *const c_char,
    endpoint: u8,
) -> i32 {
    if handle.is_null() || path.is_null() {
        return MMIO_ERROR_NULL_POINTER;
    }
    let path = match unsafe { CStr::from_ptr(path) }.to_str() {
        Ok(p) => p,
        Err(_) => return MMIO_ERROR_INVALID_ARG,
    };
    let session = unsafe { &mut (*handle).inner };
    match session.open_by_path(path, endpoint) {
        Ok(_) => MMIO_SUCCESS,
        Err(e) => error_code(&e),
    }
}

/// Open a channel to a port-addressed server.
#[no_mangle]
pub extern "C" fn mmio_session_open_port(handle: *mut SessionHandle, port: u32, endpoint: u8) -> i32 {
    if handle.is_null() {
        return MMIO_ERROR_NULL_POINTER;
    }
    let session = unsafe { &mut (*handle).inner };
    match session.open_by_port(port, endpoint) {
        Ok(_) => MMIO_SUCCESS,
        Err(e) => error_code(&e),
    }
}

/// Free a session handle.
#[no_mangle]
pub extern "C" fn mmio_session_free(handle: *mut SessionHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle); // Dropped automatically
        }
    }
}

// -----------------------------------------------------------------------------
// Messaging
// -----------------------------------------------------------------------------

/// Send one message.
///
/// `args` / `payload` may be NULL when their length is 0.
///
/// # Returns
/// * 0 on success, negative error code otherwise.
#[no_mangle]
pub extern "C" fn mmio_socket_send(
    handle: *mut SessionHandle,
    endpoint: u8,
    message_type: u16,
    args: *const u8,
    args_len: usize,
    payload: *const u8,
    payload_len: usize,
) -> i32 {
    if handle.is_null() || (args.is_null() && args_len > 0) || (payload.is_null() && payload_len > 0) {
        return MMIO_ERROR_NULL_POINTER;
    }
    let args = if args_len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(args, args_len) }
    };
    let payload = if payload_len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(payload, payload_len) }
    };

    let session = unsafe { &mut (*handle).inner };
    match session.send(endpoint, message_type, args, payload) {
        Ok(()) => MMIO_SUCCESS,
        Err(e) => error_code(&e),
    }
}

/// Receive the head packet if it has `message_type`.
///
/// # Arguments
/// * `out_buf` - Buffer to copy the message body into. May be NULL to query
///   the size of a pending body; it then counts as a zero-length buffer.
/// * `out_len` - Input: size of buf, Output: size of the body.
///
/// # Returns
/// * The sender's endpoint id (0..=254) on delivery.
/// * 255 when nothing matching is at the head of the queue.
/// * MMIO_ERROR_BUFFER_TOO_SMALL with `*out_len` set to the needed size; the
///   packet stays queued.
/// * Another negative error code otherwise.
#[no_mangle]
pub extern "C" fn mmio_socket_receive(
    handle: *mut SessionHandle,
    message_type: u16,
    blocking: bool,
    out_buf: *mut u8,
    out_len: *mut usize,
) -> i32 {
    if handle.is_null() || out_len.is_null() {
        return MMIO_ERROR_NULL_POINTER;
    }
    let session = unsafe { &mut (*handle).inner };
    let out: &mut [u8] = if out_buf.is_null() {
        &mut []
    } else {
        unsafe { std::slice::from_raw_parts_mut(out_buf, *out_len) }
    };

    match session.receive_into(message_type, blocking, out) {
        Ok(Some(Delivery::Delivered { source, len })) => {
            unsafe { *out_len = len };
            source as i32
        }
        Ok(Some(Delivery::TooSmall { needed })) => {
            unsafe { *out_len = needed };
            MMIO_ERROR_BUFFER_TOO_SMALL
        }
        Ok(None) => NO_ENDPOINT as i32,
        Err(e) => error_code(&e),
    }
}

// -----------------------------------------------------------------------------
// Instrumentation
// -----------------------------------------------------------------------------

/// Cycles spent in this session's entry points.
#[no_mangle]
pub extern "C" fn mmio_session_cycles(handle: *const SessionHandle) -> u64 {
    if handle.is_null() {
        return 0;
    }
    unsafe { (*handle).inner.cycles().total() }
}

/// Cycles spent in socket entry points across the process.
#[no_mangle]
pub extern "C" fn mmio_total_cycles() -> u64 {
    SOCKET_CYCLES.total()
}
