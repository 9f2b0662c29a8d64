// Request/response handshake across the two register blocks.
//
// One request is outstanding at a time. The requester fills the request block,
// fences, raises `valid`, fences again and then polls the response block until
// the responder raises its own `valid` flag.

use std::io;
use std::ptr::{self, addr_of, addr_of_mut};
use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::registers::{
    request_block_size, response_block_size, FunctionId, RequestBlock, ResponseBlock,
    INLINE_DATA, REQUEST_BLOCK_ADDR, RESPONSE_BLOCK_ADDR,
};
use super::SharedMemory::{HeapMemory, SharedMemoryBackend, WINDOW_ALIGN};
use crate::error::{TransportError, TransportResult};

/// Polls between liveness diagnostics.
pub const DEFAULT_LIVENESS_INTERVAL: u64 = 100_000;

/// Upper bound on a single exchange unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// Deadline and cancellation are checked once per this many polls.
const CLOCK_CHECK_MASK: u64 = 0x3ff;

/// One call across the register interface.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub function: FunctionId,
    pub args: [u64; 4],
    /// Bytes copied into the request block's inline data area.
    pub data: Option<&'a [u8]>,
}

impl<'a> Request<'a> {
    pub fn new(function: FunctionId, args: [u64; 4]) -> Self {
        Self {
            function,
            args,
            data: None,
        }
    }

    pub fn with_data(mut self, data: &'a [u8]) -> Self {
        self.data = Some(data);
        self
    }
}

/// A synchronous request/response primitive.
///
/// `reply`, when given, receives whatever inline bytes the responder returned
/// (receive calls). The return value is the responder's raw 64-bit result;
/// callers read it as signed where `-1` means failure.
pub trait Transport {
    fn call(&mut self, request: &Request<'_>, reply: Option<&mut [u8]>) -> TransportResult<u64>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn call(&mut self, request: &Request<'_>, reply: Option<&mut [u8]>) -> TransportResult<u64> {
        (**self).call(request, reply)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn call(&mut self, request: &Request<'_>, reply: Option<&mut [u8]>) -> TransportResult<u64> {
        (**self).call(request, reply)
    }
}

/// Shared flag that aborts a pending wait.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Re-arm the token after a cancellation has been handled.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// How long and how noisily a call waits for its response.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// `None` waits forever, emitting only liveness diagnostics.
    pub timeout: Option<Duration>,
    /// Polls between "still waiting" diagnostics.
    pub liveness_interval: u64,
    pub cancel: CancelToken,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            cancel: CancelToken::new(),
        }
    }
}

impl WaitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn with_liveness_interval(mut self, polls: u64) -> Self {
        self.liveness_interval = polls.max(1);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Where the requester side of the handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    /// Request published, response not yet observed.
    RequestPosted,
    /// Response observed, not yet copied out and acknowledged.
    ResponseReady,
}

/// The request and response windows, validated for size and alignment.
#[derive(Debug, Clone)]
pub struct RegisterBlocks {
    request: Arc<dyn SharedMemoryBackend>,
    response: Arc<dyn SharedMemoryBackend>,
}

impl RegisterBlocks {
    pub fn new(
        request: Arc<dyn SharedMemoryBackend>,
        response: Arc<dyn SharedMemoryBackend>,
    ) -> io::Result<Self> {
        check_window("request", request.as_ref(), request_block_size())?;
        check_window("response", response.as_ref(), response_block_size())?;
        Ok(Self { request, response })
    }

    /// Both blocks in process-private heap memory.
    pub fn heap() -> io::Result<Self> {
        Self::new(
            Arc::new(HeapMemory::new(request_block_size())?),
            Arc::new(HeapMemory::new(response_block_size())?),
        )
    }

    /// The fixed physical blocks, mapped through /dev/mem.
    pub fn physical() -> io::Result<Self> {
        let request = super::SharedMemory::map_physical(REQUEST_BLOCK_ADDR, request_block_size())?;
        let response =
            super::SharedMemory::map_physical(RESPONSE_BLOCK_ADDR, response_block_size())?;
        Self::new(Arc::from(request), Arc::from(response))
    }

    /// Create `<prefix>_req` / `<prefix>_rsp` under /dev/shm for a host-side responder.
    pub fn create_shared(prefix: &str) -> io::Result<Self> {
        let request = super::SharedMemory::create_shared_memory(
            request_block_size(),
            Some(&format!("{}_req", prefix)),
        )?;
        let response = super::SharedMemory::create_shared_memory(
            response_block_size(),
            Some(&format!("{}_rsp", prefix)),
        )?;
        Self::new(Arc::from(request), Arc::from(response))
    }

    /// Attach to blocks created by [`RegisterBlocks::create_shared`].
    pub fn attach_shared(prefix: &str) -> io::Result<Self> {
        let request = super::SharedMemory::attach_shared_memory(
            &format!("{}_req", prefix),
            request_block_size(),
        )?;
        let response = super::SharedMemory::attach_shared_memory(
            &format!("{}_rsp", prefix),
            response_block_size(),
        )?;
        Self::new(Arc::from(request), Arc::from(response))
    }

    pub(crate) fn request_ptr(&self) -> *mut RequestBlock {
        self.request.as_ptr() as *mut RequestBlock
    }

    pub(crate) fn response_ptr(&self) -> *mut ResponseBlock {
        self.response.as_ptr() as *mut ResponseBlock
    }
}

fn check_window(which: &str, window: &dyn SharedMemoryBackend, needed: usize) -> io::Result<()> {
    if window.size() < needed {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "{} window too small. Provided: {}, Needed: {}",
                which,
                window.size(),
                needed
            ),
        ));
    }
    if (window.as_ptr() as usize) % WINDOW_ALIGN != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} window not properly aligned", which),
        ));
    }
    Ok(())
}

/// Requester side of the register handshake.
pub struct RegisterTransport {
    pub(crate) blocks: RegisterBlocks,
    pub(crate) wait: WaitConfig,
    pub(crate) state: HandshakeState,
    pub(crate) stall_reports: u64,
}

impl RegisterTransport {
    pub fn new(blocks: RegisterBlocks) -> Self {
        Self::with_wait(blocks, WaitConfig::default())
    }

    pub fn with_wait(blocks: RegisterBlocks, wait: WaitConfig) -> Self {
        Self {
            blocks,
            wait,
            state: HandshakeState::Idle,
            stall_reports: 0,
        }
    }

    /// Clear both valid flags and return to `Idle`, dropping any late response.
    ///
    /// Only safe once the responder is known to be quiescent.
    pub fn reset(&mut self) {
        unsafe {
            (*self.blocks.request_ptr()).valid.store(0, Ordering::SeqCst);
            (*self.blocks.response_ptr()).valid.store(0, Ordering::SeqCst);
        }
        self.state = HandshakeState::Idle;
    }

    // A request abandoned by timeout or cancellation may still be answered.
    fn reclaim(&mut self) -> TransportResult<()> {
        if self.state == HandshakeState::Idle {
            return Ok(());
        }
        let rsp = self.blocks.response_ptr();
        if unsafe { (*rsp).valid.load(Ordering::Acquire) } == 0 {
            return Err(TransportError::Busy);
        }
        let late = unsafe { addr_of!((*rsp).ret).read_volatile() };
        log::warn!("discarding late response (ret {:#x}) to an abandoned request", late);
        unsafe { (*rsp).valid.store(0, Ordering::Release) };
        self.state = HandshakeState::Idle;
        Ok(())
    }

    fn post(&mut self, request: &Request<'_>) {
        let req = self.blocks.request_ptr();
        let data = request.data.unwrap_or(&[]);
        unsafe {
            addr_of_mut!((*req).func_id).write_volatile(request.function as u64);
            addr_of_mut!((*req).a1).write_volatile(request.args[0]);
            addr_of_mut!((*req).a2).write_volatile(request.args[1]);
            addr_of_mut!((*req).a3).write_volatile(request.args[2]);
            addr_of_mut!((*req).a4).write_volatile(request.args[3]);
            addr_of_mut!((*req).data_len).write_volatile(data.len() as u64);
            if !data.is_empty() {
                ptr::copy_nonoverlapping(
                    data.as_ptr(),
                    addr_of_mut!((*req).data) as *mut u8,
                    data.len(),
                );
            }
            fence(Ordering::SeqCst);
            (*req).valid.store(1, Ordering::Release);
            fence(Ordering::SeqCst);
        }
        self.state = HandshakeState::RequestPosted;
    }

    fn await_response(&mut self, function: FunctionId) -> TransportResult<()> {
        let rsp = self.blocks.response_ptr();
        let started = Instant::now();
        let deadline = self.wait.timeout.map(|t| started + t);
        let mut polls: u64 = 0;
        let mut since_report: u64 = 0;

        while unsafe { (*rsp).valid.load(Ordering::Acquire) } == 0 {
            fence(Ordering::SeqCst);
            std::hint::spin_loop();
            polls += 1;
            since_report += 1;

            if since_report >= self.wait.liveness_interval {
                since_report = 0;
                self.stall_reports += 1;
                log::warn!(
                    "still waiting for response to {:?} ({} polls, {:?})",
                    function,
                    polls,
                    started.elapsed()
                );
            }

            if polls & CLOCK_CHECK_MASK == 0 {
                if self.wait.cancel.is_cancelled() {
                    return Err(TransportError::Cancelled { polls });
                }
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return Err(TransportError::TimedOut {
                            waited: started.elapsed(),
                            polls,
                        });
                    }
                }
            }
        }
        self.state = HandshakeState::ResponseReady;
        Ok(())
    }

    fn take_response(&mut self, reply: Option<&mut [u8]>) -> u64 {
        let rsp = self.blocks.response_ptr();
        let ret = unsafe {
            fence(Ordering::SeqCst);
            let ret = addr_of!((*rsp).ret).read_volatile();
            if let Some(buf) = reply {
                let available = (addr_of!((*rsp).data_len).read_volatile() as usize).min(INLINE_DATA);
                let len = available.min(buf.len());
                ptr::copy_nonoverlapping(addr_of!((*rsp).data) as *const u8, buf.as_mut_ptr(), len);
            }
            (*rsp).valid.store(0, Ordering::Release);
            ret
        };
        self.state = HandshakeState::Idle;
        ret
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Number of liveness diagnostics emitted so far.
    pub fn stall_reports(&self) -> u64 {
        self.stall_reports
    }

    pub fn wait_config(&self) -> &WaitConfig {
        &self.wait
    }

    pub fn blocks(&self) -> &RegisterBlocks {
        &self.blocks
    }
}

impl Transport for RegisterTransport {
    fn call(&mut self, request: &Request<'_>, reply: Option<&mut [u8]>) -> TransportResult<u64> {
        if let Some(data) = request.data {
            if data.len() > INLINE_DATA {
                return Err(TransportError::PayloadTooLarge {
                    len: data.len(),
                    capacity: INLINE_DATA,
                });
            }
        }
        self.reclaim()?;
        self.post(request);
        self.await_response(request.function)?;
        Ok(self.take_response(reply))
    }
}
