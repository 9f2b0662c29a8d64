// Companion side of the register handshake.

use std::ptr::{self, addr_of, addr_of_mut};
use std::sync::atomic::{fence, Ordering};
use std::thread::{self, JoinHandle};

use crate::Core::handshake::{CancelToken, RegisterBlocks};
use crate::Core::registers::{FunctionId, INLINE_DATA};

/// A request as seen by the responder.
#[derive(Debug)]
pub struct DeviceCall<'a> {
    /// Raw function id; see [`DeviceCall::function`].
    pub func_id: u64,
    pub args: [u64; 4],
    /// Inline bytes the requester attached.
    pub data: &'a [u8],
}

impl DeviceCall<'_> {
    pub fn function(&self) -> Option<FunctionId> {
        FunctionId::from_raw(self.func_id)
    }
}

/// Serves requests taken off the register blocks.
pub trait DeviceHandler: Send {
    /// Handle one call. Reply bytes go into `reply`; returns the 64-bit result
    /// and how many reply bytes were written.
    fn handle(&mut self, call: &DeviceCall<'_>, reply: &mut [u8]) -> (u64, usize);
}

/// Polls the request block and answers through the response block.
pub struct Responder {
    blocks: RegisterBlocks,
    request_data: Box<[u8]>,
    reply_data: Box<[u8]>,
    served: u64,
}

impl Responder {
    pub fn new(blocks: RegisterBlocks) -> Self {
        Self {
            blocks,
            request_data: vec![0u8; INLINE_DATA].into_boxed_slice(),
            reply_data: vec![0u8; INLINE_DATA].into_boxed_slice(),
            served: 0,
        }
    }

    /// Serve the posted request, if there is one. Returns whether one was served.
    pub fn poll_once<H: DeviceHandler + ?Sized>(&mut self, handler: &mut H) -> bool {
        let req = self.blocks.request_ptr();
        let rsp = self.blocks.response_ptr();

        if unsafe { (*req).valid.load(Ordering::Acquire) } == 0 {
            return false;
        }
        fence(Ordering::SeqCst);

        let (func_id, args, data_len) = unsafe {
            let data_len = (addr_of!((*req).data_len).read_volatile() as usize).min(INLINE_DATA);
            ptr::copy_nonoverlapping(
                addr_of!((*req).data) as *const u8,
                self.request_data.as_mut_ptr(),
                data_len,
            );
            (
                addr_of!((*req).func_id).read_volatile(),
                [
                    addr_of!((*req).a1).read_volatile(),
                    addr_of!((*req).a2).read_volatile(),
                    addr_of!((*req).a3).read_volatile(),
                    addr_of!((*req).a4).read_volatile(),
                ],
                data_len,
            )
        };
        // Request taken; the block may be refilled once the response is consumed.
        unsafe { (*req).valid.store(0, Ordering::Release) };

        let call = DeviceCall {
            func_id,
            args,
            data: &self.request_data[..data_len],
        };
        let (ret, reply_len) = handler.handle(&call, &mut self.reply_data);
        let reply_len = reply_len.min(INLINE_DATA);

        unsafe {
            if reply_len > 0 {
                ptr::copy_nonoverlapping(
                    self.reply_data.as_ptr(),
                    addr_of_mut!((*rsp).data) as *mut u8,
                    reply_len,
                );
            }
            addr_of_mut!((*rsp).data_len).write_volatile(reply_len as u64);
            addr_of_mut!((*rsp).ret).write_volatile(ret);
            fence(Ordering::SeqCst);
            (*rsp).valid.store(1, Ordering::Release);
        }
        self.served += 1;
        true
    }

    /// Serve requests until `stop` fires.
    pub fn run<H: DeviceHandler + ?Sized>(&mut self, handler: &mut H, stop: &CancelToken) {
        while !stop.is_cancelled() {
            if !self.poll_once(handler) {
                thread::yield_now();
            }
        }
    }

    /// Serve on a background thread. The handler is handed back on join.
    pub fn spawn<H: DeviceHandler + 'static>(
        blocks: RegisterBlocks,
        mut handler: H,
        stop: CancelToken,
    ) -> JoinHandle<H> {
        thread::spawn(move || {
            let mut responder = Responder::new(blocks);
            responder.run(&mut handler, &stop);
            log::debug!("responder stopped after {} requests", responder.served);
            handler
        })
    }

    /// Requests served so far.
    pub fn served(&self) -> u64 {
        self.served
    }
}
