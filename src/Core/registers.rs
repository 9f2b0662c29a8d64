use std::sync::atomic::AtomicU64;

/// Physical address of the request register block.
pub const REQUEST_BLOCK_ADDR: u64 = 0x9000_0000;

/// Physical address of the response register block.
pub const RESPONSE_BLOCK_ADDR: u64 = 0x9100_0000;

/// Size of the inline data area trailing each register block.
/// Large enough for one args buffer; payload chunks are capped well below it.
pub const INLINE_DATA: usize = 4096;

/// Function ids understood by the companion responder.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionId {
    OpenPath = 1,
    Send = 2,
    Recv = 3,
    OpenPort = 4,
}

impl FunctionId {
    pub fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            1 => Some(FunctionId::OpenPath),
            2 => Some(FunctionId::Send),
            3 => Some(FunctionId::Recv),
            4 => Some(FunctionId::OpenPort),
            _ => None,
        }
    }
}

/// Receive flag: look at pending bytes without consuming them.
pub const MSG_PEEK: u64 = 2;
/// Receive flag: fail instead of waiting when nothing is pending.
pub const MSG_DONTWAIT: u64 = 64;

/// Request block as laid out at [`REQUEST_BLOCK_ADDR`].
///
/// The requester fills every field and raises `valid` last; the responder
/// clears `valid` once it has taken the request.
#[repr(C, align(128))]
pub struct RequestBlock {
    pub valid: AtomicU64,
    pub func_id: u64,
    pub a1: u64,
    pub a2: u64,
    pub a3: u64,
    pub a4: u64,
    /// Number of meaningful bytes in `data`.
    pub data_len: u64,
    pub data: [u8; INLINE_DATA],
}

/// Response block as laid out at [`RESPONSE_BLOCK_ADDR`].
///
/// The responder writes `ret` (and reply bytes for receive calls) and raises
/// `valid`; the requester copies them out and clears `valid`.
#[repr(C, align(128))]
pub struct ResponseBlock {
    pub ret: u64,
    pub valid: AtomicU64,
    pub data_len: u64,
    pub data: [u8; INLINE_DATA],
}

/// Bytes a backend must provide for the request block.
pub const fn request_block_size() -> usize {
    std::mem::size_of::<RequestBlock>()
}

/// Bytes a backend must provide for the response block.
pub const fn response_block_size() -> usize {
    std::mem::size_of::<ResponseBlock>()
}
