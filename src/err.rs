use std::io;
use thiserror::Error;

/// Detour errors.
#[derive(Error, Debug)]
pub enum DetourError {
    /// The pointer size of the host is neither 4 nor 8 bytes
    #[error("unsupported address width: {0} bytes")]
    UnsupportedWidth(usize),

    /// The replacement address can't be encoded in the immediate of a narrow jump
    #[error("address {0:#x} doesn't fit in a 32-bit immediate")]
    AddressOutOfRange(u64),

    /// The patch span is not mapped writable
    #[error("write fault at {addr:#x}, {len} bytes are not writable")]
    WriteFault {
        /// Start of the span
        addr: usize,
        /// Length of the span
        len: usize,
    },

    /// Error occurs when modifying the memory protect
    #[error("memory protect error, code:{0}")]
    MemoryProtect(u32),

    /// The memory layout of the process can't be parsed
    #[error("memory layout format error")]
    MemoryLayoutFormat,

    /// The pre-write thread callback failed
    #[error("pre hook failed")]
    PreHook,

    /// Some io error
    #[error("io error")]
    Io(#[from] io::Error),
}
