use std::fmt;
use std::mem::size_of;

use crate::err::DetourError;

/// The address width a patch is encoded for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressWidth {
    /// 4-byte pointers, `mov ebx, imm32; jmp ebx`
    Narrow,
    /// 8-byte pointers, `mov r11, imm64; jmp r11`
    Wide,
}

impl AddressWidth {
    /// The width of the running process.
    pub fn host() -> Result<Self, DetourError> {
        Self::from_pointer_size(size_of::<usize>())
    }

    /// Map a pointer size in bytes to a width.
    pub fn from_pointer_size(size: usize) -> Result<Self, DetourError> {
        match size {
            4 => Ok(Self::Narrow),
            8 => Ok(Self::Wide),
            x => Err(DetourError::UnsupportedWidth(x)),
        }
    }

    /// Size of the embedded immediate (and of the captured middle region).
    pub fn pointer_size(self) -> usize {
        match self {
            Self::Narrow => 4,
            Self::Wide => 8,
        }
    }

    /// Whether `addr` can be carried by this width's immediate.
    pub fn can_encode(self, addr: u64) -> bool {
        match self {
            Self::Narrow => addr <= u32::MAX as u64,
            Self::Wide => true,
        }
    }
}

impl fmt::Display for AddressWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Narrow => f.write_str("narrow"),
            Self::Wide => f.write_str("wide"),
        }
    }
}
