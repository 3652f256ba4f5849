use crate::err::DetourError;
use crate::memory::RawMemory;
use crate::width::AddressWidth;

/// `mov r11, imm64` prefix (REX.WB)
const REX_WB: u8 = 0x49;
/// `mov r32, imm32` / `mov r64, imm64` opcode with register 3 (ebx / r11)
const MOV_IMM_BX: u8 = 0xbb;
/// `jmp r11` prefix (REX.B)
const REX_B: u8 = 0x41;
/// `jmp r/m` opcode
const JMP_RM: u8 = 0xff;
/// ModRM of `jmp ebx` / `jmp r11`
const MODRM_JMP_BX: u8 = 0xe3;

/// Offset of the embedded address immediate.
pub const IMM_OFFSET: usize = 2;

/// Number of bytes covered by a jump patch of either width.
pub const PATCH_SPAN: usize = 13;

/// A value stored by a single write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteValue {
    /// One byte
    Byte(u8),
    /// 4 bytes, little-endian
    Dword(u32),
    /// 8 bytes, little-endian
    Qword(u64),
}

impl WriteValue {
    /// Number of bytes the store covers.
    pub fn size(&self) -> usize {
        match self {
            Self::Byte(_) => 1,
            Self::Dword(_) => 4,
            Self::Qword(_) => 8,
        }
    }

    /// The bytes the store leaves in memory.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Byte(b) => vec![*b],
            Self::Dword(v) => v.to_le_bytes().to_vec(),
            Self::Qword(v) => v.to_le_bytes().to_vec(),
        }
    }
}

/// A store at an offset from the patch site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchWrite {
    /// Offset from the patch site
    pub offset: usize,
    /// The value stored there
    pub value: WriteValue,
}

impl PatchWrite {
    const fn byte(offset: usize, b: u8) -> Self {
        Self {
            offset,
            value: WriteValue::Byte(b),
        }
    }

    /// One past the last byte this store touches.
    pub fn end(&self) -> usize {
        self.offset + self.value.size()
    }

    pub(crate) fn store(&self, mem: &RawMemory) {
        match self.value {
            WriteValue::Byte(b) => mem.write_u8(self.offset, b),
            WriteValue::Dword(v) => mem.write_u32(self.offset, v),
            WriteValue::Qword(v) => mem.write_u64(self.offset, v),
        }
    }
}

/// Generate the stores of an absolute jump to `dest`.
///
/// Wide: `49 BB <imm64> 41 FF E3` over offsets 0..=12.
///
/// Narrow: `BB <imm32>` at offset 1 and `FF E3` at offset 11. Offsets 0 and
/// 6..=10 are never reached once the jump runs, so they are left alone.
pub fn encode(width: AddressWidth, dest: u64) -> Result<Vec<PatchWrite>, DetourError> {
    if !width.can_encode(dest) {
        return Err(DetourError::AddressOutOfRange(dest));
    }
    Ok(match width {
        AddressWidth::Wide => vec![
            PatchWrite::byte(0, REX_WB),
            PatchWrite::byte(1, MOV_IMM_BX),
            PatchWrite {
                offset: IMM_OFFSET,
                value: WriteValue::Qword(dest),
            },
            PatchWrite::byte(10, REX_B),
            PatchWrite::byte(11, JMP_RM),
            PatchWrite::byte(12, MODRM_JMP_BX),
        ],
        AddressWidth::Narrow => vec![
            PatchWrite::byte(1, MOV_IMM_BX),
            PatchWrite {
                offset: IMM_OFFSET,
                value: WriteValue::Dword(dest as u32),
            },
            PatchWrite::byte(11, JMP_RM),
            PatchWrite::byte(12, MODRM_JMP_BX),
        ],
    })
}

/// One past the highest byte touched by `writes`.
pub fn span(writes: &[PatchWrite]) -> usize {
    writes.iter().map(PatchWrite::end).max().unwrap_or(0)
}

/// Apply `writes` to a byte buffer instead of live memory.
///
/// Returns `None` when a store would run past the end of `buf`.
pub fn apply_to_slice(writes: &[PatchWrite], buf: &mut [u8]) -> Option<()> {
    if span(writes) > buf.len() {
        return None;
    }
    for w in writes {
        buf[w.offset..w.end()].copy_from_slice(&w.value.to_bytes());
    }
    Some(())
}
