use crate::encoder::{IMM_OFFSET, PATCH_SPAN, PatchWrite, WriteValue};
use crate::err::DetourError;
use crate::memory::RawMemory;
use crate::width::AddressWidth;

/// The single bytes captured regardless of width.
const SINGLE_OFFSETS: [usize; 5] = [0, 1, 10, 11, 12];

/// The span captured from the immediate offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MiddleRegion {
    /// 4 bytes, captured by a narrow host
    Narrow(u32),
    /// 8 bytes, captured by a wide host
    Wide(u64),
}

impl MiddleRegion {
    fn width(&self) -> AddressWidth {
        match self {
            Self::Narrow(_) => AddressWidth::Narrow,
            Self::Wide(_) => AddressWidth::Wide,
        }
    }

    fn to_write(self) -> PatchWrite {
        let value = match self {
            Self::Narrow(v) => WriteValue::Dword(v),
            Self::Wide(v) => WriteValue::Qword(v),
        };
        PatchWrite {
            offset: IMM_OFFSET,
            value,
        }
    }
}

/// The original bytes of a patch site, captured before it is patched.
///
/// Holds offsets 0, 1, 10, 11 and 12 plus the 4 or 8 bytes at offset 2. That is
/// a superset of what a narrow patch overwrites; restoring an untouched byte to
/// its own value is harmless.
///
/// A record is only meaningful if it was captured before the site was patched
/// and the site hasn't been patched by anyone else or unmapped since.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchRecord {
    target: usize,
    singles: [u8; 5],
    middle: MiddleRegion,
}

impl PatchRecord {
    /// Capture the entry bytes of `target` using the width of the running process.
    ///
    /// # Safety
    ///
    /// `target..target + 13` must be readable.
    pub unsafe fn capture(target: usize) -> Result<Self, DetourError> {
        let width = AddressWidth::host()?;
        Ok(unsafe { Self::capture_with_width(target, width) })
    }

    /// Capture the entry bytes of `target`, sizing the middle region by `width`.
    ///
    /// # Safety
    ///
    /// `target..target + 13` must be readable.
    pub unsafe fn capture_with_width(target: usize, width: AddressWidth) -> Self {
        let mem = unsafe { RawMemory::new(target) };
        let mut singles = [0u8; 5];
        for (slot, &off) in singles.iter_mut().zip(SINGLE_OFFSETS.iter()) {
            *slot = mem.read_u8(off);
        }
        let middle = match width {
            AddressWidth::Narrow => MiddleRegion::Narrow(mem.read_u32(IMM_OFFSET)),
            AddressWidth::Wide => MiddleRegion::Wide(mem.read_u64(IMM_OFFSET)),
        };
        Self {
            target,
            singles,
            middle,
        }
    }

    /// The patch site this record belongs to.
    pub fn target(&self) -> usize {
        self.target
    }

    /// The width the record was captured with.
    pub fn width(&self) -> AddressWidth {
        self.middle.width()
    }

    /// The captured middle region.
    pub fn middle(&self) -> MiddleRegion {
        self.middle
    }

    /// Number of bytes from the site start the record restores into.
    pub fn captured_len(&self) -> usize {
        PATCH_SPAN
    }

    /// The captured original byte at `off`, if the record covers it.
    pub fn byte_at(&self, off: usize) -> Option<u8> {
        if let Some(i) = SINGLE_OFFSETS.iter().position(|&o| o == off) {
            return Some(self.singles[i]);
        }
        let w = self.middle.to_write();
        if (w.offset..w.end()).contains(&off) {
            Some(w.value.to_bytes()[off - w.offset])
        } else {
            None
        }
    }

    /// The stores that put the captured bytes back.
    ///
    /// Same order the site was captured in: the five single bytes, then the
    /// middle region.
    pub fn restore_writes(&self) -> Vec<PatchWrite> {
        let mut writes: Vec<PatchWrite> = SINGLE_OFFSETS
            .iter()
            .zip(self.singles.iter())
            .map(|(&offset, &b)| PatchWrite {
                offset,
                value: WriteValue::Byte(b),
            })
            .collect();
        writes.push(self.middle.to_write());
        writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::apply_to_slice;

    fn sample() -> [u8; 32] {
        let mut buf = [0u8; 32];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = 0xa0 + i as u8;
        }
        buf
    }

    #[test]
    fn test_capture_wide() {
        let buf = sample();
        let rec =
            unsafe { PatchRecord::capture_with_width(buf.as_ptr() as usize, AddressWidth::Wide) };
        assert_eq!(rec.target(), buf.as_ptr() as usize);
        assert_eq!(rec.width(), AddressWidth::Wide);
        assert_eq!(
            rec.middle(),
            MiddleRegion::Wide(u64::from_le_bytes([
                0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9
            ]))
        );
        for off in 0..13 {
            assert_eq!(rec.byte_at(off), Some(buf[off]), "offset {}", off);
        }
        assert_eq!(rec.byte_at(13), None);
    }

    #[test]
    fn test_capture_narrow() {
        let buf = sample();
        let rec =
            unsafe { PatchRecord::capture_with_width(buf.as_ptr() as usize, AddressWidth::Narrow) };
        assert_eq!(rec.width(), AddressWidth::Narrow);
        assert_eq!(
            rec.middle(),
            MiddleRegion::Narrow(u32::from_le_bytes([0xa2, 0xa3, 0xa4, 0xa5]))
        );
        for off in [0, 1, 2, 3, 4, 5, 10, 11, 12] {
            assert_eq!(rec.byte_at(off), Some(buf[off]), "offset {}", off);
        }
        for off in 6..10 {
            assert_eq!(rec.byte_at(off), None, "offset {}", off);
        }
    }

    #[test]
    fn test_restore_writes_rebuild_original() {
        let buf = sample();
        for width in [AddressWidth::Narrow, AddressWidth::Wide] {
            let rec = unsafe { PatchRecord::capture_with_width(buf.as_ptr() as usize, width) };
            let mut scratch = buf;
            scratch[..13].fill(0xcc);
            if width == AddressWidth::Narrow {
                // not covered by a narrow record
                scratch[6..10].copy_from_slice(&buf[6..10]);
            }
            assert!(apply_to_slice(&rec.restore_writes(), &mut scratch).is_some());
            assert_eq!(scratch, buf);
        }
    }

    #[test]
    fn test_restore_writes_order() {
        let buf = sample();
        let rec =
            unsafe { PatchRecord::capture_with_width(buf.as_ptr() as usize, AddressWidth::Wide) };
        let offsets: Vec<usize> = rec.restore_writes().iter().map(|w| w.offset).collect();
        assert_eq!(offsets, [0, 1, 10, 11, 12, 2]);
    }
}
