use std::ptr;

/// A byte-addressable window starting at a fixed process address.
///
/// No bounds are tracked; every offset is relative to `base`. All raw pointer
/// arithmetic in the crate goes through this type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawMemory {
    base: usize,
}

impl RawMemory {
    /// Create a view over `base`.
    ///
    /// # Safety
    ///
    /// Every later read must hit readable memory and every later write must hit
    /// writable memory. The view itself doesn't check anything.
    pub unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// The address the view starts at.
    pub fn base(&self) -> usize {
        self.base
    }

    /// The address of `off`.
    pub fn addr_of(&self, off: usize) -> usize {
        self.base.wrapping_add(off)
    }

    fn ptr(&self, off: usize) -> *mut u8 {
        self.addr_of(off) as *mut u8
    }

    /// Read the byte at `off`.
    pub fn read_u8(&self, off: usize) -> u8 {
        unsafe { ptr::read_volatile(self.ptr(off)) }
    }

    /// Read 4 little-endian bytes at `off`.
    pub fn read_u32(&self, off: usize) -> u32 {
        u32::from_le(unsafe { ptr::read_unaligned(self.ptr(off) as *const u32) })
    }

    /// Read 8 little-endian bytes at `off`.
    pub fn read_u64(&self, off: usize) -> u64 {
        u64::from_le(unsafe { ptr::read_unaligned(self.ptr(off) as *const u64) })
    }

    /// Store a byte at `off`.
    pub fn write_u8(&self, off: usize, val: u8) {
        unsafe { ptr::write_volatile(self.ptr(off), val) }
    }

    /// Store 4 bytes at `off`.
    ///
    /// Wide values are stored little-endian in one unaligned store.
    pub fn write_u32(&self, off: usize, val: u32) {
        unsafe { ptr::write_unaligned(self.ptr(off) as *mut u32, val.to_le()) }
    }

    /// Store 8 bytes at `off`.
    pub fn write_u64(&self, off: usize, val: u64) {
        unsafe { ptr::write_unaligned(self.ptr(off) as *mut u64, val.to_le()) }
    }

    /// Copy `len` bytes starting at `off`.
    pub fn read_bytes(&self, off: usize, len: usize) -> Vec<u8> {
        (0..len).map(|i| self.read_u8(off + i)).collect()
    }
}
