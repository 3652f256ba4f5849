use core::ffi::c_void;
use std::mem::{MaybeUninit, size_of};

use windows_sys::Win32::System::Memory::{
    MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY,
    PAGE_GUARD, PAGE_READWRITE, PAGE_WRITECOPY, VirtualQuery,
};

use crate::err::DetourError;

const WRITABLE: u32 =
    PAGE_READWRITE | PAGE_WRITECOPY | PAGE_EXECUTE_READWRITE | PAGE_EXECUTE_WRITECOPY;

pub(super) fn is_writable(addr: usize, len: usize) -> Result<bool, DetourError> {
    let end = addr + len;
    let mut cur = addr;
    while cur < end {
        let mut mbi = MaybeUninit::<MEMORY_BASIC_INFORMATION>::zeroed();
        let ret = unsafe {
            VirtualQuery(
                cur as *const c_void,
                mbi.as_mut_ptr(),
                size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if ret == 0 {
            return Ok(false);
        }
        let mbi = unsafe { mbi.assume_init() };
        if mbi.State != MEM_COMMIT || mbi.Protect & PAGE_GUARD != 0 || mbi.Protect & WRITABLE == 0
        {
            return Ok(false);
        }
        cur = mbi.BaseAddress as usize + mbi.RegionSize;
    }
    Ok(true)
}
