use crate::DetourError;

#[cfg(windows)]
use core::ffi::c_void;
#[cfg(unix)]
use libc::{_SC_PAGESIZE, PROT_EXEC, PROT_READ, PROT_WRITE, c_void, mprotect, sysconf};
#[cfg(windows)]
use windows_sys::Win32::Foundation::GetLastError;
#[cfg(windows)]
use windows_sys::Win32::System::Memory::{PAGE_EXECUTE_READWRITE, VirtualProtect};

/// The trait which is called right before and after the patch bytes are stored.
/// Usually is used to suspend and resume all other threads, so that none of them
/// executes a half-written jump.
pub trait ThreadCallback {
    /// the callback before storing, should return true if success.
    fn pre(&self) -> bool;
    /// the callback after storing
    fn post(&self);
}

/// Makes the patch span writable before storing and puts the old protection back after.
///
/// The engine never changes protection on its own; supply an implementation
/// (for example [`DefaultCodeProtectModifyingCallback`]) if the target code is
/// not already mapped writable.
pub trait CodeProtectModifyingCallback {
    /// Add write access to `addr..addr + len`, returning the old protection.
    fn add_writable_to_protect(&self, addr: usize, len: usize) -> Result<u64, DetourError>;
    /// Put back the protection returned by `add_writable_to_protect`.
    fn recover_protect(&self, addr: usize, len: usize, old_prot: u64);
}

/// `mprotect` / `VirtualProtect` based protection callback.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCodeProtectModifyingCallback;

impl CodeProtectModifyingCallback for DefaultCodeProtectModifyingCallback {
    fn add_writable_to_protect(&self, addr: usize, len: usize) -> Result<u64, DetourError> {
        modify_mem_protect_to_rwe(addr, len)
    }

    fn recover_protect(&self, addr: usize, len: usize, old_prot: u64) {
        recover_mem_protect(addr, len, old_prot)
    }
}

#[cfg(windows)]
fn modify_mem_protect_to_rwe(addr: usize, len: usize) -> Result<u64, DetourError> {
    let mut old_prot: u32 = 0;
    let old_prot_ptr = std::ptr::addr_of_mut!(old_prot);
    let ret =
        unsafe { VirtualProtect(addr as *const c_void, len, PAGE_EXECUTE_READWRITE, old_prot_ptr) };
    if ret == 0 {
        Err(DetourError::MemoryProtect(unsafe { GetLastError() }))
    } else {
        Ok(old_prot as u64)
    }
}

#[cfg(unix)]
/// Page-aligned `(start, size)` covering `addr..addr + len`, `None` if the
/// rounded-up end doesn't fit in the address space.
fn page_range(addr: usize, len: usize) -> Option<(usize, usize)> {
    let page_size = unsafe { sysconf(_SC_PAGESIZE) } as usize;
    let start = addr & !(page_size - 1);
    let end = addr.checked_add(len)?.checked_add(page_size - 1)? & !(page_size - 1);
    Some((start, end - start))
}

#[cfg(unix)]
fn modify_mem_protect_to_rwe(addr: usize, len: usize) -> Result<u64, DetourError> {
    let (start, size) = page_range(addr, len).ok_or(DetourError::WriteFault { addr, len })?;
    let rwe = PROT_READ | PROT_WRITE | PROT_EXEC;
    let ret = unsafe { mprotect(start as *mut c_void, size, rwe) };
    if ret != 0 {
        let err = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        Err(DetourError::MemoryProtect(err as u32))
    } else {
        // it's too complex to get the original memory protection
        Ok(rwe as u64)
    }
}

#[cfg(windows)]
fn recover_mem_protect(addr: usize, len: usize, old: u64) {
    let mut old_prot: u32 = 0;
    let old_prot_ptr = std::ptr::addr_of_mut!(old_prot);
    unsafe { VirtualProtect(addr as *const c_void, len, old as u32, old_prot_ptr) };
}

#[cfg(unix)]
fn recover_mem_protect(addr: usize, len: usize, old: u64) {
    let Some((start, size)) = page_range(addr, len) else {
        return;
    };
    unsafe { mprotect(start as *mut c_void, size, old as i32) };
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[test]
    fn test_page_range() {
        let page = unsafe { sysconf(_SC_PAGESIZE) } as usize;
        assert_eq!(page_range(page * 3 + 5, 13), Some((page * 3, page)));
        // straddles a page boundary
        assert_eq!(page_range(page * 4 - 6, 13), Some((page * 3, page * 2)));
        assert_eq!(page_range(page * 2, page), Some((page * 2, page)));
    }

    #[test]
    fn test_page_range_at_address_space_end() {
        assert_eq!(page_range(usize::MAX - 5, 13), None);
        assert_eq!(page_range(usize::MAX, 1), None);
    }

    #[test]
    fn test_default_callback_rejects_wrapping_span() {
        let cb = DefaultCodeProtectModifyingCallback;
        let err = cb.add_writable_to_protect(usize::MAX - 5, 13).unwrap_err();
        assert!(matches!(err, DetourError::WriteFault { len: 13, .. }));
        // nothing to put back, and nothing to panic on
        cb.recover_protect(usize::MAX - 5, 13, 0);
    }
}
