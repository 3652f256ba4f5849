use crate::callbacks::*;
use crate::err::DetourError;

pub(crate) struct MemoryProtectGuard<'a> {
    cb: Option<&'a dyn CodeProtectModifyingCallback>,
    addr: usize,
    len: usize,
}

impl<'a> MemoryProtectGuard<'a> {
    pub fn new(cb: Option<&'a dyn CodeProtectModifyingCallback>, addr: usize, len: usize) -> Self {
        Self { cb, addr, len }
    }

    pub fn run<T, F>(self, func: F) -> Result<T, DetourError>
    where
        F: FnOnce() -> Result<T, DetourError>,
    {
        let old_protect = self
            .cb
            .map(|cb| cb.add_writable_to_protect(self.addr, self.len))
            .transpose()?;
        let ret = func();

        if let (Some(cb), Some(prot)) = (self.cb, old_protect) {
            cb.recover_protect(self.addr, self.len, prot);
        }
        ret
    }
}

pub(crate) struct ThreadSuspendingGuard<'a> {
    cb: Option<&'a dyn ThreadCallback>,
}

impl<'a> ThreadSuspendingGuard<'a> {
    pub fn new(cb: Option<&'a dyn ThreadCallback>) -> Self {
        Self { cb }
    }

    pub fn run<T, F>(self, func: F) -> Result<T, DetourError>
    where
        F: FnOnce() -> Result<T, DetourError>,
    {
        if let Some(cb) = self.cb {
            if !cb.pre() {
                return Err(DetourError::PreHook);
            }
        }
        let ret = func();

        if let Some(cb) = self.cb {
            cb.post();
        }
        ret
    }
}
