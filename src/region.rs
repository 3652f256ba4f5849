use crate::err::DetourError;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod unix;
#[cfg(windows)]
mod win;

/// Query whether `len` bytes from `addr` are mapped writable.
///
/// Returns `None` on targets where the memory layout can't be queried.
pub fn probe_writable(addr: usize, len: usize) -> Result<Option<bool>, DetourError> {
    if addr.checked_add(len).is_none() {
        return Ok(Some(false));
    }
    query(addr, len)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn query(addr: usize, len: usize) -> Result<Option<bool>, DetourError> {
    unix::is_writable(addr, len).map(Some)
}

#[cfg(windows)]
fn query(addr: usize, len: usize) -> Result<Option<bool>, DetourError> {
    win::is_writable(addr, len).map(Some)
}

#[cfg(not(any(target_os = "linux", target_os = "android", windows)))]
fn query(_: usize, _: usize) -> Result<Option<bool>, DetourError> {
    Ok(None)
}

/// Fail with `WriteFault` unless the whole span is known or assumed writable.
pub(crate) fn ensure_writable(addr: usize, len: usize) -> Result<(), DetourError> {
    match probe_writable(addr, len)? {
        Some(false) => Err(DetourError::WriteFault { addr, len }),
        Some(true) => Ok(()),
        None => {
            log::trace!("can't query the layout of {:#x}, assuming writable", addr);
            Ok(())
        }
    }
}
