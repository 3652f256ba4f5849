use std::mem::size_of;

use bitflags::bitflags;

use crate::callbacks::{CodeProtectModifyingCallback, ThreadCallback};
use crate::encoder::{PatchWrite, encode, span};
use crate::err::DetourError;
use crate::memory::RawMemory;
use crate::record::PatchRecord;
use crate::region::ensure_writable;
use crate::utils::{MemoryProtectGuard, ThreadSuspendingGuard};
use crate::width::AddressWidth;

bitflags! {
    /// Detour flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DetourFlags: u32 {
        /// If set, the patch span is written without checking that it is mapped writable.
        /// An unwritable target then crashes the process instead of failing.
        const SKIP_WRITE_PROBE = 0x1;
    }
}

/// Options of a [`Detour`].
pub struct DetourOptions {
    pointer_size: usize,
    flags: DetourFlags,
    thread_cb: Option<Box<dyn ThreadCallback + Send + Sync>>,
    protect_cb: Option<Box<dyn CodeProtectModifyingCallback + Send + Sync>>,
}

impl Default for DetourOptions {
    fn default() -> Self {
        Self {
            pointer_size: size_of::<usize>(),
            flags: DetourFlags::empty(),
            thread_cb: None,
            protect_cb: None,
        }
    }
}

impl DetourOptions {
    /// Encode for `width` instead of the width of the running process.
    pub fn width(self, width: AddressWidth) -> Self {
        self.pointer_size(width.pointer_size())
    }

    /// Encode as if pointers were `size` bytes. Sizes other than 4 and 8 make
    /// every install fail with [`DetourError::UnsupportedWidth`].
    pub fn pointer_size(mut self, size: usize) -> Self {
        self.pointer_size = size;
        self
    }

    /// Set the detour flags.
    pub fn flags(mut self, flags: DetourFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Called right before and after the bytes are stored.
    pub fn thread_callback(mut self, cb: Box<dyn ThreadCallback + Send + Sync>) -> Self {
        self.thread_cb = Some(cb);
        self
    }

    /// Called to make the span writable before storing and to restore it after.
    pub fn protect_callback(
        mut self,
        cb: Box<dyn CodeProtectModifyingCallback + Send + Sync>,
    ) -> Self {
        self.protect_cb = Some(cb);
        self
    }
}

/// The detour engine.
///
/// It keeps no state about the sites it patched. The caller captures a
/// [`PatchRecord`] before installing and hands it back to revert.
pub struct Detour {
    opts: DetourOptions,
}

impl Default for Detour {
    fn default() -> Self {
        Self::new()
    }
}

impl Detour {
    /// An engine for the width of the running process, with no callbacks.
    pub fn new() -> Self {
        Self::with_options(DetourOptions::default())
    }

    /// An engine configured by `opts`.
    pub fn with_options(opts: DetourOptions) -> Self {
        Self { opts }
    }

    /// The width patches are encoded for.
    pub fn width(&self) -> Result<AddressWidth, DetourError> {
        AddressWidth::from_pointer_size(self.opts.pointer_size)
    }

    /// Capture the bytes at `original` that an install would overwrite.
    ///
    /// # Safety
    ///
    /// `original..original + 13` must be readable.
    pub unsafe fn capture(&self, original: usize) -> Result<PatchRecord, DetourError> {
        let width = self.width()?;
        Ok(unsafe { PatchRecord::capture_with_width(original, width) })
    }

    /// Redirect `original` to `replacement`. Returns false and logs the cause on failure.
    ///
    /// # Safety
    ///
    /// See [`Detour::try_install`].
    pub unsafe fn install(&self, original: usize, replacement: usize) -> bool {
        match unsafe { self.try_install(original, replacement) } {
            Ok(()) => true,
            Err(e) => {
                log::error!("error adding detour at {:#x}: {}", original, e);
                false
            }
        }
    }

    /// Overwrite the entry of `original` with an absolute jump to `replacement`.
    ///
    /// Capture a [`PatchRecord`] first if the site should be revertible.
    ///
    /// # Safety
    ///
    /// Process may crash (instead of returning an error) if:
    ///
    /// 1. `original` doesn't start a function of at least 13 bytes, or other code jumps into
    ///    those bytes.
    /// 2. Another thread executes the first 13 bytes of `original` while they are being written.
    ///    The stores are not atomic and no thread is suspended unless a [`ThreadCallback`] does it.
    /// 3. `DetourFlags::SKIP_WRITE_PROBE` is set and the span isn't writable.
    /// 4. `original` is patched again, or concurrently, without reverting first.
    pub unsafe fn try_install(
        &self,
        original: usize,
        replacement: usize,
    ) -> Result<(), DetourError> {
        let width = self.width()?;
        let writes = encode(width, replacement as u64)?;
        self.store(original, &writes)?;
        log::debug!(
            "detour installed {:#x} -> {:#x} ({})",
            original,
            replacement,
            width
        );
        Ok(())
    }

    /// Put back the bytes of `record`. Returns false and logs the cause on failure.
    ///
    /// # Safety
    ///
    /// See [`Detour::try_revert`].
    pub unsafe fn revert(&self, record: &PatchRecord) -> bool {
        match unsafe { self.try_revert(record) } {
            Ok(()) => true,
            Err(e) => {
                log::error!("error reverting detour at {:#x}: {}", record.target(), e);
                false
            }
        }
    }

    /// Write the captured bytes of `record` back to its target.
    ///
    /// The middle region is restored with the width it was captured with, not the
    /// width of this engine. Stores that already happened are not rolled back if a
    /// later one fails.
    ///
    /// # Safety
    ///
    /// `record` must have been captured before the target was patched, and the
    /// target must not have been patched by someone else or unmapped since.
    /// Nothing checks this. The same torn-write hazard as [`Detour::try_install`] applies.
    pub unsafe fn try_revert(&self, record: &PatchRecord) -> Result<(), DetourError> {
        if let Ok(width) = self.width() {
            if width != record.width() {
                log::debug!(
                    "reverting a {} record at {:#x} with a {} engine",
                    record.width(),
                    record.target(),
                    width
                );
            }
        }
        self.store(record.target(), &record.restore_writes())?;
        log::debug!("detour reverted at {:#x}", record.target());
        Ok(())
    }

    /// Capture, install, and return a point that reverts when dropped.
    ///
    /// # Safety
    ///
    /// See [`Detour::try_install`].
    pub unsafe fn attach(
        &self,
        original: usize,
        replacement: usize,
    ) -> Result<DetourPoint<'_>, DetourError> {
        let record = unsafe { self.capture(original) }?;
        unsafe { self.try_install(original, replacement) }?;
        Ok(DetourPoint {
            engine: self,
            record: Some(record),
        })
    }

    fn store(&self, addr: usize, writes: &[PatchWrite]) -> Result<(), DetourError> {
        let len = span(writes);
        let protect_cb = self
            .opts
            .protect_cb
            .as_deref()
            .map(|cb| cb as &dyn CodeProtectModifyingCallback);
        let thread_cb = self
            .opts
            .thread_cb
            .as_deref()
            .map(|cb| cb as &dyn ThreadCallback);

        MemoryProtectGuard::new(protect_cb, addr, len).run(|| {
            if !self.opts.flags.contains(DetourFlags::SKIP_WRITE_PROBE) {
                ensure_writable(addr, len)?;
            }
            ThreadSuspendingGuard::new(thread_cb).run(|| {
                let mem = unsafe { RawMemory::new(addr) };
                writes.iter().for_each(|w| w.store(&mem));
                Ok(())
            })
        })
    }
}

/// An installed detour returned by [`Detour::attach`].
pub struct DetourPoint<'a> {
    engine: &'a Detour,
    record: Option<PatchRecord>,
}

impl DetourPoint<'_> {
    /// The bytes the site held before the detour.
    pub fn record(&self) -> Option<&PatchRecord> {
        self.record.as_ref()
    }

    /// Consume self and revert the site.
    pub fn detach(mut self) -> Result<(), DetourError> {
        match self.record.take() {
            Some(record) => unsafe { self.engine.try_revert(&record) },
            None => Ok(()),
        }
    }

    /// Keep the detour for the rest of the process and hand back its record.
    pub fn leak(mut self) -> Option<PatchRecord> {
        self.record.take()
    }
}

// When the DetourPoint drops, it should revert automatically.
impl Drop for DetourPoint<'_> {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            unsafe { self.engine.revert(&record) };
        }
    }
}

/// Redirect `original` to `replacement` with the width of the running process.
///
/// # Safety
///
/// See [`Detour::try_install`].
pub unsafe fn install(original: usize, replacement: usize) -> bool {
    unsafe { Detour::new().install(original, replacement) }
}

/// Restore the bytes captured in `record`.
///
/// # Safety
///
/// See [`Detour::try_revert`].
pub unsafe fn revert(record: &PatchRecord) -> bool {
    unsafe { Detour::new().revert(record) }
}
