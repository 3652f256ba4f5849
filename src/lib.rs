/*!
This crate redirects functions that are already loaded in the current process, by
overwriting their first bytes with an absolute jump, and puts the original bytes
back later.

# Installation

```toml
[dependencies]
ildetour = "0.1"
```

# Usage

Capture a [`PatchRecord`] of the function entry, install the detour, and keep the
record around for as long as the detour should be revertible:

```rust,no_run
use ildetour::{Detour, PatchRecord};

#[inline(never)]
extern "C" fn foo(x: u32) -> u32 {
    x * x
}

extern "C" fn new_foo(x: u32) -> u32 {
    x * x + 3
}

let engine = Detour::new();
unsafe {
    let foo_addr = foo as extern "C" fn(u32) -> u32 as usize;
    let new_foo_addr = new_foo as extern "C" fn(u32) -> u32 as usize;
    let record = PatchRecord::capture(foo_addr).unwrap();
    if engine.install(foo_addr, new_foo_addr) {
        // foo(5) == 28 from now on
        engine.revert(&record);
    }
}
```

[`Detour::attach`] does the same and returns a [`DetourPoint`] which reverts the
site when dropped.

# Encodings

On a 64-bit process the 13 bytes at offsets 0..=12 become

```asm
mov r11, replacement   ; 49 BB <8 bytes>
jmp r11                ; 41 FF E3
```

On a 32-bit process `mov ebx, replacement` (`BB <4 bytes>`) is written at offset 1
and `jmp ebx` (`FF E3`) at offset 11. Bytes 0 and 6..=10 are left untouched.

Both widths capture and restore the same set of offsets: 0, 1, 10, 11, 12 and the
4 or 8 bytes at offset 2.

# Notes

There is no trampoline: the overwritten instructions are not relocated, so the
original function can't be called while the detour is installed.

The patch is written with plain byte and word stores. Another thread running the
first bytes of the target at that moment may see a half-written jump. Pass a
[`ThreadCallback`] which suspends the other threads if that can happen.

Memory protection is never changed unless a [`CodeProtectModifyingCallback`] is
supplied. Before writing, the crate checks that the span is mapped writable (on
Linux and Windows) and fails without touching anything if it isn't.

Failures of [`Detour::install`] and [`Detour::revert`] are logged through the
[`log`](https://docs.rs/log) facade.
*/

#![warn(missing_docs)]

mod callbacks;
mod detour;
mod encoder;
mod err;
mod memory;
mod record;
mod region;
mod utils;
mod width;

pub use callbacks::{
    CodeProtectModifyingCallback, DefaultCodeProtectModifyingCallback, ThreadCallback,
};
pub use detour::{Detour, DetourFlags, DetourOptions, DetourPoint, install, revert};
pub use encoder::{PATCH_SPAN, PatchWrite, WriteValue, apply_to_slice, encode, span};
pub use err::DetourError;
pub use memory::RawMemory;
pub use record::{MiddleRegion, PatchRecord};
pub use region::probe_writable;
pub use width::AddressWidth;
