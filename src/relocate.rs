//! Segment relocation.
//!
//! Moves a live, huge-page aligned code range onto huge pages in place:
//!
//! 1. Map an anonymous read-write scratch area of the same size.
//! 2. Snapshot the code into it.
//! 3. Map anonymous read-write-execute memory at the exact same addresses
//!    (`MAP_FIXED`) and ask for huge pages.
//! 4. Copy the snapshot back.
//! 5. Drop write permission.
//! 6. Release the scratch area.
//!
//! Between step 3 and step 4 the original code is gone, so nothing executed
//! in that window may live inside the range. The sequence is force-inlined
//! into [`move_text_region_to_large_pages`], which the linker places in its
//! own `lpstub` section, and every primitive it calls resolves into libc.

use std::fmt;
use std::io;

use crate::platform::Host;
use crate::region::TextRegion;

/// Raw OS error number.
pub type Errno = i32;

/// OS primitives the relocation sequence is built from.
///
/// Implementations must be `#[inline(always)]` and call straight into libc:
/// they run while the caller's own text may be unmapped.
pub trait PageOps {
    /// Maps a private, anonymous, read-write area of `len` bytes anywhere.
    unsafe fn map_scratch(&self, len: usize) -> Result<*mut u8, Errno>;

    /// Replaces `[addr, addr + len)` with a private, anonymous,
    /// read-write-execute mapping at exactly that address.
    unsafe fn map_fixed(&self, addr: *mut u8, len: usize) -> Result<*mut u8, Errno>;

    /// Requests huge page backing for a mapping made by [`PageOps::map_fixed`].
    unsafe fn advise_huge(&self, addr: *mut u8, len: usize) -> Result<(), Errno>;

    /// Sets `[addr, addr + len)` to read+execute.
    unsafe fn protect_rx(&self, addr: *mut u8, len: usize) -> Result<(), Errno>;

    unsafe fn unmap(&self, addr: *mut u8, len: usize) -> Result<(), Errno>;

    #[inline(always)]
    unsafe fn copy(&self, dst: *mut u8, src: *const u8, len: usize) {
        libc::memcpy(dst.cast(), src.cast(), len);
    }
}

/// A step of the relocation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    MapScratch,
    Snapshot,
    MapFixed,
    AdviseHuge,
    Restore,
    Protect,
    ReleaseScratch,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::MapScratch => "mapping scratch area",
            Step::Snapshot => "copying text to scratch area",
            Step::MapFixed => "remapping text region",
            Step::AdviseHuge => "advising huge pages",
            Step::Restore => "copying text back",
            Step::Protect => "restoring text protection",
            Step::ReleaseScratch => "releasing scratch area",
        })
    }
}

/// Failure of one relocation step.
///
/// `cleanup_errno` is the first error hit while unmapping on the way out,
/// if any. Plain data: it is built inside the relocation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{step} failed: {}", os_error(.errno))]
pub struct RelocateError {
    pub step: Step,
    pub errno: Errno,
    pub cleanup_errno: Option<Errno>,
}

fn os_error(errno: &Errno) -> io::Error {
    io::Error::from_raw_os_error(*errno)
}

/// Runs the relocation sequence for `region` on top of `ops`.
///
/// Failures before [`Step::MapFixed`] leave the range untouched. Failures at
/// or after it unmap whatever was acquired; the range is then left without
/// its original contents and there is no way back.
///
/// # Safety
///
/// `region` must be huge-page aligned, non-empty and currently mapped
/// readable. No other thread may execute or touch the range while this runs,
/// and the caller must not live inside it.
#[inline(always)]
pub unsafe fn remap_region<P: PageOps + ?Sized>(
    ops: &P,
    region: &TextRegion,
) -> Result<(), RelocateError> {
    let len = region.to - region.from;
    let start = region.from as *mut u8;

    let scratch = match ops.map_scratch(len) {
        Ok(scratch) => scratch,
        Err(errno) => {
            return Err(RelocateError {
                step: Step::MapScratch,
                errno,
                cleanup_errno: None,
            })
        }
    };

    ops.copy(scratch, start, len);

    let target = match ops.map_fixed(start, len) {
        Ok(target) => target,
        Err(errno) => {
            let cleanup_errno = match ops.unmap(scratch, len) {
                Ok(()) => None,
                Err(e) => Some(e),
            };
            return Err(RelocateError {
                step: Step::MapFixed,
                errno,
                cleanup_errno,
            });
        }
    };

    if let Err(errno) = ops.advise_huge(target, len) {
        let cleanup_errno = unmap_both(ops, target, scratch, len);
        return Err(RelocateError {
            step: Step::AdviseHuge,
            errno,
            cleanup_errno,
        });
    }

    ops.copy(start, scratch, len);

    if let Err(errno) = ops.protect_rx(start, len) {
        let cleanup_errno = unmap_both(ops, target, scratch, len);
        return Err(RelocateError {
            step: Step::Protect,
            errno,
            cleanup_errno,
        });
    }

    match ops.unmap(scratch, len) {
        Ok(()) => Ok(()),
        Err(errno) => Err(RelocateError {
            step: Step::ReleaseScratch,
            errno,
            cleanup_errno: None,
        }),
    }
}

#[inline(always)]
unsafe fn unmap_both<P: PageOps + ?Sized>(
    ops: &P,
    target: *mut u8,
    scratch: *mut u8,
    len: usize,
) -> Option<Errno> {
    let first = match ops.unmap(target, len) {
        Ok(()) => None,
        Err(e) => Some(e),
    };
    match ops.unmap(scratch, len) {
        Ok(()) => first,
        Err(e) => match first {
            Some(first) => Some(first),
            None => Some(e),
        },
    }
}

/// Moves the running binary's text in `region` onto huge pages.
///
/// Lives in the `lpstub` link section and is never inlined so that it stays
/// put while the text around it is replaced.
///
/// # Safety
///
/// See [`remap_region`]. In addition, this function's own address must lie
/// outside `region`.
#[cfg_attr(any(target_os = "linux", target_os = "freebsd"), link_section = "lpstub")]
#[inline(never)]
pub unsafe fn move_text_region_to_large_pages(region: TextRegion) -> Result<(), RelocateError> {
    remap_region(&Host, &region)
}

/// Address of [`move_text_region_to_large_pages`].
pub fn stub_address() -> usize {
    move_text_region_to_large_pages as usize
}
