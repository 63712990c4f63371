//! Remapping orchestration.
//!
//! Ties the pieces together: locate the text region, make sure the
//! relocation stub is not inside it, then hand it to the stub.

use crate::platform::{Host, Platform};
use crate::region::{locate_text_region, TextRegion};
use crate::relocate::{move_text_region_to_large_pages, stub_address, RelocateError};

/// Why the text segment was not moved onto huge pages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("large page remapping is not supported on this platform")]
    Unsupported,

    #[error("failed to find text region")]
    TextRegionNotFound,

    #[error("relocation stub at {stub:#x} lies inside text region {from:#x}-{to:#x}")]
    StubInsideRegion { stub: usize, from: usize, to: usize },

    #[error("relocation stub at {stub:#x} is not below text region {from:#x}-{to:#x}")]
    StubNotBelowRegion { stub: usize, from: usize, to: usize },

    #[error(transparent)]
    Relocate(#[from] RelocateError),
}

/// Checks that the stub at `stub` survives remapping `region`.
fn check_stub(region: &TextRegion, stub: usize, stub_below: bool) -> Result<(), Error> {
    let (from, to) = (region.from, region.to);
    if region.contains(stub) {
        return Err(Error::StubInsideRegion { stub, from, to });
    }
    if stub_below && stub >= from {
        return Err(Error::StubNotBelowRegion { stub, from, to });
    }
    Ok(())
}

/// Validates a located `region` and runs `relocate` on it.
///
/// Holds no state: every call validates its inputs from scratch.
pub fn remap_located<F>(
    region: TextRegion,
    stub: usize,
    stub_below: bool,
    relocate: F,
) -> Result<(), Error>
where
    F: FnOnce(TextRegion) -> Result<(), RelocateError>,
{
    if !region.found || region.is_empty() {
        return Err(Error::TextRegionNotFound);
    }
    check_stub(&region, stub, stub_below)?;
    relocate(region)?;
    Ok(())
}

/// Moves the running binary's text segment onto huge pages.
///
/// Meant to be called once, early in `main`, before any other thread is
/// started. Every failure is reported as a warning and leaves the program
/// running from its original mapping, except for a failure halfway through
/// the relocation itself, which cannot be undone.
pub fn map_static_code_to_large_pages() -> Result<(), Error> {
    let result = if Host::SUPPORTED {
        let region = locate_text_region();
        remap_located(region, stub_address(), Host::STUB_BELOW_REGION, |region| {
            // SAFETY: `remap_located` checked the region is aligned, non-empty
            // and does not contain the stub.
            unsafe { move_text_region_to_large_pages(region) }
        })
        .inspect(|_| {
            tracing::info!(
                "moved text {:#x}-{:#x} to {} huge pages",
                region.from,
                region.to,
                region.page_count
            )
        })
    } else {
        Err(Error::Unsupported)
    };

    if let Err(e) = &result {
        tracing::warn!("Hugepages WARNING: {e}");
    }
    result
}

/// Whether the OS is configured to back memory with huge pages.
///
/// Advisory only: [`map_static_code_to_large_pages`] does not consult it.
pub fn is_large_pages_enabled() -> bool {
    Host.large_pages_enabled()
}
