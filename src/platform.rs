//! Platform abstraction.
//!
//! This module defines the `Platform` trait, which encapsulates everything
//! OS-specific about remapping text onto huge pages: how the memory-mapping
//! table is read, how huge page support is probed, and which primitives back
//! the relocation sequence. Exactly one backend is compiled in, selected by
//! `target_os`, and re-exported as [`Host`].

use std::io;

use crate::region::Mapping;
use crate::relocate::PageOps;

#[cfg(target_os = "freebsd")]
pub mod freebsd;
#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
pub mod unsupported;

#[cfg(target_os = "freebsd")]
pub use freebsd::FreeBsd as Host;
#[cfg(target_os = "linux")]
pub use linux::Linux as Host;
#[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
pub use unsupported::Unsupported as Host;

/// A trait representing an OS family the text region can be remapped on.
pub trait Platform: PageOps {
    /// Whether large page remapping is implemented at all.
    const SUPPORTED: bool = true;

    /// Whether the relocation stub must sit below the remapped region,
    /// rather than merely outside it.
    const STUB_BELOW_REGION: bool;

    /// Reads the process memory-mapping table, in table order.
    fn mappings(&self) -> io::Result<Vec<Mapping>>;

    /// Linker-provided lower bound on the start of movable code, if the
    /// platform uses one.
    fn code_start(&self) -> Option<usize>;

    /// Whether the OS is configured to back memory with huge pages.
    fn large_pages_enabled(&self) -> bool;
}
