//! Fallback for targets without a backend. Nothing is ever found or remapped.

use std::io;

use super::Platform;
use crate::region::Mapping;
use crate::relocate::{Errno, PageOps};

const ENOSYS: Errno = libc::ENOSYS;

pub struct Unsupported;

impl Platform for Unsupported {
    const SUPPORTED: bool = false;
    const STUB_BELOW_REGION: bool = true;

    fn mappings(&self) -> io::Result<Vec<Mapping>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "memory map introspection is not implemented on this platform",
        ))
    }

    fn code_start(&self) -> Option<usize> {
        None
    }

    fn large_pages_enabled(&self) -> bool {
        false
    }
}

impl PageOps for Unsupported {
    unsafe fn map_scratch(&self, _len: usize) -> Result<*mut u8, Errno> {
        Err(ENOSYS)
    }

    unsafe fn map_fixed(&self, _addr: *mut u8, _len: usize) -> Result<*mut u8, Errno> {
        Err(ENOSYS)
    }

    unsafe fn advise_huge(&self, _addr: *mut u8, _len: usize) -> Result<(), Errno> {
        Err(ENOSYS)
    }

    unsafe fn protect_rx(&self, _addr: *mut u8, _len: usize) -> Result<(), Errno> {
        Err(ENOSYS)
    }

    unsafe fn unmap(&self, _addr: *mut u8, _len: usize) -> Result<(), Errno> {
        Err(ENOSYS)
    }
}
