//! FreeBSD backend.
//!
//! Reads the memory map through `sysctl(KERN_PROC_VMMAP)`, probes superpages
//! through `vm.pmap.pg_ps_enabled` and asks for superpage alignment directly
//! when making the fixed mapping.

use std::ffi::{CStr, OsStr};
use std::io;
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::ptr;

use super::Platform;
use crate::region::{Mapping, Perms};
use crate::relocate::{Errno, PageOps};

/// The FreeBSD backend.
pub struct FreeBsd;

impl Platform for FreeBsd {
    const STUB_BELOW_REGION: bool = false;

    fn mappings(&self) -> io::Result<Vec<Mapping>> {
        let mib = [
            libc::CTL_KERN,
            libc::KERN_PROC,
            libc::KERN_PROC_VMMAP,
            unsafe { libc::getpid() },
        ];

        let mut len: libc::size_t = 0;
        let ret = unsafe {
            libc::sysctl(
                mib.as_ptr(),
                mib.len() as libc::c_uint,
                ptr::null_mut(),
                &mut len,
                ptr::null(),
                0,
            )
        };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }

        // The map can grow between the two calls.
        len = len * 4 / 3;
        let mut buf = vec![0u8; len];
        let ret = unsafe {
            libc::sysctl(
                mib.as_ptr(),
                mib.len() as libc::c_uint,
                buf.as_mut_ptr().cast(),
                &mut len,
                ptr::null(),
                0,
            )
        };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        buf.truncate(len);

        Ok(parse_vmmap(&buf))
    }

    fn code_start(&self) -> Option<usize> {
        None
    }

    fn large_pages_enabled(&self) -> bool {
        let mut enabled: libc::c_uint = 0;
        let mut len = mem::size_of_val(&enabled);
        let ret = unsafe {
            libc::sysctlbyname(
                c"vm.pmap.pg_ps_enabled".as_ptr(),
                (&mut enabled as *mut libc::c_uint).cast(),
                &mut len,
                ptr::null(),
                0,
            )
        };
        if ret == -1 {
            tracing::debug!(
                "could not read vm.pmap.pg_ps_enabled: {}",
                io::Error::last_os_error()
            );
            return false;
        }
        enabled >= 1
    }
}

/// Walks the packed `kinfo_vmentry` records returned by `KERN_PROC_VMMAP`.
///
/// Records are variable-length; `kve_structsize` gives the stride.
fn parse_vmmap(buf: &[u8]) -> Vec<Mapping> {
    let mut mappings = Vec::new();
    let mut off = 0;

    while off + mem::size_of::<libc::c_int>() <= buf.len() {
        let rest = &buf[off..];
        let mut entry: libc::kinfo_vmentry = unsafe { mem::zeroed() };
        let n = rest.len().min(mem::size_of::<libc::kinfo_vmentry>());
        unsafe {
            ptr::copy_nonoverlapping(rest.as_ptr(), (&mut entry as *mut libc::kinfo_vmentry).cast(), n);
        }

        let size = entry.kve_structsize as usize;
        if size == 0 {
            break;
        }
        off += size;

        let path_bytes = unsafe {
            &*(entry.kve_path.as_slice() as *const [libc::c_char] as *const [u8])
        };
        let Ok(path) = CStr::from_bytes_until_nul(path_bytes) else {
            continue;
        };
        if path.is_empty() {
            continue;
        }

        let prot = entry.kve_protection;
        mappings.push(Mapping {
            start: entry.kve_start as usize,
            end: entry.kve_end as usize,
            perms: Perms {
                read: prot & libc::KVME_PROT_READ != 0,
                write: prot & libc::KVME_PROT_WRITE != 0,
                exec: prot & libc::KVME_PROT_EXEC != 0,
                private: true,
            },
            inode: entry.kve_vn_fileid,
            path: Some(PathBuf::from(OsStr::from_bytes(path.to_bytes()))),
        });
    }

    mappings
}

#[inline(always)]
unsafe fn errno() -> Errno {
    *libc::__error()
}

impl PageOps for FreeBsd {
    #[inline(always)]
    unsafe fn map_scratch(&self, len: usize) -> Result<*mut u8, Errno> {
        let mem = libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        );
        if mem == libc::MAP_FAILED {
            return Err(errno());
        }
        Ok(mem.cast())
    }

    #[inline(always)]
    unsafe fn map_fixed(&self, addr: *mut u8, len: usize) -> Result<*mut u8, Errno> {
        let mem = libc::mmap(
            addr.cast(),
            len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_FIXED | libc::MAP_ALIGNED_SUPER,
            -1,
            0,
        );
        if mem == libc::MAP_FAILED {
            return Err(errno());
        }
        Ok(mem.cast())
    }

    // Superpage alignment was requested by `map_fixed`.
    #[inline(always)]
    unsafe fn advise_huge(&self, _addr: *mut u8, _len: usize) -> Result<(), Errno> {
        Ok(())
    }

    #[inline(always)]
    unsafe fn protect_rx(&self, addr: *mut u8, len: usize) -> Result<(), Errno> {
        if libc::mprotect(addr.cast(), len, libc::PROT_READ | libc::PROT_EXEC) == -1 {
            return Err(errno());
        }
        Ok(())
    }

    #[inline(always)]
    unsafe fn unmap(&self, addr: *mut u8, len: usize) -> Result<(), Errno> {
        if libc::munmap(addr.cast(), len) == -1 {
            return Err(errno());
        }
        Ok(())
    }
}
