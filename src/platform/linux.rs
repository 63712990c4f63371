//! Linux backend.
//!
//! Reads `/proc/self/maps`, probes transparent huge pages through sysfs and
//! requests huge pages with `madvise(MADV_HUGEPAGE)` after the fixed mapping.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr;

use super::Platform;
use crate::region::{Mapping, Perms};
use crate::relocate::{Errno, PageOps};

const MAPS_PATH: &str = "/proc/self/maps";
const THP_ENABLED_PATH: &str = "/sys/kernel/mm/transparent_hugepage/enabled";

extern "C" {
    /// End of the `lpstub` section, generated by the linker.
    static __stop_lpstub: u8;
}

/// The Linux backend.
pub struct Linux;

impl Platform for Linux {
    const STUB_BELOW_REGION: bool = true;

    fn mappings(&self) -> io::Result<Vec<Mapping>> {
        let maps = fs::read_to_string(MAPS_PATH)?;
        Ok(parse_maps(&maps))
    }

    fn code_start(&self) -> Option<usize> {
        Some(unsafe { ptr::addr_of!(__stop_lpstub) } as usize)
    }

    fn large_pages_enabled(&self) -> bool {
        thp_enabled_at(Path::new(THP_ENABLED_PATH))
    }
}

#[inline(always)]
unsafe fn errno() -> Errno {
    *libc::__errno_location()
}

impl PageOps for Linux {
    #[inline(always)]
    unsafe fn map_scratch(&self, len: usize) -> Result<*mut u8, Errno> {
        let mem = libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        );
        if mem == libc::MAP_FAILED {
            return Err(errno());
        }
        Ok(mem.cast())
    }

    // The original mapping is r-xp; the replacement needs write access
    // until the snapshot has been copied back.
    #[inline(always)]
    unsafe fn map_fixed(&self, addr: *mut u8, len: usize) -> Result<*mut u8, Errno> {
        let mem = libc::mmap(
            addr.cast(),
            len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED,
            -1,
            0,
        );
        if mem == libc::MAP_FAILED {
            return Err(errno());
        }
        Ok(mem.cast())
    }

    #[inline(always)]
    unsafe fn advise_huge(&self, addr: *mut u8, len: usize) -> Result<(), Errno> {
        if libc::madvise(addr.cast(), len, libc::MADV_HUGEPAGE) == -1 {
            return Err(errno());
        }
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

/// Parses the contents of `/proc/<pid>/maps`.
///
/// ```text
/// address           perms offset  dev   inode       pathname
/// 00400000-00452000 r-xp 00000000 08:02 173521      /usr/bin/dbus-daemon
/// ```
///
/// Lines that do not parse are skipped.
pub fn parse_maps(maps: &str) -> Vec<Mapping> {
    maps.lines().filter_map(parse_maps_line).collect()
}

fn parse_maps_line(line: &str) -> Option<Mapping> {
    let mut rest = line.trim_start();
    let mut field = || {
        let s = rest;
        let end = s.find(char::is_whitespace).unwrap_or(s.len());
        rest = s[end..].trim_start();
        (end > 0).then(|| &s[..end])
    };

    let range = field()?;
    let perms = Perms::parse(field()?)?;
    let _offset = field()?;
    let _dev = field()?;
    let inode = field()?.parse().ok()?;

    let (start, end) = range.split_once('-')?;
    let start = usize::from_str_radix(start, 16).ok()?;
    let end = usize::from_str_radix(end, 16).ok()?;

    let path = rest.trim_end();
    Some(Mapping {
        start,
        end,
        perms,
        inode,
        path: (!path.is_empty()).then(|| PathBuf::from(path)),
    })
}

/// Transparent huge page policy, as selected in sysfs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThpMode {
    Always,
    Madvise,
    Never,
}

impl ThpMode {
    /// Parses `always [madvise] never`, picking the bracketed entry.
    pub fn parse(s: &str) -> Option<Self> {
        s.split_whitespace().find_map(|tok| match tok {
            "[always]" => Some(ThpMode::Always),
            "[madvise]" => Some(ThpMode::Madvise),
            "[never]" => Some(ThpMode::Never),
            _ => None,
        })
    }

    /// Whether `madvise(MADV_HUGEPAGE)` can get huge pages under this mode.
    pub fn allows_huge_pages(self) -> bool {
        matches!(self, ThpMode::Always | ThpMode::Madvise)
    }
}

/// Reads a THP `enabled` file; anything but `always` or `madvise` is false.
pub fn thp_enabled_at(path: &Path) -> bool {
    match fs::read_to_string(path) {
        Ok(s) => ThpMode::parse(&s).is_some_and(ThpMode::allows_huge_pages),
        Err(e) => {
            tracing::debug!("could not read {}: {e}", path.display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MAPS: &str = "\
00400000-00452000 r-xp 00000000 08:02 173521      /usr/bin/dbus-daemon
00651000-00652000 r--p 00051000 08:02 173521      /usr/bin/dbus-daemon
00e03000-00e24000 rw-p 00000000 00:00 0           [heap]
7f2b0d9d1000-7f2b0db91000 r-xp 00000000 08:02 135522     /opt/my app/bin/app
7ffc4e1f4000-7ffc4e215000 rw-p 00000000 00:00 0
not a mapping line
";

    #[test]
    fn parses_maps() {
        let maps = parse_maps(MAPS);
        assert_eq!(maps.len(), 5);

        assert_eq!(maps[0].start, 0x400000);
        assert_eq!(maps[0].end, 0x452000);
        assert!(maps[0].perms.is_text());
        assert_eq!(maps[0].inode, 173521);
        assert_eq!(maps[0].path.as_deref(), Some(Path::new("/usr/bin/dbus-daemon")));

        assert!(!maps[1].perms.is_text());
        assert_eq!(maps[2].inode, 0);
        assert_eq!(maps[2].path.as_deref(), Some(Path::new("[heap]")));

        assert_eq!(maps[3].start, 0x7f2b0d9d1000);
        assert_eq!(maps[3].path.as_deref(), Some(Path::new("/opt/my app/bin/app")));

        assert_eq!(maps[4].path, None);
    }

    #[test]
    fn parses_own_maps() {
        let maps = Linux.mappings().unwrap();
        assert!(!maps.is_empty());
        assert!(maps.iter().all(|m| m.start < m.end));
        assert!(maps.iter().any(|m| m.perms.exec));
    }

    #[test]
    fn thp_modes() {
        assert_eq!(ThpMode::parse("[always] madvise never\n"), Some(ThpMode::Always));
        assert_eq!(ThpMode::parse("always [madvise] never\n"), Some(ThpMode::Madvise));
        assert_eq!(ThpMode::parse("always madvise [never]\n"), Some(ThpMode::Never));
        assert_eq!(ThpMode::parse("always madvise never\n"), None);
        assert_eq!(ThpMode::parse(""), None);
    }

    #[test]
    fn thp_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!thp_enabled_at(&dir.path().join("enabled")));
    }

    #[test]
    fn thp_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(!thp_enabled_at(file.path()));
    }

    #[test]
    fn thp_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "always [madvise] never").unwrap();
        assert!(thp_enabled_at(file.path()));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "always madvise [never]").unwrap();
        assert!(!thp_enabled_at(file.path()));
    }

    #[test]
    fn code_start_follows_stub() {
        let stub = crate::relocate::stub_address();
        assert!(Linux.code_start().unwrap() > stub);
    }
}
