//! Runs the real relocation sequence on an anonymous executable region
//! owned by the test rather than on the test binary's own text.

#![cfg(target_os = "linux")]

use std::fs;
use std::ptr;

use lpremap::platform::Host;
use lpremap::relocate::remap_region;
use lpremap::{Step, TextRegion, HUGE_PAGE_SIZE};

/// An anonymous mapping with a huge-page aligned window inside it.
struct Scratch {
    base: *mut u8,
    len: usize,
    window: usize,
}

impl Scratch {
    fn new(pages: usize) -> Self {
        let len = (pages + 1) * HUGE_PAGE_SIZE;
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(base, libc::MAP_FAILED);
        let base = base.cast::<u8>();
        let window = (base as usize).next_multiple_of(HUGE_PAGE_SIZE);
        Self { base, len, window }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.base.cast(), self.len) };
    }
}

fn pattern(i: usize) -> u8 {
    (i.wrapping_mul(31) ^ (i >> 9)) as u8
}

fn perms_at(addr: usize) -> Option<String> {
    let maps = fs::read_to_string("/proc/self/maps").unwrap();
    maps.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let (start, end) = fields.next()?.split_once('-')?;
        let start = usize::from_str_radix(start, 16).ok()?;
        let end = usize::from_str_radix(end, 16).ok()?;
        (start..end)
            .contains(&addr)
            .then(|| fields.next().unwrap().to_string())
    })
}

#[test]
fn preserves_content_and_protection() {
    let pages = 2;
    let scratch = Scratch::new(pages);
    let len = pages * HUGE_PAGE_SIZE;
    let window = scratch.window as *mut u8;

    unsafe {
        for i in 0..len {
            *window.add(i) = pattern(i);
        }
        assert_eq!(
            libc::mprotect(window.cast(), len, libc::PROT_READ | libc::PROT_EXEC),
            0
        );
    }

    let region = TextRegion::aligned(scratch.window, scratch.window + len);
    assert!(region.found);
    assert_eq!(region.page_count, pages);

    match unsafe { remap_region(&Host, &region) } {
        Ok(()) => {}
        // Kernels built without THP refuse MADV_HUGEPAGE; the window has
        // been unmapped and there is nothing left to check.
        Err(e) if e.step == Step::AdviseHuge => return,
        Err(e) => panic!("relocation failed: {e}"),
    }

    let bytes = unsafe { std::slice::from_raw_parts(window, len) };
    assert!(bytes.iter().enumerate().all(|(i, b)| *b == pattern(i)));
    assert_eq!(perms_at(scratch.window).as_deref(), Some("r-xp"));
    assert_eq!(perms_at(scratch.window + len - 1).as_deref(), Some("r-xp"));
}
