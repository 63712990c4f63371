//! Looks at this test binary itself: its ELF image and its live text region.

#![cfg(target_os = "linux")]

use lpremap::relocate::stub_address;
use lpremap::{image, locate_text_region, HUGE_PAGE_SIZE};

#[test]
fn inspects_own_image() {
    let exe = std::env::current_exe().unwrap();
    let layout = image::inspect(&exe).unwrap();
    let text = layout.text.expect(".text section");
    assert!(text.start < text.end);
}

#[test]
fn located_region_respects_stub() {
    let region = locate_text_region();
    if !region.found {
        // Without link/lpstub.ld the stub trails .text and nothing is left.
        return;
    }
    assert_eq!(region.from % HUGE_PAGE_SIZE, 0);
    assert_eq!(region.to % HUGE_PAGE_SIZE, 0);
    assert!(region.from < region.to);
    assert!(stub_address() < region.from);
}
