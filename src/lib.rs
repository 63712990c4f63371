//! Huge page remapping of a program's own text segment.
//!
//! Long-running, code-heavy processes spend a noticeable share of their time
//! on instruction TLB misses. This library moves the read+execute segment of
//! the running binary onto 2 MiB pages once, at startup, without changing any
//! code address. It is organized into several modules:
//! - `config`: CLI configuration for the `lpremap` diagnostics tool.
//! - `platform`: OS-specific backends (Linux, FreeBSD).
//! - `region`: Locating the text segment in the process memory map.
//! - `relocate`: The in-place remap sequence and its `lpstub` entry point.
//! - `large_pages`: The public entry points.
//! - `image`: ELF inspection of where the linker put the stub.
//!
//! On Linux the remap only proceeds when the stub sits below the code it
//! moves. Link with the script shipped in `link/lpstub.ld`:
//!
//! ```text
//! RUSTFLAGS="-C link-arg=-Wl,-T,link/lpstub.ld" cargo build --release
//! ```

pub mod config;
pub mod image;
pub mod large_pages;
pub mod platform;
pub mod region;
pub mod relocate;
pub mod utils;

pub use large_pages::{is_large_pages_enabled, map_static_code_to_large_pages, Error};
pub use region::{locate_text_region, TextRegion};
pub use relocate::{RelocateError, Step};
pub use utils::HUGE_PAGE_SIZE;
