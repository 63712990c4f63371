//! Text region discovery.
//!
//! This module finds the read+execute mapping of the running binary in the
//! process's memory-mapping table and trims it to huge page boundaries.
//! The table itself comes from the platform backend; the matching logic here
//! is pure so it can be exercised against synthetic tables.

use std::path::{Path, PathBuf};

use crate::platform::{Host, Platform};
use crate::utils::{align_down, align_up, HUGE_PAGE_SIZE};

/// One row of the process memory-mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub start: usize,
    pub end: usize,
    pub perms: Perms,
    /// Inode of the backing file, 0 for anonymous mappings.
    pub inode: u64,
    /// Backing file, if any.
    pub path: Option<PathBuf>,
}

/// Protection and sharing bits of a [`Mapping`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Perms {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
    pub private: bool,
}

impl Perms {
    /// Parses the four-character `rwxp` column of `/proc/<pid>/maps`.
    pub fn parse(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() != 4 {
            return None;
        }
        Some(Self {
            read: b[0] == b'r',
            write: b[1] == b'w',
            exec: b[2] == b'x',
            private: b[3] == b'p',
        })
    }

    /// `r-xp`: the shape of a program's text mapping.
    pub fn is_text(&self) -> bool {
        self.read && self.exec && !self.write && self.private
    }
}

impl Mapping {
    fn is_text_of(&self, exe: &Path) -> bool {
        self.inode != 0 && self.perms.is_text() && self.path.as_deref() == Some(exe)
    }
}

/// A huge-page aligned address range covering the binary's code.
///
/// Built fresh by [`locate_text_region`] and consumed by value. `from < to`
/// holds whenever `found` is set; otherwise the addresses are meaningless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextRegion {
    pub from: usize,
    pub to: usize,
    pub page_count: usize,
    pub found: bool,
}

impl TextRegion {
    pub const NOT_FOUND: Self = Self {
        from: 0,
        to: 0,
        page_count: 0,
        found: false,
    };

    /// Rounds `start` up and `end` down to [`HUGE_PAGE_SIZE`].
    ///
    /// Returns [`TextRegion::NOT_FOUND`] if nothing is left after rounding.
    pub fn aligned(start: usize, end: usize) -> Self {
        let Some(from) = align_up(start, HUGE_PAGE_SIZE) else {
            return Self::NOT_FOUND;
        };
        let to = align_down(end, HUGE_PAGE_SIZE);
        if from >= to {
            return Self::NOT_FOUND;
        }
        Self {
            from,
            to,
            page_count: (to - from) / HUGE_PAGE_SIZE,
            found: true,
        }
    }

    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    pub fn contains(&self, addr: usize) -> bool {
        (self.from..self.to).contains(&addr)
    }
}

/// Picks the text region of `exe` out of a mapping table.
///
/// The first private read+execute row backed by `exe` wins, in table order.
/// `code_start` is a linker-provided lower bound on where movable code
/// begins; it replaces the row's start when it lies above it.
pub fn find_text_region(
    mappings: &[Mapping],
    exe: &Path,
    code_start: Option<usize>,
) -> TextRegion {
    let Some(m) = mappings.iter().find(|m| m.is_text_of(exe)) else {
        tracing::debug!("no r-xp mapping for {}", exe.display());
        return TextRegion::NOT_FOUND;
    };

    let start = code_start.map_or(m.start, |s| s.max(m.start));
    tracing::trace!(
        "text mapping {:#x}-{:#x}, code starts at {:#x}",
        m.start,
        m.end,
        start
    );

    let region = TextRegion::aligned(start, m.end);
    if !region.found {
        tracing::debug!(
            "text mapping {:#x}-{:#x} holds no whole huge page past {:#x}",
            m.start,
            m.end,
            start
        );
    }
    region
}

/// Locates the running binary's own text segment.
///
/// Never fails: an unreadable mapping table or an unresolvable executable
/// path yields a region with `found == false`.
pub fn locate_text_region() -> TextRegion {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            tracing::debug!("could not resolve own executable: {e}");
            return TextRegion::NOT_FOUND;
        }
    };

    let mappings = match Host.mappings() {
        Ok(mappings) => mappings,
        Err(e) => {
            tracing::debug!("could not read memory mappings: {e}");
            return TextRegion::NOT_FOUND;
        }
    };

    find_text_region(&mappings, &exe, Host.code_start())
}
