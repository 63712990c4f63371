//! Binary image inspection.
//!
//! Reads an ELF file from disk to report where the linker placed the
//! `lpstub` section relative to `.text`. The relocation only goes ahead on
//! Linux when the stub sits below the code, which takes the `link/lpstub.ld`
//! script; this tells a user whether their binary was linked with it.

use anyhow::{Context, Result};
use memmap2::Mmap;
use object::{Object, ObjectSection};
use std::fs::File;
use std::ops::Range;
use std::path::Path;

/// Link-time addresses of the sections that matter for remapping.
///
/// Addresses are as linked; position-independent executables are shifted
/// by their load bias at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubLayout {
    pub stub: Option<Range<u64>>,
    pub text: Option<Range<u64>>,
}

impl StubLayout {
    /// Whether the stub section ends before `.text` starts.
    pub fn stub_precedes_text(&self) -> bool {
        match (&self.stub, &self.text) {
            (Some(stub), Some(text)) => stub.end <= text.start,
            _ => false,
        }
    }
}

fn section_range(obj: &object::File, name: &str) -> Option<Range<u64>> {
    let section = obj.section_by_name(name)?;
    let start = section.address();
    Some(start..start + section.size())
}

/// Inspects the ELF image at `path`.
pub fn inspect(path: &Path) -> Result<StubLayout> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file)? };
    let obj = object::File::parse(&*mmap)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let layout = StubLayout {
        stub: section_range(&obj, "lpstub"),
        text: section_range(&obj, ".text"),
    };
    tracing::debug!("{}: {:?}", path.display(), layout);
    Ok(layout)
}
