//! Entry point for the lpremap diagnostics tool.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Install the `tracing` subscriber.
//! 3. Optionally move our own text onto huge pages, while still single-threaded.
//! 4. Report huge page support, the text region and the stub placement.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lpremap::config::Config;
use lpremap::image;
use lpremap::relocate::stub_address;
use lpremap::{is_large_pages_enabled, locate_text_region, map_static_code_to_large_pages};

fn main() -> Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Still single-threaded: the subscriber does not spawn anything.
    let remapped = config.remap.then(map_static_code_to_large_pages);

    println!(
        "huge pages: {}",
        if is_large_pages_enabled() { "enabled" } else { "disabled" }
    );

    let region = locate_text_region();
    if region.found {
        println!(
            "text region: {:#x}-{:#x} ({} huge pages)",
            region.from, region.to, region.page_count
        );
    } else {
        println!("text region: not found");
    }
    println!("relocation stub: {:#x}", stub_address());

    let exe = std::env::current_exe().context("failed to resolve own executable")?;
    let layout = image::inspect(&exe)?;
    match (&layout.stub, &layout.text) {
        (Some(stub), Some(text)) => println!(
            "linked layout: lpstub {:#x}-{:#x}, .text {:#x}-{:#x}{}",
            stub.start,
            stub.end,
            text.start,
            text.end,
            if layout.stub_precedes_text() {
                ""
            } else {
                " (stub after .text, relink with link/lpstub.ld)"
            }
        ),
        _ => println!("linked layout: lpstub or .text section missing"),
    }

    match remapped {
        Some(Ok(())) => println!("remap: done"),
        Some(Err(e)) => println!("remap: {e}"),
        None => {}
    }
    Ok(())
}
