//! Configuration module.
//!
//! This module defines the command-line interface (CLI) of the `lpremap`
//! diagnostics tool using `clap`.

use clap::Parser;

/// Report on, and optionally apply, huge page remapping of this binary's text.
///
/// Prints whether the OS offers huge pages, which text region would be moved
/// and where the linker placed the relocation stub.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Move this binary's own text onto huge pages before reporting
    #[arg(long)]
    pub remap: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}
