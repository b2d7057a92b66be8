//! Thin CLI surface: a single entry point taking a C file path.
//!
//! The analyzer only has one real operation, so there is no `Commands`
//! subcommand enum here — just the one input file plus the handful of
//! output-shaping flags the pipeline needs, including the optional
//! GraphML sink.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "dvfs-cfg-analyzer")]
#[command(about = "WCEC/RWCEC analyzer and DVFS code synthesizer for C programs")]
#[command(version)]
pub struct Cli {
    /// C source file to analyze.
    pub input: PathBuf,

    /// Where to write the DVFS-aware source. Defaults to `<stem>_dvfs.c`
    /// next to the input; pass an empty string to write to stdout instead.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Explicit config file (read if present, else written with defaults).
    /// Falls back to `./dvfs-analyzer.toml`, then built-in defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Also emit a GraphML dump of the annotated CFG to this path.
    #[arg(long)]
    pub graphml: Option<PathBuf>,

    /// Print the `show()` text dump of the CFG instead of synthesizing
    /// DVFS code (used for round-trip `.cfg` dump comparisons).
    #[arg(long)]
    pub dump_cfg: bool,
}
