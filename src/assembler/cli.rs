// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

pub const VERSION: &str = "0.9";

const LONG_ABOUT: &str = "Two-pass Zilog Z80 assembler with expressions, includes and tape output.

The raw binary image is always written; use -o/--outfile to name it, otherwise
the input base with a .bin extension is used. A ZX Spectrum .tap container can
be written alongside it with -t/--tap. Label side-files let separate assemblies
share symbols: -l/--import-labels loads one before assembly, -e/--export-labels
writes one afterwards (add -d to include defines).";

#[derive(Parser, Debug)]
#[command(
    name = "zforge",
    version = VERSION,
    about = "Two-pass Zilog Z80 assembler with expressions, includes and tape output",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        value_name = "INFILE",
        long_help = "Root assembly source file. Included files are resolved relative to the file that names them."
    )]
    pub infile: PathBuf,
    #[arg(
        short = 'o',
        long = "outfile",
        value_name = "FILE",
        long_help = "Raw binary image output path. Defaults to the input base with a .bin extension."
    )]
    pub outfile: Option<PathBuf>,
    #[arg(
        short = 't',
        long = "tap",
        value_name = "FILE",
        long_help = "Also wrap the image in a ZX Spectrum .tap tape container at FILE."
    )]
    pub tap: Option<PathBuf>,
    #[arg(
        long = "tap-name",
        value_name = "NAME",
        long_help = "Program name stored in the tape header, up to 10 bytes, space padded. Defaults to the output base name."
    )]
    pub tap_name: Option<String>,
    #[arg(
        short = 'l',
        long = "import-labels",
        value_name = "FILE",
        long_help = "Load a label side-file before assembly: one `<name> <decimal-value>` pair per line."
    )]
    pub import_labels: Option<PathBuf>,
    #[arg(
        short = 'e',
        long = "export-labels",
        value_name = "FILE",
        long_help = "Write a label side-file after assembly, in definition order. Names starting with `_` and imported labels are skipped."
    )]
    pub export_labels: Option<PathBuf>,
    #[arg(
        short = 'd',
        long = "export-defs",
        action = ArgAction::SetTrue,
        requires = "export_labels",
        long_help = "Include defines (evaluated) in the label export. Requires -e/--export-labels."
    )]
    pub export_defs: bool,
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        long_help = "Raise log verbosity. Repeat for more detail: info, debug, trace. RUST_LOG overrides when set."
    )]
    pub verbose: u8,
}

impl Cli {
    /// Binary image output path, defaulting next to the input.
    pub fn output_path(&self) -> PathBuf {
        self.outfile
            .clone()
            .unwrap_or_else(|| self.infile.with_extension("bin"))
    }

    /// Program name for the tape header.
    pub fn tap_program_name(&self) -> String {
        if let Some(name) = &self.tap_name {
            return name.clone();
        }
        self.output_path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
