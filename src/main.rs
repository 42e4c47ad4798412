// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Binary entry point: argument parsing, logging setup and output writing.

use std::fs::{self, File};
use std::io::BufWriter;
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use zforge::assembler::assemble_file;
use zforge::assembler::cli::Cli;
use zforge::tap;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(err) = run(&cli) {
        eprintln!("ERROR: {err:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "off",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let assembly = assemble_file(&cli.infile, cli.import_labels.as_deref())?;

    let out_path = cli.output_path();
    fs::write(&out_path, &assembly.image)
        .with_context(|| format!("writing {}", out_path.display()))?;

    if let Some(tap_path) = &cli.tap {
        let container = tap::wrap(&cli.tap_program_name(), &assembly.image);
        fs::write(tap_path, container)
            .with_context(|| format!("writing {}", tap_path.display()))?;
    }

    if let Some(export_path) = &cli.export_labels {
        let file = File::create(export_path)
            .with_context(|| format!("creating {}", export_path.display()))?;
        assembly.write_exports(BufWriter::new(file), cli.export_defs)?;
    }

    Ok(())
}
