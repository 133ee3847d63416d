/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use clap::Parser;
use filsight::config::{keyword_reference, parse_export_file};
use filsight::run::{translate, TranslateOptions};

#[derive(Parser, Debug)]
#[command(
    about = "Translates a finite-element .fil results stream into an EnSight Gold case.",
    long_about = "Translates a finite-element .fil results stream into an EnSight Gold case.\n\
                  The export definition file declares which results are exported on which \
                  sets; see --keywords for the full reference. While a sibling .lck file \
                  exists the translator keeps waiting for the solver to append more data.",
    version
)]
struct Cli {
    /// The solver results file (.fil).
    fil: Option<PathBuf>,
    /// The export definition file.
    export_definition: Option<PathBuf>,
    /// Directory the case is written into.
    #[arg(long, default_value = ".")]
    outdir: PathBuf,
    /// Print the export-definition keyword reference and exit.
    #[arg(long)]
    keywords: bool,
}

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn request_stop(_signal: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

fn init_env_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

pub fn main() -> Result<()> {
    init_env_logger();
    let cli = Cli::parse();

    if cli.keywords {
        print!("{}", keyword_reference());
        return Ok(());
    }
    let (Some(fil), Some(export_definition)) = (cli.fil, cli.export_definition) else {
        bail!("usage: filsight RESULTS.fil EXPORTDEFINITION.inp (see --help)");
    };

    let config = parse_export_file(&export_definition)?;

    // a first Ctrl-C finishes up gracefully, leaving the case readable
    unsafe {
        libc::signal(libc::SIGINT, request_stop as usize);
    }

    let mut options = TranslateOptions::new(fil);
    options.output_dir = cli.outdir;
    translate(&config, &options, &STOP)?;
    Ok(())
}
