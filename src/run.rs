/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The batch loop: feeds the record scanner from the batch reader,
//! drives the engine, and handles the write frontier of a still-running
//! solver.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use dsi_progress_logger::prelude::*;
use log::{error, info, warn};

use crate::config::ExportConfig;
use crate::engine::ExportEngine;
use crate::fil::{lock_file_path, BatchReader, RecordScanner, ScanStep};

/// How a translation run is wired up.
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    /// The solver results file.
    pub fil: PathBuf,
    /// Directory the case is written into.
    pub output_dir: PathBuf,
    /// Case name; trend files are prefixed with it.
    pub case_name: String,
    /// Wait between polls at the end of a locked, still-growing file.
    pub lock_poll: Duration,
    /// Wait before re-reading a batch that ended in a truncated record
    /// while the lock file was present.
    pub truncation_poll: Duration,
}

impl TranslateOptions {
    /// Defaults for a results file: case named after the file stem,
    /// output next to the current directory, solver-friendly poll times.
    pub fn new(fil: impl Into<PathBuf>) -> Self {
        let fil = fil.into();
        let case_name = fil
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "case".to_string());
        Self {
            fil,
            output_dir: PathBuf::from("."),
            case_name,
            lock_poll: Duration::from_secs(10),
            truncation_poll: Duration::from_secs(5),
        }
    }
}

/// Counts reported after a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub nodes: usize,
    pub elements: usize,
    pub element_sets: usize,
    pub node_sets: usize,
    pub increments: usize,
}

/// Sleeps in short slices so a stop request interrupts the wait.
fn sleep_interruptible(total: Duration, stop: &AtomicBool) {
    let slice = Duration::from_millis(100);
    let mut remaining = total;
    while !stop.load(Ordering::Relaxed) && !remaining.is_zero() {
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

/// Translates one results file into an EnSight case.
///
/// The loop ends cleanly at the end of the stream, on a stop request, or
/// at a truncated record with no lock file present; all increments
/// committed by then are on disk and the `.case` index matches them. A
/// fatal export or configuration error also finalizes the case before it
/// is reported.
pub fn translate(
    config: &ExportConfig,
    options: &TranslateOptions,
    stop: &AtomicBool,
) -> Result<Summary> {
    let mut engine = ExportEngine::new(config, &options.output_dir, &options.case_name)?;
    let result = run_loop(options, stop, &mut engine);
    // Even after an error the committed time steps stay valid; the index
    // must reflect them.
    let finalized = engine.finalize();
    result?;
    finalized?;

    let model = engine.model();
    let summary = Summary {
        nodes: model.nodes.len(),
        elements: model.element_definitions.len(),
        element_sets: model.el_sets.len(),
        node_sets: model.n_sets.len(),
        increments: engine.n_increments(),
    };
    info!(
        "finished: {} nodes, {} elements, {} element sets, {} node sets, {} increments",
        summary.nodes, summary.elements, summary.element_sets, summary.node_sets, summary.increments
    );
    for (set, shape, count) in crate::engine::set_summary(model) {
        info!("  {:<16} {:<8} {:>10} elements", set, shape, count);
    }
    Ok(summary)
}

fn run_loop(
    options: &TranslateOptions,
    stop: &AtomicBool,
    engine: &mut ExportEngine,
) -> Result<()> {
    let reader = BatchReader::new(&options.fil);
    let lock_file = lock_file_path(&options.fil);
    let file_size = reader
        .file_size()
        .with_context(|| format!("Cannot open results file {}", options.fil.display()))?;
    info!(
        "translating {} ({} bytes) into {}/{}.case",
        options.fil.display(),
        file_size,
        options.output_dir.display(),
        options.case_name
    );

    let mut pl = ProgressLogger::default();
    pl.item_name("record");
    pl.start("Parsing records...");

    let mut file_idx: u64 = 0;
    let mut word_idx: usize = 0;

    'batches: while !stop.load(Ordering::Relaxed) {
        let batch = match reader.read(file_idx)? {
            Some(batch) => batch,
            None => {
                // nothing (new) to read: either the solver is still
                // running, or we are done
                if lock_file.exists() {
                    info!("lock file present, waiting for more result data...");
                    sleep_interruptible(options.lock_poll, stop);
                    continue 'batches;
                }
                break 'batches;
            }
        };

        let mut scanner = RecordScanner::new(&batch.words, word_idx);
        loop {
            match scanner.step() {
                ScanStep::Record(record) => {
                    engine.process_record(&record).map_err(|e| {
                        error!("fatal while processing a type-{} record", record.rec_type);
                        e
                    })?;
                    pl.light_update();
                }
                ScanStep::Exhausted => {
                    word_idx = 0;
                    file_idx = batch.next_file_idx;
                    continue 'batches;
                }
                ScanStep::ZeroLength => {
                    if lock_file.exists() {
                        info!("write frontier reached, waiting for more result data...");
                        word_idx = scanner.word_idx();
                        sleep_interruptible(options.truncation_poll, stop);
                        continue 'batches;
                    }
                    warn!("zero-length record: the solver run was likely aborted");
                    break 'batches;
                }
                ScanStep::Straddles {
                    bytes_progressed,
                    resume_word_idx,
                } => {
                    if bytes_progressed == 0 {
                        // the straddling record is the write frontier
                        if lock_file.exists() {
                            info!("write frontier reached, waiting for more result data...");
                            word_idx = scanner.word_idx();
                            sleep_interruptible(options.truncation_poll, stop);
                            continue 'batches;
                        }
                        warn!("truncated trailing record: the solver run was likely aborted");
                        break 'batches;
                    }
                    file_idx += bytes_progressed;
                    word_idx = resume_word_idx;
                    continue 'batches;
                }
            }
        }
    }

    pl.done();
    if stop.load(Ordering::Relaxed) {
        info!("stop requested, finishing up");
    }
    Ok(())
}
