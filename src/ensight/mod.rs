/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The EnSight Gold writer.
//!
//! A case is written chunk-wise while the results stream is still being
//! consumed: one binary trend file for the geometry, one per exported
//! variable, and a textual `.case` index tying them to their time sets.
//! Trend files are append-only; each committed time step adds one chunk
//! bracketed by `BEGIN TIME STEP` / `END TIME STEP` headers.

pub mod case;
pub mod exporter;
pub mod format;
pub mod geometry;
pub mod jobs;
pub mod variable;

use thiserror::Error;

/// Fatal export-time errors. Configuration problems surface earlier, as
/// [`crate::config::ConfigError`]; these arise only once results are being
/// matched against the planned jobs.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(
        "variable width {actual} in set {set} does not match the dimension {expected} of job \
         '{job}'; consider the fillMissingValuesTo option"
    )]
    ResultShapeMismatch {
        job: String,
        set: String,
        expected: usize,
        actual: usize,
    },
    #[error("no data for result {result} at {location}/{which} in set {set} for job '{job}'")]
    MissingResult {
        job: String,
        set: String,
        result: String,
        location: String,
        which: String,
    },
    #[error("job '{job}' references unknown set {set}")]
    UnknownSet { job: String, set: String },
    #[error("no cell shape mapping for element type {shape} in set {set}; add a defineElementType entry")]
    UnmappedShape { shape: String, set: String },
    #[error("expression '{expr}' failed for job '{job}' on set {set}: {source}")]
    ExpressionFailed {
        job: String,
        set: String,
        expr: String,
        source: crate::config::ExprError,
    },
}

/// Prelude module to import the whole writer surface.
pub mod prelude {
    pub use super::case::{ChunkWiseCase, TimeSet};
    pub use super::exporter::EnsightExporter;
    pub use super::geometry::{Geometry, IdMode, Part};
    pub use super::jobs::{
        plan_jobs, ExportJob, JobEntry, JobPlan, ResultAddress, SetType, ValueSlice,
    };
    pub use super::variable::{PerElementVariable, PerNodeVariable, VariableChunk};
    pub use super::ExportError;
}
