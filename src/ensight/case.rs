/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The chunk-wise case writer.
//!
//! Trend files are opened on first use and only ever appended to; the
//! `.case` index is rewritten from scratch whenever asked, so a reader
//! always finds an index consistent with the chunks flushed so far.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;

use super::format::write_c80;
use super::geometry::Geometry;
use super::variable::VariableChunk;

/// An ordered list of time values shared by a group of trends.
#[derive(Debug, Clone)]
pub struct TimeSet {
    pub id: usize,
    pub values: Vec<f64>,
    pub start_number: usize,
    pub increment: usize,
}

impl TimeSet {
    fn new(id: usize) -> Self {
        Self {
            id,
            values: Vec::new(),
            start_number: 0,
            increment: 1,
        }
    }
}

#[derive(Debug)]
struct VariableTrend {
    time_set: usize,
    kind: &'static str,
    file_name: String,
}

/// A case under construction: the trend files of one geometry and any
/// number of variables, plus the time sets tying them together.
#[derive(Debug)]
pub struct ChunkWiseCase {
    directory: PathBuf,
    case_name: String,
    time_sets: IndexMap<usize, TimeSet>,
    /// geometry name -> trend file name
    geometry_trends: IndexMap<String, String>,
    /// variable name -> trend bookkeeping
    variable_trends: IndexMap<String, VariableTrend>,
    /// open trend files by file name
    files: IndexMap<String, BufWriter<File>>,
    current_time: f64,
    discard_time_marks: bool,
}

impl ChunkWiseCase {
    pub fn new(
        directory: impl Into<PathBuf>,
        case_name: impl Into<String>,
        discard_time_marks: bool,
    ) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("Cannot create output directory {}", directory.display()))?;
        Ok(Self {
            directory,
            case_name: case_name.into(),
            time_sets: IndexMap::new(),
            geometry_trends: IndexMap::new(),
            variable_trends: IndexMap::new(),
            files: IndexMap::new(),
            current_time: 0.0,
            discard_time_marks,
        })
    }

    /// Sets the time value stamped onto subsequently written chunks.
    pub fn set_current_time(&mut self, time: f64) {
        self.current_time = time;
    }

    /// The time sets recorded so far.
    pub fn time_sets(&self) -> impl Iterator<Item = &TimeSet> {
        self.time_sets.values()
    }

    fn trend_file(&mut self, file_name: &str) -> Result<&mut BufWriter<File>> {
        if !self.files.contains_key(file_name) {
            let path = self.directory.join(file_name);
            let file = File::create(&path)
                .with_context(|| format!("Cannot create trend file {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_c80(&mut writer, "C Binary")
                .with_context(|| format!("Cannot write header of {}", path.display()))?;
            self.files.insert(file_name.to_string(), writer);
        }
        // just inserted if it was missing
        self.files
            .get_mut(file_name)
            .context("trend file vanished from the handle table")
    }

    /// Appends the current time to a time set, once per distinct value:
    /// repeated commits at the same time are a no-op for the set.
    fn mark_time(&mut self, time_set_id: usize) {
        let time = self.current_time;
        let set = self
            .time_sets
            .entry(time_set_id)
            .or_insert_with(|| TimeSet::new(time_set_id));
        if set.values.last().map_or(true, |last| time > *last) {
            set.values.push(time);
        }
    }

    /// Appends one geometry chunk to its trend, creating the trend on
    /// first use. The geometry trend carries no time set.
    pub fn write_geometry_chunk(&mut self, geometry: &Geometry<'_>) -> Result<()> {
        let file_name = format!("{}{}.geo", self.case_name, geometry.name);
        self.geometry_trends
            .entry(geometry.name.to_string())
            .or_insert_with(|| file_name.clone());
        let writer = self.trend_file(&file_name)?;
        write_c80(writer, "BEGIN TIME STEP")?;
        geometry.write_chunk(writer)?;
        write_c80(writer, "END TIME STEP")?;
        Ok(())
    }

    /// Appends one variable chunk to its trend, creating the trend on
    /// first use and stamping the current time onto the job's time set.
    pub fn write_variable_chunk(
        &mut self,
        variable: &dyn VariableChunk,
        time_set_id: usize,
    ) -> Result<()> {
        self.mark_time(time_set_id);
        let file_name = format!("{}{}.var", self.case_name, variable.name());
        if !self.variable_trends.contains_key(variable.name()) {
            self.variable_trends.insert(
                variable.name().to_string(),
                VariableTrend {
                    time_set: time_set_id,
                    kind: variable.kind(),
                    file_name: file_name.clone(),
                },
            );
        }
        let writer = self.trend_file(&file_name)?;
        write_c80(writer, "BEGIN TIME STEP")?;
        variable.write_chunk(writer)?;
        write_c80(writer, "END TIME STEP")?;
        Ok(())
    }

    /// Rewrites the `.case` index to match everything flushed so far.
    pub fn write_case_index(&mut self) -> Result<()> {
        let mut text = String::new();
        let _ = writeln!(text, "FORMAT");
        let _ = writeln!(text, "type: ensight gold");

        let _ = writeln!(text, "TIME");
        for set in self.time_sets.values() {
            let _ = writeln!(text, "time set: {}", set.id);
            let _ = writeln!(text, "number of steps: {}", set.values.len());
            let _ = writeln!(text, "filename start number: {}", set.start_number);
            let _ = writeln!(text, "filename increment: {}", set.increment);
            let _ = writeln!(text, "time values:");
            let values = if self.discard_time_marks {
                (0..set.values.len()).map(|i| i.to_string()).join("\n")
            } else {
                set.values.iter().map(|v| v.to_string()).join("\n")
            };
            if !values.is_empty() {
                let _ = writeln!(text, "{}", values);
            }
        }

        let _ = writeln!(text, "FILE");
        for set in self.time_sets.values() {
            let _ = writeln!(text, "file set: {}", set.id);
            let _ = writeln!(text, "number of steps: {}", set.values.len());
        }

        let _ = writeln!(text, "GEOMETRY");
        for file_name in self.geometry_trends.values() {
            let _ = writeln!(text, "model: {}", file_name);
        }

        let _ = writeln!(text, "VARIABLE");
        for (name, trend) in &self.variable_trends {
            let _ = writeln!(
                text,
                "{}: {} {} {} {}",
                trend.kind, trend.time_set, trend.time_set, name, trend.file_name
            );
        }

        let path = self.directory.join(format!("{}.case", self.case_name));
        std::fs::write(&path, text)
            .with_context(|| format!("Cannot write case index {}", path.display()))?;
        debug!("rewrote case index {}", path.display());
        Ok(())
    }

    /// Flushes everything; with `close_handles` the trend files are closed
    /// for good and the case is complete.
    pub fn finalize(&mut self, close_handles: bool) -> Result<()> {
        self.write_case_index()?;
        for (name, writer) in &mut self.files {
            writer
                .flush()
                .with_context(|| format!("Cannot flush trend file {}", name))?;
        }
        if close_handles {
            self.files.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensight::variable::{per_node_kind, PerNodePart, PerNodeVariable};

    fn variable(name: &str) -> PerNodeVariable {
        PerNodeVariable {
            name: name.into(),
            dimensions: 1,
            kind: per_node_kind(1).unwrap(),
            parts: vec![PerNodePart {
                part_id: 1,
                rows: vec![vec![1.0]],
            }],
        }
    }

    #[test]
    fn duplicate_times_collapse_in_the_time_set() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut case = ChunkWiseCase::new(dir.path(), "job", false)?;
        let var = variable("U");
        case.set_current_time(0.1);
        case.write_variable_chunk(&var, 1)?;
        case.write_variable_chunk(&var, 1)?;
        case.set_current_time(0.2);
        case.write_variable_chunk(&var, 1)?;
        case.finalize(true)?;

        let set = case.time_sets().next().expect("one time set");
        assert_eq!(set.values, vec![0.1, 0.2]);
        Ok(())
    }

    #[test]
    fn case_index_lists_sections_and_trends() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut case = ChunkWiseCase::new(dir.path(), "job", false)?;
        let var = variable("U");
        case.set_current_time(0.5);
        case.write_variable_chunk(&var, 1)?;
        case.finalize(true)?;

        let text = std::fs::read_to_string(dir.path().join("job.case"))?;
        assert!(text.contains("FORMAT\ntype: ensight gold"));
        assert!(text.contains("time set: 1"));
        assert!(text.contains("number of steps: 1"));
        assert!(text.contains("scalar per node: 1 1 U jobU.var"));
        assert!(dir.path().join("jobU.var").exists());
        Ok(())
    }

    #[test]
    fn trend_files_start_with_the_binary_marker() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut case = ChunkWiseCase::new(dir.path(), "job", false)?;
        case.set_current_time(0.1);
        case.write_variable_chunk(&variable("U"), 1)?;
        case.finalize(true)?;

        let bytes = std::fs::read(dir.path().join("jobU.var"))?;
        assert_eq!(&bytes[..8], b"C Binary");
        assert_eq!(&bytes[80..95], b"BEGIN TIME STEP");
        Ok(())
    }
}
