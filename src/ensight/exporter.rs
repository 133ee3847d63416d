/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The exporter façade: owns the case writer, the job plan, and the parts
//! built from the model's sets, and turns increment results into variable
//! chunks.
//!
//! Parts reference the model only through copied coordinates and label
//! arrays; the mapping between sets and part ids lives here, not on the
//! sets.

use std::path::PathBuf;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::info;

use super::case::ChunkWiseCase;
use super::geometry::{Geometry, IdMode, Part};
use super::jobs::{ExportJob, JobEntry, JobPlan, ResultAddress, SetType};
use super::variable::{
    per_element_kind, per_node_kind, PerElementPart, PerElementVariable, PerNodePart,
    PerNodeVariable,
};
use super::ExportError;
use crate::model::{ElementResults, ElementValues, ModelStore, NodeResults};

/// Chunk-wise exporter of one case.
pub struct EnsightExporter {
    case: ChunkWiseCase,
    plan: JobPlan,
    parts: IndexMap<(SetType, String), Part>,
}

impl EnsightExporter {
    pub fn new(
        directory: impl Into<PathBuf>,
        case_name: impl Into<String>,
        plan: JobPlan,
        discard_time_marks: bool,
    ) -> Result<Self> {
        Ok(Self {
            case: ChunkWiseCase::new(directory, case_name, discard_time_marks)?,
            plan,
            parts: IndexMap::new(),
        })
    }

    /// Builds the parts of all realized sets, element sets first, in
    /// definition order. Part ids count from one and stay stable across
    /// reruns of the same input.
    pub fn setup_model(&mut self, model: &ModelStore) -> Result<()> {
        let mut next_id = 1;
        for set in model.el_sets.values() {
            let part =
                Part::from_element_set(next_id, set, model, &self.plan.element_type_map)?;
            self.parts
                .insert((SetType::ElSet, set.name.clone()), part);
            next_id += 1;
        }
        for set in model.n_sets.values() {
            let part = Part::from_node_set(next_id, set, model, &self.plan.element_type_map)?;
            self.parts.insert((SetType::NSet, set.name.clone()), part);
            next_id += 1;
        }
        Ok(())
    }

    /// The part id assigned to a set, if the set produced one.
    pub fn part_id(&self, set_type: SetType, set_name: &str) -> Option<i32> {
        self.parts
            .get(&(set_type, set_name.to_string()))
            .map(|p| p.id)
    }

    /// Writes the one and only geometry chunk.
    pub fn export_geometry(&mut self) -> Result<()> {
        let parts: Vec<Part> = self.parts.values().cloned().collect();
        info!("writing geometry with {} parts", parts.len());
        let geometry = Geometry {
            name: "geometry",
            description: ("-", "-"),
            parts: &parts,
            node_ids: IdMode::Given,
            element_ids: IdMode::Given,
        };
        self.case.write_geometry_chunk(&geometry)
    }

    pub fn set_current_time(&mut self, time: f64) {
        self.case.set_current_time(time);
    }

    /// Writes one chunk per per-node job for the committed increment.
    pub fn export_per_node_variables(&mut self, node_results: &NodeResults) -> Result<()> {
        for job in self.plan.per_node_jobs.values() {
            let mut parts_out = Vec::new();
            for (set_name, entry) in &job.entries {
                let part = self
                    .parts
                    .get(&(entry.set_type, set_name.clone()))
                    .ok_or_else(|| ExportError::UnknownSet {
                        job: job.name.clone(),
                        set: set_name.clone(),
                    })?;
                let rows = assemble_node_rows(job, entry, part, node_results)?;
                parts_out.push(PerNodePart {
                    part_id: part.id,
                    rows,
                });
            }
            if !parts_out.is_empty() || job.write_empty_time_steps {
                let kind = per_node_kind(job.dimensions)
                    .with_context(|| format!("job '{}' has no variable kind", job.name))?;
                let variable = PerNodeVariable {
                    name: job.name.clone(),
                    dimensions: job.dimensions,
                    kind,
                    parts: parts_out,
                };
                self.case.write_variable_chunk(&variable, job.time_set_id)?;
            }
        }
        Ok(())
    }

    /// Writes one chunk per per-element job for the committed increment.
    pub fn export_per_element_variables(
        &mut self,
        element_results: &ElementResults,
    ) -> Result<()> {
        for job in self.plan.per_element_jobs.values() {
            let mut parts_out = Vec::new();
            for (set_name, entry) in &job.entries {
                let part = self
                    .parts
                    .get(&(SetType::ElSet, set_name.clone()))
                    .ok_or_else(|| ExportError::UnknownSet {
                        job: job.name.clone(),
                        set: set_name.clone(),
                    })?;
                let blocks = assemble_element_blocks(job, entry, part, element_results)?;
                parts_out.push(PerElementPart {
                    part_id: part.id,
                    blocks,
                });
            }
            if !parts_out.is_empty() || job.write_empty_time_steps {
                let kind = per_element_kind(job.dimensions)
                    .with_context(|| format!("job '{}' has no variable kind", job.name))?;
                let variable = PerElementVariable {
                    name: job.name.clone(),
                    dimensions: job.dimensions,
                    kind,
                    parts: parts_out,
                };
                self.case.write_variable_chunk(&variable, job.time_set_id)?;
            }
        }
        Ok(())
    }

    /// Rewrites the `.case` index without closing any trend file.
    pub fn write_case_index(&mut self) -> Result<()> {
        self.case.write_case_index()
    }

    /// Flushes and closes the case for good.
    pub fn finalize(&mut self) -> Result<()> {
        self.case.finalize(true)
    }
}

/// Collects, transforms and validates the per-node rows of one job entry,
/// in the order slice, expression, fill.
fn assemble_node_rows(
    job: &ExportJob,
    entry: &JobEntry,
    part: &Part,
    node_results: &NodeResults,
) -> Result<Vec<Vec<f64>>> {
    let table = node_results.get(&entry.result);
    let mut rows: Vec<Option<Vec<f64>>> = part
        .node_labels
        .iter()
        .map(|label| table.and_then(|t| t.get(label)).cloned())
        .collect();

    if let Some(slice) = &entry.slice {
        for row in rows.iter_mut().flatten() {
            *row = slice.apply(row);
        }
    }
    if let Some(function) = &entry.function {
        for row in rows.iter_mut().flatten() {
            *row = function
                .eval(row)
                .map_err(|source| ExportError::ExpressionFailed {
                    job: job.name.clone(),
                    set: entry.set_name.clone(),
                    expr: function.src().to_string(),
                    source,
                })?;
        }
    }
    if let Some(fill) = entry.fill_missing_values_to {
        for row in rows.iter_mut() {
            match row {
                Some(values) if values.len() < job.dimensions => {
                    values.resize(job.dimensions, fill);
                }
                Some(_) => {}
                None => *row = Some(vec![fill; job.dimensions]),
            }
        }
    }

    rows.into_iter()
        .map(|row| {
            let values = row.unwrap_or_default();
            if values.len() != job.dimensions {
                return Err(ExportError::ResultShapeMismatch {
                    job: job.name.clone(),
                    set: entry.set_name.clone(),
                    expected: job.dimensions,
                    actual: values.len(),
                }
                .into());
            }
            Ok(values)
        })
        .collect()
}

/// Collects, transforms and validates the per-element rows of one job
/// entry, block by cell block, in the order offset, slice, expression.
fn assemble_element_blocks(
    job: &ExportJob,
    entry: &JobEntry,
    part: &Part,
    element_results: &ElementResults,
) -> Result<Vec<(String, Vec<Vec<f64>>)>> {
    let address = entry.address.as_ref().ok_or_else(|| {
        ExportError::MissingResult {
            job: job.name.clone(),
            set: entry.set_name.clone(),
            result: entry.result.clone(),
            location: "?".to_string(),
            which: "?".to_string(),
        }
    })?;
    let missing = || ExportError::MissingResult {
        job: job.name.clone(),
        set: entry.set_name.clone(),
        result: entry.result.clone(),
        location: address.location().to_string(),
        which: address.which(),
    };

    let set_results = element_results
        .get(&entry.result)
        .and_then(|r| r.get(&entry.set_name));

    let mut blocks = Vec::new();
    let mut total_rows = 0;
    for (shape, cell) in &part.cells {
        let shape_results = set_results.and_then(|s| s.get(shape)).ok_or_else(missing)?;
        let mut rows = Vec::with_capacity(cell.element_labels.len());
        for element_label in &cell.element_labels {
            let values = shape_results
                .get(element_label)
                .and_then(|v| lookup(v, address))
                .ok_or_else(missing)?;
            let mut row = values.clone();
            if let Some(offset) = entry.offset {
                row = row.split_off(offset.min(row.len()));
            }
            if let Some(slice) = &entry.slice {
                row = slice.apply(&row);
            }
            if let Some(function) = &entry.function {
                row = function
                    .eval(&row)
                    .map_err(|source| ExportError::ExpressionFailed {
                        job: job.name.clone(),
                        set: entry.set_name.clone(),
                        expr: function.src().to_string(),
                        source,
                    })?;
            }
            if row.len() != job.dimensions {
                return Err(ExportError::ResultShapeMismatch {
                    job: job.name.clone(),
                    set: entry.set_name.clone(),
                    expected: job.dimensions,
                    actual: row.len(),
                }
                .into());
            }
            rows.push(row);
        }
        total_rows += rows.len();
        blocks.push((cell.cell_type.clone(), rows));
    }
    if total_rows == 0 {
        return Err(missing().into());
    }
    Ok(blocks)
}

fn lookup<'a>(values: &'a ElementValues, address: &ResultAddress) -> Option<&'a Vec<f64>> {
    match address {
        ResultAddress::QuadraturePoint(qp) => values.qps.get(qp),
        ResultAddress::Computed(key) => values.computed.get(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_export_file;
    use crate::ensight::jobs::plan_jobs;
    use crate::model::{Increment, SetDefinition};

    fn bar_model() -> ModelStore {
        let mut model = ModelStore::new();
        model.add_node(1, [0.0, 0.0, 0.0]);
        model.add_node(2, [1.0, 0.0, 0.0]);
        model.add_element(10, "B21".into(), vec![1, 2]);
        model.commit(&[]);
        model
    }

    fn exporter_for(dir: &std::path::Path, content: &str) -> EnsightExporter {
        let path = dir.join("export.inp");
        std::fs::write(&path, content).unwrap();
        let plan = plan_jobs(&parse_export_file(&path).unwrap()).unwrap();
        let mut exporter = EnsightExporter::new(dir, "job", plan, false).unwrap();
        exporter.setup_model(&bar_model()).unwrap();
        exporter
    }

    #[test]
    fn part_ids_count_from_one_in_definition_order() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = exporter_for(
            dir.path(),
            "*defineElementType, element=B21, shape=bar2\n",
        );
        assert_eq!(exporter.part_id(SetType::ElSet, "ALL"), Some(1));
    }

    #[test]
    fn shape_mismatch_without_fill_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = exporter_for(
            dir.path(),
            "*defineElementType, element=B21, shape=bar2\n\
             *ensightPerNodeVariableJob, name=U, dimensions=3\n\
             *ensightPerNodeVariableJobEntry, job=U, set=ALL, result=U\n",
        );
        let mut increment = Increment::default();
        increment.set_node_values("U", 1, vec![0.0, 0.0]);
        increment.set_node_values("U", 2, vec![0.5, 0.0]);
        let err = exporter
            .export_per_node_variables(&increment.node_results)
            .expect_err("length 2 against dimension 3");
        let err = err.downcast::<ExportError>().unwrap();
        match err {
            ExportError::ResultShapeMismatch {
                job,
                set,
                expected,
                actual,
            } => {
                assert_eq!(job, "U");
                assert_eq!(set, "ALL");
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn fill_missing_pads_and_substitutes() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = exporter_for(
            dir.path(),
            "*defineElementType, element=B21, shape=bar2\n\
             *ensightPerNodeVariableJob, name=U, dimensions=3\n\
             *ensightPerNodeVariableJobEntry, job=U, set=ALL, result=U, fillMissingValuesTo=7.0\n",
        );
        let mut increment = Increment::default();
        increment.set_node_values("U", 1, vec![0.5]);
        // node 2 has no result at all
        exporter
            .export_per_node_variables(&increment.node_results)
            .unwrap();
        // chunk layout is exercised in the case tests; here it must just
        // not error and pad to [0.5, 7, 7] / [7, 7, 7]
    }

    #[test]
    fn missing_per_element_result_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = exporter_for(
            dir.path(),
            "*defineElementType, element=B21, shape=bar2\n\
             *ensightPerElementVariableJob, name=S1, dimensions=1\n\
             *ensightPerElementVariableJobEntry, job=S1, set=ALL, result=S, location=qps, which=1\n",
        );
        let increment = Increment::default();
        let err = exporter
            .export_per_element_variables(&increment.element_results)
            .expect_err("no S stored");
        let err = err.downcast::<ExportError>().unwrap();
        assert!(matches!(err, ExportError::MissingResult { .. }));
    }
}
