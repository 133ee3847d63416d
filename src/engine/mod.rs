/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The extraction engine: interprets the record stream as commands against
//! the model store and drives the exporter at increment boundaries.
//!
//! The engine is a small state machine. Records before the first
//! start-increment record describe the model; the end-increment record
//! closing that phase freezes the model and emits the geometry. Every
//! later increment is accumulated, post-processed and written out the
//! moment its end-increment record arrives, then dropped.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::config::{ConfigError, ExportConfig};
use crate::ensight::jobs::plan_jobs;
use crate::ensight::prelude::EnsightExporter;
use crate::fil::{a8_string, f64_values, i64_values, Record};
use crate::model::{Increment, ModelStore, SetDefinition, ALL_SET};

/// Unpacks a UEL SDV vector into per-quadrature-point vectors.
#[derive(Debug, Clone)]
pub struct SdvToQpJob {
    pub set_name: String,
    pub destination: String,
    pub qp_count: usize,
    pub qp_distance: usize,
    pub qp_initial_offset: usize,
}

/// Averages an elemental result over its quadrature points.
#[derive(Debug, Clone)]
pub struct QpAverageJob {
    pub set_name: String,
    pub result: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    ModelSetup,
    SurfaceDefinition,
    IncrementParsing,
}

/// The mutable context the flat record stream relies on: element output
/// records only carry values, their address comes from the preceding
/// output-definition and element-header records.
#[derive(Debug)]
struct ParseCursor {
    set_name: String,
    shape: String,
    element: i64,
    ipt: i32,
}

impl Default for ParseCursor {
    fn default() -> Self {
        Self {
            set_name: ALL_SET.to_string(),
            shape: String::new(),
            element: 0,
            ipt: 1,
        }
    }
}

const ENERGY_NAMES: [&str; 18] = [
    "total kinetic energy (ALLKE)",
    "total recoverable strain energy (ALLSE)",
    "total external work (ALLWK)",
    "total plastic dissipation (ALLPD)",
    "total viscoelastic dissipation (ALLCD)",
    "total viscous dissipation (ALLVD)",
    "total loss of kinetic energy at impacts (ALLKL)",
    "total artificial strain energy (ALLAE)",
    "total distortion control dissipation energy (ALLDC)",
    "total electrostatic energy (ALLEE)",
    "total strain energy (ALLIE)",
    "total energy balance (ETOTAL)",
    "total energy dissipated through frictional effects (ALLFD)",
    "total electrical energy dissipated in conductors (ALLJD)",
    "percent change in mass (DMASS)",
    "total damage dissipation (ALLDMD)",
    "internal heat energy (ALLIHE)",
    "external heat energy (ALLHF)",
];

/// The stateful translator from decoded records to a written case.
pub struct ExportEngine {
    model: ModelStore,
    exporter: EnsightExporter,
    state: ParseState,
    cursor: ParseCursor,
    current: Option<Increment>,
    sdv_to_qp_jobs: Vec<SdvToQpJob>,
    qp_average_jobs: Vec<QpAverageJob>,
    ignore_last_nodes: HashMap<String, usize>,
    substitute_sets: Vec<SetDefinition>,
    n_increments: usize,
    time_history: Vec<f64>,
}

impl ExportEngine {
    /// Plans the export jobs and opens the case. Fails on any
    /// configuration problem, before the results file is touched.
    pub fn new(
        config: &ExportConfig,
        output_dir: impl AsRef<Path>,
        case_name: &str,
    ) -> Result<Self> {
        let plan = plan_jobs(config)?;
        let ignore_last_nodes = plan.ignore_last_nodes.clone();
        let exporter = EnsightExporter::new(
            output_dir.as_ref(),
            case_name,
            plan,
            config.discard_time_marks(),
        )?;

        let mut sdv_to_qp_jobs = Vec::new();
        for entry in config.entries("*UELSDVToQuadraturePoints") {
            sdv_to_qp_jobs.push(SdvToQpJob {
                set_name: entry.require_str("set")?.to_string(),
                destination: entry.require_str("destination")?.to_string(),
                qp_count: entry.require_int("qpCount")?.max(0) as usize,
                qp_distance: entry.require_int("qpDistance")?.max(0) as usize,
                qp_initial_offset: entry.require_int("qpInitialOffset")?.max(0) as usize,
            });
        }

        let mut qp_average_jobs = Vec::new();
        for entry in config.entries("*computeAverageOverQuadraturePoints") {
            qp_average_jobs.push(QpAverageJob {
                set_name: entry.require_str("set")?.to_string(),
                result: entry.require_str("result")?.to_string(),
            });
        }

        let mut substitute_sets = Vec::new();
        for entry in config.entries("*substituteElSet") {
            let name = entry.require_str("elSet")?.to_string();
            let mut labels = Vec::new();
            for line in &entry.data {
                for token in line {
                    labels.push(token.parse::<i64>().map_err(|_| {
                        ConfigError::InvalidValue {
                            keyword: "substituteElSet".to_string(),
                            option: "data".to_string(),
                            value: token.clone(),
                            expected: "integer",
                        }
                    })?);
                }
            }
            substitute_sets.push(SetDefinition::new(name, labels));
        }

        Ok(Self {
            model: ModelStore::new(),
            exporter,
            state: ParseState::ModelSetup,
            cursor: ParseCursor::default(),
            current: None,
            sdv_to_qp_jobs,
            qp_average_jobs,
            ignore_last_nodes,
            substitute_sets,
            n_increments: 0,
            time_history: Vec::new(),
        })
    }

    /// Applies one record to the model or the current increment. Errors
    /// are fatal; everything recoverable is logged and skipped.
    pub fn process_record(&mut self, record: &Record<'_>) -> Result<()> {
        let body = record.body;
        match record.rec_type {
            // element header: the context of following element outputs
            1 => {
                if body.len() >= 2 {
                    self.cursor.element = body[0].as_flag() as i64;
                    self.cursor.ipt = body[1].as_flag();
                }
            }
            5 => self.handle_element_output(body, "SDV"),
            11 => self.handle_element_output(body, "S"),
            21 => self.handle_element_output(body, "E"),
            22 => self.handle_element_output(body, "PE"),
            85 => {} // local coordinate system
            89 => self.handle_element_output(body, "LE"),
            101 => self.handle_node_output(body, "U"),
            102 => self.handle_node_output(body, "V"),
            103 => self.handle_node_output(body, "A"),
            104 => self.handle_node_output(body, "RF"),
            108 => self.handle_node_output(body, "POR"),
            201 => self.handle_node_output(body, "NT"),
            1501 => self.state = ParseState::SurfaceDefinition,
            1502 => {} // surface facet
            1900 => {
                if body.len() >= 2 {
                    let label = body[0].as_i64();
                    let shape = body[1].as_a8();
                    let mut nodes = i64_values(&body[2..]);
                    if let Some(&drop) = self.ignore_last_nodes.get(&shape) {
                        nodes.truncate(nodes.len().saturating_sub(drop));
                    }
                    self.model.add_element(label, shape, nodes);
                }
            }
            1901 => {
                if !body.is_empty() {
                    let label = body[0].as_i64();
                    let mut coords = [0.0; 3];
                    for (slot, word) in coords.iter_mut().zip(&body[1..]) {
                        *slot = word.as_f64();
                    }
                    self.model.add_node(label, coords);
                }
            }
            1902 => {} // active dof
            1911 => self.handle_output_definition(body),
            1921 => self.report_heading(body),
            1922 => {} // heading continuation
            1931 => {
                if !body.is_empty() {
                    let name = self.model.resolve_set_name(&body[0].as_a8(), ALL_SET);
                    self.cursor.set_name = name.clone();
                    self.model.define_n_set(name, i64_values(&body[1..]));
                }
            }
            1932 => {
                let labels = i64_values(body);
                self.model.append_to_n_set(&self.cursor.set_name, &labels);
            }
            1933 => {
                if !body.is_empty() {
                    let name = self.model.resolve_set_name(&body[0].as_a8(), ALL_SET);
                    self.cursor.set_name = name.clone();
                    self.model.define_el_set(name, i64_values(&body[1..]));
                }
            }
            1934 => {
                let labels = i64_values(body);
                self.model.append_to_el_set(&self.cursor.set_name, &labels);
            }
            1940 => {
                if body.len() >= 2 {
                    let key = body[0].as_flag();
                    self.model.add_label_cross_reference(key, a8_string(&body[1..]));
                }
            }
            1999 => {
                for (name, value) in ENERGY_NAMES.iter().zip(f64_values(body)) {
                    info!("{:<56}{:>14.5e}", name, value);
                }
            }
            2000 => self.start_increment(body),
            2001 => self.finish_increment()?,
            other => {
                warn!("unknown record: {:>6} of length {:>4}", other, record.length);
            }
        }
        Ok(())
    }

    fn handle_element_output(&mut self, body: &[crate::fil::Word], result: &str) {
        let Some(increment) = self.current.as_mut() else {
            debug!("element output {} outside an increment; skipped", result);
            return;
        };
        let values = f64_values(body);
        increment.append_element_values(
            result,
            &self.cursor.set_name,
            &self.cursor.shape,
            self.cursor.element,
            self.cursor.ipt,
            &values,
        );
    }

    fn handle_node_output(&mut self, body: &[crate::fil::Word], result: &str) {
        let Some(increment) = self.current.as_mut() else {
            debug!("node output {} outside an increment; skipped", result);
            return;
        };
        if body.is_empty() {
            return;
        }
        let node = body[0].as_i64();
        increment.set_node_values(result, node, f64_values(&body[1..]));
    }

    /// Record 1911: flag 0 opens element output for a set and an element
    /// type, flag 1 nodal output for a set.
    fn handle_output_definition(&mut self, body: &[crate::fil::Word]) {
        if body.is_empty() {
            return;
        }
        match body[0].as_flag() {
            0 => {
                if body.len() >= 3 {
                    let set_name = self.model.resolve_set_name(&body[1].as_a8(), ALL_SET);
                    self.cursor.set_name = set_name;
                    self.cursor.shape = body[2].as_a8();
                }
            }
            1 => {
                if body.len() >= 2 {
                    let set_name = self.model.resolve_set_name(&body[1].as_a8(), ALL_SET);
                    self.cursor.set_name = set_name;
                }
            }
            flag => debug!("output definition with unhandled flag {}", flag),
        }
    }

    fn report_heading(&self, body: &[crate::fil::Word]) {
        if body.len() < 6 {
            return;
        }
        info!(
            "solver release {} run on {} at {}; {} elements, {} nodes declared",
            body[0].as_a8(),
            a8_string(&body[1..3]),
            body[3].as_a8(),
            body[4].as_i64(),
            body[5].as_i64(),
        );
    }

    fn start_increment(&mut self, body: &[crate::fil::Word]) {
        self.state = ParseState::IncrementParsing;
        let word_f64 = |i: usize| body.get(i).map(|w| w.as_f64()).unwrap_or(0.0);
        let word_i64 = |i: usize| body.get(i).map(|w| w.as_i64()).unwrap_or(0);
        let increment = Increment {
            t_total: word_f64(0),
            t_step: word_f64(1),
            n_step: word_i64(5),
            n_inc: word_i64(6),
            time_inc: word_f64(10),
            ..Increment::default()
        };
        info!(
            "processing increment {:>5} | step {:>3} inc {:>5} | step time {:>11.5} | total time {:>12.5}",
            self.n_increments + 1,
            increment.n_step,
            increment.n_inc,
            increment.t_step,
            increment.t_total
        );
        self.current = Some(increment);
    }

    fn finish_increment(&mut self) -> Result<()> {
        match self.state {
            ParseState::ModelSetup => self.commit_model(),
            ParseState::SurfaceDefinition => Ok(()),
            ParseState::IncrementParsing => self.commit_increment(),
        }
    }

    /// Freezes the model and emits the geometry, exactly once.
    fn commit_model(&mut self) -> Result<()> {
        if self.model.is_committed() {
            return Ok(());
        }
        self.model.commit(&self.substitute_sets);
        info!(
            "model setup complete: {} nodes, {} elements, {} element sets, {} node sets",
            self.model.nodes.len(),
            self.model.element_definitions.len(),
            self.model.el_sets.len(),
            self.model.n_sets.len()
        );
        self.exporter.setup_model(&self.model)?;
        self.exporter.export_geometry()
    }

    fn commit_increment(&mut self) -> Result<()> {
        let Some(mut increment) = self.current.take() else {
            warn!("end-increment record without a matching start; skipped");
            return Ok(());
        };
        self.n_increments += 1;
        self.time_history.push(increment.t_total);
        self.exporter.set_current_time(increment.t_total);

        for job in &self.sdv_to_qp_jobs {
            unpack_sdv_to_qps(&mut increment, job);
        }
        for job in &self.qp_average_jobs {
            average_over_qps(&mut increment, job);
        }

        self.exporter.export_per_node_variables(&increment.node_results)?;
        self.exporter.export_per_element_variables(&increment.element_results)?;

        if self.n_increments % 10 == 0 {
            // keep the on-disk index usable while the run is still going
            self.exporter.write_case_index()?;
        }
        Ok(())
    }

    /// Closes the case; the `.case` index is rewritten one final time.
    pub fn finalize(&mut self) -> Result<()> {
        self.exporter.finalize()
    }

    pub fn model(&self) -> &ModelStore {
        &self.model
    }

    pub fn n_increments(&self) -> usize {
        self.n_increments
    }

    pub fn time_history(&self) -> &[f64] {
        &self.time_history
    }
}

/// Splits each element's `SDV` vector of the job's set into
/// `qp_count` destination vectors of `qp_distance` values each, starting
/// at `qp_initial_offset`.
fn unpack_sdv_to_qps(increment: &mut Increment, job: &SdvToQpJob) {
    let Some(source) = increment
        .element_results
        .get("SDV")
        .and_then(|r| r.get(&job.set_name))
    else {
        debug!("no SDV data for set {:?}; nothing to unpack", job.set_name);
        return;
    };

    let mut extracted: Vec<(String, i64, Vec<Vec<f64>>)> = Vec::new();
    for (shape, elements) in source {
        for (element, values) in elements {
            let Some(sdv) = values.qps.get(&1) else {
                warn!(
                    "element {} in set {:?} carries no SDV vector at quadrature point 1",
                    element, job.set_name
                );
                continue;
            };
            let mut qp_values = Vec::with_capacity(job.qp_count);
            for i in 0..job.qp_count {
                let start = job.qp_initial_offset + i * job.qp_distance;
                let end = start + job.qp_distance;
                match sdv.get(start..end) {
                    Some(chunk) => qp_values.push(chunk.to_vec()),
                    None => {
                        warn!(
                            "SDV vector of element {} is too short for the quadrature pattern \
                             (length {}, needs {})",
                            element,
                            sdv.len(),
                            end
                        );
                        break;
                    }
                }
            }
            extracted.push((shape.clone(), *element, qp_values));
        }
    }

    for (shape, element, qp_values) in extracted {
        let destination = increment
            .element_results
            .entry(job.destination.clone())
            .or_default()
            .entry(job.set_name.clone())
            .or_default()
            .entry(shape)
            .or_default()
            .entry(element)
            .or_default();
        destination.qps = qp_values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i as i32 + 1, v))
            .collect();
    }
}

/// Stores the component-wise mean over all quadrature points of each
/// element as the `average` computed result.
fn average_over_qps(increment: &mut Increment, job: &QpAverageJob) {
    let Some(set_results) = increment
        .element_results
        .get_mut(&job.result)
        .and_then(|r| r.get_mut(&job.set_name))
    else {
        debug!(
            "no {} data for set {:?}; nothing to average",
            job.result, job.set_name
        );
        return;
    };

    for elements in set_results.values_mut() {
        for values in elements.values_mut() {
            if values.qps.is_empty() {
                continue;
            }
            let width = values.qps.values().map(Vec::len).min().unwrap_or(0);
            let count = values.qps.len() as f64;
            let mut mean = vec![0.0; width];
            for qp_values in values.qps.values() {
                for (slot, v) in mean.iter_mut().zip(qp_values) {
                    *slot += v / count;
                }
            }
            values.computed.insert("average".to_string(), mean);
        }
    }
}

/// Per-set element counts grouped by shape, for the end-of-run summary.
pub fn set_summary(model: &ModelStore) -> Vec<(String, String, usize)> {
    let mut rows = Vec::new();
    for set in model.el_sets.values() {
        let mut by_shape: IndexMap<&str, usize> = IndexMap::new();
        for label in &set.element_labels {
            if let Some(def) = model.element_definitions.get(label) {
                *by_shape.entry(def.shape.as_str()).or_default() += 1;
            }
        }
        for (shape, count) in by_shape {
            rows.push((set.name.clone(), shape.to_string(), count));
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElementValues;

    fn increment_with_sdv(values: Vec<f64>) -> Increment {
        let mut increment = Increment::default();
        increment.append_element_values("SDV", "UELS", "U4", 1, 1, &values);
        increment
    }

    #[test]
    fn sdv_unpacking_follows_the_pattern() {
        let mut increment =
            increment_with_sdv((1..=16).map(f64::from).collect::<Vec<f64>>());
        let job = SdvToQpJob {
            set_name: "UELS".into(),
            destination: "UQ".into(),
            qp_count: 4,
            qp_distance: 4,
            qp_initial_offset: 0,
        };
        unpack_sdv_to_qps(&mut increment, &job);

        let uq = &increment.element_results["UQ"]["UELS"]["U4"][&1];
        assert_eq!(uq.qps[&1], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(uq.qps[&2], vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(uq.qps[&3], vec![9.0, 10.0, 11.0, 12.0]);
        assert_eq!(uq.qps[&4], vec![13.0, 14.0, 15.0, 16.0]);
    }

    #[test]
    fn qp_average_is_component_wise() {
        let mut increment = Increment::default();
        let mut values = ElementValues::default();
        values.append_qp(1, &[1.0, 2.0, 3.0, 4.0]);
        values.append_qp(2, &[5.0, 6.0, 7.0, 8.0]);
        values.append_qp(3, &[9.0, 10.0, 11.0, 12.0]);
        values.append_qp(4, &[13.0, 14.0, 15.0, 16.0]);
        increment
            .element_results
            .entry("UQ".into())
            .or_default()
            .entry("UELS".into())
            .or_default()
            .entry("U4".into())
            .or_default()
            .insert(1, values);

        let job = QpAverageJob {
            set_name: "UELS".into(),
            result: "UQ".into(),
        };
        average_over_qps(&mut increment, &job);

        let uq = &increment.element_results["UQ"]["UELS"]["U4"][&1];
        assert_eq!(uq.computed["average"], vec![7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn unpack_then_average_matches_end_to_end() {
        let mut increment =
            increment_with_sdv((1..=16).map(f64::from).collect::<Vec<f64>>());
        unpack_sdv_to_qps(
            &mut increment,
            &SdvToQpJob {
                set_name: "UELS".into(),
                destination: "UQ".into(),
                qp_count: 4,
                qp_distance: 4,
                qp_initial_offset: 0,
            },
        );
        average_over_qps(
            &mut increment,
            &QpAverageJob {
                set_name: "UELS".into(),
                result: "UQ".into(),
            },
        );
        let uq = &increment.element_results["UQ"]["UELS"]["U4"][&1];
        assert_eq!(uq.computed["average"], vec![7.0, 8.0, 9.0, 10.0]);
    }
}
