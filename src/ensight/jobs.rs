/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The export-job planner.
//!
//! Translates the parsed export definition into two ordered job lists
//! (per-node and per-element), the element-type map, and the trailing-node
//! trim table. Everything user-provided is validated here, so the engine
//! and the writer only ever see well-formed jobs.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::config::{ConfigError, ExportConfig, Expr};

/// Which kind of set a job entry addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetType {
    ElSet,
    NSet,
}

/// Where a per-element result lives within an element's stored values.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultAddress {
    /// By quadrature-point number.
    QuadraturePoint(i32),
    /// By computed key, e.g. `average`.
    Computed(String),
}

impl ResultAddress {
    pub fn location(&self) -> &'static str {
        match self {
            ResultAddress::QuadraturePoint(_) => "qps",
            ResultAddress::Computed(_) => "computed",
        }
    }

    pub fn which(&self) -> String {
        match self {
            ResultAddress::QuadraturePoint(qp) => qp.to_string(),
            ResultAddress::Computed(key) => key.clone(),
        }
    }
}

/// A half-open index range parsed from `"i"` or `"a:b"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSlice {
    pub start: usize,
    pub end: usize,
}

impl ValueSlice {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidSlice {
            value: text.to_string(),
        };
        if let Some((a, b)) = text.split_once(':') {
            let start = a.trim().parse().map_err(|_| invalid())?;
            let end = b.trim().parse().map_err(|_| invalid())?;
            if end < start {
                return Err(invalid());
            }
            Ok(Self { start, end })
        } else {
            let start: usize = text.trim().parse().map_err(|_| invalid())?;
            Ok(Self {
                start,
                end: start + 1,
            })
        }
    }

    /// Extracts the range from a row, clamped to the row's length.
    pub fn apply(&self, row: &[f64]) -> Vec<f64> {
        let end = self.end.min(row.len());
        let start = self.start.min(end);
        row[start..end].to_vec()
    }
}

/// One set's entry within an export job.
#[derive(Debug, Clone)]
pub struct JobEntry {
    pub set_type: SetType,
    pub set_name: String,
    pub result: String,
    /// Mandatory for per-element entries, absent for per-node ones.
    pub address: Option<ResultAddress>,
    pub slice: Option<ValueSlice>,
    pub function: Option<Expr>,
    /// Leading components skipped before the slice; no keyword populates
    /// it today.
    pub offset: Option<usize>,
    pub fill_missing_values_to: Option<f64>,
}

/// One exported variable: a name, a dimension, a time set, and the entries
/// per set it collects values from.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub name: String,
    pub dimensions: usize,
    pub time_set_id: usize,
    pub write_empty_time_steps: bool,
    pub entries: IndexMap<String, JobEntry>,
}

/// The planner's output.
#[derive(Debug, Default)]
pub struct JobPlan {
    pub per_node_jobs: IndexMap<String, ExportJob>,
    pub per_element_jobs: IndexMap<String, ExportJob>,
    /// Solver shape -> EnSight cell type, with the implicit `node -> point`.
    pub element_type_map: IndexMap<String, String>,
    /// Solver shape -> number of trailing nodes dropped at definition time.
    pub ignore_last_nodes: HashMap<String, usize>,
}

/// Builds the job plan from a parsed export definition.
pub fn plan_jobs(config: &ExportConfig) -> Result<JobPlan, ConfigError> {
    let mut plan = JobPlan {
        element_type_map: IndexMap::from([("node".to_string(), "point".to_string())]),
        ..JobPlan::default()
    };

    for entry in config.entries("*defineElementType") {
        plan.element_type_map.insert(
            entry.require_str("element")?.to_string(),
            entry.require_str("shape")?.to_string(),
        );
    }

    for entry in config.entries("*ignoreLastNodesForElementType") {
        let number = entry.require_int("number")?;
        if number < 0 {
            return Err(ConfigError::InvalidValue {
                keyword: "ignoreLastNodesForElementType".to_string(),
                option: "number".to_string(),
                value: number.to_string(),
                expected: "non-negative integer",
            });
        }
        plan.ignore_last_nodes
            .insert(entry.require_str("element")?.to_string(), number as usize);
    }

    for entry in config.entries("*ensightPerNodeVariableJob") {
        let job = collect_job(entry)?;
        plan.per_node_jobs.insert(job.name.clone(), job);
    }
    for entry in config.entries("*ensightPerElementVariableJob") {
        let job = collect_job(entry)?;
        plan.per_element_jobs.insert(job.name.clone(), job);
    }

    for entry in config.entries("*ensightPerNodeVariableJobEntry") {
        let job_name = entry.require_str("job")?;
        let set_type = match entry.str("setType").unwrap_or("elSet") {
            t if t.eq_ignore_ascii_case("elset") => SetType::ElSet,
            t if t.eq_ignore_ascii_case("nset") => SetType::NSet,
            other => {
                return Err(ConfigError::InvalidSetType {
                    value: other.to_string(),
                })
            }
        };
        let job_entry = JobEntry {
            set_type,
            set_name: entry.require_str("set")?.to_string(),
            result: entry.require_str("result")?.to_string(),
            address: None,
            slice: parse_slice(entry.str("values"))?,
            function: parse_function(entry.str("f(x)"))?,
            offset: None,
            fill_missing_values_to: entry.float("fillMissingValuesTo"),
        };
        let job = plan
            .per_node_jobs
            .get_mut(job_name)
            .ok_or_else(|| ConfigError::UnknownJob {
                job: job_name.to_string(),
            })?;
        job.entries.insert(job_entry.set_name.clone(), job_entry);
    }

    for entry in config.entries("*ensightPerElementVariableJobEntry") {
        let job_name = entry.require_str("job")?;
        let which = entry.require_str("which")?;
        let address = match entry.require_str("location")? {
            "qps" => {
                ResultAddress::QuadraturePoint(which.parse().map_err(|_| {
                    ConfigError::InvalidWhich {
                        job: job_name.to_string(),
                        value: which.to_string(),
                    }
                })?)
            }
            "computed" => ResultAddress::Computed(which.to_string()),
            other => {
                return Err(ConfigError::InvalidValue {
                    keyword: "ensightPerElementVariableJobEntry".to_string(),
                    option: "location".to_string(),
                    value: other.to_string(),
                    expected: "'qps' or 'computed'",
                })
            }
        };
        let job_entry = JobEntry {
            set_type: SetType::ElSet,
            set_name: entry.require_str("set")?.to_string(),
            result: entry.require_str("result")?.to_string(),
            address: Some(address),
            slice: parse_slice(entry.str("values"))?,
            function: parse_function(entry.str("f(x)"))?,
            offset: None,
            fill_missing_values_to: None,
        };
        let job = plan
            .per_element_jobs
            .get_mut(job_name)
            .ok_or_else(|| ConfigError::UnknownJob {
                job: job_name.to_string(),
            })?;
        job.entries.insert(job_entry.set_name.clone(), job_entry);
    }

    Ok(plan)
}

fn collect_job(entry: &crate::config::ConfigEntry) -> Result<ExportJob, ConfigError> {
    let name = entry.require_str("name")?.to_string();
    let dimensions = entry.require_int("dimensions")?;
    if !matches!(dimensions, 1 | 3 | 6 | 9) {
        return Err(ConfigError::InvalidDimensions {
            job: name,
            dimensions,
        });
    }
    Ok(ExportJob {
        name,
        dimensions: dimensions as usize,
        time_set_id: entry.int("timeSet").unwrap_or(1).max(1) as usize,
        write_empty_time_steps: true,
        entries: IndexMap::new(),
    })
}

fn parse_slice(text: Option<&str>) -> Result<Option<ValueSlice>, ConfigError> {
    text.map(ValueSlice::parse).transpose()
}

fn parse_function(text: Option<&str>) -> Result<Option<Expr>, ConfigError> {
    text.map(|src| {
        Expr::parse(src).map_err(|source| ConfigError::InvalidExpression {
            expr: src.to_string(),
            source,
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_export_file;

    fn plan_of(content: &str) -> Result<JobPlan, ConfigError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.inp");
        std::fs::write(&path, content).unwrap();
        plan_jobs(&parse_export_file(&path)?)
    }

    #[test]
    fn slices_parse_as_index_or_range() {
        assert_eq!(
            ValueSlice::parse("4").unwrap(),
            ValueSlice { start: 4, end: 5 }
        );
        assert_eq!(
            ValueSlice::parse("1:3").unwrap(),
            ValueSlice { start: 1, end: 3 }
        );
        assert!(ValueSlice::parse("a:b").is_err());
        assert!(ValueSlice::parse("3:1").is_err());
    }

    #[test]
    fn plans_jobs_with_entries() {
        let plan = plan_of(
            "*defineElementType, element=B21, shape=bar2\n\
             *ensightPerNodeVariableJob, name=U, dimensions=3\n\
             *ensightPerNodeVariableJobEntry, job=U, set=ALL, result=U\n\
             *ensightPerElementVariableJob, name=Savg, dimensions=6, timeSet=2\n\
             *ensightPerElementVariableJobEntry, job=Savg, set=ALL, result=S, location=computed, which=average\n",
        )
        .unwrap();

        assert_eq!(plan.element_type_map["B21"], "bar2");
        assert_eq!(plan.element_type_map["node"], "point");

        let u = &plan.per_node_jobs["U"];
        assert_eq!(u.dimensions, 3);
        assert_eq!(u.time_set_id, 1);
        assert_eq!(u.entries["ALL"].set_type, SetType::ElSet);

        let savg = &plan.per_element_jobs["Savg"];
        assert_eq!(savg.time_set_id, 2);
        assert_eq!(
            savg.entries["ALL"].address,
            Some(ResultAddress::Computed("average".into()))
        );
    }

    #[test]
    fn qps_which_must_be_an_integer() {
        let err = plan_of(
            "*ensightPerElementVariableJob, name=S1, dimensions=6\n\
             *ensightPerElementVariableJobEntry, job=S1, set=ALL, result=S, location=qps, which=average\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWhich { .. }));
    }

    #[test]
    fn entries_for_unknown_jobs_are_rejected() {
        let err = plan_of("*ensightPerNodeVariableJobEntry, job=U, set=ALL, result=U\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownJob { .. }));
    }

    #[test]
    fn dimensions_are_restricted() {
        let err = plan_of("*ensightPerNodeVariableJob, name=U, dimensions=4\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDimensions { .. }));
    }
}
