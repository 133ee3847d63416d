/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use indexmap::IndexMap;

/// Results stored for one element of one increment: vectors per quadrature
/// point, and vectors computed from them under a string key (currently only
/// `"average"`).
#[derive(Debug, Default, Clone)]
pub struct ElementValues {
    pub qps: IndexMap<i32, Vec<f64>>,
    pub computed: IndexMap<String, Vec<f64>>,
}

impl ElementValues {
    /// Appends values for one quadrature point. The emitter splits long
    /// element outputs over several records, so an existing vector is
    /// extended rather than replaced.
    pub fn append_qp(&mut self, qp: i32, values: &[f64]) {
        self.qps.entry(qp).or_default().extend_from_slice(values);
    }
}

/// Per-element results of one increment, addressed as
/// `result → set → shape → element label`.
pub type ElementResults = IndexMap<String, IndexMap<String, IndexMap<String, IndexMap<i64, ElementValues>>>>;

/// Per-node results of one increment, addressed as `result → node label`.
pub type NodeResults = IndexMap<String, IndexMap<i64, Vec<f64>>>;

/// One increment of the results stream, opened by a start-increment record
/// and committed (then dropped) at the matching end-increment record.
#[derive(Debug, Default)]
pub struct Increment {
    pub t_total: f64,
    pub t_step: f64,
    pub n_step: i64,
    pub n_inc: i64,
    pub time_inc: f64,
    pub element_results: ElementResults,
    pub node_results: NodeResults,
}

impl Increment {
    /// Appends element output for one `(result, set, shape, element, qp)`
    /// address, creating the intermediate tables on first touch.
    pub fn append_element_values(
        &mut self,
        result: &str,
        set_name: &str,
        shape: &str,
        element: i64,
        qp: i32,
        values: &[f64],
    ) {
        self.element_results
            .entry(result.to_string())
            .or_default()
            .entry(set_name.to_string())
            .or_default()
            .entry(shape.to_string())
            .or_default()
            .entry(element)
            .or_default()
            .append_qp(qp, values);
    }

    /// Stores node output for one `(result, node)` address, replacing any
    /// previous values.
    pub fn set_node_values(&mut self, result: &str, node: i64, values: Vec<f64>) {
        self.node_results
            .entry(result.to_string())
            .or_default()
            .insert(node, values);
    }

    /// The per-set tables of one result, if any were stored.
    pub fn element_set_results(
        &self,
        result: &str,
        set_name: &str,
    ) -> Option<&IndexMap<String, IndexMap<i64, ElementValues>>> {
        self.element_results.get(result)?.get(set_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_element_records_concatenate() {
        let mut inc = Increment::default();
        inc.append_element_values("S", "ALL", "CPS4", 1, 1, &[1.0, 2.0]);
        inc.append_element_values("S", "ALL", "CPS4", 1, 1, &[3.0]);
        let values = &inc.element_results["S"]["ALL"]["CPS4"][&1];
        assert_eq!(values.qps[&1], vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn node_values_replace() {
        let mut inc = Increment::default();
        inc.set_node_values("U", 5, vec![1.0]);
        inc.set_node_values("U", 5, vec![2.0]);
        assert_eq!(inc.node_results["U"][&5], vec![2.0]);
    }
}
