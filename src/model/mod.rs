/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The model store: nodes, element definitions, named sets, and label
//! aliases accumulated during the model-setup phase, plus the realized
//! sets frozen at the end of it.

mod increment;

pub use increment::{ElementResults, ElementValues, Increment, NodeResults};

use std::collections::HashMap;

use indexmap::IndexMap;
use log::warn;

/// A spatial node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub label: i64,
    pub coords: [f64; 3],
}

/// A description of an element: its shape and the labels of its nodes.
#[derive(Debug, Clone)]
pub struct ElementDefinition {
    pub label: i64,
    pub shape: String,
    pub node_labels: Vec<i64>,
}

/// A named collection of labels, grown by continuation records until the
/// model is committed.
#[derive(Debug, Clone)]
pub struct SetDefinition {
    pub name: String,
    pub labels: Vec<i64>,
}

impl SetDefinition {
    pub fn new(name: impl Into<String>, labels: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            labels,
        }
    }
}

/// A realized element set: only labels of elements that exist in the mesh.
#[derive(Debug, Clone)]
pub struct ElSet {
    pub name: String,
    pub element_labels: Vec<i64>,
}

/// A realized node set: only labels of nodes that exist in the mesh.
#[derive(Debug, Clone)]
pub struct NSet {
    pub name: String,
    pub node_labels: Vec<i64>,
}

/// Name of the element set holding every defined element.
pub const ALL_SET: &str = "ALL";

/// The model store.
///
/// Nodes, element definitions, set definitions and the alias table are
/// filled record by record during model setup; [`ModelStore::commit`]
/// resolves aliases, realizes the sets and freezes them. Definition order
/// is kept everywhere, since part numbering downstream depends on it.
#[derive(Debug, Default)]
pub struct ModelStore {
    pub nodes: IndexMap<i64, Node>,
    pub element_definitions: IndexMap<i64, ElementDefinition>,
    el_set_definitions: IndexMap<String, SetDefinition>,
    n_set_definitions: IndexMap<String, SetDefinition>,
    label_cross_references: HashMap<String, String>,
    pub el_sets: IndexMap<String, ElSet>,
    pub n_sets: IndexMap<String, NSet>,
    committed: bool,
}

impl ModelStore {
    pub fn new() -> Self {
        let mut store = Self::default();
        // The solver falls back to a synthetic node 0 at the origin when it
        // creates nodes in place, e.g. for hex27 elements in contact.
        store.nodes.insert(
            0,
            Node {
                label: 0,
                coords: [0.0; 3],
            },
        );
        store
    }

    /// Stores a node; a re-definition keeps the first-seen coordinates.
    pub fn add_node(&mut self, label: i64, coords: [f64; 3]) {
        if let Some(existing) = self.nodes.get(&label) {
            warn!(
                "node {} already defined at {:?}; ignoring re-definition at {:?}",
                label, existing.coords, coords
            );
            return;
        }
        self.nodes.insert(label, Node { label, coords });
    }

    pub fn add_element(&mut self, label: i64, shape: String, node_labels: Vec<i64>) {
        self.element_definitions.insert(
            label,
            ElementDefinition {
                label,
                shape,
                node_labels,
            },
        );
    }

    /// Registers an alias from the stringified integer key to a logical
    /// set name.
    pub fn add_label_cross_reference(&mut self, key: i32, label: String) {
        self.label_cross_references.insert(key.to_string(), label);
    }

    /// Resolves an A8 set-name field: an empty name falls back to
    /// `fallback`, a known alias key is replaced by its logical name.
    pub fn resolve_set_name(&self, raw: &str, fallback: &str) -> String {
        if raw.is_empty() {
            return fallback.to_string();
        }
        match self.label_cross_references.get(raw) {
            Some(label) => label.clone(),
            None => raw.to_string(),
        }
    }

    pub fn define_el_set(&mut self, name: String, labels: Vec<i64>) {
        self.el_set_definitions
            .insert(name.clone(), SetDefinition::new(name, labels));
    }

    pub fn append_to_el_set(&mut self, name: &str, labels: &[i64]) {
        match self.el_set_definitions.get_mut(name) {
            Some(def) => def.labels.extend_from_slice(labels),
            None => {
                warn!("continuation for unknown element set {:?}", name);
                self.define_el_set(name.to_string(), labels.to_vec());
            }
        }
    }

    pub fn define_n_set(&mut self, name: String, labels: Vec<i64>) {
        self.n_set_definitions
            .insert(name.clone(), SetDefinition::new(name, labels));
    }

    pub fn append_to_n_set(&mut self, name: &str, labels: &[i64]) {
        match self.n_set_definitions.get_mut(name) {
            Some(def) => def.labels.extend_from_slice(labels),
            None => {
                warn!("continuation for unknown node set {:?}", name);
                self.define_n_set(name.to_string(), labels.to_vec());
            }
        }
    }

    /// Whether [`ModelStore::commit`] has run.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Freezes the model: creates the `ALL` set, resolves alias-named set
    /// definitions, merges the substitute sets, and realizes every set
    /// against the mesh. Labels that reference nothing are dropped with one
    /// warning per set.
    pub fn commit(&mut self, substitute_sets: &[SetDefinition]) {
        let all = SetDefinition::new(ALL_SET, self.element_definitions.keys().copied().collect());
        self.el_set_definitions.insert(ALL_SET.to_string(), all);

        // Set names recorded before their type-1940 record arrived still
        // carry the stringified integer key; resolve them now.
        for (key, label) in &self.label_cross_references {
            if let Some(mut def) = self.el_set_definitions.shift_remove(key) {
                def.name = label.clone();
                self.el_set_definitions.insert(label.clone(), def);
            }
            if let Some(mut def) = self.n_set_definitions.shift_remove(key) {
                def.name = label.clone();
                self.n_set_definitions.insert(label.clone(), def);
            }
        }

        for def in substitute_sets {
            self.el_set_definitions.insert(def.name.clone(), def.clone());
        }

        for def in self.el_set_definitions.values() {
            let (known, missing): (Vec<i64>, Vec<i64>) = def
                .labels
                .iter()
                .copied()
                .partition(|l| self.element_definitions.contains_key(l));
            if !missing.is_empty() {
                warn!(
                    "element set {:?} references {} unknown element labels (e.g. {}); \
                     continuing with the {} known ones",
                    def.name,
                    missing.len(),
                    missing[0],
                    known.len()
                );
            }
            self.el_sets.insert(
                def.name.clone(),
                ElSet {
                    name: def.name.clone(),
                    element_labels: known,
                },
            );
        }

        for def in self.n_set_definitions.values() {
            let (known, missing): (Vec<i64>, Vec<i64>) = def
                .labels
                .iter()
                .copied()
                .partition(|l| self.nodes.contains_key(l));
            if !missing.is_empty() {
                warn!(
                    "node set {:?} references {} unknown node labels (e.g. {}); \
                     continuing with the {} known ones",
                    def.name,
                    missing.len(),
                    missing[0],
                    known.len()
                );
            }
            self.n_sets.insert(
                def.name.clone(),
                NSet {
                    name: def.name.clone(),
                    node_labels: known,
                },
            );
        }

        self.committed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phantom_node_zero_exists() {
        let store = ModelStore::new();
        assert_eq!(store.nodes[&0].coords, [0.0; 3]);
    }

    #[test]
    fn duplicate_nodes_keep_first_coordinates() {
        let mut store = ModelStore::new();
        store.add_node(4, [1.0, 0.0, 0.0]);
        store.add_node(4, [9.0, 9.0, 9.0]);
        assert_eq!(store.nodes[&4].coords, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn commit_builds_all_set_and_drops_unknown_labels() {
        let mut store = ModelStore::new();
        store.add_node(1, [0.0; 3]);
        store.add_node(2, [1.0, 0.0, 0.0]);
        store.add_element(10, "B21".into(), vec![1, 2]);
        store.define_el_set("LEFT".into(), vec![10, 99]);
        store.commit(&[]);

        assert_eq!(store.el_sets[ALL_SET].element_labels, vec![10]);
        assert_eq!(store.el_sets["LEFT"].element_labels, vec![10]);
    }

    #[test]
    fn alias_renames_sets_at_commit() {
        let mut store = ModelStore::new();
        store.add_node(1, [0.0; 3]);
        store.add_element(10, "B21".into(), vec![1]);
        store.define_el_set("7".into(), vec![10]);
        store.add_label_cross_reference(7, "LOAD_SURFACE".into());
        store.commit(&[]);

        assert!(store.el_sets.contains_key("LOAD_SURFACE"));
        assert!(!store.el_sets.contains_key("7"));
    }

    #[test]
    fn resolve_set_name_applies_fallback_and_aliases() {
        let mut store = ModelStore::new();
        store.add_label_cross_reference(7, "LOAD_SURFACE".into());
        assert_eq!(store.resolve_set_name("", ALL_SET), "ALL");
        assert_eq!(store.resolve_set_name("7", ALL_SET), "LOAD_SURFACE");
        assert_eq!(store.resolve_set_name("TOP", ALL_SET), "TOP");
    }
}
