/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Parts and geometry chunks.
//!
//! A part is the writer's renumbered view of one model set: a compact
//! local node index in first-seen order, the matching coordinate matrix,
//! and the set's elements grouped by solver shape with node references
//! rewritten to local indices. Parts copy what they need from the model
//! and never point back into it.

use std::io::{self, Write};

use indexmap::IndexMap;
use log::warn;

use super::format::{write_c80, write_f32_slice, write_i32, write_i32_slice};
use super::ExportError;
use crate::model::{ElSet, ModelStore, NSet};

/// Node/element id emission mode of a geometry file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMode {
    Assign,
    Given,
    Ignore,
    Off,
}

impl IdMode {
    fn as_str(self) -> &'static str {
        match self {
            IdMode::Assign => "assign",
            IdMode::Given => "given",
            IdMode::Ignore => "ignore",
            IdMode::Off => "off",
        }
    }

    /// Whether label arrays are present in part blocks under this mode.
    fn writes_labels(self) -> bool {
        matches!(self, IdMode::Given | IdMode::Ignore)
    }
}

/// The elements of one solver shape within a part.
#[derive(Debug, Clone)]
pub struct CellBlock {
    /// The EnSight cell type the shape maps to.
    pub cell_type: String,
    pub element_labels: Vec<i64>,
    /// Local node indices per element, zero-based.
    pub connectivity: Vec<Vec<usize>>,
}

/// A renumbered view of one set, identified by a stable part id >= 1.
#[derive(Debug, Clone)]
pub struct Part {
    pub id: i32,
    pub description: String,
    /// Local node order; per-node variables follow it.
    pub node_labels: Vec<i64>,
    pub coords: Vec<[f64; 3]>,
    /// Cell blocks keyed by solver shape, in first-seen order.
    pub cells: IndexMap<String, CellBlock>,
}

impl Part {
    /// Builds the part of an element set: local nodes in first-seen order
    /// across the set's elements, cells grouped by shape.
    pub fn from_element_set(
        id: i32,
        set: &ElSet,
        model: &ModelStore,
        element_type_map: &IndexMap<String, String>,
    ) -> Result<Self, ExportError> {
        let mut part = Part {
            id,
            description: set.name.clone(),
            node_labels: Vec::new(),
            coords: Vec::new(),
            cells: IndexMap::new(),
        };
        let mut local_index: IndexMap<i64, usize> = IndexMap::new();

        for element_label in &set.element_labels {
            let Some(def) = model.element_definitions.get(element_label) else {
                // realized sets only hold known labels
                continue;
            };
            let cell_type = element_type_map.get(&def.shape).ok_or_else(|| {
                ExportError::UnmappedShape {
                    shape: def.shape.clone(),
                    set: set.name.clone(),
                }
            })?;
            let mut connectivity = Vec::with_capacity(def.node_labels.len());
            for node_label in &def.node_labels {
                let next = local_index.len();
                let local = *local_index.entry(*node_label).or_insert(next);
                if local == part.node_labels.len() {
                    part.node_labels.push(*node_label);
                    part.coords.push(match model.nodes.get(node_label) {
                        Some(node) => node.coords,
                        None => {
                            warn!(
                                "element {} references unknown node {}; placing it at the origin",
                                element_label, node_label
                            );
                            [0.0; 3]
                        }
                    });
                }
                connectivity.push(local);
            }
            part.cells
                .entry(def.shape.clone())
                .or_insert_with(|| CellBlock {
                    cell_type: cell_type.clone(),
                    element_labels: Vec::new(),
                    connectivity: Vec::new(),
                })
                .push(*element_label, connectivity);
        }
        Ok(part)
    }

    /// Builds the part of a node set: one point cell per node, the node
    /// label doubling as the element label.
    pub fn from_node_set(
        id: i32,
        set: &NSet,
        model: &ModelStore,
        element_type_map: &IndexMap<String, String>,
    ) -> Result<Self, ExportError> {
        let cell_type = element_type_map
            .get("node")
            .cloned()
            .unwrap_or_else(|| "point".to_string());
        let mut part = Part {
            id,
            description: format!("NSET_{}", set.name),
            node_labels: set.node_labels.clone(),
            coords: Vec::with_capacity(set.node_labels.len()),
            cells: IndexMap::new(),
        };
        let mut block = CellBlock {
            cell_type,
            element_labels: Vec::with_capacity(set.node_labels.len()),
            connectivity: Vec::with_capacity(set.node_labels.len()),
        };
        for (i, node_label) in set.node_labels.iter().enumerate() {
            part.coords.push(match model.nodes.get(node_label) {
                Some(node) => node.coords,
                None => [0.0; 3],
            });
            block.push(*node_label, vec![i]);
        }
        part.cells.insert("node".to_string(), block);
        Ok(part)
    }

    fn write<W: Write>(&self, w: &mut W, node_ids: IdMode, element_ids: IdMode) -> io::Result<()> {
        write_c80(w, "part")?;
        write_i32(w, self.id)?;
        write_c80(w, &self.description)?;
        write_c80(w, "coordinates")?;
        write_i32(w, self.node_labels.len() as i32)?;
        if node_ids.writes_labels() {
            write_i32_slice(w, self.node_labels.iter().map(|&l| l as i32))?;
        }
        for component in 0..3 {
            write_f32_slice(w, self.coords.iter().map(|c| c[component]))?;
        }
        for block in self.cells.values() {
            write_c80(w, &block.cell_type)?;
            write_i32(w, block.element_labels.len() as i32)?;
            if element_ids.writes_labels() {
                write_i32_slice(w, block.element_labels.iter().map(|&l| l as i32))?;
            }
            for element in &block.connectivity {
                // EnSight counts nodes from one
                write_i32_slice(w, element.iter().map(|&i| i as i32 + 1))?;
            }
        }
        Ok(())
    }
}

impl CellBlock {
    fn push(&mut self, element_label: i64, connectivity: Vec<usize>) {
        self.element_labels.push(element_label);
        self.connectivity.push(connectivity);
    }
}

/// One geometry state: the parts of the model at a time step.
#[derive(Debug)]
pub struct Geometry<'a> {
    pub name: &'a str,
    pub description: (&'a str, &'a str),
    pub parts: &'a [Part],
    pub node_ids: IdMode,
    pub element_ids: IdMode,
}

impl Geometry<'_> {
    /// Writes the geometry payload of one time step.
    pub fn write_chunk<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_c80(w, self.description.0)?;
        write_c80(w, self.description.1)?;
        write_c80(w, &format!("node id {}", self.node_ids.as_str()))?;
        write_c80(w, &format!("element id {}", self.element_ids.as_str()))?;
        for part in self.parts {
            part.write(w, self.node_ids, self.element_ids)?;
        }
        Ok(())
    }
}
