/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Variable chunks: one time step of one exported quantity.
//!
//! Values are stored as one row per node or element; the writer emits them
//! component-major and pads every row with zeros up to the variable's
//! dimension, so a chunk always carries `dimensions x n` floats per block.

use std::io::{self, Write};

use super::format::{write_c80, write_f32_slice, write_i32};

/// The `.case` variable kind for a per-node dimension.
pub fn per_node_kind(dimensions: usize) -> Option<&'static str> {
    match dimensions {
        1 => Some("scalar per node"),
        3 => Some("vector per node"),
        6 => Some("tensor per node"),
        9 => Some("tensor9 per node"),
        _ => None,
    }
}

/// The `.case` variable kind for a per-element dimension.
pub fn per_element_kind(dimensions: usize) -> Option<&'static str> {
    match dimensions {
        1 => Some("scalar per element"),
        3 => Some("vector per element"),
        6 => Some("tensor per element"),
        9 => Some("tensor9 per element"),
        _ => None,
    }
}

/// A chunk of any variable trend, as the case writer sees it.
pub trait VariableChunk {
    fn name(&self) -> &str;
    /// The `.case` kind line prefix, e.g. `vector per node`.
    fn kind(&self) -> &'static str;
    fn write_chunk(&self, w: &mut dyn Write) -> io::Result<()>;
}

fn write_rows_component_major(
    w: &mut dyn Write,
    rows: &[Vec<f64>],
    dimensions: usize,
) -> io::Result<()> {
    for component in 0..dimensions {
        write_f32_slice(
            w,
            rows.iter().map(|row| row.get(component).copied().unwrap_or(0.0)),
        )?;
    }
    Ok(())
}

/// One part's worth of per-node values: one row per part node, in the
/// part's local node order.
#[derive(Debug)]
pub struct PerNodePart {
    pub part_id: i32,
    pub rows: Vec<Vec<f64>>,
}

#[derive(Debug)]
pub struct PerNodeVariable {
    pub name: String,
    pub dimensions: usize,
    pub kind: &'static str,
    pub parts: Vec<PerNodePart>,
}

impl VariableChunk for PerNodeVariable {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn write_chunk(&self, w: &mut dyn Write) -> io::Result<()> {
        write_c80(w, &self.name)?;
        for part in &self.parts {
            write_c80(w, "part")?;
            write_i32(w, part.part_id)?;
            write_c80(w, "coordinates")?;
            write_rows_component_major(w, &part.rows, self.dimensions)?;
        }
        Ok(())
    }
}

/// One part's worth of per-element values: rows per cell block, each block
/// in the part's element order.
#[derive(Debug)]
pub struct PerElementPart {
    pub part_id: i32,
    /// `(cell type, rows)` in the part's cell-block order.
    pub blocks: Vec<(String, Vec<Vec<f64>>)>,
}

#[derive(Debug)]
pub struct PerElementVariable {
    pub name: String,
    pub dimensions: usize,
    pub kind: &'static str,
    pub parts: Vec<PerElementPart>,
}

impl VariableChunk for PerElementVariable {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn write_chunk(&self, w: &mut dyn Write) -> io::Result<()> {
        write_c80(w, &self.name)?;
        for part in &self.parts {
            write_c80(w, "part")?;
            write_i32(w, part.part_id)?;
            for (cell_type, rows) in &part.blocks {
                write_c80(w, cell_type)?;
                write_rows_component_major(w, rows, self.dimensions)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_node_chunks_are_component_major_and_zero_filled() {
        let var = PerNodeVariable {
            name: "U".into(),
            dimensions: 3,
            kind: per_node_kind(3).unwrap(),
            parts: vec![PerNodePart {
                part_id: 1,
                rows: vec![vec![0.0, 0.0, 0.0], vec![0.5, 0.0]],
            }],
        };
        let mut buf = Vec::new();
        var.write_chunk(&mut buf).unwrap();
        // description + part + id + "coordinates" + 6 floats
        assert_eq!(buf.len(), 80 + 80 + 4 + 80 + 6 * 4);
        let floats: Vec<f32> = buf[244..]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(floats, vec![0.0, 0.5, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn kinds_follow_dimension() {
        assert_eq!(per_node_kind(1), Some("scalar per node"));
        assert_eq!(per_element_kind(9), Some("tensor9 per element"));
        assert_eq!(per_node_kind(2), None);
    }
}
