/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Binary primitives of the EnSight Gold format: 80-character ASCII
//! frames, little-endian 32-bit integers, and single-precision floats.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

/// Length of an EnSight character frame.
pub const LINE_LEN: usize = 80;

/// Writes a fixed 80-byte ASCII frame, right-padded with spaces. Longer
/// text is cut off at 80 characters.
pub fn write_c80<W: Write + ?Sized>(w: &mut W, text: &str) -> io::Result<()> {
    let mut frame = [b' '; LINE_LEN];
    let bytes = text.as_bytes();
    let len = bytes.len().min(LINE_LEN);
    frame[..len].copy_from_slice(&bytes[..len]);
    w.write_all(&frame)
}

pub fn write_i32<W: Write + ?Sized>(w: &mut W, value: i32) -> io::Result<()> {
    w.write_i32::<LittleEndian>(value)
}

pub fn write_i32_slice<W: Write + ?Sized>(w: &mut W, values: impl IntoIterator<Item = i32>) -> io::Result<()> {
    for value in values {
        w.write_i32::<LittleEndian>(value)?;
    }
    Ok(())
}

/// Writes doubles down-cast to the format's single precision.
pub fn write_f32_slice<W: Write + ?Sized>(w: &mut W, values: impl IntoIterator<Item = f64>) -> io::Result<()> {
    for value in values {
        w.write_f32::<LittleEndian>(value as f32)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c80_frames_are_space_padded() {
        let mut buf = Vec::new();
        write_c80(&mut buf, "C Binary").unwrap();
        assert_eq!(buf.len(), 80);
        assert_eq!(&buf[..8], b"C Binary");
        assert!(buf[8..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn numbers_are_little_endian() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 1).unwrap();
        write_f32_slice(&mut buf, [0.5]).unwrap();
        assert_eq!(buf, [1, 0, 0, 0, 0, 0, 0, 63]);
    }
}
