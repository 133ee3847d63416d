/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use byteorder::{ByteOrder, LittleEndian};
use core::fmt::Debug;

/// Size of a `.fil` word in bytes.
pub const WORD_BYTES: usize = 8;
/// Words per physical block, framing padding included.
pub const BLOCK_WORDS: usize = 513;
/// Size of a physical block in bytes.
pub const BLOCK_BYTES: usize = BLOCK_WORDS * WORD_BYTES;
/// Logical words carried by one physical block.
pub const FRAME_WORDS: usize = BLOCK_WORDS - 1;
/// Upper bound on the bytes materialized per batch (~538 MiB). Results
/// files may become huge, so they are consumed in bounded batches.
pub const BATCH_BYTES: u64 = (BLOCK_BYTES * 4096 * 32) as u64;

/// One 8-byte word of the logical stream.
///
/// A word carries no type information of its own; the record layer decides
/// whether it holds a signed 64-bit integer, an IEEE-754 double, eight ASCII
/// characters, or (in its lower half) a signed 32-bit flag. All integer and
/// floating-point views are little-endian.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Word(pub [u8; WORD_BYTES]);

impl Word {
    /// The word as a signed 64-bit integer.
    #[inline]
    pub fn as_i64(&self) -> i64 {
        LittleEndian::read_i64(&self.0)
    }

    /// The word as a double-precision float.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        LittleEndian::read_f64(&self.0)
    }

    /// The lower half of the word as a signed 32-bit flag.
    #[inline]
    pub fn as_flag(&self) -> i32 {
        LittleEndian::read_i32(&self.0[..4])
    }

    /// The word as an A8 character field, trailing padding trimmed.
    pub fn as_a8(&self) -> String {
        let text: String = self.0.iter().map(|&b| b as char).collect();
        text.trim_end_matches([' ', '\0']).to_string()
    }
}

impl Debug for Word {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Word({:016x})", self.as_i64())
    }
}

/// Reads a run of words as one A8 string field, trailing padding trimmed.
///
/// Set names and headings longer than eight characters span several words;
/// the characters are concatenated before trimming.
pub fn a8_string(words: &[Word]) -> String {
    let text: String = words
        .iter()
        .flat_map(|w| w.0.iter().map(|&b| b as char))
        .collect();
    text.trim_end_matches([' ', '\0']).to_string()
}

/// Reads a run of words as signed 64-bit integers.
pub fn i64_values(words: &[Word]) -> Vec<i64> {
    words.iter().map(Word::as_i64).collect()
}

/// Reads a run of words as double-precision floats.
pub fn f64_values(words: &[Word]) -> Vec<f64> {
    words.iter().map(Word::as_f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_of(bytes: &[u8]) -> Word {
        let mut buf = [0_u8; WORD_BYTES];
        buf[..bytes.len()].copy_from_slice(bytes);
        Word(buf)
    }

    #[test]
    fn integer_views_are_little_endian() {
        let w = word_of(&[0x2a, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(w.as_i64(), 42);
        assert_eq!(w.as_flag(), 42);

        let w = Word((-1_i64).to_le_bytes().into());
        assert_eq!(w.as_i64(), -1);
        assert_eq!(w.as_flag(), -1);
    }

    #[test]
    fn double_view_round_trips() {
        let w = Word(0.125_f64.to_le_bytes().into());
        assert_eq!(w.as_f64(), 0.125);
    }

    #[test]
    fn a8_trims_trailing_padding_only() {
        let w = word_of(b"B21     ");
        assert_eq!(w.as_a8(), "B21");
        let w = word_of(b"  X     ");
        assert_eq!(w.as_a8(), "  X");
    }

    #[test]
    fn multi_word_strings_concatenate_before_trimming() {
        let words = [word_of(b"LOAD_SUR"), word_of(b"FACE    ")];
        assert_eq!(a8_string(&words), "LOAD_SURFACE");
    }
}
