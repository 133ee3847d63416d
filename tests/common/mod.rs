/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Helpers to synthesize `.fil` streams for the integration tests.
#![allow(dead_code)]

use filsight::fil::{encode_record, Word, BLOCK_BYTES, FRAME_WORDS, WORD_BYTES};

pub fn word_i64(value: i64) -> Word {
    Word(value.to_le_bytes())
}

pub fn word_f64(value: f64) -> Word {
    Word(value.to_le_bytes())
}

pub fn word_flag(value: i32) -> Word {
    let mut buf = [0_u8; WORD_BYTES];
    buf[..4].copy_from_slice(&value.to_le_bytes());
    Word(buf)
}

pub fn word_a8(text: &str) -> Word {
    assert!(text.len() <= WORD_BYTES);
    let mut buf = [b' '; WORD_BYTES];
    buf[..text.len()].copy_from_slice(text.as_bytes());
    Word(buf)
}

pub fn rec(rec_type: i32, body: &[Word]) -> Vec<Word> {
    encode_record(rec_type, body)
}

/// A type-2000 record with the given total time; the emitter pads the
/// body out to eleven words.
pub fn start_increment(t_total: f64) -> Vec<Word> {
    let mut body = vec![word_f64(t_total), word_f64(t_total)];
    body.extend(vec![word_f64(0.0); 3]);
    body.push(word_i64(1)); // step number
    body.push(word_i64(1)); // increment number
    body.extend(vec![word_f64(0.0); 3]);
    body.push(word_f64(t_total)); // time increment
    rec(2000, &body)
}

/// Pads a word stream to whole 512-word frames with inert records, then
/// frames it into 513-word physical blocks with 4-byte pads on each side.
pub fn pack_blocks(mut words: Vec<Word>) -> Vec<u8> {
    let remainder = words.len() % FRAME_WORDS;
    if remainder != 0 {
        let mut fill = FRAME_WORDS - remainder;
        assert!(fill >= 3, "cannot pad a gap of {} words", fill);
        if fill % 3 != 0 {
            let first = 3 + fill % 3;
            words.extend(rec(1902, &vec![word_i64(0); first - 2]));
            fill -= first;
        }
        while fill > 0 {
            words.extend(rec(1902, &[word_i64(0)]));
            fill -= 3;
        }
    }
    assert_eq!(words.len() % FRAME_WORDS, 0);

    let mut bytes = Vec::with_capacity(words.len() / FRAME_WORDS * BLOCK_BYTES);
    for frame in words.chunks(FRAME_WORDS) {
        bytes.extend_from_slice(&[0_u8; 4]);
        for word in frame {
            bytes.extend_from_slice(&word.0);
        }
        bytes.extend_from_slice(&[0_u8; 4]);
    }
    bytes
}

/// The model-setup section of a two-node, one-bar mesh, closed by an
/// end-increment record.
pub fn bar_model_setup() -> Vec<Word> {
    let mut words = Vec::new();
    words.extend(rec(
        1921,
        &[
            word_a8("6.14-1"),
            word_a8("01-Jan-"),
            word_a8("2024"),
            word_a8("12:00:00"),
            word_i64(1),
            word_i64(2),
            word_f64(1.0),
        ],
    ));
    words.extend(rec(
        1901,
        &[word_i64(1), word_f64(0.0), word_f64(0.0), word_f64(0.0)],
    ));
    words.extend(rec(
        1901,
        &[word_i64(2), word_f64(1.0), word_f64(0.0), word_f64(0.0)],
    ));
    words.extend(rec(
        1900,
        &[word_i64(10), word_a8("B21"), word_i64(1), word_i64(2)],
    ));
    words.extend(rec(2001, &[]));
    words
}

/// One increment carrying a U vector at both nodes of the bar mesh.
pub fn bar_increment(t_total: f64) -> Vec<Word> {
    let mut words = Vec::new();
    words.extend(start_increment(t_total));
    words.extend(rec(
        101,
        &[word_i64(1), word_f64(0.0), word_f64(0.0), word_f64(0.0)],
    ));
    words.extend(rec(
        101,
        &[word_i64(2), word_f64(0.5), word_f64(0.0), word_f64(0.0)],
    ));
    words.extend(rec(2001, &[]));
    words
}

/// The export definition matching the bar mesh scenarios.
pub const BAR_EXPORT_DEFINITION: &str = "\
*defineElementType, element=B21, shape=bar2
*ensightPerNodeVariableJob, name=U, dimensions=3
*ensightPerNodeVariableJobEntry, job=U, set=ALL, result=U
";

pub fn read_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

pub fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub fn c80(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..80]).trim_end().to_string()
}
