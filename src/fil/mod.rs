/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The `.fil` results-stream layer.
//!
//! A `.fil` file is a sequence of physical blocks of 513 eight-byte words;
//! the first and last four bytes of every block are framing padding. The
//! logical word stream reconstructed from the blocks carries self-delimiting
//! records `(length, type, body)`, all quantities in words.

mod batch;
mod record;
mod word;

pub use batch::{lock_file_path, Batch, BatchReader};
pub use record::{encode_record, Record, RecordScanner, ScanStep};
pub use word::{
    a8_string, f64_values, i64_values, Word, BATCH_BYTES, BLOCK_BYTES, BLOCK_WORDS, FRAME_WORDS,
    WORD_BYTES,
};
