/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::word::{Word, BLOCK_BYTES, FRAME_WORDS, WORD_BYTES};

/// One decoded record of the logical stream.
///
/// The body is a zero-copy view into the batch buffer; it holds
/// `length - 2` words.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    /// Record type, e.g. 1901 for a node definition.
    pub rec_type: i32,
    /// Declared record length in words, header included.
    pub length: i32,
    /// The record payload.
    pub body: &'a [Word],
}

/// Outcome of one scanning step.
#[derive(Debug)]
pub enum ScanStep<'a> {
    /// A complete record was decoded; the cursor has advanced past it.
    Record(Record<'a>),
    /// The buffer is fully consumed; the caller should fetch the next batch
    /// and restart the scanner at word 0.
    Exhausted,
    /// The record at the cursor declares a length of two words or less.
    /// Solver runs that were aborted leave such zero-content records at the
    /// write frontier; the caller decides between waiting and stopping.
    ZeroLength,
    /// The record at the cursor extends past the end of the buffer. The
    /// caller should re-batch at `file_idx + bytes_progressed` and resume
    /// scanning at `resume_word_idx`. A `bytes_progressed` of zero means
    /// not even one block of this batch was consumed, which is the same
    /// write-frontier situation as [`ScanStep::ZeroLength`].
    Straddles {
        bytes_progressed: u64,
        resume_word_idx: usize,
    },
}

/// Scanner that yields records from a batch of logical words.
///
/// The scanner only ever commits whole records; on a record that crosses
/// the batch end it rewinds to the last completed 512-word frame so that
/// re-batching from the corresponding block boundary replays the partial
/// record in full.
#[derive(Debug)]
pub struct RecordScanner<'a> {
    words: &'a [Word],
    word_idx: usize,
}

impl<'a> RecordScanner<'a> {
    pub fn new(words: &'a [Word], word_idx: usize) -> Self {
        Self { words, word_idx }
    }

    /// The current cursor position in words.
    pub fn word_idx(&self) -> usize {
        self.word_idx
    }

    /// Decodes the record at the cursor, if one is fully available.
    pub fn step(&mut self) -> ScanStep<'a> {
        if self.word_idx >= self.words.len() {
            return ScanStep::Exhausted;
        }
        let length = self.words[self.word_idx].as_flag();
        if length <= 2 {
            return ScanStep::ZeroLength;
        }
        let length = length as usize;
        if self.word_idx + length > self.words.len() {
            // Rewind to the start of the 512-word frame holding the cursor;
            // everything before it maps to whole physical blocks on disk.
            let frames_done = self.word_idx / FRAME_WORDS;
            return ScanStep::Straddles {
                bytes_progressed: (frames_done * BLOCK_BYTES) as u64,
                resume_word_idx: self.word_idx % FRAME_WORDS,
            };
        }
        let rec_type = self.words[self.word_idx + 1].as_flag();
        let body = &self.words[self.word_idx + 2..self.word_idx + length];
        self.word_idx += length;
        ScanStep::Record(Record {
            rec_type,
            length: length as i32,
            body,
        })
    }
}

/// Builds the words of a record, for synthetic streams in tests and tools.
pub fn encode_record(rec_type: i32, body: &[Word]) -> Vec<Word> {
    let mut words = Vec::with_capacity(body.len() + 2);
    let mut head = [0_u8; WORD_BYTES];
    head[..4].copy_from_slice(&((body.len() as i32 + 2).to_le_bytes()));
    words.push(Word(head));
    let mut kind = [0_u8; WORD_BYTES];
    kind[..4].copy_from_slice(&rec_type.to_le_bytes());
    words.push(Word(kind));
    words.extend_from_slice(body);
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_word(v: i64) -> Word {
        Word(v.to_le_bytes())
    }

    #[test]
    fn scans_consecutive_records() {
        let mut words = encode_record(1901, &[int_word(1), int_word(2)]);
        words.extend(encode_record(2001, &[]));
        let mut scanner = RecordScanner::new(&words, 0);

        match scanner.step() {
            ScanStep::Record(r) => {
                assert_eq!(r.rec_type, 1901);
                assert_eq!(r.length, 4);
                assert_eq!(r.body.len(), 2);
                assert_eq!(r.body[0].as_i64(), 1);
            }
            other => panic!("unexpected step {:?}", other),
        }
        match scanner.step() {
            ScanStep::Record(r) => {
                assert_eq!(r.rec_type, 2001);
                assert!(r.body.is_empty());
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert!(matches!(scanner.step(), ScanStep::Exhausted));
    }

    #[test]
    fn zero_length_record_does_not_advance() {
        let words = vec![int_word(0); 4];
        let mut scanner = RecordScanner::new(&words, 0);
        assert!(matches!(scanner.step(), ScanStep::ZeroLength));
        assert_eq!(scanner.word_idx(), 0);
    }

    #[test]
    fn straddling_record_rewinds_to_frame_boundary() {
        // One full frame of filler records, then a record whose declared
        // length exceeds the buffer.
        let mut words: Vec<Word> = Vec::new();
        for _ in 0..FRAME_WORDS / 8 {
            words.extend(encode_record(1902, &[int_word(0); 6]));
        }
        assert_eq!(words.len(), FRAME_WORDS);
        let mut head = [0_u8; WORD_BYTES];
        head[..4].copy_from_slice(&100_i32.to_le_bytes());
        words.push(Word(head));
        words.extend(vec![int_word(0); 10]);

        let mut scanner = RecordScanner::new(&words, 0);
        loop {
            match scanner.step() {
                ScanStep::Record(_) => continue,
                ScanStep::Straddles {
                    bytes_progressed,
                    resume_word_idx,
                } => {
                    assert_eq!(bytes_progressed, BLOCK_BYTES as u64);
                    assert_eq!(resume_word_idx, 0);
                    break;
                }
                other => panic!("unexpected step {:?}", other),
            }
        }
    }

    #[test]
    fn straddling_record_with_no_progress_reports_zero() {
        let mut head = [0_u8; WORD_BYTES];
        head[..4].copy_from_slice(&100_i32.to_le_bytes());
        let mut words = vec![Word(head)];
        words.extend(vec![int_word(0); 10]);
        let mut scanner = RecordScanner::new(&words, 0);
        match scanner.step() {
            ScanStep::Straddles {
                bytes_progressed, ..
            } => assert_eq!(bytes_progressed, 0),
            other => panic!("unexpected step {:?}", other),
        }
    }
}
