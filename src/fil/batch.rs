/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mmap_rs::MmapFlags;

use super::word::{Word, BATCH_BYTES, BLOCK_BYTES, WORD_BYTES};

/// One batch of logical words copied out of the input file.
#[derive(Debug)]
pub struct Batch {
    /// The logical words of the batch; always a multiple of 512.
    pub words: Vec<Word>,
    /// Offset of the first byte past the batch, i.e. where the next batch
    /// starts after a clean scan.
    pub next_file_idx: u64,
}

/// Block-aligned batch reader over a possibly still-growing results file.
///
/// The file is memory-mapped read-only and each batch is copied out before
/// decoding, so the mapping never outlives a batch. Batches are bounded by
/// [`BATCH_BYTES`] and truncated down to whole physical blocks; a trailing
/// partial block is left for a later round, which matters while the solver
/// is still appending.
#[derive(Debug, Clone)]
pub struct BatchReader {
    path: PathBuf,
}

impl BatchReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }

    /// Current size of the input file in bytes.
    pub fn file_size(&self) -> Result<u64> {
        Ok(self
            .path
            .metadata()
            .with_context(|| format!("Cannot stat {}", self.path.display()))?
            .len())
    }

    /// Reads the next batch of whole physical blocks starting at byte
    /// `file_idx`, stripping the per-block framing padding.
    ///
    /// Returns `None` when no whole block is available at `file_idx` yet.
    pub fn read(&self, file_idx: u64) -> Result<Option<Batch>> {
        let file_size = self.file_size()?;
        let mut idx_end = file_size.min(file_idx + BATCH_BYTES);
        // Only whole blocks are materialized; an unfinished trailing block
        // is picked up once the solver has completed it.
        idx_end -= idx_end % BLOCK_BYTES as u64;
        if idx_end <= file_idx {
            return Ok(None);
        }

        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Cannot open {}", self.path.display()))?;
        let mmap = unsafe {
            mmap_rs::MmapOptions::new(file_size as usize)
                .with_context(|| format!("Cannot initialize mmap of size {}", file_size))?
                .with_flags(MmapFlags::empty())
                .with_file(&file, 0)
                .map()
                .with_context(|| format!("Cannot mmap {}", self.path.display()))?
        };

        let bytes = &mmap.as_ref()[file_idx as usize..idx_end as usize];
        let mut words = Vec::with_capacity(bytes.len() / BLOCK_BYTES * (BLOCK_BYTES - 2));
        for block in bytes.chunks_exact(BLOCK_BYTES) {
            // The first and last four bytes of every block are framing
            // padding, presumably checksums.
            for raw in block[4..BLOCK_BYTES - 4].chunks_exact(WORD_BYTES) {
                let mut buf = [0_u8; WORD_BYTES];
                buf.copy_from_slice(raw);
                words.push(Word(buf));
            }
        }
        debug_assert_eq!(words.len() % 512, 0);

        Ok(Some(Batch {
            words,
            next_file_idx: idx_end,
        }))
    }
}

/// Path of the sibling lock file signalling that the solver is still
/// running and the results file may keep growing.
pub fn lock_file_path(fil: &Path) -> PathBuf {
    fil.with_extension("lck")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn block(payload: &[u8; 4096]) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOCK_BYTES);
        out.extend_from_slice(&[0xAA; 4]);
        out.extend_from_slice(payload);
        out.extend_from_slice(&[0xBB; 4]);
        out
    }

    #[test]
    fn padding_is_stripped_per_block() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("t.fil");
        let mut payload = [0_u8; 4096];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let mut f = std::fs::File::create(&path)?;
        f.write_all(&block(&payload))?;
        f.write_all(&block(&payload))?;
        drop(f);

        let reader = BatchReader::new(&path);
        let batch = reader.read(0)?.expect("two whole blocks");
        assert_eq!(batch.words.len(), 1024);
        assert_eq!(batch.next_file_idx, 2 * BLOCK_BYTES as u64);
        let mut expected = Vec::new();
        expected.extend_from_slice(&payload);
        expected.extend_from_slice(&payload);
        let got: Vec<u8> = batch.words.iter().flat_map(|w| w.0).collect();
        assert_eq!(got, expected);
        Ok(())
    }

    #[test]
    fn partial_trailing_block_is_left_behind() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("t.fil");
        let payload = [7_u8; 4096];
        let mut bytes = block(&payload);
        bytes.extend_from_slice(&[0_u8; 100]);
        std::fs::write(&path, &bytes)?;

        let reader = BatchReader::new(&path);
        let batch = reader.read(0)?.expect("one whole block");
        assert_eq!(batch.words.len(), 512);
        assert_eq!(batch.next_file_idx, BLOCK_BYTES as u64);
        assert!(reader.read(batch.next_file_idx)?.is_none());
        Ok(())
    }

    #[test]
    fn lock_file_is_a_sibling() {
        assert_eq!(
            lock_file_path(Path::new("/tmp/job.fil")),
            PathBuf::from("/tmp/job.lck")
        );
    }
}
