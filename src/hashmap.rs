//! Hash map builder (C4).
//!
//! Drives the worker pool (C3) over a whole file and collects an
//! `offset -> digest` mapping. Keys are every block-aligned offset
//! `{0, B, 2B, ..., floor(S/B)*B}`; the final block may be short.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fileio;
use crate::hash::{self, Algorithm};
use crate::pool::WorkerPool;

/// `offset -> hex digest` for every block of a file.
pub type HashMapResult = HashMap<u64, String>;

/// Block-aligned offsets covering a file of size `size` with the given
/// `block_size`: `0, block_size, 2*block_size, ...` up to (but not
/// including) `size`. A zero-byte file yields no offsets at all.
pub fn block_offsets(size: u64, block_size: u64) -> impl Iterator<Item = u64> {
    let block_size = block_size.max(1);
    (0..size).step_by(block_size as usize)
}

/// Builds the hash map for `path` using `block_size`, `algorithm`, and
/// `concurrency` workers. `concurrency == 1` takes a serial single-handle
/// fallback that streams the file once rather than spinning up the pool;
/// it is byte-equivalent to the parallel path.
pub fn build(
    path: &Path,
    block_size: u64,
    algorithm: Algorithm,
    concurrency: usize,
) -> Result<HashMapResult> {
    let size = fileio::size(path)?.unwrap_or(0);
    if concurrency <= 1 {
        return build_serial(path, size, block_size, algorithm);
    }
    let path_buf: PathBuf = path.to_path_buf();
    let offsets: Vec<u64> = block_offsets(size, block_size).collect();
    let results = WorkerPool::run(concurrency, offsets, move |offset| {
        hash::hash_block(&path_buf, offset, block_size, algorithm)
    })
    .collect()?;
    Ok(results.into_iter().collect())
}

/// Like [`build`] but yields `(offset, digest)` pairs as they're
/// produced instead of collecting them into a map first. Used by the
/// server's `/hashes` endpoint, which must stream its response rather
/// than buffer the full digest list in memory.
pub fn hash_stream(
    path: PathBuf,
    block_size: u64,
    algorithm: Algorithm,
    concurrency: usize,
) -> Result<Box<dyn Iterator<Item = Result<(u64, String)>> + Send>> {
    let size = fileio::size(&path)?.unwrap_or(0);
    if concurrency <= 1 {
        let offsets: Vec<u64> = block_offsets(size, block_size).collect();
        return Ok(Box::new(offsets.into_iter().map(move |offset| {
            hash::hash_block_streaming(&path, offset, block_size, algorithm)
        })));
    }
    let offsets: Vec<u64> = block_offsets(size, block_size).collect();
    let pool = WorkerPool::run(concurrency, offsets, move |offset| {
        hash::hash_block(&path, offset, block_size, algorithm)
    });
    Ok(Box::new(pool.into_iter()))
}

fn build_serial(
    path: &Path,
    size: u64,
    block_size: u64,
    algorithm: Algorithm,
) -> Result<HashMapResult> {
    let mut map = HashMap::new();
    for offset in block_offsets(size, block_size) {
        let (offset, digest) = hash::hash_block_streaming(path, offset, block_size, algorithm)?;
        map.insert(offset, digest);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn block_offsets_cover_short_final_block() {
        let offsets: Vec<u64> = block_offsets(10, 4).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
    }

    #[test]
    fn empty_file_has_no_offsets() {
        let offsets: Vec<u64> = block_offsets(0, 4).collect();
        assert!(offsets.is_empty());
    }

    #[test]
    fn serial_and_parallel_hash_maps_are_equal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        let data: Vec<u8> = (0u8..=255).cycle().take(10 * 1024 + 17).collect();
        fs::write(&path, &data).unwrap();

        let serial = build(&path, 1024, Algorithm::Sha1, 1).unwrap();
        let parallel = build(&path, 1024, Algorithm::Sha1, 4).unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn hash_map_has_one_entry_per_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        fs::write(&path, vec![0u8; 10 * 1024 * 1024]).unwrap();

        let map = build(&path, 1024 * 1024, Algorithm::Sha1, 3).unwrap();
        assert_eq!(map.len(), 10);
    }

    proptest::proptest! {
        // Property 1: hashing determinism — serial and parallel hash maps
        // agree for arbitrary file contents, block sizes, and worker counts.
        #[test]
        fn serial_and_parallel_always_agree(
            data in proptest::collection::vec(proptest::num::u8::ANY, 0..20_000),
            block_size in 1u64..4096,
            concurrency in 1usize..8,
        ) {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("f.bin");
            fs::write(&path, &data).unwrap();

            let serial = build(&path, block_size, Algorithm::Sha1, 1).unwrap();
            let parallel = build(&path, block_size, Algorithm::Sha1, concurrency).unwrap();
            proptest::prop_assert_eq!(serial, parallel);
        }
    }
}
