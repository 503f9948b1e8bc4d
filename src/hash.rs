//! Block hasher (C2) and the hash algorithm registry.
//!
//! Hashes a single block of a named file at a given offset with a named
//! algorithm. The registry covers the standard cryptographic names the
//! wire protocol's `method` parameter uses (`sha1`, the default, plus
//! `sha256`, `md5`, `blake2b`) and additionally exposes the crate's
//! faster non-cryptographic hashes for callers that don't need
//! interoperability with another implementation.

use std::fmt;
use std::io::Read;
use std::path::Path;

use blake2::Digest as Blake2Digest;
use md5::Digest as Md5Digest;
use sha1::Digest as Sha1Digest;
use sha2::Digest as Sha2Digest;

use crate::error::{Error, IoResultExt, Result};
use crate::fileio;

/// Supported hash algorithms, named the way the wire protocol spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Default algorithm; matches the reference server and client.
    Sha1,
    Sha256,
    Md5,
    Blake2b,
    /// Fast non-cryptographic hashes, useful for local-only comparisons.
    Xxh3,
    Xxh64,
    Blake3,
}

impl Algorithm {
    /// Parse an algorithm name as accepted by `-m`/`--hash-method` and the
    /// `method` query parameter. Unknown names are rejected.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "md5" => Ok(Self::Md5),
            "blake2b" => Ok(Self::Blake2b),
            "xxh3" => Ok(Self::Xxh3),
            "xxh64" => Ok(Self::Xxh64),
            "blake3" => Ok(Self::Blake3),
            other => Err(Error::UnsupportedHashAlgorithm(other.to_string())),
        }
    }

    /// The canonical name, as sent over the wire and accepted by `parse`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
            Self::Blake2b => "blake2b",
            Self::Xxh3 => "xxh3",
            Self::Xxh64 => "xxh64",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::Sha1
    }
}

/// A block digest: hex-encoded output of `algorithm` over the block
/// bytes at `offset`.
fn digest_bytes(algorithm: Algorithm, data: &[u8]) -> String {
    match algorithm {
        Algorithm::Sha1 => {
            let mut hasher = sha1::Sha1::new();
            hasher.update(data);
            hex::encode(hasher.finalize())
        }
        Algorithm::Sha256 => {
            let mut hasher = sha2::Sha256::new();
            hasher.update(data);
            hex::encode(hasher.finalize())
        }
        Algorithm::Md5 => {
            let mut hasher = md5::Md5::new();
            hasher.update(data);
            hex::encode(hasher.finalize())
        }
        Algorithm::Blake2b => {
            let mut hasher = blake2::Blake2b512::new();
            hasher.update(data);
            hex::encode(hasher.finalize())
        }
        Algorithm::Xxh3 => {
            hex::encode(xxhash_rust::xxh3::xxh3_64(data).to_be_bytes())
        }
        Algorithm::Xxh64 => {
            hex::encode(xxhash_rust::xxh64::xxh64(data, 0).to_be_bytes())
        }
        Algorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
    }
}

/// Hashes the block of `path` at `[offset, offset + block_size)` (or up
/// to end-of-file for a short final block) with `algorithm`. Returns the
/// offset unchanged alongside the lowercase hex digest.
pub fn hash_block(
    path: &Path,
    offset: u64,
    block_size: u64,
    algorithm: Algorithm,
) -> Result<(u64, String)> {
    let data = fileio::read(path, offset, block_size)?;
    Ok((offset, digest_bytes(algorithm, &data)))
}

/// Hashes a block by streaming it through a bounded buffer rather than
/// materializing the whole block, for callers that hash very large block
/// sizes and want to bound peak memory. Behavior is byte-equivalent to
/// [`hash_block`].
pub fn hash_block_streaming(
    path: &Path,
    offset: u64,
    block_size: u64,
    algorithm: Algorithm,
) -> Result<(u64, String)> {
    use std::io::{Seek, SeekFrom};
    const CHUNK: usize = 64 * 1024;
    let mut file = std::fs::File::open(path).with_path(path)?;
    file.seek(SeekFrom::Start(offset)).with_path(path)?;
    let mut remaining = block_size;
    let mut buf = vec![0u8; CHUNK];

    macro_rules! stream_with {
        ($hasher:expr) => {{
            let mut hasher = $hasher;
            while remaining > 0 {
                let take = remaining.min(buf.len() as u64) as usize;
                let n = file.read(&mut buf[..take]).with_path(path)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                remaining -= n as u64;
            }
            hex::encode(hasher.finalize())
        }};
    }

    let digest = match algorithm {
        Algorithm::Sha1 => stream_with!(sha1::Sha1::new()),
        Algorithm::Sha256 => stream_with!(sha2::Sha256::new()),
        Algorithm::Md5 => stream_with!(md5::Md5::new()),
        Algorithm::Blake2b => stream_with!(blake2::Blake2b512::new()),
        Algorithm::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            while remaining > 0 {
                let take = remaining.min(buf.len() as u64) as usize;
                let n = file.read(&mut buf[..take]).with_path(path)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                remaining -= n as u64;
            }
            hasher.finalize().to_hex().to_string()
        }
        Algorithm::Xxh3 | Algorithm::Xxh64 => {
            // Non-cryptographic hashers here are cheap enough that the
            // non-streaming path is used; fall back to it directly.
            let data = fileio::read(path, offset, block_size)?;
            return Ok((offset, digest_bytes(algorithm, &data)));
        }
    };
    Ok((offset, digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parse_rejects_unknown_names() {
        assert!(Algorithm::parse("crc32").is_err());
        assert_eq!(Algorithm::parse("sha1").unwrap(), Algorithm::Sha1);
    }

    #[test]
    fn default_algorithm_is_sha1() {
        assert_eq!(Algorithm::default(), Algorithm::Sha1);
    }

    #[test]
    fn hash_block_matches_full_block_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        fs::write(&path, vec![7u8; 4096]).unwrap();
        let (offset, digest) = hash_block(&path, 0, 4096, Algorithm::Sha1).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(digest.len(), 40);
    }

    #[test]
    fn hash_block_handles_short_final_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        fs::write(&path, vec![3u8; 10]).unwrap();
        let (_, full) = hash_block(&path, 0, 1024, Algorithm::Sha256).unwrap();
        let (_, streaming) = hash_block_streaming(&path, 0, 1024, Algorithm::Sha256).unwrap();
        assert_eq!(full, streaming);
    }

    #[test]
    fn streaming_and_buffered_hashing_agree() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        fs::write(&path, (0u8..=255).cycle().take(10_000).collect::<Vec<_>>()).unwrap();
        for algorithm in [
            Algorithm::Sha1,
            Algorithm::Sha256,
            Algorithm::Md5,
            Algorithm::Blake2b,
            Algorithm::Blake3,
        ] {
            let (_, a) = hash_block(&path, 0, 10_000, algorithm).unwrap();
            let (_, b) = hash_block_streaming(&path, 0, 10_000, algorithm).unwrap();
            assert_eq!(a, b, "mismatch for {algorithm}");
        }
    }
}
