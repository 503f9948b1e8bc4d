//! Delta coordinator (C6): the client-side state machine that
//! concurrently hashes both sides, diffs the two hash maps, resizes the
//! target, and dispatches parallel block transfers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hashmap::{self, HashMapResult};
use crate::location::Location;
use crate::pool::WorkerPool;

/// Outcome of one [`synchronize`] call.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Number of blocks that differed (or, in whole-file mode, every
    /// block).
    pub transferred_blocks: usize,
    /// Bytes actually written to the target. Zero when `dry_run` is set,
    /// since nothing is written.
    pub transferred_bytes: u64,
    /// `hits / (hits + misses) * 100`.
    pub similarity_index: f64,
    /// True if this report describes a dry run: no blocks were written.
    pub dry_run: bool,
    /// Wall-clock time spent in [`synchronize`], from the initial `exists`
    /// probe through the final transfer join.
    pub elapsed: Duration,
}

impl SyncReport {
    fn nothing_to_do(elapsed: Duration) -> Self {
        Self {
            transferred_blocks: 0,
            transferred_bytes: 0,
            similarity_index: 100.0,
            dry_run: false,
            elapsed,
        }
    }

    /// Bytes per second transferred, or `None` for a dry run or a
    /// near-instantaneous sync where elapsed time rounds to zero.
    pub fn throughput_bytes_per_sec(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        if self.dry_run || secs <= 0.0 {
            return None;
        }
        Some(self.transferred_bytes as f64 / secs)
    }

    /// Prints the user-facing summary line (C11's direct `println!`
    /// reporting channel, not routed through `tracing`).
    pub fn print_summary(&self) {
        if self.transferred_blocks == 0 {
            println!(
                "Nothing to do: target already matches source ({:.2}s).",
                self.elapsed.as_secs_f64()
            );
            return;
        }
        if self.dry_run {
            println!(
                "Dry run: {} block(s) differ ({:.1}% similar); no changes written ({:.2}s).",
                self.transferred_blocks,
                self.similarity_index,
                self.elapsed.as_secs_f64()
            );
        } else {
            let throughput = self
                .throughput_bytes_per_sec()
                .map(|bps| format!("{:.1} MiB/s", bps / (1024.0 * 1024.0)))
                .unwrap_or_else(|| "n/a".to_string());
            println!(
                "Transferred {} block(s), {} bytes ({:.1}% similar) in {:.2}s ({throughput}).",
                self.transferred_blocks,
                self.transferred_bytes,
                self.similarity_index,
                self.elapsed.as_secs_f64()
            );
        }
    }
}

/// "download" if `source` is remote (pulling data toward the local
/// side), "upload" otherwise. Purely a log/report label — the
/// coordinator logic is identical either way.
pub fn direction_label(source: &Location) -> &'static str {
    if source.is_remote() {
        "download"
    } else {
        "upload"
    }
}

/// Runs one synchronize from `source` to `target` per `config`.
pub fn synchronize(source: Location, target: Location, config: &Config) -> Result<SyncReport> {
    let started = Instant::now();
    let source = Arc::new(source);
    let target = Arc::new(target);

    let target_exists = target.exists()?;
    let source_size = source
        .file_size()?
        .ok_or_else(|| Error::usage(format!("source '{}' does not exist", source.describe())))?;

    info!(
        direction = direction_label(&source),
        source = %source.describe(),
        target = %target.describe(),
        "starting synchronize"
    );

    let (changed_offsets, hits, misses) = if config.delta_transfer && target_exists {
        let (source_hashes, target_hashes) = hash_both_sides(&source, &target, config)?;
        diff(&source_hashes, &target_hashes)
    } else {
        debug!("whole-file mode: target absent or delta transfer disabled");
        let offsets: Vec<u64> = hashmap::block_offsets(source_size, config.block_size).collect();
        let misses = offsets.len();
        (offsets, 0usize, misses)
    };

    let similarity_index = if hits + misses == 0 {
        100.0
    } else {
        (hits as f64 / (hits + misses) as f64) * 100.0
    };

    if changed_offsets.is_empty() {
        return Ok(SyncReport::nothing_to_do(started.elapsed()));
    }

    if config.dry_run {
        let estimated_bytes = estimate_transfer_bytes(&changed_offsets, source_size, config.block_size);
        return Ok(SyncReport {
            transferred_blocks: changed_offsets.len(),
            transferred_bytes: estimated_bytes,
            similarity_index,
            dry_run: true,
            elapsed: started.elapsed(),
        });
    }

    if !target_exists || target.file_size()?.unwrap_or(0) != source_size {
        target.resize(source_size)?;
    }

    let transferred_bytes = Arc::new(AtomicU64::new(0));
    let block_size = config.block_size;
    let source_for_pool = Arc::clone(&source);
    let target_for_pool = Arc::clone(&target);
    let counter = Arc::clone(&transferred_bytes);

    WorkerPool::run(config.concurrency, changed_offsets.clone(), move |offset: u64| {
        let length = block_size.min(source_size.saturating_sub(offset));
        let data = source_for_pool.read_block(offset, length)?;
        counter.fetch_add(data.len() as u64, Ordering::Relaxed);
        target_for_pool.write_block(offset, &data)
    })
    .collect()?;

    Ok(SyncReport {
        transferred_blocks: changed_offsets.len(),
        transferred_bytes: transferred_bytes.load(Ordering::Relaxed),
        similarity_index,
        dry_run: false,
        elapsed: started.elapsed(),
    })
}

/// Runs the two hash-map builds in isolated, non-communicating threads
/// and joins both before returning. Neither thread shares mutable state
/// with the other — each fully saturates its own side's cores.
fn hash_both_sides(
    source: &Arc<Location>,
    target: &Arc<Location>,
    config: &Config,
) -> Result<(HashMapResult, HashMapResult)> {
    let block_size = config.block_size;
    let algorithm = config.algorithm;
    let concurrency = config.concurrency;

    thread::scope(|scope| {
        let source_handle = {
            let source = Arc::clone(source);
            scope.spawn(move || source.get_hashes(block_size, algorithm, concurrency))
        };
        let target_handle = {
            let target = Arc::clone(target);
            scope.spawn(move || target.get_hashes(block_size, algorithm, concurrency))
        };
        let source_hashes = source_handle
            .join()
            .map_err(|_| Error::worker("source hashing thread panicked"))??;
        let target_hashes = target_handle
            .join()
            .map_err(|_| Error::worker("target hashing thread panicked"))??;
        Ok((source_hashes, target_hashes))
    })
}

/// Diffs two hash maps over the union of their keys. A key present on
/// only one side is always a miss — this is what makes the size-mismatch
/// edge case correct: the coordinator resizes the target to source size
/// strictly after this diff and strictly before any write, so every
/// offset returned here, including ones that only ever existed on one
/// side, is a valid source offset to fetch and a valid target offset to
/// write once the target is sized to match.
fn diff(source: &HashMapResult, target: &HashMapResult) -> (Vec<u64>, usize, usize) {
    let mut keys: Vec<u64> = source.keys().chain(target.keys()).copied().collect();
    keys.sort_unstable();
    keys.dedup();

    let mut changed = Vec::new();
    let mut hits = 0;
    let mut misses = 0;
    for offset in keys {
        match (source.get(&offset), target.get(&offset)) {
            (Some(a), Some(b)) if a == b => hits += 1,
            _ => {
                misses += 1;
                changed.push(offset);
            }
        }
    }
    (changed, hits, misses)
}

fn estimate_transfer_bytes(changed_offsets: &[u64], source_size: u64, block_size: u64) -> u64 {
    changed_offsets
        .iter()
        .map(|&offset| block_size.min(source_size.saturating_sub(offset)))
        .sum()
}
