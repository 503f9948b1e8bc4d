//! Generic bounded-concurrency worker pool (C3).
//!
//! One generator thread lazily produces input values onto a bounded
//! channel; `N` worker threads each pull a value, apply a user-supplied
//! function, and push the result onto a bounded output channel; the
//! caller drains the output channel until every worker has exited.
//!
//! Queues are bounded to capacity `N` so a fast generator can't outrun
//! slow workers and balloon memory. Termination is sentinel-based: the
//! generator pushes exactly `N` `None` markers after the last real input,
//! and a worker that reads one exits without pushing anything downstream.
//! This is the same pool used for both hash-map construction and block
//! transfer dispatch — one shape serves both roles.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver};

use crate::error::{Error, Result};

/// A running worker pool. Outputs are unordered with respect to inputs;
/// callers that need order must sort after draining.
pub struct WorkerPool<R> {
    /// `None` once the receiver has been dropped to unblock workers ahead
    /// of joining them (see `Drop`); `Some` for the pool's entire normal
    /// lifetime otherwise.
    output_rx: Option<Receiver<Result<R>>>,
    handles: Vec<JoinHandle<()>>,
}

impl<R: Send + 'static> WorkerPool<R> {
    /// Starts the generator and `concurrency` worker threads. `generator`
    /// is consumed lazily on its own thread; `worker_fn` is applied to
    /// each value by whichever worker thread picks it up, and must be
    /// safe to run with no access to shared mutable state beyond what it
    /// closes over immutably.
    pub fn run<T, I, F>(concurrency: usize, generator: I, worker_fn: F) -> Self
    where
        T: Send + 'static,
        I: IntoIterator<Item = T> + Send + 'static,
        F: Fn(T) -> Result<R> + Send + Sync + 'static,
    {
        let concurrency = concurrency.max(1);
        let (input_tx, input_rx) = bounded::<Option<T>>(concurrency);
        let (output_tx, output_rx) = bounded::<Result<R>>(concurrency);

        let mut handles = Vec::with_capacity(concurrency + 1);

        handles.push(thread::spawn(move || {
            for value in generator.into_iter() {
                if input_tx.send(Some(value)).is_err() {
                    break;
                }
            }
            for _ in 0..concurrency {
                if input_tx.send(None).is_err() {
                    break;
                }
            }
        }));

        let worker_fn = Arc::new(worker_fn);
        for _ in 0..concurrency {
            let input_rx = input_rx.clone();
            let output_tx = output_tx.clone();
            let worker_fn = Arc::clone(&worker_fn);
            handles.push(thread::spawn(move || loop {
                match input_rx.recv() {
                    Ok(Some(value)) => {
                        let result = worker_fn(value);
                        if output_tx.send(result).is_err() {
                            break;
                        }
                    }
                    _ => break,
                }
            }));
        }
        drop(output_tx);
        drop(input_rx);

        WorkerPool {
            output_rx: Some(output_rx),
            handles,
        }
    }

    /// Drains every output, returning the first error any worker
    /// reported. On error the remaining workers are still joined (their
    /// in-flight sends simply fail once the output channel closes) — see
    /// `Drop`, which drops the receiver before joining so a worker blocked
    /// on `output_tx.send` is unblocked rather than left to deadlock.
    pub fn collect(mut self) -> Result<Vec<R>> {
        let rx = self
            .output_rx
            .take()
            .expect("output_rx set for pool lifetime");
        let mut results = Vec::new();
        for item in rx.iter() {
            results.push(item?);
        }
        Ok(results)
    }

    /// Consumes the pool as an iterator over its (unordered) outputs,
    /// for callers that want to act on each result as it arrives instead
    /// of waiting for the whole set — streaming the hash list to an HTTP
    /// response body, for instance, without buffering it first.
    pub fn into_iter(self) -> PoolIter<R> {
        PoolIter(self)
    }
}

/// Iterator adapter over a [`WorkerPool`]'s output. Dropping it (whether
/// drained fully or abandoned early) joins every worker thread.
pub struct PoolIter<R>(WorkerPool<R>);

impl<R> Iterator for PoolIter<R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.output_rx.as_ref()?.recv().ok()
    }
}

impl<R> Drop for WorkerPool<R> {
    fn drop(&mut self) {
        // Drop the receiver *before* joining. A worker that's still
        // blocked on `output_tx.send` (because the consumer abandoned the
        // output early, e.g. on the first error) only gets a disconnected
        // error and exits once every receiver is gone; if the field were
        // joined first and dropped last (the default field-drop order),
        // such a worker would block forever and `join()` would hang.
        self.output_rx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Runs `worker_fn` over every value from `generator` using `concurrency`
/// workers and collects the results. Convenience wrapper around
/// [`WorkerPool::run`] for callers that just want a `Vec` back.
pub fn map_parallel<T, R, I, F>(concurrency: usize, generator: I, worker_fn: F) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    I: IntoIterator<Item = T> + Send + 'static,
    F: Fn(T) -> Result<R> + Send + Sync + 'static,
{
    WorkerPool::run(concurrency, generator, worker_fn).collect()
}
