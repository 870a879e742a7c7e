//! Parallel element loops over a shared store.
//!
//! The assembly pattern is one scratch buffer per worker and a shared
//! `&StatefulPropertyStore`. [`ElementLoop`] hands out chunks of an
//! element list over a bounded crossbeam channel to scoped worker
//! threads; each worker reuses its own [`ScratchPropertyBuffer`] for
//! every element it processes.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;
use tracing::debug;

use kiln_core::{ElementId, Side};

use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::scratch::ScratchPropertyBuffer;
use crate::store::StatefulPropertyStore;

/// Runs a per-element callback over many elements on a worker pool.
#[derive(Clone, Debug)]
pub struct ElementLoop {
    worker_count: usize,
    scratch_qpoints: usize,
    chunk_size: usize,
}

impl ElementLoop {
    /// Default number of elements per dispatched chunk.
    pub const DEFAULT_CHUNK_SIZE: usize = 64;

    /// Size the pool from `config`.
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            worker_count: config.resolved_worker_count(),
            scratch_qpoints: config.scratch_qpoints,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Dispatch `chunk_size` elements at a time (at least one).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Call `f` once for every `(element, side)` in `elements`.
    ///
    /// Elements are processed in unspecified order. After the first
    /// failure no new chunks are dispatched, and the error is returned
    /// once every worker has stopped. A worker whose callback fails while
    /// its scratch is swapped in swaps back before stopping.
    ///
    /// # Errors
    ///
    /// - The first error returned by `f`.
    /// - [`StorageError::WorkerSpawn`] if a worker thread cannot start.
    pub fn run<F>(
        &self,
        store: &StatefulPropertyStore,
        elements: &[(ElementId, Side)],
        f: F,
    ) -> Result<(), StorageError>
    where
        F: Fn(&StatefulPropertyStore, &mut ScratchPropertyBuffer, ElementId, Side) -> Result<(), StorageError>
            + Sync,
    {
        if elements.is_empty() {
            return Ok(());
        }
        let chunks = elements.len().div_ceil(self.chunk_size);
        let workers = self.worker_count.min(chunks).max(1);
        if workers == 1 {
            let mut scratch = ScratchPropertyBuffer::new(self.scratch_qpoints);
            return run_chunk(store, &mut scratch, elements, &f);
        }

        let failed = AtomicBool::new(false);
        let first_error: Mutex<Option<StorageError>> = Mutex::new(None);

        thread::scope(|scope| -> Result<(), StorageError> {
            let (task_tx, task_rx) = crossbeam_channel::bounded::<Range<usize>>(workers * 4);
            for i in 0..workers {
                let task_rx = task_rx.clone();
                let (f, failed, first_error) = (&f, &failed, &first_error);
                let qpoints = self.scratch_qpoints;
                let _worker = thread::Builder::new()
                    .name(format!("kiln-element-{i}"))
                    .spawn_scoped(scope, move || {
                        let mut scratch = ScratchPropertyBuffer::new(qpoints);
                        for range in task_rx.iter() {
                            // Keep draining so the dispatcher never blocks.
                            if failed.load(Ordering::Acquire) {
                                continue;
                            }
                            if let Err(err) = run_chunk(store, &mut scratch, &elements[range], f) {
                                failed.store(true, Ordering::Release);
                                first_error.lock().get_or_insert(err);
                            }
                        }
                    })
                    .map_err(|e| StorageError::WorkerSpawn {
                        reason: e.to_string(),
                    })?;
            }
            drop(task_rx);

            let len = elements.len();
            for start in (0..len).step_by(self.chunk_size) {
                if failed.load(Ordering::Acquire) {
                    break;
                }
                if task_tx.send(start..(start + self.chunk_size).min(len)).is_err() {
                    break;
                }
            }
            Ok(())
        })?;

        debug!(workers, elements = elements.len(), "element loop finished");
        match first_error.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn run_chunk<F>(
    store: &StatefulPropertyStore,
    scratch: &mut ScratchPropertyBuffer,
    elements: &[(ElementId, Side)],
    f: &F,
) -> Result<(), StorageError>
where
    F: Fn(&StatefulPropertyStore, &mut ScratchPropertyBuffer, ElementId, Side) -> Result<(), StorageError>,
{
    for &(element, side) in elements {
        if let Err(err) = f(store, scratch, element, side) {
            if let Some((e, s)) = scratch.swapped_with() {
                store.swap_back(scratch, e, s);
            }
            return Err(err);
        }
    }
    Ok(())
}
