//! Background sector update dispatcher
//!
//! Mesh rebuilds run on a small blocking worker pool owned by a dedicated
//! runtime. Concurrency is bounded twice: by the runtime's blocking
//! threads and by the fixed scratch-slot pool, so a burst of dirty
//! sectors queues up instead of allocating without limit. Results come
//! back over a channel and are published on the caller's thread.

use crate::core::Error;
use crate::core::types::Result;
use crate::dispatch::mesher::{SectorMesh, SectorSnapshot, build_sector_mesh};
use crate::dispatch::scratch::SlotPool;
use crate::terrain::node::SectorKey;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

struct PendingJob {
    snapshot: SectorSnapshot,
    lod: u8,
}

/// Schedules sector mesh rebuilds onto background workers
pub struct UpdateDispatcher {
    queued: VecDeque<PendingJob>,
    running: HashSet<SectorKey>,
    slots: Arc<SlotPool>,
    result_tx: mpsc::UnboundedSender<(SectorKey, SectorMesh)>,
    result_rx: mpsc::UnboundedReceiver<(SectorKey, SectorMesh)>,
    runtime: tokio::runtime::Runtime,
}

impl UpdateDispatcher {
    /// `max_workers` bounds concurrent builds; `grid_size` sizes the
    /// scratch buffers for the sector grids being meshed
    pub fn new(max_workers: usize, grid_size: usize) -> Result<Self> {
        let workers = max_workers.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("sector-mesher")
            .enable_all()
            .build()
            .map_err(|e| Error::Streaming(format!("dispatcher runtime: {}", e)))?;
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        Ok(Self {
            queued: VecDeque::new(),
            running: HashSet::new(),
            slots: Arc::new(SlotPool::new(workers, grid_size)),
            result_tx,
            result_rx,
            runtime,
        })
    }

    /// Queue a sector rebuild. A sector already queued or running is not
    /// queued again; returns whether the job was accepted.
    pub fn queue_job(&mut self, snapshot: SectorSnapshot, lod: u8) -> bool {
        let key = snapshot.key;
        if self.contains(key) {
            return false;
        }
        self.queued.push_back(PendingJob { snapshot, lod });
        true
    }

    /// True while a job for this sector is queued or running
    pub fn contains(&self, key: SectorKey) -> bool {
        self.running.contains(&key) || self.queued.iter().any(|j| j.snapshot.key == key)
    }

    /// Cancel a queued job. Jobs already running finish normally and their
    /// result is dropped by the caller via the stale-key check on publish.
    pub fn remove_job(&mut self, key: SectorKey) -> bool {
        let before = self.queued.len();
        self.queued.retain(|j| j.snapshot.key != key);
        before != self.queued.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Collect finished meshes and start as many pending jobs as slots
    /// allow. With `block` set, waits until every queued and running job
    /// has completed.
    pub fn sync_all(&mut self, block: bool) -> Vec<(SectorKey, SectorMesh)> {
        let mut results = Vec::new();

        while let Ok((key, mesh)) = self.result_rx.try_recv() {
            self.running.remove(&key);
            results.push((key, mesh));
        }
        self.start_pending();

        if block {
            while !self.running.is_empty() || !self.queued.is_empty() {
                match self.result_rx.blocking_recv() {
                    Some((key, mesh)) => {
                        self.running.remove(&key);
                        results.push((key, mesh));
                        self.start_pending();
                    }
                    None => break,
                }
            }
        }
        results
    }

    fn start_pending(&mut self) {
        while !self.queued.is_empty() {
            let Some(mut slot) = self.slots.checkout() else {
                break;
            };
            let Some(job) = self.queued.pop_front() else {
                self.slots.give_back(slot);
                break;
            };
            let key = job.snapshot.key;
            self.running.insert(key);

            let slots = Arc::clone(&self.slots);
            let tx = self.result_tx.clone();
            self.runtime.spawn_blocking(move || {
                let mesh = build_sector_mesh(&job.snapshot, job.lod, &mut slot);
                // the slot goes back before the result is published; a job
                // started by the receiver must be able to claim it
                slots.give_back(slot);
                let _ = tx.send((key, mesh));
            });
        }
    }
}
