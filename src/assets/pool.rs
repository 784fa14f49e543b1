//! Deduplicated geometry pool
//!
//! Every placement that references the same geometry name shares one pool
//! entry; handles bump a refcount on clone and drop it on release. Unused
//! entries are not freed inline. A zero-refcount entry survives until a
//! collection pass finds it past the grace window, so a sector that is
//! unloaded and reloaded within a couple of seconds reuses the payload
//! instead of hitting disk again.

use crate::assets::geometry::GeometryAsset;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Lifecycle state of a pool entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AssetState {
    Unloaded = 0,
    Streaming = 1,
    Resident = 2,
    Failed = 3,
}

impl AssetState {
    fn from_u8(v: u8) -> AssetState {
        match v {
            1 => AssetState::Streaming,
            2 => AssetState::Resident,
            3 => AssetState::Failed,
            _ => AssetState::Unloaded,
        }
    }
}

/// One named geometry slot in the pool
pub struct GeometryEntry {
    name: String,
    refcount: AtomicU32,
    state: AtomicU8,
    payload: Mutex<Option<Arc<GeometryAsset>>>,
    footprint: AtomicUsize,
    /// Milliseconds since pool epoch of the last acquire or release
    last_touch: AtomicU64,
}

impl GeometryEntry {
    /// Original (case-preserved) asset name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn state(&self) -> AssetState {
        AssetState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn footprint_bytes(&self) -> usize {
        self.footprint.load(Ordering::Acquire)
    }

    /// Resident payload, if streaming has completed
    pub fn payload(&self) -> Option<Arc<GeometryAsset>> {
        self.payload.lock().unwrap().clone()
    }
}

/// Shared reference to a pool entry.
///
/// Cloning increments the entry refcount, dropping decrements it. The
/// handle stays valid across load and release cycles; only the payload
/// comes and goes.
pub struct GeometryHandle {
    entry: Arc<GeometryEntry>,
    pool_epoch: Instant,
}

impl GeometryHandle {
    pub fn entry(&self) -> &GeometryEntry {
        &self.entry
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn state(&self) -> AssetState {
        self.entry.state()
    }

    /// Resident payload, if any
    pub fn payload(&self) -> Option<Arc<GeometryAsset>> {
        self.entry.payload()
    }
}

impl Clone for GeometryHandle {
    fn clone(&self) -> Self {
        self.entry.refcount.fetch_add(1, Ordering::AcqRel);
        Self {
            entry: Arc::clone(&self.entry),
            pool_epoch: self.pool_epoch,
        }
    }
}

impl Drop for GeometryHandle {
    fn drop(&mut self) {
        let elapsed = self.pool_epoch.elapsed().as_millis() as u64;
        self.entry.last_touch.store(elapsed, Ordering::Release);
        self.entry.refcount.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for GeometryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryHandle")
            .field("name", &self.entry.name)
            .field("refcount", &self.entry.refcount())
            .field("state", &self.entry.state())
            .finish()
    }
}

/// Name-keyed deduplication pool for geometry assets
pub struct GeometryPool {
    /// Keyed by lowercased name; entries keep the original casing
    entries: Mutex<HashMap<String, Arc<GeometryEntry>>>,
    epoch: Instant,
    grace_window_ms: u64,
}

impl GeometryPool {
    pub fn new(grace_window_secs: f32) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            epoch: Instant::now(),
            grace_window_ms: (grace_window_secs.max(0.0) * 1000.0) as u64,
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Acquire a handle for a named asset, creating an entry on first use.
    ///
    /// Lookup is case-insensitive. A fresh entry starts in `Unloaded`
    /// state; the streaming coordinator notices unloaded entries with a
    /// positive refcount and schedules the disk load.
    pub fn acquire(&self, name: &str) -> GeometryHandle {
        let key = name.to_ascii_lowercase();
        let now = self.now_ms();
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(key)
            .or_insert_with(|| {
                Arc::new(GeometryEntry {
                    name: name.to_string(),
                    refcount: AtomicU32::new(0),
                    state: AtomicU8::new(AssetState::Unloaded as u8),
                    payload: Mutex::new(None),
                    footprint: AtomicUsize::new(0),
                    last_touch: AtomicU64::new(now),
                })
            })
            .clone();
        entry.refcount.fetch_add(1, Ordering::AcqRel);
        entry.last_touch.store(now, Ordering::Release);
        GeometryHandle {
            entry,
            pool_epoch: self.epoch,
        }
    }

    /// Publish a loaded payload into an entry
    pub fn make_resident(&self, entry: &GeometryEntry, asset: Arc<GeometryAsset>) {
        let footprint = asset.footprint_bytes();
        *entry.payload.lock().unwrap() = Some(asset);
        entry.footprint.store(footprint, Ordering::Release);
        entry.state.store(AssetState::Resident as u8, Ordering::Release);
    }

    /// Mark an entry as being loaded
    pub fn mark_streaming(&self, entry: &GeometryEntry) {
        entry
            .state
            .store(AssetState::Streaming as u8, Ordering::Release);
    }

    /// Mark an entry as failed and substitute the fallback payload
    pub fn mark_failed(&self, entry: &GeometryEntry, fallback: Arc<GeometryAsset>) {
        let footprint = fallback.footprint_bytes();
        *entry.payload.lock().unwrap() = Some(fallback);
        entry.footprint.store(footprint, Ordering::Release);
        entry.state.store(AssetState::Failed as u8, Ordering::Release);
    }

    /// Drop an entry's payload without removing the entry
    pub fn release_payload(&self, entry: &GeometryEntry) {
        *entry.payload.lock().unwrap() = None;
        entry.footprint.store(0, Ordering::Release);
        entry
            .state
            .store(AssetState::Unloaded as u8, Ordering::Release);
    }

    /// Number of live entries, including zero-refcount ones in grace
    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Total footprint of resident payloads
    pub fn resident_bytes(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .map(|e| e.footprint_bytes())
            .sum()
    }

    /// Entry for a name, if one exists
    pub fn get(&self, name: &str) -> Option<Arc<GeometryEntry>> {
        self.entries
            .lock()
            .unwrap()
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    /// Snapshot of every live entry
    pub fn entries(&self) -> Vec<Arc<GeometryEntry>> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    /// Entries that currently want a load: positive refcount, no payload,
    /// not already streaming
    pub fn pending_loads(&self) -> Vec<Arc<GeometryEntry>> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.refcount() > 0 && e.state() == AssetState::Unloaded)
            .cloned()
            .collect()
    }

    /// Remove entries whose refcount is zero and whose last touch is past
    /// the grace window. Entries mid-stream are skipped so an in-flight
    /// load never races its own removal. Returns the number of entries
    /// collected.
    pub fn collect_garbage(&self) -> usize {
        let now = self.now_ms();
        let mut entries = self.entries.lock().unwrap();
        let mut doomed = Vec::new();
        for (key, entry) in entries.iter() {
            if entry.refcount() != 0 || entry.state() == AssetState::Streaming {
                continue;
            }
            let touched = entry.last_touch.load(Ordering::Acquire);
            if now.saturating_sub(touched) >= self.grace_window_ms {
                doomed.push(key.clone());
            }
        }
        // Entries leave the map before their payloads drop; a concurrent
        // acquire of the same name must get a fresh entry.
        let mut reaped = Vec::with_capacity(doomed.len());
        for key in &doomed {
            if let Some(entry) = entries.remove(key) {
                reaped.push(entry);
            }
        }
        drop(entries);
        let count = reaped.len();
        if count > 0 {
            log::debug!("geometry pool collected {} unused entries", count);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::geometry::{GeometryAsset, GeometryData};

    fn tiny_asset(name: &str) -> Arc<GeometryAsset> {
        Arc::new(GeometryAsset::from_data(GeometryData {
            name: name.to_string(),
            positions: vec![[0.0; 3]],
            normals: vec![[0.0, 0.0, 1.0]],
            indices: vec![0],
        }))
    }

    #[test]
    fn test_acquire_deduplicates_case_insensitively() {
        let pool = GeometryPool::new(0.0);
        let a = pool.acquire("Rocks/Boulder_A");
        let b = pool.acquire("rocks/boulder_a");
        assert_eq!(pool.entry_count(), 1);
        assert_eq!(a.entry().refcount(), 2);
        assert_eq!(a.name(), "Rocks/Boulder_A");
        drop(b);
        assert_eq!(a.entry().refcount(), 1);
    }

    #[test]
    fn test_clone_and_drop_track_refcount() {
        let pool = GeometryPool::new(0.0);
        let a = pool.acquire("trees/pine_01");
        let b = a.clone();
        assert_eq!(a.entry().refcount(), 2);
        drop(b);
        assert_eq!(a.entry().refcount(), 1);
    }

    #[test]
    fn test_gc_only_collects_zero_refcount() {
        let pool = GeometryPool::new(0.0);
        let held = pool.acquire("trees/pine_01");
        let released = pool.acquire("rocks/boulder_a");
        drop(released);

        assert_eq!(pool.collect_garbage(), 1);
        assert_eq!(pool.entry_count(), 1);
        assert_eq!(held.entry().refcount(), 1);

        // still referenced, never collected no matter how many passes run
        assert_eq!(pool.collect_garbage(), 0);
        assert_eq!(pool.entry_count(), 1);
    }

    #[test]
    fn test_grace_window_defers_collection() {
        let pool = GeometryPool::new(1000.0);
        let handle = pool.acquire("rocks/boulder_a");
        drop(handle);

        assert_eq!(pool.collect_garbage(), 0);
        assert_eq!(pool.entry_count(), 1);
    }

    #[test]
    fn test_reacquire_during_grace_reuses_payload() {
        let pool = GeometryPool::new(1000.0);
        let first = pool.acquire("rocks/boulder_a");
        pool.make_resident(first.entry(), tiny_asset("rocks/boulder_a"));
        drop(first);

        pool.collect_garbage();
        let again = pool.acquire("rocks/boulder_a");
        assert_eq!(again.state(), AssetState::Resident);
        assert!(again.payload().is_some());
    }

    #[test]
    fn test_streaming_entries_survive_gc() {
        let pool = GeometryPool::new(0.0);
        let handle = pool.acquire("trees/pine_01");
        pool.mark_streaming(handle.entry());
        drop(handle);

        assert_eq!(pool.collect_garbage(), 0);
        assert_eq!(pool.entry_count(), 1);
    }

    #[test]
    fn test_pending_loads_filters_states() {
        let pool = GeometryPool::new(0.0);
        let wants_load = pool.acquire("a");
        let streaming = pool.acquire("b");
        pool.mark_streaming(streaming.entry());
        let resident = pool.acquire("c");
        pool.make_resident(resident.entry(), tiny_asset("c"));

        let pending = pool.pending_loads();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name(), "a");
        drop((wants_load, streaming, resident));
    }

    #[test]
    fn test_failed_entry_gets_fallback_payload() {
        let pool = GeometryPool::new(0.0);
        let handle = pool.acquire("missing/thing");
        pool.mark_failed(handle.entry(), GeometryAsset::placeholder());
        assert_eq!(handle.state(), AssetState::Failed);
        assert_eq!(
            handle.payload().expect("missing fallback").name,
            "placeholder_cube"
        );
    }

    #[test]
    fn test_release_payload_returns_to_unloaded() {
        let pool = GeometryPool::new(0.0);
        let handle = pool.acquire("rocks/boulder_a");
        pool.make_resident(handle.entry(), tiny_asset("rocks/boulder_a"));
        assert!(pool.resident_bytes() > 0);

        pool.release_payload(handle.entry());
        assert_eq!(handle.state(), AssetState::Unloaded);
        assert_eq!(pool.resident_bytes(), 0);
    }
}
