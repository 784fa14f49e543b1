//! Streaming priority coordinator
//!
//! Once per tick the coordinator drains finished loads, rebuilds its
//! three work queues from the pool's current state, and spends a byte
//! budget starting the most important loads. Entries it cannot afford
//! this tick stay unloaded and compete again next tick; nothing is
//! dropped for being over budget. Failed loads get the fallback payload
//! so their placements stay visible.

use crate::assets::geometry::GeometryAsset;
use crate::assets::pool::{AssetState, GeometryHandle, GeometryPool};
use crate::core::config::{PoolConfig, StreamingConfig};
use crate::core::Error;
use crate::core::types::{Result, Vec3};
use crate::streaming::budget::StreamBudget;
use crate::streaming::loader::{AssetLoader, LoadResult};
use crate::streaming::priority::{CameraState, cmp_importance_desc, compute_importance};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Assumed size of an asset whose footprint is not known yet
const DEFAULT_FOOTPRINT_HINT: usize = 64 * 1024;

/// Per-asset streaming interest, refreshed by whoever draws it
#[derive(Clone, Copy, Debug)]
struct StreamInterest {
    center: Vec3,
    radius: f32,
    footprint_hint: usize,
    last_frame: u32,
    full_update: bool,
}

/// Counters for one coordinator tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    pub loads_started: usize,
    pub bytes_started: usize,
    pub loads_completed: usize,
    pub loads_failed: usize,
    pub released: usize,
    pub collected: usize,
}

/// Drives geometry streaming against a byte budget
pub struct StreamingCoordinator {
    pool: Arc<GeometryPool>,
    loader: AssetLoader,
    budget: StreamBudget,
    cfg: StreamingConfig,
    gc_interval_frames: u32,
    interest: HashMap<String, StreamInterest>,
    /// Exact bytes charged to the budget per in-flight load; credited back
    /// on completion or failure even if the hint changes mid-flight
    charged: HashMap<String, usize>,
    fallback: Arc<GeometryAsset>,
    frame: u32,
    total_loads_completed: usize,
    total_bytes_streamed: usize,
}

impl StreamingCoordinator {
    pub fn new(
        pool: Arc<GeometryPool>,
        base_dir: PathBuf,
        streaming: StreamingConfig,
        pool_cfg: &PoolConfig,
    ) -> Result<Self> {
        let loader = AssetLoader::new(base_dir, streaming.max_concurrent_loads)
            .map_err(|e| Error::Streaming(format!("loader: {}", e)))?;
        Ok(Self {
            pool,
            loader,
            budget: StreamBudget::new(streaming.pool_ceiling_bytes),
            cfg: streaming,
            gc_interval_frames: pool_cfg.gc_interval_frames.max(1),
            interest: HashMap::new(),
            charged: HashMap::new(),
            fallback: GeometryAsset::placeholder(),
            frame: 0,
            total_loads_completed: 0,
            total_bytes_streamed: 0,
        })
    }

    pub fn budget(&self) -> &StreamBudget {
        &self.budget
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Bytes of geometry streamed in over the coordinator's lifetime
    pub fn total_bytes_streamed(&self) -> usize {
        self.total_bytes_streamed
    }

    pub fn total_loads_completed(&self) -> usize {
        self.total_loads_completed
    }

    /// Assets with a recorded streaming interest
    pub fn interest_count(&self) -> usize {
        self.interest.len()
    }

    /// Record that an asset was drawn (or is about to be) this frame
    pub fn note_interest(
        &mut self,
        handle: &GeometryHandle,
        center: Vec3,
        radius: f32,
        footprint_hint: usize,
        full_update: bool,
    ) {
        self.interest.insert(
            handle.name().to_ascii_lowercase(),
            StreamInterest {
                center,
                radius,
                footprint_hint: if footprint_hint > 0 {
                    footprint_hint
                } else {
                    DEFAULT_FOOTPRINT_HINT
                },
                last_frame: self.frame,
                full_update,
            },
        );
    }

    /// Run one streaming tick with at most `budget_bytes` of new loads
    pub fn tick(&mut self, camera: &CameraState, budget_bytes: usize) -> TickStats {
        self.frame = self.frame.wrapping_add(1);
        let mut stats = TickStats::default();

        // 1. publish finished loads
        for result in self.loader.poll_results() {
            let charged = self
                .charged
                .remove(&result.name().to_ascii_lowercase())
                .unwrap_or(0);
            let Some(entry) = self.pool.get(result.name()) else {
                self.budget.remove(charged);
                continue;
            };
            match result {
                LoadResult::Loaded(_, data) => {
                    let asset = Arc::new(GeometryAsset::from_data(data));
                    let footprint = asset.footprint_bytes();
                    self.budget.remove(charged);
                    self.budget.add(footprint);
                    self.pool.make_resident(&entry, asset);
                    stats.loads_completed += 1;
                    self.total_loads_completed += 1;
                    self.total_bytes_streamed += footprint;
                }
                LoadResult::NotFound(name) => {
                    log::warn!("geometry '{}' not found, substituting placeholder", name);
                    self.budget.remove(charged);
                    self.pool.mark_failed(&entry, Arc::clone(&self.fallback));
                    stats.loads_failed += 1;
                }
                LoadResult::Error(name, why) => {
                    log::warn!("geometry '{}' failed to load ({}), substituting placeholder", name, why);
                    self.budget.remove(charged);
                    self.pool.mark_failed(&entry, Arc::clone(&self.fallback));
                    stats.loads_failed += 1;
                }
            }
        }

        // 2. release queue: resident entries nothing important still wants
        let mut to_release = Vec::new();
        for entry in self.pool.entries() {
            if entry.state() != AssetState::Resident {
                continue;
            }
            let importance = self.importance_of(camera, entry.name());
            let stale = self
                .interest
                .get(&entry.name().to_ascii_lowercase())
                .map(|i| self.frame.wrapping_sub(i.last_frame) > self.cfg.stale_frame_count)
                .unwrap_or(true);
            if importance < self.cfg.release_threshold || stale {
                to_release.push((importance, entry));
            }
        }
        // least important released first; a mass eviction is spread over
        // several ticks
        to_release.sort_by(|a, b| cmp_importance_desc(b.0, a.0));
        let release_cap = self.cfg.max_releases_per_tick.max(1);
        for (_, entry) in to_release.into_iter().take(release_cap) {
            self.budget.remove(entry.footprint_bytes());
            self.pool.release_payload(&entry);
            stats.released += 1;
        }

        // 3. load queue: wanted but unloaded, most important first
        let mut to_load = Vec::new();
        for entry in self.pool.pending_loads() {
            let importance = self.importance_of(camera, entry.name());
            to_load.push((importance, entry));
        }
        to_load.sort_by(|a, b| cmp_importance_desc(a.0, b.0));

        for (importance, entry) in to_load {
            let est = self.hint_for(entry.name());
            if stats.bytes_started + est > budget_bytes {
                break;
            }
            // over the pool ceiling the entry stays queued, not dropped
            if !self.budget.can_admit(est) {
                continue;
            }
            if !self.loader.request(entry.name(), importance) {
                continue;
            }
            self.budget.add(est);
            self.charged.insert(entry.name().to_ascii_lowercase(), est);
            self.pool.mark_streaming(&entry);
            stats.loads_started += 1;
            stats.bytes_started += est;
        }

        // 4. delete queue: periodic deferred garbage collection
        if self.frame % self.gc_interval_frames == 0 {
            stats.collected = self.pool.collect_garbage();
        }

        // 5. forget interest nobody refreshed within the stale window
        let frame = self.frame;
        let stale_after = self.cfg.stale_frame_count;
        self.interest
            .retain(|_, i| frame.wrapping_sub(i.last_frame) <= stale_after);

        stats
    }

    /// Block until in-flight loads finish and publish them
    pub fn flush(&mut self) -> TickStats {
        let mut stats = TickStats::default();
        for result in self.loader.drain() {
            let charged = self
                .charged
                .remove(&result.name().to_ascii_lowercase())
                .unwrap_or(0);
            self.budget.remove(charged);
            let Some(entry) = self.pool.get(result.name()) else {
                continue;
            };
            match result {
                LoadResult::Loaded(_, data) => {
                    let asset = Arc::new(GeometryAsset::from_data(data));
                    let footprint = asset.footprint_bytes();
                    self.budget.add(footprint);
                    self.pool.make_resident(&entry, asset);
                    stats.loads_completed += 1;
                    self.total_loads_completed += 1;
                    self.total_bytes_streamed += footprint;
                }
                LoadResult::NotFound(name) | LoadResult::Error(name, _) => {
                    log::warn!("geometry '{}' unavailable, substituting placeholder", name);
                    self.pool.mark_failed(&entry, Arc::clone(&self.fallback));
                    stats.loads_failed += 1;
                }
            }
        }
        stats
    }

    fn hint_for(&self, name: &str) -> usize {
        self.interest
            .get(&name.to_ascii_lowercase())
            .map(|i| i.footprint_hint)
            .unwrap_or(DEFAULT_FOOTPRINT_HINT)
    }

    fn importance_of(&self, camera: &CameraState, name: &str) -> f32 {
        match self.interest.get(&name.to_ascii_lowercase()) {
            Some(i) => compute_importance(camera, i.center, i.radius, i.full_update),
            None => 0.0,
        }
    }
}
