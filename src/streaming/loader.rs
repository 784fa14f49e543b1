//! Async geometry loading with priority-based concurrency

use crate::assets::geometry::{GeometryData, load_geometry};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

/// Request to load a geometry asset with priority
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub name: String,
    pub priority: f32,
}

/// Result of a geometry load operation
#[derive(Debug)]
pub enum LoadResult {
    /// Successfully loaded from disk
    Loaded(String, GeometryData),
    /// Asset file not found on disk
    NotFound(String),
    /// Error during loading
    Error(String, String),
}

impl LoadResult {
    pub fn name(&self) -> &str {
        match self {
            LoadResult::Loaded(name, _) => name,
            LoadResult::NotFound(name) => name,
            LoadResult::Error(name, _) => name,
        }
    }
}

/// Concurrent geometry loader with async I/O
pub struct AssetLoader {
    /// Channel for sending load requests to the worker task
    request_tx: mpsc::UnboundedSender<LoadRequest>,
    /// Channel for receiving load results
    result_rx: mpsc::UnboundedReceiver<LoadResult>,
    /// Names currently being loaded
    pending: HashSet<String>,
    #[allow(dead_code)]
    runtime: Runtime,
}

impl AssetLoader {
    /// Create a loader reading from `base_dir`, with at most
    /// `max_concurrent` loads in flight
    pub fn new(base_dir: PathBuf, max_concurrent: usize) -> std::io::Result<Self> {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<LoadRequest>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<LoadResult>();

        let runtime = Runtime::new()?;
        runtime.spawn(async move {
            Self::worker_loop(base_dir, max_concurrent.max(1), &mut request_rx, result_tx).await;
        });

        Ok(Self {
            request_tx,
            result_rx,
            pending: HashSet::new(),
            runtime,
        })
    }

    /// Worker loop that processes load requests with concurrency control
    async fn worker_loop(
        base_dir: PathBuf,
        max_concurrent: usize,
        request_rx: &mut mpsc::UnboundedReceiver<LoadRequest>,
        result_tx: mpsc::UnboundedSender<LoadResult>,
    ) {
        use tokio::task::JoinSet;

        let mut active_tasks = JoinSet::new();
        let mut pending_requests: Vec<LoadRequest> = Vec::new();

        loop {
            tokio::select! {
                Some(request) = request_rx.recv() => {
                    pending_requests.push(request);
                }

                Some(result) = active_tasks.join_next(), if !active_tasks.is_empty() => {
                    match result {
                        Ok(load_result) => {
                            let _ = result_tx.send(load_result);
                        }
                        Err(e) => {
                            log::error!("geometry load task panicked: {}", e);
                        }
                    }
                }

                else => {
                    if pending_requests.is_empty() && active_tasks.is_empty() {
                        break;
                    }
                }
            }

            // Start new tasks while there is capacity, highest priority first
            while active_tasks.len() < max_concurrent && !pending_requests.is_empty() {
                pending_requests.sort_by(|a, b| b.priority.total_cmp(&a.priority));
                let request = pending_requests.remove(0);

                let base_dir = base_dir.clone();
                active_tasks.spawn(async move {
                    match load_geometry(&base_dir, &request.name).await {
                        Ok(Some(data)) => LoadResult::Loaded(request.name, data),
                        Ok(None) => LoadResult::NotFound(request.name),
                        Err(e) => LoadResult::Error(request.name, e.to_string()),
                    }
                });
            }
        }
    }

    /// Request a load; duplicates of an in-flight name are ignored.
    /// Returns whether the request was queued.
    pub fn request(&mut self, name: &str, priority: f32) -> bool {
        let key = name.to_ascii_lowercase();
        if self.pending.contains(&key) {
            return false;
        }
        if self
            .request_tx
            .send(LoadRequest {
                name: name.to_string(),
                priority,
            })
            .is_err()
        {
            return false;
        }
        self.pending.insert(key);
        true
    }

    /// Collect finished loads without blocking
    pub fn poll_results(&mut self) -> Vec<LoadResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            self.pending.remove(&result.name().to_ascii_lowercase());
            results.push(result);
        }
        results
    }

    /// Block until every requested load has finished
    pub fn drain(&mut self) -> Vec<LoadResult> {
        let mut results = self.poll_results();
        while !self.pending.is_empty() {
            match self.result_rx.blocking_recv() {
                Some(result) => {
                    self.pending.remove(&result.name().to_ascii_lowercase());
                    results.push(result);
                }
                None => break,
            }
        }
        results
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.contains(&name.to_ascii_lowercase())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::geometry::save_geometry;

    fn sample_data(name: &str) -> GeometryData {
        GeometryData {
            name: name.to_string(),
            positions: vec![[0.0; 3]; 4],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    fn write_assets(dir: &std::path::Path, names: &[&str]) {
        let rt = Runtime::new().expect("runtime failed");
        rt.block_on(async {
            for name in names {
                save_geometry(dir, &sample_data(name)).await.expect("save failed");
            }
        });
    }

    #[test]
    fn test_load_existing_asset() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        write_assets(dir.path(), &["rocks/boulder_a"]);

        let mut loader = AssetLoader::new(dir.path().to_path_buf(), 2).expect("loader failed");
        assert!(loader.request("rocks/boulder_a", 1.0));
        let results = loader.drain();
        assert_eq!(results.len(), 1);
        match &results[0] {
            LoadResult::Loaded(name, data) => {
                assert_eq!(name, "rocks/boulder_a");
                assert_eq!(data.indices.len(), 6);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(loader.pending_count(), 0);
    }

    #[test]
    fn test_missing_asset_reports_not_found() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let mut loader = AssetLoader::new(dir.path().to_path_buf(), 2).expect("loader failed");
        loader.request("does/not/exist", 1.0);
        let results = loader.drain();
        assert!(matches!(&results[0], LoadResult::NotFound(name) if name == "does/not/exist"));
    }

    #[test]
    fn test_duplicate_requests_collapse() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        write_assets(dir.path(), &["trees/pine_01"]);

        let mut loader = AssetLoader::new(dir.path().to_path_buf(), 2).expect("loader failed");
        assert!(loader.request("trees/pine_01", 1.0));
        assert!(!loader.request("Trees/Pine_01", 9.0));
        assert!(loader.is_pending("trees/pine_01"));
        assert_eq!(loader.drain().len(), 1);
    }

    #[test]
    fn test_many_loads_all_complete() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let names: Vec<String> = (0..12).map(|i| format!("veg/bush_{:02}", i)).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        write_assets(dir.path(), &refs);

        let mut loader = AssetLoader::new(dir.path().to_path_buf(), 3).expect("loader failed");
        for (i, name) in names.iter().enumerate() {
            loader.request(name, i as f32);
        }
        let results = loader.drain();
        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|r| matches!(r, LoadResult::Loaded(..))));
    }
}
