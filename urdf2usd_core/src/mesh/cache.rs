//! Per-conversion mesh cache
//!
//! Decoded meshes are keyed by resolved path. Each path owns a write-once
//! slot: the first caller decodes, concurrent callers for the same path block
//! on the slot and then reuse its result, including a decode failure.

use dashmap::DashMap;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use super::{load_mesh, NormalizedMesh};
use crate::error::MeshDecodeError;

pub type MeshResult = Result<Arc<NormalizedMesh>, MeshDecodeError>;

type Slot = Arc<OnceLock<MeshResult>>;

/// Mesh cache statistics
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshCacheStats {
    pub hits: usize,
    pub misses: usize,
    pub failures: usize,
}

impl MeshCacheStats {
    /// Get cache hit rate
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f32 / total as f32
    }
}

/// Write-once cache of normalized meshes
#[derive(Default)]
pub struct MeshCache {
    slots: DashMap<PathBuf, Slot>,
    weld_epsilon: f32,
    hits: AtomicUsize,
    misses: AtomicUsize,
    failures: AtomicUsize,
}

impl MeshCache {
    pub fn new(weld_epsilon: f32) -> Self {
        Self {
            weld_epsilon,
            ..Self::default()
        }
    }

    /// Get or decode a mesh
    pub fn get_or_load(&self, path: &Path) -> MeshResult {
        self.get_or_load_with(path, |p| load_mesh(p, self.weld_epsilon))
    }

    /// Get or produce a mesh with a custom loader
    pub fn get_or_load_with<F>(&self, path: &Path, loader: F) -> MeshResult
    where
        F: FnOnce(&Path) -> Result<NormalizedMesh, MeshDecodeError>,
    {
        // The map shard lock is released before decoding starts
        let slot: Slot = self
            .slots
            .entry(path.to_path_buf())
            .or_default()
            .value()
            .clone();

        let mut loaded_here = false;
        let result = slot.get_or_init(|| {
            loaded_here = true;
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Mesh cache MISS, decoding: {}", path.display());
            let result = loader(path).map(Arc::new);
            if result.is_err() {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
            result
        });

        if !loaded_here {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Mesh cache HIT: {}", path.display());
        }
        result.clone()
    }

    /// Decode every path in parallel; results keep the input order
    pub fn load_all(&self, paths: &[PathBuf]) -> Vec<(PathBuf, MeshResult)> {
        let results: Vec<_> = paths
            .par_iter()
            .map(|path| (path.clone(), self.get_or_load(path)))
            .collect();

        let stats = self.stats();
        info!(
            "Decoded {} meshes ({} cache hits, {} failures)",
            stats.misses, stats.hits, stats.failures
        );
        results
    }

    /// A previously decoded mesh, without decoding
    pub fn get(&self, path: &Path) -> Option<MeshResult> {
        self.slots
            .get(path)
            .and_then(|slot| slot.value().get().cloned())
    }

    pub fn stats(&self) -> MeshCacheStats {
        MeshCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
