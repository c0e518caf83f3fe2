//
// state.rs
//
// Per-session index state: the current workspace tree, the settings it was
// built with, and the outcome of the last refresh.
//

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::query::RefreshStats;
use crate::tree::WorkspaceTree;
use crate::workspace_api::WorkspaceApi;

/// Outcome of the most recent refresh.
#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub finished_at: Instant,
    pub result: Result<RefreshStats, String>,
}

impl RefreshRecord {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Shared index state for one editor session.
///
/// Readers take an `Arc` snapshot of the tree and never block on a refresh.
/// A refresh builds a complete tree off to the side and swaps it in, so a
/// snapshot is always a fully populated tree.
pub struct WorkspaceState {
    tree: RwLock<Arc<WorkspaceTree>>,
    config: RwLock<IndexConfig>,
    generation: AtomicU64,
    last_refresh: RwLock<Option<RefreshRecord>>,
}

impl WorkspaceState {
    pub fn new(config: IndexConfig) -> Self {
        log::info!(
            "Initializing workspace state (executable: {}, build file: {})",
            config.executable,
            config.build_file_name
        );
        Self {
            tree: RwLock::new(Arc::new(WorkspaceTree::new())),
            config: RwLock::new(config),
            generation: AtomicU64::new(0),
            last_refresh: RwLock::new(None),
        }
    }

    /// The current tree. Holding the snapshot does not block refreshes.
    pub fn snapshot(&self) -> Arc<WorkspaceTree> {
        self.tree
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run `f` against an API over the current snapshot.
    pub fn with_api<T>(&self, f: impl FnOnce(&WorkspaceApi<'_>) -> T) -> T {
        let tree = self.snapshot();
        let build_file_name = self.config().build_file_name;
        let api = WorkspaceApi::new(&tree).with_build_file_name(build_file_name);
        f(&api)
    }

    /// Swap in a freshly built tree and record the refresh as successful.
    pub fn replace(&self, tree: WorkspaceTree, stats: RefreshStats) {
        {
            let mut current = self
                .tree
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *current = Arc::new(tree);
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!("Workspace tree replaced (generation {})", generation);
        self.record(Ok(stats));
    }

    /// Record a failed refresh. The current tree stays in place.
    pub fn record_failure(&self, error: &IndexError) {
        log::warn!("Index refresh failed, keeping previous tree: {}", error);
        self.record(Err(error.to_string()));
    }

    /// Number of successful swaps so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn last_refresh(&self) -> Option<RefreshRecord> {
        self.last_refresh
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn config(&self) -> IndexConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Install new settings. Returns true if the index should be rebuilt
    /// for them to take effect.
    pub fn update_config(&self, config: IndexConfig) -> bool {
        let mut current = self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let rebuild = current.requires_rebuild(&config);
        *current = config;
        rebuild
    }

    fn record(&self, result: Result<RefreshStats, String>) {
        let mut last = self
            .last_refresh
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = Some(RefreshRecord {
            finished_at: Instant::now(),
            result,
        });
    }
}

impl Default for WorkspaceState {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}
