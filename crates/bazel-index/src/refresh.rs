//! Serialised index refreshes and the periodic refresh worker.
//!
//! At most one refresh runs at a time. Callers of [`IndexRefresher::refresh`]
//! queue behind the one in flight; [`IndexRefresher::try_refresh`] and the
//! periodic worker skip instead.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::QueryRunner;
use crate::error::{IndexError, Result};
use crate::query::{QueryPipeline, RefreshStats};
use crate::state::WorkspaceState;

/// Rebuilds the index in `state` through `pipeline`. Settings are read from
/// the state at the start of every refresh, so `update_config` takes effect
/// on the next one.
pub struct IndexRefresher<R> {
    pipeline: Arc<QueryPipeline<R>>,
    state: Arc<WorkspaceState>,
    gate: Mutex<()>,
}

impl<R: QueryRunner + 'static> IndexRefresher<R> {
    pub fn new(pipeline: QueryPipeline<R>, state: Arc<WorkspaceState>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            state,
            gate: Mutex::new(()),
        }
    }

    pub fn state(&self) -> &Arc<WorkspaceState> {
        &self.state
    }

    pub fn pipeline(&self) -> &QueryPipeline<R> {
        &self.pipeline
    }

    /// Rebuild the index, waiting for any refresh already in flight.
    pub async fn refresh(&self) -> Result<RefreshStats> {
        let _gate = self.gate.lock().await;
        self.refresh_locked().await
    }

    /// Rebuild the index unless a refresh is already running, in which case
    /// `None` is returned without querying.
    pub async fn try_refresh(&self) -> Option<Result<RefreshStats>> {
        let _gate = self.gate.try_lock().ok()?;
        Some(self.refresh_locked().await)
    }

    async fn refresh_locked(&self) -> Result<RefreshStats> {
        let pipeline = self.pipeline.clone();
        let config = self.state.config();
        let built = tokio::task::spawn_blocking(move || pipeline.build_tree_with(&config))
            .await
            .map_err(|e| IndexError::dispatch("index refresh", io::Error::other(e)))
            .and_then(|result| result);
        crate::perf::increment_refresh_calls();

        match built {
            Ok((tree, stats)) => {
                self.state.replace(tree, stats);
                log::info!(
                    "Index refreshed: {} targets, {} source files, {} packages",
                    stats.build_targets,
                    stats.source_files,
                    stats.packages
                );
                Ok(stats)
            }
            Err(err) => {
                self.state.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Start the periodic worker at the session's configured refresh
    /// interval. `None` when periodic refresh is turned off.
    pub fn spawn_configured(self: &Arc<Self>, token: CancellationToken) -> Option<JoinHandle<()>> {
        let interval = self.state.config().refresh_interval()?;
        Some(self.spawn_periodic(interval, token))
    }

    /// Refresh every `interval` until `token` is cancelled. Ticks that find a
    /// refresh in flight are skipped.
    pub fn spawn_periodic(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let refresher = Arc::clone(self);
        tokio::spawn(async move {
            log::info!("Periodic index refresh started (every {:?})", interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        log::info!("Periodic index refresh stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if refresher.try_refresh().await.is_none() {
                            log::debug!("Refresh already in flight, skipping tick");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::dispatcher::Shell;
    use crate::test_utils::scripted_runner::ScriptedRunner;

    const TARGETS: &str = "cc_binary rule //main:hello-world\ncc_library rule //lib:hello-time\n";
    const SOURCES: &str = "//main:hello-world.cc\n//lib:hello-time.cc\n";

    fn refresher(runner: ScriptedRunner) -> Arc<IndexRefresher<ScriptedRunner>> {
        let pipeline =
            QueryPipeline::new(runner, IndexConfig::default()).with_shell(Shell::posix());
        Arc::new(IndexRefresher::new(
            pipeline,
            Arc::new(WorkspaceState::default()),
        ))
    }

    #[tokio::test]
    async fn test_refresh_swaps_tree() {
        let refresher = refresher(ScriptedRunner::workspace(TARGETS, SOURCES));
        let stats = refresher.refresh().await.unwrap();
        assert_eq!(stats.build_targets, 2);
        assert_eq!(stats.packages, 3);

        let state = refresher.state();
        assert_eq!(state.generation(), 1);
        assert!(state.snapshot().find(&["lib"]).is_some());
        assert!(state.last_refresh().unwrap().succeeded());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_tree() {
        let refresher = refresher(ScriptedRunner::workspace(TARGETS, SOURCES));
        refresher.refresh().await.unwrap();
        let before = refresher.state().snapshot();

        refresher
            .pipeline()
            .runner()
            .push_failure(1, "ERROR: build file syntax error\n");
        let err = refresher.refresh().await.unwrap_err();
        assert!(matches!(err, IndexError::QueryFailed(_)));

        let state = refresher.state();
        assert_eq!(state.generation(), 1);
        assert!(Arc::ptr_eq(&before, &state.snapshot()));
        assert!(!state.last_refresh().unwrap().succeeded());
    }

    #[tokio::test]
    async fn test_try_refresh_skips_while_in_flight() {
        let refresher = refresher(
            ScriptedRunner::workspace(TARGETS, SOURCES).with_delay(Duration::from_millis(200)),
        );

        let background = {
            let refresher = refresher.clone();
            tokio::spawn(async move { refresher.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(refresher.try_refresh().await.is_none());
        background.await.unwrap().unwrap();
        assert_eq!(refresher.state().generation(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_are_serialised() {
        let refresher = refresher(
            ScriptedRunner::workspace(TARGETS, SOURCES).with_delay(Duration::from_millis(20)),
        );
        let (a, b) = tokio::join!(refresher.refresh(), refresher.refresh());
        a.unwrap();
        b.unwrap();
        assert_eq!(refresher.state().generation(), 2);
        // Two queries per refresh, never interleaved.
        let commands = refresher.pipeline().runner().commands();
        assert_eq!(commands.len(), 4);
        assert!(commands[0].contains("label_kind"));
        assert!(!commands[1].contains("label_kind"));
        assert!(commands[2].contains("label_kind"));
    }

    #[tokio::test]
    async fn test_refresh_uses_updated_settings() {
        let refresher = refresher(ScriptedRunner::workspace(TARGETS, SOURCES));
        refresher.refresh().await.unwrap();

        let narrowed = IndexConfig {
            target_query: "//narrow/...".to_string(),
            ..refresher.state().config()
        };
        assert!(refresher.state().update_config(narrowed));
        refresher.refresh().await.unwrap();

        let commands = refresher.pipeline().runner().commands();
        assert_eq!(commands.len(), 4);
        assert!(!commands[0].contains("//narrow/..."));
        assert!(commands[2].contains("//narrow/..."));
        assert_eq!(refresher.state().generation(), 2);
    }

    #[tokio::test]
    async fn test_configured_periodic_refresh() {
        let refresher = refresher(ScriptedRunner::workspace(TARGETS, SOURCES));
        let token = CancellationToken::new();
        assert!(refresher.spawn_configured(token.clone()).is_none());

        refresher.state().update_config(IndexConfig {
            refresh_interval_secs: 1,
            ..IndexConfig::default()
        });
        let handle = refresher.spawn_configured(token.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(1300)).await;
        token.cancel();
        handle.await.unwrap();
        assert!(refresher.state().generation() >= 1);
    }

    #[tokio::test]
    async fn test_periodic_refresh_until_cancelled() {
        let refresher = refresher(ScriptedRunner::workspace(TARGETS, SOURCES));
        let token = CancellationToken::new();
        let handle = refresher.spawn_periodic(Duration::from_millis(20), token.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
        handle.await.unwrap();

        let generation = refresher.state().generation();
        assert!(generation >= 1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(refresher.state().generation(), generation);
    }
}
