//! Full refresh through the real dispatcher against a scripted build tool.
//!
//! Run with: `cargo test -p bazel-index --features test-support --test end_to_end`

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use bazel_index::config::IndexConfig;
use bazel_index::dispatcher::CommandDispatcher;
use bazel_index::query::QueryPipeline;
use bazel_index::refresh::IndexRefresher;
use bazel_index::state::WorkspaceState;
use bazel_index::test_utils::fixture_workspace::{
    create_failing_bazel, create_fake_bazel, FixtureConfig,
};
use bazel_index::{BuildTarget, IndexError};

fn refresher_for(executable: String, workspace: &std::path::Path) -> IndexRefresher<CommandDispatcher> {
    let config = IndexConfig {
        executable,
        query_timeout_ms: 30_000,
        ..IndexConfig::default()
    };
    let dispatcher = CommandDispatcher::new("e2e")
        .with_working_dir(workspace)
        .with_timeout(config.query_timeout());
    let state = Arc::new(WorkspaceState::new(config.clone()));
    IndexRefresher::new(QueryPipeline::new(dispatcher, config), state)
}

#[tokio::test]
async fn test_refresh_through_shell() {
    let config = FixtureConfig::medium();
    let fake = create_fake_bazel(&config);
    let refresher = refresher_for(fake.executable().display().to_string(), fake.dir());

    let stats = refresher.refresh().await.unwrap();
    assert_eq!(stats.build_targets, config.expected_target_count());
    assert_eq!(stats.source_files, config.expected_file_count());
    assert_eq!(stats.packages, config.expected_package_count());
    assert_eq!(stats.skipped_lines, 0);

    let valid = refresher.state().with_api(|api| {
        api.is_valid_target(&BuildTarget::new("//pkg_3/sub_0/sub_1", "target_4", ""))
    });
    assert!(valid);
}

#[tokio::test]
async fn test_failing_tool_reports_marker_line() {
    let fake = create_failing_bazel(
        2,
        "Loading: 0 packages loaded\nERROR: Skipping '//...': no such package\n",
    );
    let refresher = refresher_for(fake.executable().display().to_string(), fake.dir());

    match refresher.refresh().await {
        Err(IndexError::QueryFailed(message)) => {
            assert_eq!(message, "ERROR: Skipping '//...': no such package");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(refresher.state().generation(), 0);
}

#[tokio::test]
async fn test_missing_tool_fails_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let refresher = refresher_for(
        dir.path().join("no-such-bazel").display().to_string(),
        dir.path(),
    );
    // The shell reports "not found" with exit status 127.
    let err = refresher.refresh().await.unwrap_err();
    assert!(matches!(err, IndexError::QueryFailed(_)));
    assert!(!refresher.state().last_refresh().unwrap().succeeded());
}

#[test]
fn test_dispatch_timeout_against_slow_tool() {
    let dispatcher = CommandDispatcher::new("e2e");
    let err = dispatcher
        .dispatch_with_timeout("sleep 10", Duration::from_millis(50))
        .unwrap_err();
    assert!(matches!(err, IndexError::DispatchFailed { .. }));
}
