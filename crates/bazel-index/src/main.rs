//
// main.rs
//

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;

use bazel_index::config::{parse_index_config, IndexConfig};
use bazel_index::dispatcher::CommandDispatcher;
use bazel_index::query::QueryPipeline;
use bazel_index::refresh::IndexRefresher;
use bazel_index::state::WorkspaceState;

fn print_usage() {
    println!(
        "bazel-index {}, a Bazel workspace label index.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: bazel-index [OPTIONS]

Available options:

--dump [DIR]                 Index the workspace at DIR (default: .) and print it as JSON
--settings FILE              Read index settings from a JSON file ({{"bazel": {{...}}}})
--version                    Print the version
--help                       Print this help message

"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args().peekable();
    argv.next(); // skip executable name

    let mut dump: Option<PathBuf> = None;
    let mut settings: Option<PathBuf> = None;

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--dump" => {
                let dir = match argv.peek() {
                    Some(next) if !next.starts_with("--") => argv.next(),
                    _ => None,
                };
                dump = Some(dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")));
            }
            "--settings" => {
                let file = argv
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--settings requires a file argument"))?;
                settings = Some(PathBuf::from(file));
            }
            "--version" => {
                println!("bazel-index {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("Unknown argument: '{other}'"));
            }
        }
    }

    let Some(workspace) = dump else {
        print_usage();
        return Ok(());
    };

    env_logger::init();

    let config = match settings {
        Some(path) => load_settings(&path)?,
        None => IndexConfig::default(),
    };
    dump_workspace(workspace, config).await
}

fn load_settings(path: &Path) -> anyhow::Result<IndexConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    Ok(parse_index_config(&value).unwrap_or_default())
}

async fn dump_workspace(workspace: PathBuf, config: IndexConfig) -> anyhow::Result<()> {
    let dispatcher = CommandDispatcher::new("bazel-command-dispatcher")
        .with_working_dir(&workspace)
        .with_timeout(config.query_timeout());
    let state = Arc::new(WorkspaceState::new(config.clone()));
    let refresher = IndexRefresher::new(QueryPipeline::new(dispatcher, config), state.clone());

    let stats = refresher
        .refresh()
        .await
        .with_context(|| format!("failed to index {}", workspace.display()))?;

    let packages: Vec<serde_json::Value> = state.with_api(|api| {
        api.packages()
            .map(|(path, package)| {
                json!({
                    "path": path,
                    "has_build_file": package.has_build_file(),
                    "build_targets": package.build_targets().collect::<Vec<_>>(),
                    "source_files": package.source_files().collect::<Vec<_>>(),
                })
            })
            .collect()
    });

    let output = json!({
        "workspace": workspace.display().to_string(),
        "stats": stats,
        "packages": packages,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    bazel_index::perf::log_summary();
    Ok(())
}
