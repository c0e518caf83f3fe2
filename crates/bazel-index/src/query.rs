//
// query.rs
//
// Populates a workspace tree from build-tool query output.
//
// Two queries are run per refresh: one listing rule targets with their kinds
// (`--output label_kind`), one listing source files (`--output label`). The
// tree is rebuilt from scratch and swapped in only when both succeed.
//

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::config::IndexConfig;
use crate::dispatcher::{CommandOutput, QueryRunner, Shell, ShellCommand};
use crate::error::{IndexError, Result};
use crate::label::Label;
use crate::perf::TimingGuard;
use crate::tree::{BuildTarget, SourceFile, WorkspaceTree};

/// Message used when a failed query printed no recognisable error line.
pub const UNKNOWN_ERROR: &str = "Unknown build tool error";

/// `--output` format of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutput {
    /// `<kind> rule <label>` per line.
    LabelKind,
    /// `<label>` per line.
    Label,
}

impl QueryOutput {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOutput::LabelKind => "label_kind",
            QueryOutput::Label => "label",
        }
    }
}

/// `<executable> query <expression> --output <format>`, quoted for a shell.
#[derive(Debug, Clone)]
pub struct QueryCommand {
    executable: String,
    expression: String,
    output: QueryOutput,
    shell: Shell,
    timeout: Option<Duration>,
}

impl QueryCommand {
    pub fn new(
        shell: &Shell,
        executable: impl Into<String>,
        expression: impl Into<String>,
        output: QueryOutput,
    ) -> Self {
        Self {
            executable: executable.into(),
            expression: expression.into(),
            output,
            shell: shell.clone(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn output(&self) -> QueryOutput {
        self.output
    }
}

impl ShellCommand for QueryCommand {
    fn command_line(&self) -> String {
        format!(
            "{} query {} --output {}",
            self.shell.quote(&self.executable),
            self.shell.quote(&self.expression),
            self.output.as_str()
        )
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Items parsed from one query, plus how many lines were unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub items: Vec<T>,
    pub skipped: usize,
}

/// Counts from one refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    pub build_targets: usize,
    pub source_files: usize,
    pub skipped_lines: usize,
    pub packages: usize,
}

/// Runs workspace queries through a [`QueryRunner`] and turns their output
/// into a [`WorkspaceTree`].
pub struct QueryPipeline<R> {
    runner: R,
    config: IndexConfig,
    shell: Shell,
}

impl<R: QueryRunner> QueryPipeline<R> {
    pub fn new(runner: R, config: IndexConfig) -> Self {
        Self {
            runner,
            config,
            shell: Shell::detect(),
        }
    }

    /// Quote commands for `shell` instead of the platform default.
    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.shell = shell;
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn target_query(&self) -> QueryCommand {
        self.target_query_for(&self.config)
    }

    pub fn source_query(&self) -> QueryCommand {
        self.source_query_for(&self.config)
    }

    fn target_query_for(&self, config: &IndexConfig) -> QueryCommand {
        QueryCommand::new(
            &self.shell,
            &config.executable,
            &config.target_query,
            QueryOutput::LabelKind,
        )
        .with_timeout(config.query_timeout())
    }

    fn source_query_for(&self, config: &IndexConfig) -> QueryCommand {
        QueryCommand::new(
            &self.shell,
            &config.executable,
            &config.source_query,
            QueryOutput::Label,
        )
        .with_timeout(config.query_timeout())
    }

    pub fn query_build_targets(&self) -> Result<Parsed<BuildTarget>> {
        self.query_build_targets_with(&self.config)
    }

    pub fn query_source_files(&self) -> Result<Parsed<SourceFile>> {
        self.query_source_files_with(&self.config)
    }

    fn query_build_targets_with(&self, config: &IndexConfig) -> Result<Parsed<BuildTarget>> {
        log::info!("Querying build targets");
        let output = self.run(&self.target_query_for(config), config)?;
        Ok(parse_lines(&output, "build target", parse_build_target_line))
    }

    fn query_source_files_with(&self, config: &IndexConfig) -> Result<Parsed<SourceFile>> {
        log::info!("Querying source files");
        let output = self.run(&self.source_query_for(config), config)?;
        Ok(parse_lines(&output, "source file", parse_source_file_line))
    }

    /// Run both queries and build a fresh tree from their output.
    pub fn build_tree(&self) -> Result<(WorkspaceTree, RefreshStats)> {
        self.build_tree_with(&self.config)
    }

    /// Like [`build_tree`](Self::build_tree), with settings other than the
    /// ones the pipeline was created with.
    pub fn build_tree_with(&self, config: &IndexConfig) -> Result<(WorkspaceTree, RefreshStats)> {
        let _timing = TimingGuard::with_threshold("build_tree", 10_000);

        let targets = self.query_build_targets_with(config)?;
        let files = self.query_source_files_with(config)?;

        let mut tree = WorkspaceTree::new();
        let stats = RefreshStats {
            build_targets: targets.items.len(),
            source_files: files.items.len(),
            skipped_lines: targets.skipped + files.skipped,
            packages: 0,
        };
        for target in targets.items {
            tree.insert_build_target(target);
        }
        for file in files.items {
            tree.insert_source_file(file);
        }
        let stats = RefreshStats {
            packages: tree.package_count(),
            ..stats
        };
        Ok((tree, stats))
    }

    /// Replace `tree` with a freshly queried one. On error `tree` is left
    /// untouched.
    pub fn refresh_index(&self, tree: &mut WorkspaceTree) -> Result<RefreshStats> {
        let (fresh, stats) = self.build_tree()?;
        *tree = fresh;
        log::info!(
            "Indexed {} targets and {} source files in {} packages ({} lines skipped)",
            stats.build_targets,
            stats.source_files,
            stats.packages,
            stats.skipped_lines
        );
        Ok(stats)
    }

    fn run(&self, command: &QueryCommand, config: &IndexConfig) -> Result<CommandOutput> {
        let output = self.runner.run(command)?;
        if !output.succeeded() {
            let message = extract_error(&output.error_output_lines, &config.error_marker);
            log::warn!(
                "`{}` exited with {}: {}",
                command.command_line(),
                output.exit_code,
                message
            );
            return Err(IndexError::QueryFailed(message));
        }
        Ok(output)
    }
}

fn parse_lines<T>(
    output: &CommandOutput,
    what: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Parsed<T> {
    let mut parsed = Parsed {
        items: Vec::with_capacity(output.standard_output_lines.len()),
        skipped: 0,
    };
    for line in &output.standard_output_lines {
        if line.trim().is_empty() {
            continue;
        }
        match parse(line) {
            Some(item) => parsed.items.push(item),
            None => {
                log::warn!("Skipping unrecognised {} line: {:?}", what, line);
                parsed.skipped += 1;
            }
        }
    }
    parsed
}

/// Parse one `label_kind` line, e.g. `cc_binary rule //main:hello-world`.
///
/// The kind is the first field and the label the last. Lines with fewer
/// than two fields, labels outside this workspace, and labels without a
/// target name yield `None`.
pub fn parse_build_target_line(line: &str) -> Option<BuildTarget> {
    let mut fields = line.split_whitespace();
    let kind = fields.next()?;
    let label = fields.last()?;
    let (package, name) = workspace_target(label)?;
    Some(BuildTarget::from_segments(package, name, kind))
}

/// Parse one `label` line naming a source file, e.g. `//main:hello-world.cc`.
///
/// Target names may reach into subdirectories (`//java:com/Hello.java`); the
/// file stays in the label's package and its path continues into the name.
pub fn parse_source_file_line(line: &str) -> Option<SourceFile> {
    let label = line.split_whitespace().last()?;
    let (package, name) = workspace_target(label)?;
    Some(SourceFile::in_package(package, &name))
}

/// Package segments and target name of an absolute label in the main
/// workspace.
fn workspace_target(text: &str) -> Option<(Vec<String>, String)> {
    let label = Label::parse(text).ok()?;
    if label.has_workspace() || label.is_source_file() || label.is_local() || !label.has_name() {
        return None;
    }
    Some((label.package_path().to_vec(), label.name().to_string()))
}

fn ansi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap())
}

/// First stderr line that starts with `marker` once colour codes are removed,
/// or [`UNKNOWN_ERROR`].
pub fn extract_error(error_lines: &[String], marker: &str) -> String {
    error_lines
        .iter()
        .map(|line| ansi_pattern().replace_all(line, ""))
        .find(|line| line.trim_start().starts_with(marker))
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}
