//! Deterministic fixture workspaces for tests.
//!
//! Generates synthetic query output (`label_kind` and `label` listings) with
//! controlled characteristics: top-level package count, nesting depth, and
//! targets and source files per package. On unix it can also write a fake
//! build-tool script that prints that output, so the real dispatcher can be
//! driven end to end.
//!
//! All output is deterministic, so repeated runs index identical trees.

use std::fmt::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Configuration for generating a fixture workspace.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub top_level_packages: usize,
    /// Levels of `sub` packages below each top-level package.
    pub depth: usize,
    pub targets_per_package: usize,
    pub files_per_package: usize,
}

/// Rule kinds cycled through deterministically.
const KINDS: &[&str] = &["cc_library", "cc_binary", "java_library", "sh_test", "filegroup"];

impl FixtureConfig {
    /// 3 packages, depth 1, 2 targets and 2 files each.
    pub fn small() -> Self {
        Self {
            top_level_packages: 3,
            depth: 1,
            targets_per_package: 2,
            files_per_package: 2,
        }
    }

    /// 20 packages, depth 3.
    pub fn medium() -> Self {
        Self {
            top_level_packages: 20,
            depth: 3,
            targets_per_package: 5,
            files_per_package: 5,
        }
    }

    /// Every package path, top-level packages first then their descendants.
    pub fn package_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for p in 0..self.top_level_packages {
            let mut path = format!("pkg_{}", p);
            paths.push(path.clone());
            for d in 0..self.depth {
                write!(path, "/sub_{}", d).unwrap();
                paths.push(path.clone());
            }
        }
        paths
    }

    /// Packages in the resulting tree, including the root.
    pub fn expected_package_count(&self) -> usize {
        1 + self.top_level_packages * (1 + self.depth)
    }

    pub fn expected_target_count(&self) -> usize {
        self.package_paths().len() * self.targets_per_package
    }

    pub fn expected_file_count(&self) -> usize {
        self.package_paths().len() * self.files_per_package
    }
}

/// Output of `query //... --output label_kind`.
pub fn generate_target_output(config: &FixtureConfig) -> String {
    let mut out = String::new();
    for (p, path) in config.package_paths().iter().enumerate() {
        for t in 0..config.targets_per_package {
            let kind = KINDS[(p + t) % KINDS.len()];
            writeln!(out, "{} rule //{}:target_{}", kind, path, t).unwrap();
        }
    }
    out
}

/// Output of `query 'kind("source file", //...:*)' --output label`.
pub fn generate_source_output(config: &FixtureConfig) -> String {
    let mut out = String::new();
    for path in config.package_paths() {
        for f in 0..config.files_per_package {
            writeln!(out, "//{}:file_{}.cc", path, f).unwrap();
        }
    }
    out
}

/// A temporary directory holding a fake build tool.
pub struct FakeBazel {
    dir: TempDir,
}

impl FakeBazel {
    /// Path to the executable script.
    pub fn executable(&self) -> PathBuf {
        self.dir.path().join("fake-bazel")
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Write a `fake-bazel` script that answers `--output label_kind` with the
/// target listing and anything else with the source listing.
#[cfg(unix)]
pub fn create_fake_bazel(config: &FixtureConfig) -> FakeBazel {
    let dir = TempDir::new().expect("Failed to create temp directory for fake bazel");
    write_fake_bazel(dir.path(), config);
    FakeBazel { dir }
}

/// Write a `fake-bazel` script that prints `stderr` and exits with `code`.
#[cfg(unix)]
pub fn create_failing_bazel(code: i32, stderr: &str) -> FakeBazel {
    let dir = TempDir::new().expect("Failed to create temp directory for fake bazel");
    std::fs::write(dir.path().join("stderr.txt"), stderr).unwrap();
    let script = format!(
        "#!/bin/sh\ncat '{}' >&2\nexit {}\n",
        dir.path().join("stderr.txt").display(),
        code
    );
    write_script(&dir.path().join("fake-bazel"), &script);
    FakeBazel { dir }
}

#[cfg(unix)]
fn write_fake_bazel(dir: &Path, config: &FixtureConfig) {
    let targets = dir.join("targets.txt");
    let sources = dir.join("sources.txt");
    std::fs::write(&targets, generate_target_output(config)).unwrap();
    std::fs::write(&sources, generate_source_output(config)).unwrap();

    let script = format!(
        "#!/bin/sh\ncase \"$*\" in\n  *label_kind*) cat '{}' ;;\n  *) cat '{}' ;;\nesac\n",
        targets.display(),
        sources.display()
    );
    write_script(&dir.join("fake-bazel"), &script);
}

#[cfg(unix)]
fn write_script(path: &Path, content: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, content)
        .unwrap_or_else(|e| panic!("Failed to write {}: {}", path.display(), e));
    let mut permissions = std::fs::metadata(path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{parse_build_target_line, parse_source_file_line};

    #[test]
    fn test_small_preset_values() {
        let config = FixtureConfig::small();
        assert_eq!(
            config.package_paths(),
            vec!["pkg_0", "pkg_0/sub_0", "pkg_1", "pkg_1/sub_0", "pkg_2", "pkg_2/sub_0"]
        );
        assert_eq!(config.expected_package_count(), 7);
        assert_eq!(config.expected_target_count(), 12);
    }

    #[test]
    fn test_deterministic_output() {
        let config = FixtureConfig::medium();
        assert_eq!(generate_target_output(&config), generate_target_output(&config));
        assert_eq!(generate_source_output(&config), generate_source_output(&config));
    }

    #[test]
    fn test_generated_lines_parse() {
        let config = FixtureConfig::small();
        let targets = generate_target_output(&config);
        assert!(targets.lines().all(|l| parse_build_target_line(l).is_some()));
        assert_eq!(targets.lines().count(), config.expected_target_count());

        let sources = generate_source_output(&config);
        assert!(sources.lines().all(|l| parse_source_file_line(l).is_some()));
        assert_eq!(sources.lines().count(), config.expected_file_count());
    }

    #[cfg(unix)]
    #[test]
    fn test_fake_bazel_answers_by_output_format() {
        let config = FixtureConfig::small();
        let fake = create_fake_bazel(&config);
        let out = std::process::Command::new(fake.executable())
            .args(["query", "//...", "--output", "label_kind"])
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout), generate_target_output(&config));
    }
}
