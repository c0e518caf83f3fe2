//
// config.rs
//
// Index settings and their parsing from editor-supplied JSON.
//

use std::time::Duration;

/// Settings that control how the workspace is queried and indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Build tool invoked by the query pipeline.
    pub executable: String,
    /// Query expression for build targets.
    pub target_query: String,
    /// Query expression for source files.
    pub source_query: String,
    /// Name of the per-package build file (`BUILD` or `BUILD.bazel`).
    pub build_file_name: String,
    /// Prefix of the stderr line that describes a failed query.
    pub error_marker: String,
    /// Per-query deadline in milliseconds; 0 disables it.
    pub query_timeout_ms: u64,
    /// Period of the background refresh in seconds; 0 disables it.
    pub refresh_interval_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            executable: "bazel".to_string(),
            target_query: "//...".to_string(),
            source_query: "kind(\"source file\", //...:*)".to_string(),
            build_file_name: "BUILD".to_string(),
            error_marker: "ERROR".to_string(),
            query_timeout_ms: 0,
            refresh_interval_secs: 0,
        }
    }
}

impl IndexConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }

    /// Whether switching from `self` to `other` changes what the index would
    /// contain. Timing-only settings do not.
    pub fn requires_rebuild(&self, other: &IndexConfig) -> bool {
        self.executable != other.executable
            || self.target_query != other.target_query
            || self.source_query != other.source_query
    }
}

/// Read the `bazel` section of editor settings.
///
/// Returns `None` when the section is absent. Missing or mistyped keys keep
/// their defaults.
pub fn parse_index_config(settings: &serde_json::Value) -> Option<IndexConfig> {
    let bazel = settings.get("bazel")?;

    let mut config = IndexConfig::default();

    let non_empty = |key: &str| {
        bazel
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty() && !s.contains('\0'))
            .map(str::to_string)
    };

    if let Some(v) = non_empty("executable") {
        config.executable = v;
    }
    if let Some(v) = non_empty("targetQuery") {
        config.target_query = v;
    }
    if let Some(v) = non_empty("sourceQuery") {
        config.source_query = v;
    }
    if let Some(v) = non_empty("buildFileName") {
        if v.contains('/') {
            log::warn!("Ignoring bazel.buildFileName with a path separator: {}", v);
        } else {
            config.build_file_name = v;
        }
    }
    if let Some(v) = non_empty("errorMarker") {
        config.error_marker = v;
    }
    if let Some(v) = bazel.get("queryTimeoutMs").and_then(|v| v.as_u64()) {
        config.query_timeout_ms = v;
    }
    if let Some(v) = bazel.get("refreshIntervalSecs").and_then(|v| v.as_u64()) {
        config.refresh_interval_secs = v;
    }

    log::info!("Index configuration loaded from settings:");
    log::info!("  executable: {}", config.executable);
    log::info!("  target_query: {}", config.target_query);
    log::info!("  source_query: {}", config.source_query);
    log::info!("  build_file_name: {}", config.build_file_name);
    log::info!("  error_marker: {}", config.error_marker);
    log::info!("  query_timeout_ms: {}", config.query_timeout_ms);
    log::info!("  refresh_interval_secs: {}", config.refresh_interval_secs);

    Some(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_section() {
        assert!(parse_index_config(&json!({})).is_none());
        assert!(parse_index_config(&json!({ "other": {} })).is_none());
    }

    #[test]
    fn test_empty_section_gives_defaults() {
        let config = parse_index_config(&json!({ "bazel": {} })).unwrap();
        assert_eq!(config, IndexConfig::default());
        assert_eq!(config.query_timeout(), None);
        assert_eq!(config.refresh_interval(), None);
    }

    #[test]
    fn test_all_keys() {
        let config = parse_index_config(&json!({
            "bazel": {
                "executable": "/usr/local/bin/bazelisk",
                "targetQuery": "//src/...",
                "sourceQuery": "kind(\"source file\", //src/...:*)",
                "buildFileName": "BUILD.bazel",
                "errorMarker": "FATAL",
                "queryTimeoutMs": 30000,
                "refreshIntervalSecs": 300
            }
        }))
        .unwrap();
        assert_eq!(config.executable, "/usr/local/bin/bazelisk");
        assert_eq!(config.target_query, "//src/...");
        assert_eq!(config.build_file_name, "BUILD.bazel");
        assert_eq!(config.error_marker, "FATAL");
        assert_eq!(config.query_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = parse_index_config(&json!({
            "bazel": {
                "executable": "  ",
                "buildFileName": "sub/BUILD",
                "queryTimeoutMs": -5,
                "refreshIntervalSecs": "often"
            }
        }))
        .unwrap();
        assert_eq!(config, IndexConfig::default());
    }

    #[test]
    fn test_requires_rebuild() {
        let base = IndexConfig::default();

        let slower = IndexConfig {
            query_timeout_ms: 1000,
            refresh_interval_secs: 60,
            ..base.clone()
        };
        assert!(!base.requires_rebuild(&slower));

        let narrower = IndexConfig {
            target_query: "//main/...".to_string(),
            ..base.clone()
        };
        assert!(base.requires_rebuild(&narrower));

        let other_tool = IndexConfig {
            executable: "bazelisk".to_string(),
            ..base.clone()
        };
        assert!(base.requires_rebuild(&other_tool));
    }
}
