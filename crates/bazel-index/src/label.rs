//
// label.rs
//
// Bazel label grammar (`@repo//pkg/path:name`, `//pkg`, `:name`) plus the
// path decomposition helpers the workspace tree is built on.
//

use std::fmt;
use std::str::FromStr;

use crate::error::{IndexError, Result};

/// A parsed build label.
///
/// Accepted forms:
///
/// ```text
/// :name
/// //foo/bar
/// //foo/bar:quux
/// @foo
/// @foo//bar
/// @foo//bar:baz
/// hello_world.cc      (bare source file reference)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    workspace: String,
    package_path: Vec<String>,
    name: String,
    local: bool,
    source_file: bool,
}

impl Label {
    /// Parse label text in a single left-to-right pass.
    ///
    /// Text that is neither workspace-qualified (`@`), absolute (`//`) nor
    /// target-local (`:`) is accepted as a source-file reference rather than
    /// rejected. Completion of bare file names in `srcs` relies on this, so the
    /// fallback is the lowest-precedence branch, not an error path.
    pub fn parse(text: &str) -> Result<Label> {
        if text.is_empty() {
            return Err(IndexError::syntax(text, "label is empty"));
        }

        let (workspace, rest) = match text.strip_prefix('@') {
            Some(after_at) => {
                let end = workspace_end(after_at);
                let workspace = &after_at[..end];
                if workspace.contains('/') {
                    return Err(IndexError::syntax(
                        text,
                        "workspace name contains a path separator",
                    ));
                }
                if workspace.is_empty() && end == after_at.len() {
                    return Err(IndexError::syntax(text, "workspace name is empty"));
                }
                (workspace, &after_at[end..])
            }
            None => ("", text),
        };

        // `@repo` on its own refers to the whole external workspace.
        if rest.is_empty() {
            return Ok(Label {
                workspace: workspace.to_string(),
                package_path: Vec::new(),
                name: String::new(),
                local: false,
                source_file: false,
            });
        }

        if let Some(body) = rest.strip_prefix("//") {
            let (package, name) = match body.split_once(':') {
                Some((_, "")) => {
                    return Err(IndexError::syntax(text, "target name after ':' is empty"));
                }
                Some((package, name)) => (package, name),
                None => (body, ""),
            };
            let package_path = split_package(text, package)?;
            validate_name(text, name)?;
            return Ok(Label {
                workspace: workspace.to_string(),
                package_path,
                name: name.to_string(),
                local: false,
                source_file: false,
            });
        }

        if let Some(name) = rest.strip_prefix(':') {
            if name.is_empty() {
                return Err(IndexError::syntax(text, "target name after ':' is empty"));
            }
            validate_name(text, name)?;
            return Ok(Label {
                workspace: workspace.to_string(),
                package_path: Vec::new(),
                name: name.to_string(),
                local: workspace.is_empty(),
                source_file: false,
            });
        }

        // Only reachable without a workspace prefix: after `@repo` the rest
        // always starts with `//` or `:`.
        Ok(Label {
            workspace: String::new(),
            package_path: text.split('/').map(str::to_string).collect(),
            name: String::new(),
            local: false,
            source_file: true,
        })
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn package_path(&self) -> &[String] {
        &self.package_path
    }

    /// Package path joined with `/` (no leading `//`).
    pub fn package(&self) -> String {
        self.package_path.join("/")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the text began with `:`.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// True for the bare-file fallback (`hello_world.cc`, `lib/util.h`).
    pub fn is_source_file(&self) -> bool {
        self.source_file
    }

    pub fn has_workspace(&self) -> bool {
        !self.workspace.is_empty()
    }

    pub fn has_package(&self) -> bool {
        !self.package_path.is_empty()
    }

    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }
}

impl FromStr for Label {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        Label::parse(s)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source_file {
            return f.write_str(&self.package());
        }
        if self.local {
            return write!(f, ":{}", self.name);
        }
        if self.has_workspace() {
            write!(f, "@{}", self.workspace)?;
            if !self.has_package() && !self.has_name() {
                return Ok(());
            }
        }
        write!(f, "//{}", self.package())?;
        if self.has_name() {
            write!(f, ":{}", self.name)?;
        }
        Ok(())
    }
}

/// Byte offset where a workspace name ends: the first `//`, `:`, or end of text.
fn workspace_end(after_at: &str) -> usize {
    let slashes = after_at.find("//").unwrap_or(after_at.len());
    let colon = after_at.find(':').unwrap_or(after_at.len());
    slashes.min(colon)
}

fn split_package(text: &str, package: &str) -> Result<Vec<String>> {
    if package.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<String> = package.split('/').map(str::to_string).collect();
    if segments.iter().any(|s| s.is_empty()) {
        // Covers `//a/b/:x` (trailing separator before the colon) and `//a//b`.
        return Err(IndexError::syntax(text, "empty package segment"));
    }
    Ok(segments)
}

fn validate_name(text: &str, name: &str) -> Result<()> {
    if name.contains(':') {
        return Err(IndexError::syntax(text, "more than one target separator"));
    }
    // Target names may contain `/` (`//java:com/Hello.java`) but not empty
    // segments.
    if !name.is_empty() && name.split('/').any(str::is_empty) {
        return Err(IndexError::syntax(text, "empty segment in target name"));
    }
    Ok(())
}

// ============================================================================
// Path decomposition
// ============================================================================

/// Split a package path into segments.
///
/// Leading `//` or `/`, a trailing `/`, and repeated separators are ignored,
/// so `""`, `"/"` and `"//"` all denote the workspace root.
pub fn path_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether a path segment is treated as a file name rather than a package.
///
/// This is a heuristic: any segment containing a `.` counts as a file, which
/// misclassifies packages whose names contain dots. It is only applied to
/// source-file paths.
pub fn is_file_segment(segment: &str) -> bool {
    segment.contains('.')
}

/// Render package segments as an absolute label path (`//a/b`).
pub fn render_package(segments: &[String]) -> String {
    format!("//{}", segments.join("/"))
}
