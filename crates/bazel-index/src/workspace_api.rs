//
// workspace_api.rs
//
// Read-only queries over a workspace tree: completion candidates, target and
// source-file validity, and source-to-build-file resolution.
//

use crate::error::{IndexError, Result};
use crate::label::{path_segments, render_package, Label};
use crate::tree::{BuildTarget, Node, Package, SourceFile, WorkspaceTree};

/// Default name of the per-package build file.
pub const DEFAULT_BUILD_FILE_NAME: &str = "BUILD";

/// Outcome of checking a label string against the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelCheck {
    /// The label names an indexed target.
    Valid,
    /// The label parsed but no such target is indexed.
    UnknownTarget(BuildTarget),
    /// The label text is malformed.
    InvalidSyntax(String),
    /// The label points into another workspace, which is not indexed.
    External,
    /// Bare file reference; not checked against targets.
    SourceFile,
}

/// Traversal API over a borrowed [`WorkspaceTree`].
///
/// Operations that return a list or a path fail with `InvalidPath` when a
/// segment has no matching package. Boolean checks treat a traversal miss as
/// `false`.
pub struct WorkspaceApi<'t> {
    tree: &'t WorkspaceTree,
    build_file_name: String,
}

impl<'t> WorkspaceApi<'t> {
    pub fn new(tree: &'t WorkspaceTree) -> Self {
        Self {
            tree,
            build_file_name: DEFAULT_BUILD_FILE_NAME.to_string(),
        }
    }

    /// Use `BUILD.bazel` (or another name) when resolving build files.
    pub fn with_build_file_name(mut self, name: impl Into<String>) -> Self {
        self.build_file_name = name.into();
        self
    }

    pub fn tree(&self) -> &'t WorkspaceTree {
        self.tree
    }

    /// Paths of the packages directly below `path`.
    ///
    /// Each candidate is the child name appended to `path`. The root spellings
    /// `""`, `"/"` and `"//"` all yield `//child`.
    pub fn find_possible_completions_for_path(&self, path: &str) -> Result<Vec<String>> {
        let node = self.find_package_node(path)?;
        let base = if path_segments(path).is_empty() {
            "//".to_string()
        } else if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        Ok(node
            .children()
            .map(|child| format!("{base}{}", child.name()))
            .collect())
    }

    /// Copies of the targets declared directly in the package at `path`.
    pub fn find_possible_targets_for_path(&self, path: &str) -> Result<Vec<BuildTarget>> {
        let node = self.find_package_node(path)?;
        Ok(node.package().build_targets().cloned().collect())
    }

    /// True iff the package named by `target`'s path declares a target with
    /// the same path and name.
    pub fn is_valid_target(&self, target: &BuildTarget) -> bool {
        let Some(id) = self.tree.find(target.path()) else {
            log::debug!("Package for target '{}' not present", target);
            return false;
        };
        let Some(node) = self.tree.node(id) else {
            return false;
        };
        let wanted = target.path_with_target();
        let found = node
            .package()
            .build_targets()
            .any(|candidate| candidate.path_with_target() == wanted);
        if !found {
            log::debug!("Target '{}' is not valid", target);
        }
        found
    }

    /// True iff the source file is indexed in its package.
    pub fn is_source_file_in_package(&self, file: &SourceFile) -> bool {
        let Ok(node) = self.find_file_package_node(file) else {
            return false;
        };
        node.package()
            .source_files()
            .any(|candidate| candidate.path() == file.path())
    }

    /// Workspace-relative path of the build file of the package holding
    /// `file`. For a file directly in its package this is the file's path with
    /// the last segment replaced by the build-file name.
    pub fn find_path_to_build_file_from_source_file(&self, file: &SourceFile) -> Result<String> {
        if !self.is_source_file_in_package(file) {
            return Err(IndexError::InvalidPath(format!(
                "source file {file} is not indexed"
            )));
        }
        let mut segments = file.package_segments();
        segments.push(&self.build_file_name);
        Ok(segments.join("/"))
    }

    /// The package at `path`.
    pub fn find_package(&self, path: &str) -> Result<&'t Package> {
        self.find_package_node(path).map(|node| node.package())
    }

    /// All packages in pre-order, with their absolute paths.
    pub fn packages(&self) -> impl Iterator<Item = (String, &'t Package)> + 't {
        self.tree
            .iter()
            .map(|node| (render_package(&node.path()), node.package()))
    }

    /// Resolve a label to the target it names.
    ///
    /// `current_package` is the package of the file the label appears in and
    /// is used for `:name` labels. A bare package label `//foo/bar` names the
    /// implied target `//foo/bar:bar`. Source-file and workspace-only labels
    /// have no target.
    pub fn target_for_label(&self, label: &Label, current_package: &[String]) -> Option<BuildTarget> {
        if label.is_source_file() {
            return None;
        }
        if label.is_local() {
            return Some(BuildTarget::from_segments(
                current_package.to_vec(),
                label.name(),
                "",
            ));
        }
        match (label.has_package(), label.has_name()) {
            (_, true) => Some(BuildTarget::from_segments(
                label.package_path().to_vec(),
                label.name(),
                "",
            )),
            (true, false) => {
                let implied = label.package_path().last()?.clone();
                Some(BuildTarget::from_segments(
                    label.package_path().to_vec(),
                    implied,
                    "",
                ))
            }
            (false, false) => None,
        }
    }

    /// Parse `text` and check it against the index.
    pub fn check_label(&self, text: &str, current_package: &[String]) -> LabelCheck {
        let label = match Label::parse(text) {
            Ok(label) => label,
            Err(err) => {
                log::debug!("{}", err);
                return LabelCheck::InvalidSyntax(err.to_string());
            }
        };
        if label.is_source_file() {
            return LabelCheck::SourceFile;
        }
        if label.has_workspace() {
            return LabelCheck::External;
        }
        let Some(target) = self.target_for_label(&label, current_package) else {
            return LabelCheck::InvalidSyntax(format!("label {text:?} does not name a target"));
        };
        if self.is_valid_target(&target) {
            LabelCheck::Valid
        } else {
            LabelCheck::UnknownTarget(target)
        }
    }

    fn find_package_node(&self, path: &str) -> Result<Node<'t>> {
        let segments = path_segments(path);
        let mut node = self.tree.root();
        for segment in &segments {
            node = node
                .child(segment)
                .ok_or_else(|| IndexError::InvalidPath(path.to_string()))?;
        }
        Ok(node)
    }

    /// Package holding `file`. For bare paths, segments that look like file
    /// names are skipped rather than looked up.
    fn find_file_package_node(&self, file: &SourceFile) -> Result<Node<'t>> {
        let mut node = self.tree.root();
        for segment in file.package_segments() {
            node = node
                .child(segment)
                .ok_or_else(|| IndexError::InvalidPath(file.to_string()))?;
        }
        Ok(node)
    }
}
