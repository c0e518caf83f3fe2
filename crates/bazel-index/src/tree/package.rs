//
// tree/package.rs
//
// Values stored in the workspace tree: packages and the build targets and
// source files declared in them.
//

use std::fmt;

use indexmap::IndexSet;
use serde::Serialize;

use crate::label::{is_file_segment, path_segments, render_package};

/// A named, typed build unit declared in a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BuildTarget {
    path: Vec<String>,
    label: String,
    kind: String,
}

impl BuildTarget {
    /// `path` is a package path in any of the accepted spellings
    /// (`//a/b`, `/a/b`, `a/b`).
    pub fn new(path: &str, label: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::from_segments(path_segments(path), label, kind)
    }

    pub fn from_segments(path: Vec<String>, label: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            path,
            label: label.into(),
            kind: kind.into(),
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Target name (the part after `:`).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Rule kind, e.g. `java_library`. Empty when the target was built from a
    /// label rather than from query output.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// `//a/b:name`
    pub fn path_with_target(&self) -> String {
        format!("{}:{}", render_package(&self.path), self.label)
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_with_target())
    }
}

/// A source file, addressed by its full workspace-relative path.
///
/// Files parsed from labels know their owning package (`//java:com/App.java`
/// lives in `java`). Files built from a bare path do not, and fall back to
/// the dot-segment rule in [`SourceFile::package_segments`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceFile {
    file_name: String,
    path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<Vec<String>>,
}

impl SourceFile {
    /// `path` includes the file segment, e.g. `main/hello_world.cc`.
    pub fn new(file_name: impl Into<String>, path: &str) -> Self {
        Self::from_segments(file_name, path_segments(path))
    }

    pub fn from_segments(file_name: impl Into<String>, path: Vec<String>) -> Self {
        Self {
            file_name: file_name.into(),
            path,
            package: None,
        }
    }

    /// File `name` declared in `package`. The name may reach into
    /// subdirectories of the package (`com/example/App.java`).
    pub fn in_package(package: Vec<String>, name: &str) -> Self {
        let mut path = package.clone();
        path.extend(path_segments(name));
        let file_name = path.last().cloned().unwrap_or_default();
        Self {
            file_name,
            path,
            package: Some(package),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Owning package, when the file came from a label.
    pub fn package(&self) -> Option<&[String]> {
        self.package.as_deref()
    }

    /// Extension without the dot, if the file name has one.
    pub fn extension(&self) -> Option<&str> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }

    /// Segments of the package holding this file.
    ///
    /// The known package when there is one. Otherwise the directory segments
    /// of the path: the file itself and any segment that looks like a file
    /// name are dropped.
    pub(crate) fn package_segments(&self) -> Vec<&str> {
        if let Some(package) = &self.package {
            return package.iter().map(String::as_str).collect();
        }
        let directories = self.path.split_last().map_or(&[][..], |(_, dirs)| dirs);
        directories
            .iter()
            .map(String::as_str)
            .filter(|segment| !is_file_segment(segment))
            .collect()
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join("/"))
    }
}

/// A directory-scoped collection of targets and source files.
///
/// Only items declared directly in this package are stored here; descendant
/// packages hold their own.
#[derive(Debug, Clone, Default)]
pub struct Package {
    name: String,
    build_targets: IndexSet<BuildTarget>,
    source_files: IndexSet<SourceFile>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            build_targets: IndexSet::new(),
            source_files: IndexSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns false if an identical target was already present.
    pub fn add_build_target(&mut self, target: BuildTarget) -> bool {
        self.build_targets.insert(target)
    }

    pub fn add_source_file(&mut self, file: SourceFile) -> bool {
        self.source_files.insert(file)
    }

    pub fn build_targets(&self) -> impl ExactSizeIterator<Item = &BuildTarget> {
        self.build_targets.iter()
    }

    pub fn source_files(&self) -> impl ExactSizeIterator<Item = &SourceFile> {
        self.source_files.iter()
    }

    /// A package declaring at least one target has a build file.
    pub fn has_build_file(&self) -> bool {
        !self.build_targets.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.build_targets.clear();
        self.source_files.clear();
    }
}
