//
// completion.rs
//
// Label completion inside string literals of build files.
//
// Typing `/` completes child packages of the path typed so far; typing `:`
// completes the targets declared in that package. Results carry no protocol
// types; `lsp_adapter` converts them.
//

use crate::error::IndexError;
use crate::label::render_package;
use crate::utf16::{utf16_column_to_byte_offset, utf16_len};
use crate::workspace_api::WorkspaceApi;

/// Zero-based line and UTF-16 column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: u32,
    pub character: u32,
}

impl CursorPosition {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateKind {
    Package,
    Target { rule_kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCandidate {
    /// Short text shown in the menu.
    pub label: String,
    /// Replacement for the whole typed label.
    pub insert_text: String,
    pub kind: CandidateKind,
}

/// Candidates for the label being typed at a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCompletion {
    /// Literal text between the opening quote and the cursor.
    pub typed: String,
    pub line: u32,
    /// UTF-16 column of the first typed character.
    pub start_character: u32,
    /// UTF-16 column of the cursor.
    pub end_character: u32,
    pub candidates: Vec<CompletionCandidate>,
}

/// Text of the string literal that the cursor sits in, from its opening
/// quote up to the cursor, and the byte offset where that text starts.
///
/// Returns `None` if no unescaped quote precedes the cursor on this line.
pub fn extract_label_prefix(before_cursor: &str) -> Option<(usize, &str)> {
    let bytes = before_cursor.as_bytes();
    let mut index = bytes.len();
    while index > 0 {
        index -= 1;
        if (bytes[index] == b'"' || bytes[index] == b'\'') && !is_escaped(bytes, index) {
            let start = index + 1;
            return Some((start, &before_cursor[start..]));
        }
    }
    None
}

/// An odd run of backslashes before `index` escapes the byte there.
fn is_escaped(bytes: &[u8], index: usize) -> bool {
    let backslashes = bytes[..index]
        .iter()
        .rev()
        .take_while(|&&b| b == b'\\')
        .count();
    backslashes % 2 == 1
}

/// Complete the label at `position` in `text`.
///
/// `trigger` is the character that caused the request; when absent it is
/// taken from the last typed character. Returns `None` when the cursor is not
/// inside a string literal or the trigger is neither `/` nor `:`. Labels in
/// external workspaces and paths that are not indexed produce an empty
/// candidate list.
pub fn complete_label(
    api: &WorkspaceApi<'_>,
    text: &str,
    position: CursorPosition,
    trigger: Option<char>,
    current_package: &[String],
) -> Option<LabelCompletion> {
    let line = text.lines().nth(position.line as usize)?;
    let cursor = utf16_column_to_byte_offset(line, position.character);
    let (_, typed) = extract_label_prefix(&line[..cursor])?;
    let trigger = trigger.or_else(|| typed.chars().last())?;
    if !matches!(trigger, '/' | ':') {
        return None;
    }

    let end_character = utf16_len(&line[..cursor]);
    let mut completion = LabelCompletion {
        typed: typed.to_string(),
        line: position.line,
        start_character: end_character - utf16_len(typed),
        end_character,
        candidates: Vec::new(),
    };

    if typed.starts_with('@') {
        log::debug!("No completions for external label {:?}", typed);
        return Some(completion);
    }

    let result = if trigger == '/' {
        package_candidates(api, typed)
    } else {
        target_candidates(api, typed, current_package)
    };
    match result {
        Ok(candidates) => completion.candidates = candidates,
        Err(IndexError::InvalidPath(path)) => {
            log::debug!("No completions, path not indexed: {}", path);
        }
        Err(err) => log::warn!("Completion failed for {:?}: {}", typed, err),
    }
    Some(completion)
}

fn package_candidates(
    api: &WorkspaceApi<'_>,
    typed: &str,
) -> Result<Vec<CompletionCandidate>, IndexError> {
    let paths = api.find_possible_completions_for_path(typed)?;
    Ok(paths
        .into_iter()
        .map(|path| CompletionCandidate {
            label: path.clone(),
            insert_text: path,
            kind: CandidateKind::Package,
        })
        .collect())
}

fn target_candidates(
    api: &WorkspaceApi<'_>,
    typed: &str,
    current_package: &[String],
) -> Result<Vec<CompletionCandidate>, IndexError> {
    let package = typed.strip_suffix(':').unwrap_or(typed);
    let path = if package.is_empty() {
        render_package(current_package)
    } else {
        package.to_string()
    };
    let targets = api.find_possible_targets_for_path(&path)?;
    Ok(targets
        .into_iter()
        .map(|target| CompletionCandidate {
            label: target.label().to_string(),
            insert_text: format!("{}:{}", package, target.label()),
            kind: CandidateKind::Target {
                rule_kind: target.kind().to_string(),
            },
        })
        .collect())
}
