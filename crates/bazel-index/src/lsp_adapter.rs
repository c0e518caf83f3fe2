//
// lsp_adapter.rs
//
// Conversion of label completions to Language Server Protocol types.
//

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionList, CompletionResponse, CompletionTextEdit,
    Position, Range, TextEdit,
};

use crate::completion::{CandidateKind, CompletionCandidate, CursorPosition, LabelCompletion};

pub fn cursor_from_lsp(position: Position) -> CursorPosition {
    CursorPosition::new(position.line, position.character)
}

/// Range covering exactly the label text already typed.
pub fn typed_range(completion: &LabelCompletion) -> Range {
    Range::new(
        Position::new(completion.line, completion.start_character),
        Position::new(completion.line, completion.end_character),
    )
}

/// One item per candidate. Each item replaces the typed text with the
/// candidate's full label.
pub fn to_completion_items(completion: &LabelCompletion) -> Vec<CompletionItem> {
    let range = typed_range(completion);
    completion
        .candidates
        .iter()
        .map(|candidate| to_completion_item(candidate, range))
        .collect()
}

pub fn to_completion_response(completion: &LabelCompletion) -> CompletionResponse {
    CompletionResponse::List(CompletionList {
        is_incomplete: false,
        items: to_completion_items(completion),
    })
}

fn to_completion_item(candidate: &CompletionCandidate, range: Range) -> CompletionItem {
    let (kind, detail) = match &candidate.kind {
        CandidateKind::Package => (CompletionItemKind::FOLDER, None),
        CandidateKind::Target { rule_kind } if rule_kind.is_empty() => {
            (CompletionItemKind::VALUE, None)
        }
        CandidateKind::Target { rule_kind } => (CompletionItemKind::VALUE, Some(rule_kind.clone())),
    };
    CompletionItem {
        label: candidate.label.clone(),
        kind: Some(kind),
        detail,
        filter_text: Some(candidate.insert_text.clone()),
        text_edit: Some(CompletionTextEdit::Edit(TextEdit::new(
            range,
            candidate.insert_text.clone(),
        ))),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion() -> LabelCompletion {
        LabelCompletion {
            typed: "//main:".to_string(),
            line: 3,
            start_character: 13,
            end_character: 20,
            candidates: vec![
                CompletionCandidate {
                    label: "hello-world".to_string(),
                    insert_text: "//main:hello-world".to_string(),
                    kind: CandidateKind::Target {
                        rule_kind: "cc_binary".to_string(),
                    },
                },
                CompletionCandidate {
                    label: "//main/sub".to_string(),
                    insert_text: "//main/sub".to_string(),
                    kind: CandidateKind::Package,
                },
            ],
        }
    }

    #[test]
    fn test_edit_covers_typed_text() {
        let items = to_completion_items(&completion());
        assert_eq!(items.len(), 2);
        match &items[0].text_edit {
            Some(CompletionTextEdit::Edit(edit)) => {
                assert_eq!(edit.range.start, Position::new(3, 13));
                assert_eq!(edit.range.end, Position::new(3, 20));
                assert_eq!(edit.new_text, "//main:hello-world");
            }
            other => panic!("unexpected edit: {other:?}"),
        }
    }

    #[test]
    fn test_kinds_and_detail() {
        let items = to_completion_items(&completion());
        assert_eq!(items[0].kind, Some(CompletionItemKind::VALUE));
        assert_eq!(items[0].detail.as_deref(), Some("cc_binary"));
        assert_eq!(items[0].label, "hello-world");
        assert_eq!(items[1].kind, Some(CompletionItemKind::FOLDER));
        assert!(items[1].detail.is_none());
    }

    #[test]
    fn test_response_is_complete_list() {
        match to_completion_response(&completion()) {
            CompletionResponse::List(list) => {
                assert!(!list.is_incomplete);
                assert_eq!(list.items.len(), 2);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_cursor_from_lsp() {
        assert_eq!(cursor_from_lsp(Position::new(2, 7)), CursorPosition::new(2, 7));
    }
}
