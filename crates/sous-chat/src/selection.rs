//! Numeric picks against the last suggestion list ("2번", "1번이랑 3번").

use std::sync::LazyLock;

use regex::Regex;
use sous_core::Timestamp;

use crate::error::ChatError;
use crate::memory::{ConversationMemory, SuggestionList};

static INTEGER_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("Invalid integer regex"));

/// The result of resolving a pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Dish answered this turn.
    pub chosen: String,
    /// Other valid picks, named in the answer so the user can ask again.
    pub remaining: Vec<String>,
}

impl Selection {
    pub fn is_multi(&self) -> bool {
        !self.remaining.is_empty()
    }
}

/// Maps integer literals in an utterance onto the open suggestion list.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectionResolver;

impl SelectionResolver {
    /// Resolve without consuming anything.
    ///
    /// Returns `None` when the window is closed, the list is empty or no
    /// literal maps into range.
    pub fn peek(&self, utterance: &str, memory: &ConversationMemory, now: Timestamp) -> Option<Selection> {
        if !memory.suggestion_window_open_at(now) {
            return None;
        }
        let list = memory.suggestions()?;

        let mut picked: Vec<String> = Vec::new();
        for pick in Self::picks(utterance) {
            match Self::lookup(list, pick) {
                Ok(name) => picked.push(name.to_string()),
                Err(e) => tracing::debug!(error = %e, "Ignoring pick"),
            }
        }

        let mut picked = picked.into_iter();
        let chosen = picked.next()?;
        Some(Selection {
            chosen,
            remaining: picked.collect(),
        })
    }

    /// Resolve and, on success, consume the suggestion list.
    pub fn resolve(
        &self,
        utterance: &str,
        memory: &mut ConversationMemory,
        now: Timestamp,
    ) -> Option<Selection> {
        let selection = self.peek(utterance, memory, now)?;
        memory.consume_suggestions();
        tracing::info!(
            chosen = %selection.chosen,
            remaining = selection.remaining.len(),
            "Resolved numeric selection"
        );
        Some(selection)
    }

    /// Integer literals in order of appearance, first occurrence only.
    pub fn picks(utterance: &str) -> Vec<usize> {
        let mut out = Vec::new();
        for m in INTEGER_LITERAL.find_iter(utterance) {
            // Literals too large for usize cannot be in range anyway
            let Ok(n) = m.as_str().parse::<usize>() else {
                continue;
            };
            if !out.contains(&n) {
                out.push(n);
            }
        }
        out
    }

    fn lookup(list: &SuggestionList, pick: usize) -> Result<&str, ChatError> {
        list.get(pick).ok_or(ChatError::SelectionOutOfRange {
            index: pick,
            len: list.len(),
        })
    }
}
