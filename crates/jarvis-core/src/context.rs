//! Context assembly for generation prompts.
//!
//! Turns ranked [`RetrievedSnippet`]s into a bounded [`ContextBlock`]: the
//! snippet texts in rank order plus a parallel list of sources, so the
//! caller can attribute claims to the documents they came from.

use serde::{Deserialize, Serialize};

use crate::models::RetrievedSnippet;

/// Default number of snippets included in a context block.
pub const DEFAULT_CONTEXT_CAP: usize = 3;

/// Separator placed between snippet texts.
pub const SNIPPET_SEPARATOR: &str = "\n";

/// Ranked context passed to the generation backend.
///
/// `texts[i]` came from `sources[i]`; both lists are in rank order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    pub texts: Vec<String>,
    pub sources: Vec<String>,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Snippet texts joined in rank order.
    pub fn text(&self) -> String {
        self.texts.join(SNIPPET_SEPARATOR)
    }

    /// Prompt prefix for this context, or `""` when there is none.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("Context information:\n{}\n\n", self.text())
    }
}

/// Builds [`ContextBlock`]s from ranked snippets.
///
/// Snippets must already be ranked (highest score first); the assembler
/// never reorders them. `min_score` and `max_chars` are optional filters:
/// the first drops weak matches before capping, the second stops adding
/// snippets once the joined text would exceed the character budget.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextAssembler {
    /// Maximum number of snippets to include.
    pub cap: usize,
    /// Snippets scoring below this are skipped.
    pub min_score: Option<f32>,
    /// Upper bound on the joined context length, in characters.
    pub max_chars: Option<usize>,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_CAP)
    }
}

impl ContextAssembler {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            min_score: None,
            max_chars: None,
        }
    }

    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_max_chars(mut self, max_chars: Option<usize>) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Assemble up to `cap` snippets into a context block.
    ///
    /// An empty input yields an empty block rather than an error.
    pub fn assemble(&self, snippets: &[RetrievedSnippet]) -> ContextBlock {
        let mut block = ContextBlock::default();
        let mut used_chars = 0usize;

        let eligible = snippets
            .iter()
            .filter(|s| self.min_score.map_or(true, |min| s.score >= min))
            .take(self.cap);

        for snippet in eligible {
            if let Some(budget) = self.max_chars {
                let separator = if block.is_empty() {
                    0
                } else {
                    SNIPPET_SEPARATOR.len()
                };
                let needed = separator + snippet.text.chars().count();
                if used_chars + needed > budget {
                    break;
                }
                used_chars += needed;
            }
            block.texts.push(snippet.text.clone());
            block.sources.push(snippet.source.clone());
        }

        block
    }
}
