//! Relevance judging of retrieved context.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::generation::Generator;
use crate::models::RelevanceLabel;
use crate::prompts::relevance_prompt;

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:final\s+)?label\s*:\s*\**\s*(\d+)\b").expect("label regex is valid")
});

/// Extract the relevance label from free-text model output.
///
/// Matches `Label: <n>` or `Final label: <n>` as whole words,
/// case-insensitive, tolerating markdown bold. When the model writes
/// several, the last one wins, since labels follow the explanation.
/// Values past `u8::MAX` saturate; the judge clamps to its own scale.
pub fn parse_relevance_label(text: &str) -> Option<RelevanceLabel> {
    LABEL_RE
        .captures_iter(text)
        .last()
        .map(|caps| caps[1].parse::<u8>().unwrap_or(u8::MAX))
        .map(RelevanceLabel)
}

/// Model-driven relevance judge.
pub struct RelevanceJudge {
    generator: Arc<dyn Generator>,
    max_label: RelevanceLabel,
    max_tokens: u32,
}

impl RelevanceJudge {
    pub fn new(generator: Arc<dyn Generator>, max_label: RelevanceLabel, max_tokens: u32) -> Self {
        Self {
            generator,
            max_label,
            max_tokens,
        }
    }

    /// Label `context` for `query`. Missing markers yield
    /// [`RelevanceLabel::NOT_RELEVANT`]; labels above the scale are clamped.
    pub async fn judge(&self, query: &str, context: &str) -> RelevanceLabel {
        let output = self
            .generator
            .generate(&relevance_prompt(query, context), self.max_tokens)
            .await;
        let label = match parse_relevance_label(&output) {
            Some(label) => label.min(self.max_label),
            None => {
                warn!(output = %output, "no relevance label in judge output, treating context as not relevant");
                RelevanceLabel::NOT_RELEVANT
            }
        };
        debug!(%label, "context judged");
        label
    }
}
