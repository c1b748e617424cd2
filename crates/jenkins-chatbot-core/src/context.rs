//! Turning retrieved chunks back into prompt-ready text.
//!
//! Code blocks are stored outside of the chunk text and referenced by
//! `[[CODE_BLOCK_<n>]]` or `[[CODE_SNIPPET_<n>]]` placeholders. Rendering
//! substitutes each placeholder with `code_blocks[n]`.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

use crate::models::Chunk;

/// Rendered in place of a placeholder whose index has no code block.
pub const MISSING_CODE_MARKER: &str = "[MISSING_CODE]";

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[(?:CODE_BLOCK|CODE_SNIPPET)_(\d+)\]\]").expect("placeholder regex is valid")
});

/// Result of substituting code blocks into one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstructed {
    pub text: String,
    /// Placeholder indices that had no matching code block.
    pub missing: Vec<usize>,
}

/// Replace every placeholder in `chunk.text` with its code block.
///
/// Out-of-range (or unparseable) indices render as [`MISSING_CODE_MARKER`]
/// and are reported in [`Reconstructed::missing`].
pub fn reconstruct_code_blocks(chunk: &Chunk) -> Reconstructed {
    let mut missing = Vec::new();
    let text = PLACEHOLDER_RE
        .replace_all(&chunk.text, |caps: &Captures<'_>| {
            let block = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| chunk.code_blocks.get(n));
            match block {
                Some(code) => code.clone(),
                None => {
                    missing.push(caps[1].parse::<usize>().unwrap_or(usize::MAX));
                    MISSING_CODE_MARKER.to_string()
                }
            }
        })
        .into_owned();

    Reconstructed { text, missing }
}

/// Render chunks, in order, into a single context string.
///
/// Chunks without an id or without text are skipped with a warning.
/// Surviving texts are joined by a blank line. If nothing survives,
/// `empty_message` is returned instead.
pub fn render_context(chunks: &[Chunk], empty_message: &str) -> String {
    let mut texts: Vec<String> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        if chunk.id.is_empty() {
            warn!("retrieved chunk has no id, skipping");
            continue;
        }
        if chunk.text.is_empty() {
            warn!(chunk_id = %chunk.id, "retrieved chunk has no text, skipping");
            continue;
        }

        let rendered = reconstruct_code_blocks(chunk);
        if !rendered.missing.is_empty() {
            warn!(
                chunk_id = %chunk.id,
                missing = ?rendered.missing,
                available = chunk.code_blocks.len(),
                "more placeholders than code blocks in chunk"
            );
        }
        texts.push(rendered.text);
    }

    if texts.is_empty() {
        warn!("no usable chunks retrieved");
        empty_message.to_string()
    } else {
        texts.join("\n\n")
    }
}
