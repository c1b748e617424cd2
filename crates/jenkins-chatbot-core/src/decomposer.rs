//! Query decomposition: single- vs multi-intent classification and
//! splitting multi-intent queries into independent sub-queries.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::generation::Generator;
use crate::models::QueryKind;
use crate::prompts::{classifier_prompt, split_prompt};

static KIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(SIMPLE|MULTI)\b").expect("kind regex is valid"));

/// First whole-word `SIMPLE` or `MULTI` in `text` (case-sensitive).
/// `None` when neither appears.
pub fn parse_query_kind(text: &str) -> Option<QueryKind> {
    let caps = KIND_RE.captures(text)?;
    match &caps[1] {
        "SIMPLE" => Some(QueryKind::Simple),
        _ => Some(QueryKind::Multi),
    }
}

/// Parse a list-of-strings literal from model output.
///
/// Accepts JSON arrays and single-quoted list literals, with surrounding
/// prose ignored. Entries are trimmed and empty ones dropped. Returns
/// `None` if no non-empty list can be read.
pub fn parse_sub_queries(text: &str) -> Option<Vec<String>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    let literal = &text[start..=end];

    let items = serde_json::from_str::<Vec<String>>(literal)
        .ok()
        .or_else(|| parse_quoted_list(literal))?;

    let items: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

/// `['a', "b"]` with either quote style and backslash escapes.
fn parse_quoted_list(literal: &str) -> Option<Vec<String>> {
    let inner = literal.strip_prefix('[')?.strip_suffix(']')?;
    let mut chars = inner.chars().peekable();
    let mut items = Vec::new();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(quote) = chars.next() else {
            break;
        };
        if quote != '\'' && quote != '"' {
            return None;
        }

        let mut item = String::new();
        loop {
            match chars.next()? {
                '\\' => match chars.next()? {
                    'n' => item.push('\n'),
                    't' => item.push('\t'),
                    other => item.push(other),
                },
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(_) => return None,
        }
    }

    Some(items)
}

/// Model-driven classifier and splitter.
pub struct QueryDecomposer {
    generator: Arc<dyn Generator>,
    classify_max_tokens: u32,
    split_max_tokens: u32,
}

impl QueryDecomposer {
    pub fn new(generator: Arc<dyn Generator>, classify_max_tokens: u32, split_max_tokens: u32) -> Self {
        Self {
            generator,
            classify_max_tokens,
            split_max_tokens,
        }
    }

    /// Classify `query`. Output without a marker is treated as
    /// [`QueryKind::Multi`]; a needless split still answers the question.
    pub async fn classify(&self, query: &str) -> QueryKind {
        let output = self
            .generator
            .generate(&classifier_prompt(query), self.classify_max_tokens)
            .await;
        let kind = parse_query_kind(&output).unwrap_or_else(|| {
            warn!(output = %output, "no SIMPLE/MULTI marker in classifier output, treating query as multi-intent");
            QueryKind::Multi
        });
        debug!(kind = kind.as_str(), "query classified");
        kind
    }

    /// Split into sub-queries; `[query]` (trimmed) if the output is unusable.
    pub async fn split(&self, query: &str) -> Vec<String> {
        let output = self
            .generator
            .generate(&split_prompt(query), self.split_max_tokens)
            .await;
        match parse_sub_queries(&output) {
            Some(parts) => {
                debug!(parts = parts.len(), "query split");
                parts
            }
            None => {
                warn!("could not parse sub-queries, keeping the original query");
                vec![query.trim().to_string()]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_logs::LogCapture;
    use async_trait::async_trait;

    #[test]
    fn test_kind_parsing() {
        assert_eq!(parse_query_kind("SIMPLE"), Some(QueryKind::Simple));
        assert_eq!(parse_query_kind("Answer: SIMPLE\n"), Some(QueryKind::Simple));
        assert_eq!(parse_query_kind("MULTI"), Some(QueryKind::Multi));
        assert_eq!(parse_query_kind("MULTI, not SIMPLE"), Some(QueryKind::Multi));
    }

    #[test]
    fn test_kind_without_marker() {
        for text in ["", "simple", "SIMPLEST", "It is a single question", "Sorry, something went wrong during generation."] {
            assert_eq!(parse_query_kind(text), None, "{:?}", text);
        }
    }

    #[test]
    fn test_sub_queries_json_and_python_literals() {
        assert_eq!(
            parse_sub_queries(r#"["How do I install Jenkins?", " How do I add an agent? "]"#),
            Some(vec!["How do I install Jenkins?".to_string(), "How do I add an agent?".to_string()])
        );
        assert_eq!(
            parse_sub_queries("Decomposed:\n['What\\'s a node?', \"What is a label?\"]"),
            Some(vec!["What's a node?".to_string(), "What is a label?".to_string()])
        );
    }

    #[test]
    fn test_sub_queries_unparseable() {
        assert_eq!(parse_sub_queries("no list here"), None);
        assert_eq!(parse_sub_queries("[1, 2]"), None);
        assert_eq!(parse_sub_queries("['unterminated]"), None);
        assert_eq!(parse_sub_queries("[]"), None);
        assert_eq!(parse_sub_queries("['  ', '']"), None);
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl Generator for Fixed {
        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> String {
            self.0.to_string()
        }
    }

    #[tokio::test]
    async fn test_split_falls_back_to_trimmed_query() {
        let d = QueryDecomposer::new(Arc::new(Fixed("I cannot do that")), 16, 128);
        assert_eq!(d.split("  install and configure?  ").await, vec!["install and configure?"]);
    }

    #[tokio::test]
    async fn test_classify_without_marker_warns_and_splits() {
        let logs = LogCapture::start();
        let d = QueryDecomposer::new(Arc::new(Fixed("It is a single question")), 16, 128);
        assert_eq!(d.classify("How do I add an agent?").await, QueryKind::Multi);

        let out = logs.contents();
        assert!(out.contains("WARN"), "logs: {}", out);
        assert!(out.contains("SIMPLE/MULTI"), "logs: {}", out);
    }

    #[tokio::test]
    async fn test_classify_with_marker_is_quiet() {
        let logs = LogCapture::start();
        let d = QueryDecomposer::new(Arc::new(Fixed("SIMPLE")), 16, 128);
        assert_eq!(d.classify("How do I add an agent?").await, QueryKind::Simple);
        assert!(!logs.contents().contains("WARN"));
    }
}
