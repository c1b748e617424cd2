//! `chatbot search`: run one retrieval tool directly, without the planner
//! or any generation. Useful for checking what the pipeline would see.

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};

use jenkins_chatbot_core::tools::{ToolParams, ToolRegistry, ToolSignature, SEARCH_JENKINS_DOCS};

use crate::chat::build_backend;
use crate::config::Config;

/// Typed parameters for `signature` from command-line values.
pub fn cli_params(
    signature: ToolSignature,
    query: &str,
    keywords: Option<&str>,
    plugin: Option<&str>,
) -> Result<ToolParams> {
    let mut raw = Map::new();
    raw.insert("query".into(), json!(query));
    raw.insert("plugin_name".into(), plugin.map_or(Value::Null, |p| json!(p)));
    if let Some(k) = keywords {
        raw.insert("keywords".into(), json!(k));
    }
    Ok(signature.parse(&raw)?)
}

pub async fn run_search(
    config: &Config,
    query: &str,
    tool: Option<&str>,
    keywords: Option<&str>,
    plugin: Option<&str>,
) -> Result<()> {
    let backend = build_backend(config).await?;
    let registry = ToolRegistry::with_corpus_tools(backend);

    let name = tool.unwrap_or(SEARCH_JENKINS_DOCS);
    let tool = registry.find(name).ok_or_else(|| {
        let known: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        anyhow!("Unknown tool: '{}'. Available: {}", name, known.join(", "))
    })?;

    let params = cli_params(tool.signature(), query, keywords, plugin)?;
    if plugin.is_some() && params.plugin_name().is_none() {
        eprintln!("note: {} takes no plugin filter; --plugin ignored", tool.name());
    }
    if keywords.is_some() && params.keywords().is_none() {
        eprintln!("note: {} takes no keywords; --keywords ignored", tool.name());
    }

    let output = tool.execute(&params).await?;
    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_params_per_signature() {
        let p = cli_params(ToolSignature::PluginSearch, "install", Some("git clone"), Some("git")).unwrap();
        assert_eq!(p.plugin_name(), Some("git"));
        assert_eq!(p.keywords(), Some("git clone"));

        let p = cli_params(ToolSignature::PluginSearch, "install", None, None).unwrap();
        assert_eq!(p.plugin_name(), None);

        let p = cli_params(ToolSignature::Search, "agents", None, Some("git")).unwrap();
        assert_eq!(p, ToolParams::Search { query: "agents".into(), keywords: None });

        let p = cli_params(ToolSignature::QueryOnly, "slack fails", Some("slack"), None).unwrap();
        assert_eq!(p, ToolParams::Search { query: "slack fails".into(), keywords: None });
    }
}
