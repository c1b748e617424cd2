//! Tool-call planning: ask the model which tools to run, then validate.
//!
//! Planning never fails. Unparseable or invalid model output is replaced by
//! the default plan (every registered tool with the raw query), and the
//! reason is kept in [`Plan::Fallback`] for logging and tests.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::generation::Generator;
use crate::prompts::retriever_agent_prompt;
use crate::tools::{ParamError, ToolParams, ToolRegistry};

/// One validated tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub tool: String,
    pub params: ToolParams,
}

/// Why model output could not be used as a plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("planner output is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("planner output is not a JSON array")]
    NotAnArray,
    #[error("planner returned an empty plan")]
    Empty,
    #[error("tool call {index} is not an object")]
    NotAnObject { index: usize },
    #[error("tool call {index} has no string 'tool' field")]
    MissingToolName { index: usize },
    #[error("tool call {index} names unknown tool '{tool}'")]
    UnknownTool { index: usize, tool: String },
    #[error("tool call {index} has no 'params' object")]
    MissingParams { index: usize },
    #[error("tool call {index} ({tool}): {source}")]
    InvalidParams {
        index: usize,
        tool: String,
        #[source]
        source: ParamError,
    },
}

/// Outcome of planning.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// The model's plan validated.
    Parsed(Vec<ToolCall>),
    /// The model's plan was rejected; `calls` is the default plan.
    Fallback { calls: Vec<ToolCall>, reason: PlanError },
}

impl Plan {
    pub fn calls(&self) -> &[ToolCall] {
        match self {
            Plan::Parsed(calls) | Plan::Fallback { calls, .. } => calls,
        }
    }

    pub fn into_calls(self) -> Vec<ToolCall> {
        match self {
            Plan::Parsed(calls) | Plan::Fallback { calls, .. } => calls,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Plan::Fallback { .. })
    }
}

/// Validate a decoded JSON value as a list of tool calls.
///
/// Each element must be `{"tool": <registered name>, "params": {...}}` with
/// params matching that tool's signature. Total over any JSON value.
pub fn validate_tool_calls(value: &Value, registry: &ToolRegistry) -> Result<Vec<ToolCall>, PlanError> {
    let items = value.as_array().ok_or(PlanError::NotAnArray)?;
    if items.is_empty() {
        return Err(PlanError::Empty);
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let obj = item.as_object().ok_or(PlanError::NotAnObject { index })?;
            let name = obj
                .get("tool")
                .and_then(Value::as_str)
                .ok_or(PlanError::MissingToolName { index })?;
            let tool = registry.find(name).ok_or_else(|| PlanError::UnknownTool {
                index,
                tool: name.to_string(),
            })?;
            let raw = obj
                .get("params")
                .and_then(Value::as_object)
                .ok_or(PlanError::MissingParams { index })?;
            let params = tool
                .signature()
                .parse(raw)
                .map_err(|source| PlanError::InvalidParams {
                    index,
                    tool: name.to_string(),
                    source,
                })?;
            Ok(ToolCall {
                tool: name.to_string(),
                params,
            })
        })
        .collect()
}

/// Parse raw model output into tool calls.
///
/// Tolerates prose or code fences around the array by decoding from the
/// first `[` to the last `]`.
pub fn parse_tool_calls(raw: &str, registry: &ToolRegistry) -> Result<Vec<ToolCall>, PlanError> {
    let candidate = match (raw.find('['), raw.rfind(']')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => raw.trim(),
    };
    let value: Value =
        serde_json::from_str(candidate).map_err(|e| PlanError::InvalidJson(e.to_string()))?;
    validate_tool_calls(&value, registry)
}

/// One call per registered tool, in registry order, with the raw query.
pub fn default_plan(query: &str, registry: &ToolRegistry) -> Vec<ToolCall> {
    registry
        .tools()
        .iter()
        .map(|t| ToolCall {
            tool: t.name().to_string(),
            params: t.signature().defaults(query),
        })
        .collect()
}

/// Model-driven planner over an injected registry.
pub struct ToolCallPlanner {
    generator: Arc<dyn Generator>,
    registry: Arc<ToolRegistry>,
    max_tokens: u32,
}

impl ToolCallPlanner {
    pub fn new(generator: Arc<dyn Generator>, registry: Arc<ToolRegistry>, max_tokens: u32) -> Self {
        Self {
            generator,
            registry,
            max_tokens,
        }
    }

    pub async fn plan(&self, query: &str) -> Plan {
        let prompt = retriever_agent_prompt(query, &self.registry.catalog());
        let raw = self.generator.generate(&prompt, self.max_tokens).await;

        match parse_tool_calls(&raw, &self.registry) {
            Ok(calls) => {
                debug!(calls = calls.len(), "planner produced a valid plan");
                Plan::Parsed(calls)
            }
            Err(reason) => {
                warn!(%reason, "invalid tool plan, using default plan");
                Plan::Fallback {
                    calls: default_plan(query, &self.registry),
                    reason,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolSignature};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeTool(&'static str, ToolSignature);

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "fake"
        }
        fn signature(&self) -> ToolSignature {
            self.1
        }
        async fn execute(&self, params: &ToolParams) -> Result<String> {
            Ok(params.query().to_string())
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Box::new(FakeTool("search_jenkins_docs", ToolSignature::Search)));
        r.register(Box::new(FakeTool("search_plugin_docs", ToolSignature::PluginSearch)));
        r.register(Box::new(FakeTool("search_stackoverflow_threads", ToolSignature::QueryOnly)));
        r.register(Box::new(FakeTool("search_community_threads", ToolSignature::Search)));
        r
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl Generator for Fixed {
        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_valid_plan_parses() {
        let raw = r#"Here you go:
```json
[{"tool": "search_plugin_docs", "params": {"plugin_name": "git", "query": "install git plugin"}}]
```"#;
        let calls = parse_tool_calls(raw, &registry()).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "search_plugin_docs");
        assert_eq!(calls[0].params.plugin_name(), Some("git"));
    }

    #[test]
    fn test_validation_failures() {
        let r = registry();
        assert_eq!(validate_tool_calls(&json!({"tool": "x"}), &r), Err(PlanError::NotAnArray));
        assert_eq!(validate_tool_calls(&json!([]), &r), Err(PlanError::Empty));
        assert_eq!(
            validate_tool_calls(&json!(["search_jenkins_docs"]), &r),
            Err(PlanError::NotAnObject { index: 0 })
        );
        assert_eq!(
            validate_tool_calls(&json!([{"tool": "search_web", "params": {"query": "q"}}]), &r),
            Err(PlanError::UnknownTool {
                index: 0,
                tool: "search_web".into()
            })
        );
        assert_eq!(
            validate_tool_calls(&json!([{"tool": "search_jenkins_docs", "params": "q"}]), &r),
            Err(PlanError::MissingParams { index: 0 })
        );
        assert!(matches!(
            validate_tool_calls(
                &json!([
                    {"tool": "search_jenkins_docs", "params": {"query": "ok"}},
                    {"tool": "search_plugin_docs", "params": {"query": "q"}}
                ]),
                &r
            ),
            Err(PlanError::InvalidParams { index: 1, .. })
        ));
    }

    #[test]
    fn test_validation_is_total_over_json_values() {
        let r = registry();
        for v in [json!(null), json!(1), json!("s"), json!([null]), json!([{}]), json!([[1]])] {
            assert!(validate_tool_calls(&v, &r).is_err());
        }
    }

    #[test]
    fn test_default_plan_covers_every_tool() {
        let calls = default_plan("why?", &registry());
        let names: Vec<&str> = calls.iter().map(|c| c.tool.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "search_jenkins_docs",
                "search_plugin_docs",
                "search_stackoverflow_threads",
                "search_community_threads"
            ]
        );
        assert!(calls.iter().all(|c| c.params.query() == "why?"));
        assert_eq!(
            calls[1].params,
            ToolParams::PluginSearch {
                query: "why?".into(),
                keywords: None,
                plugin_name: None
            }
        );
    }

    #[tokio::test]
    async fn test_planner_falls_back_on_garbage() {
        let planner = ToolCallPlanner::new(
            Arc::new(Fixed("Sorry, something went wrong during generation.")),
            Arc::new(registry()),
            256,
        );
        let plan = planner.plan("how do I restart?").await;
        assert!(plan.is_fallback());
        assert_eq!(plan.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_planner_uses_valid_output() {
        let planner = ToolCallPlanner::new(
            Arc::new(Fixed(r#"[{"tool": "search_jenkins_docs", "params": {"query": "restart jenkins"}}]"#)),
            Arc::new(registry()),
            256,
        );
        let plan = planner.plan("how do I restart?").await;
        assert_eq!(
            plan,
            Plan::Parsed(vec![ToolCall {
                tool: "search_jenkins_docs".into(),
                params: ToolParams::Search {
                    query: "restart jenkins".into(),
                    keywords: None
                }
            }])
        );
    }
}
