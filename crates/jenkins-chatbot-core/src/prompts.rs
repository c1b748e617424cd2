//! Instruction templates for every model-driven stage, plus the final
//! answer prompt builder.
//!
//! Templates use `{query}`, `{context}` and `{tools}` slots filled with
//! plain string replacement, so literal braces in examples need no escaping.

use crate::models::Turn;

pub const SYSTEM_INSTRUCTION: &str = "\
You are JenkinsBot, an expert assistant for Jenkins and its ecosystem.
You help users with CI/CD pipelines, plugin usage, configuration, administration and troubleshooting.

Answer the user's current question using the retrieved context and the prior conversation.
Summarize the relevant parts in your own words instead of copying large passages.
Do not invent facts that the context or the conversation does not support.

If the answer is not in the context or the conversation, reply with:
\"I'm not able to answer based on the available information.\"";

pub const QUERY_CLASSIFIER_PROMPT: &str = "\
You are JenkinsBot, an expert assistant for Jenkins and its ecosystem.
Classify the user query by how many separate intents it contains.

SIMPLE: one question or task, however detailed.
MULTI: two or more distinct questions or requests that need separate answers.

Respond with only: SIMPLE or MULTI.

###
Query: How do I install Jenkins on Ubuntu?
Answer: SIMPLE

Query: How do I install Jenkins and also configure it to use the GitHub plugin?
Answer: MULTI

Query: Why is my job failing after the merge, and how can I fix the pipeline?
Answer: MULTI
###

<<<
Query:
{query}
>>>

Answer:
";

pub const SPLIT_QUERY_PROMPT: &str = "\
You are JenkinsBot, an expert assistant for Jenkins and its ecosystem.
Break the user query into separate, self-contained questions, one per intent.
Respond with a list of strings and nothing else.

###
User query:
How can I install Jenkins and configure it to use the GitHub plugin?

Decomposed questions:
[\"How can I install Jenkins?\", \"How can I configure Jenkins to use the GitHub plugin?\"]
###

<<<
User query:
{query}
>>>

Decomposed questions:
";

pub const RETRIEVER_AGENT_PROMPT: &str = "\
You are JenkinsBot, an expert assistant for Jenkins and its ecosystem.
You can retrieve information with these tools (parameters marked ? are optional):
{tools}

Choose the tool or tools that best fit the user query. Rewrite the query parameter when a
clearer or more specific search phrase would help. Use search_plugin_docs whenever the query
is about a plugin; if the plugin name is unknown, pass \"plugin_name\": null.
Use the thread searches only for troubleshooting errors, failures or undocumented behavior.

Return only a JSON array of tool calls, with no explanation.

###
User query:
Why does my Slack plugin stop working after a pipeline failure?

Tool calls:
[
  {\"tool\": \"search_plugin_docs\", \"params\": {\"plugin_name\": \"slack\", \"query\": \"jenkins slack plugin stops working after pipeline failure\"}},
  {\"tool\": \"search_stackoverflow_threads\", \"params\": {\"query\": \"jenkins slack plugin stops working after pipeline failure\"}}
]
###

<<<
User query:
{query}
>>>

Tool calls:
";

pub const CONTEXT_RELEVANCE_PROMPT: &str = "\
You are JenkinsBot, and you check whether retrieved information about Jenkins is useful.
You are given a user query and context blocks, each marked with the search tool that produced it.

Decide whether any part of the context helps answer the query.

Labels:
- 1: Relevant. Some part of the context addresses the query or provides key information for it.
- 0: Not relevant. Nothing in the context helps answer the query.

Give a short explanation, then the final label on its own line as \"Label: <digit>\".

###
Query:
How can I install Jenkins on Ubuntu?

Context:
[Result of the search tool search_plugin_docs]:
To configure webhook events in the GitHub plugin, go to Manage Jenkins > System and set the webhook URL.

Relevance Analysis:
The context is about GitHub webhooks, not installing Jenkins on Ubuntu.

Label: 0
###

<<<
Query:
{query}

Context:
{context}
>>>

Relevance Analysis:
";

pub fn classifier_prompt(query: &str) -> String {
    QUERY_CLASSIFIER_PROMPT.replace("{query}", query)
}

pub fn split_prompt(query: &str) -> String {
    SPLIT_QUERY_PROMPT.replace("{query}", query)
}

/// Planner prompt. `tools` is the registry catalog.
pub fn retriever_agent_prompt(query: &str, tools: &str) -> String {
    // tools first so a query containing "{tools}" is left alone
    RETRIEVER_AGENT_PROMPT
        .replace("{tools}", tools)
        .replace("{query}", query)
}

pub fn relevance_prompt(query: &str, context: &str) -> String {
    // context first: retrieved text may legitimately contain "{query}"
    CONTEXT_RELEVANCE_PROMPT
        .replace("{context}", context)
        .replace("{query}", query)
}

/// Render history as `User: ...` / `Jenkins Assistant: ...` lines.
pub fn format_history(history: &[Turn]) -> String {
    history
        .iter()
        .map(|t| format!("{}: {}", t.role.prompt_label(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Final answer prompt.
///
/// Pure string assembly: system instruction, history, context, question.
pub fn build_prompt(query: &str, context: &str, history: &[Turn]) -> String {
    format!(
        "{}\n\nChat History:\n{}\n\nContext:\n{}\n\nUser Question:\n{}\n\nAnswer:\n",
        SYSTEM_INSTRUCTION,
        format_history(history),
        context,
        query.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_sections_in_order() {
        let history = vec![Turn::user("hi"), Turn::assistant("hello")];
        let prompt = build_prompt("  How do I install Jenkins?  ", "ctx", &history);

        let sys = prompt.find("JenkinsBot").unwrap();
        let hist = prompt.find("Chat History:\nUser: hi\nJenkins Assistant: hello").unwrap();
        let ctx = prompt.find("Context:\nctx").unwrap();
        let question = prompt.find("User Question:\nHow do I install Jenkins?\n").unwrap();
        let answer = prompt.rfind("Answer:").unwrap();
        assert!(sys < hist && hist < ctx && ctx < question && question < answer);
    }

    #[test]
    fn test_build_prompt_without_history() {
        let prompt = build_prompt("q", "c", &[]);
        assert!(prompt.contains("Chat History:\n\n\nContext:\nc"));
    }

    #[test]
    fn test_relevance_prompt_does_not_rewrite_context() {
        let prompt = relevance_prompt("real query", "literal {query} in docs");
        assert!(prompt.contains("literal {query} in docs"));
        assert!(prompt.contains("Query:\nreal query"));
    }

    #[test]
    fn test_retriever_prompt_embeds_catalog() {
        let prompt = retriever_agent_prompt("q", "1. search_x(query) - x");
        assert!(prompt.contains("1. search_x(query) - x"));
        assert!(!prompt.contains("{tools}"));
    }
}
