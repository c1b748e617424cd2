//! Top-level answer pipeline.
//!
//! ```text
//! answer(session, text)
//!   classify ── SIMPLE ──────────────┐
//!      └──── MULTI ── split ─────────┤
//!                                    ▼ for each sub-query (sequential)
//!            plan ─▶ execute ─▶ judge   (≤ R+1 rounds, stop when relevant)
//!                                    │
//!              relevant ─▶ build_prompt ─▶ generate
//!              otherwise ─▶ cannot-answer message
//!   join parts with "\n\n" ─▶ append user + assistant turns
//! ```
//!
//! Tool calls within a plan and sub-queries within a message run
//! sequentially, so context blocks always appear in plan order.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::decomposer::QueryDecomposer;
use crate::error::ChatError;
use crate::generation::{Generator, TextStream};
use crate::judge::RelevanceJudge;
use crate::models::{QueryKind, RelevanceLabel, Turn};
use crate::planner::{ToolCall, ToolCallPlanner};
use crate::prompts::build_prompt;
use crate::session::SessionStore;
use crate::tools::{format_tool_result, ToolRegistry};

/// Separator between sub-answers of a multi-intent reply.
pub const RESPONSE_SEPARATOR: &str = "\n\n";

/// Pipeline tuning.
///
/// There is no `Default`: the reformulation bound must be chosen per
/// deployment. [`PipelineSettings::new`] fills everything else.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Extra plan/retrieve/judge rounds after the first. `0` means one round.
    pub max_reformulations: u32,
    /// Label a round must reach to stop the loop.
    pub relevance_threshold: RelevanceLabel,
    /// Top of the judge's scale; parsed labels are clamped to it.
    pub max_relevance_label: RelevanceLabel,
    pub answer_max_tokens: u32,
    pub planner_max_tokens: u32,
    pub judge_max_tokens: u32,
    pub classifier_max_tokens: u32,
    pub splitter_max_tokens: u32,
    /// Reply when no round was relevant. `{query}` is replaced by the query.
    pub cannot_answer_template: String,
    /// Tool output used when a tool fails.
    pub no_context_message: String,
}

impl PipelineSettings {
    pub fn new(max_reformulations: u32) -> Self {
        Self {
            max_reformulations,
            relevance_threshold: RelevanceLabel::RELEVANT,
            max_relevance_label: RelevanceLabel::RELEVANT,
            answer_max_tokens: 1024,
            planner_max_tokens: 512,
            judge_max_tokens: 256,
            classifier_max_tokens: 8,
            splitter_max_tokens: 256,
            cannot_answer_template:
                "I'm not able to answer \"{query}\" based on the available information.".to_string(),
            no_context_message: "No context available.".to_string(),
        }
    }
}

/// Result of the bounded retrieval loop for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOutcome {
    /// Tagged tool output of the last round.
    pub context: String,
    /// Judge label of the last round.
    pub relevance: RelevanceLabel,
    /// Rounds executed, `1..=R+1`.
    pub rounds: u32,
}

/// What to do for one (sub-)query once retrieval is over.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedAnswer {
    /// Reply with this text as-is.
    Fallback(String),
    /// Generate from this prompt.
    Generate { prompt: String },
}

pub struct AnswerOrchestrator {
    generator: Arc<dyn Generator>,
    tools: Arc<ToolRegistry>,
    sessions: Arc<dyn SessionStore>,
    planner: ToolCallPlanner,
    judge: RelevanceJudge,
    decomposer: QueryDecomposer,
    settings: PipelineSettings,
}

impl AnswerOrchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        tools: Arc<ToolRegistry>,
        sessions: Arc<dyn SessionStore>,
        settings: PipelineSettings,
    ) -> Self {
        let planner = ToolCallPlanner::new(generator.clone(), tools.clone(), settings.planner_max_tokens);
        let judge = RelevanceJudge::new(
            generator.clone(),
            settings.max_relevance_label,
            settings.judge_max_tokens,
        );
        let decomposer = QueryDecomposer::new(
            generator.clone(),
            settings.classifier_max_tokens,
            settings.splitter_max_tokens,
        );
        Self {
            generator,
            tools,
            sessions,
            planner,
            judge,
            decomposer,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// The fixed reply for a query no round could support.
    pub fn cannot_answer(&self, query: &str) -> String {
        self.settings
            .cannot_answer_template
            .replace("{query}", query.trim())
    }

    /// Run each call in order and join the tagged outputs.
    ///
    /// A failing tool contributes the no-context message instead of
    /// aborting the plan.
    pub async fn execute_plan(&self, calls: &[ToolCall]) -> String {
        let mut blocks = Vec::with_capacity(calls.len());
        for call in calls {
            let Some(tool) = self.tools.find(&call.tool) else {
                warn!(tool = %call.tool, "planned tool is not registered, skipping");
                continue;
            };
            let output = match tool.execute(&call.params).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(tool = %call.tool, error = %e, "tool execution failed");
                    self.settings.no_context_message.clone()
                }
            };
            blocks.push(format_tool_result(&call.tool, &output));
        }
        blocks.join("\n\n")
    }

    /// Plan, execute and judge until relevant or `R+1` rounds have run.
    pub async fn retrieve(&self, query: &str) -> RetrievalOutcome {
        let max_rounds = self.settings.max_reformulations.saturating_add(1);
        let threshold = self.settings.relevance_threshold;

        let mut outcome = RetrievalOutcome {
            context: String::new(),
            relevance: RelevanceLabel::NOT_RELEVANT,
            rounds: 0,
        };

        while outcome.rounds < max_rounds && !outcome.relevance.meets(threshold) {
            let plan = self.planner.plan(query).await;
            let fallback = plan.is_fallback();
            let calls = plan.into_calls();
            outcome.context = self.execute_plan(&calls).await;
            outcome.relevance = self.judge.judge(query, &outcome.context).await;
            outcome.rounds += 1;
            info!(
                round = outcome.rounds,
                max_rounds,
                tools = calls.len(),
                default_plan = fallback,
                relevance = %outcome.relevance,
                "retrieval round complete"
            );
        }

        outcome
    }

    /// Retrieve for `query` and decide between the fallback reply and a
    /// generation prompt.
    pub async fn prepare(&self, query: &str, history: &[Turn]) -> PreparedAnswer {
        let outcome = self.retrieve(query).await;
        if outcome.relevance.meets(self.settings.relevance_threshold) {
            PreparedAnswer::Generate {
                prompt: build_prompt(query, &outcome.context, history),
            }
        } else {
            info!(rounds = outcome.rounds, "no relevant context found, using fallback reply");
            PreparedAnswer::Fallback(self.cannot_answer(query))
        }
    }

    async fn answer_one(&self, query: &str, history: &[Turn]) -> String {
        match self.prepare(query, history).await {
            PreparedAnswer::Fallback(text) => text,
            PreparedAnswer::Generate { prompt } => {
                self.generator
                    .generate(&prompt, self.settings.answer_max_tokens)
                    .await
            }
        }
    }

    /// Sub-queries to answer for a user message.
    pub async fn sub_queries(&self, text: &str) -> Vec<String> {
        match self.decomposer.classify(text).await {
            QueryKind::Simple => vec![text.trim().to_string()],
            QueryKind::Multi => self.decomposer.split(text).await,
        }
    }

    async fn load_history(&self, session_id: &str, text: &str) -> Result<Vec<Turn>, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.sessions
            .history(session_id)
            .await?
            .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))
    }

    /// Answer a user message in a session.
    ///
    /// On success exactly two turns (user, then assistant) have been
    /// appended to the session.
    pub async fn answer(&self, session_id: &str, text: &str) -> Result<String, ChatError> {
        let history = self.load_history(session_id, text).await?;
        info!(session_id, "new message");

        let queries = self.sub_queries(text).await;
        debug!(parts = queries.len(), "answering");

        let mut parts = Vec::with_capacity(queries.len());
        for query in &queries {
            parts.push(self.answer_one(query, &history).await);
        }
        let reply = assemble_response(&parts);

        let appended = self
            .sessions
            .append_exchange(session_id, Turn::user(text), Turn::assistant(reply.clone()))
            .await?;
        if !appended {
            return Err(ChatError::SessionNotFound(session_id.to_string()));
        }
        Ok(reply)
    }

    /// Streaming variant of [`answer`](Self::answer).
    ///
    /// Retrieval for each sub-query completes before its text starts
    /// flowing. Sub-answers are separated by a `"\n\n"` fragment. The
    /// exchange is recorded once the stream is exhausted.
    pub async fn answer_stream(self: Arc<Self>, session_id: &str, text: &str) -> Result<TextStream, ChatError> {
        let history = self.load_history(session_id, text).await?;
        info!(session_id, "new streaming message");
        let queries = self.sub_queries(text).await;

        let state = StreamState {
            orchestrator: self,
            session_id: session_id.to_string(),
            user_text: text.to_string(),
            history,
            queries: queries.into_iter(),
            current: None,
            reply: String::new(),
            started: false,
        };

        Ok(Box::pin(stream::unfold(state, |mut st| async move {
            loop {
                if let Some(current) = st.current.as_mut() {
                    if let Some(fragment) = current.next().await {
                        st.reply.push_str(&fragment);
                        return Some((fragment, st));
                    }
                    st.current = None;
                }

                let Some(query) = st.queries.next() else {
                    st.record().await;
                    return None;
                };

                let orchestrator = st.orchestrator.clone();
                let next: TextStream = match orchestrator.prepare(&query, &st.history).await {
                    PreparedAnswer::Fallback(text) => Box::pin(stream::once(async move { text })),
                    PreparedAnswer::Generate { prompt } => {
                        orchestrator
                            .generator
                            .generate_stream(&prompt, orchestrator.settings.answer_max_tokens)
                            .await
                    }
                };
                st.current = Some(next);

                if st.started {
                    st.reply.push_str(RESPONSE_SEPARATOR);
                    return Some((RESPONSE_SEPARATOR.to_string(), st));
                }
                st.started = true;
            }
        })))
    }
}

struct StreamState {
    orchestrator: Arc<AnswerOrchestrator>,
    session_id: String,
    user_text: String,
    history: Vec<Turn>,
    queries: std::vec::IntoIter<String>,
    current: Option<TextStream>,
    reply: String,
    started: bool,
}

impl StreamState {
    /// Takes the state by value: `TextStream` is not `Sync`.
    async fn record(self) {
        let StreamState {
            orchestrator,
            session_id,
            user_text,
            reply,
            ..
        } = self;
        let result = orchestrator
            .sessions
            .append_exchange(&session_id, Turn::user(user_text), Turn::assistant(reply))
            .await;
        match result {
            Ok(true) => {}
            Ok(false) => warn!(session_id = %session_id, "session deleted before streamed reply was recorded"),
            Err(e) => warn!(session_id = %session_id, error = %e, "failed to record streamed exchange"),
        }
    }
}

/// Join sub-answers into one reply.
pub fn assemble_response(parts: &[String]) -> String {
    parts.join(RESPONSE_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_response() {
        assert_eq!(assemble_response(&["A".into(), "B".into()]), "A\n\nB");
        assert_eq!(assemble_response(&["only".into()]), "only");
        assert_eq!(assemble_response(&[]), "");
    }

    #[test]
    fn test_settings_defaults() {
        let s = PipelineSettings::new(2);
        assert_eq!(s.max_reformulations, 2);
        assert_eq!(s.relevance_threshold, RelevanceLabel::RELEVANT);
        assert!(s.cannot_answer_template.contains("{query}"));
    }
}
