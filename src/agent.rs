//! Answering agent.
//!
//! Runs a bounded tool-calling loop over a [`ChatModel`]:
//!
//! 1. The conversation starts with the system prompt and the user question.
//! 2. Each turn the model either answers (loop ends) or requests tools.
//! 3. Every request is executed through the [`ToolRegistry`] and its result
//!    appended. Unknown tools and invalid arguments are reported back to the
//!    model as result payloads. A failing retrieval backend ends the loop
//!    with an error.
//! 4. After `max_turns` tool turns, one final call is made with no tools
//!    offered so the model has to answer from what it has.
//!
//! Sources are the distinct filenames of chunks the tools actually returned.

use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::llm::{ChatModel, Message, Reply, ToolCall};
use crate::tools::{ToolError, ToolRegistry};

/// Final answer plus attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Sorted, distinct source filenames.
    pub sources: Vec<String>,
    /// Total chunks returned by tools over the whole loop.
    pub chunks_retrieved: usize,
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    max_turns: usize,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
        max_turns: usize,
    ) -> Self {
        Self {
            model,
            tools,
            system_prompt: system_prompt.into(),
            max_turns,
        }
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    pub async fn answer(&self, query: &str, use_rag: bool) -> Result<Answer> {
        if use_rag {
            self.run_loop(query).await
        } else {
            self.direct(query).await
        }
    }

    async fn direct(&self, query: &str) -> Result<Answer> {
        let text = match self.model.chat(&[Message::user(query)], &[]).await? {
            Reply::Answer(text) => text,
            Reply::ToolCalls(_) => anyhow::bail!("model requested tools although none were offered"),
        };
        Ok(Answer {
            text,
            sources: Vec::new(),
            chunks_retrieved: 0,
        })
    }

    async fn run_loop(&self, query: &str) -> Result<Answer> {
        let specs = self.tools.specs();
        let mut messages = vec![Message::system(&self.system_prompt), Message::user(query)];
        let mut sources = BTreeSet::new();
        let mut chunks_retrieved = 0usize;

        for turn in 0..self.max_turns {
            let calls = match self.model.chat(&messages, &specs).await? {
                Reply::Answer(text) => return Ok(finish(text, sources, chunks_retrieved)),
                Reply::ToolCalls(calls) => calls,
            };
            tracing::debug!(turn, calls = calls.len(), "model requested tools");

            messages.extend(calls.iter().cloned().map(Message::from));
            for call in calls {
                let (payload, found) = self.dispatch(&call).await?;
                chunks_retrieved += found.len();
                sources.extend(found);
                messages.push(Message::ToolResult {
                    id: call.id,
                    name: call.name,
                    payload,
                });
            }
        }

        tracing::info!(
            max_turns = self.max_turns,
            "tool turn limit reached; requesting final answer"
        );
        match self.model.chat(&messages, &[]).await? {
            Reply::Answer(text) => Ok(finish(text, sources, chunks_retrieved)),
            Reply::ToolCalls(_) => anyhow::bail!("model kept requesting tools after the turn limit"),
        }
    }

    /// Run one tool call. Returns the payload for the model and the
    /// filenames of the chunks it surfaced, or the backend error.
    async fn dispatch(&self, call: &ToolCall) -> Result<(String, Vec<String>)> {
        let Some(tool) = self.tools.find(&call.name) else {
            tracing::warn!(tool = %call.name, "model requested unknown tool");
            return Ok((format!("Error: unknown tool '{}'", call.name), Vec::new()));
        };

        match tool.execute(call.args.clone()).await {
            Ok(output) => {
                let files = output
                    .chunks
                    .into_iter()
                    .map(|c| c.metadata.filename)
                    .collect();
                Ok((output.payload, files))
            }
            Err(ToolError::InvalidArguments(message)) => {
                tracing::warn!(tool = %call.name, error = %message, "invalid tool arguments");
                Ok((format!("Error: {}", message), Vec::new()))
            }
            Err(ToolError::Backend(e)) => Err(e.context(format!("tool '{}' failed", call.name))),
        }
    }
}

fn finish(text: String, sources: BTreeSet<String>, chunks_retrieved: usize) -> Answer {
    Answer {
        text,
        sources: sources.into_iter().collect(),
        chunks_retrieved,
    }
}
