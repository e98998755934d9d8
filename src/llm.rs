//! Chat model backends and the conversation message type.
//!
//! A conversation is a list of [`Message`]s. Each message is exactly one of
//! plain text, a tool request emitted by the model, or the result of running
//! that tool, so the agent never has to probe a reply for optional fields.
//!
//! | Backend | Endpoint | Tool calls |
//! |---------|----------|------------|
//! | [`OllamaChat`] | `POST /api/chat` | `message.tool_calls[].function` (object arguments) |
//! | [`OpenAIChat`] | `POST /v1/chat/completions` | `choices[0].message.tool_calls` (string arguments) |

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::http;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text { role: Role, content: String },
    ToolRequest { id: String, name: String, args: Value },
    ToolResult { id: String, name: String, payload: String },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::Text {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::Text {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A tool request parsed from a model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl From<ToolCall> for Message {
    fn from(call: ToolCall) -> Self {
        Message::ToolRequest {
            id: call.id,
            name: call.name,
            args: call.args,
        }
    }
}

/// What the model did with its turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Answer(String),
    ToolCalls(Vec<ToolCall>),
}

/// Declared capability offered to the model (OpenAI function-calling shape).
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    fn to_wire(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// One completion turn. An empty `tools` slice disables tool use.
    async fn chat(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Reply>;

    /// Confirm the backend is reachable.
    async fn ping(&self) -> Result<()>;
}

pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ Ollama ============

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

pub struct OllamaChat {
    model: String,
    url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Reply> {
        let mut body = json!({
            "model": self.model,
            "messages": ollama_messages(messages),
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolSpec::to_wire).collect());
        }
        let json = http::post_json(
            &self.client,
            &format!("{}/api/chat", self.url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_reply(&json)
    }

    async fn ping(&self) -> Result<()> {
        http::get_ok(&self.client, &format!("{}/api/tags", self.url), None).await?;
        Ok(())
    }
}

/// Consecutive tool requests are grouped into one assistant message.
fn ollama_messages(messages: &[Message]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(messages.len());
    let mut grouping = false;
    for msg in messages {
        match msg {
            Message::Text { role, content } => {
                grouping = false;
                out.push(json!({ "role": role.as_str(), "content": content }));
            }
            Message::ToolRequest { name, args, .. } => {
                let call = json!({ "function": { "name": name, "arguments": args } });
                if grouping {
                    if let Some(calls) = out
                        .last_mut()
                        .and_then(|last| last["tool_calls"].as_array_mut())
                    {
                        calls.push(call);
                        continue;
                    }
                }
                out.push(json!({
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [call],
                }));
                grouping = true;
            }
            Message::ToolResult { name, payload, .. } => {
                grouping = false;
                out.push(json!({ "role": "tool", "tool_name": name, "content": payload }));
            }
        }
    }
    out
}

fn parse_ollama_reply(json: &Value) -> Result<Reply> {
    let message = json
        .get("message")
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message"))?;

    if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
        if !calls.is_empty() {
            return Ok(Reply::ToolCalls(parse_tool_calls(calls, "Ollama")?));
        }
    }

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default();
    Ok(Reply::Answer(content.to_string()))
}

// ============ OpenAI ============

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";

pub struct OpenAIChat {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: http::openai_api_key()?,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Reply> {
        let mut body = json!({
            "model": self.model,
            "messages": openai_messages(messages),
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolSpec::to_wire).collect());
        }
        let json = http::post_json(
            &self.client,
            &format!("{}/v1/chat/completions", self.url),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_reply(&json)
    }

    async fn ping(&self) -> Result<()> {
        http::get_ok(
            &self.client,
            &format!("{}/v1/models", self.url),
            Some(&self.api_key),
        )
        .await?;
        Ok(())
    }
}

fn openai_messages(messages: &[Message]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(messages.len());
    let mut grouping = false;
    for msg in messages {
        match msg {
            Message::Text { role, content } => {
                grouping = false;
                out.push(json!({ "role": role.as_str(), "content": content }));
            }
            Message::ToolRequest { id, name, args } => {
                let call = json!({
                    "id": id,
                    "type": "function",
                    "function": { "name": name, "arguments": args.to_string() },
                });
                if grouping {
                    if let Some(calls) = out
                        .last_mut()
                        .and_then(|last| last["tool_calls"].as_array_mut())
                    {
                        calls.push(call);
                        continue;
                    }
                }
                out.push(json!({
                    "role": "assistant",
                    "content": Value::Null,
                    "tool_calls": [call],
                }));
                grouping = true;
            }
            Message::ToolResult { id, payload, .. } => {
                grouping = false;
                out.push(json!({ "role": "tool", "tool_call_id": id, "content": payload }));
            }
        }
    }
    out
}

fn parse_openai_reply(json: &Value) -> Result<Reply> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message"))?;

    if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
        if !calls.is_empty() {
            return Ok(Reply::ToolCalls(parse_tool_calls(calls, "OpenAI")?));
        }
    }

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default();
    Ok(Reply::Answer(content.to_string()))
}

/// Parse the `tool_calls` array shared by the Ollama and OpenAI chat
/// formats. Calls without an `id` get a positional one.
fn parse_tool_calls(calls: &[Value], provider: &str) -> Result<Vec<ToolCall>> {
    calls
        .iter()
        .enumerate()
        .map(|(i, call)| -> Result<ToolCall> {
            let function = &call["function"];
            let name = function["name"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid {} tool call: missing name", provider))?;
            Ok(ToolCall {
                id: call["id"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("call_{}", i)),
                name: name.to_string(),
                args: normalize_arguments(&function["arguments"]),
            })
        })
        .collect()
}

/// Tool arguments arrive either as an object or as a JSON-encoded string.
fn normalize_arguments(raw: &Value) -> Value {
    match raw {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| json!({ "query": s })),
        Value::Null => json!({}),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Vec<Message> {
        vec![
            Message::system("be brief"),
            Message::user("what grew?"),
            Message::ToolRequest {
                id: "call_0".into(),
                name: "pdf_retriever".into(),
                args: json!({ "query": "growth" }),
            },
            Message::ToolRequest {
                id: "call_1".into(),
                name: "pdf_retriever".into(),
                args: json!({ "query": "revenue" }),
            },
            Message::ToolResult {
                id: "call_0".into(),
                name: "pdf_retriever".into(),
                payload: "revenue grew".into(),
            },
            Message::ToolResult {
                id: "call_1".into(),
                name: "pdf_retriever".into(),
                payload: "by 10%".into(),
            },
        ]
    }

    #[test]
    fn ollama_groups_consecutive_tool_requests() {
        let wire = ollama_messages(&conversation());
        assert_eq!(wire.len(), 5);
        assert_eq!(wire[2]["role"], "assistant");
        assert_eq!(wire[2]["tool_calls"].as_array().unwrap().len(), 2);
        assert_eq!(wire[2]["tool_calls"][1]["function"]["arguments"]["query"], "revenue");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_name"], "pdf_retriever");
    }

    #[test]
    fn openai_encodes_arguments_as_string_and_links_ids() {
        let wire = openai_messages(&conversation());
        assert_eq!(wire.len(), 5);
        let args = wire[2]["tool_calls"][0]["function"]["arguments"].as_str().unwrap();
        assert_eq!(serde_json::from_str::<Value>(args).unwrap()["query"], "growth");
        assert_eq!(wire[4]["tool_call_id"], "call_1");
    }

    #[test]
    fn parses_ollama_answer() {
        let json = json!({ "message": { "role": "assistant", "content": "Hello!" }, "done": true });
        assert_eq!(parse_ollama_reply(&json).unwrap(), Reply::Answer("Hello!".into()));
    }

    #[test]
    fn parses_ollama_tool_calls() {
        let json = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    { "function": { "name": "pdf_retriever", "arguments": { "query": "revenue" } } }
                ]
            }
        });
        match parse_ollama_reply(&json).unwrap() {
            Reply::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "call_0");
                assert_eq!(calls[0].name, "pdf_retriever");
                assert_eq!(calls[0].args["query"], "revenue");
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[test]
    fn parses_openai_tool_calls_with_string_arguments() {
        let json = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": { "name": "pdf_retriever", "arguments": "{\"query\":\"costs\"}" }
                    }]
                }
            }]
        });
        match parse_openai_reply(&json).unwrap() {
            Reply::ToolCalls(calls) => {
                assert_eq!(calls[0].id, "call_abc");
                assert_eq!(calls[0].args["query"], "costs");
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[test]
    fn missing_message_is_error() {
        assert!(parse_ollama_reply(&json!({ "error": "boom" })).is_err());
        assert!(parse_openai_reply(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn tool_call_without_name_is_rejected_by_both_formats() {
        let nameless = json!([{ "function": { "arguments": { "query": "x" } } }]);
        let ollama = json!({ "message": { "tool_calls": nameless } });
        let openai = json!({ "choices": [{ "message": { "tool_calls": nameless } }] });

        let err = parse_ollama_reply(&ollama).unwrap_err().to_string();
        assert!(err.contains("Invalid Ollama tool call"), "{err}");
        let err = parse_openai_reply(&openai).unwrap_err().to_string();
        assert!(err.contains("Invalid OpenAI tool call"), "{err}");
    }

    #[test]
    fn unparseable_string_arguments_become_query() {
        assert_eq!(normalize_arguments(&json!("plain text")), json!({ "query": "plain text" }));
        assert_eq!(normalize_arguments(&Value::Null), json!({}));
    }
}
