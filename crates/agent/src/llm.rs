use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// One completion request. The `operation` label names the call site in logs
/// and carries the per-operation token budget chosen by that stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmRequest {
    pub operation: &'static str,
    pub prompt: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<String>;
}

/// Strips Markdown code fences. Models wrap JSON in ``` blocks often enough
/// that every parser in this crate runs its input through here first.
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").or_else(|| rest.strip_prefix("JSON")).unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parses a JSON array of strings, tolerating fences and blank entries.
pub(crate) fn parse_string_list(raw: &str) -> Option<Vec<String>> {
    serde_json::from_str::<Vec<String>>(strip_code_fences(raw)).ok().map(|entries| {
        entries
            .into_iter()
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect()
    })
}

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub prompt: String,
    pub max_tokens: u32,
}

/// Deterministic client for tests and offline drills: replies come back in
/// scripted order and every request is captured for inspection. A drained
/// script answers with an error so a miscounted test fails loudly.
#[derive(Default)]
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(self, response: impl Into<String>) -> Self {
        self.push(Ok(response.into()));
        self
    }

    pub fn fail_with(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn prompts_for(&self, operation: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.operation == operation)
            .map(|call| call.prompt)
            .collect()
    }

    fn push(&self, entry: Result<String, String>) {
        match self.script.lock() {
            Ok(mut script) => script.push_back(entry),
            Err(poisoned) => poisoned.into_inner().push_back(entry),
        }
    }

    fn pop(&self) -> Option<Result<String, String>> {
        match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }

    fn record(&self, call: RecordedCall) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: LlmRequest) -> Result<String> {
        self.record(RecordedCall {
            operation: request.operation,
            prompt: request.prompt,
            max_tokens: request.max_tokens,
        });

        match self.pop() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted responses exhausted at `{}`", request.operation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_string_list, strip_code_fences, LlmClient, LlmRequest, ScriptedLlm};

    fn request(operation: &'static str) -> LlmRequest {
        LlmRequest { operation, prompt: "prompt".to_string(), max_tokens: 100 }
    }

    #[test]
    fn bare_json_passes_through_fence_stripping() {
        assert_eq!(strip_code_fences(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        assert_eq!(strip_code_fences("```json\n[\"q\"]\n```"), "[\"q\"]");
        assert_eq!(strip_code_fences("```\n[\"q\"]\n```"), "[\"q\"]");
    }

    #[test]
    fn string_list_parsing_drops_blank_entries() {
        let parsed = parse_string_list("```json\n[\"one\", \"  \", \"two\"]\n```");
        assert_eq!(parsed, Some(vec!["one".to_string(), "two".to_string()]));
        assert_eq!(parse_string_list("not json"), None);
    }

    #[tokio::test]
    async fn scripted_replies_come_back_in_order() {
        let llm = ScriptedLlm::new().respond_with("first").respond_with("second");

        assert_eq!(llm.complete(request("a")).await.expect("first"), "first");
        assert_eq!(llm.complete(request("b")).await.expect("second"), "second");

        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].operation, "a");
    }

    #[tokio::test]
    async fn drained_script_answers_with_an_error() {
        let llm = ScriptedLlm::new();
        let error = llm.complete(request("plan")).await.expect_err("script is empty");
        assert!(error.to_string().contains("plan"));
    }

    #[tokio::test]
    async fn scripted_failures_surface_as_errors() {
        let llm = ScriptedLlm::new().fail_with("rate limited");
        let error = llm.complete(request("x")).await.expect_err("scripted failure");
        assert!(error.to_string().contains("rate limited"));
    }
}
