//! Deterministic stand-ins for network collaborators.
//!
//! Used by the unit tests in this crate and by the integration suite; also
//! handy for embedding the orchestrator in demos without an API key.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::{Capability, CapabilityHandler, CapabilityOutput, CapabilityRequest};
use crate::completion::CompletionService;
use crate::error::ChatError;

/// One scripted completion outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Timeout,
    HttpError(u16),
}

/// Completion service that answers from a queue.
///
/// Each call pops the next scripted outcome; when the queue is empty the
/// fallback (if any) is returned, otherwise a timeout error. Prompts are
/// recorded for assertions.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call with the same text.
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Queue replies in order.
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = replies
            .into_iter()
            .map(|r| Scripted::Reply(r.into()))
            .collect();
        Self {
            script: Mutex::new(script),
            ..Self::default()
        }
    }

    pub fn push(&self, outcome: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn next(&self, prompt: &str) -> Result<String, ChatError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let outcome = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match outcome {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Timeout) => Err(ChatError::UpstreamTimeout("scripted".to_string())),
            Some(Scripted::HttpError(code)) => Err(ChatError::UpstreamHttp {
                status: Some(code),
                message: format!("scripted HTTP {}", code),
            }),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| ChatError::UpstreamTimeout("script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        self.next(prompt)
    }

    async fn complete_json(&self, prompt: &str) -> Result<String, ChatError> {
        self.next(prompt)
    }
}

/// Capability handler returning a fixed output.
#[derive(Debug)]
pub struct StaticCapability {
    capability: Capability,
    output: Result<CapabilityOutput, u16>,
    delay: Option<Duration>,
    requests: Mutex<Vec<CapabilityRequest>>,
}

impl StaticCapability {
    pub fn structured(capability: Capability, value: Value) -> Self {
        Self::with_output(capability, Ok(CapabilityOutput::Structured(value)))
    }

    pub fn text(capability: Capability, text: impl Into<String>) -> Self {
        Self::with_output(capability, Ok(CapabilityOutput::Text(text.into())))
    }

    /// A handler that always fails with the given HTTP status.
    pub fn failing(capability: Capability, status: u16) -> Self {
        Self::with_output(capability, Err(status))
    }

    fn with_output(capability: Capability, output: Result<CapabilityOutput, u16>) -> Self {
        Self {
            capability,
            output,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<CapabilityRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CapabilityHandler for StaticCapability {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn invoke(&self, request: &CapabilityRequest) -> Result<CapabilityOutput, ChatError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.output {
            Ok(output) => Ok(output.clone()),
            Err(status) => Err(ChatError::UpstreamHttp {
                status: Some(*status),
                message: format!("{} failed", self.capability),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_completion_order_and_fallback() {
        let completion = ScriptedCompletion::replies(["a", "b"]);
        assert_eq!(completion.complete("p1").await.unwrap(), "a");
        assert_eq!(completion.complete_json("p2").await.unwrap(), "b");
        assert!(completion.complete("p3").await.is_err());
        assert_eq!(completion.prompts(), vec!["p1", "p2", "p3"]);

        let always = ScriptedCompletion::always("x");
        assert_eq!(always.complete("q").await.unwrap(), "x");
        assert_eq!(always.complete("q").await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_scripted_errors() {
        let completion = ScriptedCompletion::new();
        completion.push(Scripted::HttpError(503));
        completion.push(Scripted::Timeout);
        assert!(matches!(
            completion.complete("a").await,
            Err(ChatError::UpstreamHttp { status: Some(503), .. })
        ));
        assert!(matches!(
            completion.complete("b").await,
            Err(ChatError::UpstreamTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_static_capability_records_requests() {
        let handler = StaticCapability::structured(Capability::Tips, json!(["팁"]));
        let req = CapabilityRequest::new(Capability::Tips).with_arg("dish", "잡채");
        let out = handler.invoke(&req).await.unwrap();
        assert_eq!(out, CapabilityOutput::Structured(json!(["팁"])));
        assert_eq!(handler.requests(), vec![req]);
    }

    #[tokio::test]
    async fn test_static_capability_failure() {
        let handler = StaticCapability::failing(Capability::ProductSearch, 500);
        let req = CapabilityRequest::new(Capability::ProductSearch);
        assert!(handler.invoke(&req).await.unwrap_err().is_retryable());
    }
}
