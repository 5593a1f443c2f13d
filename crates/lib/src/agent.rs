//! Agent invocation: one user message in, one final text (or error description) out.
//!
//! `AgentInvoker` wraps an opaque `Agent` and never fails: errors and panics
//! come back as an `AgentResponse` with `is_error` set. `OllamaAgent` is the
//! reasoning loop used by the binary: when the model returns tool_calls, we
//! execute them through the registry and re-call the model until done.

use crate::llm::{ChatMessage, LlmBackend, OllamaClient, ToolDefinition};
use crate::tools::{panic_message, ToolRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::task::AbortOnDropHandle;

const MAX_TOOL_LOOP: usize = 5;

/// Opaque reasoning procedure over a user message.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    async fn respond(&self, text: &str) -> anyhow::Result<String>;
}

/// Outcome of one agent run. When `is_error` is set, `raw_text` describes the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    pub raw_text: String,
    pub is_error: bool,
}

impl AgentResponse {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            raw_text: text.into(),
            is_error: false,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            raw_text: description.into(),
            is_error: true,
        }
    }
}

/// Runs the agent on its own task so a panic cannot unwind into the caller.
/// Dropping the `run` future aborts the task.
#[derive(Clone)]
pub struct AgentInvoker {
    agent: Arc<dyn Agent>,
}

impl AgentInvoker {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub async fn run(&self, text: &str) -> AgentResponse {
        let agent = self.agent.clone();
        let text = text.to_string();
        let task = AbortOnDropHandle::new(tokio::spawn(async move { agent.respond(&text).await }));
        match task.await {
            Ok(Ok(answer)) => AgentResponse::answer(answer),
            Ok(Err(e)) => {
                log::warn!("agent: run failed: {:#}", e);
                AgentResponse::error(format!("{:#}", e))
            }
            Err(e) if e.is_panic() => {
                let description = panic_message(&*e.into_panic());
                log::error!("agent: {}", description);
                AgentResponse::error(format!("agent {}", description))
            }
            Err(e) => AgentResponse::error(format!("agent task failed: {}", e)),
        }
    }
}

/// LLM reasoning loop with the dispatcher's tools.
pub struct OllamaAgent<B = OllamaClient> {
    backend: B,
    model: String,
    tools: Arc<ToolRegistry>,
}

impl<B: LlmBackend> OllamaAgent<B> {
    pub fn new(backend: B, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        let model = model.into();
        let model = if model.trim().is_empty() {
            log::warn!("agent: configured model was empty, using fallback");
            "llama3.2:latest".to_string()
        } else {
            model.trim().to_string()
        };
        Self {
            backend,
            model,
            tools,
        }
    }

    fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are an assistant that completes tasks with Google Workspace tools.\n\
             Today is {}.\n\nAvailable tools:\n",
            chrono::Local::now().format("%Y-%m-%d")
        );
        for def in self.tools.definitions() {
            prompt.push_str(&format!("- {}: {}\n", def.name, def.description));
        }
        prompt.push_str(
            "\nCall a tool whenever the task needs one and use its result. \
             When you are done, reply with one message that starts with \
             FINAL_ANSWER: followed by the answer for the user.",
        );
        prompt
    }
}

#[async_trait]
impl<B: LlmBackend + 'static> Agent for OllamaAgent<B> {
    async fn respond(&self, text: &str) -> anyhow::Result<String> {
        let defs: Vec<ToolDefinition> = self.tools.definitions().iter().map(Into::into).collect();
        let tools = (!defs.is_empty()).then_some(defs);
        let mut messages = vec![ChatMessage::system(self.system_prompt()), ChatMessage::user(text)];
        log::info!("agent: using model {}", self.model);

        let mut loop_count = 0;
        loop {
            let res = self
                .backend
                .chat(&self.model, messages.clone(), tools.clone())
                .await?;
            let content = res.content().to_string();
            let calls = res.tool_calls().to_vec();
            if calls.is_empty() {
                return Ok(content);
            }

            loop_count += 1;
            if loop_count > MAX_TOOL_LOOP {
                log::debug!("agent: max tool loop iterations reached");
                return Ok(content);
            }

            messages.push(ChatMessage::assistant(content, calls.clone()));
            for call in &calls {
                let name = call.function.name.as_str();
                let result = self.tools.invoke(name, call.function.arguments_value()).await;
                if !result.success {
                    log::warn!("agent: tool {} failed: {}", name, result.text);
                }
                messages.push(ChatMessage::tool(name, result.text));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, OllamaError, ToolCall, ToolCallFunction};
    use crate::tools::ToolDefinition as RegistryDefinition;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FixedAgent(Result<&'static str, &'static str>);

    #[async_trait]
    impl Agent for FixedAgent {
        async fn respond(&self, _: &str) -> anyhow::Result<String> {
            match self.0 {
                Ok(t) => Ok(t.to_string()),
                Err(e) => Err(anyhow::anyhow!(e)),
            }
        }
    }

    struct PanickingAgent;

    #[async_trait]
    impl Agent for PanickingAgent {
        async fn respond(&self, _: &str) -> anyhow::Result<String> {
            panic!("model exploded")
        }
    }

    #[tokio::test]
    async fn invoker_maps_outcomes() {
        let ok = AgentInvoker::new(Arc::new(FixedAgent(Ok("FINAL_ANSWER: done"))));
        assert_eq!(ok.run("hi").await, AgentResponse::answer("FINAL_ANSWER: done"));

        let err = AgentInvoker::new(Arc::new(FixedAgent(Err("model unreachable"))));
        assert_eq!(err.run("hi").await, AgentResponse::error("model unreachable"));

        let panicked = AgentInvoker::new(Arc::new(PanickingAgent)).run("hi").await;
        assert!(panicked.is_error);
        assert!(panicked.raw_text.contains("model exploded"), "{}", panicked.raw_text);
    }

    /// Replays canned responses and records every request's messages.
    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<ChatResponse>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedBackend {
        fn reply(self, content: &str, calls: Vec<ToolCall>) -> Self {
            self.replies.lock().unwrap().push_back(ChatResponse {
                message: Some(ChatMessage::assistant(content, calls)),
                done: true,
            });
            self
        }
    }

    #[async_trait]
    impl LlmBackend for Arc<ScriptedBackend> {
        async fn chat(
            &self,
            _: &str,
            messages: Vec<ChatMessage>,
            _: Option<Vec<ToolDefinition>>,
        ) -> Result<ChatResponse, OllamaError> {
            self.requests.lock().unwrap().push(messages);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| OllamaError::Api("no more replies".to_string()))
        }
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            typ: "function".to_string(),
            function: ToolCallFunction {
                index: None,
                name: name.to_string(),
                arguments,
            },
        }
    }

    fn echo_registry() -> Arc<ToolRegistry> {
        #[derive(serde::Deserialize)]
        struct Echo {
            text: String,
        }
        let mut registry = ToolRegistry::new();
        registry.register(
            RegistryDefinition {
                name: "echo".to_string(),
                description: "Echo text back".to_string(),
                parameters: serde_json::json!({ "type": "object" }),
            },
            |input: Echo| async move { Ok(format!("echo: {}", input.text)) },
        );
        Arc::new(registry)
    }

    #[tokio::test]
    async fn tool_results_are_fed_back() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .reply("", vec![call("echo", serde_json::json!("{\"text\":\"ping\"}"))])
                .reply("FINAL_ANSWER: ping echoed", vec![]),
        );
        let agent = OllamaAgent::new(backend.clone(), "test-model", echo_registry());
        let answer = agent.respond("echo ping").await.unwrap();
        assert_eq!(answer, "FINAL_ANSWER: ping echoed");

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0][0].content.contains("- echo: Echo text back"));
        let last = requests[1].last().unwrap();
        assert_eq!(last.role, "tool");
        assert_eq!(last.content, "echo: ping");
        assert_eq!(last.tool_name.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn tool_loop_is_bounded() {
        let mut backend = ScriptedBackend::default();
        for _ in 0..10 {
            backend = backend.reply("still working", vec![call("echo", serde_json::json!({ "text": "x" }))]);
        }
        let backend = Arc::new(backend);
        let agent = OllamaAgent::new(backend.clone(), "test-model", echo_registry());
        assert_eq!(agent.respond("loop").await.unwrap(), "still working");
        assert_eq!(backend.requests.lock().unwrap().len(), MAX_TOOL_LOOP + 1);
    }

    #[tokio::test]
    async fn backend_error_propagates() {
        let agent = OllamaAgent::new(
            Arc::new(ScriptedBackend::default()),
            "",
            Arc::new(ToolRegistry::new()),
        );
        let err = agent.respond("hi").await.unwrap_err();
        assert!(err.to_string().contains("no more replies"));
    }
}
