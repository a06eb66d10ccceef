//! Shared test doubles for the turn loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use codeloop_core::error::{ExecutorError, ProviderError};
use codeloop_core::message::{Message, Role};
use codeloop_core::provider::*;
use codeloop_core::runnable::{ExecutionOutcome, ExecutionResult, Runnable};

/// A provider that streams the same scripted fragments on every call and
/// records each request it receives.
#[derive(Clone)]
pub struct ScriptedProvider {
    fragments: Vec<String>,
    send_done: bool,
    after_done: Option<String>,
    error: Option<String>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
}

impl ScriptedProvider {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            send_done: true,
            after_done: None,
            error: None,
            requests: Arc::default(),
        }
    }

    /// Close the channel without a `done` chunk.
    pub fn without_done(mut self) -> Self {
        self.send_done = false;
        self
    }

    /// Send one more fragment after the `done` chunk.
    pub fn with_trailing_after_done(mut self, text: &str) -> Self {
        self.after_done = Some(text.into());
        self
    }

    /// End the stream with an error instead of `done`.
    pub fn failing_with(mut self, message: &str) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn last_user_message(&self) -> Option<String> {
        let requests = self.requests.lock().unwrap();
        requests
            .last()?
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(ProviderResponse {
            content: self.fragments.concat(),
            usage: None,
            model: request.model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);

        let (tx, rx) = tokio::sync::mpsc::channel(self.fragments.len() + 3);
        for fragment in &self.fragments {
            tx.send(Ok(StreamChunk::text(fragment.clone()))).await.unwrap();
        }
        if let Some(message) = &self.error {
            tx.send(Err(ProviderError::StreamInterrupted(message.clone())))
                .await
                .unwrap();
        } else if self.send_done {
            tx.send(Ok(StreamChunk::finished(None))).await.unwrap();
        }
        if let Some(text) = &self.after_done {
            tx.send(Ok(StreamChunk::text(text.clone()))).await.unwrap();
        }
        Ok(rx)
    }
}

#[derive(Clone)]
enum RunnerMode {
    Echo(String),
    Fail(String),
    Broken,
}

/// A runner with a fixed result that records the code it was given.
#[derive(Clone)]
pub struct ScriptedRunner {
    mode: RunnerMode,
    seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRunner {
    /// Every run succeeds and prints `stdout`.
    pub fn echo(stdout: &str) -> Self {
        Self::with_mode(RunnerMode::Echo(stdout.into()))
    }

    /// Every run fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self::with_mode(RunnerMode::Fail(message.into()))
    }

    /// Every run is an infrastructure error.
    pub fn broken() -> Self {
        Self::with_mode(RunnerMode::Broken)
    }

    fn with_mode(mode: RunnerMode) -> Self {
        Self {
            mode,
            seen: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Runnable for ScriptedRunner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, code: &str) -> Result<ExecutionResult, ExecutorError> {
        self.seen.lock().unwrap().push(code.to_string());
        match &self.mode {
            RunnerMode::Echo(stdout) => Ok(ExecutionResult::success(
                code,
                stdout.clone(),
                Duration::from_millis(1),
            )),
            RunnerMode::Fail(message) => Ok(ExecutionResult::failure(
                code,
                ExecutionOutcome::Failed {
                    message: message.clone(),
                },
                String::new(),
                Duration::from_millis(1),
                "#",
            )),
            RunnerMode::Broken => Err(ExecutorError::Spawn {
                interpreter: "python3".into(),
                reason: "not found".into(),
            }),
        }
    }
}

/// A minimal request for streaming tests.
pub fn request() -> ProviderRequest {
    ProviderRequest {
        model: "test-model".into(),
        messages: vec![Message::user("Query: hi")],
        temperature: 0.7,
        max_tokens: None,
        stop: vec![],
    }
}
