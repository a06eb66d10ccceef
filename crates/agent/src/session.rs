//! The session: everything one conversation needs, and the turn loop.
//!
//! A turn is retrieve → compose → stream → extract → execute → remember:
//!
//! 1. Search the similarity store with the query
//! 2. Compose the payload from the hits, the short-term window and the query
//! 3. Stream the model's answer, forwarding each fragment
//! 4. Extract tagged code blocks; with none, report and stop
//! 5. Run each block in turn, then cache and index its final code
//! 6. Remember the query and save the store

use std::path::{Path, PathBuf};
use std::sync::Arc;

use codeloop_core::error::Error;
use codeloop_core::provider::Provider;
use codeloop_core::runnable::{ExecutionResult, Runnable};
use codeloop_memory::{MemoryWindow, SimilarityStore};
use tracing::{debug, info, warn};

use crate::events::TurnEvent;
use crate::extract::CodeExtractor;
use crate::feedback::{FeedbackWriter, DEFAULT_CHUNK_SIZE};
use crate::prompt::{compose, RequestSettings};
use crate::streamer::stream_response;

/// Reported when a response contains no runnable code.
pub const NO_CODE_NOTICE: &str = "no code to execute";

/// One executed block and what it left behind.
#[derive(Debug, Clone)]
pub struct BlockReport {
    pub result: ExecutionResult,
    pub cache_file: PathBuf,
    pub chunk_ids: Vec<String>,
}

/// How a turn ended.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The response had no tagged code; nothing was run or stored.
    NoCode { notice: String },
    /// Every block ran, in order.
    Executed { blocks: Vec<BlockReport> },
}

impl TurnOutcome {
    /// The output of the last block, or the notice.
    pub fn output(&self) -> &str {
        match self {
            Self::NoCode { notice } => notice.as_str(),
            Self::Executed { blocks } => blocks
                .last()
                .map(|b| b.result.output.as_str())
                .unwrap_or_default(),
        }
    }

    pub fn blocks(&self) -> &[BlockReport] {
        match self {
            Self::NoCode { .. } => &[],
            Self::Executed { blocks } => blocks,
        }
    }
}

/// Context for a conversation: provider, runner, memory and output paths.
pub struct Session {
    provider: Arc<dyn Provider>,
    runner: Arc<dyn Runnable>,
    store: SimilarityStore,
    window: MemoryWindow,
    extractor: CodeExtractor,
    feedback: FeedbackWriter,
    settings: RequestSettings,
    store_dir: PathBuf,
}

impl Session {
    /// Create a session with default window, extractor, cache and store
    /// locations (`cache/` and `vectorstore/` in the working directory).
    pub fn new(
        provider: Arc<dyn Provider>,
        runner: Arc<dyn Runnable>,
        store: SimilarityStore,
        settings: RequestSettings,
    ) -> Self {
        Self {
            provider,
            runner,
            store,
            window: MemoryWindow::default(),
            extractor: CodeExtractor::default(),
            feedback: FeedbackWriter::new("cache", "py", DEFAULT_CHUNK_SIZE),
            settings,
            store_dir: PathBuf::from("vectorstore"),
        }
    }

    pub fn with_window(mut self, window: MemoryWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_extractor(mut self, extractor: CodeExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_feedback(mut self, feedback: FeedbackWriter) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = dir.into();
        self
    }

    pub fn store(&self) -> &SimilarityStore {
        &self.store
    }

    pub fn window(&self) -> &MemoryWindow {
        &self.window
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn runner(&self) -> &Arc<dyn Runnable> {
        &self.runner
    }

    /// The model and sampling settings every turn is sent with.
    pub fn settings(&self) -> &RequestSettings {
        &self.settings
    }

    /// Run one turn for `query`, reporting progress to `observer`.
    ///
    /// Code failures and timeouts are part of a normal outcome. Retrieval,
    /// model, executor-infrastructure and persistence failures abort the
    /// turn and are returned.
    pub async fn run_turn<F>(&mut self, query: &str, mut observer: F) -> Result<TurnOutcome, Error>
    where
        F: FnMut(TurnEvent),
    {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query must not be empty".into()));
        }

        info!(query_chars = query.chars().count(), stored = self.store.len(), "Starting turn");

        // ── Retrieval ──
        let hits = self.store.search(query).await?;
        observer(TurnEvent::Retrieved { count: hits.len() });
        let context: Vec<String> = hits.into_iter().map(|c| c.content).collect();

        // ── Generation ──
        let payload = compose(&context, query, &self.window.render())?;
        let request = self.settings.build_request(&payload);
        let response = stream_response(self.provider.as_ref(), request, |fragment| {
            observer(TurnEvent::Chunk {
                content: fragment.to_string(),
            })
        })
        .await?;

        // ── Extraction ──
        let extraction = self.extractor.extract(&response);
        if !extraction.has_code() {
            debug!("Response contained no tagged code block");
            observer(TurnEvent::NoCode {
                notice: NO_CODE_NOTICE.into(),
            });
            return Ok(TurnOutcome::NoCode {
                notice: NO_CODE_NOTICE.into(),
            });
        }

        // ── Execution + feedback ──
        let total = extraction.code_blocks.len();
        let mut blocks = Vec::with_capacity(total);
        for (index, code) in extraction.code_blocks.iter().enumerate() {
            observer(TurnEvent::ExecutionStarted { index, total });

            let result = self.runner.run(code).await?;
            if !result.is_success() {
                warn!(index, error = %result.output, "Generated code failed");
            }
            observer(TurnEvent::ExecutionFinished {
                index,
                output: result.output.clone(),
                success: result.is_success(),
            });

            let receipt = self
                .feedback
                .write(&result, &extraction.description, &mut self.store)
                .await?;

            blocks.push(BlockReport {
                result,
                cache_file: receipt.cache_file,
                chunk_ids: receipt.chunk_ids,
            });
        }

        // ── Remember ──
        self.window.append(query);
        self.feedback.commit(&self.store, &self.store_dir)?;
        observer(TurnEvent::Persisted {
            entries: self.store.len(),
        });

        info!(blocks = blocks.len(), stored = self.store.len(), "Turn complete");
        Ok(TurnOutcome::Executed { blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, ScriptedRunner};
    use codeloop_core::error::{ExecutorError, MemoryError, ProviderError};
    use codeloop_memory::HashEmbedder;

    struct Fixture {
        _dir: tempfile::TempDir,
        cache_dir: PathBuf,
        store_dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                cache_dir: dir.path().join("cache"),
                store_dir: dir.path().join("vectorstore"),
                _dir: dir,
            }
        }

        async fn session(&self, provider: ScriptedProvider, runner: ScriptedRunner) -> Session {
            let store = SimilarityStore::new(Arc::new(HashEmbedder::new(64)), 4)
                .await
                .unwrap();
            Session::new(
                Arc::new(provider),
                Arc::new(runner),
                store,
                RequestSettings::new("test-model"),
            )
            .with_feedback(FeedbackWriter::new(&self.cache_dir, "py", DEFAULT_CHUNK_SIZE))
            .with_store_dir(&self.store_dir)
        }

        fn cache_files(&self) -> usize {
            std::fs::read_dir(&self.cache_dir)
                .map(|entries| entries.count())
                .unwrap_or(0)
        }
    }

    #[tokio::test]
    async fn executes_caches_and_remembers() {
        let fixture = Fixture::new();
        let provider = ScriptedProvider::fragments(&[
            "Prints 1 to 5.\n",
            "```python\nfor i in range(1, 6):\n",
            "    print(i)\n```",
        ]);
        let mut session = fixture.session(provider, ScriptedRunner::echo("1\n2\n3\n4\n5\n")).await;

        let mut events = Vec::new();
        let outcome = session
            .run_turn("print the numbers from 1 to 5", |e| events.push(e))
            .await
            .unwrap();

        assert_eq!(outcome.output(), "1\n2\n3\n4\n5\n");
        assert_eq!(outcome.blocks().len(), 1);
        assert_eq!(fixture.cache_files(), 1);
        assert!(!session.store().is_empty());
        assert_eq!(
            session.window().iter().collect::<Vec<_>>(),
            vec!["print the numbers from 1 to 5"]
        );
        assert!(fixture.store_dir.join(codeloop_memory::store::CURRENT_FILE).exists());

        let chunk = session.store().get(&outcome.blocks()[0].chunk_ids[0]).unwrap();
        assert_eq!(chunk.metadata.description, "Prints 1 to 5.");

        assert_eq!(events[0], TurnEvent::Retrieved { count: 0 });
        assert!(matches!(events.last(), Some(TurnEvent::Persisted { .. })));
        let streamed: String = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Chunk { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert!(streamed.starts_with("Prints 1 to 5.\n```python"));
    }

    #[tokio::test]
    async fn no_code_changes_nothing() {
        let fixture = Fixture::new();
        let provider = ScriptedProvider::fragments(&["I am not able to help with that."]);
        let runner = ScriptedRunner::echo("unused");
        let mut session = fixture.session(provider, runner.clone()).await;

        let mut events = Vec::new();
        let outcome = session.run_turn("hello", |e| events.push(e)).await.unwrap();

        assert!(matches!(outcome, TurnOutcome::NoCode { ref notice } if notice == NO_CODE_NOTICE));
        assert_eq!(runner.calls(), 0);
        assert_eq!(fixture.cache_files(), 0);
        assert!(session.store().is_empty());
        assert!(session.window().is_empty());
        assert!(!fixture.store_dir.exists());
        assert!(events.contains(&TurnEvent::NoCode {
            notice: NO_CODE_NOTICE.into()
        }));
    }

    #[tokio::test]
    async fn failed_code_is_still_remembered() {
        let fixture = Fixture::new();
        let provider = ScriptedProvider::fragments(&["```python\nprint(1 / 0)\n```"]);
        let runner = ScriptedRunner::failing("ZeroDivisionError: division by zero");
        let mut session = fixture.session(provider, runner).await;

        let outcome = session.run_turn("divide by zero", |_| {}).await.unwrap();

        let block = &outcome.blocks()[0];
        assert_eq!(block.result.output, "ZeroDivisionError: division by zero");
        let cached = std::fs::read_to_string(&block.cache_file).unwrap();
        assert_eq!(
            cached,
            "print(1 / 0)\n\n\n# Error: ZeroDivisionError: division by zero"
        );
        assert!(!session.store().is_empty());
    }

    #[tokio::test]
    async fn blocks_run_in_order() {
        let fixture = Fixture::new();
        let provider = ScriptedProvider::fragments(&["```python\na\n```\n```python\nb\n```"]);
        let runner = ScriptedRunner::echo("ok");
        let mut session = fixture.session(provider, runner.clone()).await;

        let mut started = Vec::new();
        let outcome = session
            .run_turn("two blocks", |e| {
                if let TurnEvent::ExecutionStarted { index, total } = e {
                    started.push((index, total));
                }
            })
            .await
            .unwrap();

        assert_eq!(started, vec![(0, 2), (1, 2)]);
        assert_eq!(runner.seen(), vec!["a\n".to_string(), "b\n".to_string()]);
        assert_eq!(outcome.blocks().len(), 2);
        assert_eq!(fixture.cache_files(), 2);
    }

    #[tokio::test]
    async fn second_turn_sees_first_turn() {
        let fixture = Fixture::new();
        let provider = ScriptedProvider::fragments(&["```python\nprint('hi')\n```"]);
        let recorder = provider.clone();
        let mut session = fixture.session(provider, ScriptedRunner::echo("hi\n")).await;

        session.run_turn("say hi", |_| {}).await.unwrap();
        let mut retrieved = 0;
        session
            .run_turn("say hi again", |e| {
                if let TurnEvent::Retrieved { count } = e {
                    retrieved = count;
                }
            })
            .await
            .unwrap();

        assert_eq!(retrieved, 1);
        let payload = recorder.last_user_message().unwrap();
        assert!(payload.starts_with("Query: Context: print('hi')"));
        assert!(payload.contains("Short-Term Memory: say hi\n"));
        assert!(payload.ends_with("Question: say hi again"));
        assert_eq!(session.window().len(), 2);
    }

    #[tokio::test]
    async fn stream_failure_aborts_without_side_effects() {
        let fixture = Fixture::new();
        let provider = ScriptedProvider::fragments(&["```python\nprint(1)"]).failing_with("reset");
        let mut session = fixture.session(provider, ScriptedRunner::echo("1")).await;

        let err = session.run_turn("print one", |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::StreamInterrupted(_))));
        assert_eq!(fixture.cache_files(), 0);
        assert!(session.window().is_empty());
    }

    #[tokio::test]
    async fn runner_infrastructure_failure_aborts() {
        let fixture = Fixture::new();
        let provider = ScriptedProvider::fragments(&["```python\nprint(1)\n```"]);
        let mut session = fixture.session(provider, ScriptedRunner::broken()).await;

        let err = session.run_turn("print one", |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::Executor(ExecutorError::Spawn { .. })));
        assert_eq!(fixture.cache_files(), 0);
    }

    #[tokio::test]
    async fn persist_failure_is_surfaced() {
        let fixture = Fixture::new();
        std::fs::create_dir_all(fixture.store_dir.parent().unwrap()).unwrap();
        std::fs::write(&fixture.store_dir, "not a directory").unwrap();

        let provider = ScriptedProvider::fragments(&["```python\nprint(1)\n```"]);
        let mut session = fixture.session(provider, ScriptedRunner::echo("1\n")).await;

        let err = session.run_turn("print one", |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::Memory(MemoryError::Storage(_))));
        assert_eq!(fixture.cache_files(), 1);
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let fixture = Fixture::new();
        let provider = ScriptedProvider::fragments(&["unused"]);
        let mut session = fixture.session(provider, ScriptedRunner::echo("")).await;
        assert!(matches!(
            session.run_turn("   ", |_| {}).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
