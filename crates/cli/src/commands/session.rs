//! Assemble a [`Session`] from configuration.

use std::sync::Arc;

use codeloop_agent::{CodeExtractor, FeedbackWriter, RequestSettings, Session};
use codeloop_config::AppConfig;
use codeloop_core::embedding::Embedder;
use codeloop_executor::SubprocessRunner;
use codeloop_memory::{HashEmbedder, MemoryWindow, SimilarityStore};
use codeloop_providers::{build_from_config, ProviderEmbedder};
use tracing::info;

/// Providers that run locally and need no API key.
const LOCAL_PROVIDERS: &[&str] = &["ollama", "vllm", "llamacpp", "llama.cpp"];

pub async fn build(config: &AppConfig) -> Result<Session, Box<dyn std::error::Error>> {
    if !LOCAL_PROVIDERS.contains(&config.default_provider.as_str()) && !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured for '{}'!", config.default_provider);
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    CODELOOP_API_KEY     (generic)");
        eprintln!("    OPENAI_API_KEY       (for OpenAI direct)");
        eprintln!("    OPENROUTER_API_KEY   (for OpenRouter)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        eprintln!("  Or use a local model: CODELOOP_PROVIDER=ollama");
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = build_from_config(config);
    let provider = router.default().ok_or("No default provider configured")?;

    let embedder: Arc<dyn Embedder> = match config.memory.embedding_provider.as_str() {
        "hash" => Arc::new(HashEmbedder::new(config.memory.hash_dimension)),
        name => {
            let embedding_provider = router
                .get(name)
                .ok_or_else(|| format!("Embedding provider '{name}' is not configured"))?;
            Arc::new(ProviderEmbedder::new(
                embedding_provider,
                &config.memory.embedding_model,
            ))
        }
    };

    let store = SimilarityStore::restore(
        &config.memory.store_dir,
        embedder,
        config.memory.search_k,
    )
    .await
    .map_err(|e| format!("Failed to open store at {}: {e}", config.memory.store_dir.display()))?;

    let runner = Arc::new(SubprocessRunner::from_config(
        &config.executor,
        &config.feedback.extension,
    ));

    info!(
        provider = %config.default_provider,
        stored = store.len(),
        dimension = store.dimension(),
        "Session ready"
    );

    Ok(Session::new(provider, runner, store, RequestSettings::from_config(config))
        .with_window(MemoryWindow::new(config.memory.short_term_capacity))
        .with_extractor(CodeExtractor::new(&config.executor.languages))
        .with_feedback(FeedbackWriter::from_config(&config.feedback))
        .with_store_dir(&config.memory.store_dir))
}
