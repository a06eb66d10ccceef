//! `codeloop status` — Show configuration and stored state.

use std::path::Path;
use std::time::Duration;

use codeloop_agent::RequestSettings;
use codeloop_config::AppConfig;
use codeloop_core::provider::Provider;
use codeloop_memory::store::{current_snapshot, MAPPING_FILE};
use codeloop_providers::build_from_config;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Entries in a saved store, read from its id mapping without embedding.
fn stored_entries(store_dir: &Path) -> Option<usize> {
    let snapshot = current_snapshot(store_dir).ok()??;
    let content = std::fs::read_to_string(snapshot.join(MAPPING_FILE)).ok()?;
    let mapping: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content).ok()?;
    Some(mapping.len())
}

/// Whether `provider` answers, and whether it serves `model`.
async fn provider_health(provider: &dyn Provider, model: &str) -> String {
    match tokio::time::timeout(CHECK_TIMEOUT, provider.health_check()).await {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => return "responded with an error".into(),
        Ok(Err(e)) => return format!("unreachable ({e})"),
        Err(_) => return format!("no answer within {}s", CHECK_TIMEOUT.as_secs()),
    }

    match tokio::time::timeout(CHECK_TIMEOUT, provider.list_models()).await {
        Ok(Ok(models)) if models.is_empty() => "reachable".into(),
        Ok(Ok(models)) if models.iter().any(|m| serves(m, model)) => {
            format!("reachable, {model} available")
        }
        Ok(Ok(_)) => format!("reachable, {model} not found"),
        Ok(Err(e)) => format!("reachable, model list failed ({e})"),
        Err(_) => "reachable, model list timed out".into(),
    }
}

/// Ollama lists untagged models with an explicit `:latest`.
fn serves(listed: &str, model: &str) -> bool {
    listed == model || listed.strip_suffix(":latest") == Some(model)
}

fn cached_files(cache_dir: &Path, extension: &str) -> usize {
    std::fs::read_dir(cache_dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == std::ffi::OsStr::new(extension)))
                .count()
        })
        .unwrap_or(0)
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("codeloop status");
    println!("===============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Provider:     {}", config.default_provider);
    println!("  Model:        {}", RequestSettings::from_config(&config).model);
    println!("  Temperature:  {}", config.default_temperature);
    println!(
        "  Embeddings:   {} ({})",
        config.memory.embedding_provider, config.memory.embedding_model
    );
    println!(
        "  Interpreter:  {} (timeout {}s)",
        config.executor.interpreter, config.executor.timeout_secs
    );

    match stored_entries(&config.memory.store_dir) {
        Some(n) => println!("  Store:        {} ({n} chunks)", config.memory.store_dir.display()),
        None => println!("  Store:        {} (empty)", config.memory.store_dir.display()),
    }
    println!(
        "  Cache:        {} ({} files)",
        config.feedback.cache_dir.display(),
        cached_files(&config.feedback.cache_dir, &config.feedback.extension)
    );

    let router = build_from_config(&config);
    let model = RequestSettings::from_config(&config).model;
    let checks = [
        ("Model", config.default_provider.as_str(), model.as_str()),
        (
            "Embeddings",
            config.memory.embedding_provider.as_str(),
            config.memory.embedding_model.as_str(),
        ),
    ];

    println!();
    for (label, name, model) in checks {
        let health = match (name, router.get(name)) {
            ("hash", _) => "offline hashing, nothing to reach".to_string(),
            (_, Some(provider)) => provider_health(provider.as_ref(), model).await,
            (_, None) => "not configured".to_string(),
        };
        println!("  {:<13} {name}: {health}", format!("{label} API:"));
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file — run `codeloop init` first");
    }

    Ok(())
}
