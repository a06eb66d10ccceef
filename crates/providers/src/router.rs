//! Provider router: builds the configured backends and hands out the one a
//! session (or the embedder) asks for by name.

use std::collections::HashMap;
use std::sync::Arc;
use codeloop_core::provider::Provider;
use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Name of the default provider.
    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
///
/// Every `[providers.<name>]` table is registered, and the default provider
/// (and the embedding provider, when it is a remote one) is registered with
/// well-known settings even if it has no table of its own.
pub fn build_from_config(config: &codeloop_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        router.register(name.clone(), build_provider(name, &base_url, &api_key));
    }

    let implicit = [
        config.default_provider.as_str(),
        config.memory.embedding_provider.as_str(),
    ];
    for name in implicit {
        if name == "hash" || router.get(name).is_some() {
            continue;
        }
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = default_base_url(name);
        router.register(name.to_string(), build_provider(name, &base_url, &api_key));
    }

    router
}

fn build_provider(name: &str, base_url: &str, api_key: &str) -> Arc<dyn Provider> {
    if name == "ollama" {
        Arc::new(OllamaProvider::new(base_url))
    } else {
        Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
    }
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "ollama" => crate::ollama::DEFAULT_OLLAMA_URL.into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
