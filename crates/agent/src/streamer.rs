//! Response streaming: turn a provider's chunk channel into one response.

use codeloop_core::error::ProviderError;
use codeloop_core::provider::{Provider, ProviderRequest};
use tracing::debug;

/// Stream `request` from `provider`, handing every fragment to
/// `on_fragment` as it arrives, and return the concatenated text.
///
/// Ends at the provider's `done` chunk or when the channel closes. An
/// error chunk aborts the stream and is returned as-is.
pub async fn stream_response<F>(
    provider: &dyn Provider,
    request: ProviderRequest,
    mut on_fragment: F,
) -> Result<String, ProviderError>
where
    F: FnMut(&str),
{
    debug!(provider = %provider.name(), model = %request.model, "Streaming response");

    let mut rx = provider.stream(request).await?;
    let mut response = String::new();
    let mut fragments = 0usize;

    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;

        if let Some(content) = chunk.content.as_deref().filter(|c| !c.is_empty()) {
            on_fragment(content);
            response.push_str(content);
            fragments += 1;
        }

        if chunk.done {
            if let Some(usage) = &chunk.usage {
                debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "Stream finished"
                );
            }
            break;
        }
    }

    debug!(fragments, chars = response.chars().count(), "Response assembled");
    Ok(response)
}
