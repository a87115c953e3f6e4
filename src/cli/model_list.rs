//! Model listing functionality
//!
//! Lists the models installed on the Ollama server behind the `ollama` provider.

use std::error::Error;
use std::time::Duration;

use serde::Deserialize;

use crate::core::config::Config;
use crate::core::providers::ProviderRegistry;
use crate::utils::url::replace_path;

const OLLAMA_PROVIDER: &str = "ollama";
const OLLAMA_TAGS_PATH: &str = "/api/tags";
const OLLAMA_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize, Debug, Default)]
pub struct OllamaTags {
    #[serde(default)]
    pub models: Vec<OllamaModel>,
}

#[derive(Deserialize, Debug)]
pub struct OllamaModel {
    pub name: Option<String>,
}

impl OllamaTags {
    /// Named models, sorted.
    pub fn model_names(self) -> Vec<String> {
        let mut names: Vec<String> = self
            .models
            .into_iter()
            .filter_map(|model| model.name)
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        names
    }
}

/// Fetches installed models. `base_url` is the OpenAI-compatible endpoint;
/// only its origin is used.
pub async fn fetch_ollama_models(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<Vec<String>, String> {
    let url = replace_path(base_url, OLLAMA_TAGS_PATH);
    tracing::debug!(url = %url, "Fetching Ollama models");

    let response = client
        .get(&url)
        .timeout(OLLAMA_REQUEST_TIMEOUT)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| {
            tracing::warn!(url = %url, error = %err, "Ollama model listing failed");
            format!("Could not connect to Ollama. Is it running and accessible at {base_url}?")
        })?;

    let tags: OllamaTags = response
        .json()
        .await
        .map_err(|err| format!("Unexpected response from {url}: {err}"))?;
    Ok(tags.model_names())
}

pub async fn list_models(config: &Config) -> Result<(), Box<dyn Error>> {
    let provider = ProviderRegistry::from_config(config).resolve(Some(OLLAMA_PROVIDER), None);

    println!("🤖 Available Models for {}", provider.id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("🎯 Default model for this provider: {}", provider.model);
    println!();

    let models = fetch_ollama_models(&reqwest::Client::new(), &provider.base_url).await?;
    if models.is_empty() {
        println!("No models found for this provider.");
        return Ok(());
    }

    println!("Found {} models:", models.len());
    println!();
    for model in models {
        println!("  • {model}");
    }
    Ok(())
}
