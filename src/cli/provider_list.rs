use std::error::Error;

use crate::core::config::Config;
use crate::core::providers::ProviderRegistry;

pub fn list_providers(config: &Config) -> Result<(), Box<dyn Error>> {
    let registry = ProviderRegistry::from_config(config);
    println!("{}", render_providers(&registry));
    Ok(())
}

/// Markdown table of providers; the default is starred.
pub fn render_providers(registry: &ProviderRegistry) -> String {
    let mut content = String::from("Configured Providers:\n\n");
    content.push_str("| Provider | URL | Default Model | Key |\n");
    content.push_str("|---|---|---|:---:|\n");

    for id in registry.ids() {
        let provider = registry.resolve(Some(id), None);
        let key_status = if provider.api_key.trim().is_empty() {
            "❌"
        } else {
            "✅"
        };
        let label = if id == registry.default_provider() {
            format!("{id}*")
        } else {
            id.to_string()
        };
        content.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            label, provider.base_url, provider.model, key_status
        ));
    }

    content.push_str("\n\\* = default provider");
    content
}
