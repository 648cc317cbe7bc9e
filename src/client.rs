use crate::config::Config;
use anyhow::Result;
use openrouter_api::{OpenRouterClient, Ready};
use tracing::debug;

/// Placeholder for keyless backends such as a local Ollama; the client always sends a key.
const NO_AUTH_API_KEY: &str = "sk-or-v1-0000000000000000000000000000000000000000000000000000000000000000";

pub fn initialize_client(config: &Config) -> Result<OpenRouterClient<Ready>> {
    let api_key = config
        .backend
        .api_key()?
        .unwrap_or_else(|| NO_AUTH_API_KEY.to_string());
    let base_url = config.base_url();
    debug!(%base_url, backend = ?config.backend, "initializing model client");

    let client = OpenRouterClient::new()
        .with_base_url(&base_url)?
        .with_timeout(config.request_timeout())
        .with_api_key(api_key)?;
    Ok(client)
}
