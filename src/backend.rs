use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

pub struct BackendConfig {
    pub base_url: String,
    pub api_key_env_var: Option<&'static str>,
}

#[derive(clap::ValueEnum, Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Openrouter,
    Ollama,
    Openai,
}

impl Backend {
    pub fn config(&self) -> BackendConfig {
        match self {
            Backend::Openrouter => BackendConfig {
                base_url: "https://openrouter.ai/api/v1/".to_string(),
                api_key_env_var: Some("OPENROUTER_API_KEY"),
            },
            Backend::Ollama => BackendConfig {
                base_url: "http://localhost:11434/v1/".to_string(),
                api_key_env_var: None,
            },
            Backend::Openai => BackendConfig {
                base_url: "https://api.openai.com/v1/".to_string(),
                api_key_env_var: Some("OPENAI_API_KEY"),
            },
        }
    }

    /// Reads the backend's API key from its environment variable.
    ///
    /// Backends without authentication return `None`.
    pub fn api_key(&self) -> Result<Option<String>> {
        let Some(env_var) = self.config().api_key_env_var else {
            return Ok(None);
        };
        match std::env::var(env_var) {
            Ok(key) if !key.trim().is_empty() => Ok(Some(key)),
            _ => bail!("environment variable {env_var} not set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_needs_no_key() {
        assert_eq!(Backend::Ollama.api_key().unwrap(), None);
        assert!(Backend::Ollama.config().base_url.starts_with("http://localhost"));
    }

    #[test]
    fn test_backend_names_in_toml() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            backend: Backend,
        }
        let parsed: Wrapper = toml::from_str("backend = \"openai\"").unwrap();
        assert_eq!(parsed.backend, Backend::Openai);
        assert_eq!(
            toml::to_string(&Wrapper { backend: Backend::Openrouter }).unwrap().trim(),
            "backend = \"openrouter\""
        );
    }
}
