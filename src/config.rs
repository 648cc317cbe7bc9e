use crate::backend::Backend;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub model: String,
    pub backend: Backend,
    /// Overrides the backend's default endpoint.
    pub base_url: Option<String>,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
    pub max_turns: usize,
    /// Passed to the model in every request. The OpenRouter-compatible backend cannot
    /// send it yet and the provider's default applies.
    pub temperature: f32,
    /// Same caveat as `temperature`.
    pub max_tokens: u32,
    pub shell_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub auto_approve: bool,
    pub print_messages: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "google/gemini-2.5-flash".to_string(),
            backend: Backend::default(),
            base_url: None,
            system_prompt: None,
            max_turns: 50,
            temperature: 0.0,
            max_tokens: 4096,
            shell_timeout_seconds: 30,
            request_timeout_seconds: 120,
            auto_approve: true,
            print_messages: false,
        }
    }
}

impl Config {
    pub fn base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| self.backend.config().base_url)
    }

    pub fn shell_timeout(&self) -> Duration {
        Duration::from_secs(self.shell_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_turns == 0 {
            bail!("max_turns must be at least 1");
        }
        if self.shell_timeout_seconds == 0 {
            bail!("shell_timeout_seconds must be at least 1");
        }
        if self.model.trim().is_empty() {
            bail!("no model configured");
        }
        Ok(())
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(model) = &overrides.model {
            self.model = model.clone();
        }
        if let Some(backend) = &overrides.backend {
            self.backend = backend.clone();
        }
        if let Some(temperature) = overrides.temperature {
            self.temperature = temperature;
        }
        if let Some(max_turns) = overrides.max_turns {
            self.max_turns = max_turns;
        }
        if overrides.no_auto_approve {
            self.auto_approve = false;
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Model identifier, e.g. openai/gpt-4o
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum number of model calls per request
    #[arg(long)]
    pub max_turns: Option<usize>,

    /// Ask before every tool call
    #[arg(long)]
    pub no_auto_approve: bool,
}

/// Loads the user config, applies command-line overrides and validates the result.
pub fn load(overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = load_or_create()?;
    config.apply(overrides);
    config.validate()?;
    Ok(config)
}

pub fn load_or_create() -> Result<Config> {
    let xdg_dirs = xdg::BaseDirectories::new();
    let config_path = xdg_dirs.place_config_file("taskloop/config.toml")?;
    load_from(&config_path)
}

/// Reads `path`, writing the defaults there if it does not exist yet.
///
/// Missing fields take their default values, and the completed file is written back
/// so users can see every available option.
pub fn load_from(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        let default_config = Config::default();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(config_path, toml::to_string_pretty(&default_config)?)?;
        eprintln!("Created default config at: {}", config_path.display());
        return Ok(default_config);
    }

    let config_string = fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&config_string)?;

    let final_toml_string = toml::to_string_pretty(&config)?;
    if final_toml_string != config_string {
        fs::write(config_path, final_toml_string)?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::Builder;

    #[test]
    fn test_creates_default_config() {
        let tmp_dir = Builder::new().prefix("config-test-").tempdir().unwrap();
        let path = tmp_dir.path().join("taskloop/config.toml");

        let config = load_from(&path).unwrap();

        assert_eq!(config, Config::default());
        assert!(path.exists());
        assert_eq!(load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_missing_fields_are_filled_and_written_back() {
        let tmp_dir = Builder::new().prefix("config-test-").tempdir().unwrap();
        let path = tmp_dir.path().join("config.toml");
        fs::write(&path, "model = \"local/llama\"\nbackend = \"ollama\"\n").unwrap();

        let config = load_from(&path).unwrap();

        assert_eq!(config.model, "local/llama");
        assert_eq!(config.backend, Backend::Ollama);
        assert_eq!(config.max_turns, 50);
        assert_eq!(config.temperature, 0.0);
        assert!(config.auto_approve);
        assert!(fs::read_to_string(&path).unwrap().contains("max_turns = 50"));
    }

    #[test]
    fn test_overrides_and_validation() {
        let mut config = Config::default();
        config.apply(&ConfigOverrides {
            model: Some("openai/gpt-4o".to_string()),
            backend: Some(Backend::Openai),
            temperature: Some(0.7),
            max_turns: Some(0),
            no_auto_approve: true,
        });

        assert_eq!(config.model, "openai/gpt-4o");
        assert_eq!(config.base_url(), "https://api.openai.com/v1/");
        assert!(!config.auto_approve);
        assert!(config.validate().is_err());

        config.max_turns = 3;
        assert!(config.validate().is_ok());
        config.shell_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_override() {
        let config = Config {
            base_url: Some("http://localhost:8080/v1/".to_string()),
            ..Config::default()
        };
        assert_eq!(config.base_url(), "http://localhost:8080/v1/");
    }
}
