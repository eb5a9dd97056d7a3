use crate::error_handling::{display_info, display_success};
use crate::i18n::Language;
use crate::logging::{LogCategory, LogContext};
use crate::truncate::{COMMAND_OUTPUT_LIMIT, PIPE_INPUT_LIMIT};
use anyhow::{anyhow, Context, Result};
use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Overrides the configuration file location
pub const CONFIG_ENV: &str = "AIASSIST_CONFIG";

const DEFAULT_CONFIG: &str = r#"# aiassist configuration
#
# Providers are tried in the order they appear here, models in the order listed.
# A provider that answers HTTP 429 is skipped for the rest of the run.

language = "en"                 # en | zh
# default_model = "openai/gpt-4o-mini"
# http_proxy = "http://127.0.0.1:7890"

max_depth = 10                  # analysis rounds after the first batch of commands
request_timeout_secs = 120
pipe_input_limit = 409600       # characters of piped input sent to the model
command_output_limit = 32768    # characters of command output fed back per round

# Commands that are never executed. `*` matches anything, `?` one character.
blacklist = [
    # "rm -rf *",
    # "mkfs*",
    # "dd *",
]

[[providers]]
name = "openai"
base_url = "https://api.openai.com/v1"
api_key = ""
enabled = false
models = [
    { name = "gpt-4o-mini", enabled = true },
]
"#;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// One OpenAI-compatible endpoint and the models to use on it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Set to false for endpoints that reject the `system` role
    #[serde(default = "default_true")]
    pub system_prompt: bool,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl ProviderConfig {
    pub fn key(&self, model: &str) -> String {
        format!("{}/{}", self.name, model)
    }
}

/// A provider/model pair in registration order
#[derive(Debug, Clone)]
pub struct ModelEntry<'a> {
    pub key: String,
    pub provider: &'a ProviderConfig,
    pub model: &'a str,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub default_model: Option<String>,

    #[serde(default)]
    pub http_proxy: Option<String>,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_pipe_input_limit")]
    pub pipe_input_limit: usize,

    #[serde(default = "default_command_output_limit")]
    pub command_output_limit: usize,

    #[serde(default)]
    pub blacklist: Vec<String>,

    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max_depth() -> usize {
    10
}

fn default_request_timeout() -> u64 {
    120
}

fn default_pipe_input_limit() -> usize {
    PIPE_INPUT_LIMIT
}

fn default_command_output_limit() -> usize {
    COMMAND_OUTPUT_LIMIT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: default_language(),
            default_model: None,
            http_proxy: None,
            max_depth: default_max_depth(),
            request_timeout_secs: default_request_timeout(),
            pipe_input_limit: default_pipe_input_limit(),
            command_output_limit: default_command_output_limit(),
            blacklist: Vec::new(),
            providers: Vec::new(),
        }
    }
}

/// Result of loading the configuration file
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    /// The file did not exist and a default was written
    pub created: bool,
}

impl Config {
    pub fn load() -> Result<LoadedConfig> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Read and validate the file at `path`, writing the default template first if it is missing
    pub fn load_from(path: &Path) -> Result<LoadedConfig> {
        if !path.exists() {
            let config = Self::create_default_config(path)?;
            return Ok(LoadedConfig {
                config,
                path: path.to_path_buf(),
                created: true,
            });
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;

        crate::log_info!(
            LogCategory::Configuration,
            format!("Configuration loaded with {} providers", config.providers.len()),
            LogContext::new("config").with_operation("load")
        );

        Ok(LoadedConfig {
            config,
            path: path.to_path_buf(),
            created: false,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate_config()?;
        Ok(config)
    }

    fn create_default_config(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory {}", parent.display()))?;
        }
        fs::write(path, DEFAULT_CONFIG)
            .with_context(|| format!("failed to write default config {}", path.display()))?;

        crate::log_info!(
            LogCategory::Configuration,
            "Default configuration written",
            LogContext::new("config").with_operation("create_default")
        );

        Self::parse(DEFAULT_CONFIG)
    }

    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        let mut path = dirs::config_dir().ok_or_else(|| anyhow!("Could not find config directory"))?;
        path.push("aiassist");
        path.push("config.toml");
        Ok(path)
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be greater than 0"));
        }
        if self.request_timeout_secs > 600 {
            return Err(anyhow!("request_timeout_secs cannot exceed 10 minutes (600)"));
        }

        if !(1..=50).contains(&self.max_depth) {
            return Err(anyhow!("max_depth must be between 1 and 50"));
        }

        if self.pipe_input_limit <= 200 || self.command_output_limit <= 200 {
            return Err(anyhow!("pipe_input_limit and command_output_limit must exceed 200 characters"));
        }

        if let Some(proxy) = &self.http_proxy {
            if !is_http_url(proxy) {
                return Err(anyhow!("http_proxy must be a valid HTTP/HTTPS URL"));
            }
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(anyhow!("provider name cannot be empty"));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(anyhow!("duplicate provider name '{}'", provider.name));
            }
            if !is_http_url(&provider.base_url) {
                return Err(anyhow!(
                    "base_url of provider '{}' must be a valid HTTP/HTTPS URL",
                    provider.name
                ));
            }
            let mut models = HashSet::new();
            for model in &provider.models {
                if model.name.trim().is_empty() {
                    return Err(anyhow!("provider '{}' has a model with an empty name", provider.name));
                }
                if !models.insert(model.name.as_str()) {
                    return Err(anyhow!("duplicate model '{}'", provider.key(&model.name)));
                }
            }
        }

        Ok(())
    }

    pub fn language(&self) -> Language {
        Language::from_code(&self.language)
    }

    /// Every configured provider/model pair in file order.
    /// A model is enabled only when both it and its provider are.
    pub fn model_entries(&self) -> Vec<ModelEntry<'_>> {
        self.providers
            .iter()
            .flat_map(|provider| {
                provider.models.iter().map(move |model| ModelEntry {
                    key: provider.key(&model.name),
                    provider,
                    model: model.name.as_str(),
                    enabled: provider.enabled && model.enabled,
                })
            })
            .collect()
    }

    pub fn has_enabled_models(&self) -> bool {
        self.model_entries().iter().any(|entry| entry.enabled)
    }

    /// Print the configuration with API keys masked
    pub fn display(&self, path: &Path) {
        println!("{}", "Current configuration:".bold());
        println!("  File: {}", path.display().to_string().cyan());
        println!("  Language: {}", self.language().to_string().cyan());
        println!("  Max depth: {}", self.max_depth.to_string().cyan());
        println!("  Request timeout: {}s", self.request_timeout_secs.to_string().cyan());
        println!(
            "  Output limits: pipe {} chars, command {} chars",
            self.pipe_input_limit, self.command_output_limit
        );
        if let Some(proxy) = &self.http_proxy {
            println!("  HTTP proxy: {}", proxy.cyan());
        }

        if self.blacklist.is_empty() {
            println!("  Blacklist: {}", "(empty)".dimmed());
        } else {
            println!("  Blacklist:");
            for pattern in &self.blacklist {
                println!("    - {}", pattern.yellow());
            }
        }

        println!();
        println!("{}", "Providers (tried in this order):".bold());
        if self.providers.is_empty() {
            display_info("  No providers configured");
        }
        for provider in &self.providers {
            let state = if provider.enabled { "enabled".green() } else { "disabled".red() };
            println!(
                "  {} [{}] {} key={}",
                provider.name.bold(),
                state,
                provider.base_url,
                mask_key(&provider.api_key).dimmed()
            );
            for model in &provider.models {
                let key = provider.key(&model.name);
                let marker = if self.default_model.as_deref() == Some(key.as_str()) {
                    " (Default)"
                } else {
                    ""
                };
                let state = if model.enabled { "enabled".green() } else { "disabled".red() };
                println!("    - {} [{}]{}", model.name, state, marker.cyan());
            }
        }

        if self.has_enabled_models() {
            display_success("At least one model is enabled");
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Keep only enough of a key to recognise it
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.is_empty() {
        return "(none)".to_string();
    }
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
language = "zh"
default_model = "deepseek/deepseek-chat"
max_depth = 5
blacklist = ["rm -rf *"]

[[providers]]
name = "qwen"
base_url = "https://dashscope.example.com/v1"
api_key = "sk-aaaaaaaaaaaa"
models = [{ name = "qwen-max" }, { name = "qwen-plus", enabled = false }]

[[providers]]
name = "deepseek"
base_url = "https://api.deepseek.com/v1"
api_key = "sk-bbbbbbbbbbbb"
models = [{ name = "deepseek-chat", enabled = true }]
"#;

    #[test]
    fn test_default_template_parses() {
        let config = Config::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.pipe_input_limit, PIPE_INPUT_LIMIT);
        assert_eq!(config.command_output_limit, COMMAND_OUTPUT_LIMIT);
        assert!(config.blacklist.is_empty());
        assert!(!config.has_enabled_models());
    }

    #[test]
    fn test_model_entries_keep_file_order() {
        let config = Config::parse(SAMPLE).unwrap();
        let entries = config.model_entries();

        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["qwen/qwen-max", "qwen/qwen-plus", "deepseek/deepseek-chat"]);

        let enabled: Vec<bool> = entries.iter().map(|e| e.enabled).collect();
        assert_eq!(enabled, vec![true, false, true]);
        assert_eq!(config.language(), Language::Chinese);
    }

    #[test]
    fn test_disabled_provider_disables_models() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.providers[0].enabled = false;

        let enabled: Vec<String> = config
            .model_entries()
            .into_iter()
            .filter(|e| e.enabled)
            .map(|e| e.key)
            .collect();
        assert_eq!(enabled, vec!["deepseek/deepseek-chat".to_string()]);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.request_timeout_secs = 0;
        assert!(config.validate_config().is_err());

        let mut config = Config::default();
        config.max_depth = 0;
        assert!(config.validate_config().is_err());

        let mut config = Config::default();
        config.command_output_limit = 100;
        assert!(config.validate_config().is_err());

        assert!(Config::parse(&SAMPLE.replace("https://api.deepseek.com/v1", "ftp://x")).is_err());
        assert!(Config::parse(&SAMPLE.replace("name = \"deepseek\"", "name = \"qwen\"")).is_err());
    }

    #[test]
    fn test_duplicate_model_in_one_provider_is_rejected() {
        let duplicated = SAMPLE.replace("{ name = \"qwen-plus\", enabled = false }", "{ name = \"qwen-max\", enabled = false }");
        let error = Config::parse(&duplicated).unwrap_err();
        assert!(format!("{:#}", error).contains("qwen/qwen-max"));

        let shared = SAMPLE.replace("name = \"deepseek-chat\", enabled", "name = \"qwen-max\", enabled");
        assert!(Config::parse(&shared).is_ok());
    }

    #[test]
    fn test_unknown_language_falls_back_to_english() {
        let config = Config::parse("language = \"fr\"").unwrap();
        assert_eq!(config.language(), Language::English);
    }

    #[test]
    fn test_missing_file_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.created);
        assert!(path.exists());
        assert_eq!(loaded.config, Config::parse(DEFAULT_CONFIG).unwrap());

        let again = Config::load_from(&path).unwrap();
        assert!(!again.created);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_depth = \"ten\"").unwrap();

        let error = Config::load_from(&path).unwrap_err();
        assert!(error.to_string().contains("invalid config file"));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key(""), "(none)");
        assert_eq!(mask_key("short"), "****");
        assert_eq!(mask_key("sk-1234567890abcd"), "sk-1****abcd");
    }
}
