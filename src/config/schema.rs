use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub auth_enforcement_enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default)]
    pub provider_options: HashMap<String, ProviderConfig>,
    /// Pause between streamed frames, in milliseconds.
    #[serde(default)]
    pub stream_delay_ms: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_keys: vec![uuid::Uuid::new_v4().to_string()],
            auth_enforcement_enabled: false,
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            default_provider: default_provider(),
            provider_options: HashMap::new(),
            stream_delay_ms: 0,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Options for a provider, matched case-insensitively on its name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.provider_options
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, options)| options)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Logical model name → provider-specific settings.
    #[serde(default)]
    pub model_settings: HashMap<String, ModelSettings>,
    /// Give each iteration of an `n` loop its own random seed.
    #[serde(default)]
    pub vary_seed: bool,
}

impl ProviderConfig {
    pub fn model(&self, logical: &str) -> Option<&ModelSettings> {
        self.model_settings.get(logical)
    }

    /// Native model name for a logical name, or the name itself.
    pub fn native_model(&self, logical: &str) -> String {
        self.model(logical)
            .and_then(|settings| settings.native_model_name.clone())
            .unwrap_or_else(|| logical.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default, alias = "model", skip_serializing_if = "Option::is_none")]
    pub native_model_name: Option<String>,
    #[serde(default, alias = "num_ctx", skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(default, alias = "num_gpu", skip_serializing_if = "Option::is_none")]
    pub gpu_layers: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default functions
fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    32823
}

fn default_allowed_origins() -> Vec<String> {
    vec!["localhost".to_string()]
}

fn default_provider() -> String {
    "OLLAMA".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
