use super::Config;
use crate::llm::ProviderKind;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SWITCHYARD_CONFIG";

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Config path: explicit flag, then `SWITCHYARD_CONFIG`, then `config.json`.
pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Outcome of [`load_or_init`]; `created` is set when defaults were written.
#[derive(Debug)]
pub struct Loaded {
    pub config: Config,
    pub created: bool,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = if is_yaml(path) {
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    };

    let config = substitute_env_vars(config);

    validate_config(&config)?;

    Ok(config)
}

/// Load the config, writing a default file first when none exists.
pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<Loaded> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(Loaded {
            config: load_config(path)?,
            created: false,
        });
    }

    let config = Config::default();
    save_config(&config, path)?;
    Ok(Loaded {
        config,
        created: true,
    })
}

pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let contents = if is_yaml(path) {
        serde_yaml::to_string(config).context("Failed to serialize config")?
    } else {
        serde_json::to_string_pretty(config).context("Failed to serialize config")?
    };

    fs::write(path, contents)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Replace `${VAR}` provider keys with the environment value.
fn substitute_env_vars(mut config: Config) -> Config {
    for options in config.provider_options.values_mut() {
        let var_name = options
            .api_key
            .as_deref()
            .and_then(|key| key.strip_prefix("${"))
            .and_then(|key| key.strip_suffix('}'))
            .map(str::to_string);
        if let Some(var_name) = var_name {
            options.api_key = std::env::var(&var_name).ok();
        }
    }
    config
}

fn validate_config(config: &Config) -> Result<()> {
    if config.default_provider.parse::<ProviderKind>().is_err() {
        anyhow::bail!("Unknown default provider: {}", config.default_provider);
    }

    if config.auth_enforcement_enabled && config.api_keys.is_empty() {
        anyhow::bail!("Auth enforcement is enabled but no api_keys are configured");
    }

    if config.port == 0 {
        anyhow::bail!("Port must be non-zero");
    }

    for name in config.provider_options.keys() {
        if name.parse::<ProviderKind>().is_err() {
            tracing::warn!(provider = %name, "ignoring options for unknown provider");
        }
    }

    Ok(())
}
