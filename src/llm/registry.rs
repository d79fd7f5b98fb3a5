use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{Config, ProviderConfig};

use super::providers::{AnthropicProvider, LmStudioProvider, OllamaProvider, OpenAiCompatible};
use super::transport::HttpTransport;
use super::Provider;

/// Provider identifiers accepted in the `LLM_PROVIDER` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Anthropic,
    Together,
    LmStudio,
    Groq,
    Mistral,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::Ollama,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Together,
        ProviderKind::LmStudio,
        ProviderKind::Groq,
        ProviderKind::Mistral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "OLLAMA",
            ProviderKind::OpenAi => "OPENAI",
            ProviderKind::Anthropic => "ANTHROPIC",
            ProviderKind::Together => "TOGETHER",
            ProviderKind::LmStudio => "LMSTUDIO",
            ProviderKind::Groq => "GROQ",
            ProviderKind::Mistral => "MISTRAL",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::OpenAi => "https://api.openai.com",
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Together => "https://api.together.xyz",
            ProviderKind::LmStudio => "http://localhost:1234",
            ProviderKind::Groq => "https://api.groq.com/openai",
            ProviderKind::Mistral => "https://api.mistral.ai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown LLM provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownProvider(name.to_string()))
    }
}

/// Every supported provider, built once from the loaded config.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config, transport: HttpTransport) -> Self {
        let mut providers: HashMap<ProviderKind, Arc<dyn Provider>> = HashMap::new();

        for kind in ProviderKind::ALL {
            let options = config.provider(kind.as_str()).cloned().unwrap_or_default();
            providers.insert(kind, build(kind, transport.clone(), options));
        }

        Self { providers }
    }

    /// Registry with a custom set of adapters.
    pub fn with_providers(providers: HashMap<ProviderKind, Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn Provider>> {
        self.providers.get(&kind).cloned()
    }

    /// Look a provider up by its header name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>, UnknownProvider> {
        let kind: ProviderKind = name.parse()?;
        self.get(kind).ok_or_else(|| UnknownProvider(name.to_string()))
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.providers.contains_key(kind))
            .collect()
    }
}

fn build(kind: ProviderKind, transport: HttpTransport, options: ProviderConfig) -> Arc<dyn Provider> {
    match kind {
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(transport, options)),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(transport, options)),
        ProviderKind::LmStudio => Arc::new(LmStudioProvider::new(transport, options)),
        ProviderKind::OpenAi | ProviderKind::Together | ProviderKind::Groq | ProviderKind::Mistral => {
            Arc::new(OpenAiCompatible::new(kind, transport, options))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("ollama".parse::<ProviderKind>(), Ok(ProviderKind::Ollama));
        assert_eq!(" LmStudio ".parse::<ProviderKind>(), Ok(ProviderKind::LmStudio));
        assert!("bedrock".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_registry_covers_every_kind() {
        let registry = ProviderRegistry::from_config(&Config::default(), HttpTransport::new().unwrap());
        assert_eq!(registry.kinds(), ProviderKind::ALL.to_vec());

        let provider = registry.resolve("anthropic").unwrap();
        assert_eq!(provider.name(), "ANTHROPIC");
        assert!(registry.resolve("nope").is_err());
    }
}
