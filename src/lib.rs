pub mod api;
pub mod config;
pub mod core;
pub mod llm;

pub use config::Config;
pub use core::Router;
pub use llm::{Provider, ProviderKind, ProviderRegistry};

use anyhow::{Context, Result};

/// Main entry point for the gateway
pub async fn run(config: Config) -> Result<()> {
    tracing::info!("Starting switchyard gateway");

    let transport = llm::HttpTransport::new().context("Failed to build HTTP transport")?;
    let registry = ProviderRegistry::from_config(&config, transport);
    for kind in registry.kinds() {
        tracing::debug!(provider = %kind, "provider adapter registered");
    }
    tracing::info!(
        "Provider registry initialized (default: {})",
        config.default_provider
    );

    let router = Router::new(&config, registry);
    let api_adapter = api::WebApiAdapter::new(router, &config);
    api_adapter.start().await
}
