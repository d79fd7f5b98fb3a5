use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use switchyard::config::{self, Config};
use switchyard::ProviderKind;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "An OpenAI-compatible gateway for heterogeneous LLM providers", long_about = None)]
struct Cli {
    /// Config file (defaults to $SWITCHYARD_CONFIG, then ./config.json)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the provider registry with resolved base URLs
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = config::resolve_path(cli.config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let loaded = config::load_or_init(&path)?;
            init_logging(&loaded.config.logging.level, &loaded.config.logging.format)?;

            if loaded.created {
                tracing::info!("Wrote default config to {}", path.display());
            }
            tracing::info!("Loaded config from {}", path.display());

            switchyard::run(loaded.config).await?;
        }
        Commands::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config file {} already exists (use --force to overwrite)",
                    path.display()
                );
            }

            let config = Config::default();
            config.save(&path)?;
            println!("Wrote default config to {}", path.display());
            if let Some(key) = config.api_keys.first() {
                println!("Gateway API key: {}", key);
            }
        }
        Commands::Providers => {
            let config = if path.exists() {
                Config::load(&path)?
            } else {
                Config::default()
            };

            for kind in ProviderKind::ALL {
                let options = config.provider(kind.as_str());
                let base_url = options
                    .and_then(|o| o.base_url.as_deref())
                    .unwrap_or(kind.default_base_url());
                let marker = if kind.as_str().eq_ignore_ascii_case(&config.default_provider) {
                    " (default)"
                } else {
                    ""
                };
                let keyed = options.and_then(|o| o.api_key.as_ref()).is_some();

                println!(
                    "{:<10} {}{}{}",
                    kind.as_str(),
                    base_url.trim_end_matches('/'),
                    if keyed { " [key]" } else { "" },
                    marker
                );
            }
        }
    }

    Ok(())
}

fn init_logging(level: &str, format: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
