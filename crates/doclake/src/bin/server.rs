//! doclake server binary
//!
//! Run with: cargo run -p doclake --bin doclake-server
//! Set DOCLAKE_CONFIG to a TOML file to override the defaults.

use doclake::{config::AppConfig, server::DoclakeServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doclake=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match std::env::var("DOCLAKE_CONFIG") {
        Ok(path) => {
            tracing::info!("Loading configuration from {}", path);
            AppConfig::load(&path)?
        }
        Err(_) => AppConfig::default(),
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Object store: {:?}", config.object_store.backend);
    tracing::info!("  - Database: {}", config.storage.database_path.display());
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!("  - Encodings: {}", config.encoding.candidates.join(", "));
    tracing::info!("  - Query timezone: {}", config.query.timezone);

    // Check Ollama
    tracing::info!("Checking Ollama at {}...", config.llm.base_url);
    let client = reqwest::Client::new();
    match client.get(format!("{}/api/tags", config.llm.base_url)).send().await {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!("Ollama is running");
        }
        _ => {
            tracing::warn!("Ollama not available at {}", config.llm.base_url);
            tracing::warn!("  Start it with `ollama serve` and pull {}", config.llm.generate_model);
        }
    }

    let server = DoclakeServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
