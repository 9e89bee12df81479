//! Emu Agent - AI-powered Game Boy control bridge
//!
//! This is the main entry point for the emu-agent binary.

use emu_agent::{
    BridgeConfig, BridgeListener, ControlLoop, DecisionAdapter, MemoryStore, ProviderClient,
};
use std::env;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "emu_agent=info".into()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    // Config file path: --config <path>, a positional path, or the default
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with("--")).cloned())
        .unwrap_or_else(|| "config.json".to_string());

    let mut config = if std::path::Path::new(&config_path).exists() {
        BridgeConfig::load(&config_path)?
    } else {
        tracing::warn!(path = %config_path, "config file not found, using defaults");
        BridgeConfig::default()
    };

    // Environment overrides for quick experiments
    if let Some(port) = env::var("BRIDGE_PORT").ok().and_then(|s| s.parse().ok()) {
        config = config.with_port(port);
    }
    if let Ok(path) = env::var("NOTEPAD_PATH") {
        config = config.with_notepad_path(path);
    }
    if let Some(secs) = env::var("DECISION_COOLDOWN")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        config = config.with_cooldown_secs(secs);
    }

    let provider_config = config.active_provider()?.clone();

    println!("🎮 Emu Agent - AI-powered Game Boy Control");
    println!("================================================");
    println!("Listen: {}:{}", config.host, config.port);
    println!(
        "Provider: {} ({})",
        config.llm_provider, provider_config.model_name
    );
    println!("Notepad: {}", config.notepad_path);
    println!("Cooldown: {:.1}s between decisions", config.decision_cooldown_secs);
    println!(
        "Retry: max {} attempts, {}s base backoff",
        provider_config.max_retries, provider_config.retry_backoff_secs
    );
    println!("================================================\n");

    let listener = BridgeListener::bind(&config.host, config.port).await?;
    let client = ProviderClient::new(config.llm_provider, provider_config.clone())?;
    let engine = DecisionAdapter::from_config(client, &provider_config);
    let memory = MemoryStore::open(&config.notepad_path, config.short_term_capacity);

    // Ctrl-C flips the shutdown flag; the loop drains at the next
    // suspension point and flushes the notepad on the way out.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nShutting down...");
            let _ = stop_tx.send(true);
        }
    });

    let control = ControlLoop::new(
        listener,
        engine,
        memory,
        Duration::from_secs_f64(config.decision_cooldown_secs),
        config.max_reconnects,
    );
    control.run(stop_rx).await?;

    println!("Goodbye! 👋");
    Ok(())
}
