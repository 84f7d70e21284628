use anyhow::Context;
use clap::Parser;
use parley_config::{expand_tilde, Config, ConfigManager, ProviderKind};
use parley_llm::LLMProvider;
use parley_server::app::{echo_provider, ollama_provider};
use parley_server::{gate, init_logging, App, OllamaEnvironment};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug, Clone)]
#[command(name = "parley-server")]
#[command(about = "WebSocket gateway between prompt clients and a local model")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(long, env = "PARLEY_CONFIG", default_value = "~/.parley/config.json")]
    config: String,

    /// Bind host (overrides config)
    #[arg(long, env = "PARLEY_HOST")]
    host: Option<String>,

    /// Bind port (overrides config)
    #[arg(long, env = "PARLEY_PORT")]
    port: Option<u16>,

    /// Largest accepted frame, in bytes (overrides config)
    #[arg(long, env = "PARLEY_MAX_FRAME_SIZE")]
    max_frame_size: Option<usize>,

    /// Maximum concurrent connections (overrides config)
    #[arg(long, env = "PARLEY_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// Seconds a client gets to finish the WebSocket handshake (overrides config)
    #[arg(long, env = "PARLEY_HANDSHAKE_TIMEOUT")]
    handshake_timeout: Option<u64>,

    /// Messages kept per session (overrides config)
    #[arg(long, env = "PARLEY_HISTORY_CAP")]
    history_cap: Option<usize>,

    /// LLM provider: ollama or echo (overrides config)
    #[arg(long, env = "PARLEY_PROVIDER")]
    provider: Option<ProviderKind>,

    /// LLM model name (overrides config)
    #[arg(long, env = "PARLEY_MODEL")]
    model: Option<String>,

    /// LLM API base URL (overrides config)
    #[arg(long, env = "PARLEY_LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// Log filter, e.g. "debug" or "parley_gateway=trace" (overrides config and RUST_LOG)
    #[arg(long, env = "PARLEY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Do not check the backend environment at startup
    #[arg(long, default_value = "false")]
    skip_install_check: bool,

    /// Install missing backend pieces (pull the model) at startup
    #[arg(long, default_value = "false")]
    install: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.gateway.host = host.clone();
        }
        if let Some(port) = self.port {
            config.gateway.port = port;
        }
        if let Some(size) = self.max_frame_size {
            config.gateway.max_frame_size = size;
        }
        if let Some(max) = self.max_connections {
            config.gateway.max_connections = max;
        }
        if let Some(seconds) = self.handshake_timeout {
            config.gateway.handshake_timeout_seconds = seconds;
        }
        if let Some(cap) = self.history_cap {
            config.session.history_cap = cap;
        }
        if let Some(provider) = self.provider {
            config.llm.provider = provider;
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(base_url) = &self.llm_base_url {
            config.llm.base_url = base_url.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = expand_tilde(&cli.config).unwrap_or_else(|| PathBuf::from(&cli.config));
    let manager = ConfigManager::load(&config_path)
        .await
        .with_context(|| format!("failed to load config from {:?}", config_path))?;
    manager
        .apply(|config| cli.apply_overrides(config))
        .await
        .context("invalid command-line override")?;
    let config = manager.snapshot().await;

    let _log_guard = init_logging(&config.logging, cli.log_level.as_deref())?;

    info!(config = ?config_path, "Config loaded");
    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        base_url = %config.llm.base_url,
        "LLM configuration"
    );

    let provider: Arc<dyn LLMProvider> = match config.llm.provider {
        ProviderKind::Echo => echo_provider(),
        ProviderKind::Ollama => {
            let ollama = Arc::new(
                ollama_provider(&config.llm).context("invalid ollama configuration")?,
            );
            if cli.skip_install_check {
                info!("Skipping environment check");
            } else {
                let env = OllamaEnvironment::new(ollama.clone());
                let outcome = gate(&env, &config.install, cli.install).await?;
                info!(?outcome, "Environment check finished");
            }
            ollama as Arc<dyn LLMProvider>
        }
    };

    let app = App::new(&config, provider);
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
        }
        signal_token.cancel();
    });

    info!("Starting parley gateway on ws://{}", config.bind_addr());
    app.run(shutdown).await.context("gateway failed")?;
    info!("Shutdown complete");
    Ok(())
}
