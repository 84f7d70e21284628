//! Wiring of the bus, registries, router and gateway into one server

use parley_config::{Config, LlmConfig};
use parley_core::EventBus;
use parley_gateway::{
    DeliveryRegistry, Gateway, GatewayConfig, GatewayError, ResponseDelivery,
};
use parley_llm::{EchoProvider, HttpSettings, LLMProvider, OllamaProvider};
use parley_router::{register_default_handlers, MessageRouter, RouterConfig};
use parley_session::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A fully wired server, ready to accept connections
#[derive(Debug, Clone)]
pub struct App {
    gateway: Gateway,
}

impl App {
    /// Build every component from `config`, sharing one bus and one session
    /// registry between them.
    pub fn new(config: &Config, provider: Arc<dyn LLMProvider>) -> Self {
        let bus = EventBus::new();
        let sessions = SessionRegistry::new(config.session.history_cap);
        let deliveries = DeliveryRegistry::new();

        register_default_handlers(&bus);
        ResponseDelivery::subscribe(&bus, deliveries.clone());

        info!(provider = provider.provider_id(), "Using backend");
        let router = Arc::new(MessageRouter::new(
            router_config(config),
            sessions.clone(),
            bus.clone(),
            deliveries.clone(),
            provider,
        ));

        let gateway = Gateway::new(gateway_config(config), sessions, bus, deliveries, router);
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn bus(&self) -> &EventBus {
        self.gateway.bus()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        self.gateway.sessions()
    }

    /// Bind the configured address and serve until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), GatewayError> {
        self.gateway.run(shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), GatewayError> {
        self.gateway.serve(listener, shutdown).await
    }
}

pub fn gateway_config(config: &Config) -> GatewayConfig {
    GatewayConfig {
        bind: config.bind_addr(),
        max_frame_size: config.gateway.max_frame_size,
        max_connections: config.gateway.max_connections,
        handshake_timeout: Duration::from_secs(config.gateway.handshake_timeout_seconds),
    }
}

pub fn router_config(config: &Config) -> RouterConfig {
    RouterConfig {
        send_ack: config.router.send_ack,
        ack_message: config.router.ack_message.clone(),
        reject_concurrent: config.router.reject_concurrent,
    }
}

pub fn ollama_provider(config: &LlmConfig) -> parley_llm::Result<OllamaProvider> {
    let settings = HttpSettings::new(config.base_url.clone())
        .with_timeout(Duration::from_secs(config.timeout_seconds));
    OllamaProvider::new(settings, config.model.clone())
}

pub fn echo_provider() -> Arc<dyn LLMProvider> {
    Arc::new(EchoProvider::new())
}
