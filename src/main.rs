use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webllm_gateway::config::GatewayConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,webllm_gateway=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env()?;
    let state = webllm_gateway::build_state(&config)?;
    let app = webllm_gateway::build_app(state);

    let addr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "webllm gateway listening");

    axum::serve(listener, app).await?;
    Ok(())
}
