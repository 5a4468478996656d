use std::net::SocketAddr;
use std::sync::Arc;

use shared::config::{AssistantConfig, load_dotenv};
use shared::llm::{OpenRouterGateway, OpenRouterGatewayConfig};
use shared::pipeline::ConsultPipeline;
use tracing::{error, info, warn};

mod http;

#[tokio::main]
async fn main() {
    let env_file = match load_dotenv() {
        Ok(env_file) => env_file,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "consult_api=info,shared=info,axum=info".to_string()),
        )
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .init();

    if let Some(path) = env_file {
        info!(path = %path.display(), "loaded environment file");
    }

    let config = match AssistantConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load consult api config");
            std::process::exit(1);
        }
    };

    let gateway_config = match OpenRouterGatewayConfig::from_env() {
        Ok(gateway_config) => gateway_config,
        Err(err) => {
            error!(error = %err, "failed to load OpenRouter config");
            std::process::exit(1);
        }
    };
    if gateway_config.max_retries > 0 {
        warn!(
            max_retries = gateway_config.max_retries,
            "delegated calls will be retried; a request may make more provider round trips"
        );
    }
    let gateway = match OpenRouterGateway::new(gateway_config) {
        Ok(gateway) => gateway,
        Err(err) => {
            error!(error = %err, "failed to initialize OpenRouter gateway");
            std::process::exit(1);
        }
    };

    let pipeline = ConsultPipeline::new(Arc::new(gateway), config.pipeline_settings());
    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, bind_addr = %config.bind_addr, "invalid bind address");
            std::process::exit(1);
        }
    };
    let app = http::build_router(http::AppState::new(pipeline, config));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };

    info!(
        "consult api listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %err, "consult api server stopped with an error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
