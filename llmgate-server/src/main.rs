//! llmgate Server - Headless Gateway
//!
//! A pure Rust HTTP server that:
//! - Accepts OpenAI and Anthropic shaped calls on /v1/*
//! - Forwards them to one OpenAI-compatible upstream with managed credentials
//! - Provides a JSON dashboard API on /api/*
//!
//! Access via: http://localhost:3000

use anyhow::Result;
use clap::Parser;
use llmgate_core::GatewayContext;
use llmgate_types::CredentialError;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod cli;
mod router;
mod server_utils;
mod state;

use cli::Cli;

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let generated_secret = !cli.access_token.as_deref().is_some_and(|t| !t.trim().is_empty());
    let config = cli.into_config()?;
    let context = GatewayContext::build(config)?;
    let config = context.state.config.clone();
    let events = context.events.clone();

    info!("🚀 llmgate v{} starting on {}...", env!("CARGO_PKG_VERSION"), config.socket_addr());
    if generated_secret {
        warn!("🔐 PROXY_ACCESS_TOKEN not set, generated {}", context.state.gate.secret_prefix());
        // Handed to the operator on stdout only; never through the log pipeline.
        println!("Access token: {}", config.access_token);
    } else {
        info!("🔐 Access token: {}", context.state.gate.secret_prefix());
    }
    info!("🎯 Target endpoint: {}", config.upstream.endpoint);
    info!("📚 Models: {}", config.models.available_models.join(", "));
    if !config.models.aliases.is_empty() {
        info!("🔀 {} model aliases loaded", config.models.aliases.len());
    }

    if !config.placeholder_mode {
        match context.state.credentials.get_credential().await {
            Ok(credential) => info!("🔑 Upstream credential ready ({})", credential.source()),
            Err(CredentialError::NotConfigured) => {
                warn!(
                    "⚠️ No upstream credential configured (missing credential policy: {})",
                    config.upstream.missing_credential_policy
                );
                events.warn(
                    "No upstream credential configured",
                    Some(json!({ "policy": config.upstream.missing_credential_policy.to_string() })),
                );
            },
            Err(e) => {
                warn!("⚠️ Initial credential fetch failed: {}", e);
                events.warn("Initial credential fetch failed", Some(json!({ "error": e.to_string() })));
            },
        }
    }

    let app = router::build_router(&context);
    let listener = server_utils::create_listener(&config.socket_addr()).await?;

    info!("🔀 Proxy endpoints at http://localhost:{}/v1/", config.port);
    info!("🔌 API available at http://localhost:{}/api/", config.port);
    events.info(
        "Gateway started",
        Some(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "address": config.socket_addr(),
            "target_endpoint": config.upstream.endpoint,
            "placeholder_mode": config.placeholder_mode,
        })),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(server_utils::shutdown_signal())
        .await?;

    events.info("Gateway stopping", None);
    context.state.credentials.shutdown();
    info!("👋 llmgate stopped");
    Ok(())
}
