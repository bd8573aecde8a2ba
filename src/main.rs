// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use thinkgate::config;
use thinkgate::models::ModelResolver;
use thinkgate::proxy;
use thinkgate::upstream;

use std::net::SocketAddr;

#[derive(Parser)]
#[command(
    name = "thinkgate",
    about = "OpenAI-compatible streaming gateway for reasoning backends"
)]
struct Cli {
    /// Path to the thinkgate.yaml config file
    #[arg(long, default_value = "thinkgate.yaml", env = "THINKGATE_CONFIG")]
    config: String,

    /// Port to listen on
    #[arg(long, default_value_t = 9820, env = "THINKGATE_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    tracing::info!(%addr, "thinkgate starting");

    let source = config::FileSource {
        path: std::path::PathBuf::from(cli.config),
    };
    let config = match config::load_config(&source) {
        Ok(c) => std::sync::Arc::new(c),
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = %config.version,
        upstream = %config.upstream.base_url,
        display = ?config.reasoning.display,
        config_hash = %config.config_hash,
        "config loaded"
    );

    let resolver = std::sync::Arc::new(ModelResolver::new(
        config.models.map.clone(),
        config.models.fallback_large.clone(),
        config.models.fallback_small.clone(),
    ));

    let client: std::sync::Arc<dyn proxy::UpstreamClient> = std::sync::Arc::new(
        upstream::build_gateway_client(config, resolver.clone()),
    );

    let app = proxy::build_router(client, resolver);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "thinkgate listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
