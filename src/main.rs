//! Umbra CLI - run the local egress proxy standalone
//!
//! Starts the loopback listener and relays every accepted connection through
//! a WebSocket tunnel to the configured relay endpoint. When embedded, the
//! host process supplies its own proxy configurator; this binary logs the
//! selected route instead.

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use umbra_proxy::{
    select_proxy_route, HostConfigurator, ProxyError, ProxySelection, RelayConfig,
};

/// Umbra - relay local HTTP/HTTPS traffic through a remote tunnel endpoint
#[derive(Parser, Debug)]
#[command(name = "umbra")]
#[command(about = "Local forward proxy tunneling egress traffic through a remote relay")]
#[command(version)]
struct Cli {
    /// WebSocket URL of the remote relay endpoint
    #[arg(
        long,
        env = "UMBRA_TUNNEL_URL",
        default_value = "wss://relay.umbra.dev/tunnel"
    )]
    tunnel_url: String,

    /// Static HTTP proxy used when the local listener cannot start
    #[arg(
        long,
        env = "UMBRA_FALLBACK_PROXY",
        default_value = "relay.umbra.dev:3128"
    )]
    fallback_proxy: String,

    /// Loopback port for the local listener
    #[arg(long, env = "UMBRA_LISTEN_PORT", default_value = "3129")]
    listen_port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Stand-in for the embedding host: logs the proxy setting it would apply.
struct LoggingConfigurator;

#[async_trait]
impl HostConfigurator for LoggingConfigurator {
    async fn set_outbound_proxy(&self, proxy_rules: &str) -> Result<(), ProxyError> {
        info!("outbound proxy set to: {}", proxy_rules);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = RelayConfig::default()
        .with_tunnel_url(&cli.tunnel_url)
        .with_fallback_proxy(&cli.fallback_proxy)
        .with_local_listen_port(cli.listen_port);

    match select_proxy_route(&config, &LoggingConfigurator).await? {
        ProxySelection::Local { listener, .. } => {
            let addr = listener.local_addr();
            info!("serving on {} until ctrl-c", addr);

            tokio::select! {
                _ = listener.serve() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                }
            }
        }
        ProxySelection::Fallback { reason, .. } => {
            warn!("running without local listener: {}", reason);
            info!(
                "host traffic routed to static proxy {}",
                config.fallback_proxy
            );
        }
    }

    Ok(())
}
