use anyhow::Context;
use clap::Parser;
use sealpost_edge_api::{AppState, ForwardingHandler, HandlerRegistry, RouterConfig};
use sealpost_sdk_core::ServerPrivateKey;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Sealpost envelope router
#[derive(Parser, Debug)]
#[command(name = "edge-api", version)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long, env = "SEALPOST_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "SEALPOST_BIND_ADDR")]
    bind_addr: Option<SocketAddr>,

    #[arg(long, env = "SEALPOST_ROUTE_PATH")]
    route_path: Option<String>,

    /// PEM file with the RSA private key
    #[arg(long, env = "SEALPOST_PRIVATE_KEY")]
    private_key: Option<PathBuf>,

    /// Business backend receiving forwarded actions
    #[arg(long, env = "SEALPOST_UPSTREAM_URL")]
    upstream_url: Option<String>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<RouterConfig> {
        let mut config = match &self.config {
            Some(path) => RouterConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => RouterConfig::default(),
        };

        if let Some(bind_addr) = self.bind_addr {
            config.bind_addr = bind_addr;
        }
        if let Some(route_path) = self.route_path {
            config.route_path = route_path;
        }
        if let Some(private_key) = self.private_key {
            config.private_key_path = private_key;
        }
        if self.upstream_url.is_some() {
            config.upstream_url = self.upstream_url;
        }
        config.validate().context("invalid router config")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Args::parse().into_config()?;

    let pem = std::fs::read_to_string(&config.private_key_path)
        .with_context(|| format!("failed to read private key {}", config.private_key_path.display()))?;
    let private_key = ServerPrivateKey::from_pem(&pem).context("invalid private key")?;

    let mut registry = HandlerRegistry::new();
    match &config.upstream_url {
        Some(upstream) => {
            let forwarder = ForwardingHandler::new(upstream.as_str()).context("failed to build upstream client")?;
            registry.register_all(Arc::new(forwarder));
            tracing::info!(%upstream, actions = registry.len(), "forwarding actions upstream");
        }
        None => tracing::warn!("no upstream configured, every action will be rejected as unknown"),
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        route = %config.route_path,
        "sealpost edge api listening"
    );

    let state = AppState::new(config, private_key, registry);
    sealpost_edge_api::serve(listener, state).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("edge-api").chain(extra.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = args(&["--route-path", "/v2/api", "--bind-addr", "127.0.0.1:9000"])
            .into_config()
            .unwrap();
        assert_eq!(config.route_path, "/v2/api");
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_invalid_route_path_rejected() {
        assert!(args(&["--route-path", "api"]).into_config().is_err());
        assert!(args(&["--route-path", "/health"]).into_config().is_err());
    }

    #[test]
    fn test_invalid_route_path_in_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.json");
        std::fs::write(&path, r#"{"route_path":"no-slash"}"#).unwrap();

        let path = path.to_string_lossy().into_owned();
        assert!(args(&["--config", &path]).into_config().is_err());
    }
}
