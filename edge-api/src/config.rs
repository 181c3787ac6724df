use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Router configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub bind_addr: SocketAddr,
    /// Path of the single action endpoint
    pub route_path: String,
    /// PEM file holding the RSA private key (PKCS#1 or PKCS#8)
    pub private_key_path: PathBuf,
    /// How long an envelope body is remembered; 0 disables replay detection
    pub replay_ttl_secs: u64,
    /// Token bucket capacity per device; 0 disables rate limiting
    pub rate_limit_burst: u32,
    pub rate_limit_per_sec: f64,
    /// Largest accepted envelope body; larger ones get 413
    pub max_body_bytes: usize,
    /// Business backend receiving forwarded actions at `<upstream_url>/<action>`
    pub upstream_url: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            route_path: "/api".to_string(),
            private_key_path: PathBuf::from("server_private.pem"),
            replay_ttl_secs: 300,
            rate_limit_burst: 30,
            rate_limit_per_sec: 1.0,
            max_body_bytes: 64 * 1024,
            upstream_url: None,
        }
    }
}

impl RouterConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Reject values the router cannot be built with
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.route_path.starts_with('/') {
            bail!("route_path must start with '/': {:?}", self.route_path);
        }
        if self.route_path == "/health" {
            bail!("route_path must not be /health");
        }
        if self.max_body_bytes == 0 {
            bail!("max_body_bytes must be positive");
        }
        if !self.rate_limit_per_sec.is_finite() || self.rate_limit_per_sec < 0.0 {
            bail!("rate_limit_per_sec must be a non-negative number");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: RouterConfig =
            serde_json::from_str(r#"{"route_path":"/v2/api","upstream_url":"http://backend:8080"}"#).unwrap();
        assert_eq!(config.route_path, "/v2/api");
        assert_eq!(config.upstream_url.as_deref(), Some("http://backend:8080"));
        assert_eq!(config.replay_ttl_secs, 300);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.max_body_bytes, 64 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_route_path() {
        assert!(RouterConfig::default().validate().is_ok());

        for bad in ["api", "", "/health"] {
            let config = RouterConfig {
                route_path: bad.to_string(),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_validate_limits() {
        let config = RouterConfig {
            max_body_bytes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RouterConfig {
            rate_limit_per_sec: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.json");
        std::fs::write(&path, r#"{"bind_addr":"127.0.0.1:8443","rate_limit_burst":0}"#).unwrap();

        let config = RouterConfig::from_file(&path).unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8443");
        assert_eq!(config.rate_limit_burst, 0);
        assert!(RouterConfig::from_file(&dir.path().join("missing.json")).is_err());
    }
}
