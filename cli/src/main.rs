//! Developer tool for the Sealpost transport: key generation, device id,
//! sending actions and opening captured envelopes.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sealpost_sdk_core::identity::{
    DeviceIdentityProvider, FileKeyStore, HostDeviceInfo, SledIdentityStore,
};
use sealpost_sdk_core::{
    ActionIdentity, ActionTransport, DeviceId, EnvelopeCipher, ServerPrivateKey, TransportConfig,
};
use serde_json::{Map, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sealpost", version, about = "Sealpost transport developer tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the router's RSA key pair
    Keygen {
        #[arg(long, default_value_t = 2048)]
        bits: usize,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Print this host's device identifier
    DeviceId {
        #[arg(long, env = "SEALPOST_DATA_DIR", default_value = ".sealpost")]
        data_dir: PathBuf,
        /// DER signing certificate mixed into the fingerprint
        #[arg(long)]
        certificate: Option<PathBuf>,
    },

    /// Seal and send one action
    Send {
        #[arg(long, env = "SEALPOST_ENDPOINT")]
        endpoint: String,
        /// Pinned server public key (PEM)
        #[arg(long, env = "SEALPOST_PUBLIC_KEY")]
        public_key: PathBuf,
        action: String,
        /// JSON object with the action parameters
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, env = "SEALPOST_ID_TOKEN", default_value = "")]
        id_token: String,
        #[arg(long, env = "SEALPOST_DEVICE_TOKEN", default_value = "")]
        device_token: String,
        /// Use this device id instead of deriving one
        #[arg(long)]
        device_id: Option<String>,
        #[arg(long, env = "SEALPOST_DATA_DIR", default_value = ".sealpost")]
        data_dir: PathBuf,
        #[arg(long)]
        vpn: bool,
        #[arg(long)]
        ssl_proxy: bool,
    },

    /// Open an envelope with the server private key
    Decode {
        #[arg(long, env = "SEALPOST_PRIVATE_KEY")]
        private_key: PathBuf,
        /// File holding the envelope; stdin when omitted
        input: Option<PathBuf>,
    },
}

fn read_pem(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn parse_params(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("params must be JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("params must be a JSON object"),
    }
}

fn host_device_id(data_dir: &Path, certificate: Option<&Path>) -> anyhow::Result<DeviceId> {
    let source = match certificate {
        Some(path) => HostDeviceInfo::with_signing_certificate(
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => HostDeviceInfo::new(),
    };
    let store = SledIdentityStore::open(data_dir.join("identity.db"))
        .context("failed to open identity store")?;
    let provider = DeviceIdentityProvider::new(source, FileKeyStore::new(data_dir.join("keys")), store);
    Ok(provider.device_id())
}

fn keygen(bits: usize, out_dir: &Path) -> anyhow::Result<()> {
    let private_key = ServerPrivateKey::generate(bits)?;
    std::fs::create_dir_all(out_dir)?;

    let private_path = out_dir.join("server_private.pem");
    let public_path = out_dir.join("server_public.pem");
    std::fs::write(&private_path, private_key.to_pem()?.as_bytes())
        .with_context(|| format!("failed to write {}", private_path.display()))?;
    std::fs::write(&public_path, private_key.public_key().to_pem()?)
        .with_context(|| format!("failed to write {}", public_path.display()))?;

    println!("private key: {}", private_path.display());
    println!("public key:  {}", public_path.display());
    Ok(())
}

fn decode(private_key: &Path, input: Option<&Path>) -> anyhow::Result<Value> {
    let key = ServerPrivateKey::from_pem(&read_pem(private_key)?)?;
    let wire = match input {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(Value::Object(EnvelopeCipher::decode_json(wire.trim(), &key)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Keygen { bits, out_dir } => keygen(bits, &out_dir)?,
        Command::DeviceId { data_dir, certificate } => {
            println!("{}", host_device_id(&data_dir, certificate.as_deref())?);
        }
        Command::Send {
            endpoint,
            public_key,
            action,
            params,
            id_token,
            device_token,
            device_id,
            data_dir,
            vpn,
            ssl_proxy,
        } => {
            let device_id = match device_id {
                Some(raw) => DeviceId::parse(&raw).context("device id must be 64 lower-case hex characters")?,
                None => host_device_id(&data_dir, None)?,
            };
            let identity = ActionIdentity::new(device_id)
                .with_id_token(id_token)
                .with_device_token(device_token)
                .with_network_flags(vpn, ssl_proxy);

            let transport = ActionTransport::new(TransportConfig {
                endpoint_url: endpoint,
                server_public_key_pem: read_pem(&public_key)?,
                ..Default::default()
            });
            let response = transport.send(&action, parse_params(&params)?, &identity).await;
            println!("{}", serde_json::to_string_pretty(&response.to_value())?);
        }
        Command::Decode { private_key, input } => {
            let request = decode(&private_key, input.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_params() {
        assert_eq!(parse_params(r#"{"day":2}"#).unwrap()["day"], 2);
        assert!(parse_params("[1,2]").is_err());
        assert!(parse_params("day=2").is_err());
    }

    #[test]
    fn test_keygen_then_decode() {
        let dir = tempfile::tempdir().unwrap();
        keygen(2048, dir.path()).unwrap();

        let public_pem = std::fs::read_to_string(dir.path().join("server_public.pem")).unwrap();
        let public_key = sealpost_sdk_core::ServerPublicKey::from_pem(&public_pem).unwrap();
        let wire = EnvelopeCipher::encode(br#"{"action":"getTasks"}"#, &public_key).unwrap();

        let envelope_path = dir.path().join("captured.txt");
        std::fs::write(&envelope_path, format!("{wire}\n")).unwrap();

        let request = decode(&dir.path().join("server_private.pem"), Some(&envelope_path)).unwrap();
        assert_eq!(request["action"], "getTasks");
    }

    #[test]
    fn test_device_id_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let first = host_device_id(dir.path(), None).unwrap();
        let second = host_device_id(&dir.path().join("other"), None).unwrap();
        assert_eq!(first, second);
    }
}
