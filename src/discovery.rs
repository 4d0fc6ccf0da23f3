//! Bridge discovery
//!
//! Asks the discovery service where the bridge currently lives on the LAN.

use reqwest::Client;
use serde::Deserialize;

use crate::api::http_client;
use crate::config::BridgeConfig;
use crate::error::{HueError, Result};

/// One candidate bridge from the discovery service
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveredBridge {
    #[serde(default)]
    pub id: Option<String>,
    pub internalipaddress: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl DiscoveredBridge {
    /// Base URL of the bridge's CLIP v2 API
    pub fn base_url(&self, scheme: &str) -> String {
        let default_port = match scheme {
            "http" => 80,
            _ => 443,
        };

        match self.port {
            Some(port) if port != default_port => {
                format!("{scheme}://{}:{port}/clip/v2", self.internalipaddress)
            }
            _ => format!("{scheme}://{}/clip/v2", self.internalipaddress),
        }
    }
}

/// Resolves the bridge's current address
pub struct Locator {
    client: Client,
    discovery_url: String,
    scheme: String,
}

impl Locator {
    pub fn new(config: &BridgeConfig) -> anyhow::Result<Self> {
        // Discovery is a public service; keep certificate checks on.
        Ok(Self {
            client: http_client(config.timeout_ms, false)?,
            discovery_url: config.discovery_url.clone(),
            scheme: config.scheme.clone(),
        })
    }

    /// Query discovery once and return the first bridge's base URL
    pub async fn locate(&self) -> Result<String> {
        log::debug!("GET {}", self.discovery_url);

        let response = self
            .client
            .get(&self.discovery_url)
            .send()
            .await
            .map_err(|err| HueError::Discovery(format!("{}: {err}", self.discovery_url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HueError::Discovery(format!(
                "HTTP {status} from {}",
                self.discovery_url
            )));
        }

        let bridges: Vec<DiscoveredBridge> = response
            .json()
            .await
            .map_err(|err| HueError::Discovery(format!("unexpected response: {err}")))?;

        let bridge = bridges
            .first()
            .ok_or_else(|| HueError::Discovery("no bridge found on the network".to_string()))?;

        let address = bridge.base_url(&self.scheme);
        log::info!(
            "Discovered bridge {} at {}",
            bridge.id.as_deref().unwrap_or("(unknown id)"),
            address
        );
        Ok(address)
    }
}
