//! Hue bridge CLIP v2 REST client
//!
//! Handles all HTTP communication with the bridge. The bridge base URL is
//! not fixed: it comes from the cache or from discovery and is passed in on
//! every call.

use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::config::BridgeConfig;
use crate::error::{HueError, Result};

const APP_KEY_HEADER: &str = "hue-application-key";

/// Build the shared HTTP client with a short fixed timeout
pub fn http_client(timeout_ms: u64, insecure: bool) -> anyhow::Result<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .user_agent(format!("huectl/{}", env!("CARGO_PKG_VERSION")));

    if insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().context("building HTTP client")
}

/// Bridge resource types this client touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Room,
    Scene,
    GroupedLight,
}

impl ResourceKind {
    /// Path segment under `/resource/`
    pub fn path(self) -> &'static str {
        match self {
            ResourceKind::Room => "room",
            ResourceKind::Scene => "scene",
            ResourceKind::GroupedLight => "grouped_light",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Room => write!(f, "room"),
            ResourceKind::Scene => write!(f, "scene"),
            ResourceKind::GroupedLight => write!(f, "grouped light"),
        }
    }
}

/// Bridge REST API client
pub struct BridgeClient {
    client: Client,
    app_key: String,
}

impl BridgeClient {
    /// Create a new bridge client from the bridge settings
    pub fn new(config: &BridgeConfig) -> anyhow::Result<Self> {
        let app_key = config.app_key.clone().ok_or_else(|| {
            anyhow!(
                "No bridge application key configured.\n\
                Set via --app-key, HUE_APP_KEY env var, or in config file."
            )
        })?;

        Ok(Self {
            client: http_client(config.timeout_ms, config.insecure)?,
            app_key,
        })
    }

    async fn get<T: DeserializeOwned>(&self, base: &str, path: &str) -> Result<T> {
        let url = format!("{}{}", base.trim_end_matches('/'), path);
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(APP_KEY_HEADER, &self.app_key)
            .send()
            .await
            .map_err(|err| HueError::from_transport(&url, err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| HueError::from_transport(&url, err))?;

        if !status.is_success() {
            return Err(HueError::Operation { status, url, body });
        }

        serde_json::from_str(&body).map_err(|source| HueError::Decode { url, source })
    }

    /// PUT a state change on a resource.
    ///
    /// Any HTTP answer is returned as-is; only transport failures are errors,
    /// so the caller decides what a 404 or 207 means.
    pub async fn put(
        &self,
        base: &str,
        kind: ResourceKind,
        id: &str,
        body: &Value,
    ) -> Result<BridgeResponse> {
        let url = format!(
            "{}/resource/{}/{}",
            base.trim_end_matches('/'),
            kind.path(),
            id
        );
        log::debug!("PUT {} {}", url, body);

        let response = self
            .client
            .put(&url)
            .header(APP_KEY_HEADER, &self.app_key)
            .json(body)
            .send()
            .await
            .map_err(|err| HueError::from_transport(&url, err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| HueError::from_transport(&url, err))?;
        log::debug!("PUT {} -> {}", url, status);

        Ok(BridgeResponse { status, url, body })
    }

    /// List all rooms
    pub async fn rooms(&self, base: &str) -> Result<Vec<Room>> {
        let listing: Listing<Room> = self.get(base, "/resource/room").await?;
        Ok(listing.into_data())
    }

    /// List all scenes
    pub async fn scenes(&self, base: &str) -> Result<Vec<Scene>> {
        let listing: Listing<Scene> = self.get(base, "/resource/scene").await?;
        Ok(listing.into_data())
    }
}

/// Raw answer to a state-changing request
#[derive(Debug, Clone)]
pub struct BridgeResponse {
    pub status: StatusCode,
    pub url: String,
    pub body: String,
}

impl BridgeResponse {
    pub fn into_error(self) -> HueError {
        HueError::Operation {
            status: self.status,
            url: self.url,
            body: self.body,
        }
    }
}

// --- API Types ---

/// CLIP v2 response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    #[serde(default)]
    pub errors: Vec<ApiError>,
    pub data: Vec<T>,
}

impl<T> Listing<T> {
    fn into_data(self) -> Vec<T> {
        for err in &self.errors {
            log::warn!("bridge reported: {}", err.description);
        }
        self.data
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
}

/// Reference from one resource to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub rid: String,
    pub rtype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub metadata: Metadata,
    /// Services attached to the room, including its grouped light
    #[serde(default)]
    pub services: Vec<ResourceRef>,
}

impl Room {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Id of the aggregate light controlling every light in the room
    pub fn grouped_light(&self) -> Option<&str> {
        self.services
            .iter()
            .find(|service| service.rtype == ResourceKind::GroupedLight.path())
            .map(|service| service.rid.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub metadata: Metadata,
    /// Room (or zone) owning the scene
    pub group: ResourceRef,
}

impl Scene {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
