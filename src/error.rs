//! Error types for bridge resolution and commands

use reqwest::StatusCode;

use crate::api::ResourceKind;

/// Result type for resolver and executor operations
pub type Result<T> = std::result::Result<T, HueError>;

/// Errors raised while locating the bridge, resolving names, or issuing commands
#[derive(Debug, thiserror::Error)]
pub enum HueError {
    /// Discovery failed or returned no candidate bridge
    #[error("bridge discovery failed: {0}")]
    Discovery(String),

    /// A name does not exist on the bridge, even after a full refresh
    #[error("{kind} '{name}' not found{}", in_room(.room))]
    NotFound {
        kind: ResourceKind,
        name: String,
        room: Option<String>,
    },

    /// Connectivity failed on both the cached and the rediscovered address
    #[error("bridge unreachable at {url}: {source}")]
    BridgeUnreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The bridge answered but rejected the request
    #[error("{}", operation_message(.status, .url, .body))]
    Operation {
        status: StatusCode,
        url: String,
        body: String,
    },

    /// Connection refused or timed out; retried by the resolver
    #[error("cannot connect to {url}: {source}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Any other transport failure
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response body did not match the expected resource shape
    #[error("parsing response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl HueError {
    /// Classify a reqwest failure into connectivity or plain request error
    pub fn from_transport(url: &str, source: reqwest::Error) -> Self {
        if source.is_connect() || source.is_timeout() {
            HueError::Connectivity {
                url: url.to_string(),
                source,
            }
        } else {
            HueError::Request {
                url: url.to_string(),
                source,
            }
        }
    }

    pub fn not_found(kind: ResourceKind, name: &str) -> Self {
        HueError::NotFound {
            kind,
            name: name.to_string(),
            room: None,
        }
    }

    pub fn not_found_in_room(kind: ResourceKind, name: &str, room: &str) -> Self {
        HueError::NotFound {
            kind,
            name: name.to_string(),
            room: Some(room.to_string()),
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, HueError::Connectivity { .. })
    }

    /// Turn a second connectivity failure into the terminal error.
    /// Other variants pass through unchanged.
    pub fn into_unreachable(self) -> Self {
        match self {
            HueError::Connectivity { url, source } => HueError::BridgeUnreachable { url, source },
            other => other,
        }
    }
}

fn in_room(room: &Option<String>) -> String {
    room.as_ref()
        .map(|r| format!(" in room '{r}'"))
        .unwrap_or_default()
}

fn operation_message(status: &StatusCode, url: &str, body: &str) -> String {
    let hint = match *status {
        StatusCode::UNAUTHORIZED => "Check your application key (HUE_APP_KEY or --app-key)",
        StatusCode::FORBIDDEN => "The application key is not allowed to do this",
        StatusCode::TOO_MANY_REQUESTS => "The bridge is rate limiting requests, try again shortly",
        StatusCode::SERVICE_UNAVAILABLE => "The bridge may be starting up",
        _ => "",
    };

    let msg = if body.is_empty() {
        format!("HTTP {status} from {url}")
    } else {
        format!("HTTP {status} from {url}: {body}")
    };

    if hint.is_empty() {
        msg
    } else {
        format!("{msg}\nHint: {hint}")
    }
}
