//! Persisted name-to-id cache for huectl
//!
//! Keeps what the bridge told us last time:
//! - the bridge base URL
//! - room, scene and grouped-light ids by name
//!
//! The cache is advisory. Any miss wipes the owning index and refetches it,
//! so a stale file only costs extra round-trips. It is stored as a single
//! JSON document at XDG_CACHE_HOME/huectl/cache.json.
//!
//! Concurrent invocations are not coordinated; the last one to save wins.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{Room, Scene};

const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Scene names are only unique within a room, so scene keys carry the room id
pub fn scene_key(scene_name: &str, room_id: &str) -> String {
    format!("{}@{}", scene_name.to_lowercase(), room_id)
}

/// Everything remembered between invocations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cache {
    /// Base URL of the bridge API, e.g. `https://10.0.0.5/clip/v2`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_address: Option<String>,
    /// Lowercase room name -> room id
    pub room_index: BTreeMap<String, String>,
    /// `scene_key(name, room_id)` -> scene id
    pub scene_index: BTreeMap<String, String>,
    /// Lowercase room name -> grouped light id
    pub grouped_light_index: BTreeMap<String, String>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(&self, name: &str) -> Option<&str> {
        self.room_index.get(name).map(String::as_str)
    }

    pub fn scene(&self, name: &str, room_id: &str) -> Option<&str> {
        self.scene_index
            .get(&scene_key(name, room_id))
            .map(String::as_str)
    }

    pub fn grouped_light(&self, room_name: &str) -> Option<&str> {
        self.grouped_light_index.get(room_name).map(String::as_str)
    }

    /// Rebuild the room and grouped-light indices from a full room listing
    pub fn rebuild_rooms(&mut self, rooms: &[Room]) {
        self.room_index.clear();
        self.grouped_light_index.clear();

        for room in rooms {
            let name = room.name().to_lowercase();
            if let Some(grouped_light) = room.grouped_light() {
                self.grouped_light_index
                    .insert(name.clone(), grouped_light.to_string());
            }
            self.room_index.insert(name, room.id.clone());
        }
    }

    /// Rebuild the scene index from a full scene listing
    pub fn rebuild_scenes(&mut self, scenes: &[Scene]) {
        self.scene_index = scenes
            .iter()
            .map(|scene| (scene_key(scene.name(), &scene.group.rid), scene.id.clone()))
            .collect();
    }

    /// Drop the indices filled by a room listing
    pub fn clear_rooms(&mut self) {
        self.room_index.clear();
        self.grouped_light_index.clear();
    }

    pub fn clear_scenes(&mut self) {
        self.scene_index.clear();
    }
}

/// Reads and writes the cache document on disk
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cache, falling back to an empty one.
    ///
    /// A missing file is the normal first-run case. An unreadable or corrupt
    /// file is logged and ignored.
    pub fn load(&self) -> Cache {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::debug!("No cache at {}", self.path.display());
                return Cache::new();
            }
            Err(err) => {
                log::warn!("Ignoring unreadable cache {}: {}", self.path.display(), err);
                return Cache::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(cache) => cache,
            Err(err) => {
                log::warn!("Ignoring corrupt cache {}: {}", self.path.display(), err);
                Cache::new()
            }
        }
    }

    /// Overwrite the cache file.
    ///
    /// Writes to a sibling temp file and renames it over the target, so an
    /// interrupted save leaves the previous snapshot intact.
    pub fn save(&self, cache: &Cache) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating cache directory {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(cache).context("serializing cache")?;
        let temp_path = self.path.with_extension("json.tmp");

        fs::write(&temp_path, content)
            .with_context(|| format!("writing cache to {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("replacing cache at {}", self.path.display()))?;

        log::debug!("Saved cache to {}", self.path.display());
        Ok(())
    }
}

/// Get the cache directory path
pub fn cache_dir() -> Result<PathBuf> {
    // Check XDG_CACHE_HOME first
    if let Some(dir) = env::var_os("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::cache_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    // Fallback to ~/.cache
    dirs::home_dir()
        .map(|home| home.join(".cache").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine cache directory"))
}

/// Default location of the cache file
pub fn default_cache_path() -> Result<PathBuf> {
    Ok(cache_dir()?.join("cache.json"))
}
