//! Name to id resolution against the cache and the bridge
//!
//! Each lookup walks a small ladder:
//! 1. answer from the cache when the name is indexed
//! 2. on a miss, refetch the whole listing and rebuild the index, once
//! 3. on a connection failure, rediscover the bridge and start over, once
//!
//! A name still missing after a rebuild is reported as not found.

use crate::api::{BridgeClient, ResourceKind};
use crate::cache::Cache;
use crate::discovery::Locator;
use crate::error::{HueError, Result};

/// Where a resolution currently stands on its retry ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Initial,
    /// The listing was refetched after a miss
    DataRetried,
    /// The bridge was rediscovered after a connection failure
    ConnectivityRetried,
    Failed,
}

/// Bounded retry state shared by the resolver and the executor.
///
/// Each axis is spent at most once. A connection failure during a refresh
/// that never completed hands the refresh back, so the rediscovered bridge
/// still gets one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryLadder {
    step: Step,
    relocated: bool,
    refreshed: bool,
}

impl Default for RetryLadder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryLadder {
    pub fn new() -> Self {
        Self {
            step: Step::Initial,
            relocated: false,
            refreshed: false,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Record a miss. Returns whether a refresh is still allowed.
    pub fn on_miss(&mut self) -> bool {
        if self.refreshed || self.step == Step::Failed {
            self.step = Step::Failed;
            return false;
        }
        self.step = Step::DataRetried;
        true
    }

    /// Record that the refresh granted by `on_miss` completed
    pub fn on_refreshed(&mut self) {
        self.refreshed = true;
    }

    /// Record a connection failure. Returns whether a rediscovery is still allowed.
    pub fn on_unreachable(&mut self) -> bool {
        if self.relocated || self.step == Step::Failed {
            self.step = Step::Failed;
            return false;
        }
        self.relocated = true;
        self.step = Step::ConnectivityRetried;
        true
    }
}

/// Resolves room, scene and grouped-light names to bridge ids
pub struct Resolver<'a> {
    bridge: &'a BridgeClient,
    locator: &'a Locator,
}

impl<'a> Resolver<'a> {
    pub fn new(bridge: &'a BridgeClient, locator: &'a Locator) -> Self {
        Self { bridge, locator }
    }

    /// Cached bridge address, discovering it when absent
    pub async fn bridge_address(&self, cache: &mut Cache) -> Result<String> {
        if let Some(address) = &cache.bridge_address {
            return Ok(address.clone());
        }
        self.relocate(cache).await
    }

    /// Forget the cached address and run discovery again
    pub async fn relocate(&self, cache: &mut Cache) -> Result<String> {
        cache.bridge_address = None;
        let address = self.locator.locate().await?;
        cache.bridge_address = Some(address.clone());
        Ok(address)
    }

    /// Spend the connectivity retry: clear what is about to be refetched and rediscover
    pub async fn recover(
        &self,
        cache: &mut Cache,
        ladder: &mut RetryLadder,
        err: HueError,
        clear: fn(&mut Cache),
    ) -> Result<()> {
        if !ladder.on_unreachable() {
            log::debug!("Retry ladder exhausted at {:?}", ladder.step());
            return Err(err.into_unreachable());
        }
        log::warn!("{err}; rediscovering the bridge");
        clear(cache);
        self.relocate(cache).await.map(|_| ())
    }

    pub async fn resolve_room(&self, cache: &mut Cache, name: &str) -> Result<String> {
        let mut ladder = RetryLadder::new();
        loop {
            if let Some(id) = cache.room(name) {
                return Ok(id.to_string());
            }
            if !ladder.on_miss() {
                return Err(HueError::not_found(ResourceKind::Room, name));
            }
            log::info!("Room '{name}' not cached; fetching rooms");

            match self.refresh_rooms(cache).await {
                Ok(()) => ladder.on_refreshed(),
                Err(err) if err.is_connectivity() => {
                    self.recover(cache, &mut ladder, err, Cache::clear_rooms)
                        .await?
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn resolve_grouped_light(&self, cache: &mut Cache, room_name: &str) -> Result<String> {
        let mut ladder = RetryLadder::new();
        loop {
            if let Some(id) = cache.grouped_light(room_name) {
                return Ok(id.to_string());
            }
            if !ladder.on_miss() {
                let kind = if cache.room(room_name).is_some() {
                    ResourceKind::GroupedLight
                } else {
                    ResourceKind::Room
                };
                return Err(HueError::not_found(kind, room_name));
            }
            log::info!("Grouped light for '{room_name}' not cached; fetching rooms");

            match self.refresh_rooms(cache).await {
                Ok(()) => ladder.on_refreshed(),
                Err(err) if err.is_connectivity() => {
                    self.recover(cache, &mut ladder, err, Cache::clear_rooms)
                        .await?
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Resolve a scene within a room.
    ///
    /// `room_id` may be replaced when the scene listing shows the room was
    /// recreated under a new id.
    pub async fn resolve_scene(
        &self,
        cache: &mut Cache,
        name: &str,
        room_name: &str,
        room_id: &str,
    ) -> Result<String> {
        let mut ladder = RetryLadder::new();
        let mut room_id = room_id.to_string();
        loop {
            if let Some(id) = cache.scene(name, &room_id) {
                return Ok(id.to_string());
            }
            if !ladder.on_miss() {
                return Err(HueError::not_found_in_room(
                    ResourceKind::Scene,
                    name,
                    room_name,
                ));
            }
            log::info!("Scene '{name}' in '{room_name}' not cached; fetching scenes");

            match self.refresh_scenes(cache, room_name, &room_id).await {
                Ok(current) => {
                    ladder.on_refreshed();
                    room_id = current;
                }
                Err(err) if err.is_connectivity() => {
                    self.recover(cache, &mut ladder, err, Cache::clear_scenes)
                        .await?
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn refresh_rooms(&self, cache: &mut Cache) -> Result<()> {
        let base = self.bridge_address(cache).await?;
        let rooms = self.bridge.rooms(&base).await?;
        cache.rebuild_rooms(&rooms);
        log::debug!("Indexed {} rooms", rooms.len());
        Ok(())
    }

    /// Refetch scenes and return the room id the scene index should be read with
    async fn refresh_scenes(&self, cache: &mut Cache, room_name: &str, room_id: &str) -> Result<String> {
        let base = self.bridge_address(cache).await?;
        let scenes = self.bridge.scenes(&base).await?;

        let mut room_id = room_id.to_string();
        if !scenes.iter().any(|scene| scene.group.rid == room_id) {
            log::info!("No scene belongs to room id {room_id}; re-resolving '{room_name}'");
            cache.clear_rooms();
            room_id = self.resolve_room(cache, room_name).await?;
        }

        cache.rebuild_scenes(&scenes);
        log::debug!("Indexed {} scenes", scenes.len());
        Ok(room_id)
    }
}
