//! State-changing commands: apply a scene, switch a room off

use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::api::{BridgeClient, ResourceKind};
use crate::cache::Cache;
use crate::discovery::Locator;
use crate::error::{HueError, Result};
use crate::resolver::{Resolver, RetryLadder};

/// Issues commands against resolved bridge resources
pub struct Executor<'a> {
    bridge: &'a BridgeClient,
    resolver: Resolver<'a>,
}

/// How a command response steers the retry ladder
enum Verdict {
    Done,
    /// The id we sent no longer exists on the bridge
    Stale,
    Unreachable(HueError),
}

impl<'a> Executor<'a> {
    pub fn new(bridge: &'a BridgeClient, locator: &'a Locator) -> Self {
        Self {
            bridge,
            resolver: Resolver::new(bridge, locator),
        }
    }

    /// Recall `scene_name` in `room_name`
    pub async fn apply_scene(&self, cache: &mut Cache, room_name: &str, scene_name: &str) -> Result<()> {
        let body = json!({"recall": {"status": "active"}});
        let mut ladder = RetryLadder::new();
        loop {
            let room_id = self.resolver.resolve_room(cache, room_name).await?;
            let scene_id = self
                .resolver
                .resolve_scene(cache, scene_name, room_name, &room_id)
                .await?;

            match self
                .send(cache, ResourceKind::Scene, &scene_id, &body, &[StatusCode::OK])
                .await?
            {
                Verdict::Done => {
                    log::info!("Applied scene '{scene_name}' in '{room_name}'");
                    return Ok(());
                }
                Verdict::Stale => {
                    if !ladder.on_miss() {
                        return Err(HueError::not_found_in_room(
                            ResourceKind::Scene,
                            scene_name,
                            room_name,
                        ));
                    }
                    ladder.on_refreshed();
                    log::info!("Scene id {scene_id} is stale; refreshing rooms and scenes");
                    cache.clear_rooms();
                    cache.clear_scenes();
                }
                Verdict::Unreachable(err) => {
                    self.resolver
                        .recover(cache, &mut ladder, err, |_: &mut Cache| {})
                        .await?
                }
            }
        }
    }

    /// Switch every light in `room_name` off through its grouped light
    pub async fn turn_off_room(&self, cache: &mut Cache, room_name: &str) -> Result<()> {
        let body = json!({"on": {"on": false}});
        let mut ladder = RetryLadder::new();
        loop {
            let grouped_light = self.resolver.resolve_grouped_light(cache, room_name).await?;

            // 207: the bridge acknowledged some of the room's lights
            let accepted = [StatusCode::OK, StatusCode::MULTI_STATUS];
            match self
                .send(cache, ResourceKind::GroupedLight, &grouped_light, &body, &accepted)
                .await?
            {
                Verdict::Done => {
                    log::info!("Turned off '{room_name}'");
                    return Ok(());
                }
                Verdict::Stale => {
                    if !ladder.on_miss() {
                        return Err(HueError::not_found(ResourceKind::GroupedLight, room_name));
                    }
                    ladder.on_refreshed();
                    log::info!("Grouped light {grouped_light} is stale; refreshing rooms");
                    cache.clear_rooms();
                }
                Verdict::Unreachable(err) => {
                    self.resolver
                        .recover(cache, &mut ladder, err, |_: &mut Cache| {})
                        .await?
                }
            }
        }
    }

    async fn send(
        &self,
        cache: &mut Cache,
        kind: ResourceKind,
        id: &str,
        body: &Value,
        accepted: &[StatusCode],
    ) -> Result<Verdict> {
        let base = self.resolver.bridge_address(cache).await?;
        let response = match self.bridge.put(&base, kind, id, body).await {
            Ok(response) => response,
            Err(err) if err.is_connectivity() => return Ok(Verdict::Unreachable(err)),
            Err(err) => return Err(err),
        };

        if accepted.contains(&response.status) {
            Ok(Verdict::Done)
        } else if response.status == StatusCode::NOT_FOUND {
            Ok(Verdict::Stale)
        } else {
            Err(response.into_error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::scene_key;
    use std::time::Duration;

    use crate::test_support::{
        bridge_base, dead_bridge_base, dead_port, mount_discovery, mount_rooms, mount_scenes,
        room_json, scene_json, test_bridge_config,
    };
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        bridge: BridgeClient,
        locator: Locator,
    }

    impl Fixture {
        fn new(server: &MockServer) -> Self {
            let config = test_bridge_config(server);
            Self {
                bridge: BridgeClient::new(&config).unwrap(),
                locator: Locator::new(&config).unwrap(),
            }
        }

        fn executor(&self) -> Executor<'_> {
            Executor::new(&self.bridge, &self.locator)
        }
    }

    fn cached(server: &MockServer) -> Cache {
        let mut cache = Cache {
            bridge_address: Some(bridge_base(server)),
            ..Cache::default()
        };
        cache.room_index.insert("den".to_string(), "room-1".to_string());
        cache
            .grouped_light_index
            .insert("den".to_string(), "gl-1".to_string());
        cache
            .scene_index
            .insert(scene_key("relax", "room-1"), "scene-1".to_string());
        cache
    }

    async fn mount_put(server: &MockServer, resource: &str, body: Value, status: u16, times: u64) {
        Mock::given(method("PUT"))
            .and(path(format!("/clip/v2/resource/{resource}")))
            .and(body_json(body))
            .respond_with(ResponseTemplate::new(status))
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_apply_scene_from_cache() {
        let server = MockServer::start().await;
        mount_put(&server, "scene/scene-1", json!({"recall": {"status": "active"}}), 200, 1).await;
        mount_rooms(&server, vec![], 0).await;
        mount_scenes(&server, vec![], 0).await;

        let fixture = Fixture::new(&server);
        let mut cache = cached(&server);

        fixture
            .executor()
            .apply_scene(&mut cache, "den", "relax")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_apply_scene_retries_stale_id_once() {
        let server = MockServer::start().await;
        mount_put(&server, "scene/scene-1", json!({"recall": {"status": "active"}}), 404, 1).await;
        mount_put(&server, "scene/scene-2", json!({"recall": {"status": "active"}}), 200, 1).await;
        mount_rooms(&server, vec![room_json("room-2", "Den", "gl-2")], 1).await;
        mount_scenes(&server, vec![scene_json("scene-2", "Relax", "room-2")], 1).await;

        let fixture = Fixture::new(&server);
        let mut cache = cached(&server);

        fixture
            .executor()
            .apply_scene(&mut cache, "den", "relax")
            .await
            .unwrap();
        assert_eq!(cache.room("den"), Some("room-2"));
        assert_eq!(cache.scene("relax", "room-2"), Some("scene-2"));
    }

    #[tokio::test]
    async fn test_apply_scene_second_not_found_is_terminal() {
        let server = MockServer::start().await;
        mount_put(&server, "scene/scene-1", json!({"recall": {"status": "active"}}), 404, 2).await;
        mount_rooms(&server, vec![room_json("room-1", "Den", "gl-1")], 1).await;
        mount_scenes(&server, vec![scene_json("scene-1", "Relax", "room-1")], 1).await;

        let fixture = Fixture::new(&server);
        let mut cache = cached(&server);

        let err = fixture
            .executor()
            .apply_scene(&mut cache, "den", "relax")
            .await
            .unwrap_err();
        assert!(matches!(err, HueError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_turn_off_accepts_multi_status() {
        let server = MockServer::start().await;
        mount_put(&server, "grouped_light/gl-1", json!({"on": {"on": false}}), 207, 1).await;

        let fixture = Fixture::new(&server);
        let mut cache = cached(&server);

        fixture
            .executor()
            .turn_off_room(&mut cache, "den")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_turn_off_rejected_is_operation_error() {
        let server = MockServer::start().await;
        mount_put(&server, "grouped_light/gl-1", json!({"on": {"on": false}}), 500, 1).await;

        let fixture = Fixture::new(&server);
        let mut cache = cached(&server);

        let err = fixture
            .executor()
            .turn_off_room(&mut cache, "den")
            .await
            .unwrap_err();
        match err {
            HueError::Operation { status, .. } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_turn_off_rediscovers_moved_bridge() {
        let server = MockServer::start().await;
        mount_discovery(&server, server.address().port(), 1).await;
        mount_put(&server, "grouped_light/gl-1", json!({"on": {"on": false}}), 200, 1).await;

        let fixture = Fixture::new(&server);
        let mut cache = cached(&server);
        cache.bridge_address = Some(dead_bridge_base());

        fixture
            .executor()
            .turn_off_room(&mut cache, "den")
            .await
            .unwrap();
        assert_eq!(cache.bridge_address, Some(bridge_base(&server)));
    }

    #[tokio::test]
    async fn test_apply_scene_stale_retry_not_renewed_by_timeout() {
        let server = MockServer::start().await;
        let recall = json!({"recall": {"status": "active"}});
        // 404, then a response slower than the client timeout, then 404 again
        Mock::given(method("PUT"))
            .and(path("/clip/v2/resource/scene/scene-1"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/clip/v2/resource/scene/scene-1"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_put(&server, "scene/scene-1", recall, 404, 1).await;
        mount_discovery(&server, server.address().port(), 1).await;
        mount_rooms(&server, vec![room_json("room-1", "Den", "gl-1")], 1).await;
        mount_scenes(&server, vec![scene_json("scene-1", "Relax", "room-1")], 1).await;

        let fixture = Fixture::new(&server);
        let mut cache = cached(&server);

        let err = fixture
            .executor()
            .apply_scene(&mut cache, "den", "relax")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "scene 'relax' not found in room 'den'");
    }

    #[tokio::test]
    async fn test_turn_off_stale_grouped_light_refreshes_rooms_once() {
        let server = MockServer::start().await;
        mount_put(&server, "grouped_light/gl-1", json!({"on": {"on": false}}), 404, 2).await;
        mount_rooms(&server, vec![room_json("room-1", "Den", "gl-1")], 1).await;

        let fixture = Fixture::new(&server);
        let mut cache = cached(&server);

        let err = fixture
            .executor()
            .turn_off_room(&mut cache, "den")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HueError::NotFound {
                kind: ResourceKind::GroupedLight,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_turn_off_unreachable_twice() {
        let server = MockServer::start().await;
        mount_discovery(&server, dead_port(), 1).await;

        let fixture = Fixture::new(&server);
        let mut cache = cached(&server);
        cache.bridge_address = Some(dead_bridge_base());

        let err = fixture
            .executor()
            .turn_off_room(&mut cache, "den")
            .await
            .unwrap_err();
        assert!(matches!(err, HueError::BridgeUnreachable { .. }));
        assert_eq!(cache.grouped_light("den"), Some("gl-1"));
    }
}
