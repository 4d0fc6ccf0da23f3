//! Shared fixtures for mock-bridge tests

use std::net::TcpListener;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::BridgeConfig;

pub const DISCOVERY_PATH: &str = "/discovery";

/// Bridge settings pointing discovery at the mock server, over plain http
pub fn test_bridge_config(server: &MockServer) -> BridgeConfig {
    BridgeConfig {
        app_key: Some("test-key".to_string()),
        discovery_url: format!("{}{}", server.uri(), DISCOVERY_PATH),
        scheme: "http".to_string(),
        timeout_ms: 1000,
        insecure: true,
    }
}

/// Base URL discovery yields for the mock server
pub fn bridge_base(server: &MockServer) -> String {
    format!("http://127.0.0.1:{}/clip/v2", server.address().port())
}

/// A loopback port nothing listens on
pub fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn dead_bridge_base() -> String {
    format!("http://127.0.0.1:{}/clip/v2", dead_port())
}

pub fn room_json(id: &str, name: &str, grouped_light: &str) -> Value {
    json!({
        "id": id,
        "type": "room",
        "metadata": {"name": name, "archetype": "living_room"},
        "children": [],
        "services": [{"rid": grouped_light, "rtype": "grouped_light"}]
    })
}

pub fn scene_json(id: &str, name: &str, room_id: &str) -> Value {
    json!({
        "id": id,
        "type": "scene",
        "metadata": {"name": name},
        "group": {"rid": room_id, "rtype": "room"}
    })
}

/// Discovery answers with a bridge on the given loopback port
pub async fn mount_discovery(server: &MockServer, port: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "001788fffe4a2b3c", "internalipaddress": "127.0.0.1", "port": port}
        ])))
        .expect(times)
        .mount(server)
        .await;
}

pub async fn mount_rooms(server: &MockServer, rooms: Vec<Value>, times: u64) {
    Mock::given(method("GET"))
        .and(path("/clip/v2/resource/room"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"errors": [], "data": rooms})),
        )
        .expect(times)
        .mount(server)
        .await;
}

pub async fn mount_scenes(server: &MockServer, scenes: Vec<Value>, times: u64) {
    Mock::given(method("GET"))
        .and(path("/clip/v2/resource/scene"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"errors": [], "data": scenes})),
        )
        .expect(times)
        .mount(server)
        .await;
}
