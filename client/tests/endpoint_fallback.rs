mod common;

use std::sync::Arc;

use common::Unreachable;
use muvin_client::config::{ClientConfig, DEFAULT_CANISTER_ID};
use muvin_client::endpoint::EndpointResolver;
use muvin_client::session::{MemoryIdentityProvider, SessionManager};
use muvin_client::source::{FixtureBackend, Sources};
use muvin_client::HotelService;
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn hotel_json() -> Value {
    json!({
        "id": "1",
        "name": "Cyber Palace Hotel",
        "location": "Neo Tokyo",
        "description": "Neon-lit rooms above the market",
        "totalRooms": "50",
        "availableRooms": "12",
        "pricePerNight": "15000000000",
        "owner": "rdmx6-jaaaa-aaaaa-aaadq-cai",
        "amenities": ["WiFi", "Spa"],
        "images": [],
        "rating": 4.8,
        "reviewCount": "127",
        "createdAt": "1700000000000000000"
    })
}

fn config(primary: &MockServer, secondary: &MockServer) -> ClientConfig {
    let mut cfg = ClientConfig::local();
    cfg.host_override = Some(Url::parse(&primary.uri()).unwrap());
    cfg.origin = Some(Url::parse(&secondary.uri()).unwrap());
    cfg.fixture_fallback = false;
    cfg.retries = 0;
    cfg
}

#[tokio::test]
async fn second_candidate_serves_every_call_after_first_fails() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/status"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"root_key": "AQID"})))
        .expect(1)
        .mount(&secondary)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/api/v2/canister/{DEFAULT_CANISTER_ID}/query")))
        .and(body_partial_json(json!({"method": "getHotels", "params": []})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": [hotel_json()]
        })))
        .expect(2)
        .mount(&secondary)
        .await;

    let service = HotelService::from_config(&config(&primary, &secondary)).unwrap();
    let session = service.init().await;
    assert!(!session.degraded);
    assert!(!session.authenticated);
    let expected = Url::parse(&secondary.uri()).unwrap().to_string();
    assert_eq!(session.endpoint.as_deref(), Some(expected.as_str()));

    for _ in 0..2 {
        let hotels = service.get_hotels().await;
        assert_eq!(hotels.len(), 1);
        assert_eq!(hotels[0].name, "Cyber Palace Hotel");
        assert_eq!(hotels[0].price_per_night, 150.0);
    }

    // a second init reuses the resolved endpoint without another handshake
    assert_eq!(service.init().await, session);
}

#[tokio::test]
async fn rpc_error_surfaces_as_empty_read_not_fixture_data() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"root_key": "AQID"})))
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/api/v2/canister/{DEFAULT_CANISTER_ID}/query")))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"error": {"code": -32603, "message": "canister trapped"}}),
        ))
        .mount(&primary)
        .await;

    let service = HotelService::from_config(&config(&primary, &secondary)).unwrap();
    let session = service.init().await;
    assert!(!session.degraded);

    assert!(service.get_hotels().await.is_empty());
    assert!(service.get_hotel(1).await.is_none());

    let telemetry = service.telemetry();
    assert_eq!(telemetry.calls_err, 2);
    assert_eq!(telemetry.fixture_served, 0);
    // secondary was never needed
    assert!(secondary.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn unreachable_gateways_fall_back_to_fixtures() {
    // every candidate, loopback defaults included, fails its handshake
    let resolver = EndpointResolver::new(&ClientConfig::local(), Arc::new(Unreachable));
    let provider = Arc::new(MemoryIdentityProvider::new());
    let session = Arc::new(SessionManager::new(DEFAULT_CANISTER_ID, resolver, provider));
    let sources = Sources::new(
        Arc::new(FixtureBackend::empty()),
        Some(Arc::new(FixtureBackend::new())),
    );
    let service = HotelService::new(session, sources);

    let snapshot = service.init().await;
    assert!(snapshot.degraded);
    assert!(snapshot.endpoint.is_none());

    let hotels = service.get_hotels().await;
    assert_eq!(hotels.len(), 4);
    assert!(hotels.iter().any(|h| h.location == "Singapore"));
    assert!(service.telemetry().fixture_served >= 1);
}
