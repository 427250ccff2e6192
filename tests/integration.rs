use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use moto_ride::api::rest::router;
use moto_ride::config::Config;
use moto_ride::gateway::memory::MemoryGateway;
use moto_ride::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Latitude offset of roughly five kilometres along a meridian.
const FIVE_KM_LAT: f64 = 5.0 / 111.194_926_644_558_73;

fn setup(gateway: &Arc<MemoryGateway>) -> Router {
    let state = AppState::new(Config::default(), gateway.clone(), None);
    router(Arc::new(state))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn sign_up(app: &Router, name: &str, role: &str) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/session/sign-up",
            json!({
                "email": format!("{name}@example.com"),
                "password": "secret",
                "name": name,
                "phone": "11 99999-0000",
                "role": role
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

fn ride_request() -> Value {
    json!({
        "origin": {
            "label": "Praça da Sé",
            "point": { "lat": -23.5505, "lng": -46.6333 }
        },
        "destination": {
            "label": "Vila Mariana",
            "point": { "lat": -23.5505 - FIVE_KM_LAT, "lng": -46.6333 }
        },
        "service_type": "person"
    })
}

fn approx(value: &Value, expected: f64) -> bool {
    value.as_f64().is_some_and(|v| (v - expected).abs() < 1e-6)
}

#[tokio::test]
async fn health_returns_ok() {
    let gateway = Arc::new(MemoryGateway::seeded(64));
    let app = setup(&gateway);

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend_configured"], false);
    assert!(body["role"].is_null());
}

#[tokio::test]
async fn metrics_returns_prometheus_text() {
    let gateway = Arc::new(MemoryGateway::seeded(64));
    let app = setup(&gateway);

    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("pool_size"));
}

#[tokio::test]
async fn role_routes_require_a_session() {
    let gateway = Arc::new(MemoryGateway::seeded(64));
    let app = setup(&gateway);

    let response = app
        .clone()
        .oneshot(get_request("/client/rides/active"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.oneshot(get_request("/session")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_role_is_forbidden() {
    let gateway = Arc::new(MemoryGateway::seeded(64));
    let app = setup(&gateway);
    sign_up(&app, "bruno", "courier").await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/client/rides", ride_request()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(get_request("/admin/dashboard"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn client_requests_a_quoted_ride() {
    let gateway = Arc::new(MemoryGateway::seeded(64));
    let app = setup(&gateway);
    sign_up(&app, "ana", "client").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/geo/quote",
            json!({
                "origin": { "lat": -23.5505, "lng": -46.6333 },
                "destination": { "lat": -23.5505 - FIVE_KM_LAT, "lng": -46.6333 },
                "service_type": "person"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let quote = body_json(response).await;
    assert!(approx(&quote["estimated_price"], 25.50));

    let response = app
        .clone()
        .oneshot(json_request("POST", "/client/rides", ride_request()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let active = body_json(response).await;
    assert_eq!(active["ride"]["status"], "pending");
    assert!(approx(&active["ride"]["estimated_price"], 25.50));
    assert!(active["counterpart"].is_null());

    let response = app
        .clone()
        .oneshot(get_request("/client/rides/active"))
        .await
        .unwrap();
    let tracked = body_json(response).await;
    assert_eq!(tracked["ride"]["id"], active["ride"]["id"]);

    let response = app
        .oneshot(json_request("POST", "/client/rides", ride_request()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ride_without_coordinates_is_rejected() {
    let gateway = Arc::new(MemoryGateway::seeded(64));
    let app = setup(&gateway);
    sign_up(&app, "ana", "client").await;

    let mut request = ride_request();
    request["origin"]["point"] = Value::Null;

    let response = app
        .oneshot(json_request("POST", "/client/rides", request))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn only_one_courier_wins_the_ride() {
    let gateway = Arc::new(MemoryGateway::seeded(64));
    let client = setup(&gateway);
    let first = setup(&gateway);
    let second = setup(&gateway);
    sign_up(&client, "ana", "client").await;
    sign_up(&first, "bruno", "courier").await;
    sign_up(&second, "carla", "courier").await;

    let response = client
        .clone()
        .oneshot(json_request("POST", "/client/rides", ride_request()))
        .await
        .unwrap();
    let ride_id = body_json(response).await["ride"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = first
        .clone()
        .oneshot(empty_request("POST", "/courier/pool/refresh"))
        .await
        .unwrap();
    let pool = body_json(response).await;
    assert_eq!(pool[0]["ride"]["id"], ride_id.as_str());
    assert_eq!(pool[0]["requester_name"], "ana");

    let response = first
        .clone()
        .oneshot(empty_request("POST", &format!("/courier/pool/{ride_id}/accept")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = body_json(response).await;
    assert_eq!(accepted["ride"]["status"], "accepted");
    assert_eq!(accepted["counterpart"]["name"], "ana");

    let response = second
        .clone()
        .oneshot(empty_request("POST", &format!("/courier/pool/{ride_id}/accept")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "race_lost");

    let response = second
        .oneshot(get_request("/courier/pool"))
        .await
        .unwrap();
    let pool = body_json(response).await;
    assert_eq!(pool.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn courier_completes_and_settles_a_ride() {
    let gateway = Arc::new(MemoryGateway::seeded(64));
    let client = setup(&gateway);
    let courier = setup(&gateway);
    sign_up(&client, "ana", "client").await;
    sign_up(&courier, "bruno", "courier").await;

    let response = client
        .clone()
        .oneshot(json_request("POST", "/client/rides", ride_request()))
        .await
        .unwrap();
    let ride_id = body_json(response).await["ride"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    courier
        .clone()
        .oneshot(empty_request("POST", &format!("/courier/pool/{ride_id}/accept")))
        .await
        .unwrap();

    let response = courier
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/courier/rides/{ride_id}/status"),
            json!({ "status": "completed" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    for status in ["in_progress", "completed"] {
        let response = courier
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/courier/rides/{ride_id}/status"),
                json!({ "status": status }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = courier
        .clone()
        .oneshot(get_request("/courier/rides/active"))
        .await
        .unwrap();
    assert!(body_json(response).await.is_null());

    let response = courier
        .clone()
        .oneshot(get_request("/courier/history"))
        .await
        .unwrap();
    let history = body_json(response).await;
    assert_eq!(history["earnings"]["completed_rides"], 1);
    assert!(approx(&history["earnings"]["total"], 25.50));

    let response = courier
        .oneshot(empty_request(
            "POST",
            &format!("/courier/balance/{ride_id}/settle"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let balance = body_json(response).await;
    assert!(approx(&balance["total"], 25.50 * 0.8));

    let response = client
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/client/history/{ride_id}/rating"),
            json!({ "rating": 7 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .oneshot(json_request(
            "POST",
            &format!("/client/history/{ride_id}/rating"),
            json!({ "rating": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["rating"], 5);
}

#[tokio::test]
async fn admin_actions_are_audited_and_bans_block_sign_in() {
    let gateway = Arc::new(MemoryGateway::seeded(64));
    let admin = setup(&gateway);
    let client = setup(&gateway);
    let courier = setup(&gateway);
    sign_up(&admin, "root", "admin").await;
    let client_info = sign_up(&client, "ana", "client").await;
    let courier_info = sign_up(&courier, "bruno", "courier").await;

    let client_id = client_info["user_id"].as_str().unwrap();
    let courier_id = courier_info["user_id"].as_str().unwrap();

    let response = admin
        .clone()
        .oneshot(empty_request(
            "POST",
            &format!("/admin/couriers/{courier_id}/approve"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = admin
        .clone()
        .oneshot(empty_request("POST", &format!("/admin/users/{client_id}/ban")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let actions: Vec<String> = gateway
        .audit_log()
        .await
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(actions, vec!["approve_courier", "ban_user"]);

    let response = admin
        .clone()
        .oneshot(empty_request("POST", "/admin/stats/refresh"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let dashboard = body_json(response).await;
    assert_eq!(dashboard["stats"]["total_users"], 3);
    assert_eq!(dashboard["users"].as_array().unwrap().len(), 3);

    let response = setup(&gateway)
        .oneshot(json_request(
            "POST",
            "/session/sign-in",
            json!({ "email": "ana@example.com", "password": "secret" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn sign_out_closes_the_session() {
    let gateway = Arc::new(MemoryGateway::seeded(64));
    let app = setup(&gateway);
    sign_up(&app, "ana", "client").await;

    let response = app
        .clone()
        .oneshot(empty_request("POST", "/session/sign-out"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(get_request("/client/rides/active"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(json_request(
            "POST",
            "/session/sign-in",
            json!({ "email": "ana@example.com", "password": "secret" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["profile"]["role"], "client");
}

#[tokio::test]
async fn geo_routes_fall_back_without_provider() {
    let gateway = Arc::new(MemoryGateway::seeded(64));
    let app = setup(&gateway);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/geo/address",
            json!({ "point": { "lat": -23.5505, "lng": -46.6333 } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["address"], "Lat: -23.5505, Lng: -46.6333");

    let response = app
        .clone()
        .oneshot(get_request("/geo/search?q=paulista"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["point"].is_null());

    let response = app
        .oneshot(get_request("/geo/search?q=%20"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
