//! The Prometheus recorder is process-global, so this lives in its own test
//! binary.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use tidepool::{Config, RelayServer};
use tower::ServiceExt;

#[test_timeout::tokio_timeout_test]
async fn relay_counters_reach_the_metrics_route() {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("install recorder");
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    };
    let server = RelayServer::bind(config)
        .await
        .expect("bind relay")
        .with_metrics(handle);
    let relay = server.relay().clone();

    let (a, _rx_a) = relay.connect(None);
    let (b, _rx_b) = relay.connect(None);
    relay.join_pool(&a, "room1").unwrap();
    relay.join_pool(&b, "room1").unwrap();
    relay.relay_offer(&a, &b, json!({}), "room1").unwrap();

    let response = server
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let rendered = String::from_utf8(body.to_vec()).unwrap();
    assert!(
        rendered.contains("tidepool_connections_total 2"),
        "rendered: {rendered}"
    );
    assert!(rendered.contains("tidepool_offers_relayed_total 1"));
    assert!(rendered.contains("tidepool_peers_connected"));
}
