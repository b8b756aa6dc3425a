//! Router-level behaviour of the built-in routes.

use apiserver::routes::{self, Status, Widget};
use apiserver::server::router::{self, RouterSettings};
use apiserver::Config;
use axum::http::StatusCode;
use axum_test::TestServer;
use bytes::Bytes;
use common::RestError;
use serde_json::json;

fn server() -> TestServer {
    let app = router::build(&routes::table(), &RouterSettings::from(&Config::default()))
        .expect("route table is valid");
    TestServer::new(app).expect("test server")
}

#[tokio::test]
async fn status_returns_version() {
    let server = server();
    let resp = server
        .get("/api/v1/status")
        .content_type("application/json")
        .await;

    resp.assert_status(StatusCode::OK);
    assert_eq!(
        resp.json::<Status>().version,
        env!("CARGO_PKG_VERSION").to_owned()
    );
}

#[tokio::test]
async fn create_widget_returns_201() {
    let server = server();
    let resp = server
        .post("/api/v1/widgets")
        .json(&json!({"name": "x"}))
        .await;

    resp.assert_status(StatusCode::CREATED);
    assert_eq!(
        resp.json::<Widget>(),
        Widget {
            id: "w1".into(),
            name: "x".into()
        }
    );

    let next = server
        .post("/api/v1/widgets")
        .json(&json!({"name": "y"}))
        .await;
    assert_eq!(next.json::<Widget>().id, "w2");
}

#[tokio::test]
async fn malformed_body_is_400() {
    let server = server();
    let resp = server
        .post("/api/v1/widgets")
        .bytes(Bytes::from_static(b"not-json"))
        .content_type("application/json")
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    assert!(!resp.json::<RestError>().message.is_empty());
}

#[tokio::test]
async fn empty_name_is_400() {
    let server = server();
    let resp = server
        .post("/api/v1/widgets")
        .json(&json!({"name": ""}))
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.json::<RestError>().message,
        "name must not be empty"
    );
}

#[tokio::test]
async fn unknown_path_is_404() {
    let server = server();
    let resp = server.get("/unknown").await;

    resp.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(resp.json::<RestError>().message, "Not found");
}

#[tokio::test]
async fn wrong_content_type_is_404() {
    let server = server();
    let resp = server
        .post("/api/v1/widgets")
        .bytes(Bytes::from_static(br#"{"name":"x"}"#))
        .content_type("text/plain")
        .await;

    resp.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrong_method_is_404() {
    let server = server();
    let resp = server
        .delete("/api/v1/widgets")
        .content_type("application/json")
        .await;

    resp.assert_status(StatusCode::NOT_FOUND);
}
