mod common;

use std::time::Duration;

use butler::{Backend, Config};

use common::*;

fn registrar_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        listen: 0,
        registrar: true,
        registrar_listen: 0,
        ..Config::default()
    }
}

#[tokio::test]
async fn admitted_backend_receives_proxied_traffic() {
    // The backend serves the testdata directory, which includes a `health`
    // file, so its `GET /health` genuinely answers 200.
    let (backend_server, backend_addr) = start_server(doc_root_config()).await;

    let (server, addr) = start_server(registrar_config()).await;
    let registrar_addr = server
        .registrar_addr()
        .await
        .expect("registrar listener should bind");

    let backend = Backend::new(backend_addr.to_string(), "/");
    let client = reqwest::Client::new();

    let response = client
        .put(format!("http://{registrar_addr}/backends"))
        .json(&backend)
        .send()
        .await
        .expect("admission request");
    assert_eq!(response.status().as_u16(), 204);

    wait_for_backends(&server, 1).await;

    let response = roundtrip(addr, "GET / HTTP/1.1\n\n").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, INDEX_HTML);

    // Repeating the PUT must not double-register the backend.
    let response = client
        .put(format!("http://{registrar_addr}/backends"))
        .json(&backend)
        .send()
        .await
        .expect("second admission request");
    assert_eq!(response.status().as_u16(), 204);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.backends().await.len(), 1);

    server.close();
    backend_server.close();
}

#[tokio::test]
async fn admission_rejects_unknown_routes() {
    let (server, _) = start_server(registrar_config()).await;
    let registrar_addr = server.registrar_addr().await.expect("registrar addr");
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{registrar_addr}/backends"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status().as_u16(), 404);

    let response = client
        .put(format!("http://{registrar_addr}/other"))
        .header("Content-Type", "application/json")
        .body("{}")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status().as_u16(), 404);

    server.close();
}

#[tokio::test]
async fn admission_requires_a_json_content_type() {
    let (server, _) = start_server(registrar_config()).await;
    let registrar_addr = server.registrar_addr().await.expect("registrar addr");
    let client = reqwest::Client::new();

    let response = client
        .put(format!("http://{registrar_addr}/backends"))
        .body(r#"{"Addr":"localhost:9000","Path":"/"}"#)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status().as_u16(), 415);

    server.close();
}

#[tokio::test]
async fn admission_rejects_a_malformed_body() {
    let (server, _) = start_server(registrar_config()).await;
    let registrar_addr = server.registrar_addr().await.expect("registrar addr");
    let client = reqwest::Client::new();

    let response = client
        .put(format!("http://{registrar_addr}/backends"))
        .header("Content-Type", "application/json")
        .body("not json at all")
        .send()
        .await
        .expect("request");

    assert_eq!(response.status().as_u16(), 400);

    server.close();
}

#[tokio::test]
async fn admission_rejects_an_unreachable_backend() {
    let (server, _) = start_server(registrar_config()).await;
    let registrar_addr = server.registrar_addr().await.expect("registrar addr");
    let client = reqwest::Client::new();

    let backend = Backend::new("localhost:42069", "/");
    let response = client
        .put(format!("http://{registrar_addr}/backends"))
        .json(&backend)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status().as_u16(), 400);
    assert!(server.backends().await.is_empty());

    server.close();
}
