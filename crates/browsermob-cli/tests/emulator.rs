//! Raw HTTP behaviour of the emulator.

use std::time::Duration;

use browsermob_cli::emulator::{EmulatorConfig, EmulatorHandle, EmulatorServer};

async fn emulator(ready_delay: Duration) -> EmulatorHandle {
    EmulatorServer::new(EmulatorConfig {
        addr: "127.0.0.1:0".parse().unwrap(),
        ready_delay,
        ..Default::default()
    })
    .spawn()
    .await
    .unwrap()
}

#[tokio::test]
async fn test_unavailable_until_ready() {
    let emu = emulator(Duration::from_millis(300)).await;
    let http = reqwest::Client::new();
    let url = format!("{}/proxy", emu.url());

    let resp = http.get(&url).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);

    tokio::time::sleep(Duration::from_millis(350)).await;
    let resp = http.get(&url).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"proxyList": []}));
}

#[tokio::test]
async fn test_allocate_with_query_port_and_empty_har() {
    let emu = emulator(Duration::ZERO).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{}/proxy?port=9300", emu.url()))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["port"], 9300);

    let resp = http
        .get(format!("{}/proxy/9300/har", emu.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);
    assert!(resp.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_requests() {
    let emu = emulator(Duration::ZERO).await;
    let http = reqwest::Client::new();
    http.post(format!("{}/proxy", emu.url()))
        .send()
        .await
        .unwrap();

    let resp = http
        .put(format!("{}/proxy/9091/limit", emu.url()))
        .form(&[("latency", "soon")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = http
        .put(format!("{}/proxy/9091/whitelist", emu.url()))
        .form(&[("status", "200")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = http
        .get(format!("{}/proxy/9091/nothing", emu.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = http
        .get(format!("{}/proxy/9091/limit", emu.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 405);
}
