//! Tests for the generative endpoint, the frontend bundle and CORS.

use axum::http::{header, StatusCode};
use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn generative_request_is_wrapped_and_answered() {
    let (backend, recorder) = common::start_mock_backend().await;
    let uploads = tempfile::tempdir().unwrap();
    let mut config = common::relay_config(backend, uploads.path());
    config.generative.url = Some(format!("http://{backend}/generate"));
    config.generative.api_key = Some("test-key".into());
    let (relay, shutdown) = common::start_relay(config).await;

    let res = common::client()
        .post(format!("http://{relay}/api/gemini"))
        .json(&json!({ "text": "이 메모를 요약해줘" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["candidates"][0]["content"]["parts"][0]["text"], "요약");

    let seen = recorder.last();
    assert_eq!(seen.uri, "/generate?key=test-key");
    let sent: Value = serde_json::from_slice(&seen.body).unwrap();
    assert_eq!(sent, json!({ "contents": [{ "parts": [{ "text": "이 메모를 요약해줘" }] }] }));

    shutdown.trigger();
}

#[tokio::test]
async fn unconfigured_generative_endpoint_fails_cleanly() {
    let (backend, recorder) = common::start_mock_backend().await;
    let uploads = tempfile::tempdir().unwrap();
    let (relay, shutdown) = common::start_relay(common::relay_config(backend, uploads.path())).await;

    let res = common::client()
        .post(format!("http://{relay}/api/gemini"))
        .json(&json!({ "text": "hi" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["result"], false);
    assert_eq!(body["message"], "서버 오류가 발생했습니다. 나중에 다시 시도해주세요.");
    assert!(recorder.all().is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn frontend_bundle_serves_navigations_and_relays_api_calls() {
    let (backend, recorder) = common::start_mock_backend().await;
    let uploads = tempfile::tempdir().unwrap();
    let bundle = tempfile::tempdir().unwrap();
    std::fs::write(bundle.path().join("index.html"), "<html>memo app</html>").unwrap();
    std::fs::create_dir(bundle.path().join("assets")).unwrap();
    std::fs::write(bundle.path().join("assets/app.js"), "console.log('memo')").unwrap();

    let mut config = common::relay_config(backend, uploads.path());
    config.relay.static_dir = Some(bundle.path().to_path_buf());
    let (relay, shutdown) = common::start_relay(config).await;
    let client = common::client();

    // Client-side route: not a file, so the bundle's index.html answers.
    let page = client
        .get(format!("http://{relay}/user/memos"))
        .header(header::ACCEPT, "text/html,application/xhtml+xml")
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    assert_eq!(page.text().await.unwrap(), "<html>memo app</html>");

    let asset = client
        .get(format!("http://{relay}/assets/app.js"))
        .header(header::ACCEPT, "*/*")
        .send()
        .await
        .unwrap();
    assert_eq!(asset.status(), StatusCode::OK);
    assert_eq!(asset.text().await.unwrap(), "console.log('memo')");
    assert!(recorder.all().is_empty());

    let api = client
        .get(format!("http://{relay}/user/memos"))
        .header(header::ACCEPT, "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(api.status(), StatusCode::OK);
    assert_eq!(recorder.last().uri, "/user/memos");

    let write = client
        .post(format!("http://{relay}/memo/write"))
        .header(header::ACCEPT, "application/json")
        .json(&json!({ "title": "t" }))
        .send()
        .await
        .unwrap();
    assert_eq!(write.status(), StatusCode::OK);
    assert_eq!(recorder.last().method, axum::http::Method::POST);

    shutdown.trigger();
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin_with_credentials() {
    let (backend, _recorder) = common::start_mock_backend().await;
    let uploads = tempfile::tempdir().unwrap();
    let mut config = common::relay_config(backend, uploads.path());
    config.listener.cors_origins = vec!["http://localhost:3000".into()];
    let (relay, shutdown) = common::start_relay(config).await;

    let res = common::client()
        .request(reqwest::Method::OPTIONS, format!("http://{relay}/memo/list"))
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let other = common::client()
        .get(format!("http://{relay}/memo/list"))
        .header(header::ORIGIN, "http://evil.example")
        .header(header::ACCEPT, "application/json")
        .send()
        .await
        .unwrap();
    assert!(other.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

    shutdown.trigger();
}
