//! Router tests: requests are driven through the axum router with `oneshot`.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use satya::analysis::LatencyProfile;
use satya::api::{router, AppState};
use satya::config::AppConfig;

const BOUNDARY: &str = "satya-test-boundary";

fn app_with(config: AppConfig) -> Router {
    router(AppState::new(&config))
}

fn instant_app() -> Router {
    let mut config = AppConfig::default();
    config.analysis.latency = LatencyProfile::instant();
    app_with(config)
}

fn multipart_body(file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(kind: &str, file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(format!("/api/analyze/{}", kind))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(file_name, content_type, data)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, req).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

/// Upload and wait until the background analysis has finished.
async fn upload_and_wait(app: &Router, kind: &str, file_name: &str, content_type: &str) -> Value {
    let (status, body) = send_json(app, upload_request(kind, file_name, content_type, b"fake media")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = body["analysis_id"].as_str().unwrap().to_string();

    for _ in 0..100 {
        let (status, result) = send_json(app, get(&format!("/api/analysis/{}", id))).await;
        if status == StatusCode::OK {
            return result;
        }
        assert_eq!(status, StatusCode::ACCEPTED);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("analysis {} never completed", id);
}

#[tokio::test]
async fn test_root_and_health() {
    let app = instant_app();
    let (status, body) = send_json(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("Satya"));

    let (status, body) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_upload_is_accepted_then_pending() {
    // Default latency keeps the analysis running for over a second.
    let app = app_with(AppConfig::default());
    let (status, body) = send_json(&app, upload_request("image", "face.jpg", "image/jpeg", b"jpeg")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["message"], "Analysis started");
    let id = body["analysis_id"].as_str().unwrap();
    assert!(id.starts_with("image-"));

    let (status, body) = send_json(&app, get(&format!("/api/analysis/{}", id))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "processing");
    assert_eq!(body["media_type"], "image");
}

#[tokio::test]
async fn test_upload_completes() {
    let app = instant_app();
    let result = upload_and_wait(&app, "video", "clip.mp4", "video/mp4").await;
    assert_eq!(result["media_type"], "video");
    let confidence = result["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert!(result["details"]["temporal_analysis"].is_number());
}

#[tokio::test]
async fn test_upload_wrong_type_is_rejected() {
    let app = instant_app();
    let (status, body) = send_json(&app, upload_request("audio", "face.jpg", "image/jpeg", b"jpeg")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert!(body["error"].as_str().unwrap().contains("audio/"));
    assert_eq!(body["notice"]["title"], "Invalid File");
}

#[tokio::test]
async fn test_upload_too_large_is_rejected() {
    let mut config = AppConfig::default();
    config.server.max_upload_bytes = 1024;
    let app = app_with(config);

    let req = upload_request("image", "big.png", "image/png", &[0u8; 2048]);
    let (status, body) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["notice"]["title"], "File Too Large");

    let (_, stats) = send_json(&app, get("/api/stats")).await;
    assert_eq!(stats["total_analyses"], 0);
}

#[tokio::test]
async fn test_missing_file_field() {
    let app = instant_app();
    let body = format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{BOUNDARY}--\r\n");
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/analyze/image")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_analysis_is_404() {
    let app = instant_app();
    let (status, body) = send_json(&app, get("/api/analysis/image-1-missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Analysis not found");

    let req = Request::builder()
        .method(Method::DELETE)
        .uri("/api/analysis/image-1-missing")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_filter_and_delete() {
    let app = instant_app();
    let image = upload_and_wait(&app, "image", "a.png", "image/png").await;
    upload_and_wait(&app, "audio", "a.wav", "audio/wav").await;

    let (status, all) = send_json(&app, get("/api/analysis")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, images) = send_json(&app, get("/api/analysis?media_type=image&limit=5")).await;
    let images = images.as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["id"], image["id"]);

    let id = image["id"].as_str().unwrap();
    let req = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/analysis/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Analysis deleted");

    let (status, _) = send_json(&app, get(&format!("/api/analysis/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_rejects_bad_query() {
    let app = instant_app();
    let (status, _) = send_json(&app, get("/api/analysis?limit=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send_json(&app, get("/api/analysis?limit=101")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send_json(&app, get("/api/analysis?media_type=hologram")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webcam_session_counts_frames() {
    let app = instant_app();
    let frame = "data:image/jpeg;base64,/9j/4AAQSkZJRgABAQ==";

    let (status, first) = send_json(&app, post_json("/api/analyze/webcam", json!({ "frame_data": frame }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["frames_analyzed"], 1);
    let session = first["session_id"].as_str().unwrap().to_string();
    assert!(session.starts_with("session-"));

    let (_, second) = send_json(
        &app,
        post_json(
            "/api/analyze/webcam",
            json!({ "frame_data": frame, "session_id": session }),
        ),
    )
    .await;
    assert_eq!(second["session_id"], session.as_str());
    assert_eq!(second["frames_analyzed"], 2);

    let (_, stats) = send_json(&app, get("/api/stats")).await;
    assert_eq!(stats["active_webcam_sessions"], 1);
}

#[tokio::test]
async fn test_webcam_rejects_bad_frame() {
    let app = instant_app();
    let (status, _) = send_json(
        &app,
        post_json("/api/analyze/webcam", json!({ "frame_data": "data:image/jpeg;base64,@@@" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_counts_by_media_type() {
    let app = instant_app();
    upload_and_wait(&app, "image", "a.png", "image/png").await;
    upload_and_wait(&app, "image", "b.png", "image/png").await;
    upload_and_wait(&app, "video", "c.mp4", "video/mp4").await;

    let (status, stats) = send_json(&app, get("/api/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_analyses"], 3);
    assert_eq!(stats["media_type_counts"]["image"], 2);
    assert_eq!(stats["media_type_counts"]["video"], 1);
    assert!(stats["deepfake_count"].as_u64().unwrap() <= 3);
}

#[tokio::test]
async fn test_overlay_svg() {
    let app = instant_app();
    let result = upload_and_wait(&app, "image", "a.png", "image/png").await;
    let id = result["id"].as_str().unwrap();

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/analysis/{}/overlay.svg?width=320&height=240", id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/svg+xml");
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let svg = String::from_utf8(body.to_vec()).unwrap();
    assert!(svg.starts_with("<svg"));
    assert!(svg.contains(r#"width="320""#));
    // One box, one label strip, one label per area.
    let areas = result["areas"].as_array().unwrap().len();
    assert_eq!(svg.matches("<text").count(), areas);

    let (status, _) = send(&app, get(&format!("/api/analysis/{}/overlay.svg?width=0", id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_assistant() {
    let app = instant_app();
    let (status, body) = send_json(&app, post_json("/api/assistant", json!({ "message": "hi" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["reply"].as_str().unwrap().contains("Satya Mate"));
}

#[tokio::test]
async fn test_sensitivity_field() {
    let app = instant_app();
    let upload = |sensitivity: &str| {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"sensitivity\"\r\n\r\n{sensitivity}\r\n"
        )
        .into_bytes();
        body.extend(multipart_body("face.jpg", "image/jpeg", b"jpeg"));
        Request::builder()
            .method(Method::POST)
            .uri("/api/analyze/image")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    };

    let (status, _) = send_json(&app, upload("0.9")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send_json(&app, upload("1.5")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("sensitivity"));
}
