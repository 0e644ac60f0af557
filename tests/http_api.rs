//! HTTP surface of the analysis endpoint against mocked vision providers.

use actix_web::{App, http::StatusCode, test};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plant_vision::config::{AppConfig, VisionProvider};
use plant_vision::{AppState, configure, cors_headers};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/functions/v1/plant-disease-detection";
const UPLOAD: &str = "/api/v1/analyze/upload";
const BOUNDARY: &str = "leaf-boundary-7MA4YWxk";

fn gemini_config(base_url: &str, api_key: Option<&str>) -> AppConfig {
    let mut config = AppConfig::from_lookup(|_| None).unwrap();
    config.vision.provider = VisionProvider::Gemini;
    config.vision.gemini_base_url = base_url.to_string();
    config.vision.gemini_api_key = api_key.map(str::to_string);
    config
}

fn gemini_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }], "role": "model" }
        }]
    })
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([30, 140, 50])));
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

/// One-part `multipart/form-data` body; `filename: None` sends a plain text field.
fn multipart_body(name: &str, filename: Option<&str>, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    let disposition = match filename {
        Some(file) => format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            name, file
        ),
        None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", name),
    };
    body.extend_from_slice(disposition.as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> test::TestRequest {
    test::TestRequest::post()
        .uri(UPLOAD)
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(body)
}

macro_rules! app {
    ($config:expr) => {
        test::init_service(
            App::new()
                .wrap(cors_headers())
                .configure(configure(AppState::from_config(&$config))),
        )
        .await
    };
}

#[actix_web::test]
async fn preflight_answers_empty_ok_with_cors_headers() {
    let app = app!(gemini_config("http://127.0.0.1:1", None));

    let req = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri(ENDPOINT)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(
        resp.headers().get("access-control-allow-headers").unwrap(),
        "authorization, x-client-info, apikey, content-type"
    );
    let body = test::read_body(resp).await;
    assert!(body.is_empty());
}

#[actix_web::test]
async fn missing_credential_returns_structured_error_without_upstream_call() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("{}")))
        .expect(0)
        .mount(&upstream)
        .await;

    let app = app!(gemini_config(&upstream.uri(), None));
    let req = test::TestRequest::post()
        .uri(ENDPOINT)
        .set_json(json!({ "imageBase64": "data:image/jpeg;base64,AAAA" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Gemini API key not configured");
    assert_eq!(body["disease"], "Error");
    assert_eq!(body["confidence"], 0);
    assert_eq!(body["severity"], "Medium");
}

#[actix_web::test]
async fn coerces_out_of_range_gemini_reply() {
    let upstream = MockServer::start().await;
    let reply = r#"Sure! {"disease":"Leaf Blight","confidence":130,"severity":"unknown","symptoms":"Brown lesions","causes":"Fungal infection","treatment":"Apply copper fungicide"} Let me know."#;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply(reply)))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = app!(gemini_config(&upstream.uri(), Some("test-key")));
    let req = test::TestRequest::post()
        .uri(ENDPOINT)
        .set_json(json!({ "imageBase64": "data:image/jpeg;base64,AAAA" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["disease"], "Leaf Blight");
    assert_eq!(body["confidence"], 100);
    assert_eq!(body["severity"], "Medium");
    assert_eq!(body["symptoms"], "Brown lesions");
    assert_eq!(body["causes"], "Fungal infection");
    assert_eq!(body["treatment"], "Apply copper fungicide");
    assert_eq!(body["degraded"], true);

    let requests = upstream.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let parts = &sent["contents"][0]["parts"];
    assert!(parts[0]["text"].as_str().unwrap().contains("\"severity\""));
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
    assert_eq!(parts[1]["inline_data"]["data"], "AAAA");
}

#[actix_web::test]
async fn prose_only_reply_returns_parse_fallback_with_ok_status() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(gemini_reply("I am not able to see a plant here.")),
        )
        .mount(&upstream)
        .await;

    let app = app!(gemini_config(&upstream.uri(), Some("test-key")));
    let req = test::TestRequest::post()
        .uri("/api/v1/analyze")
        .set_json(json!({ "imageBase64": "AAAA" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["disease"], "Analysis Error");
    assert_eq!(body["confidence"], 0);
    assert_eq!(body["severity"], "Medium");
    assert_eq!(body["treatment"], "Please try uploading a clearer image of the plant");
}

#[actix_web::test]
async fn upstream_error_status_becomes_error_body() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = app!(gemini_config(&upstream.uri(), Some("test-key")));
    let req = test::TestRequest::post()
        .uri(ENDPOINT)
        .set_json(json!({ "imageBase64": "AAAA" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Gemini API error: 429");
    assert_eq!(body["disease"], "Error");
    assert_eq!(body["symptoms"], "Analysis failed");
}

#[actix_web::test]
async fn malformed_body_is_treated_as_missing_image() {
    let app = app!(gemini_config("http://127.0.0.1:1", Some("test-key")));
    let req = test::TestRequest::post()
        .uri(ENDPOINT)
        .insert_header(("content-type", "application/json"))
        .set_payload("not json")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "No image provided");
}

#[actix_web::test]
async fn openai_provider_reads_chat_completion_content() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "{\"disease\":\"Healthy\",\"confidence\":96,\"severity\":\"Low\",\"symptoms\":\"None\",\"causes\":\"None\",\"treatment\":\"Continue regular care\"}"
                }
            }]
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut config = AppConfig::from_lookup(|_| None).unwrap();
    config.vision.provider = VisionProvider::OpenAi;
    config.vision.openai_api_key = Some("sk-test".to_string());
    config.vision.openai_base_url = upstream.uri();

    let app = app!(config);
    let req = test::TestRequest::post()
        .uri(ENDPOINT)
        .set_json(json!({ "imageBase64": "data:image/png;base64,AAAA" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["disease"], "Healthy");
    assert_eq!(body["confidence"], 96);
    assert_eq!(body["severity"], "Low");
    assert!(body.get("degraded").is_none());
}

#[actix_web::test]
async fn health_reports_provider_state() {
    let app = app!(gemini_config("http://127.0.0.1:1", None));
    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["provider"], "gemini");
    assert_eq!(body["vision_configured"], false);
}

#[actix_web::test]
async fn multipart_png_upload_is_analyzed() {
    let upstream = MockServer::start().await;
    let reply = r#"{"disease":"Septoria Leaf Spot","confidence":82,"severity":"Medium","symptoms":"Small dark spots","causes":"Fungus","treatment":"Remove lower leaves"}"#;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply(reply)))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = app!(gemini_config(&upstream.uri(), Some("test-key")));
    let body = multipart_body("file", Some("leaf.png"), "image/png", &png(16, 16));
    let resp = test::call_service(&app, upload_request(body).to_request()).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["disease"], "Septoria Leaf Spot");
    assert_eq!(body["confidence"], 82);

    let requests = upstream.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
}

#[actix_web::test]
async fn multipart_upload_over_the_image_limit_is_rejected() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("{}")))
        .expect(0)
        .mount(&upstream)
        .await;

    let mut config = gemini_config(&upstream.uri(), Some("test-key"));
    config.server.max_image_bytes = 64;
    let app = app!(config);
    let body = multipart_body("file", Some("leaf.png"), "image/png", &[0x89u8; 4096]);
    let resp = test::call_service(&app, upload_request(body).to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("File size must be less than"));
    assert_eq!(body["disease"], "Error");
    assert_eq!(body["severity"], "Medium");
}

#[actix_web::test]
async fn multipart_non_image_upload_is_rejected() {
    let app = app!(gemini_config("http://127.0.0.1:1", Some("test-key")));
    let body = multipart_body("file", Some("notes.txt"), "text/plain", b"just some notes about my tomatoes");
    let resp = test::call_service(&app, upload_request(body).to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Image processing error: Invalid image format")
    );
    assert_eq!(body["disease"], "Error");
}

#[actix_web::test]
async fn multipart_without_file_field_reports_missing_image() {
    let app = app!(gemini_config("http://127.0.0.1:1", Some("test-key")));
    let body = multipart_body("note", None, "text/plain", b"no file here");
    let resp = test::call_service(&app, upload_request(body).to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Image processing error: No image provided");
}

#[actix_web::test]
async fn malformed_multipart_keeps_the_failure_shape() {
    let app = app!(gemini_config("http://127.0.0.1:1", Some("test-key")));
    let req = test::TestRequest::post()
        .uri(UPLOAD)
        .insert_header(("content-type", "multipart/form-data"))
        .set_payload("garbage")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("Image processing error: Invalid upload"));
    assert_eq!(body["disease"], "Error");
}

#[actix_web::test]
async fn oversized_json_body_keeps_the_failure_shape() {
    let mut config = gemini_config("http://127.0.0.1:1", Some("test-key"));
    config.server.max_body_bytes = 1024;
    let app = app!(config);
    let req = test::TestRequest::post()
        .uri(ENDPOINT)
        .set_json(json!({ "imageBase64": "A".repeat(4096) }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Request body exceeds 1024 bytes");
    assert_eq!(body["disease"], "Error");
    assert_eq!(body["confidence"], 0);
}
