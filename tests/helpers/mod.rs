//! Shared helpers for router tests against in-memory backends.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use gym_asset_register::app_state::AppState;
use gym_asset_register::auth::AuthConfig;
use gym_asset_register::routes;
use gym_asset_register::services::image_store::MemoryImageStore;
use gym_asset_register::services::job_manager::{AnalysisManager, AnalysisSettings, Backoff};
use gym_asset_register::services::queue::MemoryJobQueue;
use gym_asset_register::services::vision::{VisionAnalyzer, VisionError};
use gym_asset_register::store::memory::MemoryStore;
use gym_asset_register::worker::Worker;

pub const API_KEY: &str = "test-api-key";
pub const JWT_SECRET: &str = "test-jwt-secret";
pub const BOUNDARY: &str = "gym-asset-test-boundary";

/// Vision double that hands out queued replies, then a fixed fallback.
pub struct FakeVision {
    replies: Mutex<Vec<Result<serde_json::Value, VisionError>>>,
    fallback: serde_json::Value,
    calls: AtomicUsize,
}

impl FakeVision {
    pub fn answering(fallback: serde_json::Value) -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue one reply ahead of the fallback.
    pub async fn push(&self, reply: Result<serde_json::Value, VisionError>) {
        self.replies.lock().await.insert(0, reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionAnalyzer for FakeVision {
    async fn analyze(&self, _image: &[u8]) -> Result<serde_json::Value, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().await.pop() {
            Some(reply) => reply,
            None => Ok(self.fallback.clone()),
        }
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub vision: Arc<FakeVision>,
}

impl TestApp {
    pub fn router(&self) -> Router {
        routes::router(self.state.clone(), None)
    }

    /// Worker over the same queue, for draining jobs inside a test.
    pub fn worker(&self) -> Worker {
        Worker::new(
            self.state.manager.clone(),
            self.queue.clone(),
            Duration::from_millis(5),
        )
    }

    /// Process everything currently queued.
    pub async fn drain(&self) {
        let worker = self.worker();
        while worker.process_next().await.unwrap() {}
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router().oneshot(request).await.unwrap()
    }
}

pub fn dumbbell_reply() -> serde_json::Value {
    serde_json::json!({
        "asset_tags": [{"tag": "DB-25-01", "confidence": 0.92}],
        "equipment": [{
            "type": "dumbbell",
            "weight": "25 lbs",
            "condition": "fair",
            "description": "Rubber hex dumbbell"
        }],
        "image_quality": "good",
        "recommendations": "Good lighting"
    })
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(FakeVision::answering(dumbbell_reply()))
}

pub fn build_test_app_with(vision: FakeVision) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryJobQueue::new());
    let vision = Arc::new(vision);
    let settings = AnalysisSettings {
        backoff: Backoff {
            base: Duration::from_millis(1),
            max: Duration::from_millis(2),
        },
        ..Default::default()
    };

    let manager = Arc::new(AnalysisManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(MemoryImageStore::new()),
        vision.clone(),
        queue.clone(),
        settings,
    ));
    let state = AppState::new(
        manager,
        store.clone(),
        store.clone(),
        store.clone(),
        queue.clone(),
        AuthConfig {
            api_key: API_KEY.to_string(),
            jwt_secret: Some(JWT_SECRET.to_string()),
        },
    );

    TestApp {
        state,
        store,
        queue,
        vision,
    }
}

pub fn png_photo(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Multipart body with an image under `file_field` and optional text fields.
pub fn multipart_body(file_field: &str, image: &[u8], fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{file_field}\"; \
             filename=\"rack.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(image);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/analyze")
        .header("x-api-key", API_KEY)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn authed(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap()
}

pub fn authed_json(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", API_KEY)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
