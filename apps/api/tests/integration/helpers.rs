use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use futures_util::StreamExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use inference_api::{
    application::classify_image::{ClassifyImageUseCase, InferencePipeline},
    config::Config,
    domain::detection::{Confidence, Label, Verdict},
    infrastructure::ml::traits::{FaceGate, GatedImage, ImageClassifier},
    presentation::http::{routes::create_app, state::AppState},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    io::Cursor,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tower::ServiceExt;
use uuid::Uuid;

pub type TestSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SOCKET_WAIT: Duration = Duration::from_secs(5);

/// Face gate with a fixed answer that counts its calls.
pub struct TestGate {
    has_face: bool,
    calls: AtomicUsize,
}

impl TestGate {
    pub fn new(has_face: bool) -> Self {
        Self {
            has_face,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceGate for TestGate {
    fn check(&self, _image: &DynamicImage) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.has_face)
    }
}

/// Classifier with a fixed verdict that counts its calls.
pub struct TestClassifier {
    label: Label,
    probability: f64,
    delay: Duration,
    calls: AtomicUsize,
}

impl TestClassifier {
    pub fn new(label: Label, probability: f64) -> Self {
        Self {
            label,
            probability,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageClassifier for TestClassifier {
    fn classify(&self, _image: &GatedImage) -> anyhow::Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(Verdict {
            label: self.label,
            confidence: Confidence::new(self.probability)?,
        })
    }
}

pub struct TestApp {
    pub app: Router,
    pub classify: ClassifyImageUseCase,
    pub gate: Arc<TestGate>,
    pub classifier: Arc<TestClassifier>,
}

pub fn test_config() -> Config {
    let mut config = Config::from_source(|_| None).expect("default config is valid");
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.max_concurrent_inferences = 2;
    config.request_timeout_seconds = 5;
    config
}

pub fn spawn_app_with(gate: TestGate, classifier: TestClassifier, config: Config) -> TestApp {
    let gate = Arc::new(gate);
    let classifier = Arc::new(classifier);

    let pipeline = InferencePipeline::new(gate.clone(), classifier.clone());
    let classify = ClassifyImageUseCase::new(
        Arc::new(pipeline),
        config.max_concurrent_inferences,
        config.request_timeout(),
    );

    let state = AppState {
        classify: classify.clone(),
        config: Arc::new(config),
    };

    TestApp {
        app: create_app(state),
        classify,
        gate,
        classifier,
    }
}

/// Face present, class 0 with probability 0.8732.
pub fn spawn_app() -> TestApp {
    spawn_app_with(
        TestGate::new(true),
        TestClassifier::new(Label::DrugUser, 0.8732),
        test_config(),
    )
}

pub fn spawn_faceless_app() -> TestApp {
    spawn_app_with(
        TestGate::new(false),
        TestClassifier::new(Label::DrugUser, 0.99),
        test_config(),
    )
}

/// Serves the router on an ephemeral local port and returns its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });
    format!("http://{}", addr)
}

pub async fn connect_socket(base_url: &str) -> TestSocket {
    let url = format!("{}/ws", base_url.replacen("http://", "ws://", 1));
    let (socket, _) = connect_async(url).await.expect("websocket handshake failed");
    socket
}

/// Next text reply as JSON. Panics if the socket closes first.
pub async fn next_reply(socket: &mut TestSocket) -> Value {
    loop {
        let message = tokio::time::timeout(SOCKET_WAIT, socket.next())
            .await
            .expect("timed out waiting for a reply")
            .expect("socket closed before replying")
            .expect("socket error before replying");
        match message {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("reply is json"),
            Message::Close(frame) => panic!("socket closed before replying: {:?}", frame),
            _ => continue,
        }
    }
}

/// Reads until the connection ends and returns every text message seen.
pub async fn drain_texts(socket: &mut TestSocket) -> Vec<String> {
    let mut texts = Vec::new();
    loop {
        match tokio::time::timeout(SOCKET_WAIT, socket.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => texts.push(text.as_str().to_string()),
            Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => return texts,
            Ok(Some(Ok(_))) => continue,
            Err(_) => panic!("connection was not closed"),
        }
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> axum::response::Response {
    app.clone().oneshot(req).await.expect("request failed")
}

pub async fn read_json<T: DeserializeOwned>(res: axum::response::Response) -> T {
    let bytes = to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&bytes).expect("failed to parse json")
}

pub async fn read_text(res: axum::response::Response) -> String {
    let bytes = to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    String::from_utf8(bytes.to_vec()).expect("invalid utf8")
}

pub async fn expect_status(
    res: axum::response::Response,
    expected: StatusCode,
) -> axum::response::Response {
    let actual = res.status();
    if actual == expected {
        return res;
    }

    let body = read_text(res).await;
    panic!(
        "HTTP status mismatch. Expected {}, got {}. Response body: {}",
        expected, actual, body
    );
}

pub fn encode_image(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("failed to encode image");
    bytes
}

pub fn small_png_bytes() -> Vec<u8> {
    encode_image(
        DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
            Rgb([(x * 4) as u8, (y * 4) as u8, 128])
        })),
        ImageFormat::Png,
    )
}

pub fn small_jpeg_bytes() -> Vec<u8> {
    encode_image(
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([200, 180, 160]))),
        ImageFormat::Jpeg,
    )
}

/// Multipart body with a single file part.
pub fn multipart_file_body(field: &str, filename: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = format!("----inference-boundary-{}", Uuid::now_v7());
    let mut body = Vec::new();

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    (boundary, body)
}

pub fn upload_request(field: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let (boundary, body) = multipart_file_body(field, filename, bytes);
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .expect("failed to build upload request")
}

pub fn assert_status(status: StatusCode, expected: StatusCode) {
    assert_eq!(status, expected, "expected {}, got {}", expected, status);
}
