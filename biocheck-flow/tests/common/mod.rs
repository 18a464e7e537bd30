#![allow(dead_code)]

use async_channel::{Receiver, Sender};
use biocheck_flow::auth::TokenProvider;
use biocheck_flow::config::{FlowSettings, SessionConfig, Settings};
use biocheck_flow::validation::{BiometricValidator, FrameSubmission};
use biocheck_flow::{Attributes, CameraError, FlowView, SubmitError, TokenError, UserAction, VideoSource};
use axum::http::{header, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use std::collections::VecDeque;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

pub fn session_config() -> SessionConfig {
    SessionConfig {
        subject_id: "1712345678".into(),
        secondary_id: "V3331V2222".into(),
        token_endpoint: "http://127.0.0.1:9/token".into(),
        validation_endpoint: "http://127.0.0.1:9/validate".into(),
        username: "client".into(),
        password: "secret".into(),
    }
}

/// Default settings with millisecond timers.
pub fn fast_settings() -> Settings {
    Settings {
        flow: FlowSettings {
            max_attempts: 3,
            countdown_ms: 10,
            notice_ms: 10,
            camera_warmup_ms: 1,
        },
        ..Settings::default()
    }
}

pub fn attrs(value: serde_json::Value) -> Attributes {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

pub struct FakeTokens {
    pub calls: AtomicUsize,
    result: Result<String, TokenError>,
}

impl FakeTokens {
    pub fn ok(token: &str) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), result: Ok(token.to_string()) })
    }

    pub fn failing(err: TokenError) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), result: Err(err) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenProvider for FakeTokens {
    fn fetch_token(&self, _endpoint: &str, _username: &str, _password: &str) -> Result<String, TokenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Answers submissions from a script; runs dry with a network error.
pub struct ScriptedValidator {
    script: Mutex<VecDeque<Result<Attributes, SubmitError>>>,
    pub tokens_seen: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedValidator {
    pub fn new(script: Vec<Result<Attributes, SubmitError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            tokens_seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BiometricValidator for ScriptedValidator {
    fn submit(&self, submission: &FrameSubmission<'_>) -> Result<Attributes, SubmitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(submission.token.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SubmitError::Network("script exhausted".into())))
    }
}

#[derive(Default)]
pub struct CameraStats {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub live: AtomicBool,
}

impl CameraStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct FakeCamera {
    stats: Arc<CameraStats>,
    fail_open: bool,
    access_denied: bool,
}

impl FakeCamera {
    pub fn new(fail_open: bool) -> (Box<dyn VideoSource>, Arc<CameraStats>) {
        let stats = Arc::new(CameraStats::default());
        let camera = FakeCamera { stats: Arc::clone(&stats), fail_open, access_denied: false };
        (Box::new(camera), stats)
    }

    /// A camera the host is not allowed to use.
    pub fn denied() -> (Box<dyn VideoSource>, Arc<CameraStats>) {
        let stats = Arc::new(CameraStats::default());
        let camera = FakeCamera { stats: Arc::clone(&stats), fail_open: false, access_denied: true };
        (Box::new(camera), stats)
    }
}

impl VideoSource for FakeCamera {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.fail_open {
            return Err(CameraError::Unavailable("device busy".into()));
        }
        assert!(!self.stats.is_live(), "second stream opened while one is live");
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        self.stats.live.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn grab_jpeg(&mut self) -> Result<Vec<u8>, CameraError> {
        Ok(vec![0xff, 0xd8, 0xff, 0xe0, 0xff, 0xd9])
    }

    fn close(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        self.stats.live.store(false, Ordering::SeqCst);
    }

    fn preflight(&self) -> Result<(), CameraError> {
        if self.access_denied {
            return Err(CameraError::PermissionDenied("/dev/video0".into()));
        }
        Ok(())
    }
}

/// Plays the user: every view is recorded and may trigger one action.
pub fn autopilot<F>(
    views: Receiver<FlowView>,
    actions: Sender<UserAction>,
    mut policy: F,
) -> tokio::task::JoinHandle<Vec<FlowView>>
where
    F: FnMut(&FlowView) -> Option<UserAction> + Send + 'static,
{
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Ok(view) = views.recv().await {
            if let Some(action) = policy(&view) {
                let _ = actions.send(action).await;
            }
            seen.push(view);
        }
        seen
    })
}

/// A scripted HTTP endpoint answering POST / with a fixed status and body.
pub struct MockEndpoint {
    pub url: String,
    received: oneshot::Receiver<Value>,
}

impl MockEndpoint {
    /// The JSON body of the first request, once it has arrived.
    pub async fn request_body(self) -> Value {
        self.received.await.expect("endpoint was never called")
    }

    pub fn was_called(&mut self) -> bool {
        self.received.try_recv().is_ok()
    }
}

pub async fn mock_endpoint(status: u16, body: &str) -> MockEndpoint {
    let (tx, rx) = oneshot::channel::<Value>();
    let tx = Arc::new(Mutex::new(Some(tx)));
    let status = StatusCode::from_u16(status).expect("valid status");
    let body = body.to_string();

    let app = Router::new().route(
        "/",
        post(move |Json(request): Json<Value>| {
            let tx = Arc::clone(&tx);
            let body = body.clone();
            async move {
                let sender = tx.lock().unwrap().take();
                if let Some(sender) = sender {
                    let _ = sender.send(request);
                }
                (status, [(header::CONTENT_TYPE, "application/json")], body)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock endpoint");
    let addr = listener.local_addr().expect("mock endpoint address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock endpoint");
    });

    MockEndpoint {
        url: format!("http://{}/", addr),
        received: rx,
    }
}

/// A local URL nothing listens on.
pub fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("address");
    drop(listener);
    format!("http://{}/", addr)
}
