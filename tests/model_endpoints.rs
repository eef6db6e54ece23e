use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use hybrid_serve::{
    api::{create_router, AppState},
    control::{ActivityTracker, Clock, CommandLayout, ControlState},
    supervisor::{IdleWatchdog, IdleWatchdogConfig, Terminator, WatchdogState},
};
use serde_json::{json, Value};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tempfile::TempDir;
use tower::ServiceExt;

const MISSING_INTERPRETER: &str = "hybrid-serve-test-missing-interpreter";

struct TestContext {
    dir: TempDir,
    control: Arc<ControlState>,
    watchdog: Option<Arc<IdleWatchdog>>,
    app: Router,
}

impl TestContext {
    fn new(interpreter: &str) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let control = Arc::new(ControlState::new(
            ActivityTracker::new(dir.path().join("last_request.txt")),
            layout(dir.path(), interpreter),
        ));
        let app = create_router(AppState::new(Arc::clone(&control), None));
        Self {
            dir,
            control,
            watchdog: None,
            app,
        }
    }

    fn with_watchdog(
        interpreter: &str,
        watchdog: impl FnOnce(ActivityTracker) -> IdleWatchdog,
    ) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let control = Arc::new(ControlState::new(
            ActivityTracker::new(dir.path().join("last_request.txt")),
            layout(dir.path(), interpreter),
        ));
        let watchdog = Arc::new(watchdog(control.tracker().clone()));
        let app = create_router(AppState::new(Arc::clone(&control), Some(Arc::clone(&watchdog))));
        Self {
            dir,
            control,
            watchdog: Some(watchdog),
            app,
        }
    }

    fn write_script(&self, name: &str, body: &str) {
        std::fs::write(self.dir.path().join(name), body).expect("failed to write script");
    }
}

fn layout(dir: &Path, interpreter: &str) -> CommandLayout {
    CommandLayout {
        interpreter: interpreter.to_string(),
        working_dir: dir.to_path_buf(),
        train_script: "train.sh".to_string(),
        validate_script: "validate.sh".to_string(),
        predict_script: "predict.sh".to_string(),
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let request_builder = Request::builder().method(method).uri(uri);

    let request = if let Some(payload) = body {
        request_builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("failed to build json request")
    } else {
        request_builder
            .body(Body::empty())
            .expect("failed to build empty request")
    };

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router request failed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let body = String::from_utf8_lossy(&bytes).to_string();

    (status, body)
}

async fn send_json(app: &Router, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, body) = send(app, Method::POST, uri, body).await;
    let value = serde_json::from_str(&body).expect("response is not json");
    (status, value)
}

fn assert_finished_shape(body: &Value) {
    assert_eq!(body["status"], "finished");
    for field in ["stdout", "stderr"] {
        assert!(body[field].is_string(), "missing {field}: {body}");
    }
    for field in ["stdout_lines", "stderr_lines"] {
        assert!(body[field].is_array(), "missing {field}: {body}");
    }
    assert!(body["returncode"].is_i64(), "missing returncode: {body}");
}

#[tokio::test]
async fn validate_model_without_scripts_still_finishes() {
    let ctx = TestContext::new(MISSING_INTERPRETER);

    let (status, body) = send_json(
        &ctx.app,
        "/validate_model",
        Some(json!({ "test_user_count": 50 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_finished_shape(&body);
    assert_eq!(body["returncode"], 1);
    assert_eq!(body["stdout"], "");
    assert!(!body["stderr"].as_str().unwrap().is_empty());
    assert!(!body["stderr_lines"].as_array().unwrap().is_empty());
    assert!(body.get("params_used").is_none());
}

#[tokio::test]
async fn predict_best_model_ignores_body_and_records_activity() {
    let ctx = TestContext::new(MISSING_INTERPRETER);
    assert!(ctx.control.tracker().last_activity_time().is_none());

    let (status, body) = send_json(
        &ctx.app,
        "/predict_best_model",
        Some(json!({ "anything": ["goes", 1] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_finished_shape(&body);
    assert!(ctx.control.tracker().last_activity_time().is_some());
}

#[tokio::test]
async fn train_with_empty_body_uses_defaults() {
    let ctx = TestContext::new(MISSING_INTERPRETER);

    let (status, body) = send_json(&ctx.app, "/train_deep_hybrid_model", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_finished_shape(&body);
    assert_eq!(
        body["params_used"],
        json!({
            "n_neighbors": 10,
            "latent_dim": 64,
            "epochs": 30,
            "tfidf_features": 300
        })
    );
    assert!(!ctx.control.guard().is_held());
}

#[tokio::test]
async fn malformed_body_is_a_client_error() {
    let ctx = TestContext::new(MISSING_INTERPRETER);

    let (status, body) = send_json(
        &ctx.app,
        "/train_deep_hybrid_model",
        Some(json!({ "epochs": "thirty" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid request body"));
    assert!(!ctx.control.guard().is_held());
}

#[cfg(unix)]
#[tokio::test]
async fn train_passes_params_to_script() {
    let ctx = TestContext::new("sh");
    ctx.write_script("train.sh", "for arg in \"$@\"; do echo \"$arg\"; done\necho warn >&2\nexit 4\n");

    let (status, body) = send_json(
        &ctx.app,
        "/train_deep_hybrid_model",
        Some(json!({ "n_neighbors": 5, "epochs": 3 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_finished_shape(&body);
    assert_eq!(body["returncode"], 4);
    assert_eq!(
        body["stdout_lines"],
        json!([
            "--n_neighbors=5",
            "--latent_dim=64",
            "--epochs=3",
            "--tfidf_features=300"
        ])
    );
    assert_eq!(body["stderr_lines"], json!(["warn"]));
    assert_eq!(body["params_used"]["n_neighbors"], 5);
    assert_eq!(body["params_used"]["epochs"], 3);
}

#[cfg(unix)]
#[tokio::test]
async fn overlapping_training_requests_get_busy() {
    let ctx = TestContext::new("sh");
    ctx.write_script("train.sh", "echo run >> launches.log\nsleep 1\necho done\n");

    let first = {
        let app = ctx.app.clone();
        tokio::spawn(async move { send_json(&app, "/train_deep_hybrid_model", None).await })
    };

    while !ctx.control.guard().is_held() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (status, busy) = send_json(&ctx.app, "/train_deep_hybrid_model", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(busy["status"], "busy");
    assert_eq!(busy["msg"], "Training already running, try again later.");
    assert!(busy.get("returncode").is_none());

    let (status, finished) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_finished_shape(&finished);
    assert_eq!(finished["stdout_lines"], json!(["done"]));

    let launches = std::fs::read_to_string(ctx.dir.path().join("launches.log")).unwrap();
    assert_eq!(launches.lines().count(), 1);

    // The guard is free again once the first run is over.
    let (_, again) = send_json(&ctx.app, "/train_deep_hybrid_model", None).await;
    assert_eq!(again["status"], "finished");
}

#[tokio::test]
async fn status_reports_without_recording_activity() {
    let ctx = TestContext::new(MISSING_INTERPRETER);

    let (status, body) = send(&ctx.app, Method::GET, "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["training_in_progress"], false);
    assert!(body["last_activity"].is_null());
    assert_eq!(body["watchdog_state"], "disabled");
    assert!(ctx.control.tracker().last_activity_time().is_none());

    send_json(&ctx.app, "/predict_best_model", None).await;

    let (_, body) = send(&ctx.app, Method::GET, "/status", None).await;
    let body: Value = serde_json::from_str(&body).unwrap();
    assert!(body["last_activity"].is_string());
    assert!(body["idle_minutes"].as_f64().unwrap() < 1.0);
}

#[tokio::test]
async fn probes_follow_watchdog_state() {
    struct CountingTerminator(AtomicUsize);

    impl Terminator for CountingTerminator {
        fn terminate(&self, _idle_minutes: f64) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let terminator = Arc::new(CountingTerminator(AtomicUsize::new(0)));
    let watchdog_terminator = Arc::clone(&terminator);
    let ctx = TestContext::with_watchdog(MISSING_INTERPRETER, move |tracker| {
        IdleWatchdog::new(
            IdleWatchdogConfig {
                poll_interval: Duration::from_secs(60),
                idle_threshold_minutes: 60,
            },
            tracker,
            watchdog_terminator,
        )
    });

    let (status, _) = send(&ctx.app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&ctx.app, Method::GET, "/livez", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&ctx.app, Method::GET, "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);

    // A marker two hours old makes the next check request termination.
    let stale = ctx.control.tracker().clock().now() - 2.0 * 60.0 * 60.0;
    std::fs::write(ctx.dir.path().join("last_request.txt"), stale.to_string()).unwrap();

    let (_, body) = send(&ctx.app, Method::GET, "/status", None).await;
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["watchdog_state"], "running");
    assert_eq!(body["idle_threshold_minutes"], 60);
    assert!(body["idle_minutes"].as_f64().unwrap() > 119.0);

    let watchdog = ctx.watchdog.as_ref().unwrap();
    assert_eq!(watchdog.poll_once(), WatchdogState::Terminating);
    assert_eq!(watchdog.poll_once(), WatchdogState::Terminating);
    assert_eq!(terminator.0.load(Ordering::SeqCst), 1);

    let (status, _) = send(&ctx.app, Method::GET, "/readyz", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, _) = send(&ctx.app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&ctx.app, Method::GET, "/status", None).await;
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["watchdog_state"], "terminating");
}
