use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Json, Router, extract::State, routing};
use memora_vision::{
    EnrichmentPipeline, VisionClient, VisionConfig, VisionError, VisionStatus, VisionTimeouts,
    probe,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Backend {
    chat_calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

async fn start_backend(backend: Backend) -> anyhow::Result<String> {
    let app = Router::new()
        .route("/v1/chat/completions", routing::post(chat_handler))
        .route("/v1/models", routing::get(models_handler))
        .with_state(backend);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).into_future().await;
    });

    Ok(format!("http://{addr}"))
}

async fn chat_handler(State(backend): State<Backend>, Json(payload): Json<Value>) -> Json<Value> {
    backend.chat_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = backend.delay {
        tokio::time::sleep(delay).await;
    }

    let first = &payload["messages"][0];
    let content = if first["role"] == "system" {
        "\"photos of a birthday cake with candles at a party\"".to_string()
    } else {
        assert!(
            first["content"][1]["image_url"]["url"]
                .as_str()
                .is_some_and(|url| url.starts_with("data:image/jpeg;base64,"))
        );
        "```json\n{\"caption\": \"A cake\", \"summary\": \"Chocolate birthday cake on a table.\", \"tags\": [\"cake\", \"party\"]}\n```".to_string()
    };

    Json(json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] }))
}

async fn models_handler(headers: HeaderMap) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer secret");
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "missing key").into_response();
    }
    Json(json!({ "data": [ { "id": "llava" }, { "id": "qwen2-vl" } ] })).into_response()
}

#[tokio::test]
async fn describe_and_expand_against_stub() -> anyhow::Result<()> {
    let backend = Backend::default();
    let url = start_backend(backend.clone()).await?;
    let client = VisionClient::new(VisionConfig::new(&url, "llava"), VisionTimeouts::default())?;

    let description = client.describe_image(b"fake-jpeg", "image/jpeg").await?;
    assert_eq!(description.caption.as_deref(), Some("A cake"));
    assert_eq!(description.tags, vec!["cake", "party"]);

    let expansion = client.expand_query("cake").await?;
    assert_eq!(expansion, "photos of a birthday cake with candles at a party");
    assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn pipeline_marks_done_with_backend() -> anyhow::Result<()> {
    let url = start_backend(Backend::default()).await?;
    let pipeline = EnrichmentPipeline::from_config(
        None,
        Some(VisionConfig::new(&url, "llava")),
        VisionTimeouts::default(),
    )?;

    let enrichment = pipeline.enrich(Path::new("cake.jpg"), b"jpeg").await;
    assert_eq!(enrichment.vision_status, VisionStatus::Done);
    assert_eq!(
        enrichment.summary.as_deref(),
        Some("Chocolate birthday cake on a table.")
    );
    assert!(enrichment.vision_json.is_some());

    let expanded = pipeline.expand_query("cake").await;
    assert_eq!(
        expanded.as_deref(),
        Some("photos of a birthday cake with candles at a party")
    );
    Ok(())
}

#[tokio::test]
async fn slow_backend_times_out() -> anyhow::Result<()> {
    let backend = Backend {
        delay: Some(Duration::from_secs(5)),
        ..Backend::default()
    };
    let url = start_backend(backend).await?;
    let timeouts = VisionTimeouts {
        describe: Duration::from_millis(200),
        expand: Duration::from_millis(200),
        probe: Duration::from_secs(1),
    };
    let client = VisionClient::new(VisionConfig::new(&url, "llava"), timeouts)?;

    let started = std::time::Instant::now();
    let result = client.describe_image(b"jpeg", "image/jpeg").await;
    assert!(matches!(result, Err(VisionError::Timeout(_))));
    assert!(started.elapsed() < Duration::from_secs(3));

    let pipeline = EnrichmentPipeline::new(None, Some(client));
    assert_eq!(pipeline.expand_query("beach").await, None);
    Ok(())
}

#[tokio::test]
async fn probe_reports_model_count() -> anyhow::Result<()> {
    let url = start_backend(Backend::default()).await?;

    let report = probe(
        &VisionConfig::new(&url, "llava").with_api_key("secret"),
        Duration::from_secs(2),
    )
    .await;
    assert!(report.ok, "{}", report.details);
    assert_eq!(report.details, "Connected. Found 2 models.");

    let report = probe(&VisionConfig::new(&url, "llava"), Duration::from_secs(2)).await;
    assert!(!report.ok);
    assert!(report.details.starts_with("Status 401"));
    Ok(())
}

#[tokio::test]
async fn probe_unreachable_endpoint() {
    let report = probe(
        &VisionConfig::new("http://127.0.0.1:9", "llava"),
        Duration::from_secs(2),
    )
    .await;
    assert!(!report.ok);
}
