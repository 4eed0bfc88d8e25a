use super::*;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct SpaceState {
    uploaded: Arc<Mutex<Vec<(String, String, usize)>>>,
    call_body: Arc<Mutex<Option<serde_json::Value>>>,
    stream: Arc<Mutex<String>>,
}

async fn handle_upload(
    State(state): State<SpaceState>,
    mut multipart: Multipart,
) -> Json<Vec<String>> {
    let mut paths = Vec::new();
    while let Some(field) = multipart.next_field().await.expect("field") {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.expect("bytes");
        paths.push(format!("/tmp/gradio/{filename}"));
        state.uploaded.lock().await.push((name, filename, bytes.len()));
    }
    Json(paths)
}

async fn handle_call(
    State(state): State<SpaceState>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    *state.call_body.lock().await = Some(body);
    Json(serde_json::json!({ "event_id": "evt-42" }))
}

async fn handle_events(
    State(state): State<SpaceState>,
    Path(event_id): Path<String>,
) -> Result<String, StatusCode> {
    if event_id != "evt-42" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(state.stream.lock().await.clone())
}

async fn spawn_space(stream: &str) -> (String, SpaceState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = SpaceState::default();
    *state.stream.lock().await = stream.to_string();

    let app = Router::new()
        .route("/gradio_api/upload", post(handle_upload))
        .route("/gradio_api/call/predict", post(handle_call))
        .route("/gradio_api/call/predict/:event_id", get(handle_events))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn inputs() -> PredictionInputs {
    let file = |name: &str, len: usize| PredictionFile {
        filename: name.to_string(),
        bytes: vec![1u8; len].into(),
    };
    PredictionInputs {
        meth_file: file("dna.parquet", 10),
        rna_file: file("rna.parquet", 20),
        mirna_file: file("mirna.parquet", 30),
    }
}

fn predictor_for(base_url: String) -> GradioPredictor {
    GradioPredictor::new(GradioConfig {
        base_url,
        ..GradioConfig::default()
    })
    .expect("predictor")
}

#[tokio::test]
async fn uploads_calls_and_reads_completed_prediction() {
    let stream = "event: generating\ndata: null\n\nevent: complete\ndata: [{\"label\": \"1\", \"confidences\": [{\"label\": \"1\", \"confidence\": 0.923}, {\"label\": \"0\", \"confidence\": 0.077}]}]\n\n";
    let (base_url, state) = spawn_space(stream).await;

    let prediction = predictor_for(base_url)
        .predict(inputs())
        .await
        .expect("prediction");
    assert_eq!(prediction.label, "1");
    assert_eq!(prediction.confidence_for("1"), Some(0.923));

    let uploaded = state.uploaded.lock().await.clone();
    assert_eq!(
        uploaded,
        vec![
            ("files".to_string(), "dna.parquet".to_string(), 10),
            ("files".to_string(), "rna.parquet".to_string(), 20),
            ("files".to_string(), "mirna.parquet".to_string(), 30),
        ]
    );

    let body = state.call_body.lock().await.clone().expect("call body");
    let data = body["data"].as_array().expect("data array");
    assert_eq!(data.len(), 3);
    assert_eq!(data[0]["path"], "/tmp/gradio/dna.parquet");
    assert_eq!(data[2]["orig_name"], "mirna.parquet");
    assert_eq!(data[1]["meta"]["_type"], "gradio.FileData");
}

#[tokio::test]
async fn error_event_surfaces_as_remote_failure() {
    let (base_url, _state) = spawn_space("event: error\ndata: null\n\n").await;

    let err = predictor_for(base_url)
        .predict(inputs())
        .await
        .expect_err("must fail");
    assert!(matches!(err, PredictorError::Remote(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn unreachable_space_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = predictor_for(format!("http://{addr}"))
        .predict(inputs())
        .await
        .expect_err("must fail");
    assert!(matches!(err, PredictorError::Transport(_)), "unexpected error: {err}");
}

#[test]
fn rejects_non_http_endpoints() {
    let err = GradioPredictor::new(GradioConfig {
        base_url: "ftp://example.org".into(),
        ..GradioConfig::default()
    })
    .err()
    .expect("must fail");
    assert!(matches!(err, PredictorError::InvalidEndpoint { .. }));
}

#[test]
fn api_root_joins_prefix_once() {
    let predictor = predictor_for("https://space.example/".into());
    assert_eq!(predictor.api_root(), "https://space.example/gradio_api");

    assert_eq!(api_root("http://host:7860/", "/"), "http://host:7860");
}

#[test]
fn stream_without_terminal_event_is_malformed() {
    let err = parse_event_stream("event: heartbeat\ndata: null\n").expect_err("must fail");
    assert!(matches!(err, PredictorError::MalformedResponse(_)));
}

#[test]
fn complete_event_with_no_outputs_is_empty() {
    let err = parse_event_stream("event: complete\ndata: []\n").expect_err("must fail");
    assert!(matches!(err, PredictorError::EmptyPrediction));
}

#[test]
fn error_event_keeps_remote_message() {
    let err = parse_event_stream("event: error\ndata: \"model crashed\"\n").expect_err("must fail");
    match err {
        PredictorError::Remote(message) => assert_eq!(message, "model crashed"),
        other => panic!("unexpected error: {other}"),
    }
}
