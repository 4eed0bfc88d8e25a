use std::sync::Arc;

use analysis::{
    report::{export, ResultView},
    AnalysisError, AnalysisSession, PendingAnalysis,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State, WebSocketUpgrade},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use shared::{
    domain::{GenomicKind, Notice},
    error::{ApiError, ErrorCode},
    protocol::{AnalysisStateView, SessionEvent, UploadDataUrl, UploadsResponse},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use uploads::{validate, UploadError};

use crate::app_state::AppState;

// Room for multipart framing around a maximum-size file.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub(crate) fn build_router(state: Arc<AppState>, max_upload_bytes: u64) -> Router {
    let body_limit = max_upload_bytes as usize + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/healthz", get(healthz))
        .route("/uploads", get(list_uploads))
        // `:slot` is a kind (`dna`, `rna`, `mirna`) for GET and POST, and a
        // list index for DELETE.
        .route(
            "/uploads/:slot",
            get(upload_data_url).post(upload_file).delete(remove_upload),
        )
        .route("/analysis", get(analysis_state).post(start_analysis))
        .route("/analysis/reset", post(reset_analysis))
        .route("/analysis/report", get(download_report))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn uploads_response(session: &AnalysisSession, notice: Option<Notice>) -> UploadsResponse {
    UploadsResponse {
        files: session.uploads().summaries(),
        progress: session.uploads().progress(),
        notice,
    }
}

fn validation(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(ErrorCode::Validation, message)),
    )
}

fn reject(err: AnalysisError) -> (StatusCode, Json<ApiError>) {
    let (status, code) = match &err {
        AnalysisError::Upload(UploadError::InvalidFileType { .. })
        | AnalysisError::IncompleteUploads { .. } => {
            (StatusCode::BAD_REQUEST, ErrorCode::Validation)
        }
        AnalysisError::Upload(UploadError::FileTooLarge { .. }) => {
            (StatusCode::PAYLOAD_TOO_LARGE, ErrorCode::PayloadTooLarge)
        }
        AnalysisError::Upload(UploadError::IndexOutOfRange { .. }) | AnalysisError::NoResult => {
            (StatusCode::NOT_FOUND, ErrorCode::NotFound)
        }
        AnalysisError::Upload(UploadError::Read { .. }) => {
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal)
        }
        AnalysisError::AlreadyAnalyzing | AnalysisError::Busy | AnalysisError::StaleRun(_) => {
            (StatusCode::CONFLICT, ErrorCode::Conflict)
        }
        AnalysisError::Prediction(_) => (StatusCode::BAD_GATEWAY, ErrorCode::Upstream),
    };

    let mut body = ApiError::new(code, err.to_string());
    match &err {
        AnalysisError::Upload(upload) => body = body.with_notice(upload.notice()),
        AnalysisError::Prediction(_) => {
            body = body.with_notice(Notice::destructive(
                "Analysis failed",
                "The prediction service could not complete the analysis",
            ))
        }
        _ => {}
    }
    (status, Json(body))
}

fn publish_state(state: &AppState, session: &AnalysisSession) {
    state.publish(SessionEvent::AnalysisStateChanged {
        state: session.state().view(),
    });
}

async fn list_uploads(State(state): State<Arc<AppState>>) -> Json<UploadsResponse> {
    let session = state.session.lock().await;
    Json(uploads_response(&session, None))
}

/// `GET /uploads/:kind`: the uploaded file of that kind as a `data:` URL.
async fn upload_data_url(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> ApiResult<Json<UploadDataUrl>> {
    let kind = kind
        .parse::<GenomicKind>()
        .map_err(|e| validation(e.to_string()))?;
    let session = state.session.lock().await;
    let file = session.uploads().get(kind).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError::new(
                ErrorCode::NotFound,
                format!("no {} file uploaded", kind.label()),
            )),
        )
    })?;
    Ok(Json(UploadDataUrl {
        kind,
        filename: file.filename().to_string(),
        data_url: file.data_url(),
    }))
}

/// `POST /uploads/:kind`: validates the multipart `file` part and stores it
/// in the slot for that kind.
async fn upload_file(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadsResponse>> {
    let kind = kind
        .parse::<GenomicKind>()
        .map_err(|e| validation(e.to_string()))?;
    let policy = *state.session.lock().await.policy();

    let mut upload = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| validation("file part must carry a filename"))?
            .to_string();
        validate(&filename, 0, &policy).map_err(|e| reject(e.into()))?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| validation(format!("failed to read upload: {e}")))?
        {
            bytes.extend_from_slice(&chunk);
            validate(&filename, bytes.len() as u64, &policy).map_err(|e| {
                warn!(%kind, %filename, "rejected oversized upload");
                reject(e.into())
            })?;
        }
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) = upload.ok_or_else(|| validation("missing 'file' part"))?;

    let mut session = state.session.lock().await;
    let notice = session.upload(kind, filename, bytes).map_err(reject)?;
    publish_state(&state, &session);
    state.publish(SessionEvent::Notice(notice.clone()));
    Ok(Json(uploads_response(&session, Some(notice))))
}

/// `DELETE /uploads/:index`: removes the file at that list position.
async fn remove_upload(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> ApiResult<Json<UploadsResponse>> {
    let mut session = state.session.lock().await;
    let notice = session.remove(index).map_err(reject)?;
    publish_state(&state, &session);
    state.publish(SessionEvent::Notice(notice.clone()));
    Ok(Json(uploads_response(&session, Some(notice))))
}

async fn analysis_state(State(state): State<Arc<AppState>>) -> Json<AnalysisStateView> {
    let session = state.session.lock().await;
    Json(session.state().view())
}

async fn start_analysis(State(state): State<Arc<AppState>>) -> ApiResult<Json<ResultView>> {
    let pending = {
        let mut session = state.session.lock().await;
        let pending = session.begin().map_err(reject)?;
        publish_state(&state, &session);
        pending
    };

    // Detached so a dropped request cannot leave the session in `analyzing`.
    let run = tokio::spawn(run_analysis(state, pending));
    match run.await {
        Ok(outcome) => outcome.map(Json),
        Err(err) => {
            error!(%err, "analysis task aborted");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(ErrorCode::Internal, "analysis task aborted")),
            ))
        }
    }
}

async fn run_analysis(state: Arc<AppState>, pending: PendingAnalysis) -> ApiResult<ResultView> {
    let analysis_id = pending.analysis_id;
    let outcome = state.predictor.predict(pending.inputs).await;

    let mut session = state.session.lock().await;
    match outcome {
        Ok(prediction) => {
            let view = ResultView::from_result(
                session
                    .complete(analysis_id, &prediction)
                    .map_err(reject)?,
            );
            info!(%analysis_id, risk = %view.overall_risk, "analysis complete");
            publish_state(&state, &session);
            Ok(view)
        }
        Err(err) => {
            error!(%analysis_id, %err, "prediction failed");
            session.fail(analysis_id, err.to_string()).map_err(reject)?;
            publish_state(&state, &session);
            let (status, Json(body)) = reject(err.into());
            state.publish(SessionEvent::Error(body.clone()));
            Err((status, Json(body)))
        }
    }
}

async fn reset_analysis(State(state): State<Arc<AppState>>) -> StatusCode {
    let mut session = state.session.lock().await;
    session.start_new();
    info!("analysis session reset");
    publish_state(&state, &session);
    StatusCode::NO_CONTENT
}

async fn download_report(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let session = state.session.lock().await;
    let result = session.result().ok_or_else(|| reject(AnalysisError::NoResult))?;
    let report = export(result, &Local::now());

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", report.filename))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((StatusCode::OK, headers, report.content))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();

    let send_task = tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
