use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder,
};
use serde::{Deserialize, Serialize};
use shared::protocol::Prediction;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Hosted Space serving the breast cancer risk classifier.
pub const DEFAULT_SPACE_URL: &str = "https://ayajejawy-graduation-project.hf.space";
pub const DEFAULT_API_PREFIX: &str = "/gradio_api";
pub const DEFAULT_API_NAME: &str = "predict";

const FILE_DATA_TYPE: &str = "gradio.FileData";

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("invalid predictor url '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("predictor request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed predictor response: {0}")]
    MalformedResponse(String),
    #[error("predictor reported an error: {0}")]
    Remote(String),
    #[error("predictor returned no prediction")]
    EmptyPrediction,
}

#[derive(Debug, Clone)]
pub struct PredictionFile {
    pub filename: String,
    pub bytes: Arc<[u8]>,
}

/// The three inputs of the remote model, under its parameter names.
#[derive(Debug, Clone)]
pub struct PredictionInputs {
    pub meth_file: PredictionFile,
    pub rna_file: PredictionFile,
    pub mirna_file: PredictionFile,
}

impl PredictionInputs {
    /// Inputs in the positional order the endpoint declares them.
    pub fn fields(&self) -> [(&'static str, &PredictionFile); 3] {
        [
            ("meth_file", &self.meth_file),
            ("rna_file", &self.rna_file),
            ("mirna_file", &self.mirna_file),
        ]
    }
}

#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, inputs: PredictionInputs) -> Result<Prediction, PredictorError>;
}

#[derive(Debug, Clone)]
pub struct GradioConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub api_name: String,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for GradioConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SPACE_URL.into(),
            api_prefix: DEFAULT_API_PREFIX.into(),
            api_name: DEFAULT_API_NAME.into(),
            token: None,
            timeout: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FileMeta {
    #[serde(rename = "_type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct FileData {
    path: String,
    orig_name: String,
    size: u64,
    meta: FileMeta,
}

#[derive(Debug, Serialize)]
struct CallRequest {
    data: Vec<FileData>,
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    event_id: String,
}

/// Client for a Gradio app exposing the classifier over its queued HTTP API:
/// upload the files, submit a call, then read the call's event stream.
pub struct GradioPredictor {
    http: Client,
    root: String,
    api_name: String,
    token: Option<String>,
}

impl GradioPredictor {
    pub fn new(config: GradioConfig) -> Result<Self, PredictorError> {
        let parsed = Url::parse(config.base_url.trim()).map_err(|e| {
            PredictorError::InvalidEndpoint {
                url: config.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PredictorError::InvalidEndpoint {
                url: config.base_url,
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let api_name = config.api_name.trim().trim_matches('/').to_string();
        if api_name.is_empty() {
            return Err(PredictorError::InvalidEndpoint {
                url: config.base_url,
                reason: "api name cannot be empty".into(),
            });
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            root: api_root(parsed.as_str(), &config.api_prefix),
            api_name,
            token: config.token.filter(|token| !token.trim().is_empty()),
        })
    }

    pub fn api_root(&self) -> &str {
        &self.root
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn upload_files(&self, inputs: &PredictionInputs) -> Result<Vec<FileData>, PredictorError> {
        let mut form = Form::new();
        for (_, file) in inputs.fields() {
            let part = Part::bytes(file.bytes.to_vec())
                .file_name(file.filename.clone())
                .mime_str("application/octet-stream")?;
            form = form.part("files", part);
        }

        let paths: Vec<String> = self
            .authorized(self.http.post(format!("{}/upload", self.root)))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let fields = inputs.fields();
        if paths.len() != fields.len() {
            return Err(PredictorError::MalformedResponse(format!(
                "expected {} uploaded paths, got {}",
                fields.len(),
                paths.len()
            )));
        }

        Ok(paths
            .into_iter()
            .zip(fields)
            .map(|(path, (_, file))| FileData {
                path,
                orig_name: file.filename.clone(),
                size: file.bytes.len() as u64,
                meta: FileMeta {
                    kind: FILE_DATA_TYPE,
                },
            })
            .collect())
    }
}

#[async_trait]
impl Predictor for GradioPredictor {
    async fn predict(&self, inputs: PredictionInputs) -> Result<Prediction, PredictorError> {
        let data = self.upload_files(&inputs).await?;
        debug!(root = %self.root, files = data.len(), "uploaded predictor inputs");

        let call: CallResponse = self
            .authorized(
                self.http
                    .post(format!("{}/call/{}", self.root, self.api_name)),
            )
            .json(&CallRequest { data })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(event_id = %call.event_id, api_name = %self.api_name, "predictor call queued");

        let body = self
            .authorized(self.http.get(format!(
                "{}/call/{}/{}",
                self.root, self.api_name, call.event_id
            )))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let prediction = parse_event_stream(&body).map_err(|err| {
            warn!(event_id = %call.event_id, %err, "predictor call did not complete");
            err
        })?;
        info!(event_id = %call.event_id, label = %prediction.label, "predictor call complete");
        Ok(prediction)
    }
}

fn api_root(base_url: &str, api_prefix: &str) -> String {
    let prefix = api_prefix.trim().trim_matches('/');
    let base = base_url.trim_end_matches('/');
    if prefix.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{prefix}")
    }
}

/// Extracts the first output of a `complete` event from a call's event
/// stream. An `error` event ends the call with [`PredictorError::Remote`].
pub fn parse_event_stream(body: &str) -> Result<Prediction, PredictorError> {
    let mut event: Option<&str> = None;

    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = Some(name.trim());
            continue;
        }
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();

        match event {
            Some("complete") => {
                let outputs: Vec<Prediction> = serde_json::from_str(data)
                    .map_err(|e| PredictorError::MalformedResponse(e.to_string()))?;
                return outputs
                    .into_iter()
                    .next()
                    .ok_or(PredictorError::EmptyPrediction);
            }
            Some("error") => {
                let message = match data {
                    "" | "null" => "no details provided".to_string(),
                    other => other.trim_matches('"').to_string(),
                };
                return Err(PredictorError::Remote(message));
            }
            _ => {}
        }
    }

    Err(PredictorError::MalformedResponse(
        "event stream ended without a result".into(),
    ))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
