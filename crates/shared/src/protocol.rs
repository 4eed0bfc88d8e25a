use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    domain::{AnalysisId, GenomicKind, Notice, RiskLevel},
    error::ApiError,
};

/// Number of typed slots an analysis needs filled.
pub const REQUIRED_UPLOADS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub index: usize,
    pub kind: GenomicKind,
    pub filename: String,
    pub size: String,
    pub records: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub uploaded: usize,
    pub required: usize,
    pub ready: bool,
}

impl UploadProgress {
    pub fn from_count(uploaded: usize) -> Self {
        Self {
            uploaded,
            required: REQUIRED_UPLOADS,
            ready: uploaded == REQUIRED_UPLOADS,
        }
    }

    pub fn status_line(&self) -> String {
        format!(
            "{} of {} genomic data files uploaded",
            self.uploaded, self.required
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsResponse {
    pub files: Vec<UploadSummary>,
    pub progress: UploadProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

/// Contents of one uploaded file as an inline `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDataUrl {
    pub kind: GenomicKind,
    pub filename: String,
    pub data_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceEntry {
    #[serde(deserialize_with = "label_text")]
    pub label: String,
    pub confidence: f64,
}

/// Classification returned by the remote predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(deserialize_with = "label_text")]
    pub label: String,
    #[serde(default)]
    pub confidences: Vec<ConfidenceEntry>,
}

impl Prediction {
    pub fn confidence_for(&self, label: &str) -> Option<f64> {
        self.confidences
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.confidence)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLabel {
    Text(String),
    Integer(i64),
    Float(f64),
}

// Hosted classifiers emit labels as either strings or bare numbers.
fn label_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawLabel::deserialize(deserializer)? {
        RawLabel::Text(text) => text,
        RawLabel::Integer(value) => value.to_string(),
        RawLabel::Float(value) => value.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: AnalysisId,
    pub overall_risk: RiskLevel,
    pub confidence: f64,
    pub recommendations: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnalysisStateView {
    Idle,
    Analyzing {
        analysis_id: AnalysisId,
    },
    Complete {
        result: AnalysisResult,
    },
    Failed {
        analysis_id: AnalysisId,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    UploadsChanged {
        files: Vec<UploadSummary>,
        progress: UploadProgress,
    },
    AnalysisStateChanged {
        state: AnalysisStateView,
    },
    Notice(Notice),
    Error(ApiError),
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
