//! Analysis orchestration: owns the uploaded files, drives the remote
//! prediction and maps its answer onto a risk assessment.

use chrono::{DateTime, Utc};
use predictor::{PredictionFile, PredictionInputs, Predictor, PredictorError};
use shared::{
    domain::{AnalysisId, GenomicKind, Notice, RiskLevel},
    protocol::{AnalysisResult, AnalysisStateView, Prediction, REQUIRED_UPLOADS},
};
use thiserror::Error;
use tracing::{info, warn};
use uploads::{removed_notice, uploaded_notice, UploadError, UploadPolicy, UploadSet, UploadedFile};

pub mod report;

/// Predictor label that denotes the high risk class.
pub const HIGH_RISK_LABEL: &str = "1";

pub const HIGH_RISK_RECOMMENDATIONS: [&str; 3] = [
    "Visit your doctor for thorough clinical evaluations and monitoring",
    "Confirm all test results in a certified laboratory",
    "Maintain close follow-up with oncology genetics specialists for ongoing assessment and updates on preventive measures",
];

pub const LOW_RISK_RECOMMENDATIONS: [&str; 3] = [
    "Continue standard screening protocols based on family history",
    "Genetic counseling may be beneficial for family planning",
    "Regular follow-up with oncology genetics if indicated",
];

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis needs {required} uploaded files, {uploaded} present")]
    IncompleteUploads { uploaded: usize, required: usize },
    #[error("an analysis is already running")]
    AlreadyAnalyzing,
    #[error("uploads cannot change while an analysis is running")]
    Busy,
    #[error("analysis {0} is no longer current")]
    StaleRun(AnalysisId),
    #[error("no completed analysis result")]
    NoResult,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Prediction(#[from] PredictorError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisState {
    Idle,
    Analyzing { analysis_id: AnalysisId },
    Complete(AnalysisResult),
    Failed { analysis_id: AnalysisId, message: String },
}

impl AnalysisState {
    pub fn view(&self) -> AnalysisStateView {
        match self {
            AnalysisState::Idle => AnalysisStateView::Idle,
            AnalysisState::Analyzing { analysis_id } => AnalysisStateView::Analyzing {
                analysis_id: *analysis_id,
            },
            AnalysisState::Complete(result) => AnalysisStateView::Complete {
                result: result.clone(),
            },
            AnalysisState::Failed {
                analysis_id,
                message,
            } => AnalysisStateView::Failed {
                analysis_id: *analysis_id,
                message: message.clone(),
            },
        }
    }
}

/// An analysis that has left `idle` and waits for the predictor.
#[derive(Debug, Clone)]
pub struct PendingAnalysis {
    pub analysis_id: AnalysisId,
    pub inputs: PredictionInputs,
}

pub struct AnalysisSession {
    uploads: UploadSet,
    policy: UploadPolicy,
    state: AnalysisState,
}

impl AnalysisSession {
    pub fn new(policy: UploadPolicy) -> Self {
        Self {
            uploads: UploadSet::new(),
            policy,
            state: AnalysisState::Idle,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn uploads(&self) -> &UploadSet {
        &self.uploads
    }

    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.state {
            AnalysisState::Complete(result) => Some(result),
            _ => None,
        }
    }

    /// Validates and stores an upload for `kind`.
    pub fn upload(
        &mut self,
        kind: GenomicKind,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Notice, AnalysisError> {
        self.ensure_idle_uploads()?;
        let file = UploadedFile::new(kind, filename, bytes, &self.policy)?;
        self.add(file)
    }

    /// Stores an already validated upload.
    pub fn add(&mut self, file: UploadedFile) -> Result<Notice, AnalysisError> {
        self.ensure_idle_uploads()?;
        let kind = file.kind();
        self.uploads.upsert(file);
        self.discard_outcome();
        Ok(uploaded_notice(kind))
    }

    pub fn remove(&mut self, index: usize) -> Result<Notice, AnalysisError> {
        self.ensure_idle_uploads()?;
        self.uploads.remove(index)?;
        self.discard_outcome();
        Ok(removed_notice())
    }

    /// Moves `idle` (or `failed`) to `analyzing`. Requires all three slots.
    pub fn begin(&mut self) -> Result<PendingAnalysis, AnalysisError> {
        if matches!(self.state, AnalysisState::Analyzing { .. }) {
            return Err(AnalysisError::AlreadyAnalyzing);
        }

        let incomplete = AnalysisError::IncompleteUploads {
            uploaded: self.uploads.len(),
            required: REQUIRED_UPLOADS,
        };
        if !self.uploads.is_complete() {
            return Err(incomplete);
        }
        let (Some(dna), Some(rna), Some(mirna)) = (
            self.uploads.get(GenomicKind::Dna),
            self.uploads.get(GenomicKind::Rna),
            self.uploads.get(GenomicKind::Mirna),
        ) else {
            return Err(incomplete);
        };

        let inputs = PredictionInputs {
            meth_file: prediction_file(dna),
            rna_file: prediction_file(rna),
            mirna_file: prediction_file(mirna),
        };
        let analysis_id = AnalysisId::new();
        self.state = AnalysisState::Analyzing { analysis_id };
        info!(%analysis_id, "genomic analysis started");

        Ok(PendingAnalysis {
            analysis_id,
            inputs,
        })
    }

    pub fn complete(
        &mut self,
        analysis_id: AnalysisId,
        prediction: &Prediction,
    ) -> Result<&AnalysisResult, AnalysisError> {
        self.ensure_current(analysis_id)?;
        let result = map_prediction(analysis_id, prediction, Utc::now());
        info!(
            %analysis_id,
            risk = %result.overall_risk,
            confidence = result.confidence,
            "genomic analysis complete"
        );
        self.state = AnalysisState::Complete(result);
        self.result().ok_or(AnalysisError::NoResult)
    }

    pub fn fail(
        &mut self,
        analysis_id: AnalysisId,
        message: impl Into<String>,
    ) -> Result<(), AnalysisError> {
        self.ensure_current(analysis_id)?;
        let message = message.into();
        warn!(%analysis_id, %message, "genomic analysis failed");
        self.state = AnalysisState::Failed {
            analysis_id,
            message,
        };
        Ok(())
    }

    /// Clears uploads and results and returns to `idle`.
    pub fn start_new(&mut self) {
        if let AnalysisState::Analyzing { analysis_id } = &self.state {
            info!(%analysis_id, "abandoning in-flight analysis");
        }
        self.uploads.clear();
        self.state = AnalysisState::Idle;
    }

    /// Runs begin, predict and complete/fail back to back.
    pub async fn analyze(
        &mut self,
        predictor: &dyn Predictor,
    ) -> Result<&AnalysisResult, AnalysisError> {
        let pending = self.begin()?;
        let analysis_id = pending.analysis_id;

        match predictor.predict(pending.inputs).await {
            Ok(prediction) => self.complete(analysis_id, &prediction),
            Err(err) => {
                self.fail(analysis_id, err.to_string())?;
                Err(err.into())
            }
        }
    }

    fn ensure_idle_uploads(&self) -> Result<(), AnalysisError> {
        if matches!(self.state, AnalysisState::Analyzing { .. }) {
            return Err(AnalysisError::Busy);
        }
        Ok(())
    }

    fn ensure_current(&self, analysis_id: AnalysisId) -> Result<(), AnalysisError> {
        match &self.state {
            AnalysisState::Analyzing { analysis_id: current } if *current == analysis_id => Ok(()),
            _ => Err(AnalysisError::StaleRun(analysis_id)),
        }
    }

    // Results never outlive the file set they were computed from.
    fn discard_outcome(&mut self) {
        if matches!(
            self.state,
            AnalysisState::Complete(_) | AnalysisState::Failed { .. }
        ) {
            self.state = AnalysisState::Idle;
        }
    }
}

fn prediction_file(file: &UploadedFile) -> PredictionFile {
    PredictionFile {
        filename: file.filename().to_string(),
        bytes: file.shared_bytes(),
    }
}

/// Maps a predictor answer onto the two-tier assessment.
pub fn map_prediction(
    analysis_id: AnalysisId,
    prediction: &Prediction,
    completed_at: DateTime<Utc>,
) -> AnalysisResult {
    let high = prediction.label == HIGH_RISK_LABEL;
    let (overall_risk, recommendations) = if high {
        (RiskLevel::High, HIGH_RISK_RECOMMENDATIONS)
    } else {
        (RiskLevel::Low, LOW_RISK_RECOMMENDATIONS)
    };

    AnalysisResult {
        analysis_id,
        overall_risk,
        confidence: confidence_percent(
            prediction.confidence_for(&prediction.label).unwrap_or(0.0),
        ),
        recommendations: recommendations.iter().map(|r| r.to_string()).collect(),
        completed_at,
    }
}

/// Fraction to percentage with three decimals.
pub fn confidence_percent(fraction: f64) -> f64 {
    let percent = fraction * 100.0;
    (percent * 1000.0).round() / 1000.0
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
