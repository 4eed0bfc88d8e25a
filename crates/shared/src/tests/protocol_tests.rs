use super::*;

#[test]
fn prediction_accepts_numeric_and_string_labels() {
    let prediction: Prediction = serde_json::from_value(serde_json::json!({
        "label": 1,
        "confidences": [
            { "label": "1", "confidence": 0.923 },
            { "label": 0, "confidence": 0.077 }
        ]
    }))
    .expect("prediction");

    assert_eq!(prediction.label, "1");
    assert_eq!(prediction.confidence_for("1"), Some(0.923));
    assert_eq!(prediction.confidence_for("0"), Some(0.077));
    assert_eq!(prediction.confidence_for("2"), None);
}

#[test]
fn prediction_without_confidences_defaults_to_empty() {
    let prediction: Prediction =
        serde_json::from_value(serde_json::json!({ "label": "0" })).expect("prediction");
    assert!(prediction.confidences.is_empty());
}

#[test]
fn progress_is_ready_only_with_all_slots() {
    assert!(!UploadProgress::from_count(2).ready);
    let full = UploadProgress::from_count(3);
    assert!(full.ready);
    assert_eq!(full.status_line(), "3 of 3 genomic data files uploaded");
}

#[test]
fn state_view_is_tagged_by_state() {
    let value = serde_json::to_value(AnalysisStateView::Idle).expect("json");
    assert_eq!(value, serde_json::json!({ "state": "idle" }));
}

#[test]
fn risk_level_serializes_as_display_label() {
    let value = serde_json::to_value(RiskLevel::High).expect("json");
    assert_eq!(value, serde_json::json!("high risk"));
}

#[test]
fn genomic_kind_parses_case_insensitively() {
    assert_eq!("miRNA".parse::<GenomicKind>(), Ok(GenomicKind::Mirna));
    assert!("protein".parse::<GenomicKind>().is_err());
}

#[test]
fn unknown_genomic_kind_is_a_std_error() {
    let err = "protein".parse::<GenomicKind>().expect_err("unknown kind");
    assert_eq!(err, crate::domain::UnknownGenomicKind("protein".into()));
    let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
    assert_eq!(boxed.to_string(), "unknown genomic data kind 'protein'");
}
