//! Presentation of a finished analysis: the result card data and the
//! downloadable plain-text report.

use chrono::{DateTime, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use shared::{domain::RiskLevel, protocol::AnalysisResult};

pub const REPORT_TITLE: &str = "BREAST CANCER DETECTION ANALYSIS REPORT";

pub const REPORT_DISCLAIMER: &str = "This AI analysis is for informational purposes only and should not replace professional medical diagnosis. Please consult with a qualified healthcare provider for proper medical evaluation and treatment decisions.";

pub const MEDICAL_DISCLAIMER: &str = "This AI analysis is for informational and educational purposes only. It should not be used as a substitute for professional medical diagnosis, treatment, or advice. Always consult with qualified healthcare providers for proper medical evaluation and treatment decisions. The accuracy of AI analysis may vary and should be validated by medical professionals.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub position: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultView {
    pub overall_risk: RiskLevel,
    pub confidence: f64,
    pub confidence_label: String,
    pub recommendations: Vec<Recommendation>,
    pub disclaimer: String,
}

impl ResultView {
    pub fn from_result(result: &AnalysisResult) -> Self {
        Self {
            overall_risk: result.overall_risk,
            confidence: result.confidence,
            confidence_label: format!("{}%", result.confidence),
            recommendations: result
                .recommendations
                .iter()
                .enumerate()
                .map(|(index, text)| Recommendation {
                    position: index + 1,
                    text: text.clone(),
                })
                .collect(),
            disclaimer: MEDICAL_DISCLAIMER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportExport {
    pub filename: String,
    pub content: String,
}

pub fn render_report(result: &AnalysisResult, date: NaiveDate) -> String {
    let recommendations = result
        .recommendations
        .iter()
        .enumerate()
        .map(|(index, rec)| format!("{}. {rec}", index + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{REPORT_TITLE}\n\
         =====================================\n\
         \n\
         Overall Assessment: {risk}\n\
         Confidence Level: {confidence}%\n\
         Analysis Date: {date}\n\
         \n\
         RECOMMENDATIONS:\n\
         {recommendations}\n\
         \n\
         DISCLAIMER:\n\
         {REPORT_DISCLAIMER}\n",
        risk = result.overall_risk,
        confidence = result.confidence,
        date = date.format("%-m/%-d/%Y"),
    )
}

pub fn report_filename<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    format!("breast-cancer-analysis-{}.txt", at.timestamp_millis())
}

/// Builds the report file as of `now`, dated in `now`'s timezone.
pub fn export<Tz: TimeZone>(result: &AnalysisResult, now: &DateTime<Tz>) -> ReportExport {
    ReportExport {
        filename: report_filename(now),
        content: render_report(result, now.date_naive()),
    }
}

#[cfg(test)]
#[path = "tests/report_tests.rs"]
mod tests;
