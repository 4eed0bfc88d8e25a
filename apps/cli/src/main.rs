use std::{path::PathBuf, time::Duration};

use analysis::{report, AnalysisSession};
use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use predictor::{
    GradioConfig, GradioPredictor, DEFAULT_API_NAME, DEFAULT_API_PREFIX, DEFAULT_SPACE_URL,
};
use shared::{domain::GenomicKind, protocol::AnalysisResult};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uploads::{UploadPolicy, UploadedFile};

#[derive(Parser, Debug)]
#[command(name = "genomic-risk", about = "Breast cancer risk assessment from genomic profiles")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload the three profiles, run the prediction and print the result.
    Analyze {
        #[arg(long)]
        dna: PathBuf,
        #[arg(long)]
        rna: PathBuf,
        #[arg(long)]
        mirna: PathBuf,
        #[arg(long, env = "PREDICTOR_URL", default_value = DEFAULT_SPACE_URL)]
        predictor_url: String,
        #[arg(long, default_value = DEFAULT_API_PREFIX)]
        api_prefix: String,
        #[arg(long, default_value = DEFAULT_API_NAME)]
        api_name: String,
        #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
        token: Option<String>,
        #[arg(long)]
        timeout_seconds: Option<u64>,
        /// Write the text report here. A directory gets the generated file name.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Validate a single file without contacting the predictor.
    Check {
        #[arg(long)]
        kind: GenomicKind,
        file: PathBuf,
    },
}

fn render_summary(result: &AnalysisResult) -> String {
    let mut out = format!(
        "Overall assessment: {}\nConfidence: {}%\n",
        result.overall_risk, result.confidence
    );
    for (i, rec) in result.recommendations.iter().enumerate() {
        out.push_str(&format!("{}. {rec}\n", i + 1));
    }
    out.push_str(&format!("\n{}\n", report::MEDICAL_DISCLAIMER));
    out
}

fn describe_upload(upload: &UploadedFile) -> String {
    format!(
        "{} ({}): {} ({}, ~{} records)",
        upload.kind().label(),
        upload.kind().description(),
        upload.filename(),
        upload.size(),
        upload.records()
    )
}

async fn check(kind: GenomicKind, file: PathBuf) -> Result<()> {
    match UploadedFile::read(kind, &file, &UploadPolicy::default()).await {
        Ok(upload) => {
            println!("{}", describe_upload(&upload));
            Ok(())
        }
        Err(err) => {
            let notice = err.notice();
            let summary = format!("{}: {}", notice.title, notice.description);
            Err(anyhow::Error::new(err).context(summary))
        }
    }
}

async fn analyze(
    files: [(GenomicKind, PathBuf); 3],
    config: GradioConfig,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let predictor = GradioPredictor::new(config).context("invalid predictor endpoint")?;
    let mut session = AnalysisSession::new(UploadPolicy::default());

    for (kind, path) in files {
        let upload = UploadedFile::read(kind, &path, session.policy())
            .await
            .with_context(|| format!("failed to load {} file '{}'", kind.label(), path.display()))?;
        let notice = session.add(upload)?;
        info!(%kind, "{}", notice.description);
        println!("{}", session.uploads().progress().status_line());
    }

    info!(api_root = %predictor.api_root(), "running analysis");
    let result = match session.analyze(&predictor).await {
        Ok(result) => result,
        Err(err) => {
            warn!(%err, "analysis failed");
            return Err(err).context("analysis failed");
        }
    };
    print!("{}", render_summary(result));

    if let Some(path) = report_path {
        let export = report::export(result, &Local::now());
        let target = if path.is_dir() {
            path.join(&export.filename)
        } else {
            path
        };
        tokio::fs::write(&target, export.content)
            .await
            .with_context(|| format!("failed to write report to '{}'", target.display()))?;
        println!("Report saved to {}", target.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            dna,
            rna,
            mirna,
            predictor_url,
            api_prefix,
            api_name,
            token,
            timeout_seconds,
            report,
        } => {
            let config = GradioConfig {
                base_url: predictor_url,
                api_prefix,
                api_name,
                token,
                timeout: timeout_seconds
                    .filter(|seconds| *seconds > 0)
                    .map(Duration::from_secs),
            };
            let files = [
                (GenomicKind::Dna, dna),
                (GenomicKind::Rna, rna),
                (GenomicKind::Mirna, mirna),
            ];
            analyze(files, config, report).await
        }
        Command::Check { kind, file } => check(kind, file).await,
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
