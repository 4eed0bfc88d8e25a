use std::{collections::HashMap, path::Path, time::Duration};

use anyhow::Context;
use ::config::{Config, Environment, File, FileFormat};
use predictor::{GradioConfig, DEFAULT_API_NAME, DEFAULT_API_PREFIX, DEFAULT_SPACE_URL};
use serde::Deserialize;
use uploads::{UploadPolicy, MAX_UPLOAD_BYTES};

pub const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub predictor_url: String,
    pub predictor_api_prefix: String,
    pub predictor_api_name: String,
    pub predictor_token: Option<String>,
    pub predictor_timeout_seconds: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            predictor_url: DEFAULT_SPACE_URL.into(),
            predictor_api_prefix: DEFAULT_API_PREFIX.into(),
            predictor_api_name: DEFAULT_API_NAME.into(),
            predictor_token: None,
            predictor_timeout_seconds: None,
        }
    }
}

impl Settings {
    pub fn predictor_config(&self) -> GradioConfig {
        GradioConfig {
            base_url: self.predictor_url.clone(),
            api_prefix: self.predictor_api_prefix.clone(),
            api_name: self.predictor_api_name.clone(),
            token: self.predictor_token.clone(),
            timeout: self
                .predictor_timeout_seconds
                .filter(|seconds| *seconds > 0)
                .map(Duration::from_secs),
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    load_settings_with(Path::new(SETTINGS_FILE), &vars)
}

/// Layers defaults, the optional settings file, `APP__*` variables and the
/// plain legacy variable names (which lose to their `APP__` counterparts).
pub fn load_settings_with(
    path: &Path,
    vars: &HashMap<String, String>,
) -> anyhow::Result<Settings> {
    let mut settings: Settings = Config::builder()
        .add_source(File::new(&path.to_string_lossy(), FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .source(Some(vars.clone())),
        )
        .build()
        .with_context(|| format!("failed to load settings from '{}'", path.display()))?
        .try_deserialize()
        .context("invalid server settings")?;

    apply_legacy_env(&mut settings, vars);
    Ok(settings)
}

fn apply_legacy_env(settings: &mut Settings, vars: &HashMap<String, String>) {
    let legacy = |plain: &str, scoped: &str| {
        if vars.contains_key(scoped) {
            None
        } else {
            vars.get(plain).cloned()
        }
    };

    if let Some(v) = legacy("SERVER_BIND", "APP__BIND_ADDR") {
        settings.bind_addr = v;
    }
    if let Some(v) = legacy("PREDICTOR_URL", "APP__PREDICTOR_URL") {
        settings.predictor_url = v;
    }
    if let Some(v) = legacy("HF_TOKEN", "APP__PREDICTOR_TOKEN") {
        settings.predictor_token = Some(v);
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
