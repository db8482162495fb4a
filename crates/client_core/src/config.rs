use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use crate::locator::ReportOrigin;

pub const DEFAULT_CONFIG_FILE: &str = "report_viewer.toml";
pub const DEFAULT_REPORT_ORIGIN: &str = "https://goldencpa.oss-cn-shanghai.aliyuncs.com/";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub report_origin: ReportOrigin,
    pub attempt_timeout: Duration,
    pub retry_backoff: Duration,
    pub loading_delay_min: Duration,
    pub loading_delay_max: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            report_origin: default_origin(),
            attempt_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(2),
            loading_delay_min: Duration::from_secs(2),
            loading_delay_max: Duration::from_secs(3),
        }
    }
}

fn default_origin() -> ReportOrigin {
    match ReportOrigin::parse(DEFAULT_REPORT_ORIGIN) {
        Ok(origin) => origin,
        Err(err) => unreachable!("built-in report origin is valid: {err}"),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    report_origin: Option<String>,
    attempt_timeout_ms: Option<u64>,
    retry_backoff_ms: Option<u64>,
    loading_delay_min_ms: Option<u64>,
    loading_delay_max_ms: Option<u64>,
}

/// Defaults, then `path` (or `report_viewer.toml` in the working directory),
/// then environment overrides.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<ClientSettings> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

pub fn load_settings_with(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    let (file_path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&file_path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config '{}'", file_path.display()))?;
            apply_file_settings(&mut settings, file_cfg)?;
        }
        Err(err) if required => {
            return Err(err)
                .with_context(|| format!("failed to read config '{}'", file_path.display()));
        }
        Err(_) => {}
    }

    if let Some(v) = env("REPORT_ORIGIN") {
        settings.report_origin = ReportOrigin::parse(&v)?;
    }
    if let Some(v) = env("APP__REPORT_ORIGIN") {
        settings.report_origin = ReportOrigin::parse(&v)?;
    }

    if let Some(ms) = env_millis(&env, "APP__ATTEMPT_TIMEOUT_MS") {
        settings.attempt_timeout = ms;
    }
    if let Some(ms) = env_millis(&env, "APP__RETRY_BACKOFF_MS") {
        settings.retry_backoff = ms;
    }
    if let Some(ms) = env_millis(&env, "APP__LOADING_DELAY_MIN_MS") {
        settings.loading_delay_min = ms;
    }
    if let Some(ms) = env_millis(&env, "APP__LOADING_DELAY_MAX_MS") {
        settings.loading_delay_max = ms;
    }

    normalize_loading_delay(&mut settings);
    Ok(settings)
}

fn apply_file_settings(settings: &mut ClientSettings, file_cfg: FileSettings) -> anyhow::Result<()> {
    if let Some(v) = file_cfg.report_origin {
        settings.report_origin = ReportOrigin::parse(&v)?;
    }
    if let Some(ms) = file_cfg.attempt_timeout_ms {
        settings.attempt_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = file_cfg.retry_backoff_ms {
        settings.retry_backoff = Duration::from_millis(ms);
    }
    if let Some(ms) = file_cfg.loading_delay_min_ms {
        settings.loading_delay_min = Duration::from_millis(ms);
    }
    if let Some(ms) = file_cfg.loading_delay_max_ms {
        settings.loading_delay_max = Duration::from_millis(ms);
    }
    Ok(())
}

fn env_millis(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    let raw = env(name)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(err) => {
            warn!(var = name, value = %raw, "config: ignoring unparsable duration: {err}");
            None
        }
    }
}

fn normalize_loading_delay(settings: &mut ClientSettings) {
    if settings.loading_delay_max < settings.loading_delay_min {
        warn!(
            min_ms = settings.loading_delay_min.as_millis() as u64,
            max_ms = settings.loading_delay_max.as_millis() as u64,
            "config: loading delay max below min; using min for both"
        );
        settings.loading_delay_max = settings.loading_delay_min;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
