use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use client_core::{
    config::{DEFAULT_API_BASE_URL, DEFAULT_PAYWALL_DELAY},
    BillingConfig, ClientConfig,
};

pub const SETTINGS_FILE: &str = "promptfolio.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub token: Option<String>,
    pub pro_price_id_monthly: Option<String>,
    pub pro_price_id_yearly: Option<String>,
    pub billing_success_url: Option<String>,
    pub billing_cancel_url: Option<String>,
    pub paywall_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_BASE_URL.into(),
            token: None,
            pro_price_id_monthly: None,
            pro_price_id_yearly: None,
            billing_success_url: None,
            billing_cancel_url: None,
            paywall_delay: DEFAULT_PAYWALL_DELAY,
        }
    }
}

impl Settings {
    pub fn client_config(&self) -> ClientConfig {
        let base = self.api_url.trim_end_matches('/');
        ClientConfig {
            api_base_url: self.api_url.clone(),
            paywall_delay: self.paywall_delay,
            billing: BillingConfig {
                pro_monthly_price_id: self.pro_price_id_monthly.clone(),
                pro_yearly_price_id: self.pro_price_id_yearly.clone(),
                success_url: self
                    .billing_success_url
                    .clone()
                    .unwrap_or_else(|| format!("{base}/billing/success")),
                cancel_url: self
                    .billing_cancel_url
                    .clone()
                    .unwrap_or_else(|| format!("{base}/billing/cancel")),
            },
        }
    }
}

/// `./promptfolio.toml`, else `<config dir>/promptfolio/promptfolio.toml`.
pub fn settings_path() -> Option<PathBuf> {
    let local = PathBuf::from(SETTINGS_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("promptfolio").join(SETTINGS_FILE))
        .filter(|path| path.exists())
}

pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(settings_path().as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the settings file, then environment variables.
pub fn load_settings_from(
    file: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Some(path) = file {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        let file_cfg = toml::from_str::<HashMap<String, String>>(&raw)
            .with_context(|| format!("parsing settings file {}", path.display()))?;
        if let Some(v) = file_cfg.get("api_url") {
            settings.api_url = v.clone();
        }
        if let Some(v) = file_cfg.get("token") {
            settings.token = non_blank(v);
        }
        if let Some(v) = file_cfg.get("pro_price_id_monthly") {
            settings.pro_price_id_monthly = non_blank(v);
        }
        if let Some(v) = file_cfg.get("pro_price_id_yearly") {
            settings.pro_price_id_yearly = non_blank(v);
        }
        if let Some(v) = file_cfg.get("billing_success_url") {
            settings.billing_success_url = non_blank(v);
        }
        if let Some(v) = file_cfg.get("billing_cancel_url") {
            settings.billing_cancel_url = non_blank(v);
        }
        if let Some(v) = file_cfg.get("paywall_delay_ms") {
            settings.paywall_delay = parse_delay(v).context("paywall_delay_ms in settings file")?;
        }
    }

    if let Some(v) = env("PROMPTFOLIO_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("PROMPTFOLIO_TOKEN") {
        settings.token = non_blank(&v);
    }
    if let Some(v) = env("PROMPTFOLIO_PRO_PRICE_ID_MONTHLY") {
        settings.pro_price_id_monthly = non_blank(&v);
    }
    if let Some(v) = env("PROMPTFOLIO_PRO_PRICE_ID_YEARLY") {
        settings.pro_price_id_yearly = non_blank(&v);
    }
    if let Some(v) = env("PROMPTFOLIO_BILLING_SUCCESS_URL") {
        settings.billing_success_url = non_blank(&v);
    }
    if let Some(v) = env("PROMPTFOLIO_BILLING_CANCEL_URL") {
        settings.billing_cancel_url = non_blank(&v);
    }
    if let Some(v) = env("PROMPTFOLIO_PAYWALL_DELAY_MS") {
        settings.paywall_delay = parse_delay(&v).context("PROMPTFOLIO_PAYWALL_DELAY_MS")?;
    }

    Ok(settings)
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_delay(raw: &str) -> anyhow::Result<Duration> {
    let millis: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("expected milliseconds, got '{raw}'"))?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
