//! E-mail alerts through the Resend API, and the persisted de-duplication state

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::settings::{ALERT_TIMEOUT, RESEND_API_URL};

pub trait AlertSender {
    fn send_alert(&self, subject: &str, html: &str) -> Result<()>;
}

pub struct ResendNotifier {
    client: Client,
    url: String,
    api_keys: Vec<String>,
    from: String,
    to: String,
}

impl ResendNotifier {
    pub fn new(api_keys: Vec<String>, from: &str, to: &str) -> Result<Self> {
        Self::with_url(RESEND_API_URL, api_keys, from, to)
    }

    pub fn with_url(url: &str, api_keys: Vec<String>, from: &str, to: &str) -> Result<Self> {
        if api_keys.is_empty() {
            anyhow::bail!("at least one Resend API key is required");
        }
        let client = Client::builder()
            .timeout(ALERT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_keys,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Last four characters only
fn mask_key(key: &str) -> String {
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("***{}", tail)
}

impl AlertSender for ResendNotifier {
    /// Try each key in order; the first 200 wins
    fn send_alert(&self, subject: &str, html: &str) -> Result<()> {
        let payload = serde_json::json!({
            "from": self.from,
            "to": self.to,
            "subject": subject,
            "html": html,
        });

        for key in &self.api_keys {
            let result = self
                .client
                .post(&self.url)
                .bearer_auth(key)
                .json(&payload)
                .send();

            match result {
                Ok(response) if response.status().as_u16() == 200 => {
                    info!(key = %mask_key(key), to = %self.to, "Alert e-mail sent");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().unwrap_or_default();
                    warn!(key = %mask_key(key), status, body = %body, "Alert e-mail rejected");
                }
                Err(e) => {
                    warn!(key = %mask_key(key), error = %e, "Alert e-mail request failed");
                }
            }
        }

        anyhow::bail!("all {} API keys failed; alert not sent", self.api_keys.len())
    }
}

// ============================================================================
// Alert State
// ============================================================================

/// Last alerted APY per base asset, formatted to two decimals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    #[serde(default)]
    pub last_alerted: HashMap<String, String>,
}

impl AlertState {
    /// Missing file starts empty; an unreadable one is logged and ignored
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Alert state unreadable; starting fresh");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write alert state {}", path.display()))?;
        Ok(())
    }

    /// True when this rounded APY differs from the last one alerted for the asset
    pub fn should_alert(&self, asset: &str, rounded_apy: &str) -> bool {
        self.last_alerted.get(asset).is_none_or(|last| last != rounded_apy)
    }

    pub fn record(&mut self, asset: &str, rounded_apy: &str) {
        self.last_alerted.insert(asset.to_string(), rounded_apy.to_string());
    }
}
