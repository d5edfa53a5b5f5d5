// src/monitor/alert.rs
// =============================================================================
// Webhook delivery for batches of detected changes.
//
// The notifier only knows how to POST one payload. Deciding what goes in the
// batch and when to clear it belongs to the change detector.
// =============================================================================

use super::changes::ContentChange;
use super::Severity;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook failed with status: {0}")]
    Status(u16),
}

/// What the webhook receives.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub timestamp: DateTime<Utc>,
    pub site_name: String,
    pub total_changes: usize,
    pub changes: Vec<ContentChange>,
    pub summary: String,
    /// Highest severity in the batch
    pub priority: Severity,
}

impl AlertPayload {
    pub fn new(site_name: &str, changes: Vec<ContentChange>) -> Self {
        let priority = changes
            .iter()
            .map(|c| c.severity)
            .max()
            .unwrap_or(Severity::Low);
        let summary = match changes.as_slice() {
            [only] => format!("Content changed: {}", only.url),
            _ => format!("Detected {} content changes", changes.len()),
        };
        Self {
            timestamp: Utc::now(),
            site_name: site_name.to_string(),
            total_changes: changes.len(),
            changes,
            summary,
            priority,
        }
    }
}

pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    // POSTs the payload as JSON; anything but 2xx is an error.
    pub async fn send(&self, payload: &AlertPayload) -> Result<(), AlertError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AlertError::Status(status.as_u16()))
        }
    }
}
