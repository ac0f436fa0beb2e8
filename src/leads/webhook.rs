//! Webhook lead delivery.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::{LeadDetails, LeadError, LeadSink};

/// Default bound on one webhook delivery.
pub const DEFAULT_LEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs each lead as JSON to a webhook.
///
/// The JSON body goes out as `Content-Type: text/plain`; receiving scripts
/// parse the raw body themselves.
#[derive(Debug, Clone)]
pub struct WebhookLeadSink {
    url: Url,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookLeadSink {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: DEFAULT_LEAD_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl LeadSink for WebhookLeadSink {
    async fn submit(&self, lead: &LeadDetails) -> Result<(), LeadError> {
        let body = serde_json::to_string(lead)
            .map_err(|e| LeadError::InvalidArguments(e.to_string()))?;

        tracing::debug!(
            host = self.url.host_str().unwrap_or_default(),
            bytes = body.len(),
            "Posting lead to webhook"
        );

        let response = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Lead webhook returned non-success status");
            return Err(LeadError::Status(status.as_u16()));
        }

        tracing::info!(customer = %lead.customer_name, "Lead delivered to webhook");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
