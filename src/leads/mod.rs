//! Lead capture.
//!
//! When a caller asks for a system or service, the model calls
//! `submit_customer_order` with the caller's details. [`SubmitOrderTool`]
//! validates them and hands them to a [`LeadSink`]: a webhook when one is
//! configured, otherwise the log.

mod tool;
mod webhook;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use tool::{DUPLICATE_WINDOW, SUBMIT_ORDER_TOOL, SubmitOrderTool};
pub use webhook::{DEFAULT_LEAD_TIMEOUT, WebhookLeadSink};

/// Errors raised while recording a lead.
#[derive(Debug, Error)]
pub enum LeadError {
    #[error("invalid lead: {0}")]
    InvalidArguments(String),

    #[error("lead webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lead webhook returned HTTP {0}")]
    Status(u16),
}

/// A customer's order request as collected by the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadDetails {
    pub customer_name: String,
    pub phone_number: String,
    pub order_details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl LeadDetails {
    /// Parse tool-call arguments. Name, phone and order details must be
    /// non-blank strings; a blank address counts as absent.
    pub fn from_args(args: &Map<String, Value>) -> Result<Self, LeadError> {
        let required = |key: &str| -> Result<String, LeadError> {
            args.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| LeadError::InvalidArguments(format!("missing `{}`", key)))
        };

        let address = args
            .get("address")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            customer_name: required("customer_name")?,
            phone_number: required("phone_number")?,
            order_details: required("order_details")?,
            address,
            timestamp: now_millis(),
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Destination for captured leads.
#[async_trait]
pub trait LeadSink: Send + Sync {
    async fn submit(&self, lead: &LeadDetails) -> Result<(), LeadError>;

    fn name(&self) -> &'static str;
}

/// Records leads through `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLeadSink;

#[async_trait]
impl LeadSink for LogLeadSink {
    async fn submit(&self, lead: &LeadDetails) -> Result<(), LeadError> {
        tracing::info!(
            customer = %lead.customer_name,
            phone = %lead.phone_number,
            details = %lead.order_details,
            address = ?lead.address,
            "Lead captured"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_args_complete() {
        let lead = LeadDetails::from_args(&args(json!({
            "customer_name": " Sara ",
            "phone_number": "0912345678",
            "order_details": "POS system for two branches",
            "address": "Khartoum"
        })))
        .unwrap();

        assert_eq!(lead.customer_name, "Sara");
        assert_eq!(lead.address.as_deref(), Some("Khartoum"));
        assert!(lead.timestamp > 0);
    }

    #[test]
    fn test_from_args_blank_address_is_none() {
        let lead = LeadDetails::from_args(&args(json!({
            "customer_name": "Sara",
            "phone_number": "0912345678",
            "order_details": "Website",
            "address": "  "
        })))
        .unwrap();
        assert!(lead.address.is_none());
    }

    #[test]
    fn test_from_args_rejects_missing_phone() {
        let err = LeadDetails::from_args(&args(json!({
            "customer_name": "Sara",
            "phone_number": "",
            "order_details": "Website"
        })))
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid lead: missing `phone_number`");
    }

    #[test]
    fn test_from_args_rejects_non_string() {
        let result = LeadDetails::from_args(&args(json!({
            "customer_name": 42,
            "phone_number": "0912345678",
            "order_details": "Website"
        })));
        assert!(matches!(result, Err(LeadError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_log_sink_accepts() {
        let lead = LeadDetails {
            customer_name: "Sara".into(),
            phone_number: "1".into(),
            order_details: "x".into(),
            address: None,
            timestamp: 0,
        };
        assert!(LogLeadSink.submit(&lead).await.is_ok());
        assert_eq!(LogLeadSink.name(), "log");
    }
}
