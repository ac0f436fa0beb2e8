use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use super::{LeadDetails, LeadError, LeadSink};
use crate::core::realtime::FunctionDeclaration;
use crate::core::tools::{ToolError, ToolHandler};

/// Function name the model calls to submit an order.
pub const SUBMIT_ORDER_TOOL: &str = "submit_customer_order";

/// Repeat submissions of an identical lead inside this window are
/// acknowledged without being delivered again. Any changed field is a new lead.
pub const DUPLICATE_WINDOW: Duration = Duration::from_secs(15);

/// Tool handler that records a customer's order through a [`LeadSink`].
pub struct SubmitOrderTool {
    sink: Arc<dyn LeadSink>,
    duplicate_window: Duration,
    recent: Mutex<HashMap<String, Instant>>,
}

impl SubmitOrderTool {
    pub fn new(sink: Arc<dyn LeadSink>) -> Self {
        Self {
            sink,
            duplicate_window: DUPLICATE_WINDOW,
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_duplicate_window(mut self, window: Duration) -> Self {
        self.duplicate_window = window;
        self
    }

    /// Every field the customer supplied; the submission timestamp is excluded.
    fn dedupe_key(lead: &LeadDetails) -> String {
        [
            lead.customer_name.as_str(),
            lead.phone_number.as_str(),
            lead.order_details.as_str(),
            lead.address.as_deref().unwrap_or_default(),
        ]
        .join("\u{1f}")
    }

    /// Returns true if an identical lead was delivered within the window.
    fn is_duplicate(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut recent = self.recent.lock();
        recent.retain(|_, at| now.duration_since(*at) < self.duplicate_window);
        recent.contains_key(key)
    }

    fn remember(&self, key: String) {
        self.recent.lock().insert(key, Instant::now());
    }
}

#[async_trait]
impl ToolHandler for SubmitOrderTool {
    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: SUBMIT_ORDER_TOOL.to_string(),
            description: Some(
                "Send a customer's order (name, phone, order details and optional address) \
                 to the sales team once all required details are collected."
                    .to_string(),
            ),
            parameters: Some(json!({
                "type": "OBJECT",
                "properties": {
                    "customer_name": {
                        "type": "STRING",
                        "description": "Customer's full name"
                    },
                    "phone_number": {
                        "type": "STRING",
                        "description": "Customer's phone number"
                    },
                    "order_details": {
                        "type": "STRING",
                        "description": "The system or service the customer wants"
                    },
                    "address": {
                        "type": "STRING",
                        "description": "Customer's address (optional)"
                    }
                },
                "required": ["customer_name", "phone_number", "order_details"]
            })),
        }
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let lead = LeadDetails::from_args(&args).map_err(|e| match e {
            LeadError::InvalidArguments(msg) => ToolError::InvalidArguments(msg),
            other => ToolError::Failed(other.to_string()),
        })?;

        let key = Self::dedupe_key(&lead);
        if self.is_duplicate(&key) {
            tracing::info!(sink = self.sink.name(), "Duplicate order submission acknowledged");
            return Ok(json!("ok"));
        }

        self.sink
            .submit(&lead)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;
        self.remember(key);

        Ok(json!("ok"))
    }
}
