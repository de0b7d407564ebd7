//! Message-delivery gateway boundary — the external collaborator that
//! actually hands a rendered message to a channel provider.

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use omnijourney_core::{OrchestratorError, OrchestratorResult};

/// A message accepted by a gateway, as recorded for tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveredMessage {
    pub message_id: String,
    pub channel_id: String,
    pub customer_id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Per-channel delivery gateway. Implementations wrap real providers
/// (ESP, SMS aggregator, push service); the orchestrator only sees the
/// message id they return.
pub trait MessageGateway: Send + Sync {
    fn deliver(
        &self,
        channel_id: &str,
        customer_id: &str,
        body: &str,
    ) -> OrchestratorResult<String>;
}

/// In-memory gateway with a per-customer delivery log. Channels listed in
/// `fail_channels` reject every send, which lets tests exercise the
/// fallback path.
pub struct InMemoryGateway {
    messages: DashMap<String, Vec<DeliveredMessage>>,
    fail_channels: DashSet<String>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            messages: DashMap::new(),
            fail_channels: DashSet::new(),
        }
    }

    /// Make every send on `channel_id` fail until cleared.
    pub fn fail_channel(&self, channel_id: &str) {
        self.fail_channels.insert(channel_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_channels.clear();
    }

    /// All messages delivered to a customer, in send order.
    pub fn messages_for(&self, customer_id: &str) -> Vec<DeliveredMessage> {
        self.messages
            .get(customer_id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn total_sent(&self) -> usize {
        self.messages.iter().map(|e| e.value().len()).sum()
    }
}

impl MessageGateway for InMemoryGateway {
    fn deliver(
        &self,
        channel_id: &str,
        customer_id: &str,
        body: &str,
    ) -> OrchestratorResult<String> {
        if self.fail_channels.contains(channel_id) {
            return Err(OrchestratorError::Delivery(format!(
                "gateway for channel {} unavailable",
                channel_id
            )));
        }

        let message_id = format!("MSG{}", Uuid::new_v4().to_string().replace('-', ""));
        let message = DeliveredMessage {
            message_id: message_id.clone(),
            channel_id: channel_id.to_string(),
            customer_id: customer_id.to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
        };

        tracing::info!(
            message_id = %message_id,
            channel_id = %channel_id,
            customer_id = %customer_id,
            "Message handed to gateway"
        );
        metrics::counter!("gateway.messages_delivered", "channel" => channel_id.to_string())
            .increment(1);

        self.messages
            .entry(customer_id.to_string())
            .or_default()
            .push(message);

        Ok(message_id)
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}
