//! Read-only omnichannel metrics projection for dashboards.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Journey population counts by status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JourneyCounts {
    pub total: u64,
    pub active: u64,
    pub paused: u64,
    pub completed: u64,
    pub cancelled: u64,
}

/// Per-channel delivery summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel_id: String,
    pub sends: u64,
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub conversion_rate: f64,
}

/// Attribution rollup across all tracked customers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributionSummary {
    pub customers_tracked: u64,
    pub conversions: u64,
    pub total_conversion_value: f64,
}

/// A point-in-time aggregation of orchestrator state. Projection only —
/// building one never mutates engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmnichannelMetrics {
    pub journeys: JourneyCounts,
    pub messages_sent_by_channel: HashMap<String, u64>,
    pub channels: Vec<ChannelSummary>,
    pub attribution: AttributionSummary,
    pub generated_at: DateTime<Utc>,
}

impl OmnichannelMetrics {
    pub fn new(
        journeys: JourneyCounts,
        channels: Vec<ChannelSummary>,
        attribution: AttributionSummary,
    ) -> Self {
        let messages_sent_by_channel = channels
            .iter()
            .map(|c| (c.channel_id.clone(), c.sends))
            .collect();
        Self {
            journeys,
            messages_sent_by_channel,
            channels,
            attribution,
            generated_at: Utc::now(),
        }
    }

    pub fn total_messages_sent(&self) -> u64 {
        self.messages_sent_by_channel.values().sum()
    }
}
