//! Channel registry — static catalog of messaging channels with capability
//! flags, delivery constraints, and rolling performance stats.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use omnijourney_core::event_bus::{make_event, EventSink, JourneyEventType};
use omnijourney_core::types::ChannelType;

/// Capability flags advertised by a channel.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChannelCapabilities {
    pub real_time: bool,
    pub personalization: bool,
    pub rich_media: bool,
    pub tracking: bool,
}

/// Volume and compliance constraints for a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConstraints {
    pub daily_volume_cap: Option<u64>,
    pub hourly_volume_cap: Option<u64>,
    pub min_minutes_between_messages: Option<u32>,
    pub max_daily_frequency: Option<u32>,
    /// Hours of day (0-23) during which the channel must stay silent.
    #[serde(default)]
    pub blockout_hours: Vec<u8>,
    #[serde(default)]
    pub geo_restrictions: Vec<String>,
    #[serde(default)]
    pub compliance_tags: Vec<String>,
}

/// Rolling performance counters and derived rates for a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelPerformance {
    pub sends: u64,
    pub deliveries: u64,
    pub opens: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub unsubscribes: u64,
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub conversion_rate: f64,
    pub unsubscribe_rate: f64,
    pub avg_response_time_ms: f64,
    pub cost_per_message: f64,
    pub roi: f64,
}

impl ChannelPerformance {
    fn recompute_rates(&mut self) {
        self.delivery_rate = ratio(self.deliveries, self.sends);
        self.open_rate = ratio(self.opens, self.deliveries);
        self.click_rate = ratio(self.clicks, self.deliveries);
        self.conversion_rate = ratio(self.conversions, self.clicks);
        self.unsubscribe_rate = ratio(self.unsubscribes, self.deliveries);
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// A registered messaging channel. Channels are never deleted, only
/// deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub channel_type: ChannelType,
    pub active: bool,
    pub capabilities: ChannelCapabilities,
    pub constraints: ChannelConstraints,
    pub performance: ChannelPerformance,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(id: &str, name: &str, channel_type: ChannelType) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            channel_type,
            active: true,
            capabilities: ChannelCapabilities {
                real_time: channel_type.is_real_time(),
                personalization: true,
                rich_media: matches!(channel_type, ChannelType::Email | ChannelType::Push),
                tracking: true,
            },
            constraints: ChannelConstraints::default(),
            performance: ChannelPerformance::default(),
            created_at: Utc::now(),
        }
    }
}

/// Kinds of engagement fed back into channel performance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngagementKind {
    Delivered,
    Opened,
    Clicked,
    Converted,
    Unsubscribed,
}

/// Thread-safe channel catalog. Duplicate ids overwrite silently.
pub struct ChannelRegistry {
    channels: DashMap<String, Channel>,
    event_sink: Arc<dyn EventSink>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            event_sink: omnijourney_core::event_bus::noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Insert or overwrite a channel by id.
    pub fn add_channel(&self, channel: Channel) {
        info!(channel_id = %channel.id, channel_type = ?channel.channel_type, "Registering channel");
        self.channels.insert(channel.id.clone(), channel);
    }

    pub fn get_channel(&self, id: &str) -> Option<Channel> {
        self.channels.get(id).map(|c| c.clone())
    }

    /// Snapshot of all registered channels.
    pub fn all_channels(&self) -> Vec<Channel> {
        self.channels.iter().map(|c| c.value().clone()).collect()
    }

    /// Deactivate a channel. Returns false if the id is unknown.
    pub fn deactivate_channel(&self, id: &str) -> bool {
        match self.channels.get_mut(id) {
            Some(mut channel) => {
                channel.active = false;
                info!(channel_id = %id, "Channel deactivated");
                true
            }
            None => false,
        }
    }

    /// Record a message send against the channel's rolling performance.
    pub fn record_send(&self, id: &str) {
        if let Some(mut channel) = self.channels.get_mut(id) {
            channel.performance.sends += 1;
            channel.performance.recompute_rates();
        }
    }

    /// Record a delivery/engagement event against the channel.
    pub fn record_engagement(&self, id: &str, kind: EngagementKind) {
        if let Some(mut channel) = self.channels.get_mut(id) {
            let perf = &mut channel.performance;
            match kind {
                EngagementKind::Delivered => perf.deliveries += 1,
                EngagementKind::Opened => perf.opens += 1,
                EngagementKind::Clicked => perf.clicks += 1,
                EngagementKind::Converted => perf.conversions += 1,
                EngagementKind::Unsubscribed => perf.unsubscribes += 1,
            }
            perf.recompute_rates();
        }
    }

    /// Seed the five standard channels and announce readiness.
    pub fn seed_default_channels(&self) {
        self.add_channel(Channel::new("email", "Email", ChannelType::Email));
        self.add_channel(Channel::new("sms", "SMS", ChannelType::Sms));
        self.add_channel(Channel::new("push", "Push Notification", ChannelType::Push));
        self.add_channel(Channel::new("web", "Web", ChannelType::Web));
        self.add_channel(Channel::new("ads", "Paid Ads", ChannelType::Ads));

        info!(count = self.channels.len(), "Default channels initialized");
        self.event_sink.emit(make_event(
            JourneyEventType::ChannelsInitialized,
            None,
            None,
            Some(serde_json::json!({ "count": self.channels.len() })),
        ));
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
