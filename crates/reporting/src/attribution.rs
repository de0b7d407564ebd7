//! Multi-touch attribution — time-decayed, position-weighted channel
//! credit for recorded conversions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use omnijourney_core::event_bus::{make_event, EventSink, JourneyEventType};

/// First and last touchpoints in a path earn this multiplier.
const POSITION_BONUS: f64 = 1.4;
/// Exponential decay constant, in hours before conversion.
const TIME_DECAY_HOURS: f64 = 168.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttributionModel {
    DataDriven,
}

/// A single customer-channel interaction on the conversion path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Touchpoint {
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    /// Interaction value (e.g. order line, engagement weight). Not used by
    /// the weighting itself.
    pub value: f64,
}

/// Per-customer attribution state: ordered touchpoints plus the computed
/// channel weights once a conversion lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub customer_id: String,
    pub touchpoints: Vec<Touchpoint>,
    pub conversion_value: Option<f64>,
    pub model: AttributionModel,
    /// Sums to 1.0 across touched channels after computation.
    pub channel_weights: HashMap<String, f64>,
    /// Placeholder for cross-channel synergy effects; currently
    /// unpopulated.
    pub synergistic_effects: HashMap<String, f64>,
    pub computed_at: Option<DateTime<Utc>>,
}

impl AttributionRecord {
    fn new(customer_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            touchpoints: Vec::new(),
            conversion_value: None,
            model: AttributionModel::DataDriven,
            channel_weights: HashMap::new(),
            synergistic_effects: HashMap::new(),
            computed_at: None,
        }
    }
}

/// Result of one attribution computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionBreakdown {
    pub channel_weights: HashMap<String, f64>,
    pub synergistic_effects: HashMap<String, f64>,
}

/// Each touchpoint starts at `1/n`, first and last positions are boosted
/// by `POSITION_BONUS`, every touchpoint decays by
/// `exp(-hours_before_conversion / TIME_DECAY_HOURS)`, and the per-channel
/// sums are normalized to 1.0.
pub fn calculate_data_driven_attribution(
    touchpoints: &[Touchpoint],
    _conversion_value: f64,
    conversion_time: DateTime<Utc>,
) -> AttributionBreakdown {
    let mut channel_weights: HashMap<String, f64> = HashMap::new();
    let total = touchpoints.len();
    if total == 0 {
        return AttributionBreakdown {
            channel_weights,
            synergistic_effects: HashMap::new(),
        };
    }

    let base_weight = 1.0 / total as f64;
    for (index, touchpoint) in touchpoints.iter().enumerate() {
        let position_bonus = if index == 0 || index == total - 1 {
            POSITION_BONUS
        } else {
            1.0
        };
        let hours_before = (conversion_time - touchpoint.timestamp)
            .num_seconds()
            .max(0) as f64
            / 3600.0;
        let time_decay = (-hours_before / TIME_DECAY_HOURS).exp();

        *channel_weights
            .entry(touchpoint.channel.clone())
            .or_insert(0.0) += base_weight * position_bonus * time_decay;
    }

    let sum: f64 = channel_weights.values().sum();
    if sum > 0.0 {
        for weight in channel_weights.values_mut() {
            *weight /= sum;
        }
    }

    AttributionBreakdown {
        channel_weights,
        synergistic_effects: HashMap::new(),
    }
}

/// Accumulates touchpoints per customer and recomputes channel weights on
/// every conversion.
pub struct AttributionEngine {
    records: DashMap<String, AttributionRecord>,
    event_sink: Arc<dyn EventSink>,
}

impl AttributionEngine {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            event_sink: omnijourney_core::event_bus::noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Append a touchpoint for the customer, creating the record lazily.
    /// When `conversion_value` is present the channel weights are
    /// recomputed against the touchpoint's timestamp as conversion time.
    pub fn record_touchpoint(
        &self,
        customer_id: &str,
        touchpoint: Touchpoint,
        conversion_value: Option<f64>,
    ) {
        let channel = touchpoint.channel.clone();
        let conversion_time = touchpoint.timestamp;

        let mut record = self
            .records
            .entry(customer_id.to_string())
            .or_insert_with(|| AttributionRecord::new(customer_id));
        record.touchpoints.push(touchpoint);

        let converted = if let Some(value) = conversion_value {
            record.conversion_value = Some(value);
            let breakdown =
                calculate_data_driven_attribution(&record.touchpoints, value, conversion_time);
            record.channel_weights = breakdown.channel_weights;
            record.synergistic_effects = breakdown.synergistic_effects;
            record.computed_at = Some(conversion_time);
            true
        } else {
            false
        };
        drop(record);

        info!(
            customer_id = %customer_id,
            channel = %channel,
            converted,
            "Attribution touchpoint recorded"
        );
        self.event_sink.emit(make_event(
            JourneyEventType::AttributionRecorded,
            Some(customer_id.to_string()),
            Some(channel),
            None,
        ));
        if converted {
            self.event_sink.emit(make_event(
                JourneyEventType::AttributionCalculated,
                Some(customer_id.to_string()),
                None,
                conversion_value.map(|v| serde_json::json!({ "conversion_value": v })),
            ));
        }
    }

    pub fn get(&self, customer_id: &str) -> Option<AttributionRecord> {
        self.records.get(customer_id).map(|r| r.clone())
    }

    pub fn customers_tracked(&self) -> usize {
        self.records.len()
    }

    pub fn conversions(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.value().conversion_value.is_some())
            .count()
    }

    pub fn total_conversion_value(&self) -> f64 {
        self.records
            .iter()
            .filter_map(|r| r.value().conversion_value)
            .sum()
    }
}

impl Default for AttributionEngine {
    fn default() -> Self {
        Self::new()
    }
}
