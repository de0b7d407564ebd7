//! Delivery policy — frequency capping and per-channel time windows.

pub mod frequency_capping;
pub mod time_windows;

pub use frequency_capping::{CapException, CappingScope, FrequencyCapEngine, FrequencyRule};
pub use time_windows::{next_window_start, ChannelPreference, PreferenceSetting, TimeWindow};
