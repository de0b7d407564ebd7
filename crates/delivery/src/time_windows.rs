//! Per-channel delivery windows — customer preferences about when a
//! channel may be used, with overnight wrap-around support.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A daily window during which sends are permitted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// `start <= end` is a same-day window; otherwise the window wraps
    /// past midnight.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceSetting {
    Allowed,
    Blocked,
}

/// A customer's preference for one channel: blocked entirely, or allowed
/// within optional daily windows (no windows = any time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPreference {
    pub setting: PreferenceSetting,
    #[serde(default)]
    pub windows: Vec<TimeWindow>,
}

impl ChannelPreference {
    pub fn allowed() -> Self {
        Self {
            setting: PreferenceSetting::Allowed,
            windows: Vec::new(),
        }
    }

    pub fn blocked() -> Self {
        Self {
            setting: PreferenceSetting::Blocked,
            windows: Vec::new(),
        }
    }

    pub fn allowed_within(windows: Vec<TimeWindow>) -> Self {
        Self {
            setting: PreferenceSetting::Allowed,
            windows,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.setting == PreferenceSetting::Blocked
    }

    /// Whether a send at `now` falls inside the customer's windows.
    /// Blocked preferences never permit; an empty window list always does.
    pub fn permits_at(&self, now: DateTime<Utc>) -> bool {
        if self.is_blocked() {
            return false;
        }
        if self.windows.is_empty() {
            return true;
        }
        let time = now.time();
        self.windows.iter().any(|w| w.contains(time))
    }
}

/// Earliest upcoming window start strictly after `now`. `None` when there
/// are no windows (nothing to wait for).
pub fn next_window_start(now: DateTime<Utc>, windows: &[TimeWindow]) -> Option<DateTime<Utc>> {
    windows
        .iter()
        .map(|w| {
            let today = now.date_naive().and_time(w.start);
            let candidate = Utc.from_utc_datetime(&today);
            if candidate > now {
                candidate
            } else {
                candidate + Duration::days(1)
            }
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_same_day_window() {
        let window = TimeWindow::new(t(9, 0), t(17, 0));
        assert!(window.contains(t(9, 0)));
        assert!(window.contains(t(12, 30)));
        assert!(!window.contains(t(17, 0)));
        assert!(!window.contains(t(3, 0)));
    }

    #[test]
    fn test_overnight_window_wraps() {
        let window = TimeWindow::new(t(22, 0), t(6, 0));
        assert!(window.contains(t(23, 0)));
        assert!(window.contains(t(2, 0)));
        assert!(!window.contains(t(12, 0)));
    }

    #[test]
    fn test_blocked_preference_never_permits() {
        let pref = ChannelPreference::blocked();
        assert!(!pref.permits_at(Utc::now()));
    }

    #[test]
    fn test_allowed_without_windows_always_permits() {
        let pref = ChannelPreference::allowed();
        assert!(pref.permits_at(Utc::now()));
    }

    #[test]
    fn test_next_window_start_rolls_to_tomorrow() {
        let windows = vec![TimeWindow::new(t(9, 0), t(10, 0))];
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap();

        let next = next_window_start(now, &windows).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 11, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_next_window_start_later_today() {
        let windows = vec![
            TimeWindow::new(t(9, 0), t(10, 0)),
            TimeWindow::new(t(18, 0), t(20, 0)),
        ];
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap();

        let next = next_window_start(now, &windows).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 10, 18, 0, 0).unwrap());
    }

    #[test]
    fn test_next_window_start_empty() {
        assert!(next_window_start(Utc::now(), &[]).is_none());
    }
}
