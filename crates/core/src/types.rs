use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Event properties as returned by the analytics backend.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Mobile platform an event was emitted from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    #[serde(rename = "iOS")]
    Ios,
    Android,
    Unknown,
}

impl Platform {
    /// The platforms every report is broken down by.
    pub const RECOGNIZED: [Platform; 2] = [Platform::Ios, Platform::Android];

    /// Map the backend's `$os` property onto a platform.
    pub fn from_os(os: Option<&str>) -> Self {
        match os {
            Some("iOS") => Platform::Ios,
            Some("Android") => Platform::Android,
            _ => Platform::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "iOS",
            Platform::Android => "Android",
            Platform::Unknown => "Unknown",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Platform::Ios => "🍎",
            Platform::Android => "🤖",
            Platform::Unknown => "❔",
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Platform::Unknown)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-shape value per recognized platform. Platforms without data keep
/// their default value rather than being left out.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PerPlatform<T> {
    pub ios: T,
    pub android: T,
}

impl<T> PerPlatform<T> {
    pub fn new(ios: T, android: T) -> Self {
        Self { ios, android }
    }

    pub fn get(&self, platform: Platform) -> Option<&T> {
        match platform {
            Platform::Ios => Some(&self.ios),
            Platform::Android => Some(&self.android),
            Platform::Unknown => None,
        }
    }

    pub fn get_mut(&mut self, platform: Platform) -> Option<&mut T> {
        match platform {
            Platform::Ios => Some(&mut self.ios),
            Platform::Android => Some(&mut self.android),
            Platform::Unknown => None,
        }
    }

    /// Iterate in report order (iOS first).
    pub fn iter(&self) -> impl Iterator<Item = (Platform, &T)> {
        [(Platform::Ios, &self.ios), (Platform::Android, &self.android)].into_iter()
    }

    pub fn map<U>(&self, mut f: impl FnMut(Platform, &T) -> U) -> PerPlatform<U> {
        PerPlatform {
            ios: f(Platform::Ios, &self.ios),
            android: f(Platform::Android, &self.android),
        }
    }
}

impl PerPlatform<u64> {
    pub fn total(&self) -> u64 {
        self.ios + self.android
    }
}

/// A single event occurrence fetched from the analytics backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub event_name: String,
    pub platform: Platform,
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Bounds render as `YYYY-MM-DD`.
    Day,
    /// Bounds render as `YYYY-MM-DD HH:MM:SS`.
    Minute,
}

/// Half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,
}

impl TimeWindow {
    /// The full UTC day before `today`.
    pub fn daily(today: NaiveDate) -> Self {
        let end = Utc.from_utc_datetime(&today.and_time(NaiveTime::MIN));
        Self {
            start: end - Duration::days(1),
            end,
            granularity: Granularity::Day,
        }
    }

    /// The `minutes` leading up to `now`.
    pub fn trailing(now: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            start: now - Duration::minutes(i64::from(minutes)),
            end: now,
            granularity: Granularity::Minute,
        }
    }

    /// The adjacent window of equal length ending where this one starts.
    pub fn previous(&self) -> Self {
        let length = self.end - self.start;
        Self {
            start: self.start - length,
            end: self.start,
            granularity: self.granularity,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn from_text(&self) -> String {
        self.render(self.start)
    }

    pub fn to_text(&self) -> String {
        self.render(self.end)
    }

    /// The calendar day a daily window covers.
    pub fn day(&self) -> NaiveDate {
        self.start.date_naive()
    }

    fn render(&self, instant: DateTime<Utc>) -> String {
        match self.granularity {
            Granularity::Day => instant.format("%Y-%m-%d").to_string(),
            Granularity::Minute => instant.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_window_covers_yesterday() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let window = TimeWindow::daily(today);
        assert_eq!(window.from_text(), "2024-03-01");
        assert_eq!(window.to_text(), "2024-03-02");

        let previous = window.previous();
        assert_eq!(previous.from_text(), "2024-02-29");
        assert_eq!(previous.to_text(), "2024-03-01");
    }

    #[test]
    fn test_trailing_window_is_half_open() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 9, 30, 0).unwrap();
        let window = TimeWindow::trailing(now, 10);
        assert_eq!(window.from_text(), "2024-03-02 09:20:00");
        assert_eq!(window.to_text(), "2024-03-02 09:30:00");
        assert!(window.contains(window.start));
        assert!(!window.contains(now));
    }

    #[test]
    fn test_platform_from_os() {
        assert_eq!(Platform::from_os(Some("iOS")), Platform::Ios);
        assert_eq!(Platform::from_os(Some("Android")), Platform::Android);
        assert_eq!(Platform::from_os(Some("Windows")), Platform::Unknown);
        assert_eq!(Platform::from_os(None), Platform::Unknown);
        assert!(!Platform::Unknown.is_recognized());
    }

    #[test]
    fn test_per_platform_lookup() {
        let counts = PerPlatform::new(3u64, 4u64);
        assert_eq!(counts.total(), 7);
        assert_eq!(counts.get(Platform::Android), Some(&4));
        assert_eq!(counts.get(Platform::Unknown), None);
    }
}
