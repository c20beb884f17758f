//! Five-field calendar matcher (§4.1): `mday`, `wday`, `hour`, `min`, `sec`.
//!
//! Each field is an optional pattern string pulled out of a control's
//! `schedule` JSON. A field of `None` or `*` always matches; otherwise the
//! field is one of an exact digit, a `/N` cycle, an `A-B` range, or a
//! comma-separated list, checked against the current calendar unit.

use std::sync::OnceLock;

use regex::Regex;

fn digits_only() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").unwrap())
}

fn cycle() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/(\d+)$").unwrap())
}

fn range() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)-(\d+)$").unwrap())
}

fn list() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(?:\s*,\s*\d+)+$").unwrap())
}

/// A single field of a five-field schedule entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScheduleEntry {
    #[serde(default)]
    pub mday: Option<String>,
    #[serde(default)]
    pub wday: Option<String>,
    #[serde(default)]
    pub hour: Option<String>,
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub sec: Option<String>,
}

impl ScheduleEntry {
    /// Does this entry fire for the given moment?
    pub fn matches(&self, mday: u32, wday: u32, hour: u32, min: u32, sec: u32) -> bool {
        check(self.mday.as_deref(), mday)
            && check(self.wday.as_deref(), wday)
            && check(self.hour.as_deref(), hour)
            && check(self.min.as_deref(), min)
            && check(self.sec.as_deref(), sec)
    }
}

/// Check a single calendar unit's pattern against the current value.
pub fn check(unit: Option<&str>, now: u32) -> bool {
    let unit = match unit {
        None => return true,
        Some(u) => u.trim(),
    };
    if unit.is_empty() || unit == "*" {
        return true;
    }
    if digits_only().is_match(unit) {
        return unit.parse::<u32>().map(|n| n == now).unwrap_or(false);
    }
    if let Some(caps) = cycle().captures(unit) {
        let step: u32 = caps[1].parse().unwrap_or(0);
        return step != 0 && now % step == 0;
    }
    if let Some(caps) = range().captures(unit) {
        let lo: u32 = caps[1].parse().unwrap_or(0);
        let hi: u32 = caps[2].parse().unwrap_or(0);
        return (lo..=hi).contains(&now);
    }
    if list().is_match(unit) {
        return unit
            .split(',')
            .filter_map(|n| n.trim().parse::<u32>().ok())
            .any(|n| n == now);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_star_always_match() {
        assert!(check(None, 42));
        assert!(check(Some("*"), 0));
    }

    #[test]
    fn exact_digit_matches_only_itself() {
        assert!(check(Some("7"), 7));
        assert!(!check(Some("7"), 8));
    }

    #[test]
    fn cycle_matches_multiples() {
        assert!(check(Some("/15"), 30));
        assert!(!check(Some("/15"), 31));
        assert!(!check(Some("/0"), 0));
    }

    #[test]
    fn range_matches_inclusive_bounds() {
        assert!(check(Some("9-17"), 9));
        assert!(check(Some("9-17"), 17));
        assert!(!check(Some("9-17"), 18));
    }

    #[test]
    fn list_matches_any_member() {
        assert!(check(Some("1, 15, 30"), 15));
        assert!(!check(Some("1, 15, 30"), 16));
    }

    #[test]
    fn garbage_never_matches() {
        assert!(!check(Some("nonsense"), 5));
    }

    #[test]
    fn schedule_entry_matches_all_fields() {
        let entry = ScheduleEntry {
            mday: None,
            wday: Some("*".to_string()),
            hour: Some("9-17".to_string()),
            min: Some("/5".to_string()),
            sec: Some("0".to_string()),
        };
        assert!(entry.matches(1, 3, 10, 25, 0));
        assert!(!entry.matches(1, 3, 10, 26, 0));
    }
}
