// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use once_cell::sync::Lazy;
use regex::Regex;

/// Clock-style durations: `H:MM:SS`, `MM:SS` or bare `SS`.
static CLOCK_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(\d{1,2}):)?(?:(\d{1,2}):)?(\d{1,2})$").unwrap());

/// ISO-8601 time durations restricted to the `PT#H#M#S` subset, the only
/// one encountered on OSM ferry routes.
static ISO8601_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^PT(?:(\d+(?:\.\d+)?)H)?(?:(\d+(?:\.\d+)?)M)?(?:(\d+(?:\.\d+)?)S)?$").unwrap()
});

/// Parses an OSM `duration` value into seconds.
///
/// Accepts `H:MM:SS`, `MM:SS`, bare `SS` and ISO-8601 `PT#H#M#S`.
/// Returns -1.0 when the value is absent or does not parse.
pub fn parse_duration(value: Option<&str>) -> f64 {
    let value = match value {
        Some(v) => v.trim(),
        None => return -1.0,
    };

    if let Some(captures) = CLOCK_DURATION.captures(value) {
        let first = captures.get(1).map(|m| m.as_str());
        let second = captures.get(2).map(|m| m.as_str());
        let last: f64 = captures[3].parse().unwrap_or(0.0);

        return match (first, second) {
            (Some(h), Some(m)) => {
                3600.0 * h.parse().unwrap_or(0.0) + 60.0 * m.parse().unwrap_or(0.0) + last
            }
            (Some(m), None) => 60.0 * m.parse().unwrap_or(0.0) + last,
            _ => last,
        };
    }

    if let Some(captures) = ISO8601_DURATION.captures(value) {
        let part = |idx: usize| -> f64 {
            captures
                .get(idx)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0.0)
        };
        // An empty "PT" carries no duration at all.
        if captures.get(1).is_none() && captures.get(2).is_none() && captures.get(3).is_none() {
            return -1.0;
        }
        return 3600.0 * part(1) + 60.0 * part(2) + part(3);
    }

    -1.0
}
