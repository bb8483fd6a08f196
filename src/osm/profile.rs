// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Derives per-way routing attributes from an OSM tag map.
//!
//! The interpretation follows the usual car-profile conventions: class
//! speeds per `highway` value, `maxspeed` overrides (numeric, `mph` or
//! jurisdiction codes), ferry and movable-bridge handling with optional
//! crossing durations, surface-quality caps, one-way detection and a
//! final speed scaling for realistic average driving times.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::TagIndex;
use crate::duration::parse_duration;

/// Travel mode of one direction of a way. [Mode::Closed] marks a
/// direction which must not be traversed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Closed,
    Normal,
    Ferry,
    MovableBridge,
}

impl Mode {
    pub fn is_open(&self) -> bool {
        *self != Mode::Closed
    }
}

/// Routing attributes of a single way, as derived by [Profiler::profile].
#[derive(Debug, Clone, PartialEq)]
pub struct WayProfile {
    pub forward_speed: f64,
    pub backward_speed: f64,
    pub forward_mode: Mode,
    pub backward_mode: Mode,

    /// Fixed crossing time in seconds (ferries, movable bridges);
    /// zero when the way is traversed at speed.
    pub duration: f64,

    /// Display name composed from the `name` and `ref` tags.
    pub name: Option<String>,

    pub roundabout: bool,

    /// Whether routes may start or end on this way. Ferries and movable
    /// bridges can only be traversed in full.
    pub is_startpoint: bool,

    /// Whether access is allowed under restrictions only
    /// (`destination`, `private`, a parking aisle and the like).
    pub is_access_restricted: bool,
}

/// Average speed per road class, in km/h. The `ferry`, `movable` and
/// `shuttle_train` entries are matched against `route`/`bridge` values,
/// `default` against accessible ways of an unknown class.
const CLASS_SPEEDS: &[(&str, f64)] = &[
    ("motorway", 90.0),
    ("motorway_link", 45.0),
    ("trunk", 85.0),
    ("trunk_link", 40.0),
    ("primary", 65.0),
    ("primary_link", 30.0),
    ("secondary", 55.0),
    ("secondary_link", 25.0),
    ("tertiary", 40.0),
    ("tertiary_link", 20.0),
    ("unclassified", 25.0),
    ("residential", 25.0),
    ("living_street", 10.0),
    ("service", 15.0),
    ("track", 5.0),
    ("ferry", 5.0),
    ("movable", 5.0),
    ("shuttle_train", 10.0),
    ("default", 10.0),
];

/// Speed caps for surfaces worse than plain asphalt. Paved surfaces
/// (asphalt, concrete and friends) carry no cap and are not listed.
const SURFACE_SPEEDS: &[(&str, f64)] = &[
    ("cement", 80.0),
    ("compacted", 80.0),
    ("fine_gravel", 80.0),
    ("paving_stones", 60.0),
    ("metal", 60.0),
    ("bricks", 60.0),
    ("grass", 40.0),
    ("wood", 40.0),
    ("sett", 40.0),
    ("grass_paver", 40.0),
    ("gravel", 40.0),
    ("unpaved", 40.0),
    ("ground", 40.0),
    ("dirt", 40.0),
    ("pebblestone", 40.0),
    ("tartan", 40.0),
    ("cobblestone", 30.0),
    ("clay", 30.0),
    ("earth", 20.0),
    ("stone", 20.0),
    ("rocky", 20.0),
    ("sand", 20.0),
    ("mud", 10.0),
];

const TRACKTYPE_SPEEDS: &[(&str, f64)] = &[
    ("grade1", 60.0),
    ("grade2", 40.0),
    ("grade3", 30.0),
    ("grade4", 25.0),
    ("grade5", 20.0),
];

const SMOOTHNESS_SPEEDS: &[(&str, f64)] = &[
    ("intermediate", 80.0),
    ("bad", 40.0),
    ("very_bad", 20.0),
    ("horrible", 10.0),
    ("very_horrible", 5.0),
    ("impassable", 0.0),
];

/// Access values allowing travel on ways of an unknown road class.
const ACCESS_WHITELIST: &[&str] = &[
    "yes",
    "motorcar",
    "motor_vehicle",
    "vehicle",
    "permissive",
    "designated",
    "destination",
];

/// Access values rejecting a way outright.
const ACCESS_BLACKLIST: &[&str] = &["no", "psv"];

/// Access values allowing travel under restrictions only.
const ACCESS_RESTRICTED: &[&str] = &[
    "destination",
    "delivery",
    "emergency",
    "private",
    "agricultural",
    "forestry",
];

const SERVICE_RESTRICTED: &[&str] = &["parking_aisle"];

/// Clamp applied when no usable `maxspeed` is tagged.
const MAXSPEED_CLAMP: f64 = 160.0;

/// Class speeds are scaled by `v * SPEED_REDUCTION + 11` to approximate
/// average rather than free-flow driving times.
const SPEED_REDUCTION: f64 = 0.8;

const SIDE_ROAD_MULTIPLIER: f64 = 0.8;

/// Leading (possibly signed, possibly decimal) number of a tag value.
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(-?\d+(?:\.\d*)?)").unwrap());

/// Imperial speed markers: `mph`, `mp/h`, with arbitrary prefix.
static MPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"mp/?h").unwrap());

fn class_speed(class: &str) -> Option<f64> {
    CLASS_SPEEDS
        .iter()
        .find(|(name, _)| *name == class)
        .map(|&(_, speed)| speed)
}

fn table_speed(table: &[(&str, f64)], value: &str) -> Option<f64> {
    table
        .iter()
        .find(|(name, _)| *name == value)
        .map(|&(_, speed)| speed)
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

/// Parses a numeric prefix of a tag value (`width`, `lanes`).
fn leading_number(value: &str) -> Option<f64> {
    NUMBER.captures(value).and_then(|c| c[1].parse().ok())
}

/// Computes [WayProfiles](WayProfile) from tag maps. The [TagIndex]
/// supplies the vehicle hierarchy for access resolution and the
/// jurisdiction table for `maxspeed` constants.
#[derive(Debug, Clone, Copy)]
pub struct Profiler<'a> {
    index: &'a TagIndex,
}

impl<'a> Profiler<'a> {
    pub fn new(index: &'a TagIndex) -> Self {
        Self { index }
    }

    /// Parses a `maxspeed`-style value into km/h.
    ///
    /// Accepts plain numbers (any unit suffix other than `mph` is read
    /// as km/h), `N mph` (converted to whole km/h), and jurisdiction
    /// codes such as `de:rural`. Returns 0 for absent or unusable values.
    pub fn parse_maxspeed(&self, value: Option<&str>) -> f64 {
        let value = match value {
            Some(v) => v,
            None => return 0.0,
        };

        if let Some(captures) = NUMBER.captures(value) {
            let n: f64 = match captures[1].parse() {
                Ok(n) => n,
                Err(_) => return 0.0,
            };
            return if MPH.is_match(value) {
                (n * 1609.0 / 1000.0).trunc()
            } else {
                n
            };
        }

        self.index
            .speed_constant(&value.to_lowercase())
            .unwrap_or(0.0)
    }

    /// Returns the value of the most specific access tag, walking the
    /// vehicle hierarchy child-first. Empty when no access tag is set.
    fn find_access_tag<'t>(&self, tags: &'t HashMap<String, String>) -> &'t str {
        for key in self.index.access_tag_order() {
            if let Some(value) = tags.get(&key) {
                if !value.is_empty() {
                    return value;
                }
            }
        }
        ""
    }

    /// Derives the routing attributes of a way, or `None` when the way
    /// must not participate in routing at all.
    pub fn profile(&self, tags: &HashMap<String, String>) -> Option<WayProfile> {
        let highway = non_empty(tags.get("highway"));
        let route = non_empty(tags.get("route"));
        let bridge = non_empty(tags.get("bridge"));
        if highway.is_none() && route.is_none() && bridge.is_none() {
            return None;
        }

        // Polygons and ways closed for traffic never enter the graph.
        if tags.get("area").map(String::as_str) == Some("yes") {
            return None;
        }
        let oneway = tags.get("oneway").map(String::as_str);
        if oneway == Some("reversible") {
            return None;
        }
        if tags.get("impassable").map(String::as_str) == Some("yes") {
            return None;
        }
        if tags.get("status").map(String::as_str) == Some("impassable") {
            return None;
        }

        let access = self.find_access_tag(tags);
        if ACCESS_BLACKLIST.contains(&access) {
            return None;
        }

        let mut forward_speed = -1.0_f64;
        let mut backward_speed = -1.0_f64;
        let mut forward_mode = Mode::Normal;
        let mut backward_mode = Mode::Normal;
        let mut duration = 0.0;
        let mut class = highway;

        // Ferries and piers travel at the ferry speed, optionally with a
        // fixed crossing time.
        if let Some(route_value) = route {
            if let Some(route_speed) = class_speed(route_value) {
                class = Some(route_value);
                let crossing = parse_duration(tags.get("duration").map(String::as_str));
                if crossing > -1.0 {
                    duration = crossing.max(1.0);
                }
                forward_mode = Mode::Ferry;
                backward_mode = Mode::Ferry;
                forward_speed = route_speed;
                backward_speed = route_speed;
            }
        }

        // Movable bridges, unless explicitly closed for cars.
        if let Some(bridge_value) = bridge {
            if let Some(bridge_speed) = class_speed(bridge_value) {
                if tags.get("capacity:car").map(String::as_str) != Some("0") {
                    class = Some(bridge_value);
                    let crossing = parse_duration(tags.get("duration").map(String::as_str));
                    if crossing > -1.0 {
                        duration = crossing.max(1.0);
                    }
                    forward_mode = Mode::MovableBridge;
                    backward_mode = Mode::MovableBridge;
                    forward_speed = bridge_speed;
                    backward_speed = bridge_speed;
                }
            }
        }

        let class = class?;

        if forward_speed == -1.0 {
            let highway_speed = class_speed(class);
            let mut max_speed = self.parse_maxspeed(tags.get("maxspeed").map(String::as_str));

            if let Some(highway_speed) = highway_speed {
                if max_speed > highway_speed {
                    forward_speed = max_speed;
                    backward_speed = max_speed;
                } else {
                    forward_speed = highway_speed;
                    backward_speed = highway_speed;
                }
            } else if ACCESS_WHITELIST.contains(&access) {
                // Unknown road class, but explicitly accessible.
                forward_speed = class_speed("default").unwrap();
                backward_speed = class_speed("default").unwrap();
            }

            if max_speed == 0.0 {
                max_speed = MAXSPEED_CLAMP;
            }
            forward_speed = forward_speed.min(max_speed);
            backward_speed = backward_speed.min(max_speed);
        }

        if forward_speed == -1.0 && backward_speed == -1.0 {
            log::debug!("no usable speed for way tags {:?}", tags);
            return None;
        }

        if let Some(side_road) = tags.get("side_road").map(String::as_str) {
            if side_road == "yes" || side_road == "rotary" {
                forward_speed *= SIDE_ROAD_MULTIPLIER;
                backward_speed *= SIDE_ROAD_MULTIPLIER;
            }
        }

        // Reduce speed on bad surfaces.
        for (key, table) in [
            ("surface", SURFACE_SPEEDS),
            ("tracktype", TRACKTYPE_SPEEDS),
            ("smoothness", SMOOTHNESS_SPEEDS),
        ] {
            if let Some(cap) = tags.get(key).and_then(|v| table_speed(table, v)) {
                forward_speed = forward_speed.min(cap);
                backward_speed = backward_speed.min(cap);
            }
        }

        let name = match (non_empty(tags.get("name")), non_empty(tags.get("ref"))) {
            (Some(name), Some(reference)) => Some(format!("{} ({})", name, reference)),
            (None, Some(reference)) => Some(reference.to_string()),
            (Some(name), None) => Some(name.to_string()),
            (None, None) => None,
        };

        let roundabout = tags.get("junction").map(String::as_str) == Some("roundabout");

        let mut is_access_restricted = !access.is_empty() && ACCESS_RESTRICTED.contains(&access);
        if let Some(service) = non_empty(tags.get("service")) {
            if SERVICE_RESTRICTED.contains(&service) {
                is_access_restricted = true;
            }
        }

        // One-way handling: explicit tags first, then the road classes
        // which default to one-way. Only motorways honor `oneway=no`.
        let motorway_class = class == "motorway" || class == "motorway_link";
        match oneway {
            Some("-1") => forward_mode = Mode::Closed,
            Some(value) => {
                let truthy = value == "yes" || value == "1" || value == "true";
                if truthy || roundabout || (motorway_class && value != "no") {
                    backward_mode = Mode::Closed;
                }
            }
            None => {
                if roundabout || motorway_class {
                    backward_mode = Mode::Closed;
                }
            }
        }

        // Explicit per-direction maxspeeds override everything so far.
        let maxspeed_forward =
            self.parse_maxspeed(tags.get("maxspeed:forward").map(String::as_str));
        let maxspeed_backward =
            self.parse_maxspeed(tags.get("maxspeed:backward").map(String::as_str));
        if maxspeed_forward > 0.0 {
            if forward_mode.is_open() && backward_mode.is_open() {
                backward_speed = forward_speed;
            }
            forward_speed = maxspeed_forward;
        }
        if maxspeed_backward > 0.0 {
            backward_speed = maxspeed_backward;
        }

        // Advisory speeds, same precedence: bidirectional first.
        let advisory = self.parse_maxspeed(tags.get("maxspeed:advisory").map(String::as_str));
        let advisory_forward =
            self.parse_maxspeed(tags.get("maxspeed:advisory:forward").map(String::as_str));
        let advisory_backward =
            self.parse_maxspeed(tags.get("maxspeed:advisory:backward").map(String::as_str));
        if advisory > 0.0 {
            if forward_mode.is_open() {
                forward_speed = advisory;
            }
            if backward_mode.is_open() {
                backward_speed = advisory;
            }
        }
        if advisory_forward > 0.0 {
            if forward_mode.is_open() && backward_mode.is_open() {
                backward_speed = forward_speed;
            }
            forward_speed = advisory_forward;
        }
        if advisory_backward > 0.0 {
            backward_speed = advisory_backward;
        }

        let mut width = f64::INFINITY;
        let mut lanes = f64::INFINITY;
        if forward_speed > 0.0 || backward_speed > 0.0 {
            if let Some(value) = tags.get("width").and_then(|v| leading_number(v)) {
                width = value;
            }
            if let Some(value) = tags.get("lanes").and_then(|v| leading_number(v)) {
                lanes = value;
            }
        }

        let is_bidirectional = forward_mode.is_open() && backward_mode.is_open();
        let narrow = width <= 3.0 || (lanes <= 1.0 && is_bidirectional);

        // Scale speeds to approximate average driving times; narrow roads
        // are capped at half their free-flow speed.
        if forward_speed > 0.0 {
            let scaled = forward_speed * SPEED_REDUCTION + 11.0;
            let penalized = if narrow {
                forward_speed / 2.0
            } else {
                f64::INFINITY
            };
            forward_speed = penalized.min(scaled);
        }
        if backward_speed > 0.0 {
            let scaled = backward_speed * SPEED_REDUCTION + 11.0;
            let penalized = if narrow {
                backward_speed / 2.0
            } else {
                f64::INFINITY
            };
            backward_speed = penalized.min(scaled);
        }

        Some(WayProfile {
            forward_speed,
            backward_speed,
            forward_mode,
            backward_mode,
            duration,
            name,
            roundabout,
            is_startpoint: forward_mode == Mode::Normal || backward_mode == Mode::Normal,
            is_access_restricted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagIndex;

    macro_rules! tags {
        {} => { HashMap::default() };
        {$( $k:literal : $v:literal ),+} => {
            HashMap::from_iter([ $( ($k.to_string(), $v.to_string()) ),+ ])
        };
    }

    fn profile(tags: &HashMap<String, String>) -> Option<WayProfile> {
        let index = TagIndex::default();
        Profiler::new(&index).profile(tags)
    }

    #[test]
    fn parse_maxspeed() {
        let index = TagIndex::default();
        let profiler = Profiler::new(&index);
        assert_eq!(profiler.parse_maxspeed(None), 0.0);
        assert_eq!(profiler.parse_maxspeed(Some("90")), 90.0);
        assert_eq!(profiler.parse_maxspeed(Some("90 kmh")), 90.0);
        assert_eq!(profiler.parse_maxspeed(Some("55 mph")), 88.0);
        assert_eq!(profiler.parse_maxspeed(Some("55mp/h")), 88.0);
        assert_eq!(profiler.parse_maxspeed(Some("de:rural")), 100.0);
        assert_eq!(profiler.parse_maxspeed(Some("DE:rural")), 100.0);
        assert_eq!(profiler.parse_maxspeed(Some("walk")), 0.0);
    }

    #[test]
    fn residential_defaults() {
        let p = profile(&tags! {"highway": "residential"}).unwrap();
        // 25 km/h class speed, scaled for average driving times.
        assert_eq!(p.forward_speed, 31.0);
        assert_eq!(p.backward_speed, 31.0);
        assert_eq!(p.forward_mode, Mode::Normal);
        assert_eq!(p.backward_mode, Mode::Normal);
        assert_eq!(p.duration, 0.0);
        assert!(p.is_startpoint);
        assert!(!p.is_access_restricted);
    }

    #[test]
    fn maxspeed_overrides() {
        // Tagged maxspeed above the class speed raises it.
        let p = profile(&tags! {"highway": "residential", "maxspeed": "50"}).unwrap();
        assert_eq!(p.forward_speed, 51.0);

        // Tagged maxspeed below the class speed caps it.
        let p = profile(&tags! {"highway": "residential", "maxspeed": "20"}).unwrap();
        assert_eq!(p.forward_speed, 27.0);

        // Imperial and jurisdiction values.
        let p = profile(&tags! {"highway": "residential", "maxspeed": "55 mph"}).unwrap();
        assert_eq!(p.forward_speed, 88.0 * 0.8 + 11.0);
        let p = profile(&tags! {"highway": "residential", "maxspeed": "de:rural"}).unwrap();
        assert_eq!(p.forward_speed, 100.0 * 0.8 + 11.0);
    }

    #[test]
    fn direction_handling() {
        let p = profile(&tags! {"highway": "residential", "oneway": "yes"}).unwrap();
        assert_eq!(p.forward_mode, Mode::Normal);
        assert_eq!(p.backward_mode, Mode::Closed);

        let p = profile(&tags! {"highway": "residential", "oneway": "-1"}).unwrap();
        assert_eq!(p.forward_mode, Mode::Closed);
        assert_eq!(p.backward_mode, Mode::Normal);

        // Motorways and roundabouts default to one-way.
        let p = profile(&tags! {"highway": "motorway"}).unwrap();
        assert_eq!(p.backward_mode, Mode::Closed);
        let p = profile(&tags! {"highway": "primary", "junction": "roundabout"}).unwrap();
        assert_eq!(p.backward_mode, Mode::Closed);
        assert!(p.roundabout);

        // ...unless overridden.
        let p = profile(&tags! {"highway": "motorway", "oneway": "no"}).unwrap();
        assert_eq!(p.backward_mode, Mode::Normal);
    }

    #[test]
    fn directional_maxspeeds() {
        let p = profile(
            &tags! {"highway": "primary", "maxspeed:forward": "80", "maxspeed:backward": "40"},
        )
        .unwrap();
        assert_eq!(p.forward_speed, 80.0 * 0.8 + 11.0);
        assert_eq!(p.backward_speed, 40.0 * 0.8 + 11.0);

        // Advisory values take over where tagged.
        let p = profile(&tags! {"highway": "primary", "maxspeed:advisory": "50"}).unwrap();
        assert_eq!(p.forward_speed, 51.0);
        assert_eq!(p.backward_speed, 51.0);
    }

    #[test]
    fn ferries() {
        let p = profile(&tags! {"route": "ferry", "duration": "1:30:00"}).unwrap();
        assert_eq!(p.forward_mode, Mode::Ferry);
        assert_eq!(p.backward_mode, Mode::Ferry);
        assert_eq!(p.duration, 5400.0);
        assert!(!p.is_startpoint);

        // Sub-second durations are floored to one second.
        let p = profile(&tags! {"route": "ferry", "duration": "0"}).unwrap();
        assert_eq!(p.duration, 1.0);
    }

    #[test]
    fn movable_bridges() {
        let p = profile(&tags! {"bridge": "movable", "highway": "secondary"}).unwrap();
        assert_eq!(p.forward_mode, Mode::MovableBridge);

        // A movable bridge closed for cars falls back to the road class.
        let p = profile(
            &tags! {"bridge": "movable", "highway": "secondary", "capacity:car": "0"},
        )
        .unwrap();
        assert_eq!(p.forward_mode, Mode::Normal);
        assert_eq!(p.forward_speed, 55.0 * 0.8 + 11.0);
    }

    #[test]
    fn surface_caps() {
        let p = profile(&tags! {"highway": "residential", "surface": "mud"}).unwrap();
        assert_eq!(p.forward_speed, 10.0 * 0.8 + 11.0);

        // A cap above the class speed changes nothing.
        let p = profile(&tags! {"highway": "residential", "surface": "gravel"}).unwrap();
        assert_eq!(p.forward_speed, 31.0);

        let p = profile(&tags! {"highway": "track", "tracktype": "grade5"}).unwrap();
        assert_eq!(p.forward_speed, 5.0 * 0.8 + 11.0);
    }

    #[test]
    fn narrow_ways() {
        let p = profile(&tags! {"highway": "residential", "width": "2.5"}).unwrap();
        assert_eq!(p.forward_speed, 12.5);

        let p = profile(&tags! {"highway": "residential", "lanes": "1"}).unwrap();
        assert_eq!(p.forward_speed, 12.5);

        // A single lane on a one-way road is not narrow.
        let p = profile(&tags! {"highway": "residential", "lanes": "1", "oneway": "yes"}).unwrap();
        assert_eq!(p.forward_speed, 31.0);
    }

    #[test]
    fn rejections() {
        assert!(profile(&tags! {}).is_none());
        assert!(profile(&tags! {"waterway": "river"}).is_none());
        assert!(profile(&tags! {"highway": "residential", "area": "yes"}).is_none());
        assert!(profile(&tags! {"highway": "residential", "oneway": "reversible"}).is_none());
        assert!(profile(&tags! {"highway": "residential", "impassable": "yes"}).is_none());
        assert!(profile(&tags! {"highway": "residential", "status": "impassable"}).is_none());
        assert!(profile(&tags! {"highway": "residential", "access": "no"}).is_none());
        assert!(profile(&tags! {"highway": "residential", "motorcar": "no"}).is_none());
        // An unknown road class without explicit access yields no speed.
        assert!(profile(&tags! {"highway": "corridor"}).is_none());
    }

    #[test]
    fn unknown_class_with_access() {
        let p = profile(&tags! {"highway": "corridor", "access": "yes"}).unwrap();
        assert_eq!(p.forward_speed, 10.0 * 0.8 + 11.0);
    }

    #[test]
    fn specific_access_wins() {
        // motorcar=yes overrides access=no.
        let p = profile(&tags! {"highway": "residential", "access": "no", "motorcar": "yes"});
        assert!(p.is_some());
    }

    #[test]
    fn names() {
        let p = profile(&tags! {"highway": "primary", "name": "Calea Victoriei", "ref": "DN1"})
            .unwrap();
        assert_eq!(p.name.as_deref(), Some("Calea Victoriei (DN1)"));

        let p = profile(&tags! {"highway": "primary", "ref": "DN1"}).unwrap();
        assert_eq!(p.name.as_deref(), Some("DN1"));

        let p = profile(&tags! {"highway": "primary"}).unwrap();
        assert_eq!(p.name, None);
    }

    #[test]
    fn restricted_access_flag() {
        let p = profile(&tags! {"highway": "service", "access": "destination"}).unwrap();
        assert!(p.is_access_restricted);

        let p = profile(&tags! {"highway": "service", "service": "parking_aisle"}).unwrap();
        assert!(p.is_access_restricted);
    }

    #[test]
    fn side_roads() {
        let p = profile(&tags! {"highway": "primary", "side_road": "yes"}).unwrap();
        assert_eq!(p.forward_speed, 65.0 * 0.8 * 0.8 + 11.0);
    }
}
