// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Routing-relevance vocabulary: which OSM tags make a way routable,
//! how access values translate into cost multipliers, and how point
//! barriers are priced. The tables can be loaded from a configuration
//! directory ([TagIndex::from_dir]), or the built-in car-oriented
//! defaults can be used ([TagIndex::default]).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Tag values interpreted as "false" (e.g. in `oneway` or `area`).
pub const FALSE_VALUES: &[&str] = &["0", "false", "no"];

/// Tag values interpreted as "travel against the way direction".
pub const REVERSE_VALUES: &[&str] = &["-1", "reverse"];

/// Sentinel cost assigned to barriers which must not be passed at all.
pub const FORBIDDEN_COST: f64 = 99999.0;

/// Allowed traversal directions of a way, using the conventional
/// shapefile-style spelling: `FT` (from-to only), `TF` (to-from only)
/// and `NO` (no restriction, both ways).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "FT",
            Self::Backward => "TF",
            Self::Both => "NO",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-valued result of the area check: `area=yes` polygons must never
/// enter the routing graph, but a way without any area hints may still
/// turn out to be one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Not,
    Maybe,
    Sure,
}

/// Error conditions which may occur while loading configuration tables.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}: {1}")]
    Io(PathBuf, #[source] io::Error),

    #[error("{0}:{1}: invalid entry: {2:?}")]
    InvalidEntry(PathBuf, usize, String),
}

/// Base cost and default access mode of a point barrier value.
#[derive(Debug, Clone, PartialEq)]
pub struct BarrierCost {
    pub cost: f64,
    pub default_access: String,
}

/// Child-to-parent relationships between OSM access keys,
/// e.g. `motorcar` → `motor_vehicle` → `vehicle` → `access`.
#[derive(Debug, Clone, Default)]
pub struct VehicleHierarchy {
    chains: BTreeMap<String, Vec<String>>,
}

impl VehicleHierarchy {
    fn from_parents(parents: &BTreeMap<String, Option<String>>) -> Self {
        let mut chains = BTreeMap::new();
        for key in parents.keys() {
            let mut chain = vec![key.clone()];
            let mut current = parents.get(key).and_then(|p| p.clone());
            while let Some(parent) = current {
                current = parents.get(&parent).and_then(|p| p.clone());
                chain.push(parent);
            }
            chains.insert(key.clone(), chain);
        }
        Self { chains }
    }

    /// Returns the full hierarchy of a vehicle key, starting with the key
    /// itself and ending at the hierarchy root. Unknown keys have an
    /// empty hierarchy.
    pub fn chain(&self, vehicle: &str) -> &[String] {
        self.chains.get(vehicle).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Compiled lookup tables driving the tag-level decisions of the
/// pipeline: routing-relevance predicates, access cost multipliers,
/// barrier costs and jurisdiction speed constants.
#[derive(Debug, Clone)]
pub struct TagIndex {
    area_keys: BTreeSet<String>,
    routable_way_keys: BTreeSet<String>,
    routable_highway_values: BTreeSet<String>,
    routable_junction_values: BTreeSet<String>,
    allowed_vehicle_keys: BTreeSet<String>,
    way_property_keys: BTreeSet<String>,
    access_costs: BTreeMap<String, f64>,
    barrier_costs: BTreeMap<String, BarrierCost>,
    hierarchy: VehicleHierarchy,
    speed_constants: BTreeMap<String, f64>,
}

/// Keys which mark a closed polygon when no `highway` tag is present.
const DEFAULT_AREA_KEYS: &[&str] = &[
    "aeroway", "amenity", "building", "landuse", "leisure", "natural", "shop", "tourism",
    "waterway",
];

/// Keys whose presence makes a way a candidate for routing at all.
const DEFAULT_ROUTABLE_WAY_KEYS: &[&str] = &["ferry", "highway", "junction", "route"];

const DEFAULT_ROUTABLE_HIGHWAY_VALUES: &[&str] = &[
    "living_street",
    "motorway",
    "motorway_link",
    "primary",
    "primary_link",
    "residential",
    "secondary",
    "secondary_link",
    "service",
    "tertiary",
    "tertiary_link",
    "track",
    "trunk",
    "trunk_link",
    "unclassified",
];

const DEFAULT_ROUTABLE_JUNCTION_VALUES: &[&str] = &["circular", "roundabout"];

const DEFAULT_ALLOWED_VEHICLE_KEYS: &[&str] = &["motorcar"];

/// Tags preserved verbatim as per-way property rows.
const DEFAULT_WAY_PROPERTY_KEYS: &[&str] = &[
    "access",
    "bridge",
    "highway",
    "junction",
    "lanes",
    "layer",
    "maxspeed",
    "name",
    "oneway",
    "ref",
    "service",
    "smoothness",
    "surface",
    "tracktype",
    "tunnel",
];

/// Access value → cost multiplier. Negative multipliers forbid passage.
const DEFAULT_ACCESS_COSTS: &[(&str, f64)] = &[
    ("agricultural", 3.0),
    ("delivery", 2.0),
    ("designated", 1.0),
    ("destination", 1.5),
    ("emergency", 2.0),
    ("forestry", 3.0),
    ("military", -1.0),
    ("motor_vehicle", 1.0),
    ("motorcar", 1.0),
    ("no", -1.0),
    ("none", -1.0),
    ("permissive", 1.0),
    ("private", 4.0),
    ("psv", -1.0),
    ("vehicle", 1.0),
    ("yes", 1.0),
];

/// Barrier value → (base cost, default access). A negative base cost
/// forbids passage outright; a zero cost means the barrier is ignored.
const DEFAULT_BARRIER_COSTS: &[(&str, f64, &str)] = &[
    ("block", -1.0, "no"),
    ("bollard", 30.0, "no"),
    ("border_control", 120.0, "yes"),
    ("cattle_grid", 5.0, "yes"),
    ("chain", -1.0, "no"),
    ("checkpoint", 60.0, "yes"),
    ("cycle_barrier", -1.0, "no"),
    ("debris", -1.0, "no"),
    ("entrance", 0.0, "yes"),
    ("gate", 10.0, "yes"),
    ("lift_gate", 15.0, "yes"),
    ("no", 0.0, "yes"),
    ("sally_port", 30.0, "yes"),
    ("swing_gate", 15.0, "no"),
    ("toll_booth", 30.0, "yes"),
];

const DEFAULT_VEHICLE_HIERARCHY: &[(&str, Option<&str>)] = &[
    ("access", None),
    ("motor_vehicle", Some("vehicle")),
    ("motorcar", Some("motor_vehicle")),
    ("vehicle", Some("access")),
];

/// Jurisdiction speed codes, <http://wiki.openstreetmap.org/wiki/Speed_limits>.
/// Imperial limits are already converted to whole km/h.
const DEFAULT_SPEED_CONSTANTS: &[(&str, f64)] = &[
    ("at:rural", 100.0),
    ("at:trunk", 100.0),
    ("ch:motorway", 120.0),
    ("ch:rural", 80.0),
    ("ch:trunk", 100.0),
    ("cz:motorway", 0.0),
    ("cz:trunk", 0.0),
    ("de:living_street", 7.0),
    ("de:motorway", 0.0),
    ("de:rural", 100.0),
    ("gb:motorway", 112.0),
    ("gb:nsl_dual", 112.0),
    ("gb:nsl_single", 96.0),
    ("ro:trunk", 100.0),
    ("ru:living_street", 20.0),
    ("ru:motorway", 110.0),
    ("ru:urban", 60.0),
    ("ua:urban", 60.0),
    ("uk:motorway", 112.0),
    ("uk:nsl_dual", 112.0),
    ("uk:nsl_single", 96.0),
];

/// Fallback speeds for `cc:category` codes whose jurisdiction is not
/// listed in the constants table.
const DEFAULT_CATEGORY_SPEEDS: &[(&str, f64)] = &[
    ("motorway", 130.0),
    ("rural", 90.0),
    ("trunk", 110.0),
    ("urban", 50.0),
];

impl Default for TagIndex {
    fn default() -> Self {
        let parents: BTreeMap<String, Option<String>> = DEFAULT_VEHICLE_HIERARCHY
            .iter()
            .map(|&(child, parent)| (child.to_string(), parent.map(str::to_string)))
            .collect();

        Self {
            area_keys: string_set(DEFAULT_AREA_KEYS),
            routable_way_keys: string_set(DEFAULT_ROUTABLE_WAY_KEYS),
            routable_highway_values: string_set(DEFAULT_ROUTABLE_HIGHWAY_VALUES),
            routable_junction_values: string_set(DEFAULT_ROUTABLE_JUNCTION_VALUES),
            allowed_vehicle_keys: string_set(DEFAULT_ALLOWED_VEHICLE_KEYS),
            way_property_keys: string_set(DEFAULT_WAY_PROPERTY_KEYS),
            access_costs: DEFAULT_ACCESS_COSTS
                .iter()
                .map(|&(value, cost)| (value.to_string(), cost))
                .collect(),
            barrier_costs: DEFAULT_BARRIER_COSTS
                .iter()
                .map(|&(value, cost, default_access)| {
                    (
                        value.to_string(),
                        BarrierCost {
                            cost,
                            default_access: default_access.to_string(),
                        },
                    )
                })
                .collect(),
            hierarchy: VehicleHierarchy::from_parents(&parents),
            speed_constants: DEFAULT_SPEED_CONSTANTS
                .iter()
                .map(|&(code, speed)| (code.to_string(), speed))
                .collect(),
        }
    }
}

impl TagIndex {
    /// Loads all tables from a configuration directory. Set files are
    /// newline-delimited with `#` comments; cost and constant tables are
    /// tab-separated with a single header line. A missing file is fatal.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let parents = load_hierarchy(&dir.join("vehicle_hierarchy.conf"))?;
        Ok(Self {
            area_keys: load_set(&dir.join("area_keys.conf"))?,
            routable_way_keys: load_set(&dir.join("routable_way_keys.conf"))?,
            routable_highway_values: load_set(&dir.join("routable_highway_values.conf"))?,
            routable_junction_values: load_set(&dir.join("routable_junction_values.conf"))?,
            allowed_vehicle_keys: load_set(&dir.join("allowed_vehicle_keys.conf"))?,
            way_property_keys: load_set(&dir.join("way_properties_keys.conf"))?,
            access_costs: load_access_costs(&dir.join("costs/access_costs.conf"))?,
            barrier_costs: load_barrier_costs(&dir.join("costs/point_barrier_costs.conf"))?,
            hierarchy: VehicleHierarchy::from_parents(&parents),
            speed_constants: load_speed_constants(&dir.join("speed_constants.conf"))?,
        })
    }

    /// Checks whether any tag key marks this way as a routing candidate.
    pub fn is_routable_way(&self, tags: &HashMap<String, String>) -> bool {
        tags.keys().any(|k| self.routable_way_keys.contains(k))
    }

    /// Classifies a way as a polygon, a linear feature, or undecidable.
    ///
    /// An explicit `area` tag always wins. Without one, the presence of
    /// any area key is decisive only when no `highway` tag is present.
    pub fn is_area(&self, tags: &HashMap<String, String>) -> Area {
        if let Some(value) = tags.get("area") {
            return if FALSE_VALUES.contains(&value.as_str()) {
                Area::Not
            } else {
                Area::Sure
            };
        }

        if tags.keys().any(|k| self.area_keys.contains(k)) && !tags.contains_key("highway") {
            return Area::Sure;
        }

        Area::Maybe
    }

    pub fn is_routable_highway(&self, tags: &HashMap<String, String>) -> bool {
        tags.get("highway")
            .map(|v| self.routable_highway_values.contains(v))
            .unwrap_or(false)
    }

    pub fn is_routable_junction(&self, tags: &HashMap<String, String>) -> bool {
        tags.get("junction")
            .map(|v| self.routable_junction_values.contains(v))
            .unwrap_or(false)
    }

    /// Checks whether a way is a ferry (or an equivalent boarding route)
    /// usable by any of the allowed vehicles: a `route` value mentioning
    /// `ferry` or a bare `ferry` key, and no allowed vehicle key carrying
    /// an explicit "false" value.
    pub fn is_adequate_ferry(&self, tags: &HashMap<String, String>) -> bool {
        let by_route = tags.get("route").map(|v| v.contains("ferry")).unwrap_or(false);
        if !by_route && !tags.contains_key("ferry") {
            return false;
        }

        for vehicle in &self.allowed_vehicle_keys {
            if let Some(value) = tags.get(vehicle) {
                if FALSE_VALUES.contains(&value.as_str()) {
                    return false;
                }
            }
        }
        true
    }

    /// Resolves the effective access value by walking each allowed
    /// vehicle's hierarchy child-first; the most specific tag wins.
    /// A bare `access` tag overrides the built-in default of `"yes"`.
    pub fn get_actual_access(&self, tags: &HashMap<String, String>) -> String {
        self.get_actual_access_with_default(tags, "yes")
    }

    pub fn get_actual_access_with_default(
        &self,
        tags: &HashMap<String, String>,
        default: &str,
    ) -> String {
        let mut actual = tags
            .get("access")
            .cloned()
            .unwrap_or_else(|| default.to_string());

        for vehicle in &self.allowed_vehicle_keys {
            for key in self.hierarchy.chain(vehicle) {
                if let Some(value) = tags.get(key) {
                    actual = value.clone();
                    break;
                }
            }
        }
        actual
    }

    /// Maps an access value onto a cost multiplier. Semicolon-separated
    /// values are combined: any explicit forbid wins, otherwise the
    /// highest multiplier applies. Unknown values are forbidden.
    pub fn get_access_cost_multiplier(&self, value: &str) -> f64 {
        let mut best = f64::NEG_INFINITY;
        for part in value.split(';') {
            let cost = self
                .access_costs
                .get(part.trim())
                .copied()
                .unwrap_or(-1.0);
            if cost == -1.0 {
                return -1.0;
            }
            best = best.max(cost);
        }
        best
    }

    /// Computes the traversal cost of a point barrier, combining the base
    /// cost with the access multiplier of the effective access value.
    ///
    /// Returns `None` for unknown barrier values, and [FORBIDDEN_COST]
    /// when passage is forbidden (negative base cost or forbidden access).
    pub fn get_barrier_cost(&self, tags: &HashMap<String, String>) -> Option<f64> {
        let value = tags.get("barrier")?;
        let entry = self.barrier_costs.get(value)?;
        if entry.cost < 0.0 {
            return Some(FORBIDDEN_COST);
        }

        let default_access = self.barrier_default_access(tags, entry);
        let actual = self.get_actual_access_with_default(tags, default_access);
        let cost = entry.cost * self.get_access_cost_multiplier(&actual);
        if cost < 0.0 {
            Some(FORBIDDEN_COST)
        } else {
            Some(cost)
        }
    }

    /// Rising bollards are passable by default, no matter what the
    /// barrier table says about plain bollards.
    fn barrier_default_access<'t>(
        &self,
        tags: &HashMap<String, String>,
        entry: &'t BarrierCost,
    ) -> &'t str {
        let rising = tags.get("barrier").map(|v| v.as_str()) == Some("bollard")
            && tags.get("bollard").map(|v| v.contains("rising")).unwrap_or(false);
        if rising {
            "yes"
        } else {
            &entry.default_access
        }
    }

    /// Checks whether a relation type tag denotes a turn restriction
    /// applicable to any of the allowed vehicles: a bare `restriction`,
    /// or `restriction:<vehicle-or-ancestor>`.
    pub fn is_valid_restriction(&self, relation_type: &str) -> bool {
        if relation_type == "restriction" {
            return true;
        }
        self.allowed_vehicle_keys.iter().any(|vehicle| {
            self.hierarchy
                .chain(vehicle)
                .iter()
                .any(|key| relation_type == format!("restriction:{}", key))
        })
    }

    /// Returns true if any allowed vehicle (or an ancestor of it) appears
    /// in the semicolon-separated `except` tag.
    pub fn is_excepted(&self, tags: &HashMap<String, String>) -> bool {
        let excepted: Vec<&str> = match tags.get("except") {
            Some(value) => value.split(';').collect(),
            None => return false,
        };
        self.allowed_vehicle_keys.iter().any(|vehicle| {
            self.hierarchy
                .chain(vehicle)
                .iter()
                .any(|key| excepted.contains(&key.as_str()))
        })
    }

    /// Resolves the canonical restriction value, preferring
    /// vehicle-specific `restriction:<v>` tags over the bare
    /// `restriction` tag.
    pub fn get_actual_restriction_type<'t>(
        &self,
        tags: &'t HashMap<String, String>,
    ) -> Option<&'t str> {
        for vehicle in &self.allowed_vehicle_keys {
            for key in self.hierarchy.chain(vehicle) {
                if let Some(value) = tags.get(&format!("restriction:{}", key)) {
                    return Some(value.as_str());
                }
            }
        }
        tags.get("restriction").map(String::as_str)
    }

    /// Extracts the tags preserved as property rows for a surviving way.
    pub fn useful_properties(&self, tags: &HashMap<String, String>) -> BTreeMap<String, String> {
        tags.iter()
            .filter(|(k, _)| self.way_property_keys.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Resolves a jurisdiction speed code (`de:rural`) to km/h: the full
    /// code first, then the bare category with the generic defaults.
    pub fn speed_constant(&self, code: &str) -> Option<f64> {
        if let Some(&speed) = self.speed_constants.get(code) {
            return Some(speed);
        }
        let category = code.split_once(':')?.1;
        DEFAULT_CATEGORY_SPEEDS
            .iter()
            .find(|(name, _)| *name == category)
            .map(|&(_, speed)| speed)
    }

    /// Access tag keys in most-specific-first order, as consulted by the
    /// way profiler. This is the concatenation of every allowed vehicle's
    /// hierarchy, deduplicated.
    pub fn access_tag_order(&self) -> Vec<String> {
        let mut order = Vec::new();
        for vehicle in &self.allowed_vehicle_keys {
            for key in self.hierarchy.chain(vehicle) {
                if !order.contains(key) {
                    order.push(key.clone());
                }
            }
        }
        if !order.iter().any(|k| k == "access") {
            order.push("access".to_string());
        }
        order
    }
}

fn string_set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Non-empty, non-comment lines of a configuration file, with line numbers.
fn read_lines(path: &Path) -> Result<Vec<(usize, String)>, ConfigError> {
    let content =
        fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    Ok(content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim().to_string()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .collect())
}

fn load_set(path: &Path) -> Result<BTreeSet<String>, ConfigError> {
    Ok(read_lines(path)?.into_iter().map(|(_, line)| line).collect())
}

/// Tab-separated rows of a cost table, with the header line dropped.
fn read_table(path: &Path, columns: usize) -> Result<Vec<(usize, Vec<String>)>, ConfigError> {
    let mut rows = Vec::new();
    for (line_no, line) in read_lines(path)?.into_iter().skip(1) {
        let fields: Vec<String> = line.split('\t').map(|f| f.trim().to_string()).collect();
        if fields.len() < columns {
            return Err(ConfigError::InvalidEntry(path.to_path_buf(), line_no, line));
        }
        rows.push((line_no, fields));
    }
    Ok(rows)
}

fn load_access_costs(path: &Path) -> Result<BTreeMap<String, f64>, ConfigError> {
    let mut costs = BTreeMap::new();
    for (line_no, fields) in read_table(path, 2)? {
        let cost: f64 = fields[1].parse().map_err(|_| {
            ConfigError::InvalidEntry(path.to_path_buf(), line_no, fields[1].clone())
        })?;
        costs.insert(fields[0].clone(), cost);
    }
    Ok(costs)
}

fn load_barrier_costs(path: &Path) -> Result<BTreeMap<String, BarrierCost>, ConfigError> {
    let mut costs = BTreeMap::new();
    for (line_no, fields) in read_table(path, 3)? {
        let cost: f64 = fields[1].parse().map_err(|_| {
            ConfigError::InvalidEntry(path.to_path_buf(), line_no, fields[1].clone())
        })?;
        costs.insert(
            fields[0].clone(),
            BarrierCost {
                cost,
                default_access: fields[2].clone(),
            },
        );
    }
    Ok(costs)
}

fn load_hierarchy(path: &Path) -> Result<BTreeMap<String, Option<String>>, ConfigError> {
    let mut parents = BTreeMap::new();
    for (_, line) in read_lines(path)? {
        match line.split_once('\t') {
            Some((child, parent)) => {
                parents.insert(child.trim().to_string(), Some(parent.trim().to_string()))
            }
            None => parents.insert(line, None),
        };
    }
    Ok(parents)
}

fn load_speed_constants(path: &Path) -> Result<BTreeMap<String, f64>, ConfigError> {
    let mut constants = BTreeMap::new();
    for (line_no, fields) in read_table(path, 2)? {
        let speed = parse_constant_speed(&fields[1]).ok_or_else(|| {
            ConfigError::InvalidEntry(path.to_path_buf(), line_no, fields[1].clone())
        })?;
        constants.insert(fields[0].to_lowercase(), speed);
    }
    Ok(constants)
}

/// Parses a speed constant value: either whole km/h, or `NN mph`
/// converted to whole km/h.
fn parse_constant_speed(value: &str) -> Option<f64> {
    let lower = value.to_lowercase();
    if let Some(miles) = lower.strip_suffix("mph") {
        let miles: f64 = miles.trim().parse().ok()?;
        Some((miles * 1.609344).trunc())
    } else {
        lower.trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    macro_rules! tags {
        {} => { HashMap::default() };
        {$( $k:literal : $v:literal ),+} => {
            HashMap::from_iter([ $( ($k.to_string(), $v.to_string()) ),+ ])
        };
    }

    #[test]
    fn is_routable_way() {
        let index = TagIndex::default();
        assert!(index.is_routable_way(&tags! {"highway": "residential"}));
        assert!(index.is_routable_way(&tags! {"route": "ferry"}));
        assert!(!index.is_routable_way(&tags! {"waterway": "river"}));
        assert!(!index.is_routable_way(&tags! {}));
    }

    #[test]
    fn is_area() {
        let index = TagIndex::default();
        assert_eq!(index.is_area(&tags! {"area": "yes"}), Area::Sure);
        assert_eq!(index.is_area(&tags! {"area": "no"}), Area::Not);
        assert_eq!(index.is_area(&tags! {"landuse": "meadow"}), Area::Sure);
        assert_eq!(
            index.is_area(&tags! {"landuse": "meadow", "highway": "service"}),
            Area::Maybe,
        );
        assert_eq!(index.is_area(&tags! {"highway": "service"}), Area::Maybe);
    }

    #[test]
    fn actual_access() {
        let index = TagIndex::default();
        assert_eq!(index.get_actual_access(&tags! {}), "yes");
        assert_eq!(index.get_actual_access(&tags! {"access": "private"}), "private");
        assert_eq!(
            index.get_actual_access(&tags! {"access": "no", "vehicle": "destination"}),
            "destination",
        );
        // The most specific key of the hierarchy wins.
        assert_eq!(
            index.get_actual_access(&tags! {"vehicle": "yes", "motorcar": "no"}),
            "no",
        );
    }

    #[test]
    fn access_cost_multiplier() {
        let index = TagIndex::default();
        assert_eq!(index.get_access_cost_multiplier("yes"), 1.0);
        assert_eq!(index.get_access_cost_multiplier("private"), 4.0);
        assert_eq!(index.get_access_cost_multiplier("no"), -1.0);
        assert_eq!(index.get_access_cost_multiplier("destination; private"), 4.0);
        // Any explicit forbid wins over other listed values.
        assert_eq!(index.get_access_cost_multiplier("yes;no"), -1.0);
        assert_eq!(index.get_access_cost_multiplier("something_odd"), -1.0);
    }

    #[test]
    fn barrier_cost() {
        let index = TagIndex::default();
        assert_eq!(index.get_barrier_cost(&tags! {"barrier": "gate"}), Some(10.0));
        assert_eq!(index.get_barrier_cost(&tags! {"barrier": "hedge"}), None);
        assert_eq!(index.get_barrier_cost(&tags! {"barrier": "no"}), Some(0.0));
        assert_eq!(
            index.get_barrier_cost(&tags! {"barrier": "block"}),
            Some(FORBIDDEN_COST),
        );
        assert_eq!(
            index.get_barrier_cost(&tags! {"barrier": "gate", "access": "private"}),
            Some(40.0),
        );
        assert_eq!(
            index.get_barrier_cost(&tags! {"barrier": "gate", "motorcar": "no"}),
            Some(FORBIDDEN_COST),
        );
    }

    #[test]
    fn barrier_cost_bollard() {
        let index = TagIndex::default();
        // Plain bollards take the "no" default access from the table.
        assert_eq!(
            index.get_barrier_cost(&tags! {"barrier": "bollard"}),
            Some(FORBIDDEN_COST),
        );
        // Rising bollards default to passable.
        assert_eq!(
            index.get_barrier_cost(&tags! {"barrier": "bollard", "bollard": "rising"}),
            Some(30.0),
        );
    }

    #[test]
    fn valid_restriction() {
        let index = TagIndex::default();
        assert!(index.is_valid_restriction("restriction"));
        assert!(index.is_valid_restriction("restriction:motorcar"));
        assert!(index.is_valid_restriction("restriction:motor_vehicle"));
        assert!(index.is_valid_restriction("restriction:vehicle"));
        assert!(!index.is_valid_restriction("restriction:bicycle"));
        assert!(!index.is_valid_restriction("multipolygon"));
    }

    #[test]
    fn excepted() {
        let index = TagIndex::default();
        assert!(!index.is_excepted(&tags! {}));
        assert!(!index.is_excepted(&tags! {"except": "bicycle;psv"}));
        assert!(index.is_excepted(&tags! {"except": "motorcar"}));
        assert!(index.is_excepted(&tags! {"except": "psv;vehicle"}));
    }

    #[test]
    fn actual_restriction_type() {
        let index = TagIndex::default();
        assert_eq!(index.get_actual_restriction_type(&tags! {}), None);
        assert_eq!(
            index.get_actual_restriction_type(&tags! {"restriction": "no_left_turn"}),
            Some("no_left_turn"),
        );
        assert_eq!(
            index.get_actual_restriction_type(
                &tags! {"restriction": "no_left_turn", "restriction:motorcar": "only_straight_on"}
            ),
            Some("only_straight_on"),
        );
    }

    #[test]
    fn adequate_ferry() {
        let index = TagIndex::default();
        assert!(index.is_adequate_ferry(&tags! {"route": "ferry"}));
        assert!(index.is_adequate_ferry(&tags! {"ferry": "primary"}));
        assert!(!index.is_adequate_ferry(&tags! {"route": "road"}));
        assert!(!index.is_adequate_ferry(&tags! {"route": "ferry", "motorcar": "no"}));
        assert!(!index.is_adequate_ferry(&tags! {}));
    }

    #[test]
    fn speed_constants() {
        let index = TagIndex::default();
        assert_eq!(index.speed_constant("de:rural"), Some(100.0));
        assert_eq!(index.speed_constant("gb:nsl_single"), Some(96.0));
        // Unknown jurisdiction falls back to the bare category.
        assert_eq!(index.speed_constant("fr:urban"), Some(50.0));
        assert_eq!(index.speed_constant("fr:nonsense"), None);
        assert_eq!(index.speed_constant("rural"), None);
    }

    #[test]
    fn useful_properties() {
        let index = TagIndex::default();
        let props = index.useful_properties(
            &tags! {"highway": "residential", "name": "Strada Mare", "source": "survey"},
        );
        assert_eq!(props.len(), 2);
        assert_eq!(props.get("highway").map(String::as_str), Some("residential"));
        assert_eq!(props.get("name").map(String::as_str), Some("Strada Mare"));
    }

    #[test]
    fn load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("costs")).unwrap();

        let write = |name: &str, content: &str| {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(content.as_bytes()).unwrap();
        };

        write("area_keys.conf", "# areas\nlanduse\nleisure\n");
        write("routable_way_keys.conf", "highway\nroute\n");
        write("routable_highway_values.conf", "residential\nprimary\n");
        write("routable_junction_values.conf", "roundabout\n");
        write("allowed_vehicle_keys.conf", "motorcar\n");
        write("way_properties_keys.conf", "name\nref\n");
        write("vehicle_hierarchy.conf", "motorcar\tmotor_vehicle\nmotor_vehicle\taccess\naccess\n");
        write("speed_constants.conf", "code\tspeed\nde:rural\t100\ngb:nsl_single\t60 mph\n");
        write("costs/access_costs.conf", "value\tmultiplier\nyes\t1\nno\t-1\n");
        write(
            "costs/point_barrier_costs.conf",
            "value\tcost\tdefault_access\ngate\t10\tyes\nbollard\t30\tno\n",
        );

        let index = TagIndex::from_dir(dir.path()).unwrap();
        assert!(index.is_routable_way(&tags! {"highway": "residential"}));
        assert!(index.is_routable_highway(&tags! {"highway": "primary"}));
        assert_eq!(index.speed_constant("gb:nsl_single"), Some(96.0));
        assert_eq!(index.get_access_cost_multiplier("yes"), 1.0);
        assert_eq!(index.get_barrier_cost(&tags! {"barrier": "gate"}), Some(10.0));
        assert_eq!(index.hierarchy.chain("motorcar").len(), 3);
    }

    #[test]
    fn missing_config_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(TagIndex::from_dir(dir.path()), Err(ConfigError::Io(_, _))));
    }
}
