// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{Direction, FORBIDDEN_COST};

/// A junction of the normalized network: an OSM node shared by at least
/// two routable ways (or ending one), carrying the set of incident
/// segments.
#[derive(Debug, Clone)]
pub struct RoutingNode {
    pub osm_id: i64,
    segments: BTreeSet<i64>,
}

impl RoutingNode {
    pub fn new(osm_id: i64) -> Self {
        Self {
            osm_id,
            segments: BTreeSet::new(),
        }
    }

    pub fn use_segment(&mut self, segment_id: i64) {
        self.segments.insert(segment_id);
    }

    /// Ids of all segments whose head or tail is this node, in
    /// ascending order.
    pub fn edges(&self) -> &BTreeSet<i64> {
        &self.segments
    }
}

/// A routable way accepted during the first parsing pass, holding its
/// node placeholders until normalization splits it into segments.
#[derive(Debug, Clone)]
pub struct RoutingWay {
    pub osm_id: i64,
    placeholders: Vec<i64>,
    segments: Vec<i64>,
    split: bool,

    pub oneway: Direction,
    pub forward_speed: f64,
    pub backward_speed: f64,
    pub duration: f64,
    pub name: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl RoutingWay {
    pub fn new(osm_id: i64) -> Self {
        Self {
            osm_id,
            placeholders: Vec::new(),
            segments: Vec::new(),
            split: false,
            oneway: Direction::Both,
            forward_speed: -1.0,
            backward_speed: -1.0,
            duration: -1.0,
            name: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn add_node_placeholder(&mut self, node_id: i64) {
        assert!(
            !self.split,
            "way {} already split, cannot add any more placeholders",
            self.osm_id,
        );
        self.placeholders.push(node_id);
    }

    pub fn placeholders(&self) -> &[i64] {
        &self.placeholders
    }

    /// Dense ids of the segments created from this way, in traversal
    /// order. Empty until normalization.
    pub fn segments(&self) -> &[i64] {
        &self.segments
    }

    /// Cuts the way into maximal segments between consecutive junction
    /// nodes, registering every new segment with the junctions at both
    /// of its ends and with the point barrier at its tail, if any.
    ///
    /// A way without any junction among its placeholders yields no
    /// segments. Calling this a second time has no effect.
    pub fn split_at_junctions(
        &mut self,
        ids: &mut SegmentIdSource,
        arena: &mut Vec<WaySegment>,
        nodes: &mut BTreeMap<i64, RoutingNode>,
        barriers: &mut BTreeMap<i64, Restriction>,
    ) {
        if self.split {
            return;
        }
        self.split = true;

        let mut last_stop = 0;
        let mut index = 0;
        for idx in 1..self.placeholders.len() {
            let node_id = self.placeholders[idx];
            if !nodes.contains_key(&node_id) {
                continue;
            }

            let db_id = ids.next_id();
            let segment =
                WaySegment::new(db_id, self.osm_id, index, &self.placeholders[last_stop..=idx]);
            debug_assert_eq!(arena.len() as i64 + 1, db_id);
            arena.push(segment);
            self.segments.push(db_id);

            nodes
                .get_mut(&node_id)
                .expect("segment tail is a junction")
                .use_segment(db_id);
            nodes
                .get_mut(&self.placeholders[last_stop])
                .expect("segment head is a junction")
                .use_segment(db_id);
            if let Some(barrier) = barriers.get_mut(&node_id) {
                barrier.add_source_segment(db_id, self.osm_id);
            }

            last_stop = idx;
            index += 1;
        }
    }
}

/// The atomic edge of the routing graph: a maximal stretch of a way
/// between two consecutive junction nodes. Non-junction nodes passed
/// through are kept as interior geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaySegment {
    pub db_id: i64,
    /// OSM id of the way this segment was cut from.
    pub parent: i64,
    /// Position of this segment within the parent way.
    pub index: usize,
    head: i64,
    tail: i64,
    interior: Vec<i64>,
}

impl WaySegment {
    fn new(db_id: i64, parent: i64, index: usize, node_ids: &[i64]) -> Self {
        debug_assert!(node_ids.len() >= 2);
        Self {
            db_id,
            parent,
            index,
            head: node_ids[0],
            tail: node_ids[node_ids.len() - 1],
            interior: node_ids[1..node_ids.len() - 1].to_vec(),
        }
    }

    pub fn head(&self) -> i64 {
        self.head
    }

    pub fn tail(&self) -> i64 {
        self.tail
    }

    pub fn interior(&self) -> &[i64] {
        &self.interior
    }

    pub fn touches(&self, node_id: i64) -> bool {
        self.head == node_id || self.tail == node_id
    }

    /// All node ids of the segment in traversal order.
    pub fn node_ids(&self) -> Vec<i64> {
        let mut ids = Vec::with_capacity(self.interior.len() + 2);
        ids.push(self.head);
        ids.extend_from_slice(&self.interior);
        ids.push(self.tail);
        ids
    }

    /// The node adjacent to the head, used for turn geometry; falls back
    /// to the tail when the segment has no interior nodes.
    pub fn node_near_head(&self) -> i64 {
        self.interior.first().copied().unwrap_or(self.tail)
    }

    /// The node adjacent to the tail; the head for segments without
    /// interior nodes.
    pub fn node_near_tail(&self) -> i64 {
        self.interior.last().copied().unwrap_or(self.head)
    }
}

/// A turn restriction accumulated from an OSM relation, or a point
/// barrier synthesized from a barrier-tagged node (`is_point`).
///
/// `from`/`to` hold OSM way ids until [Restriction::validate_ways]
/// drops the ones which did not survive profiling.
#[derive(Debug, Clone)]
pub struct Restriction {
    pub osm_id: i64,
    pub is_point: bool,
    from: Vec<i64>,
    to: Vec<i64>,
    via_nodes: Vec<i64>,
    via_ways: Vec<i64>,
    properties: BTreeMap<String, String>,
    pub cost: f64,
    source_edges: BTreeSet<i64>,
}

impl Restriction {
    pub fn new(osm_id: i64, is_point: bool) -> Self {
        let mut properties = BTreeMap::new();
        if is_point {
            properties.insert("restriction".to_string(), "barrier".to_string());
        }
        Self {
            osm_id,
            is_point,
            from: Vec::new(),
            to: Vec::new(),
            via_nodes: Vec::new(),
            via_ways: Vec::new(),
            properties,
            cost: FORBIDDEN_COST,
            source_edges: BTreeSet::new(),
        }
    }

    pub fn add_from(&mut self, way_id: i64) {
        self.from.push(way_id);
    }

    pub fn add_to(&mut self, way_id: i64) {
        self.to.push(way_id);
    }

    pub fn add_via_node(&mut self, node_id: i64) {
        self.via_nodes.push(node_id);
    }

    pub fn add_via_way(&mut self, way_id: i64) {
        self.via_ways.push(way_id);
    }

    pub fn from_ways(&self) -> &[i64] {
        &self.from
    }

    pub fn to_ways(&self) -> &[i64] {
        &self.to
    }

    pub fn via_nodes(&self) -> &[i64] {
        &self.via_nodes
    }

    pub fn first_via_node(&self) -> Option<i64> {
        self.via_nodes.first().copied()
    }

    pub fn set_property(&mut self, key: &str, value: &str) {
        if let Some(previous) = self.properties.get(key) {
            log::warn!(
                "restriction {}: key {:?} already exists with value {:?}, replacing with {:?}",
                self.osm_id,
                key,
                previous,
                value,
            );
        }
        self.properties
            .insert(key.to_string(), value.to_string());
    }

    /// Overwrites the canonical restriction value resolved by the tag
    /// index (e.g. from a vehicle-specific `restriction:motorcar` tag).
    pub fn set_restriction_type(&mut self, value: &str) {
        self.properties
            .insert("restriction".to_string(), value.to_string());
    }

    pub fn restriction_type(&self) -> &str {
        self.properties
            .get("restriction")
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn set_cost(&mut self, cost: f64) {
        self.cost = cost;
    }

    /// Registers a segment ending at this barrier's node. The segment's
    /// parent way becomes a `from` member, so barrier resolution can
    /// enumerate all segments around the node.
    pub fn add_source_segment(&mut self, segment_id: i64, parent_way: i64) {
        self.source_edges.insert(segment_id);
        if self.is_point && !self.from.contains(&parent_way) {
            self.from.push(parent_way);
        }
    }

    pub fn source_edges(&self) -> &BTreeSet<i64> {
        &self.source_edges
    }

    /// A restriction makes sense once it has a `from` way, and, unless
    /// it is a point barrier, a `to` way.
    pub fn seems_valid(&self) -> bool {
        !self.from.is_empty() && (self.is_point || !self.to.is_empty())
    }

    /// Drops `from`/`to` members which no longer resolve to surviving
    /// ways; returns whether the restriction still makes sense.
    pub fn validate_ways<W>(&mut self, ways: &BTreeMap<i64, W>) -> bool {
        self.from.retain(|id| ways.contains_key(id));
        self.to.retain(|id| ways.contains_key(id));
        self.seems_valid()
    }

    /// Way ids appearing on both the `from` and the `to` side.
    pub fn has_common_ends(&self) -> bool {
        self.from.iter().any(|id| self.to.contains(id))
    }
}

/// A turn restriction lowered onto concrete segments: turning from
/// `from_segment` onto `to_segment` over `via_node` is restricted.
///
/// Synthetic rows produced by `only_*` expansion carry neither a via
/// node nor a kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ProperRestriction {
    pub from_segment: i64,
    pub to_segment: i64,
    pub via_node: Option<i64>,
    pub kind: Option<String>,
    /// OSM id of the relation or barrier node this row was lowered from.
    pub parent_osm_id: i64,
    pub cost: f64,
    /// Turn angle at the via node in degrees, `[0, 360)`.
    pub angle: Option<f64>,
}

/// Source of dense segment ids, `1..`.
#[derive(Debug, Default)]
pub struct SegmentIdSource(i64);

impl SegmentIdSource {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn next_id(&mut self) -> i64 {
        self.0 += 1;
        self.0
    }
}
