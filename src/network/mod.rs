// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Streaming accumulator for routable ways, restrictions and barriers,
//! and the normalization step turning them into a segment graph.
//!
//! The registry is filled during the first parsing pass, normalized
//! exactly once (junction promotion, way splitting, restriction
//! validation), and sealed afterwards: attempts to ingest further
//! primitives are programming errors.

use std::collections::BTreeMap;
use std::sync::Mutex;

mod objects;

pub use objects::{
    ProperRestriction, Restriction, RoutingNode, RoutingWay, SegmentIdSource, WaySegment,
};

/// Append-only multi-map from node ids to the ways using them.
///
/// A node is recorded once per appearance on a routable way, and the
/// first and last node of every way a second time, so that way endpoints
/// always reach junction multiplicity. Barrier nodes and restriction
/// via-nodes are recorded without a way (`None`).
///
/// Appends are guarded by a single mutex, so parser callbacks running on
/// worker threads may push concurrently.
#[derive(Debug, Default)]
pub struct NodeWayMap {
    entries: Mutex<BTreeMap<i64, Vec<Option<i64>>>>,
}

impl NodeWayMap {
    pub fn record(&self, node_id: i64, way_id: Option<i64>) {
        self.entries
            .lock()
            .expect("node-way map lock poisoned")
            .entry(node_id)
            .or_default()
            .push(way_id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("node-way map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All node ids recorded so far, in ascending order.
    pub fn node_ids(&self) -> Vec<i64> {
        self.entries
            .lock()
            .expect("node-way map lock poisoned")
            .keys()
            .copied()
            .collect()
    }

}

/// The accumulated road network: ways, restrictions and barriers keyed
/// by OSM id, plus - after [Network::normalize] - junction nodes and the
/// segment arena indexed by dense id.
#[derive(Debug, Default)]
pub struct Network {
    ways: BTreeMap<i64, RoutingWay>,
    nodes: BTreeMap<i64, RoutingNode>,
    segments: Vec<WaySegment>,
    relation_restrictions: BTreeMap<i64, Restriction>,
    barrier_restrictions: BTreeMap<i64, Restriction>,
    node_way_map: NodeWayMap,
    normalized: bool,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_way_map(&self) -> &NodeWayMap {
        &self.node_way_map
    }

    pub fn insert_way(&mut self, way: RoutingWay) {
        assert!(!self.normalized, "network sealed, cannot ingest further ways");
        self.ways.insert(way.osm_id, way);
    }

    pub fn insert_relation_restriction(&mut self, restriction: Restriction) {
        assert!(
            !self.normalized,
            "network sealed, cannot ingest further restrictions",
        );
        self.relation_restrictions
            .insert(restriction.osm_id, restriction);
    }

    pub fn insert_barrier_restriction(&mut self, barrier: Restriction) {
        assert!(
            !self.normalized,
            "network sealed, cannot ingest further barriers",
        );
        self.barrier_restrictions.insert(barrier.osm_id, barrier);
    }

    pub fn ways(&self) -> &BTreeMap<i64, RoutingWay> {
        &self.ways
    }

    pub fn nodes(&self) -> &BTreeMap<i64, RoutingNode> {
        &self.nodes
    }

    pub fn relation_restrictions(&self) -> &BTreeMap<i64, Restriction> {
        &self.relation_restrictions
    }

    pub fn barrier_restrictions(&self) -> &BTreeMap<i64, Restriction> {
        &self.barrier_restrictions
    }

    /// Looks up a segment by its dense id.
    pub fn segment(&self, db_id: i64) -> &WaySegment {
        &self.segments[(db_id - 1) as usize]
    }

    pub fn segments(&self) -> &[WaySegment] {
        &self.segments
    }

    /// Ids of all nodes referenced by any surviving way, barrier or
    /// via-member; the set of nodes whose coordinates the second pass
    /// must deliver.
    pub fn used_node_ids(&self) -> Vec<i64> {
        self.node_way_map.node_ids()
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Builds the segment graph: promotes every node used more than once
    /// to a junction, splits every way at its junctions (assigning dense
    /// segment ids in ascending way-id order), and drops restrictions
    /// whose members did not survive profiling. Idempotent; seals the
    /// registry.
    pub fn normalize(&mut self) {
        if self.normalized {
            return;
        }
        self.normalized = true;

        {
            let entries = self
                .node_way_map
                .entries
                .lock()
                .expect("node-way map lock poisoned");
            for (&node_id, uses) in entries.iter() {
                if uses.len() > 1 {
                    self.nodes.insert(node_id, RoutingNode::new(node_id));
                }
            }
        }

        let mut ids = SegmentIdSource::new();
        for way in self.ways.values_mut() {
            way.split_at_junctions(
                &mut ids,
                &mut self.segments,
                &mut self.nodes,
                &mut self.barrier_restrictions,
            );
        }

        let ways = &self.ways;
        self.relation_restrictions.retain(|id, restriction| {
            let valid = restriction.validate_ways(ways);
            if !valid {
                log::warn!("deleting restriction relation {} between unroutable ways", id);
            }
            valid
        });
        self.barrier_restrictions.retain(|id, barrier| {
            let valid = barrier.validate_ways(ways);
            if !valid {
                log::warn!("deleting barrier restriction {} on unroutable way(s)", id);
            }
            valid
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Registers a way's placeholders the way the first parsing pass
    /// does: once per node, and the endpoints a second time.
    fn add_way(network: &mut Network, osm_id: i64, nodes: &[i64]) {
        let mut way = RoutingWay::new(osm_id);
        for &node in nodes {
            way.add_node_placeholder(node);
            network.node_way_map().record(node, Some(osm_id));
        }
        network.node_way_map().record(nodes[0], Some(osm_id));
        network
            .node_way_map()
            .record(nodes[nodes.len() - 1], Some(osm_id));
        network.insert_way(way);
    }

    #[test]
    fn splits_at_shared_nodes() {
        let mut network = Network::new();
        add_way(&mut network, 100, &[1, 2, 3, 4]);
        add_way(&mut network, 101, &[2, 5]);
        network.normalize();

        // Way 100 splits at node 2 only: 1-2 and 2-3-4.
        let segments = network.ways()[&100].segments();
        assert_eq!(segments.len(), 2);
        let first = network.segment(segments[0]);
        assert_eq!((first.head(), first.tail()), (1, 2));
        assert_eq!(first.interior(), &[] as &[i64]);
        assert_eq!(first.index, 0);
        let second = network.segment(segments[1]);
        assert_eq!((second.head(), second.tail()), (2, 4));
        assert_eq!(second.interior(), &[3]);
        assert_eq!(second.index, 1);

        // Dense ids are assigned in creation order, starting at 1.
        assert_eq!(segments, &[1, 2]);
        assert_eq!(network.ways()[&101].segments(), &[3]);

        // Node 2 is a junction with all three segments incident.
        let edges: Vec<i64> = network.nodes()[&2].edges().iter().copied().collect();
        assert_eq!(edges, vec![1, 2, 3]);

        // Interior node 3 is no junction.
        assert!(!network.nodes().contains_key(&3));
    }

    #[test]
    fn endpoints_are_always_junctions() {
        let mut network = Network::new();
        add_way(&mut network, 100, &[1, 2, 3]);
        network.normalize();

        assert!(network.nodes().contains_key(&1));
        assert!(network.nodes().contains_key(&3));
        assert!(!network.nodes().contains_key(&2));
        assert_eq!(network.ways()[&100].segments().len(), 1);
    }

    #[test]
    fn way_without_junctions_yields_no_segments() {
        let mut network = Network::new();
        // Bypass the endpoint double-marking: no node reaches junction
        // multiplicity, so nothing can be split.
        let mut way = RoutingWay::new(100);
        for node in [1, 2, 3] {
            way.add_node_placeholder(node);
            network.node_way_map().record(node, Some(100));
        }
        network.insert_way(way);
        network.normalize();

        assert!(network.nodes().is_empty());
        assert!(network.ways()[&100].segments().is_empty());
    }

    #[test]
    fn barriers_collect_source_segments() {
        let mut network = Network::new();
        add_way(&mut network, 100, &[1, 2, 3]);
        let mut barrier = Restriction::new(2, true);
        barrier.add_via_node(2);
        network.node_way_map().record(2, None);
        network.insert_barrier_restriction(barrier);
        network.normalize();

        let barrier = &network.barrier_restrictions()[&2];
        assert_eq!(barrier.from_ways(), &[100]);
        // Only the segment ending at the barrier node is a source edge.
        let sources: Vec<i64> = barrier.source_edges().iter().copied().collect();
        assert_eq!(sources, vec![1]);
        assert_eq!(network.segment(1).tail(), 2);
    }

    #[test]
    fn invalid_restrictions_are_dropped() {
        let mut network = Network::new();
        add_way(&mut network, 100, &[1, 2]);

        let mut kept = Restriction::new(200, false);
        kept.add_from(100);
        kept.add_to(100);
        network.insert_relation_restriction(kept);

        let mut dropped = Restriction::new(201, false);
        dropped.add_from(100);
        dropped.add_to(999); // never profiled
        network.insert_relation_restriction(dropped);

        network.normalize();
        assert!(network.relation_restrictions().contains_key(&200));
        assert!(!network.relation_restrictions().contains_key(&201));
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut network = Network::new();
        add_way(&mut network, 100, &[1, 2]);
        network.normalize();
        let segments = network.segments().len();
        network.normalize();
        assert_eq!(network.segments().len(), segments);
    }

    #[test]
    #[should_panic(expected = "sealed")]
    fn sealed_network_rejects_ways() {
        let mut network = Network::new();
        network.normalize();
        network.insert_way(RoutingWay::new(1));
    }

    #[test]
    #[should_panic(expected = "already split")]
    fn split_way_rejects_placeholders() {
        let mut network = Network::new();
        add_way(&mut network, 100, &[1, 2]);
        network.normalize();

        // Simulate a late placeholder on an already split way.
        let mut way = network.ways()[&100].clone();
        way.add_node_placeholder(3);
    }
}
