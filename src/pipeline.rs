// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! The driver of the loading pipeline: two passes over the OSM stream
//! (ways/relations/barriers first, then coordinates of the referenced
//! nodes), normalization, restriction resolution, and phased emission
//! into a [Sink].

use std::collections::BTreeSet;
use std::path::Path;

use crate::config::{Area, Direction, TagIndex};
use crate::geom;
use crate::geom::Projection;
use crate::network::{Network, Restriction, RoutingWay};
use crate::osm::reader;
use crate::osm::reader::{Feature, FeatureStream, FeatureType, FileFormat};
use crate::osm::Profiler;
use crate::resolve;
use crate::resolve::NodeCoordinates;
use crate::sink::{NodeRow, RestrictionRow, SegmentRow, Sink, SinkError};

/// Controls for a single pipeline run.
pub struct Options<'a> {
    pub tag_index: &'a TagIndex,
    pub file_format: FileFormat,
    /// Projection under which segment lengths are measured.
    pub projection: &'a dyn Projection,
}

/// Error conditions aborting a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reader: {0}")]
    Reader(#[from] reader::Error),

    #[error("sink: {0}")]
    Sink(#[from] SinkError),
}

/// Row counts of a completed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub ways: usize,
    pub nodes: usize,
    pub segments: usize,
    pub restrictions: usize,
}

/// Runs the whole pipeline over the OSM file at `path`, emitting the
/// normalized network into `sink`. The file is read twice: the second
/// pass only collects coordinates of nodes the network references.
pub fn load_from_file<P: AsRef<Path>, S: Sink>(
    path: P,
    options: &Options<'_>,
    sink: &mut S,
) -> Result<Stats, Error> {
    let path = path.as_ref();
    run(
        || reader::features_from_file(path, options.file_format),
        options,
        sink,
    )
}

/// Runs the whole pipeline over a buffer of OSM XML, mainly for tests
/// and callers with their own transport.
pub fn load_from_buffer<S: Sink>(
    data: &[u8],
    options: &Options<'_>,
    sink: &mut S,
) -> Result<Stats, Error> {
    run(|| Ok(reader::features_from_buffer(data)), options, sink)
}

fn run<'a, S, F>(mut open: F, options: &Options<'_>, sink: &mut S) -> Result<Stats, Error>
where
    S: Sink,
    F: FnMut() -> Result<FeatureStream<'a>, reader::Error>,
{
    let mut collector = Collector::new(options.tag_index);
    for feature in open()? {
        collector.process_feature(feature?);
    }

    let mut network = collector.network;
    network.normalize();
    log::info!(
        "network normalized: {} ways, {} junction nodes, {} segments",
        network.ways().len(),
        network.nodes().len(),
        network.segments().len(),
    );

    let used: BTreeSet<i64> = network.used_node_ids().into_iter().collect();
    log::info!("reading coordinates of {} nodes", used.len());
    let mut coordinates = NodeCoordinates::new();
    for feature in open()? {
        if let Feature::Node(node) = feature? {
            if used.contains(&node.id) {
                coordinates.insert(node.id, (node.lon, node.lat));
            }
        }
    }

    emit(&network, &coordinates, options, sink)
}

/// First-pass accumulator: filters ways, restriction relations and
/// barrier nodes into the [Network] registry.
struct Collector<'a> {
    index: &'a TagIndex,
    profiler: Profiler<'a>,
    network: Network,
}

impl<'a> Collector<'a> {
    fn new(index: &'a TagIndex) -> Self {
        Self {
            index,
            profiler: Profiler::new(index),
            network: Network::new(),
        }
    }

    fn process_feature(&mut self, feature: Feature) {
        match feature {
            Feature::Node(node) => self.process_barrier(node),
            Feature::Way(way) => self.process_way(way),
            Feature::Relation(relation) => self.process_relation(relation),
        }
    }

    fn process_way(&mut self, way: reader::Way) {
        let reader::Way {
            id,
            nodes,
            mut tags,
        } = way;

        if nodes.len() < 2
            || !self.index.is_routable_way(&tags)
            || self.index.is_area(&tags) == Area::Sure
        {
            return;
        }
        if !(self.index.is_routable_highway(&tags)
            || self.index.is_adequate_ferry(&tags)
            || self.index.is_routable_junction(&tags))
        {
            return;
        }

        let access = self.index.get_actual_access(&tags);
        let multiplier = self.index.get_access_cost_multiplier(&access);
        if multiplier <= 0.0 {
            if access != "no" {
                log::warn!("ignoring way {} because actual access is {:?}", id, access);
            }
            return;
        }
        // Make the resolved access visible to the profiler and the
        // property sink.
        tags.insert("access".to_string(), access);

        let mut useful_nodes: Vec<i64> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if useful_nodes.last() == Some(&node) {
                log::warn!("multiple successive appearances of node {} on way {}", node, id);
            } else {
                useful_nodes.push(node);
            }
        }
        if useful_nodes.len() < 2 {
            log::warn!("way {} has only one distinct node", id);
            return;
        }

        let profile = match self.profiler.profile(&tags) {
            Some(profile)
                if profile.forward_speed > 0.0 || profile.backward_speed > 0.0 =>
            {
                profile
            }
            _ => {
                log::warn!("profile rejected way {}", id);
                return;
            }
        };

        let oneway = match (profile.forward_mode.is_open(), profile.backward_mode.is_open()) {
            (true, true) => Direction::Both,
            (true, false) => Direction::Forward,
            (false, true) => Direction::Backward,
            (false, false) => {
                log::warn!("way {} is not traversable in either direction", id);
                return;
            }
        };

        let mut routing_way = RoutingWay::new(id);
        routing_way.oneway = oneway;
        if profile.duration > 0.0 {
            routing_way.duration = profile.duration;
        }
        routing_way.forward_speed = profile.forward_speed;
        routing_way.backward_speed = profile.backward_speed;
        routing_way.name = profile.name;
        routing_way.properties = self.index.useful_properties(&tags);

        let first = useful_nodes[0];
        let last = useful_nodes[useful_nodes.len() - 1];
        for &node in &useful_nodes {
            routing_way.add_node_placeholder(node);
            self.network.node_way_map().record(node, Some(id));
        }
        // Way endpoints count twice, so they always become junctions.
        self.network.node_way_map().record(first, Some(id));
        self.network.node_way_map().record(last, Some(id));

        self.network.insert_way(routing_way);
    }

    fn process_relation(&mut self, relation: reader::Relation) {
        let valid_type = relation
            .tags
            .get("type")
            .map(|t| self.index.is_valid_restriction(t))
            .unwrap_or(false);
        if !valid_type {
            return;
        }

        let mut restriction = Restriction::new(relation.id, false);
        for member in &relation.members {
            match (member.role.as_str(), member.type_) {
                ("from", FeatureType::Way) => restriction.add_from(member.ref_),
                ("to", FeatureType::Way) => restriction.add_to(member.ref_),
                ("from", FeatureType::Node) | ("to", FeatureType::Node) => {
                    log::error!("found node as end member in restriction {}", relation.id);
                }
                ("via", FeatureType::Way) => restriction.add_via_way(member.ref_),
                ("via", FeatureType::Node) => {
                    self.network.node_way_map().record(member.ref_, None);
                    restriction.add_via_node(member.ref_);
                }
                _ => {}
            }
        }
        for (key, value) in &relation.tags {
            restriction.set_property(key, value);
        }

        if !restriction.seems_valid() {
            return;
        }
        if self.index.is_excepted(&relation.tags) {
            log::info!(
                "excepted restriction {}; except tag was {:?}",
                relation.id,
                relation.tags.get("except"),
            );
            return;
        }
        let actual = match self.index.get_actual_restriction_type(&relation.tags) {
            Some(actual) => actual.to_string(),
            None => {
                log::info!("restriction {} not applicable", relation.id);
                return;
            }
        };
        if actual == "no_u_turn" && restriction.has_common_ends() {
            log::warn!(
                "no_u_turn restriction {} with common from and to ways",
                relation.id,
            );
            return;
        }
        restriction.set_restriction_type(&actual);

        self.network.insert_relation_restriction(restriction);
    }

    fn process_barrier(&mut self, node: reader::Node) {
        if !node.tags.contains_key("barrier") {
            return;
        }
        match self.index.get_barrier_cost(&node.tags) {
            None => {
                log::warn!(
                    "unknown barrier value {:?} for node {}",
                    node.tags.get("barrier"),
                    node.id,
                );
            }
            Some(cost) if cost == 0.0 => {}
            Some(cost) => {
                self.network.node_way_map().record(node.id, None);
                let mut barrier = Restriction::new(node.id, true);
                barrier.set_cost(cost);
                barrier.add_via_node(node.id);
                self.network.insert_barrier_restriction(barrier);
            }
        }
    }
}

/// Emits the normalized network: junction nodes, then segments and way
/// properties, then resolved restrictions, with a flush at every phase
/// boundary, and finally the topology rebuild.
fn emit<S: Sink>(
    network: &Network,
    coordinates: &NodeCoordinates,
    options: &Options<'_>,
    sink: &mut S,
) -> Result<Stats, Error> {
    let mut stats = Stats {
        ways: network.ways().len(),
        ..Stats::default()
    };

    sink.init_schema()?;

    for node_id in network.nodes().keys() {
        match coordinates.get(node_id) {
            Some(&(lon, lat)) => {
                sink.insert_node(&NodeRow {
                    osm_id: *node_id,
                    lon,
                    lat,
                })?;
                stats.nodes += 1;
            }
            None => log::error!("no coordinates for junction node {}", node_id),
        }
    }
    sink.flush()?;
    log::info!("{} nodes written", stats.nodes);

    for way in network.ways().values() {
        for &segment_id in way.segments() {
            let segment = network.segment(segment_id);
            let points: Option<Vec<(f64, f64)>> = segment
                .node_ids()
                .iter()
                .map(|id| coordinates.get(id).copied())
                .collect();
            let points = match points {
                Some(points) => points,
                None => {
                    log::error!(
                        "error writing segment {} of way {}: missing node coordinates",
                        segment.index,
                        way.osm_id,
                    );
                    continue;
                }
            };

            sink.insert_segment(&SegmentRow {
                segment_id,
                from_osm_id: segment.head(),
                to_osm_id: segment.tail(),
                maxspeed_forward: way.forward_speed,
                maxspeed_backward: way.backward_speed,
                oneway: way.oneway,
                osm_id: way.osm_id,
                segment_index: segment.index as i64,
                geom_wkt: geom::wkt_linestring(&points),
                projected_length: geom::projected_length(&points, options.projection),
            })?;
            stats.segments += 1;
        }

        for (key, value) in &way.properties {
            sink.insert_way_property(way.osm_id, key, value)?;
        }
    }
    sink.flush()?;
    log::info!("{} segments written", stats.segments);

    for row in resolve::resolve(network, coordinates, options.projection) {
        let geom_wkt = row
            .via_node
            .and_then(|id| coordinates.get(&id))
            .map(|&(lon, lat)| geom::wkt_point(lon, lat));
        sink.insert_restriction(&RestrictionRow {
            from_segment_id: row.from_segment,
            to_segment_id: row.to_segment,
            via_node_osm_id: row.via_node,
            restriction_osm_id: row.parent_osm_id,
            cost: row.cost,
            geom_wkt,
        })?;
        stats.restrictions += 1;
    }
    sink.flush()?;
    log::info!("{} restrictions written", stats.restrictions);

    sink.rebuild_topology()?;
    sink.finish()?;
    Ok(stats)
}
