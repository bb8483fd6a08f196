// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Lowers turn-restriction relations and point barriers onto concrete
//! `(from segment, via node, to segment)` triples, and expands `only_*`
//! rules into prohibitions of every other turn at the junction.

use std::collections::{BTreeMap, BTreeSet};

use crate::geom::{turn_angle, Projection};
use crate::network::{Network, ProperRestriction, Restriction};

/// Coordinates of all referenced nodes, as collected by the second
/// parsing pass: OSM node id → (lon, lat).
pub type NodeCoordinates = BTreeMap<i64, (f64, f64)>;

/// Resolves every surviving restriction of the network into the final
/// list of [ProperRestrictions](ProperRestriction), in emission order.
pub fn resolve(
    network: &Network,
    coordinates: &NodeCoordinates,
    projection: &dyn Projection,
) -> Vec<ProperRestriction> {
    // Group all lowered rows by their (source segment, via node) pair;
    // `only_*` semantics apply per approach.
    let mut groups: BTreeMap<(i64, i64), Vec<ProperRestriction>> = BTreeMap::new();

    for restriction in network.relation_restrictions().values() {
        for (via_node, rows) in relation_rows(restriction, network, coordinates, projection) {
            for row in rows {
                groups
                    .entry((row.from_segment, via_node))
                    .or_default()
                    .push(row);
            }
        }
    }

    for barrier in network.barrier_restrictions().values() {
        for row in barrier_rows(barrier, network) {
            let via_node = row.via_node.expect("barrier rows always carry a via node");
            groups
                .entry((row.from_segment, via_node))
                .or_default()
                .push(row);
        }
    }

    let mut out = Vec::new();
    for ((_, via_node), rows) in groups {
        expand_group(via_node, rows, network, &mut out);
    }
    out
}

fn kind_of(row: &ProperRestriction) -> &str {
    row.kind.as_deref().unwrap_or("")
}

/// Applies `only_*` expansion to all rows sharing a source segment and a
/// via node, appending the final rows to `out`.
fn expand_group(
    via_node: i64,
    rows: Vec<ProperRestriction>,
    network: &Network,
    out: &mut Vec<ProperRestriction>,
) {
    let only_rows: Vec<&ProperRestriction> = rows
        .iter()
        .filter(|row| kind_of(row).starts_with("only"))
        .collect();
    let only_targets: BTreeSet<i64> = only_rows.iter().map(|row| row.to_segment).collect();

    if only_targets.is_empty() {
        // No mandatory turn here: prohibitions and barriers pass through.
        let mut has_explicit_no = false;
        for row in &rows {
            if kind_of(row).starts_with("no") {
                out.push(row.clone());
                has_explicit_no = true;
            }
        }
        for row in &rows {
            if kind_of(row) == "barrier" {
                if has_explicit_no {
                    log::warn!("barrier {} overlaps a no_* restriction", via_node);
                }
                out.push(row.clone());
            }
        }
        return;
    }

    // A mandatory turn: everything incident on the via node except the
    // permitted targets must be blocked.
    let incident = network.nodes()[&via_node].edges();
    let mut block_routes: BTreeSet<i64> =
        incident.difference(&only_targets).copied().collect();

    let mut explicit_no = BTreeSet::new();
    for row in &rows {
        if block_routes.contains(&row.to_segment) || kind_of(row).starts_with("no") {
            explicit_no.insert(row.to_segment);
            out.push(row.clone());
        }
        if kind_of(row) == "barrier" {
            log::warn!("barrier {} on an only_* restriction", via_node);
        }
    }
    block_routes = block_routes.difference(&explicit_no).copied().collect();

    // Synthesize prohibitions for the remaining incident segments.
    let pivot = only_rows[0];
    for &segment in incident {
        if block_routes.contains(&segment) {
            out.push(ProperRestriction {
                from_segment: pivot.from_segment,
                to_segment: segment,
                via_node: None,
                kind: None,
                parent_osm_id: pivot.parent_osm_id,
                cost: pivot.cost,
                angle: None,
            });
        }
    }
}

/// Lowers a relation restriction: every `(from way, to way)` pair is
/// searched for segment pairs whose endpoints coincide on a junction,
/// grouped by that junction. With a declared via node only the matches
/// at that node survive; without one, every match does, with a warning.
fn relation_rows(
    restriction: &Restriction,
    network: &Network,
    coordinates: &NodeCoordinates,
    projection: &dyn Projection,
) -> BTreeMap<i64, Vec<ProperRestriction>> {
    let mut by_via: BTreeMap<i64, Vec<ProperRestriction>> = BTreeMap::new();

    for &from_way in restriction.from_ways() {
        for &to_way in restriction.to_ways() {
            for row in common_segments(restriction, from_way, to_way, network, coordinates, projection)
            {
                let via = row.via_node.expect("coincidence rows carry a via node");
                by_via.entry(via).or_default().push(row);
            }
        }
    }

    match restriction.first_via_node() {
        Some(declared) => {
            if let Some(rows) = by_via.remove(&declared) {
                BTreeMap::from([(declared, rows)])
            } else {
                log::warn!(
                    "restriction {}: via node declared {}, should be one of {:?}",
                    restriction.osm_id,
                    declared,
                    by_via.keys().collect::<Vec<_>>(),
                );
                BTreeMap::new()
            }
        }
        None => {
            log::warn!(
                "restriction {}: no via node declared; found {:?}",
                restriction.osm_id,
                by_via.keys().collect::<Vec<_>>(),
            );
            by_via
        }
    }
}

/// All head/tail coincidences between the segments of two ways. Each
/// coincidence yields one row with the turn angle at the shared node.
fn common_segments(
    restriction: &Restriction,
    from_way: i64,
    to_way: i64,
    network: &Network,
    coordinates: &NodeCoordinates,
    projection: &dyn Projection,
) -> Vec<ProperRestriction> {
    let mut rows = Vec::new();
    let from_segments = network.ways()[&from_way].segments();
    let to_segments = network.ways()[&to_way].segments();

    for &s1 in from_segments {
        for &s2 in to_segments {
            let seg1 = network.segment(s1);
            let seg2 = network.segment(s2);

            // (neighbor of the shared end on seg1, shared, neighbor on seg2)
            let coincidences = [
                (seg1.head() == seg2.head())
                    .then(|| (seg1.node_near_head(), seg1.head(), seg2.node_near_head())),
                (seg1.head() == seg2.tail())
                    .then(|| (seg1.node_near_head(), seg1.head(), seg2.node_near_tail())),
                (seg1.tail() == seg2.head())
                    .then(|| (seg1.node_near_tail(), seg1.tail(), seg2.node_near_head())),
                (seg1.tail() == seg2.tail())
                    .then(|| (seg1.node_near_tail(), seg1.tail(), seg2.node_near_tail())),
            ];

            for (before, shared, after) in coincidences.into_iter().flatten() {
                let angle = match (
                    coordinates.get(&before),
                    coordinates.get(&shared),
                    coordinates.get(&after),
                ) {
                    (Some(&p1), Some(&p2), Some(&p3)) => {
                        Some(turn_angle(p1, p2, p3, projection))
                    }
                    _ => None,
                };
                rows.push(ProperRestriction {
                    from_segment: s1,
                    to_segment: s2,
                    via_node: Some(shared),
                    kind: Some(restriction.restriction_type().to_string()),
                    parent_osm_id: restriction.osm_id,
                    cost: restriction.cost,
                    angle,
                });
            }
        }
    }
    rows
}

/// Lowers a point barrier: every unordered pair of distinct segments
/// around the barrier's node (drawn from the barrier's `from` ways)
/// yields two rows, one per direction.
fn barrier_rows(barrier: &Restriction, network: &Network) -> Vec<ProperRestriction> {
    let via_node = match barrier.first_via_node() {
        Some(node) => node,
        None => return Vec::new(),
    };

    let from_ways = barrier.from_ways();
    let mut known: BTreeSet<(i64, i64)> = BTreeSet::new();
    let mut rows = Vec::new();

    for (i, &way1) in from_ways.iter().enumerate() {
        for &way2 in &from_ways[i..] {
            for &s1 in network.ways()[&way1].segments() {
                for &s2 in network.ways()[&way2].segments() {
                    if s1 == s2 || known.contains(&(s2, s1)) || known.contains(&(s1, s2)) {
                        continue;
                    }
                    if !network.segment(s1).touches(via_node)
                        || !network.segment(s2).touches(via_node)
                    {
                        continue;
                    }

                    for (from, to) in [(s1, s2), (s2, s1)] {
                        rows.push(ProperRestriction {
                            from_segment: from,
                            to_segment: to,
                            via_node: Some(via_node),
                            kind: Some(barrier.restriction_type().to_string()),
                            parent_osm_id: barrier.osm_id,
                            cost: barrier.cost,
                            angle: None,
                        });
                    }
                    known.insert((s1, s2));
                }
            }
        }
    }

    if rows.len() > 2 {
        log::info!("barrier {} affects more than two segments", via_node);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::WebMercator;
    use crate::network::{Restriction, RoutingWay};

    /// Four ways radiating from node 5:
    ///
    /// ```text
    ///        2 (north)
    ///        |
    /// 1 ---- 5 ---- 3
    ///        |
    ///        4 (south)
    /// ```
    ///
    /// Way 101: 1-5 (segment 1), way 102: 5-2 (segment 2),
    /// way 103: 5-3 (segment 3), way 104: 5-4 (segment 4).
    fn crossroads() -> (Network, NodeCoordinates) {
        let mut network = Network::new();
        for (osm_id, nodes) in [
            (101, [1, 5]),
            (102, [5, 2]),
            (103, [5, 3]),
            (104, [5, 4]),
        ] {
            let mut way = RoutingWay::new(osm_id);
            for &node in &nodes {
                way.add_node_placeholder(node);
                network.node_way_map().record(node, Some(osm_id));
            }
            network.node_way_map().record(nodes[0], Some(osm_id));
            network.node_way_map().record(nodes[1], Some(osm_id));
            network.insert_way(way);
        }

        let coordinates = NodeCoordinates::from([
            (1, (-0.001, 0.0)),
            (2, (0.0, 0.001)),
            (3, (0.001, 0.0)),
            (4, (0.0, -0.001)),
            (5, (0.0, 0.0)),
        ]);
        (network, coordinates)
    }

    fn no_left_turn(from: i64, to: i64, via: Option<i64>) -> Restriction {
        let mut restriction = Restriction::new(900, false);
        restriction.add_from(from);
        restriction.add_to(to);
        if let Some(via) = via {
            restriction.add_via_node(via);
        }
        restriction.set_restriction_type("no_left_turn");
        restriction
    }

    #[test]
    fn relation_yields_one_row_per_coincidence() {
        let (mut network, coordinates) = crossroads();
        network.insert_relation_restriction(no_left_turn(101, 102, Some(5)));
        network.normalize();

        let rows = resolve(&network, &coordinates, &WebMercator);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].from_segment, 1);
        assert_eq!(rows[0].to_segment, 2);
        assert_eq!(rows[0].via_node, Some(5));
        assert_eq!(rows[0].kind.as_deref(), Some("no_left_turn"));
        // Approaching eastbound on 1-5, node 2 is to the left.
        assert!((rows[0].angle.unwrap() - 270.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_via_node_discards_the_restriction() {
        let (mut network, coordinates) = crossroads();
        // Node 3 is a junction, but not where ways 101 and 102 meet.
        network.insert_relation_restriction(no_left_turn(101, 102, Some(3)));
        network.normalize();

        assert!(resolve(&network, &coordinates, &WebMercator).is_empty());
    }

    #[test]
    fn missing_via_node_keeps_all_matches() {
        let (mut network, coordinates) = crossroads();
        network.insert_relation_restriction(no_left_turn(101, 102, None));
        network.normalize();

        let rows = resolve(&network, &coordinates, &WebMercator);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].via_node, Some(5));
    }

    #[test]
    fn only_rule_blocks_every_other_turn() {
        let (mut network, coordinates) = crossroads();
        let mut only = Restriction::new(901, false);
        only.add_from(101);
        only.add_to(103);
        only.add_via_node(5);
        only.set_restriction_type("only_straight_on");
        network.insert_relation_restriction(only);
        network.normalize();

        let rows = resolve(&network, &coordinates, &WebMercator);
        // The only_* row itself is not emitted; synthetic prohibitions
        // cover the remaining incident segments, the source included.
        let synthetic: Vec<&ProperRestriction> =
            rows.iter().filter(|row| row.kind.is_none()).collect();
        assert_eq!(rows.len(), synthetic.len());
        let targets: BTreeSet<i64> = synthetic.iter().map(|row| row.to_segment).collect();
        assert_eq!(targets, BTreeSet::from([1, 2, 4]));
        for row in &synthetic {
            assert_eq!(row.from_segment, 1);
            assert_eq!(row.via_node, None);
            assert_eq!(row.parent_osm_id, 901);
        }
    }

    #[test]
    fn explicit_no_wins_over_synthetic_rows() {
        let (mut network, coordinates) = crossroads();
        let mut only = Restriction::new(901, false);
        only.add_from(101);
        only.add_to(103);
        only.add_via_node(5);
        only.set_restriction_type("only_straight_on");
        network.insert_relation_restriction(only);
        // An explicit prohibition of the same approach onto way 102.
        let mut no = no_left_turn(101, 102, Some(5));
        no.osm_id = 902;
        network.insert_relation_restriction(no);
        network.normalize();

        let rows = resolve(&network, &coordinates, &WebMercator);
        let explicit: Vec<&ProperRestriction> =
            rows.iter().filter(|row| row.kind.is_some()).collect();
        assert_eq!(explicit.len(), 1);
        assert_eq!(explicit[0].to_segment, 2);
        // Segment 2 is covered by the explicit row; synthetic rows cover
        // the rest.
        let synthetic_targets: BTreeSet<i64> = rows
            .iter()
            .filter(|row| row.kind.is_none())
            .map(|row| row.to_segment)
            .collect();
        assert_eq!(synthetic_targets, BTreeSet::from([1, 4]));
    }

    #[test]
    fn barrier_blocks_both_directions() {
        let mut network = Network::new();
        let mut way = RoutingWay::new(100);
        for node in [1, 2, 3] {
            way.add_node_placeholder(node);
            network.node_way_map().record(node, Some(100));
        }
        network.node_way_map().record(1, Some(100));
        network.node_way_map().record(3, Some(100));
        network.insert_way(way);

        let mut barrier = Restriction::new(2, true);
        barrier.add_via_node(2);
        barrier.set_cost(30.0);
        network.node_way_map().record(2, None);
        network.insert_barrier_restriction(barrier);
        network.normalize();

        let rows = resolve(&network, &NodeCoordinates::new(), &WebMercator);
        assert_eq!(rows.len(), 2);
        let pairs: BTreeSet<(i64, i64)> = rows
            .iter()
            .map(|row| (row.from_segment, row.to_segment))
            .collect();
        assert_eq!(pairs, BTreeSet::from([(1, 2), (2, 1)]));
        for row in &rows {
            assert_eq!(row.kind.as_deref(), Some("barrier"));
            assert_eq!(row.cost, 30.0);
            assert_eq!(row.via_node, Some(2));
        }
    }
}
