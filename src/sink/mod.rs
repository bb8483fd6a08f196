// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Contract for emitting the normalized network into a relational
//! geospatial store, and the SQLite-backed implementation of it.

use crate::config::Direction;

mod sqlite;

pub use sqlite::SqliteStore;

/// Error conditions which may occur while writing to a store.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// A junction node row: `nodes(osm_id, lon, lat)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub osm_id: i64,
    pub lon: f64,
    pub lat: f64,
}

/// A way-segment row, one per atomic edge of the routing graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRow {
    /// Dense segment id; the primary key of the ways table.
    pub segment_id: i64,
    pub from_osm_id: i64,
    pub to_osm_id: i64,
    pub maxspeed_forward: f64,
    pub maxspeed_backward: f64,
    pub oneway: Direction,
    /// OSM id of the parent way.
    pub osm_id: i64,
    /// Position of the segment within the parent way.
    pub segment_index: i64,
    /// `LINESTRING(head, interior…, tail)` in lon/lat order.
    pub geom_wkt: String,
    /// Planar length under the configured projection, in meters.
    pub projected_length: f64,
}

/// A lowered turn-restriction row. Synthetic `only_*` expansion rows
/// carry no via node and no geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictionRow {
    pub from_segment_id: i64,
    pub to_segment_id: i64,
    pub via_node_osm_id: Option<i64>,
    pub restriction_osm_id: i64,
    pub cost: f64,
    pub geom_wkt: Option<String>,
}

/// Receives the normalized network, in phases: junction nodes first,
/// then segments with their way properties, then restrictions.
///
/// Implementations buffer rows; [Sink::flush] is called at every phase
/// boundary so that storage errors fail the pipeline early. The final
/// [Sink::rebuild_topology] derives the per-direction traversal costs
/// from the projected segment lengths.
pub trait Sink {
    /// Creates (and with `clean`, first drops) the output tables.
    fn init_schema(&mut self) -> Result<(), SinkError>;

    fn insert_node(&mut self, row: &NodeRow) -> Result<(), SinkError>;

    fn insert_segment(&mut self, row: &SegmentRow) -> Result<(), SinkError>;

    fn insert_way_property(
        &mut self,
        way_osm_id: i64,
        key: &str,
        value: &str,
    ) -> Result<(), SinkError>;

    fn insert_restriction(&mut self, row: &RestrictionRow) -> Result<(), SinkError>;

    /// Writes out all buffered rows.
    fn flush(&mut self) -> Result<(), SinkError>;

    /// Connects segments to their endpoint nodes and computes the
    /// per-direction costs `projected_length · 3.6 / maxspeed`, with -1
    /// on directions disabled by `oneway`.
    fn rebuild_topology(&mut self) -> Result<(), SinkError>;

    /// Flushes and releases the store. Idempotent.
    fn finish(&mut self) -> Result<(), SinkError>;
}
