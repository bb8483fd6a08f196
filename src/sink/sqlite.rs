// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::path::Path;

use rusqlite::Connection;

use crate::sink::{NodeRow, RestrictionRow, SegmentRow, Sink, SinkError};

/// Rows buffered per table before a batched transaction is written.
const BATCH_SIZE: usize = 200;

/// Writes the network into an SQLite database, with geometries stored
/// as WKT text. All table names carry a configurable prefix, so several
/// networks can share one database file.
pub struct SqliteStore {
    conn: Connection,
    prefix: String,
    clean: bool,
    nodes: Vec<NodeRow>,
    segments: Vec<SegmentRow>,
    properties: Vec<(i64, String, String)>,
    restrictions: Vec<RestrictionRow>,
    finished: bool,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`. With `clean`, existing
    /// output tables are dropped when the schema is initialized.
    pub fn open<P: AsRef<Path>>(path: P, prefix: &str, clean: bool) -> Result<Self, SinkError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;",
        )?;
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
            clean,
            nodes: Vec::new(),
            segments: Vec::new(),
            properties: Vec::new(),
            restrictions: Vec::new(),
            finished: false,
        })
    }

    /// Opens an in-memory database, mainly for tests.
    pub fn open_in_memory(prefix: &str) -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
            clean: false,
            nodes: Vec::new(),
            segments: Vec::new(),
            properties: Vec::new(),
            restrictions: Vec::new(),
            finished: false,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn table(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn write_nodes(&mut self) -> Result<(), SinkError> {
        if self.nodes.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {} (lon, lat, osm_id) VALUES (?1, ?2, ?3)",
                self.table("nodes"),
            ))?;
            for row in &self.nodes {
                stmt.execute(rusqlite::params![row.lon, row.lat, row.osm_id])?;
            }
        }
        tx.commit()?;
        self.nodes.clear();
        Ok(())
    }

    fn write_segments(&mut self) -> Result<(), SinkError> {
        if self.segments.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {} \
                 (gid, from_osm_id, to_osm_id, maxspeed_forward, maxspeed_backward, \
                  oneway, osm_id, segment_id, geom, projected_length) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                self.table("ways"),
            ))?;
            for row in &self.segments {
                stmt.execute(rusqlite::params![
                    row.segment_id,
                    row.from_osm_id,
                    row.to_osm_id,
                    row.maxspeed_forward,
                    row.maxspeed_backward,
                    row.oneway.as_str(),
                    row.osm_id,
                    row.segment_index,
                    row.geom_wkt,
                    row.projected_length,
                ])?;
            }
        }
        tx.commit()?;
        self.segments.clear();
        Ok(())
    }

    fn write_properties(&mut self) -> Result<(), SinkError> {
        if self.properties.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {} (way_id, key, value) VALUES (?1, ?2, ?3)",
                self.table("way_properties"),
            ))?;
            for (way_id, key, value) in &self.properties {
                stmt.execute(rusqlite::params![way_id, key, value])?;
            }
        }
        tx.commit()?;
        self.properties.clear();
        Ok(())
    }

    fn write_restrictions(&mut self) -> Result<(), SinkError> {
        if self.restrictions.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {} \
                 (from_way, to_way, via_ways, osm_id, cost, via_node_id, geom) \
                 VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6)",
                self.table("restrictions"),
            ))?;
            for row in &self.restrictions {
                stmt.execute(rusqlite::params![
                    row.from_segment_id,
                    row.to_segment_id,
                    row.restriction_osm_id,
                    row.cost,
                    row.via_node_osm_id,
                    row.geom_wkt,
                ])?;
            }
        }
        tx.commit()?;
        self.restrictions.clear();
        Ok(())
    }
}

impl Sink for SqliteStore {
    fn init_schema(&mut self) -> Result<(), SinkError> {
        if self.clean {
            self.conn.execute_batch(&format!(
                "DROP TABLE IF EXISTS {ways};
                 DROP TABLE IF EXISTS {nodes};
                 DROP TABLE IF EXISTS {properties};
                 DROP TABLE IF EXISTS {restrictions};",
                ways = self.table("ways"),
                nodes = self.table("nodes"),
                properties = self.table("way_properties"),
                restrictions = self.table("restrictions"),
            ))?;
        }

        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {nodes} (
                 gid    INTEGER PRIMARY KEY AUTOINCREMENT,
                 lon    REAL,
                 lat    REAL,
                 osm_id INTEGER
             );
             CREATE TABLE IF NOT EXISTS {ways} (
                 gid               INTEGER PRIMARY KEY,
                 source            INTEGER,
                 target            INTEGER,
                 x1                REAL,
                 y1                REAL,
                 x2                REAL,
                 y2                REAL,
                 from_osm_id       INTEGER,
                 to_osm_id         INTEGER,
                 maxspeed_forward  REAL,
                 maxspeed_backward REAL,
                 osm_id            INTEGER,
                 segment_id        INTEGER,
                 geom              TEXT,
                 oneway            TEXT,
                 projected_length  REAL,
                 f_cost            REAL,
                 r_cost            REAL
             );
             CREATE TABLE IF NOT EXISTS {properties} (
                 gid    INTEGER PRIMARY KEY AUTOINCREMENT,
                 way_id INTEGER,
                 key    TEXT,
                 value  TEXT
             );
             CREATE TABLE IF NOT EXISTS {restrictions} (
                 gid         INTEGER PRIMARY KEY AUTOINCREMENT,
                 from_way    INTEGER,
                 to_way      INTEGER,
                 via_ways    TEXT,
                 osm_id      INTEGER,
                 cost        REAL,
                 via_node_id INTEGER,
                 geom        TEXT
             );
             CREATE INDEX IF NOT EXISTS {prefix}source_idx ON {ways} (source);
             CREATE INDEX IF NOT EXISTS {prefix}target_idx ON {ways} (target);
             CREATE INDEX IF NOT EXISTS {prefix}way_fk_idx ON {properties} (way_id);
             CREATE INDEX IF NOT EXISTS {prefix}from_way_fk_idx ON {restrictions} (from_way);
             CREATE INDEX IF NOT EXISTS {prefix}to_way_fk_idx ON {restrictions} (to_way);
             CREATE INDEX IF NOT EXISTS {prefix}via_node_id_fk_idx ON {restrictions} (via_node_id);",
            nodes = self.table("nodes"),
            ways = self.table("ways"),
            properties = self.table("way_properties"),
            restrictions = self.table("restrictions"),
            prefix = self.prefix,
        ))?;
        Ok(())
    }

    fn insert_node(&mut self, row: &NodeRow) -> Result<(), SinkError> {
        self.nodes.push(row.clone());
        if self.nodes.len() > BATCH_SIZE {
            self.write_nodes()?;
        }
        Ok(())
    }

    fn insert_segment(&mut self, row: &SegmentRow) -> Result<(), SinkError> {
        self.segments.push(row.clone());
        if self.segments.len() > BATCH_SIZE {
            self.write_segments()?;
        }
        Ok(())
    }

    fn insert_way_property(
        &mut self,
        way_osm_id: i64,
        key: &str,
        value: &str,
    ) -> Result<(), SinkError> {
        self.properties
            .push((way_osm_id, key.to_string(), value.to_string()));
        if self.properties.len() > BATCH_SIZE {
            self.write_properties()?;
        }
        Ok(())
    }

    fn insert_restriction(&mut self, row: &RestrictionRow) -> Result<(), SinkError> {
        self.restrictions.push(row.clone());
        if self.restrictions.len() > BATCH_SIZE {
            self.write_restrictions()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.write_nodes()?;
        self.write_segments()?;
        self.write_properties()?;
        self.write_restrictions()?;
        Ok(())
    }

    fn rebuild_topology(&mut self) -> Result<(), SinkError> {
        self.flush()?;
        self.conn.execute_batch(&format!(
            "UPDATE {ways} SET source = from_osm_id, target = to_osm_id;
             UPDATE {ways} SET
                 x1 = (SELECT n.lon FROM {nodes} n WHERE n.osm_id = {ways}.from_osm_id),
                 y1 = (SELECT n.lat FROM {nodes} n WHERE n.osm_id = {ways}.from_osm_id),
                 x2 = (SELECT n.lon FROM {nodes} n WHERE n.osm_id = {ways}.to_osm_id),
                 y2 = (SELECT n.lat FROM {nodes} n WHERE n.osm_id = {ways}.to_osm_id);
             UPDATE {ways} SET
                 f_cost = (CASE WHEN oneway = 'TF' THEN -1
                           ELSE (projected_length * 3.6) / maxspeed_forward END),
                 r_cost = (CASE WHEN oneway = 'FT' THEN -1
                           ELSE (projected_length * 3.6) / maxspeed_backward END);",
            ways = self.table("ways"),
            nodes = self.table("nodes"),
        ))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.flush()?;
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Direction;

    fn node(osm_id: i64, lon: f64, lat: f64) -> NodeRow {
        NodeRow { osm_id, lon, lat }
    }

    fn segment(segment_id: i64, from: i64, to: i64, oneway: Direction) -> SegmentRow {
        SegmentRow {
            segment_id,
            from_osm_id: from,
            to_osm_id: to,
            maxspeed_forward: 31.0,
            maxspeed_backward: 31.0,
            oneway,
            osm_id: 100,
            segment_index: 0,
            geom_wkt: "LINESTRING(26.09 44.43,26.1 44.44)".to_string(),
            projected_length: 1000.0,
        }
    }

    #[test]
    fn rows_round_trip() {
        let mut store = SqliteStore::open_in_memory("").unwrap();
        store.init_schema().unwrap();
        store.insert_node(&node(1, 26.09, 44.43)).unwrap();
        store.insert_node(&node(2, 26.10, 44.44)).unwrap();
        store
            .insert_segment(&segment(1, 1, 2, Direction::Both))
            .unwrap();
        store.insert_way_property(100, "name", "Strada Mare").unwrap();
        store
            .insert_restriction(&RestrictionRow {
                from_segment_id: 1,
                to_segment_id: 2,
                via_node_osm_id: Some(2),
                restriction_osm_id: 900,
                cost: 99999.0,
                geom_wkt: Some("POINT(26.1 44.44)".to_string()),
            })
            .unwrap();
        store.flush().unwrap();

        let conn = store.connection();
        let nodes: i64 = conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(nodes, 2);

        let (gid, oneway, geom): (i64, String, String) = conn
            .query_row("SELECT gid, oneway, geom FROM ways", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .unwrap();
        assert_eq!(gid, 1);
        assert_eq!(oneway, "NO");
        assert!(geom.starts_with("LINESTRING("));

        let (key, value): (String, String) = conn
            .query_row("SELECT key, value FROM way_properties", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!((key.as_str(), value.as_str()), ("name", "Strada Mare"));

        let via: Option<i64> = conn
            .query_row("SELECT via_node_id FROM restrictions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(via, Some(2));
    }

    #[test]
    fn null_via_nodes_survive() {
        let mut store = SqliteStore::open_in_memory("").unwrap();
        store.init_schema().unwrap();
        store
            .insert_restriction(&RestrictionRow {
                from_segment_id: 1,
                to_segment_id: 3,
                via_node_osm_id: None,
                restriction_osm_id: 901,
                cost: 99999.0,
                geom_wkt: None,
            })
            .unwrap();
        store.flush().unwrap();

        let (via, geom): (Option<i64>, Option<String>) = store
            .connection()
            .query_row("SELECT via_node_id, geom FROM restrictions", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(via, None);
        assert_eq!(geom, None);
    }

    #[test]
    fn topology_rebuild_computes_costs() {
        let mut store = SqliteStore::open_in_memory("").unwrap();
        store.init_schema().unwrap();
        store.insert_node(&node(1, 26.09, 44.43)).unwrap();
        store.insert_node(&node(2, 26.10, 44.44)).unwrap();
        store
            .insert_segment(&segment(1, 1, 2, Direction::Both))
            .unwrap();
        store
            .insert_segment(&segment(2, 2, 1, Direction::Forward))
            .unwrap();
        store.rebuild_topology().unwrap();

        let conn = store.connection();
        let (source, target, x1, y2): (i64, i64, f64, f64) = conn
            .query_row(
                "SELECT source, target, x1, y2 FROM ways WHERE gid = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!((source, target), (1, 2));
        assert_eq!(x1, 26.09);
        assert_eq!(y2, 44.44);

        // 1000 m at 31 km/h, in seconds.
        let (f_cost, r_cost): (f64, f64) = conn
            .query_row("SELECT f_cost, r_cost FROM ways WHERE gid = 1", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert!((f_cost - 1000.0 * 3.6 / 31.0).abs() < 1e-9);
        assert!((r_cost - 1000.0 * 3.6 / 31.0).abs() < 1e-9);

        // The closed direction of a one-way segment costs -1.
        let r_cost: f64 = conn
            .query_row("SELECT r_cost FROM ways WHERE gid = 2", [], |r| r.get(0))
            .unwrap();
        assert_eq!(r_cost, -1.0);
    }

    #[test]
    fn prefixed_tables() {
        let mut store = SqliteStore::open_in_memory("osm_").unwrap();
        store.init_schema().unwrap();
        store.insert_node(&node(1, 0.0, 0.0)).unwrap();
        store.flush().unwrap();

        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM osm_nodes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn clean_drops_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.db");

        let mut store = SqliteStore::open(&path, "", false).unwrap();
        store.init_schema().unwrap();
        store.insert_node(&node(1, 0.0, 0.0)).unwrap();
        store.finish().unwrap();
        drop(store);

        let mut store = SqliteStore::open(&path, "", true).unwrap();
        store.init_schema().unwrap();
        store.finish().unwrap();

        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
