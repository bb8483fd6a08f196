// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Load [OpenStreetMap](https://www.openstreetmap.org/) extracts into a
//! routable road-network database.
//!
//! The pipeline makes two passes over an OSM XML file (plain, gzip or
//! bzip2): the first accumulates routable ways, turn-restriction
//! relations and point barriers; the second picks up coordinates of the
//! referenced nodes. Ways are profiled into per-direction speeds and
//! modes, split into atomic segments at shared junction nodes, and turn
//! restrictions are lowered onto concrete segment pairs (with `only_*`
//! rules expanded into prohibitions of every other turn). The result is
//! written through a [Sink](crate::sink::Sink), by default into an
//! SQLite database with WKT geometries.
//!
//! # Example
//!
//! ```no_run
//! let tag_index = routeload::TagIndex::default();
//! let options = routeload::pipeline::Options {
//!     tag_index: &tag_index,
//!     file_format: routeload::osm::reader::FileFormat::Unknown,
//!     projection: &routeload::geom::WebMercator,
//! };
//! let mut store = routeload::sink::SqliteStore::open("routing.db", "", true)
//!     .expect("failed to open routing.db");
//! let stats = routeload::pipeline::load_from_file("map.osm", &options, &mut store)
//!     .expect("failed to load map.osm");
//! println!("{} segments written", stats.segments);
//! ```

pub mod config;
mod duration;
pub mod geom;
pub mod network;
pub mod osm;
pub mod pipeline;
mod resolve;
pub mod sink;

pub use config::{Area, ConfigError, Direction, TagIndex};
pub use duration::parse_duration;
pub use network::Network;
pub use pipeline::{load_from_buffer, load_from_file, Stats};
pub use resolve::NodeCoordinates;
