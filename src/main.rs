use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use routeload::geom;
use routeload::osm::reader::FileFormat;
use routeload::pipeline;
use routeload::sink::SqliteStore;
use routeload::TagIndex;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct UsageError(String);

/// Load an OpenStreetMap dump into a routable road-network database.
#[derive(Parser)]
struct Cli {
    /// Path to the OSM file (.osm, .osm.gz or .osm.bz2)
    #[arg(long)]
    file: PathBuf,

    /// Path to the target SQLite database
    #[arg(long)]
    connection_string: PathBuf,

    /// Drop and recreate the output tables before loading
    #[arg(long)]
    clean: bool,

    /// Prefix applied to every output table name
    #[arg(long, default_value = "")]
    prefix_tables: String,

    /// EPSG code of the projection used for segment lengths
    #[arg(long, default_value_t = 3857)]
    length_projection: u32,

    /// Input format: auto, xml, xml-gz or xml-bz2
    #[arg(long, default_value = "auto")]
    format: String,

    /// Directory with tag configuration tables; built-in defaults are
    /// used when not provided
    #[arg(long)]
    conf: Option<PathBuf>,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    colog::init();
    let cli = Cli::parse();

    if !cli.file.is_file() {
        return Err(Box::new(UsageError(format!(
            "input file {} does not exist",
            cli.file.display(),
        ))));
    }

    let file_format = match cli.format.as_str() {
        "auto" => FileFormat::Unknown,
        "xml" => FileFormat::Xml,
        "xml-gz" => FileFormat::XmlGz,
        "xml-bz2" => FileFormat::XmlBz2,
        other => {
            return Err(Box::new(UsageError(format!(
                "unknown input format {:?}",
                other,
            ))))
        }
    };

    let projection = geom::projection_for_epsg(cli.length_projection).ok_or_else(|| {
        UsageError(format!(
            "unsupported length projection EPSG:{}",
            cli.length_projection,
        ))
    })?;

    let tag_index = match &cli.conf {
        Some(dir) => TagIndex::from_dir(dir)?,
        None => TagIndex::default(),
    };

    let mut store = SqliteStore::open(&cli.connection_string, &cli.prefix_tables, cli.clean)?;

    let options = pipeline::Options {
        tag_index: &tag_index,
        file_format,
        projection: projection.as_ref(),
    };
    let stats = pipeline::load_from_file(&cli.file, &options, &mut store)?;

    log::info!(
        "done: {} ways, {} nodes, {} segments, {} restrictions",
        stats.ways,
        stats.nodes,
        stats.segments,
        stats.restrictions,
    );
    Ok(())
}
