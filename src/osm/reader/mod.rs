// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io;
use std::path::Path;

pub mod model;
mod xml;

pub use model::{Feature, FeatureType, Node, Relation, RelationMember, Way};

/// Format of the input OSM file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Unknown format - guess the format based on the content
    Unknown,

    /// Force uncompressed [OSM XML](https://wiki.openstreetmap.org/wiki/OSM_XML)
    Xml,

    /// Force [OSM XML](https://wiki.openstreetmap.org/wiki/OSM_XML)
    /// with [gzip](https://en.wikipedia.org/wiki/Gzip) compression
    XmlGz,

    /// Force [OSM XML](https://wiki.openstreetmap.org/wiki/OSM_XML)
    /// with [bzip2](https://en.wikipedia.org/wiki/Bzip2) compression
    XmlBz2,
}

/// Error which can occur when reading an OSM file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("xml: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Iterator over [Features](Feature) of an OSM file, with the transport
/// and compression abstracted away.
pub type FeatureStream<'a> = Box<dyn Iterator<Item = Result<Feature, Error>> + 'a>;

/// Opens the OSM file at the provided path and returns a stream of all
/// features in it. [FileFormat::Unknown] sniffs gzip/bzip2 magic bytes
/// and otherwise assumes plain XML.
pub fn features_from_file<P: AsRef<Path>>(
    path: P,
    format: FileFormat,
) -> Result<FeatureStream<'static>, Error> {
    let mut reader = io::BufReader::new(File::open(path)?);

    let format = match format {
        FileFormat::Unknown => sniff_format(&mut reader)?,
        other => other,
    };

    Ok(match format {
        FileFormat::Unknown | FileFormat::Xml => wrap(xml::features_from_io(reader)),
        FileFormat::XmlGz => wrap(xml::features_from_io(io::BufReader::new(
            flate2::read::GzDecoder::new(reader),
        ))),
        FileFormat::XmlBz2 => wrap(xml::features_from_io(io::BufReader::new(
            bzip2::read::BzDecoder::new(reader),
        ))),
    })
}

/// Returns a stream of all features from a static buffer of OSM XML.
pub fn features_from_buffer(data: &[u8]) -> FeatureStream<'_> {
    wrap(xml::features_from_buffer(data))
}

fn wrap<'a, I>(features: I) -> FeatureStream<'a>
where
    I: Iterator<Item = Result<Feature, quick_xml::Error>> + 'a,
{
    Box::new(features.map(|f| f.map_err(Error::Xml)))
}

/// Recognizes the compression of a buffered stream from its magic bytes
/// without consuming anything.
fn sniff_format<R: io::BufRead>(reader: &mut R) -> Result<FileFormat, Error> {
    let head = reader.fill_buf()?;
    Ok(if head.starts_with(&[0x1f, 0x8b]) {
        FileFormat::XmlGz
    } else if head.starts_with(b"BZh") {
        FileFormat::XmlBz2
    } else {
        FileFormat::Xml
    })
}
