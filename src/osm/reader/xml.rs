// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::io;
use std::str::from_utf8;

use super::model;

pub fn features_from_io<R: io::BufRead>(
    reader: R,
) -> impl Iterator<Item = Result<model::Feature, quick_xml::Error>> {
    Reader::from_io(reader)
}

pub fn features_from_buffer(
    b: &[u8],
) -> impl Iterator<Item = Result<model::Feature, quick_xml::Error>> + '_ {
    Reader::from_buffer(b)
}

/// Parser is a trait for objects which can parse XML.
///
/// This trait only exists to fix the mismatch of
/// [quick_xml::Reader::read_event] when working on buffered data
/// and [quick_xml::Reader::read_event_into] when working on IO.
trait Parser {
    fn read_event<'a>(&'a mut self) -> quick_xml::Result<quick_xml::events::Event<'a>>;
}

/// IoParser implements [Parser] over an [std::io::BufRead].
struct IoParser<R: io::BufRead>(quick_xml::Reader<R>, Vec<u8>);

impl<R: io::BufRead> IoParser<R> {
    #[inline]
    fn new(reader: R) -> Self {
        Self(quick_xml::Reader::from_reader(reader), Vec::default())
    }
}

impl<R: io::BufRead> Parser for IoParser<R> {
    #[inline]
    fn read_event<'a>(&'a mut self) -> quick_xml::Result<quick_xml::events::Event<'a>> {
        self.0.read_event_into(&mut self.1)
    }
}

/// BufParser implements [Parser] over a slice of bytes (`&[u8]`).
struct BufParser<'a>(quick_xml::Reader<&'a [u8]>);

impl<'a> BufParser<'a> {
    #[inline]
    fn new(data: &'a [u8]) -> Self {
        Self(quick_xml::Reader::from_reader(data))
    }
}

impl<'a> Parser for BufParser<'a> {
    #[inline]
    fn read_event<'b>(&'b mut self) -> quick_xml::Result<quick_xml::events::Event<'b>> {
        self.0.read_event()
    }
}

/// Reader reads osm [Features](model::Feature) from an XML file.
struct Reader<P: Parser> {
    parser: P,
    eof: bool,
}

impl<P: Parser> Reader<P> {
    #[inline]
    fn new(parser: P) -> Self {
        Self { parser, eof: false }
    }
}

impl<P: Parser> Iterator for Reader<P> {
    type Item = Result<model::Feature, quick_xml::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut f: Option<model::Feature> = None;

        while !self.eof {
            let event = match self.parser.read_event() {
                Ok(e) => e,
                Err(e) => return Some(Err(e)),
            };

            match event {
                quick_xml::events::Event::Empty(start) => {
                    match start.local_name().as_ref() {
                        b"node" => match parse_node(start) {
                            Some(n) => return Some(Ok(model::Feature::Node(n))),
                            None => {}
                        },
                        // "way" or "relation" can't be self-closing
                        b"tag" => {
                            if let Some((k, v)) = parse_tag(start) {
                                // Keep the first value of duplicated keys.
                                if feature_has_tag(&f, &k) {
                                    log::warn!(
                                        "multiple values for tag {:?} on {}",
                                        k,
                                        feature_description(&f),
                                    );
                                } else if let Some(tags) = feature_tags(&mut f) {
                                    tags.insert(k, v);
                                }
                            }
                        }
                        b"nd" => {
                            if let Some(nodes) = feature_nodes(&mut f) {
                                if let Some(ref_) = parse_nd(start) {
                                    nodes.push(ref_);
                                }
                            }
                        }
                        b"member" => {
                            if let Some(members) = feature_members(&mut f) {
                                if let Some(member) = parse_member(start) {
                                    members.push(member);
                                }
                            }
                        }
                        _ => {}
                    }
                }

                quick_xml::events::Event::Start(start) => match start.local_name().as_ref() {
                    b"node" => f = parse_node(start).map(|n| model::Feature::Node(n)),
                    b"way" => f = parse_way(start).map(|w| model::Feature::Way(w)),
                    b"relation" => f = parse_relation(start).map(|r| model::Feature::Relation(r)),
                    // "tag", "nd" and "member" must be self-closing
                    _ => {}
                },

                quick_xml::events::Event::End(end) => match end.local_name().as_ref() {
                    b"node" | b"way" | b"relation" => {
                        if let Some(f) = f.take() {
                            return Some(Ok(f));
                        }
                    }
                    _ => {}
                },

                quick_xml::events::Event::Eof => {
                    self.eof = true;
                }

                _ => {}
            }
        }

        return f.map(Ok);
    }
}

impl<'a> Reader<BufParser<'a>> {
    #[inline]
    fn from_buffer(data: &'a [u8]) -> Self {
        Self::new(BufParser::new(data))
    }
}

impl<R: io::BufRead> Reader<IoParser<R>> {
    #[inline]
    fn from_io(reader: R) -> Self {
        Self::new(IoParser::new(reader))
    }
}

fn feature_has_tag(f: &Option<model::Feature>, key: &str) -> bool {
    match f {
        Some(model::Feature::Node(n)) => n.tags.contains_key(key),
        Some(model::Feature::Way(w)) => w.tags.contains_key(key),
        Some(model::Feature::Relation(r)) => r.tags.contains_key(key),
        None => false,
    }
}

fn feature_description(f: &Option<model::Feature>) -> String {
    match f {
        Some(model::Feature::Node(n)) => format!("node {}", n.id),
        Some(model::Feature::Way(w)) => format!("way {}", w.id),
        Some(model::Feature::Relation(r)) => format!("relation {}", r.id),
        None => "unknown feature".to_string(),
    }
}

fn parse_node(start: quick_xml::events::BytesStart<'_>) -> Option<model::Node> {
    let mut id: i64 = 0;
    let mut lat = f64::NAN;
    let mut lon = f64::NAN;

    for attr in start.attributes() {
        let attr = attr.ok()?;
        match attr.key.as_ref() {
            b"id" => id = from_utf8(&attr.value).ok()?.parse().ok()?,
            b"lat" => lat = from_utf8(&attr.value).ok()?.parse().ok()?,
            b"lon" => lon = from_utf8(&attr.value).ok()?.parse().ok()?,
            _ => {}
        }
    }

    if id != 0 && lat.is_finite() && lon.is_finite() {
        Some(model::Node {
            id,
            lat,
            lon,
            tags: HashMap::default(),
        })
    } else {
        None
    }
}

fn parse_way(start: quick_xml::events::BytesStart<'_>) -> Option<model::Way> {
    let mut id: i64 = 0;

    for attr in start.attributes() {
        let attr = attr.ok()?;
        match attr.key.as_ref() {
            b"id" => id = from_utf8(&attr.value).ok()?.parse().ok()?,
            _ => {}
        }
    }

    if id != 0 {
        Some(model::Way {
            id,
            nodes: Vec::default(),
            tags: HashMap::default(),
        })
    } else {
        None
    }
}

fn parse_relation(start: quick_xml::events::BytesStart<'_>) -> Option<model::Relation> {
    let mut id: i64 = 0;

    for attr in start.attributes() {
        let attr = attr.ok()?;
        match attr.key.as_ref() {
            b"id" => id = from_utf8(&attr.value).ok()?.parse().ok()?,
            _ => {}
        }
    }

    if id != 0 {
        Some(model::Relation {
            id,
            members: Vec::default(),
            tags: HashMap::default(),
        })
    } else {
        None
    }
}

fn parse_tag(start: quick_xml::events::BytesStart<'_>) -> Option<(String, String)> {
    let mut k = None;
    let mut v = None;

    for attr in start.attributes() {
        let attr = attr.ok()?;
        match attr.key.as_ref() {
            b"k" => k = from_utf8(&attr.value).ok().map(|s| s.to_string()),
            b"v" => v = from_utf8(&attr.value).ok().map(|s| s.to_string()),
            _ => {}
        }
    }

    if let Some(k) = k {
        Some((k, v.unwrap_or_default()))
    } else {
        None
    }
}

fn parse_nd(start: quick_xml::events::BytesStart<'_>) -> Option<i64> {
    let mut ref_: i64 = 0;

    for attr in start.attributes() {
        let attr = attr.ok()?;
        match attr.key.as_ref() {
            b"ref" => ref_ = from_utf8(&attr.value).ok()?.parse().ok()?,
            _ => {}
        }
    }

    if ref_ != 0 {
        Some(ref_)
    } else {
        None
    }
}

fn parse_member(start: quick_xml::events::BytesStart<'_>) -> Option<model::RelationMember> {
    let mut ref_: i64 = 0;
    let mut type_ = None;
    let mut role = None;

    for attr in start.attributes() {
        let attr = attr.ok()?;
        match attr.key.as_ref() {
            b"ref" => ref_ = from_utf8(&attr.value).ok()?.parse().ok()?,
            b"type" => type_ = Some(parse_feature_type(&attr.value)?),
            b"role" => role = Some(from_utf8(&attr.value).ok()?.to_string()),
            _ => {}
        }
    }

    match (ref_, type_, role) {
        (0, _, _) => None,
        (ref_, Some(type_), Some(role)) => Some(model::RelationMember { type_, ref_, role }),
        _ => None,
    }
}

fn parse_feature_type(s: &[u8]) -> Option<model::FeatureType> {
    match s {
        b"node" => Some(model::FeatureType::Node),
        b"way" => Some(model::FeatureType::Way),
        b"relation" => Some(model::FeatureType::Relation),
        _ => None,
    }
}

fn feature_tags<'a>(f: &'a mut Option<model::Feature>) -> Option<&'a mut HashMap<String, String>> {
    match f {
        None => None,
        Some(model::Feature::Node(ref mut n)) => Some(&mut n.tags),
        Some(model::Feature::Way(ref mut w)) => Some(&mut w.tags),
        Some(model::Feature::Relation(ref mut r)) => Some(&mut r.tags),
    }
}

fn feature_nodes<'a>(f: &'a mut Option<model::Feature>) -> Option<&'a mut Vec<i64>> {
    match f {
        Some(model::Feature::Way(ref mut w)) => Some(&mut w.nodes),
        _ => None,
    }
}

fn feature_members<'a>(
    f: &'a mut Option<model::Feature>,
) -> Option<&'a mut Vec<model::RelationMember>> {
    match f {
        Some(model::Feature::Relation(ref mut r)) => Some(&mut r.members),
        _ => None,
    }
}
