// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Planar geometry helpers: the metric projection used for turn angles
//! and segment lengths, and WKT emission for the sink.

/// Equatorial radius of the WGS 84 ellipsoid, in meters.
const WGS84_RADIUS: f64 = 6_378_137.0;

/// Projects WGS 84 longitude/latitude degrees onto a planar
/// coordinate system measured in meters.
pub trait Projection {
    fn project(&self, lon: f64, lat: f64) -> (f64, f64);
}

/// Spherical web mercator (EPSG:3857), the projection used by
/// virtually every slippy map. Distances are inflated by roughly
/// `1/cos(latitude)`, which is acceptable for comparing turn geometry
/// and for relative edge costs within one extract.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl Projection for WebMercator {
    fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let x = WGS84_RADIUS * lon.to_radians();
        let y = WGS84_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() * 0.5).tan().ln();
        (x, y)
    }
}

/// Resolves an EPSG code to a built-in [Projection].
pub fn projection_for_epsg(code: u32) -> Option<Box<dyn Projection>> {
    match code {
        3857 | 900913 => Some(Box::new(WebMercator)),
        _ => None,
    }
}

/// Computes the angle of the turn `p1 → p2 → p3` at `p2`, in degrees
/// normalized to `[0, 360)`. Points are `(lon, lat)` pairs, projected
/// through the provided metric projection before measuring.
pub fn turn_angle(
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
    projection: &dyn Projection,
) -> f64 {
    let m1 = projection.project(p1.0, p1.1);
    let m2 = projection.project(p2.0, p2.1);
    let m3 = projection.project(p3.0, p3.1);

    let v1 = (m1.0 - m2.0, m1.1 - m2.1);
    let v2 = (m3.0 - m2.0, m3.1 - m2.1);

    let mut angle = (v2.1.atan2(v2.0) - v1.1.atan2(v1.0)).to_degrees();
    while angle < 0.0 {
        angle += 360.0;
    }
    while angle >= 360.0 {
        angle -= 360.0;
    }
    angle
}

/// Sums the planar lengths of the polyline's legs under the projection,
/// in meters.
pub fn projected_length(points: &[(f64, f64)], projection: &dyn Projection) -> f64 {
    points
        .windows(2)
        .map(|pair| {
            let a = projection.project(pair[0].0, pair[0].1);
            let b = projection.project(pair[1].0, pair[1].1);
            ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
        })
        .sum()
}

/// Formats a `(lon, lat)` pair as a WKT `POINT`.
pub fn wkt_point(lon: f64, lat: f64) -> String {
    format!("POINT({} {})", lon, lat)
}

/// Formats a sequence of `(lon, lat)` pairs as a WKT `LINESTRING`.
pub fn wkt_linestring(points: &[(f64, f64)]) -> String {
    let mut out = String::from("LINESTRING(");
    for (idx, (lon, lat)) in points.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(&format!("{} {}", lon, lat));
    }
    out.push(')');
    out
}
