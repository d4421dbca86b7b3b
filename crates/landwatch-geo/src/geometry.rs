//! GeoJSON-shaped geometry types.
//!
//! Rings are stored closed (first coordinate repeated at the end), exactly
//! as GeoJSON writes them. Constructors close open rings and reject
//! degenerate input so every `Polygon` in the system is well formed.

use serde::{Deserialize, Serialize};

use crate::error::GeoError;
use crate::predicates;

/// A 2-D coordinate, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Coord {
    fn from(v: [f64; 2]) -> Self {
        Coord { x: v[0], y: v[1] }
    }
}

impl From<Coord> for [f64; 2] {
    fn from(c: Coord) -> Self {
        [c.x, c.y]
    }
}

/// Axis-aligned bounding box `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box containing every coordinate, `None` for an empty input.
    pub fn from_coords<'a>(coords: impl IntoIterator<Item = &'a Coord>) -> Option<Self> {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        let mut bbox = BBox::new(first.x, first.y, first.x, first.y);
        for c in iter {
            bbox.expand_to(c);
        }
        Some(bbox)
    }

    pub fn expand_to(&mut self, c: &Coord) {
        self.min_x = self.min_x.min(c.x);
        self.min_y = self.min_y.min(c.y);
        self.max_x = self.max_x.max(c.x);
        self.max_y = self.max_y.max(c.y);
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Boundary-inclusive overlap test.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, c: &Coord) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Finite and non-inverted. Zero-area boxes are valid (a point AOI).
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        b.to_array()
    }
}

/// Shoelace signed area of a closed ring. Positive means counter-clockwise
/// in a y-up frame.
pub fn ring_signed_area(ring: &[Coord]) -> f64 {
    if ring.len() < 2 {
        return 0.0;
    }
    let twice: f64 = ring
        .windows(2)
        .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
        .sum();
    twice / 2.0
}

fn close_ring(mut ring: Vec<Coord>) -> Result<Vec<Coord>, GeoError> {
    if ring.iter().any(|c| !c.is_finite()) {
        return Err(GeoError::NonFiniteCoordinate);
    }
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }
    if ring.len() < 4 {
        return Err(GeoError::RingTooShort(ring.len()));
    }
    Ok(ring)
}

/// Polygon with one exterior ring and zero or more holes.
///
/// Serialized as GeoJSON polygon coordinates: `[[exterior], [hole], ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Coord>>", into = "Vec<Vec<Coord>>")]
pub struct Polygon {
    exterior: Vec<Coord>,
    interiors: Vec<Vec<Coord>>,
}

impl Polygon {
    /// Build a polygon, closing open rings.
    pub fn new(exterior: Vec<Coord>, interiors: Vec<Vec<Coord>>) -> Result<Self, GeoError> {
        let exterior = close_ring(exterior)?;
        let interiors = interiors
            .into_iter()
            .map(close_ring)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            exterior,
            interiors,
        })
    }

    /// Axis-aligned rectangle covering `bbox`, counter-clockwise.
    pub fn rectangle(bbox: &BBox) -> Self {
        Self {
            exterior: vec![
                Coord::new(bbox.min_x, bbox.min_y),
                Coord::new(bbox.max_x, bbox.min_y),
                Coord::new(bbox.max_x, bbox.max_y),
                Coord::new(bbox.min_x, bbox.max_y),
                Coord::new(bbox.min_x, bbox.min_y),
            ],
            interiors: Vec::new(),
        }
    }

    pub fn exterior(&self) -> &[Coord] {
        &self.exterior
    }

    pub fn interiors(&self) -> &[Vec<Coord>] {
        &self.interiors
    }

    /// Exterior followed by holes.
    pub fn rings(&self) -> impl Iterator<Item = &[Coord]> {
        std::iter::once(self.exterior.as_slice()).chain(self.interiors.iter().map(Vec::as_slice))
    }

    pub fn bbox(&self) -> BBox {
        // Exterior always has >= 4 coordinates.
        BBox::from_coords(&self.exterior).unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Planar area in coordinate units (exterior minus holes).
    pub fn area(&self) -> f64 {
        let holes: f64 = self.interiors.iter().map(|r| ring_signed_area(r).abs()).sum();
        (ring_signed_area(&self.exterior).abs() - holes).max(0.0)
    }

    /// Re-orient rings to the GeoJSON right-hand rule: exterior
    /// counter-clockwise, holes clockwise.
    pub fn oriented(mut self) -> Self {
        if ring_signed_area(&self.exterior) < 0.0 {
            self.exterior.reverse();
        }
        for hole in &mut self.interiors {
            if ring_signed_area(hole) > 0.0 {
                hole.reverse();
            }
        }
        self
    }

    pub fn intersects(&self, other: &Polygon) -> bool {
        predicates::polygons_intersect(self, other)
    }
}

impl TryFrom<Vec<Vec<Coord>>> for Polygon {
    type Error = GeoError;

    fn try_from(mut rings: Vec<Vec<Coord>>) -> Result<Self, Self::Error> {
        if rings.is_empty() {
            return Err(GeoError::EmptyGeometry);
        }
        let exterior = rings.remove(0);
        Polygon::new(exterior, rings)
    }
}

impl From<Polygon> for Vec<Vec<Coord>> {
    fn from(p: Polygon) -> Self {
        let mut rings = Vec::with_capacity(1 + p.interiors.len());
        rings.push(p.exterior);
        rings.extend(p.interiors);
        rings
    }
}

/// A set of polygons, serialized as GeoJSON multipolygon coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiPolygon(pub Vec<Polygon>);

impl MultiPolygon {
    pub fn bbox(&self) -> Option<BBox> {
        self.0
            .iter()
            .map(Polygon::bbox)
            .reduce(|a, b| a.union(&b))
    }

    pub fn area(&self) -> f64 {
        self.0.iter().map(Polygon::area).sum()
    }
}

impl From<Polygon> for MultiPolygon {
    fn from(p: Polygon) -> Self {
        MultiPolygon(vec![p])
    }
}

/// GeoJSON geometry object restricted to areal types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Polygon(Polygon),
    MultiPolygon(MultiPolygon),
}

impl Geometry {
    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Geometry::Polygon(p) => std::slice::from_ref(p),
            Geometry::MultiPolygon(mp) => &mp.0,
        }
    }

    pub fn bbox(&self) -> Option<BBox> {
        self.polygons()
            .iter()
            .map(Polygon::bbox)
            .reduce(|a, b| a.union(&b))
    }

    pub fn area(&self) -> f64 {
        self.polygons().iter().map(Polygon::area).sum()
    }

    /// Boundary-inclusive intersection: true when any member polygon of
    /// `self` touches or overlaps any member polygon of `other`.
    pub fn intersects(&self, other: &Geometry) -> bool {
        self.polygons()
            .iter()
            .any(|a| other.polygons().iter().any(|b| a.intersects(b)))
    }

    pub fn intersects_polygon(&self, other: &Polygon) -> bool {
        self.polygons().iter().any(|a| a.intersects(other))
    }
}

impl From<Polygon> for Geometry {
    fn from(p: Polygon) -> Self {
        Geometry::Polygon(p)
    }
}

impl From<MultiPolygon> for Geometry {
    fn from(mp: MultiPolygon) -> Self {
        Geometry::MultiPolygon(mp)
    }
}
