//! Boundary-inclusive planar predicates.
//!
//! Touching counts as intersecting everywhere in this module: a shared edge
//! or a single shared vertex is enough.

use crate::geometry::{BBox, Coord, Polygon};

/// Location of a point relative to a ring or polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Inside,
    Boundary,
    Outside,
}

/// Sign of the cross product `(q - p) x (r - p)`: 1 counter-clockwise,
/// -1 clockwise, 0 collinear.
pub fn orientation(p: Coord, q: Coord, r: Coord) -> i8 {
    let v = (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x);
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// `q` lies on segment `pr`, given the three points are collinear.
fn on_segment(p: Coord, q: Coord, r: Coord) -> bool {
    q.x >= p.x.min(r.x) && q.x <= p.x.max(r.x) && q.y >= p.y.min(r.y) && q.y <= p.y.max(r.y)
}

/// Closed-segment intersection test, endpoints included.
pub fn segments_intersect(p1: Coord, p2: Coord, q1: Coord, q2: Coord) -> bool {
    let o1 = orientation(p1, p2, q1);
    let o2 = orientation(p1, p2, q2);
    let o3 = orientation(q1, q2, p1);
    let o4 = orientation(q1, q2, p2);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == 0 && on_segment(p1, q1, p2))
        || (o2 == 0 && on_segment(p1, q2, p2))
        || (o3 == 0 && on_segment(q1, p1, q2))
        || (o4 == 0 && on_segment(q1, p2, q2))
}

/// Even-odd ray cast against a closed ring, with boundary detection.
pub fn point_in_ring(pt: Coord, ring: &[Coord]) -> Location {
    let mut inside = false;
    for w in ring.windows(2) {
        let (a, b) = (w[0], w[1]);
        if orientation(a, b, pt) == 0 && on_segment(a, pt, b) {
            return Location::Boundary;
        }
        if (a.y > pt.y) != (b.y > pt.y) {
            let x_cross = a.x + (pt.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if pt.x < x_cross {
                inside = !inside;
            }
        }
    }
    if inside {
        Location::Inside
    } else {
        Location::Outside
    }
}

/// Locate a point against a polygon; points inside a hole are outside,
/// points on a hole's ring are on the boundary.
pub fn locate_point(pt: Coord, polygon: &Polygon) -> Location {
    match point_in_ring(pt, polygon.exterior()) {
        Location::Outside => return Location::Outside,
        Location::Boundary => return Location::Boundary,
        Location::Inside => {}
    }
    for hole in polygon.interiors() {
        match point_in_ring(pt, hole) {
            Location::Inside => return Location::Outside,
            Location::Boundary => return Location::Boundary,
            Location::Outside => {}
        }
    }
    Location::Inside
}

/// Inclusive point-in-polygon.
pub fn point_in_polygon(pt: Coord, polygon: &Polygon) -> bool {
    locate_point(pt, polygon) != Location::Outside
}

fn segment_bbox(a: Coord, b: Coord) -> BBox {
    BBox::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
}

fn rings_cross(a: &Polygon, b: &Polygon) -> bool {
    let b_bbox = b.bbox();
    for ring_a in a.rings() {
        for ea in ring_a.windows(2) {
            let ea_box = segment_bbox(ea[0], ea[1]);
            if !ea_box.intersects(&b_bbox) {
                continue;
            }
            for ring_b in b.rings() {
                for eb in ring_b.windows(2) {
                    if !ea_box.intersects(&segment_bbox(eb[0], eb[1])) {
                        continue;
                    }
                    if segments_intersect(ea[0], ea[1], eb[0], eb[1]) {
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Boundary-inclusive polygon intersection.
///
/// Either some pair of ring edges meets, or one polygon lies wholly inside
/// the other (checked through a single vertex, valid once no edges cross).
pub fn polygons_intersect(a: &Polygon, b: &Polygon) -> bool {
    if !a.bbox().intersects(&b.bbox()) {
        return false;
    }
    if rings_cross(a, b) {
        return true;
    }
    point_in_polygon(a.exterior()[0], b) || point_in_polygon(b.exterior()[0], a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
        Polygon::rectangle(&BBox::new(x0, y0, x1, y1))
    }

    #[test]
    fn test_segments_touching_at_endpoint() {
        assert!(segments_intersect(
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 1.0),
            Coord::new(1.0, 1.0),
            Coord::new(2.0, 0.0)
        ));
    }

    #[test]
    fn test_parallel_segments_disjoint() {
        assert!(!segments_intersect(
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(0.0, 1.0),
            Coord::new(1.0, 1.0)
        ));
    }

    #[test]
    fn test_collinear_overlap() {
        assert!(segments_intersect(
            Coord::new(0.0, 0.0),
            Coord::new(2.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(3.0, 0.0)
        ));
    }

    #[test]
    fn test_point_in_ring_locations() {
        let p = rect(0.0, 0.0, 2.0, 2.0);
        assert_eq!(point_in_ring(Coord::new(1.0, 1.0), p.exterior()), Location::Inside);
        assert_eq!(point_in_ring(Coord::new(2.0, 1.0), p.exterior()), Location::Boundary);
        assert_eq!(point_in_ring(Coord::new(0.0, 0.0), p.exterior()), Location::Boundary);
        assert_eq!(point_in_ring(Coord::new(3.0, 1.0), p.exterior()), Location::Outside);
    }

    #[test]
    fn test_point_in_hole_is_outside() {
        let outer = rect(0.0, 0.0, 10.0, 10.0);
        let hole = rect(4.0, 4.0, 6.0, 6.0);
        let donut =
            Polygon::new(outer.exterior().to_vec(), vec![hole.exterior().to_vec()]).unwrap();
        assert!(!point_in_polygon(Coord::new(5.0, 5.0), &donut));
        assert!(point_in_polygon(Coord::new(4.0, 5.0), &donut));
        assert!(point_in_polygon(Coord::new(1.0, 1.0), &donut));
    }

    #[test]
    fn test_shared_edge_intersects() {
        assert!(polygons_intersect(&rect(0.0, 0.0, 1.0, 1.0), &rect(1.0, 0.0, 2.0, 1.0)));
    }

    #[test]
    fn test_shared_corner_intersects() {
        assert!(polygons_intersect(&rect(0.0, 0.0, 1.0, 1.0), &rect(1.0, 1.0, 2.0, 2.0)));
    }

    #[test]
    fn test_containment_intersects() {
        let big = rect(0.0, 0.0, 10.0, 10.0);
        let small = rect(2.0, 2.0, 3.0, 3.0);
        assert!(polygons_intersect(&big, &small));
        assert!(polygons_intersect(&small, &big));
    }

    #[test]
    fn test_polygon_inside_hole_does_not_intersect() {
        let outer = rect(0.0, 0.0, 10.0, 10.0);
        let hole = rect(3.0, 3.0, 7.0, 7.0);
        let donut =
            Polygon::new(outer.exterior().to_vec(), vec![hole.exterior().to_vec()]).unwrap();
        let inner = rect(4.0, 4.0, 5.0, 5.0);
        assert!(!polygons_intersect(&donut, &inner));
    }

    #[test]
    fn test_bbox_overlap_without_intersection() {
        // L-shaped polygon whose bbox overlaps the square but whose area does not.
        let l = Polygon::new(
            vec![
                Coord::new(0.0, 0.0),
                Coord::new(4.0, 0.0),
                Coord::new(4.0, 1.0),
                Coord::new(1.0, 1.0),
                Coord::new(1.0, 4.0),
                Coord::new(0.0, 4.0),
            ],
            vec![],
        )
        .unwrap();
        let square = rect(2.0, 2.0, 3.0, 3.0);
        assert!(!polygons_intersect(&l, &square));
    }
}
