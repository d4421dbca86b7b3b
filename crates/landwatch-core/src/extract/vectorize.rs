//! Pixel-region to polygon conversion.
//!
//! Boundaries are traced along pixel edges. Every pixel side facing a pixel
//! outside the region becomes a directed edge, oriented so the region lies
//! on the same side of every edge. Following edges end to end yields closed
//! rings: the outer boundary with negative signed area in pixel space (rows
//! grow downward), holes with positive area. Where two region pixels touch
//! only at a corner, tracing stays on the pixel it arrived with, so rings
//! never cross.

use std::collections::{HashMap, HashSet, VecDeque};

use landwatch_geo::{Coord, GeoError, GeoTransform, Polygon};

pub type Pixel = (usize, usize);
type Vertex = (usize, usize);

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    to: Vertex,
    pixel: Pixel,
}

/// Split a pixel set into its 4-connected parts, largest first.
pub fn split_parts(pixels: &[Pixel]) -> Vec<Vec<Pixel>> {
    let mut remaining: HashSet<Pixel> = pixels.iter().copied().collect();
    let mut parts = Vec::new();

    for &seed in pixels {
        if !remaining.remove(&seed) {
            continue;
        }
        let mut part = vec![seed];
        let mut queue = VecDeque::from([seed]);
        while let Some((c, r)) = queue.pop_front() {
            let mut neighbours = vec![(c + 1, r), (c, r + 1)];
            if c > 0 {
                neighbours.push((c - 1, r));
            }
            if r > 0 {
                neighbours.push((c, r - 1));
            }
            for n in neighbours {
                if remaining.remove(&n) {
                    part.push(n);
                    queue.push_back(n);
                }
            }
        }
        parts.push(part);
    }

    // Stable: equal sizes keep discovery order.
    parts.sort_by(|a, b| b.len().cmp(&a.len()));
    parts
}

fn boundary_edges(part: &[Pixel]) -> Vec<Edge> {
    let inside: HashSet<Pixel> = part.iter().copied().collect();
    let has = |c: Option<usize>, r: Option<usize>| match (c, r) {
        (Some(c), Some(r)) => inside.contains(&(c, r)),
        _ => false,
    };

    let mut edges = Vec::new();
    for &(c, r) in part {
        let pixel = (c, r);
        if !has(Some(c), r.checked_sub(1)) {
            edges.push(Edge {
                from: (c + 1, r),
                to: (c, r),
                pixel,
            });
        }
        if !has(c.checked_sub(1), Some(r)) {
            edges.push(Edge {
                from: (c, r),
                to: (c, r + 1),
                pixel,
            });
        }
        if !has(Some(c), Some(r + 1)) {
            edges.push(Edge {
                from: (c, r + 1),
                to: (c + 1, r + 1),
                pixel,
            });
        }
        if !has(Some(c + 1), Some(r)) {
            edges.push(Edge {
                from: (c + 1, r + 1),
                to: (c + 1, r),
                pixel,
            });
        }
    }
    edges
}

fn trace_rings(edges: &[Edge]) -> Vec<Vec<Vertex>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, e) in edges.iter().enumerate() {
        outgoing.entry(e.from).or_default().push(i);
    }

    let next = |current: usize| -> Option<usize> {
        let e = &edges[current];
        let candidates = outgoing.get(&e.to)?;
        candidates
            .iter()
            .copied()
            .find(|&i| edges[i].pixel == e.pixel)
            .or_else(|| candidates.first().copied())
    };

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let mut ring = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            ring.push(edges[current].from);
            match next(current) {
                Some(n) if !used[n] => current = n,
                _ => break,
            }
        }
        rings.push(ring);
    }
    rings
}

/// Drop vertices lying on a straight run between their neighbours.
fn merge_collinear(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    if n < 4 {
        return ring;
    }
    let at = |i: usize| {
        let (x, y) = ring[i % n];
        (x as i64, y as i64)
    };
    (0..n)
        .filter(|&i| {
            let (px, py) = at(i + n - 1);
            let (cx, cy) = at(i);
            let (nx, ny) = at(i + 1);
            (cx - px) * (ny - cy) - (cy - py) * (nx - cx) != 0
        })
        .map(|i| ring[i])
        .collect()
}

/// Twice the signed area of an open ring in pixel space.
fn twice_area(ring: &[Vertex]) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64
        })
        .sum()
}

/// Trace a 4-connected pixel part into a polygon in world coordinates.
pub fn trace_polygon(part: &[Pixel], transform: &GeoTransform) -> Result<Polygon, GeoError> {
    let rings: Vec<Vec<Vertex>> = trace_rings(&boundary_edges(part))
        .into_iter()
        .map(merge_collinear)
        .collect();

    let mut exterior: Option<(i64, Vec<Vertex>)> = None;
    let mut holes = Vec::new();
    for ring in rings {
        let area = twice_area(&ring);
        if area < 0 {
            match &exterior {
                Some((best, _)) if *best <= area => {}
                _ => exterior = Some((area, ring)),
            }
        } else if area > 0 {
            holes.push(ring);
        }
    }

    let to_world = |ring: Vec<Vertex>| -> Vec<Coord> {
        ring.into_iter()
            .map(|(c, r)| transform.pixel_to_world(c as f64, r as f64))
            .collect()
    };
    let (_, exterior) = exterior.ok_or(GeoError::EmptyGeometry)?;
    let polygon = Polygon::new(to_world(exterior), holes.into_iter().map(to_world).collect())?;
    Ok(polygon.oriented())
}
