//! Exact ring arithmetic on a snapped integer grid.
//!
//! Vertices are keyed by their coordinates rounded to micrometres so that
//! vertices computed independently in adjacent tiles compare equal. Rings
//! are open vertex lists (the closing vertex is not repeated), oriented
//! y-up: shells counter-clockwise, holes clockwise, interior on the left of
//! every directed edge.

use crate::{PipelineError, Result};
use geo::{Coord, LineString, Polygon};
use rstar::{RTree, AABB};
use std::collections::{BTreeMap, BTreeSet};

/// Snapped vertex.
pub(crate) type Key = [i64; 2];

/// Open ring of snapped vertices.
pub(crate) type Ring = Vec<Key>;

/// Shell plus holes, both as open rings.
pub(crate) type RingPolygon = (Ring, Vec<Ring>);

const SNAP: f64 = 1e6;

pub(crate) fn key_of(c: Coord<f64>) -> Key {
    [(c.x * SNAP).round() as i64, (c.y * SNAP).round() as i64]
}

pub(crate) fn coord_of(k: Key) -> Coord<f64> {
    Coord {
        x: k[0] as f64 / SNAP,
        y: k[1] as f64 / SNAP,
    }
}

fn cross(o: Key, a: Key, b: Key) -> i128 {
    let (ax, ay) = ((a[0] - o[0]) as i128, (a[1] - o[1]) as i128);
    let (bx, by) = ((b[0] - o[0]) as i128, (b[1] - o[1]) as i128);
    ax * by - ay * bx
}

fn dot(o: Key, a: Key, b: Key) -> i128 {
    let (ax, ay) = ((a[0] - o[0]) as i128, (a[1] - o[1]) as i128);
    let (bx, by) = ((b[0] - o[0]) as i128, (b[1] - o[1]) as i128);
    ax * bx + ay * by
}

/// Twice the signed area; positive for counter-clockwise rings.
pub(crate) fn signed_area2(ring: &[Key]) -> i128 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a[0] as i128 * b[1] as i128 - b[0] as i128 * a[1] as i128
        })
        .sum()
}

/// Signed turn from direction `a -> v` to `v -> b`, left turns positive.
/// A reversal counts as the widest left turn.
fn turn(a: Key, v: Key, b: Key) -> f64 {
    let d_in = [(v[0] - a[0]) as f64, (v[1] - a[1]) as f64];
    let d_out = [(b[0] - v[0]) as f64, (b[1] - v[1]) as f64];
    let c = d_in[0] * d_out[1] - d_in[1] * d_out[0];
    let d = d_in[0] * d_out[0] + d_in[1] * d_out[1];
    if c == 0.0 && d < 0.0 {
        std::f64::consts::PI
    } else {
        c.atan2(d)
    }
}

/// Link directed boundary edges into rings.
///
/// Every vertex must have as many incoming as outgoing edges. Where several
/// edges leave a vertex the walk takes the sharpest right turn, so it hugs
/// the exterior side and a shell touching itself at a point splits into a
/// shell and a hole that share that vertex.
pub(crate) fn assemble_rings(edges: &[(Key, Key)], stage: &'static str) -> Result<Vec<Ring>> {
    let mut outgoing: BTreeMap<Key, Vec<usize>> = BTreeMap::new();
    for (i, (from, _)) in edges.iter().enumerate() {
        outgoing.entry(*from).or_default().push(i);
    }

    let next_edge = |incoming: usize| -> Result<usize> {
        let (a, v) = edges[incoming];
        outgoing
            .get(&v)
            .and_then(|candidates| {
                candidates.iter().copied().min_by(|&x, &y| {
                    turn(a, v, edges[x].1).total_cmp(&turn(a, v, edges[y].1))
                })
            })
            .ok_or_else(|| PipelineError::invalid(stage, "boundary is not closed"))
    };

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        let mut ring = Vec::new();
        let mut current = first;
        loop {
            used[current] = true;
            ring.push(edges[current].0);
            let next = next_edge(current)?;
            if next == first {
                break;
            }
            if used[next] {
                return Err(PipelineError::invalid(stage, "boundary edges do not pair up"));
            }
            current = next;
        }
        rings.push(ring);
    }
    Ok(rings)
}

/// Drop repeated vertices and vertices lying straight between their neighbours.
pub(crate) fn remove_collinear(ring: &mut Ring) {
    ring.dedup();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    let mut changed = true;
    while changed && ring.len() > 3 {
        changed = false;
        let n = ring.len();
        for i in 0..n {
            let prev = ring[(i + n - 1) % n];
            let next = ring[(i + 1) % n];
            if cross(prev, ring[i], next) == 0 && dot(ring[i], next, prev) < 0 {
                ring.remove(i);
                changed = true;
                break;
            }
        }
    }
}

/// Even-odd test for a point given in doubled grid units.
fn contains_doubled(ring: &[Key], p: [i128; 2]) -> bool {
    let n = ring.len();
    let mut inside = false;
    for i in 0..n {
        let a = [2 * ring[i][0] as i128, 2 * ring[i][1] as i128];
        let b = [
            2 * ring[(i + 1) % n][0] as i128,
            2 * ring[(i + 1) % n][1] as i128,
        ];
        if (a[1] > p[1]) != (b[1] > p[1]) {
            // x of the crossing compared without division
            let lhs = (p[0] - a[0]) * (b[1] - a[1]);
            let rhs = (b[0] - a[0]) * (p[1] - a[1]);
            if (b[1] > a[1]) == (lhs < rhs) {
                inside = !inside;
            }
        }
    }
    inside
}

/// Sort rings into shells and holes and attach every hole to the smallest
/// shell containing it.
pub(crate) fn build_polygons(rings: Vec<Ring>, stage: &'static str) -> Result<Vec<RingPolygon>> {
    let (shells, holes): (Vec<Ring>, Vec<Ring>) = rings
        .into_iter()
        .filter(|r| r.len() >= 3 && signed_area2(r) != 0)
        .partition(|r| signed_area2(r) > 0);

    let areas: Vec<i128> = shells.iter().map(|s| signed_area2(s)).collect();
    let mut polygons: Vec<RingPolygon> = shells.into_iter().map(|s| (s, Vec::new())).collect();
    for hole in holes {
        let (a, b) = (hole[0], hole[1]);
        let midpoint = [a[0] as i128 + b[0] as i128, a[1] as i128 + b[1] as i128];
        let owner = polygons
            .iter()
            .enumerate()
            .filter(|(_, (shell, _))| contains_doubled(shell, midpoint))
            .min_by_key(|(i, _)| areas[*i])
            .map(|(i, _)| i)
            .ok_or_else(|| PipelineError::invalid(stage, "hole outside every shell"))?;
        polygons[owner].1.push(hole);
    }
    Ok(polygons)
}

/// Split every segment at the vertices of any ring lying inside it, so
/// boundaries shared between rings consist of identical edges.
pub(crate) fn node_rings<'a, I>(rings: I)
where
    I: IntoIterator<Item = &'a mut Ring>,
{
    let mut rings: Vec<&mut Ring> = rings.into_iter().collect();
    let vertices: BTreeSet<Key> = rings.iter().flat_map(|r| r.iter().copied()).collect();
    let index = RTree::bulk_load(vertices.into_iter().collect::<Vec<Key>>());

    for ring in rings.iter_mut() {
        let n = ring.len();
        let mut noded = Vec::with_capacity(n);
        for i in 0..n {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            noded.push(a);
            let envelope = AABB::from_corners(
                [a[0].min(b[0]), a[1].min(b[1])],
                [a[0].max(b[0]), a[1].max(b[1])],
            );
            let mut inner: Vec<Key> = index
                .locate_in_envelope(&envelope)
                .copied()
                .filter(|&p| p != a && p != b && cross(a, b, p) == 0)
                .collect();
            inner.sort_by_key(|&p| dot(a, b, p));
            noded.extend(inner);
        }
        **ring = noded;
    }
}

/// Open, deduplicated rings of a polygon.
pub(crate) fn polygon_rings(polygon: &Polygon<f64>) -> RingPolygon {
    let open = |ls: &LineString<f64>| -> Ring {
        let mut ring: Ring = ls.coords().map(|c| key_of(*c)).collect();
        ring.dedup();
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        ring
    };
    (
        open(polygon.exterior()),
        polygon.interiors().iter().map(open).collect(),
    )
}

/// Orient a shell counter-clockwise and its holes clockwise.
pub(crate) fn orient(polygon: &mut RingPolygon) {
    if signed_area2(&polygon.0) < 0 {
        polygon.0.reverse();
    }
    for hole in &mut polygon.1 {
        if signed_area2(hole) > 0 {
            hole.reverse();
        }
    }
}

fn line_string(ring: &[Key]) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = ring.iter().map(|&k| coord_of(k)).collect();
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    LineString::new(coords)
}

pub(crate) fn to_polygon((shell, holes): &RingPolygon) -> Polygon<f64> {
    Polygon::new(line_string(shell), holes.iter().map(|h| line_string(h)).collect())
}
