//! Polygon validity checks run between pipeline stages.
//!
//! A polygon is valid when every ring has at least three distinct vertices
//! and non-zero area, no ring touches or crosses itself, rings of the same
//! polygon meet at most in isolated points that leave the interior
//! connected, and every hole lies inside the shell and outside the other
//! holes. Polygons of one feature must not overlap or share an edge.

use crate::feature::Feature;
use crate::rings::{polygon_rings, signed_area2, Key, Ring, RingPolygon};
use crate::{PipelineError, Result};
use geo::Polygon;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use std::collections::{BTreeMap, BTreeSet};

type Segment = GeomWithData<Rectangle<[i64; 2]>, (usize, usize)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Contact {
    None,
    Point,
    Crossing,
    Overlap,
}

fn orientation(o: Key, a: Key, b: Key) -> i128 {
    let (ax, ay) = ((a[0] - o[0]) as i128, (a[1] - o[1]) as i128);
    let (bx, by) = ((b[0] - o[0]) as i128, (b[1] - o[1]) as i128);
    (ax * by - ay * bx).signum()
}

fn within(a: Key, b: Key, p: Key) -> bool {
    a[0].min(b[0]) <= p[0]
        && p[0] <= a[0].max(b[0])
        && a[1].min(b[1]) <= p[1]
        && p[1] <= a[1].max(b[1])
}

fn contact(p1: Key, p2: Key, q1: Key, q2: Key) -> Contact {
    let o1 = orientation(p1, p2, q1);
    let o2 = orientation(p1, p2, q2);
    let o3 = orientation(q1, q2, p1);
    let o4 = orientation(q1, q2, p2);

    if o1 == 0 && o2 == 0 {
        // collinear: overlap when the shared stretch has positive length
        let axis = if p1[0] != p2[0] { 0 } else { 1 };
        let (pa, pb) = (p1[axis].min(p2[axis]), p1[axis].max(p2[axis]));
        let (qa, qb) = (q1[axis].min(q2[axis]), q1[axis].max(q2[axis]));
        let (lo, hi) = (pa.max(qa), pb.min(qb));
        return match lo.cmp(&hi) {
            std::cmp::Ordering::Less => Contact::Overlap,
            std::cmp::Ordering::Equal => Contact::Point,
            std::cmp::Ordering::Greater => Contact::None,
        };
    }
    if o1 * o2 < 0 && o3 * o4 < 0 {
        return Contact::Crossing;
    }
    let touches = (o1 == 0 && within(p1, p2, q1))
        || (o2 == 0 && within(p1, p2, q2))
        || (o3 == 0 && within(q1, q2, p1))
        || (o4 == 0 && within(q1, q2, p2));
    if touches {
        Contact::Point
    } else {
        Contact::None
    }
}

fn segment(ring: &[Key], i: usize) -> (Key, Key) {
    (ring[i], ring[(i + 1) % ring.len()])
}

/// Where two segments with a [`Contact::Point`] meet.
fn touch_point(p1: Key, p2: Key, q1: Key, q2: Key) -> Key {
    let on = |a: Key, b: Key, k: Key| orientation(a, b, k) == 0 && within(a, b, k);
    [q1, q2]
        .into_iter()
        .find(|&q| on(p1, p2, q))
        .unwrap_or(if on(q1, q2, p1) { p1 } else { p2 })
}

/// Ray-casting test for the midpoint of the first segment of `ring`
/// against `container`, in doubled coordinates so the midpoint stays exact.
fn inside(container: &[Key], ring: &[Key]) -> bool {
    let (a, b) = (ring[0], ring[1]);
    let p = [a[0] as i128 + b[0] as i128, a[1] as i128 + b[1] as i128];
    let n = container.len();
    let mut result = false;
    for i in 0..n {
        let (s, t) = segment(container, i);
        let (s, t) = (
            [2 * s[0] as i128, 2 * s[1] as i128],
            [2 * t[0] as i128, 2 * t[1] as i128],
        );
        if (s[1] > p[1]) != (t[1] > p[1]) {
            let lhs = (p[0] - s[0]) * (t[1] - s[1]);
            let rhs = (t[0] - s[0]) * (p[1] - s[1]);
            if (t[1] > s[1]) == (lhs < rhs) {
                result = !result;
            }
        }
    }
    result
}

/// Call `visit` for every pair of distinct, non-disjoint segments of `rings`,
/// addressed as `(ring, segment)`.
fn for_each_contact<F>(rings: &[&[Key]], mut visit: F) -> Result<()>
where
    F: FnMut((usize, usize), (usize, usize), Contact) -> Result<()>,
{
    let segments: Vec<Segment> = rings
        .iter()
        .enumerate()
        .flat_map(|(r, ring)| {
            (0..ring.len()).map(move |i| {
                let (a, b) = segment(ring, i);
                GeomWithData::new(Rectangle::from_corners(a, b), (r, i))
            })
        })
        .collect();
    let tree = RTree::bulk_load(segments.clone());

    for seg in &segments {
        let (r1, i1) = seg.data;
        let (p1, p2) = segment(rings[r1], i1);
        let envelope = AABB::from_corners(
            [p1[0].min(p2[0]), p1[1].min(p2[1])],
            [p1[0].max(p2[0]), p1[1].max(p2[1])],
        );
        for other in tree.locate_in_envelope_intersecting(&envelope) {
            let (r2, i2) = other.data;
            if (r2, i2) <= (r1, i1) {
                continue;
            }
            let (q1, q2) = segment(rings[r2], i2);
            match contact(p1, p2, q1, q2) {
                Contact::None => {}
                found => visit((r1, i1), (r2, i2), found)?,
            }
        }
    }
    Ok(())
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn check_rings(rings: &[Ring], stage: &'static str) -> Result<()> {
    for (r, ring) in rings.iter().enumerate() {
        if ring.len() < 3 {
            return Err(PipelineError::invalid(
                stage,
                format!("ring {r} has {} distinct vertices", ring.len()),
            ));
        }
        if signed_area2(ring) == 0 {
            return Err(PipelineError::invalid(stage, format!("ring {r} has zero area")));
        }
    }

    // rings and touch points as one graph; a cycle cuts the interior apart
    let views: Vec<&[Key]> = rings.iter().map(Vec::as_slice).collect();
    let mut touches: BTreeSet<(usize, Key)> = BTreeSet::new();
    for_each_contact(&views, |(r1, i1), (r2, i2), found| {
        let n = rings[r1].len();
        let adjacent = r1 == r2 && (i2 == i1 + 1 || (i1 == 0 && i2 == n - 1));
        match found {
            Contact::Point if adjacent => return Ok(()),
            Contact::Point if r1 != r2 => {
                let (p1, p2) = segment(&rings[r1], i1);
                let (q1, q2) = segment(&rings[r2], i2);
                let at = touch_point(p1, p2, q1, q2);
                touches.insert((r1, at));
                touches.insert((r2, at));
                return Ok(());
            }
            _ => {}
        }
        Err(PipelineError::invalid(
            stage,
            format!("ring {r1} segment {i1} and ring {r2} segment {i2} intersect ({found:?})"),
        ))
    })?;

    let mut nodes: BTreeMap<Key, usize> = BTreeMap::new();
    for (_, at) in &touches {
        let next = rings.len() + nodes.len();
        nodes.entry(*at).or_insert(next);
    }
    let mut parent: Vec<usize> = (0..rings.len() + nodes.len()).collect();
    for (r, at) in &touches {
        let (a, b) = (find(&mut parent, *r), find(&mut parent, nodes[at]));
        if a == b {
            return Err(PipelineError::invalid(
                stage,
                format!("ring {r} touches other rings in a cycle, the interior is disconnected"),
            ));
        }
        parent[a] = b;
    }

    let shell = &rings[0];
    for (h, hole) in rings.iter().enumerate().skip(1) {
        if !inside(shell, hole) {
            return Err(PipelineError::invalid(
                stage,
                format!("hole {h} lies outside the shell"),
            ));
        }
        for (o, other) in rings.iter().enumerate().skip(1) {
            if o != h && inside(other, hole) {
                return Err(PipelineError::invalid(
                    stage,
                    format!("hole {h} is nested in hole {o}"),
                ));
            }
        }
    }
    Ok(())
}

/// Check one polygon.
pub fn check_polygon(polygon: &Polygon<f64>, stage: &'static str) -> Result<()> {
    let (shell, holes) = polygon_rings(polygon);
    let mut rings = Vec::with_capacity(1 + holes.len());
    rings.push(shell);
    rings.extend(holes);
    check_rings(&rings, stage)
}

/// Polygons of one geometry may touch at points but neither share an edge
/// nor overlap.
fn check_disjoint(polygons: &[RingPolygon], stage: &'static str) -> Result<()> {
    let mut views: Vec<&[Key]> = Vec::new();
    let mut owner: Vec<usize> = Vec::new();
    for (p, (shell, holes)) in polygons.iter().enumerate() {
        for ring in std::iter::once(shell).chain(holes) {
            views.push(ring);
            owner.push(p);
        }
    }
    for_each_contact(&views, |(r1, _), (r2, _), found| {
        let (a, b) = (owner[r1], owner[r2]);
        if a != b && matches!(found, Contact::Crossing | Contact::Overlap) {
            return Err(PipelineError::invalid(
                stage,
                format!("polygons {a} and {b} overlap ({found:?})"),
            ));
        }
        Ok(())
    })?;

    for (a, (shell, holes)) in polygons.iter().enumerate() {
        for (b, (other, _)) in polygons.iter().enumerate() {
            let covered = a != b
                && inside(shell, other)
                && !holes.iter().any(|hole| inside(hole, other));
            if covered {
                return Err(PipelineError::invalid(
                    stage,
                    format!("polygon {b} lies inside polygon {a}"),
                ));
            }
        }
    }
    Ok(())
}

/// Check every polygon of a feature and that its polygons are disjoint.
pub fn check_feature(feature: &Feature, stage: &'static str) -> Result<()> {
    if feature.geometry.0.is_empty() {
        return Err(PipelineError::invalid(stage, "feature without geometry"));
    }
    feature
        .polygons()
        .iter()
        .try_for_each(|polygon| check_polygon(polygon, stage))?;
    if feature.polygons().len() > 1 {
        let rings: Vec<RingPolygon> = feature.polygons().iter().map(polygon_rings).collect();
        check_disjoint(&rings, stage)?;
    }
    Ok(())
}
