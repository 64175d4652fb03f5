//! Topology-preserving simplification.
//!
//! All rings of the layer are noded against each other and cut at junctions
//! (vertices with other than two distinct neighbours) into arcs. Every arc is
//! stored once, whichever rings use it and in which direction, and is
//! simplified once with Douglas-Peucker (`geo::SimplifyIdx`) with its end points fixed. Rings are
//! then rebuilt from the simplified arcs, so two polygons sharing a boundary
//! see the identical simplified edge and no slivers open between them.
//!
//! Simplified vertices are always a subset of the original ones. When a
//! rebuilt feature is invalid, the arcs it uses are restored to their
//! original vertices (for every feature sharing them) until all features
//! are valid.

use crate::feature::{Feature, Layer};
use crate::rings::{coord_of, node_rings, orient, polygon_rings, to_polygon, Key, Ring};
use crate::validity::check_feature;
use crate::{PipelineError, Result};
use footprint_metrics::metric_defs;
use geo::{Coord, LineString, MultiPolygon, SimplifyIdx};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

const STAGE: &str = "simplify";

#[derive(Debug, Clone, Copy)]
struct ArcUse {
    arc: usize,
    reversed: bool,
}

/// Unique arcs and the way each ring is assembled from them.
#[derive(Debug, Default)]
struct Topology {
    arcs: Vec<Vec<Key>>,
    index: HashMap<Vec<Key>, usize>,
}

impl Topology {
    fn register(&mut self, arc: Vec<Key>) -> ArcUse {
        let reversed_arc: Vec<Key> = arc.iter().rev().copied().collect();
        let (canonical, reversed) = if reversed_arc < arc {
            (reversed_arc, true)
        } else {
            (arc, false)
        };
        let next = self.arcs.len();
        let arc = *self.index.entry(canonical.clone()).or_insert(next);
        if arc == next {
            self.arcs.push(canonical);
        }
        ArcUse { arc, reversed }
    }

    fn split(&mut self, ring: &[Key], junctions: &BTreeSet<Key>) -> Vec<ArcUse> {
        let n = ring.len();
        let starts: Vec<usize> = (0..n).filter(|&i| junctions.contains(&ring[i])).collect();
        if starts.is_empty() {
            let first = (0..n).min_by_key(|&i| ring[i]).unwrap_or(0);
            let arc = (0..=n).map(|k| ring[(first + k) % n]).collect();
            return vec![self.register(arc)];
        }
        starts
            .iter()
            .enumerate()
            .map(|(j, &start)| {
                let end = starts[(j + 1) % starts.len()];
                let len = (end + n - start - 1) % n + 1;
                let arc = (0..=len).map(|k| ring[(start + k) % n]).collect();
                self.register(arc)
            })
            .collect()
    }
}

fn junctions(rings: &[Ring]) -> BTreeSet<Key> {
    let mut neighbours: HashMap<Key, BTreeSet<Key>> = HashMap::new();
    for ring in rings {
        let n = ring.len();
        for i in 0..n {
            let entry = neighbours.entry(ring[i]).or_default();
            entry.insert(ring[(i + n - 1) % n]);
            entry.insert(ring[(i + 1) % n]);
        }
    }
    neighbours
        .into_iter()
        .filter(|(_, adjacent)| adjacent.len() != 2)
        .map(|(k, _)| k)
        .collect()
}

/// Indices of `arc[lo..=hi]` that Douglas-Peucker keeps.
fn kept(points: &[Coord<f64>], lo: usize, hi: usize, tolerance: f64) -> Vec<usize> {
    LineString::from(points[lo..=hi].to_vec())
        .simplify_idx(&tolerance)
        .into_iter()
        .map(|i| lo + i)
        .collect()
}

/// Simplified arc; a closed arc is split at its vertex farthest from the
/// start and keeps at least three distinct vertices.
fn simplify_arc(arc: &[Key], tolerance: f64) -> Vec<Key> {
    let origin = arc[0];
    let points: Vec<Coord<f64>> = arc
        .iter()
        .map(|k| coord_of([k[0] - origin[0], k[1] - origin[1]]))
        .collect();
    let last = arc.len() - 1;

    let indices = if arc[0] == arc[last] {
        if arc.len() <= 4 {
            return arc.to_vec();
        }
        let far = (1..last)
            .max_by(|&a, &b| {
                let (da, db) = (points[a].x.hypot(points[a].y), points[b].x.hypot(points[b].y));
                da.total_cmp(&db)
            })
            .unwrap_or(1);
        let mut indices = kept(&points, 0, far, tolerance);
        indices.extend(kept(&points, far, last, tolerance).into_iter().skip(1));
        if indices.len() < 4 {
            return arc.to_vec();
        }
        indices
    } else {
        kept(&points, 0, last, tolerance)
    };
    indices.into_iter().map(|i| arc[i]).collect()
}

fn ring_from_arcs(uses: &[ArcUse], arcs: &[Vec<Key>]) -> Ring {
    let mut ring = Vec::new();
    for u in uses {
        let arc = &arcs[u.arc];
        let vertices: Vec<Key> = if u.reversed {
            arc.iter().rev().copied().collect()
        } else {
            arc.clone()
        };
        ring.extend_from_slice(&vertices[..vertices.len() - 1]);
    }
    ring
}

/// One polygon of the input: owning feature and the arcs of its rings,
/// shell first.
struct PolygonArcs {
    feature: usize,
    rings: Vec<Vec<ArcUse>>,
}

impl PolygonArcs {
    fn rebuild(&self, arcs: &[Vec<Key>]) -> geo::Polygon<f64> {
        let mut rings = self.rings.iter().map(|uses| ring_from_arcs(uses, arcs));
        let shell = rings.next().unwrap_or_default();
        to_polygon(&(shell, rings.collect()))
    }

    fn arc_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.rings.iter().flatten().map(|u| u.arc)
    }
}

/// Simplify every boundary of the layer with a shared topology.
pub fn simplify(layer: Layer, tolerance_m: f64) -> Result<Layer> {
    if layer.is_empty() {
        return Ok(layer);
    }
    if !(tolerance_m >= 0.0) || !tolerance_m.is_finite() {
        return Err(PipelineError::Configuration(format!(
            "simplification tolerance must be a non-negative number, got {tolerance_m}"
        )));
    }
    let Layer { epsg, features } = layer;

    let mut rings: Vec<Ring> = Vec::new();
    let mut layout: Vec<(usize, Vec<usize>)> = Vec::new();
    for (f, feature) in features.iter().enumerate() {
        for polygon in feature.polygons() {
            let mut rp = polygon_rings(polygon);
            orient(&mut rp);
            let (shell, holes) = rp;
            if shell.len() < 3 || holes.iter().any(|h| h.len() < 3) {
                return Err(PipelineError::invalid(
                    STAGE,
                    format!("feature {f} has a ring with fewer than three vertices"),
                ));
            }
            let mut ids = vec![rings.len()];
            rings.push(shell);
            for hole in holes {
                ids.push(rings.len());
                rings.push(hole);
            }
            layout.push((f, ids));
        }
    }
    node_rings(rings.iter_mut());
    let junctions = junctions(&rings);

    let mut topology = Topology::default();
    let ring_arcs: Vec<Vec<ArcUse>> = rings
        .iter()
        .map(|ring| topology.split(ring, &junctions))
        .collect();
    let polygons: Vec<PolygonArcs> = layout
        .into_iter()
        .map(|(feature, ids)| PolygonArcs {
            feature,
            rings: ids.iter().map(|&r| ring_arcs[r].clone()).collect(),
        })
        .collect();
    // features using each arc, and the polygons of each feature
    let mut users: Vec<Vec<usize>> = vec![Vec::new(); topology.arcs.len()];
    let mut parts: Vec<Vec<usize>> = vec![Vec::new(); features.len()];
    for (p, polygon) in polygons.iter().enumerate() {
        parts[polygon.feature].push(p);
        for arc in polygon.arc_ids() {
            if users[arc].last() != Some(&polygon.feature) {
                users[arc].push(polygon.feature);
            }
        }
    }

    let original = topology.arcs;
    let mut current: Vec<Vec<Key>> = original
        .iter()
        .map(|arc| simplify_arc(arc, tolerance_m))
        .collect();

    let mut rebuilt: Vec<MultiPolygon<f64>> = vec![MultiPolygon(Vec::new()); features.len()];
    let mut pending: BTreeSet<usize> = (0..features.len()).filter(|&f| !parts[f].is_empty()).collect();
    let mut reverted = 0u64;
    while !pending.is_empty() {
        let mut touched = BTreeSet::new();
        for &f in &pending {
            let shape = Feature {
                class: features[f].class,
                geometry: parts[f].iter().map(|&p| polygons[p].rebuild(&current)).collect(),
            };
            let checked = check_feature(&shape, STAGE);
            rebuilt[f] = shape.geometry;
            if let Err(e) = checked {
                let mut restored = false;
                for arc in parts[f].iter().flat_map(|&p| polygons[p].arc_ids()) {
                    if current[arc] != original[arc] {
                        current[arc] = original[arc].clone();
                        touched.extend(users[arc].iter().copied());
                        reverted += 1;
                        restored = true;
                    }
                }
                if !restored {
                    return Err(e);
                }
            }
        }
        pending = touched;
    }

    metrics::counter!(metric_defs::SIMPLIFY_ARCS.name).increment(original.len() as u64);
    metrics::counter!(metric_defs::SIMPLIFY_ARCS_REVERTED.name).increment(reverted);
    debug!(
        arcs = original.len(),
        junctions = junctions.len(),
        reverted,
        tolerance_m,
        "Simplified layer"
    );

    let features = features
        .into_iter()
        .zip(rebuilt)
        .map(|(feature, geometry)| Feature {
            class: feature.class,
            geometry,
        })
        .collect();
    Ok(Layer::new(epsg, features))
}
