//! Reconciling features split by tile seams.
//!
//! Tiles are vectorized independently, so a structure crossing a tile edge
//! arrives as one feature per tile. Same-class features that share a
//! boundary stretch of positive length are unioned here by cancelling their
//! common edges on the snapped grid. Features that only touch at a point, or
//! touch a feature of another class, are left alone.

use crate::feature::{Feature, FeatureClass, Layer};
use crate::rings::{
    assemble_rings, build_polygons, node_rings, orient, polygon_rings, remove_collinear,
    to_polygon, Key, RingPolygon,
};
use crate::validity::check_feature;
use crate::Result;
use footprint_metrics::metric_defs;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const STAGE: &str = "dissolve";

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn edges_of(polygons: &[RingPolygon]) -> Vec<(Key, Key)> {
    let mut edges = Vec::new();
    for (shell, holes) in polygons {
        for ring in std::iter::once(shell).chain(holes) {
            let n = ring.len();
            edges.extend((0..n).map(|i| (ring[i], ring[(i + 1) % n])));
        }
    }
    edges
}

/// Union same-class features that share an edge.
pub fn dissolve_seams(layer: Layer) -> Result<Layer> {
    if layer.is_empty() {
        return Ok(layer);
    }
    let Layer { epsg, features } = layer;

    let mut by_class: BTreeMap<FeatureClass, Vec<usize>> = BTreeMap::new();
    for (i, feature) in features.iter().enumerate() {
        by_class.entry(feature.class).or_default().push(i);
    }

    // Merged output keyed by the index of the first member, `None` for absorbed features.
    let mut replacement: Vec<Option<Vec<Feature>>> = vec![None; features.len()];
    let mut absorbed = vec![false; features.len()];
    let mut merged_count = 0u64;

    for (class, members) in by_class {
        let mut rings: Vec<Vec<RingPolygon>> = members
            .iter()
            .map(|&i| {
                features[i]
                    .polygons()
                    .iter()
                    .map(|p| {
                        let mut rp = polygon_rings(p);
                        orient(&mut rp);
                        rp
                    })
                    .collect()
            })
            .collect();
        node_rings(
            rings
                .iter_mut()
                .flat_map(|polys| polys.iter_mut())
                .flat_map(|(shell, holes)| std::iter::once(shell).chain(holes.iter_mut())),
        );

        let edges: Vec<Vec<(Key, Key)>> = rings.iter().map(|p| edges_of(p)).collect();
        let mut owner: HashMap<(Key, Key), usize> = HashMap::new();
        for (m, feature_edges) in edges.iter().enumerate() {
            for &edge in feature_edges {
                owner.insert(edge, m);
            }
        }
        let mut parent: Vec<usize> = (0..members.len()).collect();
        for (m, feature_edges) in edges.iter().enumerate() {
            for &(a, b) in feature_edges {
                if let Some(&other) = owner.get(&(b, a)) {
                    let (ra, rb) = (find(&mut parent, m), find(&mut parent, other));
                    if ra != rb {
                        parent[ra.max(rb)] = ra.min(rb);
                    }
                }
            }
        }

        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for m in 0..members.len() {
            let root = find(&mut parent, m);
            components.entry(root).or_default().push(m);
        }

        for component in components.into_values().filter(|c| c.len() > 1) {
            let mut counts: HashMap<(Key, Key), usize> = HashMap::new();
            for &m in &component {
                for &(a, b) in &edges[m] {
                    let reverse = counts.get(&(b, a)).copied().unwrap_or(0);
                    if reverse > 0 {
                        counts.insert((b, a), reverse - 1);
                    } else {
                        *counts.entry((a, b)).or_default() += 1;
                    }
                }
            }
            let mut remaining: Vec<(Key, Key)> = counts
                .into_iter()
                .flat_map(|(edge, n)| std::iter::repeat(edge).take(n))
                .collect();
            remaining.sort();

            let mut merged_rings = assemble_rings(&remaining, STAGE)?;
            for ring in &mut merged_rings {
                remove_collinear(ring);
            }
            let mut merged = Vec::new();
            for polygon in build_polygons(merged_rings, STAGE)? {
                let feature = Feature::new(class, to_polygon(&polygon));
                check_feature(&feature, STAGE)?;
                merged.push(feature);
            }

            let first = members[component[0]];
            for &m in &component {
                absorbed[members[m]] = true;
            }
            debug!(
                class = class.as_str(),
                parts = component.len(),
                polygons = merged.len(),
                "Dissolved seam"
            );
            merged_count += component.len() as u64;
            replacement[first] = Some(merged);
        }
    }

    metrics::counter!(metric_defs::DISSOLVE_MERGED.name).increment(merged_count);
    let mut out = Vec::with_capacity(features.len());
    for ((feature, merged), absorbed) in features.into_iter().zip(replacement).zip(absorbed) {
        match merged {
            Some(merged) => out.extend(merged),
            None if !absorbed => out.push(feature),
            None => {}
        }
    }
    Ok(Layer::new(epsg, out))
}
