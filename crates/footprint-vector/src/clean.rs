//! Area-based cleaning: sieving small features and filling small holes.

use crate::feature::{FeatureClass, Layer};
use footprint_metrics::metric_defs;
use geo::{Area, LineString, Polygon};
use tracing::debug;

/// Drop features smaller than `min_area_m2`.
///
/// Kept features are returned unmodified and in their original order.
pub fn sieve(layer: Layer, min_area_m2: f64) -> Layer {
    if layer.is_empty() {
        return layer;
    }
    let before = layer.len();
    let Layer { epsg, features } = layer;
    let kept: Vec<_> = features
        .into_iter()
        .filter(|f| f.area() >= min_area_m2)
        .collect();
    let removed = before - kept.len();
    metrics::counter!(metric_defs::SIEVE_REMOVED.name).increment(removed as u64);
    debug!(removed, kept = kept.len(), min_area_m2, "Sieved layer");
    Layer::new(epsg, kept)
}

/// Hole area below which a hole of `class` is filled.
///
/// Buildings keep courtyards up to twice the base threshold before treating
/// them as noise.
pub fn hole_threshold(class: FeatureClass, base_m2: f64) -> f64 {
    match class {
        FeatureClass::Building => 2.0 * base_m2,
        FeatureClass::Structure => base_m2,
    }
}

fn ring_area(ring: &LineString<f64>) -> f64 {
    Polygon::new(ring.clone(), Vec::new()).unsigned_area()
}

/// Remove holes smaller than the class threshold derived from `max_hole_m2`.
pub fn fill_holes(layer: Layer, max_hole_m2: f64) -> Layer {
    if layer.is_empty() {
        return layer;
    }
    let Layer { epsg, mut features } = layer;
    let mut filled = 0usize;
    for feature in &mut features {
        let threshold = hole_threshold(feature.class, max_hole_m2);
        for polygon in feature.geometry.0.iter_mut() {
            if polygon.interiors().is_empty() {
                continue;
            }
            let before = polygon.interiors().len();
            let kept: Vec<LineString<f64>> = polygon
                .interiors()
                .iter()
                .filter(|ring| ring_area(ring) >= threshold)
                .cloned()
                .collect();
            if kept.len() != before {
                filled += before - kept.len();
                *polygon = Polygon::new(polygon.exterior().clone(), kept);
            }
        }
    }
    metrics::counter!(metric_defs::HOLES_FILLED.name).increment(filled as u64);
    debug!(filled, max_hole_m2, "Filled holes");
    Layer::new(epsg, features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Epsg, Feature};
    use geo::polygon;

    fn with_hole(class: FeatureClass, hole_side: f64) -> Feature {
        let shell = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]);
        let hole = LineString::from(vec![
            (2.0, 2.0),
            (2.0, 2.0 + hole_side),
            (2.0 + hole_side, 2.0 + hole_side),
            (2.0 + hole_side, 2.0),
            (2.0, 2.0),
        ]);
        Feature::new(class, Polygon::new(shell, vec![hole]))
    }

    fn square(side: f64) -> Feature {
        Feature::new(
            FeatureClass::Structure,
            polygon![(x: 0.0, y: 0.0), (x: side, y: 0.0), (x: side, y: side), (x: 0.0, y: side)],
        )
    }

    #[test]
    fn test_sieve_boundary_is_inclusive() {
        let layer = Layer::new(Epsg(25832), vec![square(1.0), square(2.0), square(3.0)]);
        let out = sieve(layer, 4.0);
        let areas: Vec<f64> = out.features.iter().map(Feature::area).collect();
        assert_eq!(areas, vec![4.0, 9.0]);
    }

    #[test]
    fn test_sieve_empty_layer() {
        assert!(sieve(Layer::empty(Epsg(25832)), 5.0).is_empty());
    }

    #[test]
    fn test_building_threshold_is_doubled() {
        assert_eq!(hole_threshold(FeatureClass::Building, 1.5), 3.0);
        assert_eq!(hole_threshold(FeatureClass::Structure, 1.5), 1.5);

        // 1.5 m x 1.5 m hole = 2.25 m2, between the two thresholds for base 2
        let layer = Layer::new(
            Epsg(25832),
            vec![
                with_hole(FeatureClass::Building, 1.5),
                with_hole(FeatureClass::Structure, 1.5),
            ],
        );
        let out = fill_holes(layer, 2.0);
        assert!(out.features[0].polygons()[0].interiors().is_empty());
        assert_eq!(out.features[1].polygons()[0].interiors().len(), 1);
    }

    #[test]
    fn test_hole_at_threshold_is_kept() {
        let layer = Layer::new(Epsg(25832), vec![with_hole(FeatureClass::Structure, 2.0)]);
        let out = fill_holes(layer, 4.0);
        assert_eq!(out.features[0].polygons()[0].interiors().len(), 1);
    }

    #[test]
    fn test_polygon_without_holes_is_unchanged() {
        let layer = Layer::new(Epsg(25832), vec![square(3.0)]);
        assert_eq!(fill_holes(layer.clone(), 100.0), layer);
    }
}
