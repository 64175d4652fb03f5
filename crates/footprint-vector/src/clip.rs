//! Restricting a layer to a region.

use crate::feature::{Feature, Layer};
use crate::validity::check_feature;
use crate::Result;
use footprint_metrics::metric_defs;
use footprint_tile::BoundingBox;
use geo::{Area, BooleanOps, BoundingRect, Coord, MultiPolygon, Rect};
use tracing::debug;

const STAGE: &str = "clip";

/// Clip target.
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// Arbitrary boundary polygon(s).
    Boundary(MultiPolygon<f64>),
    /// Axis-aligned rectangle.
    BoundingBox(BoundingBox),
}

impl Region {
    fn rect(bbox: &BoundingBox) -> Rect<f64> {
        Rect::new(
            Coord {
                x: bbox.x1,
                y: bbox.y1,
            },
            Coord {
                x: bbox.x2,
                y: bbox.y2,
            },
        )
    }

    /// The region as polygons.
    pub fn to_multipolygon(&self) -> MultiPolygon<f64> {
        match self {
            Region::Boundary(boundary) => boundary.clone(),
            Region::BoundingBox(bbox) => MultiPolygon(vec![Self::rect(bbox).to_polygon()]),
        }
    }

    fn envelope(&self) -> Option<Rect<f64>> {
        match self {
            Region::Boundary(boundary) => boundary.bounding_rect(),
            Region::BoundingBox(bbox) => Some(Self::rect(bbox)),
        }
    }
}

fn disjoint(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.max().x <= b.min().x || b.max().x <= a.min().x || a.max().y <= b.min().y || b.max().y <= a.min().y
}

fn covers(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && inner.max().x <= outer.max().x
        && inner.max().y <= outer.max().y
}

/// Intersect every feature with `region`.
///
/// Only areal parts of the intersection are kept; features whose
/// intersection has no area are dropped. A feature cut into several pieces
/// stays one feature, so the feature count never grows.
pub fn clip(layer: Layer, region: &Region) -> Result<Layer> {
    if layer.is_empty() {
        return Ok(layer);
    }
    let Layer { epsg, features } = layer;
    let before = features.len();
    let envelope = region.envelope();
    let mask = region.to_multipolygon();

    let mut kept = Vec::with_capacity(features.len());
    for feature in features {
        let Some(bounds) = feature.geometry.bounding_rect() else {
            continue;
        };
        let Some(envelope) = envelope else {
            continue;
        };
        if disjoint(&bounds, &envelope) {
            continue;
        }
        if matches!(region, Region::BoundingBox(_)) && covers(&envelope, &bounds) {
            kept.push(feature);
            continue;
        }

        let parts: Vec<_> = feature
            .geometry
            .intersection(&mask)
            .0
            .into_iter()
            .filter(|p| p.unsigned_area() > 0.0)
            .collect();
        if parts.is_empty() {
            continue;
        }
        let clipped = Feature {
            class: feature.class,
            geometry: MultiPolygon(parts),
        };
        check_feature(&clipped, STAGE)?;
        kept.push(clipped);
    }

    let dropped = before - kept.len();
    metrics::counter!(metric_defs::CLIP_DROPPED.name).increment(dropped as u64);
    debug!(kept = kept.len(), dropped, "Clipped layer");
    Ok(Layer::new(epsg, kept))
}
