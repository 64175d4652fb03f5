//! Raster-to-vector extraction of one tile.

use crate::feature::{ClassMap, Feature};
use crate::rings::{assemble_rings, build_polygons, key_of, remove_collinear, to_polygon, Key};
use crate::validity::check_feature;
use crate::{PipelineError, Result};
use footprint_metrics::metric_defs;
use footprint_tile::{Coordinate, GeoTransform, Mask, TileError, TileGeometry};
use geo::Coord;
use std::collections::VecDeque;
use tracing::debug;

const STAGE: &str = "extract";

/// Converts classification masks into classified polygons.
///
/// The class table and tile geometry are fixed at construction and shared by
/// every tile processed with this extractor.
#[derive(Debug, Clone)]
pub struct Extractor {
    geometry: TileGeometry,
    classes: ClassMap,
}

impl Extractor {
    /// Create an extractor for the given grid and class table.
    pub fn new(geometry: TileGeometry, classes: ClassMap) -> Result<Self> {
        geometry.validate().map_err(invalid_grid)?;
        Ok(Self { geometry, classes })
    }

    /// Grid this extractor works on.
    pub fn geometry(&self) -> &TileGeometry {
        &self.geometry
    }

    /// Class table.
    pub fn classes(&self) -> &ClassMap {
        &self.classes
    }

    /// Extract the features of the tile whose top-left corner is `coord`.
    pub fn extract(&self, mask: &Mask, coord: Coordinate) -> Result<Vec<Feature>> {
        self.extract_with_resolution(mask, coord, None)
    }

    /// Extract using a cell size other than the configured one.
    ///
    /// The mask must cover the tile, optionally extended by the border; a
    /// border is cropped before vectorizing so neighbouring tiles never
    /// overlap.
    pub fn extract_with_resolution(
        &self,
        mask: &Mask,
        coord: Coordinate,
        resolution_m: Option<f64>,
    ) -> Result<Vec<Feature>> {
        let geometry = match resolution_m {
            Some(resolution) => self.geometry.with_resolution(resolution).map_err(invalid_grid)?,
            None => self.geometry,
        };

        let tile = geometry.tile_cells();
        let border = geometry.border_cells();
        let transform = GeoTransform::for_tile(coord, &geometry);
        let (mask, transform) = if mask.width() == tile + 2 * border && mask.height() == tile + 2 * border {
            (mask.crop(border)?, transform.inset(border))
        } else if mask.width() == tile && mask.height() == tile {
            (mask.clone(), transform.inset(border))
        } else {
            return Err(PipelineError::Configuration(format!(
                "mask for tile {coord} is {}x{}, expected {tile}x{tile} or {m}x{m} cells",
                mask.width(),
                mask.height(),
                m = tile + 2 * border
            )));
        };

        if mask.is_background() {
            debug!(tile = %coord, "Mask is empty");
            return Ok(Vec::new());
        }

        let mut features = Vec::new();
        for region in regions(&mask) {
            let class = self.classes.class_of(region.label).ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "label {} in tile {coord} has no class",
                    region.label
                ))
            })?;

            let mut rings = assemble_rings(&region.edges, STAGE)?;
            for ring in &mut rings {
                remove_collinear(ring);
            }
            for (shell, holes) in build_polygons(rings, STAGE)? {
                let to_map = |ring: Vec<Key>| -> Vec<Key> {
                    ring.into_iter().map(|k| map_vertex(&transform, k)).collect()
                };
                let polygon = (to_map(shell), holes.into_iter().map(to_map).collect());
                let feature = Feature::new(class, to_polygon(&polygon));
                check_feature(&feature, STAGE)?;
                metrics::counter!(metric_defs::FEATURES_EXTRACTED.name, "class" => class.as_str())
                    .increment(1);
                features.push(feature);
            }
        }
        debug!(tile = %coord, features = features.len(), "Extracted tile");
        Ok(features)
    }
}

fn invalid_grid(e: TileError) -> PipelineError {
    PipelineError::Configuration(e.to_string())
}

/// Grid corner `[col, -row]` to snapped map coordinates.
fn map_vertex(transform: &GeoTransform, k: Key) -> Key {
    let (x, y) = transform.corner((-k[1]) as usize, k[0] as usize);
    key_of(Coord { x, y })
}

struct Region {
    label: u8,
    edges: Vec<(Key, Key)>,
}

/// 4-connected regions of equal non-zero label with their boundary edges in
/// grid corner coordinates `[col, -row]`, interior on the left.
fn regions(mask: &Mask) -> Vec<Region> {
    let (width, height) = (mask.width(), mask.height());
    let mut seen = vec![false; width * height];
    let mut out = Vec::new();

    for start in 0..width * height {
        let label = mask.as_slice()[start];
        if label == 0 || seen[start] {
            continue;
        }
        seen[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut edges = Vec::new();
        while let Some(cell) = queue.pop_front() {
            let (row, col) = ((cell / width) as isize, (cell % width) as isize);
            let (x, y) = (col as i64, -(row as i64));
            // neighbour offset and the edge on that side, counter-clockwise
            let sides = [
                ((1, 0), [x, y - 1], [x + 1, y - 1]),
                ((0, 1), [x + 1, y - 1], [x + 1, y]),
                ((-1, 0), [x + 1, y], [x, y]),
                ((0, -1), [x, y], [x, y - 1]),
            ];
            for ((dr, dc), from, to) in sides {
                let (nr, nc) = (row + dr, col + dc);
                if mask.get_or_background(nr, nc) != label {
                    edges.push((from, to));
                    continue;
                }
                let neighbour = nr as usize * width + nc as usize;
                if !seen[neighbour] {
                    seen[neighbour] = true;
                    queue.push_back(neighbour);
                }
            }
        }
        out.push(Region { label, edges });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureClass;
    use approx::assert_relative_eq;
    use geo::{Area, BoundingRect};

    fn extractor(size: f64, border: f64, clip_border: bool) -> Extractor {
        Extractor::new(
            TileGeometry::new(size, border, 1.0, clip_border).unwrap(),
            ClassMap::default(),
        )
        .unwrap()
    }

    fn square_mask(n: usize, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>, label: u8) -> Mask {
        Mask::from_fn(n, n, |r, c| if rows.contains(&r) && cols.contains(&c) { label } else { 0 })
    }

    #[test]
    fn test_empty_mask_yields_nothing() {
        let features = extractor(10.0, 0.0, false)
            .extract(&Mask::from_fn(10, 10, |_, _| 0), Coordinate::new(0, 10))
            .unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn test_square_is_georeferenced() {
        let mask = square_mask(10, 2..5, 7..10, 1);
        let features = extractor(10.0, 0.0, false)
            .extract(&mask, Coordinate::new(100, 200))
            .unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].class, FeatureClass::Building);
        assert_relative_eq!(features[0].area(), 9.0);
        let rect = features[0].geometry.bounding_rect().unwrap();
        assert_relative_eq!(rect.min().x, 107.0);
        assert_relative_eq!(rect.max().x, 110.0);
        assert_relative_eq!(rect.min().y, 195.0);
        assert_relative_eq!(rect.max().y, 198.0);
        assert_eq!(features[0].polygons()[0].exterior().0.len(), 5);
    }

    #[test]
    fn test_labels_and_holes() {
        // building ring around a structure cell, plus a separate structure
        let mask = Mask::from_fn(6, 6, |r, c| match (r, c) {
            (1..=3, 1..=3) if (r, c) == (2, 2) => 2,
            (1..=3, 1..=3) => 1,
            (5, 5) => 2,
            _ => 0,
        });
        let mut features = extractor(6.0, 0.0, false)
            .extract(&mask, Coordinate::new(0, 6))
            .unwrap();
        features.sort_by(|a, b| a.area().total_cmp(&b.area()));
        assert_eq!(features.len(), 3);
        assert!(features[..2].iter().all(|f| f.class == FeatureClass::Structure));
        let building = &features[2];
        assert_eq!(building.class, FeatureClass::Building);
        assert_eq!(building.polygons()[0].interiors().len(), 1);
        assert_relative_eq!(building.geometry.unsigned_area(), 8.0);
    }

    #[test]
    fn test_diagonal_cells_are_separate() {
        let mask = Mask::from_fn(4, 4, |r, c| u8::from((r, c) == (1, 1) || (r, c) == (2, 2)));
        let features = extractor(4.0, 0.0, false)
            .extract(&mask, Coordinate::new(0, 4))
            .unwrap();
        assert_eq!(features.len(), 2);
    }

    #[test]
    fn test_border_is_cropped() {
        // 2-cell border around an 8-cell tile; label spills into the border
        let mask = square_mask(12, 0..4, 0..4, 1);
        let features = extractor(8.0, 2.0, true)
            .extract(&mask, Coordinate::new(0, 8))
            .unwrap();
        assert_eq!(features.len(), 1);
        assert_relative_eq!(features[0].area(), 4.0);
        let rect = features[0].geometry.bounding_rect().unwrap();
        assert_relative_eq!(rect.min().x, 0.0);
        assert_relative_eq!(rect.max().y, 8.0);
    }

    #[test]
    fn test_resolution_override() {
        let mask = square_mask(10, 0..2, 0..2, 1);
        let err = extractor(10.0, 0.0, false)
            .extract_with_resolution(&mask, Coordinate::new(0, 10), Some(0.5))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));

        let extractor = Extractor::new(TileGeometry::new(5.0, 0.0, 1.0, false).unwrap(), ClassMap::default()).unwrap();
        let features = extractor
            .extract_with_resolution(&mask, Coordinate::new(0, 5), Some(0.5))
            .unwrap();
        assert_relative_eq!(features[0].area(), 1.0);
    }

    #[test]
    fn test_unusable_resolution_is_configuration_error() {
        let mask = square_mask(10, 0..2, 0..2, 1);
        let extractor = extractor(10.0, 0.0, false);
        for resolution in [0.3, 0.0] {
            let err = extractor
                .extract_with_resolution(&mask, Coordinate::new(0, 10), Some(resolution))
                .unwrap_err();
            assert!(matches!(err, PipelineError::Configuration(_)), "{resolution}: {err}");
        }
    }

    #[test]
    fn test_tile_sized_mask_with_border_enabled() {
        // border configured but the mask covers the tile only
        let mask = square_mask(10, 0..3, 0..3, 1);
        let features = extractor(10.0, 2.0, true)
            .extract(&mask, Coordinate::new(50, 100))
            .unwrap();
        assert_eq!(features.len(), 1);
        assert_relative_eq!(features[0].area(), 9.0);
        let rect = features[0].geometry.bounding_rect().unwrap();
        assert_relative_eq!(rect.min().x, 50.0);
        assert_relative_eq!(rect.max().x, 53.0);
        assert_relative_eq!(rect.min().y, 97.0);
        assert_relative_eq!(rect.max().y, 100.0);
    }

    #[test]
    fn test_unknown_label_is_configuration_error() {
        let mask = square_mask(4, 0..1, 0..1, 7);
        assert!(matches!(
            extractor(4.0, 0.0, false).extract(&mask, Coordinate::new(0, 4)),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let mask = Mask::from_fn(5, 4, |_, _| 1);
        assert!(extractor(4.0, 0.0, false)
            .extract(&mask, Coordinate::new(0, 4))
            .is_err());
    }
}
