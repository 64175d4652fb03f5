//! End-to-end tests: masks through extraction, cache, merge and postprocessing.

use approx::assert_relative_eq;
use footprint_tile::{BoundingBox, Coordinate, Mask, MemoryMaskSource, TileGeometry};
use footprint_vector::{
    process_tiles, ClassMap, EmptyMergePolicy, Epsg, Extractor, Feature, FeatureClass, Layer,
    PostprocessConfig, Postprocessor, Region, TileCache, TileState,
};
use geo::{polygon, Area, BooleanOps, Coord};
use std::collections::HashSet;
use tempfile::TempDir;

const EPSG: Epsg = Epsg(25832);

/// 2x2 grid of 10 m tiles at 1 m resolution; every tile holds a 3x3
/// building touching the vertical seam it shares with its row neighbour.
fn grid_source() -> (MemoryMaskSource, Vec<Coordinate>) {
    let mut source = MemoryMaskSource::new();
    let mut coords = Vec::new();
    for y in [20, 10] {
        for x in [0, 10] {
            let cols = if x == 0 { 7..10 } else { 0..3 };
            let mask = Mask::from_fn(10, 10, |r, c| u8::from((3..6).contains(&r) && cols.contains(&c)));
            let coord = Coordinate::new(x, y);
            source.insert(coord, mask);
            coords.push(coord);
        }
    }
    (source, coords)
}

fn setup() -> (TempDir, TileCache, TileGeometry, Vec<Coordinate>) {
    let dir = TempDir::new().unwrap();
    let cache = TileCache::open(dir.path().join("cached_tiles"), EPSG).unwrap();
    let geometry = TileGeometry::new(10.0, 0.0, 1.0, false).unwrap();
    let extractor = Extractor::new(geometry, ClassMap::default()).unwrap();
    let (source, coords) = grid_source();
    let report = process_tiles(&source, &extractor, &cache, &coords).unwrap();
    assert_eq!(report.processed, 4);
    assert_eq!(report.features, 4);
    (dir, cache, geometry, coords)
}

fn postprocessor(cache: TileCache) -> Postprocessor {
    let config = PostprocessConfig {
        sieve_m2: 5.0,
        hole_m2: 1.0,
        simplify_tolerance_m: 0.5,
        empty_merge: EmptyMergePolicy::Error,
    };
    Postprocessor::new(cache, config).unwrap()
}

fn has_vertex_on_seam(feature: &Feature) -> bool {
    feature
        .polygons()
        .iter()
        .flat_map(|p| p.exterior().coords())
        .any(|c: &Coord<f64>| (c.x - 10.0).abs() < 1e-9)
}

#[test]
fn test_row_of_tiles_becomes_one_building() {
    let (_dir, cache, geometry, _) = setup();
    let requested: HashSet<Coordinate> = [Coordinate::new(0, 20), Coordinate::new(10, 20)].into();
    let region = Region::BoundingBox(geometry.extent(&requested).unwrap());

    let layer = postprocessor(cache).run(&requested, &region).unwrap();
    assert_eq!(layer.epsg, EPSG);
    assert_eq!(layer.len(), 1);
    let feature = &layer.features[0];
    assert_eq!(feature.class, FeatureClass::Building);
    assert_relative_eq!(feature.area(), 18.0, epsilon = 1e-9);
    assert_eq!(feature.polygons().len(), 1);
    assert_eq!(feature.polygons()[0].exterior().0.len(), 5);
    assert!(!has_vertex_on_seam(feature));
}

#[test]
fn test_full_grid_yields_one_building_per_row() {
    let (_dir, cache, geometry, coords) = setup();
    let requested: HashSet<Coordinate> = coords.iter().copied().collect();
    let extent = geometry.extent(&requested).unwrap();
    assert_eq!(extent, BoundingBox::new(0.0, 0.0, 20.0, 20.0).unwrap());

    let layer = postprocessor(cache)
        .run(&requested, &Region::BoundingBox(extent))
        .unwrap();
    assert_eq!(layer.len(), 2);
    for feature in &layer.features {
        assert_relative_eq!(feature.area(), 18.0, epsilon = 1e-9);
        assert!(!has_vertex_on_seam(feature));
    }
}

#[test]
fn test_sieve_runs_after_seams_are_dissolved() {
    // each half is 9 m2; a 10 m2 sieve only keeps them once joined
    let (_dir, cache, geometry, _) = setup();
    let requested: HashSet<Coordinate> = [Coordinate::new(0, 10), Coordinate::new(10, 10)].into();
    let config = PostprocessConfig {
        sieve_m2: 10.0,
        ..PostprocessConfig::for_resolution(1.0)
    };
    let layer = Postprocessor::new(cache, config)
        .unwrap()
        .run(&requested, &Region::BoundingBox(geometry.extent(&requested).unwrap()))
        .unwrap();
    assert_eq!(layer.len(), 1);
}

#[test]
fn test_clip_to_boundary_inside_grid() {
    let (_dir, cache, _, coords) = setup();
    let requested: HashSet<Coordinate> = coords.iter().copied().collect();
    // left half of the top building only
    let boundary = geo::MultiPolygon(vec![polygon![
        (x: 0.0, y: 10.0), (x: 9.0, y: 10.0), (x: 9.0, y: 20.0), (x: 0.0, y: 20.0)
    ]]);
    let layer = postprocessor(cache)
        .run(&requested, &Region::Boundary(boundary.clone()))
        .unwrap();
    assert_eq!(layer.len(), 1);
    assert_relative_eq!(layer.features[0].area(), 6.0, epsilon = 1e-9);
    let outside = layer.features[0].geometry.difference(&boundary);
    assert_relative_eq!(outside.unsigned_area(), 0.0, epsilon = 1e-9);
}

#[test]
fn test_empty_request_follows_policy() {
    let (_dir, cache, _, _) = setup();
    let requested: HashSet<Coordinate> = [Coordinate::new(100, 100)].into();
    let region = Region::BoundingBox(BoundingBox::new(100.0, 90.0, 110.0, 100.0).unwrap());

    let err = postprocessor(cache.clone()).run(&requested, &region).unwrap_err();
    assert!(matches!(err, footprint_vector::PipelineError::EmptyMerge { requested: 1 }));

    let lenient = Postprocessor::new(cache, PostprocessConfig::for_resolution(1.0)).unwrap();
    assert!(lenient.run(&requested, &region).unwrap().is_empty());
}

#[test]
fn test_cache_overwrite_keeps_only_last_write() {
    let dir = TempDir::new().unwrap();
    let cache = TileCache::open(dir.path(), EPSG).unwrap();
    let coord = Coordinate::new(-256, -512);
    let first = Feature::new(
        FeatureClass::Building,
        polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0)],
    );
    let second = Feature::new(
        FeatureClass::Structure,
        polygon![(x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 2.0), (x: 1.0, y: 2.0)],
    );

    cache.put(coord, &[first.clone(), first]).unwrap();
    cache.put(coord, std::slice::from_ref(&second)).unwrap();
    assert_eq!(cache.get(coord).unwrap().features, vec![second]);

    cache.put(coord, &[]).unwrap();
    assert!(cache.get(coord).unwrap().is_empty());
    assert_eq!(cache.state(coord), TileState::Empty);
    assert_eq!(cache.tiles().unwrap(), vec![coord]);
    assert_eq!(cache.state(Coordinate::new(0, 0)), TileState::Unprocessed);
}

#[test]
fn test_sieve_is_idempotent() {
    let features: Vec<Feature> = (1..=12)
        .map(|i| {
            let side = i as f64 * 0.5;
            let x = i as f64 * 10.0;
            Feature::new(
                if i % 2 == 0 { FeatureClass::Building } else { FeatureClass::Structure },
                polygon![(x: x, y: 0.0), (x: x + side, y: 0.0), (x: x + side, y: side), (x: x, y: side)],
            )
        })
        .collect();
    let layer = Layer::new(EPSG, features);
    for threshold in [0.0, 1.0, 2.25, 7.0, 100.0] {
        let once = footprint_vector::sieve(layer.clone(), threshold);
        assert!(once.features.iter().all(|f| f.area() >= threshold));
        assert_eq!(
            layer.features.iter().filter(|f| f.area() < threshold).count(),
            layer.len() - once.len()
        );
        assert_eq!(footprint_vector::sieve(once.clone(), threshold), once);
    }
}

#[test]
fn test_adjacent_tiles_simplify_without_sliver() {
    // two classes so the seam is not dissolved; a jagged shared edge
    let left = polygon![
        (x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: 1.0), (x: 5.2, y: 1.0), (x: 5.2, y: 3.0),
        (x: 5.0, y: 3.0), (x: 5.0, y: 6.0), (x: 0.0, y: 6.0)
    ];
    let right = polygon![
        (x: 5.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 6.0), (x: 5.0, y: 6.0), (x: 5.0, y: 3.0),
        (x: 5.2, y: 3.0), (x: 5.2, y: 1.0), (x: 5.0, y: 1.0)
    ];
    let layer = Layer::new(
        EPSG,
        vec![
            Feature::new(FeatureClass::Building, left),
            Feature::new(FeatureClass::Structure, right),
        ],
    );
    let out = footprint_vector::simplify(layer, 0.5).unwrap();
    let (a, b) = (&out.features[0].geometry, &out.features[1].geometry);
    assert_relative_eq!(a.unsigned_area() + b.unsigned_area(), 60.0, epsilon = 1e-9);
    assert_relative_eq!(a.intersection(b).unsigned_area(), 0.0, epsilon = 1e-9);
    assert_relative_eq!(a.unsigned_area(), 30.0, epsilon = 1e-9);
}
