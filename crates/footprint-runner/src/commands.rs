//! Command implementations.

use crate::cli::Command;
use crate::config::Config;
use crate::error::Result;
use footprint_tile::{BoundingBox, Coordinate, LocalMaskSource, MaskSource};
use footprint_vector::{
    geojson, process_tiles, BatchReport, Extractor, Layer, Postprocessor, Region, TileCache,
    TileState,
};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where the merged layer is clipped.
#[derive(Debug, Clone)]
pub enum ClipTarget {
    /// Extent of the requested tiles.
    Extent,
    /// Explicit box in map units.
    BoundingBox(BoundingBox),
    /// GeoJSON file with the boundary polygons.
    BoundaryFile(PathBuf),
}

/// Label printed by `status`.
pub fn state_label(state: TileState) -> &'static str {
    match state {
        TileState::Unprocessed => "unprocessed",
        TileState::Empty => "empty",
        TileState::Populated => "populated",
    }
}

fn open_cache(config: &Config) -> Result<TileCache> {
    Ok(TileCache::open(&config.cache_dir, config.epsg)?)
}

/// Extract the masks in `masks_dir` into the cache.
///
/// With an empty `tiles` list every indexed mask is processed.
pub fn extract(config: &Config, masks_dir: &Path, tiles: &[Coordinate]) -> Result<BatchReport> {
    let source = LocalMaskSource::from_directory(masks_dir)?;
    info!(dir = %masks_dir.display(), masks = source.tile_count(), "Indexed masks");
    let coords = if tiles.is_empty() {
        source.coordinates()
    } else {
        tiles.to_vec()
    };
    if coords.is_empty() {
        warn!("No tiles to extract");
    }

    let extractor = Extractor::new(config.tile, config.classes.clone())?;
    let cache = open_cache(config)?;
    Ok(process_tiles(&source, &extractor, &cache, &coords)?)
}

/// Merge and postprocess cached tiles, writing the result to `output`.
///
/// With an empty `tiles` list every processed tile is merged.
pub fn merge(
    config: &Config,
    output: &Path,
    target: &ClipTarget,
    tiles: &[Coordinate],
) -> Result<Layer> {
    let cache = open_cache(config)?;
    let requested: HashSet<Coordinate> = if tiles.is_empty() {
        cache.tiles()?.into_iter().collect()
    } else {
        tiles.iter().copied().collect()
    };

    let region = match target {
        ClipTarget::Extent => match config.tile.extent(&requested) {
            Some(extent) => Region::BoundingBox(extent),
            None => Region::Boundary(geo::MultiPolygon::new(Vec::new())),
        },
        ClipTarget::BoundingBox(bbox) => Region::BoundingBox(*bbox),
        ClipTarget::BoundaryFile(path) => Region::Boundary(geojson::read_boundary(path)?),
    };

    let postprocessor = Postprocessor::new(cache, config.postprocess_config())?;
    let layer = postprocessor.run(&requested, &region)?;
    geojson::write_layer(output, &layer)?;
    info!(
        output = %output.display(),
        features = layer.len(),
        area_m2 = layer.total_area(),
        "Wrote merged layer"
    );
    Ok(layer)
}

/// State of the given tiles, or of every processed tile.
pub fn status(config: &Config, tiles: &[Coordinate]) -> Result<Vec<(Coordinate, TileState)>> {
    let cache = open_cache(config)?;
    let coords = if tiles.is_empty() {
        cache.tiles()?
    } else {
        tiles.to_vec()
    };
    Ok(coords.into_iter().map(|c| (c, cache.state(c))).collect())
}

/// Run one parsed command.
pub fn run(config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Extract { masks, tiles } => {
            let report = extract(config, &masks, &tiles)?;
            println!(
                "{} tiles processed, {} empty, {} features",
                report.processed, report.empty, report.features
            );
        }
        Command::Merge {
            output,
            bbox,
            boundary,
            tiles,
        } => {
            let target = match (bbox, boundary) {
                (Some(bbox), _) => ClipTarget::BoundingBox(bbox),
                (None, Some(path)) => ClipTarget::BoundaryFile(path),
                (None, None) => ClipTarget::Extent,
            };
            let layer = merge(config, &output, &target, &tiles)?;
            println!("{} features written to {}", layer.len(), output.display());
        }
        Command::Status { tiles } => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for (coord, state) in status(config, &tiles)? {
                // a closed pipe is not an error for a listing
                if writeln!(out, "{coord}\t{}", state_label(state)).is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}
