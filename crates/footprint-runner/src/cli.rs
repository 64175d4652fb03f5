//! Command-line arguments.

use clap::{Parser, Subcommand};
use footprint_tile::{BoundingBox, Coordinate};
use std::path::PathBuf;

fn parse_tile(s: &str) -> Result<Coordinate, String> {
    Coordinate::from_key(s).map_err(|e| e.to_string())
}

fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    s.parse::<BoundingBox>().map_err(|e| e.to_string())
}

#[derive(Debug, Parser)]
#[command(name = "footprint")]
#[command(about = "Extract and postprocess building footprints from classification masks", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the YAML configuration
    #[arg(short, long, global = true, default_value = "footprint.yaml")]
    pub config: PathBuf,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Serve Prometheus metrics on this address
    #[cfg(feature = "prometheus")]
    #[arg(long, global = true)]
    pub metrics_addr: Option<std::net::SocketAddr>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Vectorize mask rasters and store the features in the tile cache
    Extract {
        /// Directory of {x}_{y}.tif masks
        #[arg(long)]
        masks: PathBuf,

        /// Tiles to process as x_y keys (default: every mask in the directory)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, value_parser = parse_tile)]
        tiles: Vec<Coordinate>,
    },

    /// Merge cached tiles, clean, simplify and clip them into one GeoJSON file
    Merge {
        /// Output GeoJSON path
        #[arg(short, long)]
        output: PathBuf,

        /// Clip to x1,y1,x2,y2 (default: extent of the merged tiles)
        #[arg(long, allow_hyphen_values = true, value_parser = parse_bbox, conflicts_with = "boundary")]
        bbox: Option<BoundingBox>,

        /// Clip to the polygons of a GeoJSON file
        #[arg(long)]
        boundary: Option<PathBuf>,

        /// Tiles to merge as x_y keys (default: every processed tile)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, value_parser = parse_tile)]
        tiles: Vec<Coordinate>,
    },

    /// Show the processing state of tiles
    Status {
        /// Tiles to query as x_y keys (default: every processed tile)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, value_parser = parse_tile)]
        tiles: Vec<Coordinate>,
    },
}
