//! Tile addressing.
//!
//! A tile is a square cell of the processing grid, addressed by the integer
//! coordinate of its top-left (north-west) corner in the working reference
//! system. [`bounding_box_of`] is the only place where the optional border
//! margin is materialized; the mask source and the geotransform both go
//! through it so extracted geometry lines up with the true grid.

use crate::{Result, TileError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-left corner of a tile in the working reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    /// Easting of the west edge.
    pub x: i64,
    /// Northing of the north edge.
    pub y: i64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Storage key of this tile, `"{x}_{y}"`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.x, self.y)
    }

    /// Parse a storage key produced by [`Coordinate::key`].
    ///
    /// Only the canonical form is accepted: `"+5_3"` or `"05_3"` are rejected
    /// so that every tile has exactly one key.
    pub fn from_key(key: &str) -> Result<Self> {
        let invalid = || TileError::InvalidTileKey(key.to_string());
        let (x, y) = key.split_once('_').ok_or_else(invalid)?;
        let coord = Coordinate {
            x: x.parse().map_err(|_| invalid())?,
            y: y.parse().map_err(|_| invalid())?,
        };
        if coord.key() != key {
            return Err(invalid());
        }
        Ok(coord)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.x, self.y)
    }
}

impl FromStr for Coordinate {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_key(s)
    }
}

/// Axis-aligned box `(x1, y1, x2, y2)` with `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// West edge.
    pub x1: f64,
    /// South edge.
    pub y1: f64,
    /// East edge.
    pub x2: f64,
    /// North edge.
    pub y2: f64,
}

impl BoundingBox {
    /// Create a bounding box, checking the ordering invariant.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        // NaN fails both comparisons as well
        if !(x1 < x2 && y1 < y2) {
            return Err(TileError::InvalidBoundingBox { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Width in metres.
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    /// Height in metres.
    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Smallest box covering both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }
}

impl FromStr for BoundingBox {
    type Err = TileError;

    /// Parse `"x1,y1,x2,y2"`.
    fn from_str(s: &str) -> Result<Self> {
        let values: Vec<f64> = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| TileError::InvalidGeometry(format!("cannot parse bounding box {s:?}")))?;
        match values.as_slice() {
            [x1, y1, x2, y2] => BoundingBox::new(*x1, *y1, *x2, *y2),
            _ => Err(TileError::InvalidGeometry(format!(
                "bounding box needs 4 values, got {}",
                values.len()
            ))),
        }
    }
}

/// Bounding box of the tile whose top-left corner is `coord`.
///
/// Without `clip_border` this is `(x, y - size, x + size, y)`. With it, the
/// box grows by `border` metres on every side.
pub fn bounding_box_of(
    coord: Coordinate,
    tile_size_m: f64,
    border_m: f64,
    clip_border: bool,
) -> BoundingBox {
    let x = coord.x as f64;
    let y = coord.y as f64;
    if clip_border {
        BoundingBox {
            x1: x - border_m,
            y1: y - tile_size_m - border_m,
            x2: x + tile_size_m + border_m,
            y2: y + border_m,
        }
    } else {
        BoundingBox {
            x1: x,
            y1: y - tile_size_m,
            x2: x + tile_size_m,
            y2: y,
        }
    }
}

/// Fixed size, border and resolution of the processing grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileGeometry {
    /// Tile edge length in metres.
    pub size_m: f64,
    /// Border margin in metres, used only when `clip_border` is set.
    #[serde(default)]
    pub border_m: f64,
    /// Cell size in metres.
    pub resolution_m: f64,
    /// Whether masks cover the tile plus its border.
    #[serde(default)]
    pub clip_border: bool,
}

impl TileGeometry {
    /// Create a tile geometry and validate it.
    pub fn new(size_m: f64, border_m: f64, resolution_m: f64, clip_border: bool) -> Result<Self> {
        let geometry = Self {
            size_m,
            border_m,
            resolution_m,
            clip_border,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Check that size and border are positive whole multiples of the resolution.
    pub fn validate(&self) -> Result<()> {
        if !(self.resolution_m > 0.0) || !self.resolution_m.is_finite() {
            return Err(TileError::InvalidGeometry(format!(
                "resolution must be positive, got {}",
                self.resolution_m
            )));
        }
        if !(self.size_m > 0.0) {
            return Err(TileError::InvalidGeometry(format!(
                "tile size must be positive, got {}",
                self.size_m
            )));
        }
        if !(self.border_m >= 0.0) {
            return Err(TileError::InvalidGeometry(format!(
                "border must not be negative, got {}",
                self.border_m
            )));
        }
        whole_cells(self.size_m, self.resolution_m)?;
        whole_cells(self.border_m, self.resolution_m)?;
        Ok(())
    }

    /// Same grid at a different cell size.
    pub fn with_resolution(&self, resolution_m: f64) -> Result<Self> {
        Self::new(self.size_m, self.border_m, resolution_m, self.clip_border)
    }

    /// Number of cells along one tile edge, border excluded.
    pub fn tile_cells(&self) -> usize {
        (self.size_m / self.resolution_m).round() as usize
    }

    /// Number of border cells on each side (0 without `clip_border`).
    pub fn border_cells(&self) -> usize {
        if self.clip_border {
            (self.border_m / self.resolution_m).round() as usize
        } else {
            0
        }
    }

    /// Edge length in cells of a mask fetched for this grid.
    pub fn mask_cells(&self) -> usize {
        self.tile_cells() + 2 * self.border_cells()
    }

    /// Bounding box of a tile, border included when enabled.
    pub fn bounding_box(&self, coord: Coordinate) -> BoundingBox {
        bounding_box_of(coord, self.size_m, self.border_m, self.clip_border)
    }

    /// Extent covered by a set of tiles, borders excluded.
    pub fn extent<'a, I>(&self, coords: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        coords
            .into_iter()
            .map(|c| bounding_box_of(*c, self.size_m, 0.0, false))
            .reduce(|a, b| a.union(&b))
    }
}

fn whole_cells(length_m: f64, resolution_m: f64) -> Result<usize> {
    let cells = length_m / resolution_m;
    if (cells - cells.round()).abs() > 1e-6 {
        return Err(TileError::InvalidGeometry(format!(
            "{length_m} m is not a whole number of {resolution_m} m cells"
        )));
    }
    Ok(cells.round() as usize)
}

/// North-up affine transform from cell indices to map coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// Easting of the west edge of column 0.
    pub west: f64,
    /// Northing of the north edge of row 0.
    pub north: f64,
    /// Cell size in metres.
    pub resolution: f64,
}

impl GeoTransform {
    /// Transform with the given top-left corner and square cells.
    pub fn from_origin(west: f64, north: f64, resolution: f64) -> Self {
        Self {
            west,
            north,
            resolution,
        }
    }

    /// Transform for a mask fetched for `coord`, border included when enabled.
    pub fn for_tile(coord: Coordinate, geometry: &TileGeometry) -> Self {
        let bbox = geometry.bounding_box(coord);
        Self::from_origin(bbox.x1, bbox.y2, geometry.resolution_m)
    }

    /// Map coordinates of the top-left corner of cell `(row, col)`.
    ///
    /// `row` and `col` may equal the mask height/width to address the far
    /// edges of the last cells.
    pub fn corner(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.west + col as f64 * self.resolution,
            self.north - row as f64 * self.resolution,
        )
    }

    /// Transform for the window starting `cells` rows and columns inside this one.
    pub fn inset(&self, cells: usize) -> Self {
        let (west, north) = self.corner(cells, cells);
        Self::from_origin(west, north, self.resolution)
    }
}
