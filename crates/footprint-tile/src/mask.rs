//! Per-tile classification raster.

use crate::{Result, TileError};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};

/// A classification mask: one label per cell, row-major from the north-west
/// corner. Label 0 is background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    /// Labels in row-major order (north to south, west to east).
    data: Vec<u8>,
    /// Width in cells.
    width: usize,
    /// Height in cells.
    height: usize,
}

impl Mask {
    /// Create a mask from a row-major label buffer.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        if data.len() != width * height {
            return Err(TileError::MaskShape(format!(
                "{} labels for a {}x{} mask",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Create a mask by evaluating `f(row, col)` for every cell.
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                data.push(f(row, col));
            }
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Load a single-band label raster from a TIFF file.
    ///
    /// 8-bit and 16-bit unsigned samples are accepted; 16-bit labels must fit
    /// in a byte.
    pub fn from_tiff<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let mut decoder = Decoder::new(file)?;

        // Masks for large tiles with border easily exceed the default limits
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 256 * 1024 * 1024;
        limits.intermediate_buffer_size = 256 * 1024 * 1024;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let data = match decoder.read_image()? {
            DecodingResult::U8(data) => data,
            DecodingResult::U16(data) => data
                .into_iter()
                .map(|v| {
                    u8::try_from(v).map_err(|_| {
                        TileError::UnsupportedDataType(format!("label {v} does not fit in 8 bits"))
                    })
                })
                .collect::<Result<Vec<u8>>>()?,
            other => {
                return Err(TileError::UnsupportedDataType(sample_type_name(&other).to_string()))
            }
        };

        Self::new(width as usize, height as usize, data)
    }

    /// Width in cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in cells.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Label at `(row, col)`.
    ///
    /// # Panics
    /// Panics if the cell is outside the mask.
    pub fn get(&self, row: usize, col: usize) -> u8 {
        assert!(row < self.height && col < self.width, "cell ({row}, {col}) outside mask");
        self.data[row * self.width + col]
    }

    /// Label at `(row, col)`, or 0 outside the mask.
    pub fn get_or_background(&self, row: isize, col: isize) -> u8 {
        if row < 0 || col < 0 || row as usize >= self.height || col as usize >= self.width {
            0
        } else {
            self.data[row as usize * self.width + col as usize]
        }
    }

    /// True if every cell is background.
    pub fn is_background(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Remove `cells` rows and columns from every side.
    pub fn crop(&self, cells: usize) -> Result<Self> {
        if cells == 0 {
            return Ok(self.clone());
        }
        if 2 * cells >= self.width || 2 * cells >= self.height {
            return Err(TileError::MaskShape(format!(
                "cannot crop {} cells from a {}x{} mask",
                cells, self.width, self.height
            )));
        }
        let width = self.width - 2 * cells;
        let height = self.height - 2 * cells;
        let mut data = Vec::with_capacity(width * height);
        for row in cells..cells + height {
            let start = row * self.width + cells;
            data.extend_from_slice(&self.data[start..start + width]);
        }
        Self::new(width, height, data)
    }

    /// Raw label buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

fn sample_type_name(result: &DecodingResult) -> &'static str {
    match result {
        DecodingResult::U8(_) => "u8",
        DecodingResult::U16(_) => "u16",
        DecodingResult::U32(_) => "u32",
        DecodingResult::U64(_) => "u64",
        DecodingResult::I8(_) => "i8",
        DecodingResult::I16(_) => "i16",
        DecodingResult::I32(_) => "i32",
        DecodingResult::I64(_) => "i64",
        DecodingResult::F32(_) => "f32",
        DecodingResult::F64(_) => "f64",
    }
}
