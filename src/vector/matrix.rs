//! Dense embedding matrices in `.fbin` / `.hbin` files.
//!
//! # File Format
//!
//! - Header (8 bytes): row count and column count, both `u32` little-endian
//! - Body: `rows * cols` components, row-major, little-endian
//!   (`f32` for `.fbin`, IEEE half for `.hbin`)
//!
//! Files are read through a memory map so large matrices are paged in by the
//! OS instead of being read through a buffer first.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use half::f16;
use memmap2::Mmap;

use crate::vector::types::{Precision, VectorDimension, VectorError};

/// Size of the matrix header in bytes.
const HEADER_SIZE: usize = 8;

/// Row-major matrix of embeddings held in f32.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    dimension: VectorDimension,
    data: Vec<f32>,
}

impl Matrix {
    /// Builds a matrix from equal-length rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, VectorError> {
        let cols = rows.first().map(Vec::len).ok_or_else(|| {
            VectorError::InvalidMatrix("cannot build a matrix from zero rows".to_string())
        })?;
        let dimension = VectorDimension::new(cols)?;
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            dimension.validate_vector(row)?;
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            dimension,
            data,
        })
    }

    /// Number of rows (vectors).
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Row `index` as a slice.
    ///
    /// # Panics
    /// Panics if `index >= rows()`.
    #[must_use]
    pub fn row(&self, index: usize) -> &[f32] {
        let dim = self.dimension.get();
        &self.data[index * dim..(index + 1) * dim]
    }

    /// Iterates over rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.get())
    }
}

/// Picks the component precision from the file extension.
pub fn precision_for_path(path: &Path) -> Result<Precision, VectorError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("fbin") => Ok(Precision::F32),
        Some("hbin") => Ok(Precision::F16),
        other => Err(VectorError::InvalidMatrix(format!(
            "unsupported extension {other:?} for '{}'",
            path.display()
        ))),
    }
}

/// Loads a matrix file, upcasting half-precision data to f32.
pub fn load_matrix(path: impl AsRef<Path>) -> Result<Matrix, VectorError> {
    let path = path.as_ref();
    let precision = precision_for_path(path)?;

    let file = File::open(path)?;
    // SAFETY: the map is read-only and dropped before this function returns.
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < HEADER_SIZE {
        return Err(VectorError::InvalidMatrix(format!(
            "'{}' is too small to contain a header",
            path.display()
        )));
    }
    let rows = u32::from_le_bytes([mmap[0], mmap[1], mmap[2], mmap[3]]) as usize;
    let cols = u32::from_le_bytes([mmap[4], mmap[5], mmap[6], mmap[7]]) as usize;
    let dimension = VectorDimension::new(cols)?;

    let width = precision.bytes_per_component();
    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(width))
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .ok_or_else(|| {
            VectorError::InvalidMatrix(format!(
                "'{}' declares {rows}x{cols}, which exceeds the addressable size",
                path.display()
            ))
        })?;
    if mmap.len() != expected {
        return Err(VectorError::InvalidMatrix(format!(
            "'{}' declares {rows}x{cols} but holds {} bytes (expected {expected})",
            path.display(),
            mmap.len()
        )));
    }

    let body = &mmap[HEADER_SIZE..];
    let data: Vec<f32> = match precision {
        Precision::F32 => body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        Precision::F16 => body
            .chunks_exact(2)
            .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
    };

    Ok(Matrix {
        rows,
        dimension,
        data,
    })
}

/// Writes a matrix, quantizing to f16 when the path ends in `.hbin`.
pub fn save_matrix(path: impl AsRef<Path>, matrix: &Matrix) -> Result<(), VectorError> {
    let path = path.as_ref();
    let precision = precision_for_path(path)?;

    let rows = u32::try_from(matrix.rows)
        .map_err(|_| VectorError::InvalidMatrix(format!("too many rows: {}", matrix.rows)))?;
    let cols = u32::try_from(matrix.dimension.get()).map_err(|_| {
        VectorError::InvalidMatrix(format!("too many columns: {}", matrix.dimension.get()))
    })?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&rows.to_le_bytes())?;
    writer.write_all(&cols.to_le_bytes())?;
    match precision {
        Precision::F32 => {
            for value in &matrix.data {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        Precision::F16 => {
            for value in &matrix.data {
                writer.write_all(&f16::from_f32(*value).to_le_bytes())?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
