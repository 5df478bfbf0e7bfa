//! Weight and point/label files.
//!
//! Both formats are headerless little-endian:
//!
//! - weights: `param_count` f32 values in parameter-buffer order;
//! - points: one i32 `n`, `3 * n` f32 coordinates (row-major, one point per
//!   row), then `n` f32 labels.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{SirenError, SirenResult};

/// Labelled 3D points, row-major `(n, 3)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<f32>,
    pub labels: Vec<f32>,
}

impl PointCloud {
    /// Pairs `points` (`3 * n` floats) with `labels` (`n` floats).
    pub fn new(points: Vec<f32>, labels: Vec<f32>) -> SirenResult<Self> {
        if points.len() != 3 * labels.len() {
            return Err(SirenError::shape_mismatch(&[labels.len(), 3], &[points.len()]));
        }
        Ok(Self { points, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn point(&self, idx: usize) -> [f32; 3] {
        let p = &self.points[3 * idx..3 * idx + 3];
        [p[0], p[1], p[2]]
    }

    /// Coordinates as `(3, n)`, ready for forward.
    pub fn feature_major(&self) -> Vec<f32> {
        transpose(&self.points, self.len(), 3)
    }
}

/// `(rows, cols)` row-major to `(cols, rows)` row-major.
pub fn transpose(m: &[f32], rows: usize, cols: usize) -> Vec<f32> {
    debug_assert_eq!(m.len(), rows * cols);
    let mut out = vec![0.0; rows * cols];
    for i in 0..rows {
        for j in 0..cols {
            out[j * rows + i] = m[i * cols + j];
        }
    }
    out
}

fn read_f32s<R: Read>(reader: &mut R) -> SirenResult<Vec<f32>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.len() % 4 != 0 {
        return Err(SirenError::malformed(format!(
            "{} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn write_f32s<W: Write>(writer: &mut W, values: &[f32]) -> SirenResult<()> {
    for v in values {
        writer.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Reads every f32 until end of stream.
pub fn read_weights<R: Read>(mut reader: R) -> SirenResult<Vec<f32>> {
    read_f32s(&mut reader)
}

pub fn write_weights<W: Write>(mut writer: W, weights: &[f32]) -> SirenResult<()> {
    write_f32s(&mut writer, weights)?;
    writer.flush()?;
    Ok(())
}

pub fn load_weights<P: AsRef<Path>>(path: P) -> SirenResult<Vec<f32>> {
    read_weights(BufReader::new(File::open(path)?))
}

pub fn save_weights<P: AsRef<Path>>(path: P, weights: &[f32]) -> SirenResult<()> {
    write_weights(BufWriter::new(File::create(path)?), weights)
}

/// Reads the point/label format. Trailing or missing values are errors.
pub fn read_points<R: Read>(mut reader: R) -> SirenResult<PointCloud> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let n = i32::from_le_bytes(header);
    let n = usize::try_from(n)
        .map_err(|_| SirenError::malformed(format!("negative point count {n}")))?;

    let values = read_f32s(&mut reader)?;
    let expected = 4 * n;
    if values.len() != expected {
        return Err(SirenError::malformed(format!(
            "{n} points need {expected} floats after the header, found {}",
            values.len()
        )));
    }
    let mut points = values;
    let labels = points.split_off(3 * n);
    PointCloud::new(points, labels)
}

pub fn write_points<W: Write>(mut writer: W, cloud: &PointCloud) -> SirenResult<()> {
    let n = i32::try_from(cloud.len())
        .map_err(|_| SirenError::overflow(format!("{} points do not fit an i32 header", cloud.len())))?;
    writer.write_all(&n.to_le_bytes())?;
    write_f32s(&mut writer, &cloud.points)?;
    write_f32s(&mut writer, &cloud.labels)?;
    writer.flush()?;
    Ok(())
}

pub fn load_points<P: AsRef<Path>>(path: P) -> SirenResult<PointCloud> {
    let cloud = read_points(BufReader::new(File::open(path)?))?;
    log::debug!("Loaded {} labelled points", cloud.len());
    Ok(cloud)
}

pub fn save_points<P: AsRef<Path>>(path: P, cloud: &PointCloud) -> SirenResult<()> {
    write_points(BufWriter::new(File::create(path)?), cloud)
}
