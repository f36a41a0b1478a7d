//! Fixed-dimension feature vectors used for training and testing.
//!
//! Each vector is one client's page-request pattern: component `j` is 1.0
//! when page `j` was requested and 0.0 otherwise.
//!
//! # Text format
//!
//! ```text
//! # comment lines and blank lines are skipped
//! 1 0 0 1
//! 0,1,1,0
//! ```

use std::io::BufRead;
use std::ops::Index;
use std::path::Path;

use crate::error::{ClusterError, ClusterResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    vectors: Vec<Vec<f32>>,
    dim: usize,
}

impl Dataset {
    /// Build a dataset, rejecting empty input, ragged rows and components
    /// outside [0, 1] (including NaN and infinities).
    pub fn new(vectors: Vec<Vec<f32>>) -> ClusterResult<Self> {
        let dim = vectors.first().map(Vec::len).ok_or(ClusterError::EmptyDataset)?;
        if dim == 0 {
            return Err(ClusterError::EmptyDataset);
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(ClusterError::DimensionMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }
        for (row, vector) in vectors.iter().enumerate() {
            if let Some(column) = vector.iter().position(|v| !is_indicator(*v)) {
                return Err(ClusterError::InvalidComponent {
                    row,
                    column,
                    value: vector[column],
                });
            }
        }
        Ok(Self { vectors, dim })
    }

    /// Parse the text format from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> ClusterResult<Self> {
        let mut vectors: Vec<Vec<f32>> = Vec::new();
        let mut dim: Option<usize> = None;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let row = trimmed
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|tok| !tok.is_empty())
                .map(|tok| {
                    let value = tok.parse::<f32>().map_err(|e| ClusterError::Parse {
                        line: line_no,
                        reason: format!("invalid component '{tok}': {e}"),
                    })?;
                    if !is_indicator(value) {
                        return Err(ClusterError::Parse {
                            line: line_no,
                            reason: format!("component '{tok}' is outside [0, 1]"),
                        });
                    }
                    Ok(value)
                })
                .collect::<ClusterResult<Vec<f32>>>()?;

            match dim {
                None => dim = Some(row.len()),
                Some(expected) if expected != row.len() => {
                    return Err(ClusterError::Parse {
                        line: line_no,
                        reason: format!("expected {expected} components, found {}", row.len()),
                    });
                }
                Some(_) => {}
            }
            vectors.push(row);
        }

        tracing::debug!(target: "dataset", "parsed {} vectors", vectors.len());
        Self::new(vectors)
    }

    /// Load a dataset file in the text format.
    pub fn load(path: impl AsRef<Path>) -> ClusterResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let dataset = Self::from_reader(std::io::BufReader::new(file))?;
        tracing::info!(
            target: "dataset",
            "loaded {} vectors of dimension {} from {}",
            dataset.len(),
            dataset.dim(),
            path.as_ref().display()
        );
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Always false for a constructed dataset; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, index: usize) -> Option<&[f32]> {
        self.vectors.get(index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[f32]> + '_ {
        self.vectors.iter().map(Vec::as_slice)
    }
}

impl Index<usize> for Dataset {
    type Output = [f32];

    fn index(&self, index: usize) -> &[f32] {
        &self.vectors[index]
    }
}

/// Finite and within the request-indicator range; NaN fails both comparisons.
fn is_indicator(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}
