//! Dataset envelope.
//!
//! A [`Dataset`] carries row-major vectors plus optional id, distance and
//! limit columns. Inputs usually borrow the caller's buffers; results built
//! by an index own theirs.

use crate::{IndexError, Result};
use std::borrow::Cow;

/// Vectors and/or per-row columns flowing into and out of an index.
///
/// Invariants, checked on construction:
/// - the vector buffer, when present, holds exactly `rows * dim` values
/// - the id column, when present, holds exactly `rows` values
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<'a> {
    rows: usize,
    dim: usize,
    tensor: Option<Cow<'a, [f32]>>,
    ids: Option<Cow<'a, [i64]>>,
    distances: Option<Vec<f32>>,
    lims: Option<Vec<usize>>,
}

impl<'a> Dataset<'a> {
    /// Wrap `rows` vectors of `dim` values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the buffer length is not `rows * dim`.
    pub fn new(rows: usize, dim: usize, tensor: impl Into<Cow<'a, [f32]>>) -> Result<Self> {
        let tensor = tensor.into();
        if tensor.len() != rows * dim {
            return Err(IndexError::InvalidParameter(format!(
                "tensor holds {} values, expected {} rows x {} dim",
                tensor.len(),
                rows,
                dim
            )));
        }
        Ok(Self {
            rows,
            dim,
            tensor: Some(tensor),
            ids: None,
            distances: None,
            lims: None,
        })
    }

    /// Dataset with no rows, for backends that ignore their input dataset.
    pub fn empty() -> Dataset<'static> {
        Dataset {
            rows: 0,
            dim: 0,
            tensor: None,
            ids: None,
            distances: None,
            lims: None,
        }
    }

    /// Attach an explicit id column.
    pub fn with_ids(mut self, ids: impl Into<Cow<'a, [i64]>>) -> Result<Self> {
        let ids = ids.into();
        if ids.len() != self.rows {
            return Err(IndexError::InvalidParameter(format!(
                "id column holds {} values, expected {}",
                ids.len(),
                self.rows
            )));
        }
        self.ids = Some(ids);
        Ok(self)
    }

    /// Top-k result: `rows` queries of `topk` fixed-width slots.
    pub(crate) fn from_top_k(
        rows: usize,
        topk: usize,
        ids: Vec<i64>,
        distances: Vec<f32>,
    ) -> Dataset<'static> {
        debug_assert_eq!(ids.len(), rows * topk);
        debug_assert_eq!(distances.len(), rows * topk);
        Dataset {
            rows,
            dim: topk,
            tensor: None,
            ids: Some(Cow::Owned(ids)),
            distances: Some(distances),
            lims: None,
        }
    }

    /// Range result envelope; `lims` has `rows + 1` entries.
    pub(crate) fn from_range(
        rows: usize,
        ids: Vec<i64>,
        distances: Vec<f32>,
        lims: Vec<usize>,
    ) -> Dataset<'static> {
        Dataset {
            rows,
            dim: 0,
            tensor: None,
            ids: Some(Cow::Owned(ids)),
            distances: Some(distances),
            lims: Some(lims),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// The row-major vector buffer, if this dataset carries vectors.
    pub fn tensor(&self) -> Option<&[f32]> {
        self.tensor.as_deref()
    }

    pub fn ids(&self) -> Option<&[i64]> {
        self.ids.as_deref()
    }

    pub fn distances(&self) -> Option<&[f32]> {
        self.distances.as_deref()
    }

    pub fn lims(&self) -> Option<&[usize]> {
        self.lims.as_deref()
    }

    /// Vector at `row`, if vectors are present and the row exists.
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let tensor = self.tensor.as_deref()?;
        if row >= self.rows {
            return None;
        }
        Some(&tensor[row * self.dim..(row + 1) * self.dim])
    }

    /// Iterate over vectors (empty if the dataset carries none).
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        let dim = self.dim.max(1);
        self.tensor
            .as_deref()
            .unwrap_or(&[])
            .chunks_exact(dim)
    }

    /// Detach from any borrowed buffers.
    pub fn into_owned(self) -> Dataset<'static> {
        Dataset {
            rows: self.rows,
            dim: self.dim,
            tensor: self.tensor.map(|t| Cow::Owned(t.into_owned())),
            ids: self.ids.map(|i| Cow::Owned(i.into_owned())),
            distances: self.distances,
            lims: self.lims,
        }
    }
}

impl Dataset<'static> {
    /// Build an owned dataset from per-row vectors.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if rows have differing lengths.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let dim = rows.first().map(Vec::len).unwrap_or(0);
        let mut tensor = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(IndexError::InvalidParameter(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            tensor.extend_from_slice(row);
        }
        Dataset::new(rows.len(), dim, tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrowed_dataset() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ds = Dataset::new(2, 3, &data[..]).unwrap();

        assert_eq!(ds.rows(), 2);
        assert_eq!(ds.dim(), 3);
        assert_eq!(ds.row(1).unwrap(), &[4.0, 5.0, 6.0]);
        assert!(ds.row(2).is_none());
        assert!(matches!(ds.tensor, Some(Cow::Borrowed(_))));
        assert_eq!(ds.iter_rows().count(), 2);
    }

    #[test]
    fn test_length_mismatch() {
        let data = [1.0, 2.0, 3.0];
        assert!(matches!(
            Dataset::new(2, 2, &data[..]),
            Err(IndexError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_id_column_length() {
        let data = vec![0.0; 8];
        let ds = Dataset::new(4, 2, data).unwrap();

        assert!(ds.clone().with_ids(vec![1, 2, 3]).is_err());

        let ds = ds.with_ids(vec![10, 11, 12, 13]).unwrap();
        assert_eq!(ds.ids().unwrap(), &[10, 11, 12, 13]);
    }

    #[test]
    fn test_from_rows() {
        let ds = Dataset::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(ds.rows(), 2);
        assert_eq!(ds.tensor().unwrap(), &[1.0, 2.0, 3.0, 4.0]);

        assert!(Dataset::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_empty_dataset() {
        let ds = Dataset::empty();
        assert!(ds.is_empty());
        assert!(ds.tensor().is_none());
        assert_eq!(ds.iter_rows().count(), 0);
    }

    #[test]
    fn test_into_owned_detaches() {
        let owned = {
            let data = vec![1.0f32, 2.0];
            let ids = vec![7i64];
            Dataset::new(1, 2, data.as_slice())
                .unwrap()
                .with_ids(ids.as_slice())
                .unwrap()
                .into_owned()
        };
        assert_eq!(owned.ids().unwrap(), &[7]);
        assert_eq!(owned.row(0).unwrap(), &[1.0, 2.0]);
    }
}
