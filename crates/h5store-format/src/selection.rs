//! Hyperslab selection for partial dataset I/O.
//!
//! A [`Selection`] describes which elements of a dataset to read or write.
//! Only contiguous runs of whole rows along the leading dimension are
//! accepted by the container; [`Selection::row_range`] checks that shape.
//!
//! ```ignore
//! use h5store_format::selection::Selection;
//!
//! // Rows 20..30 of a [100, 4] dataset
//! let sel = Selection::slice(&[20..30, 0..4]);
//! assert_eq!(sel.num_elements(&[100, 4]), 40);
//! ```

use core::ops::Range;

use crate::error::FormatError;

/// A selection describing which elements of a dataset to access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The entire dataspace.
    All,

    /// A contiguous block: `count[d]` elements from `start[d]` in each dimension.
    Hyperslab { start: Vec<u64>, count: Vec<u64> },
}

impl Selection {
    /// Create a contiguous hyperslab from ranges (one per dimension).
    pub fn slice(ranges: &[Range<u64>]) -> Self {
        Selection::Hyperslab {
            start: ranges.iter().map(|r| r.start).collect(),
            count: ranges.iter().map(|r| r.end.saturating_sub(r.start)).collect(),
        }
    }

    /// Select `count` whole rows starting at `start` of a dataspace with `dims`.
    pub fn rows(start: u64, count: u64, dims: &[u64]) -> Self {
        let mut s = vec![0; dims.len()];
        let mut c = dims.to_vec();
        if let (Some(s0), Some(c0)) = (s.first_mut(), c.first_mut()) {
            *s0 = start;
            *c0 = count;
        }
        Selection::Hyperslab { start: s, count: c }
    }

    /// Number of selected elements for a given dataspace shape.
    pub fn num_elements(&self, dims: &[u64]) -> u64 {
        match self {
            Selection::All => dims.iter().product(),
            Selection::Hyperslab { count, .. } => count.iter().product(),
        }
    }

    /// The shape of the selected region.
    pub fn output_shape(&self, dims: &[u64]) -> Vec<u64> {
        match self {
            Selection::All => dims.to_vec(),
            Selection::Hyperslab { count, .. } => count.clone(),
        }
    }

    /// Resolve the selection to a range of leading-dimension rows.
    ///
    /// Fails when the selection falls outside `dims` or does not cover the
    /// full extent of every trailing dimension. A scalar dataspace is a
    /// single row.
    pub fn row_range(&self, dims: &[u64]) -> Result<Range<u64>, FormatError> {
        let rows = dims.first().copied().unwrap_or(1);
        match self {
            Selection::All => Ok(0..rows),
            Selection::Hyperslab { start, count } => {
                if start.len() != dims.len() || count.len() != dims.len() {
                    return Err(FormatError::InvalidSelection(format!(
                        "rank {} does not match dataspace rank {}",
                        start.len(),
                        dims.len()
                    )));
                }
                for d in 0..dims.len() {
                    let end = start[d].checked_add(count[d]).filter(|&end| end <= dims[d]);
                    if end.is_none() {
                        return Err(FormatError::InvalidSelection(format!(
                            "dimension {d}: {} rows from {} exceed extent {}",
                            count[d], start[d], dims[d]
                        )));
                    }
                    if d > 0 && (start[d] != 0 || count[d] != dims[d]) {
                        return Err(FormatError::InvalidSelection(format!(
                            "dimension {d} must be selected in full"
                        )));
                    }
                }
                match (start.first(), count.first()) {
                    (Some(&s), Some(&c)) => Ok(s..s + c),
                    _ => Ok(0..1),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_counts() {
        let sel = Selection::slice(&[2..5, 0..4]);
        assert_eq!(sel.num_elements(&[10, 4]), 12);
        assert_eq!(sel.output_shape(&[10, 4]), vec![3, 4]);
    }

    #[test]
    fn all_covers_everything() {
        assert_eq!(Selection::All.num_elements(&[3, 5]), 15);
        assert_eq!(Selection::All.row_range(&[3, 5]).unwrap(), 0..3);
    }

    #[test]
    fn rows_selects_full_trailing_dims() {
        let sel = Selection::rows(10, 5, &[20, 3]);
        assert_eq!(sel, Selection::slice(&[10..15, 0..3]));
        assert_eq!(sel.row_range(&[20, 3]).unwrap(), 10..15);
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let sel = Selection::slice(&[8..12]);
        assert!(matches!(
            sel.row_range(&[10]),
            Err(FormatError::InvalidSelection(_))
        ));
    }

    #[test]
    fn overflowing_start_is_rejected() {
        let sel = Selection::Hyperslab {
            start: vec![u64::MAX],
            count: vec![2],
        };
        assert!(matches!(
            sel.row_range(&[10]),
            Err(FormatError::InvalidSelection(_))
        ));
    }

    #[test]
    fn partial_trailing_dimension_is_rejected() {
        let sel = Selection::slice(&[0..2, 1..3]);
        assert!(sel.row_range(&[4, 3]).is_err());
    }

    #[test]
    fn rank_mismatch_is_rejected() {
        let sel = Selection::slice(&[0..2]);
        assert!(sel.row_range(&[4, 3]).is_err());
    }

    #[test]
    fn scalar_is_one_row() {
        assert_eq!(Selection::All.row_range(&[]).unwrap(), 0..1);
    }
}
