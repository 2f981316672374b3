//! Dataspace descriptors: scalar or simple N-dimensional shapes with optional
//! maximum extents.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// Maximum-extent marker for a dimension that may grow without bound.
pub const UNLIMITED: u64 = u64::MAX;

/// Type of dataspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataspaceType {
    /// Single element.
    Scalar,
    /// N-dimensional array.
    Simple,
}

/// Shape of a dataset or attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    /// The type of this dataspace.
    pub space_type: DataspaceType,
    /// Current dimension sizes.
    pub dimensions: Vec<u64>,
    /// Maximum dimension sizes, if present. [`UNLIMITED`] means unbounded.
    pub max_dimensions: Option<Vec<u64>>,
}

fn ensure_len(data: &[u8], offset: usize, needed: usize) -> Result<(), FormatError> {
    if offset + needed > data.len() {
        Err(FormatError::UnexpectedEof {
            expected: offset + needed,
            available: data.len(),
        })
    } else {
        Ok(())
    }
}

impl Dataspace {
    /// A single-element dataspace.
    pub fn scalar() -> Self {
        Dataspace {
            space_type: DataspaceType::Scalar,
            dimensions: Vec::new(),
            max_dimensions: None,
        }
    }

    /// A fixed-size simple dataspace.
    pub fn simple(dims: &[u64]) -> Self {
        Dataspace {
            space_type: DataspaceType::Simple,
            dimensions: dims.to_vec(),
            max_dimensions: None,
        }
    }

    /// A simple dataspace whose extent may change up to `max`.
    pub fn simple_with_max(dims: &[u64], max: &[u64]) -> Self {
        Dataspace {
            space_type: DataspaceType::Simple,
            dimensions: dims.to_vec(),
            max_dimensions: Some(max.to_vec()),
        }
    }

    /// Number of dimensions (0 for scalar).
    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Total number of elements. Scalar = 1.
    pub fn num_elements(&self) -> u64 {
        match self.space_type {
            DataspaceType::Scalar => 1,
            DataspaceType::Simple => self.dimensions.iter().product(),
        }
    }

    /// Maximum extents, defaulting to the current dimensions.
    pub fn max_or_current(&self) -> &[u64] {
        self.max_dimensions.as_deref().unwrap_or(&self.dimensions)
    }

    /// Whether any dimension has an unlimited maximum.
    pub fn has_unlimited(&self) -> bool {
        self.max_dimensions
            .as_ref()
            .is_some_and(|m| m.contains(&UNLIMITED))
    }

    /// Parse a dataspace message (version 2, 8-byte lengths).
    ///
    /// Returns `(Dataspace, bytes_consumed)`.
    pub fn parse(data: &[u8]) -> Result<(Dataspace, usize), FormatError> {
        ensure_len(data, 0, 4)?;
        let version = data[0];
        if version != 2 {
            return Err(FormatError::InvalidDataspaceVersion(version));
        }
        let rank = data[1] as usize;
        let flags = data[2];
        let space_type = match data[3] {
            0 => DataspaceType::Scalar,
            1 => DataspaceType::Simple,
            other => return Err(FormatError::InvalidDataspaceType(other)),
        };

        let mut pos = 4;
        let mut read_dims = |pos: &mut usize| -> Result<Vec<u64>, FormatError> {
            ensure_len(data, *pos, rank * 8)?;
            let dims = (0..rank)
                .map(|i| LittleEndian::read_u64(&data[*pos + i * 8..*pos + i * 8 + 8]))
                .collect();
            *pos += rank * 8;
            Ok(dims)
        };

        let dimensions = read_dims(&mut pos)?;
        let max_dimensions = if flags & 0x01 != 0 {
            Some(read_dims(&mut pos)?)
        } else {
            None
        };

        Ok((
            Dataspace {
                space_type,
                dimensions,
                max_dimensions,
            },
            pos,
        ))
    }

    /// Serialize to message bytes (version 2, 8-byte lengths).
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.rank() * 16);
        buf.push(2);
        buf.push(self.rank() as u8);
        buf.push(if self.max_dimensions.is_some() { 0x01 } else { 0x00 });
        buf.push(match self.space_type {
            DataspaceType::Scalar => 0,
            DataspaceType::Simple => 1,
        });
        for &dim in &self.dimensions {
            buf.extend_from_slice(&dim.to_le_bytes());
        }
        if let Some(ref max_dims) = self.max_dimensions {
            for &md in max_dims {
                buf.extend_from_slice(&md.to_le_bytes());
            }
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_has_one_element() {
        let ds = Dataspace::scalar();
        assert_eq!(ds.rank(), 0);
        assert_eq!(ds.num_elements(), 1);
        let (parsed, consumed) = Dataspace::parse(&ds.serialize()).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(parsed, ds);
    }

    #[test]
    fn simple_2d_elements() {
        let ds = Dataspace::simple(&[3, 4]);
        assert_eq!(ds.num_elements(), 12);
        assert_eq!(ds.max_or_current(), &[3, 4]);
        assert!(!ds.has_unlimited());
    }

    #[test]
    fn zero_extent_is_empty() {
        assert_eq!(Dataspace::simple(&[0]).num_elements(), 0);
    }

    #[test]
    fn unlimited_max_is_kept() {
        let ds = Dataspace::simple_with_max(&[10], &[UNLIMITED]);
        let bytes = ds.serialize();
        assert_eq!(bytes[2], 0x01);
        let (parsed, consumed) = Dataspace::parse(&bytes).unwrap();
        assert_eq!(consumed, 20);
        assert!(parsed.has_unlimited());
        assert_eq!(parsed.max_dimensions, Some(vec![UNLIMITED]));
    }

    #[test]
    fn error_bad_version() {
        assert!(matches!(
            Dataspace::parse(&[1, 0, 0, 0]),
            Err(FormatError::InvalidDataspaceVersion(1))
        ));
    }

    #[test]
    fn error_bad_type() {
        assert!(matches!(
            Dataspace::parse(&[2, 0, 0, 9]),
            Err(FormatError::InvalidDataspaceType(9))
        ));
    }

    #[test]
    fn error_truncated_dims() {
        let bytes = Dataspace::simple(&[5, 6]).serialize();
        assert!(matches!(
            Dataspace::parse(&bytes[..12]),
            Err(FormatError::UnexpectedEof { .. })
        ));
    }
}
