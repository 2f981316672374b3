//! Dataset creation properties.

/// Dataset creation properties.
///
/// Controls the storage layout of a new dataset. Without chunk dimensions the
/// dataset is stored contiguously and its extent is fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetCreateProps {
    /// Chunk dimensions (enables chunked storage).
    pub chunk_dims: Option<Vec<u64>>,
}

impl DatasetCreateProps {
    /// Create default dataset creation properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set chunk dimensions.
    pub fn chunk(mut self, dims: &[u64]) -> Self {
        self.chunk_dims = Some(dims.to_vec());
        self
    }

    /// Whether chunked storage was requested.
    pub fn is_chunked(&self) -> bool {
        self.chunk_dims.is_some()
    }
}
