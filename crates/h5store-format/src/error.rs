//! Error types for the container runtime.

/// Errors raised by the container runtime and its binary encodings.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The container signature was not found at the start of the file.
    #[error("container signature not found")]
    SignatureNotFound,

    /// The superblock version is not supported.
    #[error("unsupported superblock version: {0}")]
    UnsupportedVersion(u8),

    /// Unexpected end of data.
    #[error("unexpected EOF: need {expected} bytes, have {available}")]
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },

    /// Jenkins lookup3 checksum mismatch.
    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// The checksum stored in the file.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },

    /// Unknown datatype class.
    #[error("invalid datatype class: {0}")]
    InvalidDatatypeClass(u8),

    /// Unsupported datatype version for a class.
    #[error("invalid datatype version {version} for class {class}")]
    InvalidDatatypeVersion { class: u8, version: u8 },

    /// Invalid string padding value.
    #[error("invalid string padding: {0}")]
    InvalidStringPadding(u8),

    /// Invalid character set value.
    #[error("invalid character set: {0}")]
    InvalidCharacterSet(u8),

    /// Invalid dataspace type byte.
    #[error("invalid dataspace type: {0}")]
    InvalidDataspaceType(u8),

    /// Invalid dataspace version.
    #[error("invalid dataspace version: {0}")]
    InvalidDataspaceVersion(u8),

    /// Unknown node tag in the metadata block.
    #[error("invalid node tag in metadata: {0}")]
    InvalidNodeTag(u8),

    /// The handle was never issued or has already been closed.
    #[error("invalid handle: {0}")]
    InvalidHandle(u64),

    /// The handle refers to a different kind of object.
    #[error("handle {handle} is not a {expected}")]
    WrongHandleKind {
        handle: u64,
        expected: &'static str,
    },

    /// No slot exists at the given path.
    #[error("not found: {0}")]
    NotFound(String),

    /// A slot already exists at the given path.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Slot names must be non-empty, at most 65535 bytes, and must not
    /// contain `/`.
    #[error("invalid slot name: {0:?}")]
    InvalidName(String),

    /// The container was opened read-only.
    #[error("container is read-only")]
    ReadOnly,

    /// A raw buffer does not match the size implied by datatype and selection.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A variable-length buffer holds a different number of elements.
    #[error("element count mismatch: expected {expected}, got {actual}")]
    ElementCountMismatch { expected: u64, actual: u64 },

    /// The dataset cannot grow (contiguous layout or maximum extent reached).
    #[error("dataset `{name}` cannot be extended to {requested:?} (max {max:?})")]
    NotExtendable {
        name: String,
        requested: Vec<u64>,
        max: Vec<u64>,
    },

    /// Unlimited maximum dimensions were requested without chunked storage.
    #[error("unlimited dimensions require chunked storage")]
    UnlimitedRequiresChunking,

    /// Dimensions and maximum extents that disagree in rank or size.
    #[error("invalid extent: {0}")]
    InvalidExtent(String),

    /// Variable-length data was given a chunked layout.
    #[error("variable-length data requires contiguous storage")]
    VariableLengthChunking,

    /// Chunk dimensions that do not span whole rows of the trailing dimensions.
    #[error("unsupported chunk shape {chunk:?} for dataspace {dims:?}")]
    UnsupportedChunkShape { chunk: Vec<u64>, dims: Vec<u64> },

    /// The selection lies outside the dataspace or is not a whole-row slab.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// Partial I/O on a variable-length slot.
    #[error("variable-length data cannot be accessed through a hyperslab")]
    VariableLengthSelection,

    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
