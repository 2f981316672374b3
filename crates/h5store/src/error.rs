//! Engine error type.

use h5store_format::FormatError;

/// Errors raised by the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A slot could not be allocated.
    #[error("cannot create {kind} `{name}`: {reason}")]
    Creation {
        name: String,
        kind: &'static str,
        reason: String,
    },

    /// A mandatory read target is absent.
    #[error("slot `{name}` not found{}", fallback_note(.fallback))]
    SlotNotFound {
        name: String,
        fallback: Option<String>,
    },

    /// No layout mapping exists for a semantic type.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// Extending, selecting or writing failed mid-append.
    #[error("append to `{dataset}` failed: {reason}")]
    Append { dataset: String, reason: String },

    /// Two members of one type share an on-disk name and a direction.
    #[error("members `{first}` and `{second}` of `{type_name}` both map to slot `{slot}`")]
    MemberCollision {
        type_name: &'static str,
        first: &'static str,
        second: &'static str,
        slot: String,
    },

    /// Stored layout does not match the requested type.
    #[error("cannot convert `{name}`: {reason}")]
    Conversion { name: String, reason: String },

    /// Settings could not be parsed.
    #[error("invalid settings: {0}")]
    Config(String),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn fallback_note(fallback: &Option<String>) -> String {
    match fallback {
        Some(f) => format!(" (nor fallback `{f}`)"),
        None => String::new(),
    }
}
