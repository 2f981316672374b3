//! Container runtime for h5store.
//!
//! A hierarchical binary container of groups, datasets and attributes,
//! reached through integer handles. Datatypes and dataspaces follow the
//! HDF5 message encodings; the file image is an append-friendly layout with
//! a checksummed superblock and metadata block.

pub mod checksum;
pub mod container;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod image;
pub mod property_list;
pub mod selection;
pub mod vl;

mod node;

pub use container::{Container, Hid, SlotKind};
pub use dataspace::{Dataspace, DataspaceType, UNLIMITED};
pub use datatype::{CharacterSet, CompoundMember, Datatype, DatatypeByteOrder, StringPadding};
pub use error::FormatError;
pub use property_list::DatasetCreateProps;
pub use selection::Selection;
