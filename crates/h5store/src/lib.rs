//! Persist typed objects and streaming records into a typed container.
//!
//! Objects are mapped member by member onto attributes, datasets and nested
//! groups; streaming records go into growable chunked datasets that are
//! extended in place.
//!
//! # Objects
//!
//! ```no_run
//! use h5store::{H5File, H5Object, Settings};
//!
//! #[derive(Default, H5Object)]
//! struct Calibration {
//!     gain: f64,
//!     #[h5(name = "Label")]
//!     label: String,
//!     #[h5(write_only)]
//!     written_by: String,
//!     #[h5(skip)]
//!     scratch: Vec<u8>,
//! }
//!
//! let h5 = H5File::create("session.h5s", Settings::default()).unwrap();
//! let cal = Calibration { gain: 1.5, label: "left".into(), ..Default::default() };
//! h5.write_object("/sensors/left", &cal).unwrap();
//! let back: Calibration = h5.read_object("/sensors/left").unwrap();
//! assert_eq!(back.gain, 1.5);
//! ```
//!
//! # Records
//!
//! ```no_run
//! use h5store::{H5File, H5Record, Settings};
//!
//! #[derive(Debug, Clone, Default, H5Record)]
//! struct Sample {
//!     index: u64,
//!     value: f32,
//!     #[h5(len = 16)]
//!     tag: String,
//! }
//!
//! let h5 = H5File::create("stream.h5s", Settings::default()).unwrap();
//! let mut store = h5.append_store::<Sample>("/stream", "samples").unwrap();
//! store.append_batch(&[Sample::default(), Sample::default()]).unwrap();
//! store.dispose().unwrap();
//! ```

extern crate self as h5store;

pub mod chunked;
pub mod codec;
pub mod error;
pub mod file;
pub mod groups;
pub mod handle;
pub mod layout;
pub mod mapper;
pub mod naming;
pub mod record;
pub mod settings;
pub mod structure;

pub use chunked::{chunk_size_for, ChunkedAppendStore, StoreState};
pub use codec::{AttributeCodec, AttributeSlots, DatasetCodec, DatasetSlots, SlotAccess, SlotCodec};
pub use error::{Error, Result};
pub use file::{
    read_attribute_by_path, read_attributes_by_path, write_attribute_by_path,
    write_attributes_by_path, H5File,
};
pub use handle::HandleGuard;
pub use layout::{layout_of, Descriptor, H5Scalar, SemanticType};
pub use mapper::{
    read_object, read_object_into, write_object, Direction, H5Object, H5Value, MemberDescriptor,
    MemberPolicy, ObjectReader, ObjectWriter, Storage,
};
pub use record::{FieldShape, H5Record, RecordDecoder, RecordEncoder, RecordField, RecordLayout};
pub use settings::{Charset, DateTimeEncoding, Outcome, Padding, Settings};
pub use structure::{AttrValue, AttributeEntry, Element, ElementKind};

pub use h5store_derive::{H5Object, H5Record};

pub use h5store_format::{Container, Hid, SlotKind};
