//! Typed read/write primitives for attribute and dataset slots.
//!
//! [`SlotCodec`] holds every primitive once; [`SlotAccess`] decides whether
//! the slots it creates and opens are attributes ([`AttributeCodec`]) or
//! datasets ([`DatasetCodec`]).
//!
//! Writes encode the whole value before touching the container, create the
//! slot under the override policy of [`Settings`], and write every element
//! in one call. Reads resolve the primary name, then the fallback name, and
//! either convert every element or fail.

use std::marker::PhantomData;

use h5store_format::{
    vl, CharacterSet, Container, DatasetCreateProps, Dataspace, Datatype, FormatError, Hid,
    SlotKind, StringPadding,
};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::handle::HandleGuard;
use crate::layout::{decode_padded, layout_of, Descriptor, H5Scalar};
use crate::naming::{normalize, resolve};
use crate::settings::{Outcome, Settings};

/// Width of one legacy ASCII cell.
const LEGACY_CELL: usize = 2;

/// How a codec creates, opens and deletes its slots.
pub trait SlotAccess {
    const KIND: SlotKind;
    const LABEL: &'static str;

    fn create(
        container: &Container,
        parent: Hid,
        name: &str,
        datatype: &Datatype,
        dataspace: &Dataspace,
    ) -> std::result::Result<Hid, FormatError>;

    fn open(container: &Container, parent: Hid, name: &str) -> std::result::Result<Hid, FormatError>;

    fn delete(container: &Container, parent: Hid, name: &str) -> std::result::Result<(), FormatError>;
}

/// Slots stored as attributes of a group or dataset.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSlots;

impl SlotAccess for AttributeSlots {
    const KIND: SlotKind = SlotKind::Attribute;
    const LABEL: &'static str = "attribute";

    fn create(
        container: &Container,
        parent: Hid,
        name: &str,
        datatype: &Datatype,
        dataspace: &Dataspace,
    ) -> std::result::Result<Hid, FormatError> {
        container.create_attribute(parent, name, datatype, dataspace)
    }

    fn open(container: &Container, parent: Hid, name: &str) -> std::result::Result<Hid, FormatError> {
        container.open_attribute(parent, name)
    }

    fn delete(container: &Container, parent: Hid, name: &str) -> std::result::Result<(), FormatError> {
        container.delete_attribute(parent, name)
    }
}

/// Slots stored as contiguous datasets of a group.
#[derive(Debug, Clone, Copy)]
pub struct DatasetSlots;

impl SlotAccess for DatasetSlots {
    const KIND: SlotKind = SlotKind::Dataset;
    const LABEL: &'static str = "dataset";

    fn create(
        container: &Container,
        parent: Hid,
        name: &str,
        datatype: &Datatype,
        dataspace: &Dataspace,
    ) -> std::result::Result<Hid, FormatError> {
        container.create_dataset(parent, name, datatype, dataspace, &DatasetCreateProps::new())
    }

    fn open(container: &Container, parent: Hid, name: &str) -> std::result::Result<Hid, FormatError> {
        container.open_dataset(parent, name)
    }

    fn delete(container: &Container, parent: Hid, name: &str) -> std::result::Result<(), FormatError> {
        container.delete_link(parent, name)
    }
}

/// Typed primitives over one kind of slot.
#[derive(Debug)]
pub struct SlotCodec<'a, R> {
    container: &'a Container,
    settings: &'a Settings,
    _slots: PhantomData<R>,
}

impl<R> Clone for SlotCodec<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for SlotCodec<'_, R> {}

/// Primitives over attribute slots.
pub type AttributeCodec<'a> = SlotCodec<'a, AttributeSlots>;

/// Primitives over dataset slots.
pub type DatasetCodec<'a> = SlotCodec<'a, DatasetSlots>;

fn encode_values<T: H5Scalar>(values: &[T], desc: &Descriptor) -> Result<Vec<u8>> {
    if desc.variable_length {
        let payloads = values
            .iter()
            .map(|v| crate::layout::encode(v, desc))
            .collect::<Result<Vec<_>>>()?;
        Ok(vl::encode_elements(&payloads))
    } else {
        let mut out = Vec::with_capacity(values.len() * desc.binary_width);
        for v in values {
            v.encode_into(desc, &mut out)?;
        }
        Ok(out)
    }
}

fn decode_values<T: H5Scalar>(raw: &[u8], desc: &Descriptor) -> Result<Vec<T>> {
    if desc.variable_length {
        vl::decode_elements(raw)?
            .iter()
            .map(|bytes| T::decode_from(bytes, desc))
            .collect()
    } else {
        raw.chunks_exact(desc.binary_width)
            .map(|bytes| T::decode_from(bytes, desc))
            .collect()
    }
}

/// Legacy cells: one character per two-byte cell, row per string.
fn encode_legacy_cells(values: &[String]) -> (usize, Vec<u8>) {
    let max_chars = values.iter().map(|s| s.chars().count()).max().unwrap_or(0).max(1);
    let mut out = Vec::with_capacity(values.len() * max_chars * LEGACY_CELL);
    for s in values {
        let mut written = 0;
        for c in s.chars() {
            out.push(if c.is_ascii() { c as u8 } else { b'?' });
            out.push(0);
            written += 1;
        }
        out.resize(out.len() + (max_chars - written) * LEGACY_CELL, 0);
    }
    (max_chars, out)
}

fn decode_legacy_cells(raw: &[u8], max_chars: usize) -> Vec<String> {
    let row_bytes = max_chars * LEGACY_CELL;
    if row_bytes == 0 {
        return Vec::new();
    }
    raw.chunks_exact(row_bytes)
        .map(|row| {
            row.chunks_exact(LEGACY_CELL)
                .map(|cell| cell[0])
                .take_while(|&b| b != 0)
                .map(char::from)
                .collect()
        })
        .collect()
}

impl<'a, R: SlotAccess> SlotCodec<'a, R> {
    pub fn new(container: &'a Container, settings: &'a Settings) -> Self {
        SlotCodec {
            container,
            settings,
            _slots: PhantomData,
        }
    }

    pub fn container(&self) -> &'a Container {
        self.container
    }

    pub fn settings(&self) -> &'a Settings {
        self.settings
    }

    /// Whether a slot named `name` (normalized) exists under `parent`.
    pub fn exists(&self, parent: Hid, name: &str) -> Result<bool> {
        let name = normalize(name, self.settings);
        Ok(self.container.exists(parent, &name, R::KIND)?)
    }

    /// Remove a slot.
    pub fn delete(&self, parent: Hid, name: &str) -> Result<()> {
        let name = normalize(name, self.settings);
        Ok(R::delete(self.container, parent, &name)?)
    }

    fn creation_error(name: &str, reason: impl ToString) -> Error {
        Error::Creation {
            name: name.to_string(),
            kind: R::LABEL,
            reason: reason.to_string(),
        }
    }

    /// Create a slot, honouring the override policy for existing ones.
    fn create_slot(
        &self,
        parent: Hid,
        name: &str,
        datatype: &Datatype,
        dataspace: &Dataspace,
    ) -> Result<HandleGuard<'a>> {
        let c = self.container;
        if c.exists(parent, name, R::KIND)? {
            debug!(slot = %name, kind = R::LABEL, "slot already exists");
            if !self.settings.override_existing {
                error!(slot = %name, kind = R::LABEL, "slot exists and overriding is disabled");
                return Err(Self::creation_error(name, "already exists"));
            }
            debug!(slot = %name, kind = R::LABEL, "replacing existing slot");
            R::delete(c, parent, name).map_err(|e| Self::creation_error(name, e))?;
        }
        let hid = R::create(c, parent, name, datatype, dataspace).map_err(|e| {
            error!(slot = %name, kind = R::LABEL, error = %e, "cannot create slot");
            Self::creation_error(name, e)
        })?;
        Ok(HandleGuard::new(c, hid))
    }

    fn write_encoded(
        &self,
        parent: Hid,
        name: &str,
        datatype: &Datatype,
        dataspace: &Dataspace,
        bytes: &[u8],
    ) -> Result<()> {
        let name = normalize(name, self.settings);
        let slot = self.create_slot(parent, &name, datatype, dataspace)?;
        if let Err(e) = self.container.write_raw(slot.hid(), None, bytes) {
            error!(slot = %name, kind = R::LABEL, error = %e, "write failed");
            drop(slot);
            // A slot without its data is not left behind.
            let _ = R::delete(self.container, parent, &name);
            return Err(e.into());
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Write a single value into a scalar slot.
    pub fn write_scalar<T: H5Scalar>(&self, parent: Hid, name: &str, value: &T) -> Result<()> {
        let desc = layout_of(T::SEMANTIC, self.settings)?;
        let bytes = encode_values(std::slice::from_ref(value), &desc)?;
        self.write_encoded(parent, name, &desc.datatype, &Dataspace::scalar(), &bytes)
    }

    /// Write values into a 1-D slot.
    pub fn write_array<T: H5Scalar>(&self, parent: Hid, name: &str, values: &[T]) -> Result<()> {
        self.write_array_nd(parent, name, &[values.len() as u64], values)
    }

    /// Write row-major values into a slot of the given shape.
    pub fn write_array_nd<T: H5Scalar>(
        &self,
        parent: Hid,
        name: &str,
        shape: &[u64],
        values: &[T],
    ) -> Result<()> {
        let expected: u64 = shape.iter().product();
        if expected != values.len() as u64 {
            return Err(Error::Conversion {
                name: name.to_string(),
                reason: format!("shape {shape:?} holds {expected} values, got {}", values.len()),
            });
        }
        let desc = layout_of(T::SEMANTIC, self.settings)?;
        let bytes = encode_values(values, &desc)?;
        self.write_encoded(parent, name, &desc.datatype, &Dataspace::simple(shape), &bytes)
    }

    /// Write a variable-length string scalar.
    pub fn write_string(&self, parent: Hid, name: &str, value: &str) -> Result<()> {
        self.write_scalar(parent, name, &value.to_string())
    }

    /// Write a 1-D set of variable-length strings in the configured
    /// character set and padding.
    pub fn write_strings(&self, parent: Hid, name: &str, values: &[String]) -> Result<()> {
        self.write_array(parent, name, values)
    }

    /// Write strings in the legacy ASCII layout: shape `[count, max_chars]`
    /// of two-byte cells, one character per cell.
    pub fn write_ascii_strings(&self, parent: Hid, name: &str, values: &[String]) -> Result<()> {
        let (max_chars, bytes) = encode_legacy_cells(values);
        let datatype =
            Datatype::fixed_string(LEGACY_CELL as u32, CharacterSet::Ascii, StringPadding::NullPad);
        let dataspace = Dataspace::simple(&[values.len() as u64, max_chars as u64]);
        self.write_encoded(parent, name, &datatype, &dataspace, &bytes)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Open the primary or fallback slot, applying the missing-name policy.
    fn locate(
        &self,
        parent: Hid,
        name: &str,
        fallback: Option<&str>,
        mandatory: bool,
    ) -> Result<Option<HandleGuard<'a>>> {
        let c = self.container;
        match resolve(c, parent, name, fallback, R::KIND, self.settings)? {
            Some(found) => Ok(Some(HandleGuard::wrap(c, R::open(c, parent, &found))?)),
            None if mandatory || self.settings.throw_on_missing_name => {
                error!(slot = %name, kind = R::LABEL, "mandatory slot not found");
                Err(Error::SlotNotFound {
                    name: normalize(name, self.settings).into_owned(),
                    fallback: fallback.map(|f| normalize(f, self.settings).into_owned()),
                })
            }
            None => {
                warn!(slot = %name, kind = R::LABEL, "slot not found, using default");
                Ok(None)
            }
        }
    }

    /// Stored datatype and dataspace of an open slot.
    fn describe(&self, slot: &HandleGuard<'a>) -> Result<(Datatype, Dataspace)> {
        let c = self.container;
        let dtype = HandleGuard::wrap(c, c.type_of(slot.hid()))?;
        let space = HandleGuard::wrap(c, c.space_of(slot.hid()))?;
        Ok((c.datatype(dtype.hid())?, c.dataspace(space.hid())?))
    }

    fn read_elements<T: H5Scalar>(
        &self,
        slot: &HandleGuard<'a>,
        name: &str,
    ) -> Result<(Vec<u64>, Vec<T>)> {
        let desc = layout_of(T::SEMANTIC, self.settings)?;
        let (stored, space) = self.describe(slot)?;
        if !desc.datatype.is_compatible_with(&stored) {
            return Err(Error::Conversion {
                name: name.to_string(),
                reason: format!("stored layout cannot be read as {:?}", T::SEMANTIC),
            });
        }
        let raw = self.container.read_raw(slot.hid(), None)?;
        let values = decode_values(&raw, &desc)?;
        Ok((space.dimensions, values))
    }

    /// Read a scalar; an array slot yields its first element.
    pub fn read_scalar<T: H5Scalar>(
        &self,
        parent: Hid,
        name: &str,
        fallback: Option<&str>,
        mandatory: bool,
    ) -> Result<Outcome<T>> {
        let Some(slot) = self.locate(parent, name, fallback, mandatory)? else {
            return Ok(Outcome::failed());
        };
        let (_, values) = self.read_elements::<T>(&slot, name)?;
        values
            .into_iter()
            .next()
            .map(Outcome::ok)
            .ok_or_else(|| Error::Conversion {
                name: name.to_string(),
                reason: "slot holds no elements".into(),
            })
    }

    /// Read every element, flattened in row-major order.
    pub fn read_array<T: H5Scalar>(
        &self,
        parent: Hid,
        name: &str,
        fallback: Option<&str>,
        mandatory: bool,
    ) -> Result<Outcome<Vec<T>>> {
        Ok(self
            .read_array_shaped(parent, name, fallback, mandatory)?
            .map(|(_, values)| values))
    }

    /// Read every element together with the slot's shape.
    pub fn read_array_shaped<T: H5Scalar>(
        &self,
        parent: Hid,
        name: &str,
        fallback: Option<&str>,
        mandatory: bool,
    ) -> Result<Outcome<(Vec<u64>, Vec<T>)>> {
        let Some(slot) = self.locate(parent, name, fallback, mandatory)? else {
            return Ok(Outcome::failed());
        };
        Ok(Outcome::ok(self.read_elements::<T>(&slot, name)?))
    }

    /// Read a single string; a string set yields its first entry.
    pub fn read_string(
        &self,
        parent: Hid,
        name: &str,
        fallback: Option<&str>,
        mandatory: bool,
    ) -> Result<Outcome<String>> {
        Ok(self
            .read_strings(parent, name, fallback, mandatory)?
            .map(|values| values.into_iter().next().unwrap_or_default()))
    }

    /// Read a set of strings stored variable-length, fixed-length or in the
    /// legacy two-byte-cell layout.
    pub fn read_strings(
        &self,
        parent: Hid,
        name: &str,
        fallback: Option<&str>,
        mandatory: bool,
    ) -> Result<Outcome<Vec<String>>> {
        let Some(slot) = self.locate(parent, name, fallback, mandatory)? else {
            return Ok(Outcome::failed());
        };
        let (stored, space) = self.describe(&slot)?;
        let raw = self.container.read_raw(slot.hid(), None)?;
        let strings = match stored {
            Datatype::VariableLength {
                is_string: true,
                padding,
                ..
            } => vl::decode_elements(&raw)?
                .iter()
                .map(|bytes| decode_padded(bytes, padding.unwrap_or(StringPadding::NullTerminate)))
                .collect(),
            Datatype::String { size, .. }
                if size as usize == LEGACY_CELL && space.rank() == 2 =>
            {
                decode_legacy_cells(&raw, space.dimensions[1] as usize)
            }
            Datatype::String { size, padding, .. } if size > 0 => raw
                .chunks_exact(size as usize)
                .map(|cell| decode_padded(cell, padding))
                .collect(),
            _ => {
                return Err(Error::Conversion {
                    name: name.to_string(),
                    reason: "slot does not hold strings".into(),
                })
            }
        };
        Ok(Outcome::ok(strings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    struct Fixture {
        container: Container,
        settings: Settings,
    }

    impl Fixture {
        fn new(settings: Settings) -> Self {
            Fixture {
                container: Container::in_memory(),
                settings,
            }
        }

        fn attrs(&self) -> AttributeCodec<'_> {
            AttributeCodec::new(&self.container, &self.settings)
        }

        fn datasets(&self) -> DatasetCodec<'_> {
            DatasetCodec::new(&self.container, &self.settings)
        }

        fn root(&self) -> HandleGuard<'_> {
            HandleGuard::wrap(&self.container, self.container.open_root()).unwrap()
        }
    }

    #[test]
    fn scalar_attribute_round_trip() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        f.attrs().write_scalar(root.hid(), "answer", &42i32).unwrap();
        let got = f.attrs().read_scalar::<i32>(root.hid(), "answer", None, true).unwrap();
        assert_eq!(got, Outcome::ok(42));
        drop(root);
        assert_eq!(f.container.open_handle_count(), 0);
    }

    #[test]
    fn integer_slot_read_as_datetime_never_panics() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        f.attrs().write_scalar(root.hid(), "low", &i64::MIN).unwrap();
        f.attrs().write_array(root.hid(), "mixed", &[0i64, i64::MIN]).unwrap();
        assert!(matches!(
            f.attrs().read_scalar::<DateTime<Utc>>(root.hid(), "low", None, true),
            Err(Error::Conversion { .. })
        ));
        assert!(matches!(
            f.attrs().read_array::<DateTime<Utc>>(root.hid(), "mixed", None, true),
            Err(Error::Conversion { .. })
        ));
        drop(root);
        assert_eq!(f.container.open_handle_count(), 0);
    }

    #[test]
    fn big_endian_slot_is_not_misread() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        let big = Datatype::FixedPoint {
            size: 4,
            byte_order: h5store_format::DatatypeByteOrder::BigEndian,
            signed: true,
            bit_offset: 0,
            bit_precision: 32,
        };
        let attr = f
            .container
            .create_attribute(root.hid(), "be", &big, &Dataspace::scalar())
            .unwrap();
        f.container.write_raw(attr, None, &7i32.to_be_bytes()).unwrap();
        f.container.close(attr).unwrap();
        assert!(matches!(
            f.attrs().read_scalar::<i32>(root.hid(), "be", None, true),
            Err(Error::Conversion { .. })
        ));
    }

    #[test]
    fn array_dataset_round_trip() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        let values = vec![1.5f64, -2.0, 3.25];
        f.datasets().write_array(root.hid(), "series", &values).unwrap();
        let got = f.datasets().read_array::<f64>(root.hid(), "series", None, true).unwrap();
        assert!(got.success);
        assert_eq!(got.value, values);
    }

    #[test]
    fn nd_shape_is_kept() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        let values: Vec<u16> = (0..6).collect();
        f.attrs().write_array_nd(root.hid(), "grid", &[2, 3], &values).unwrap();
        let got = f.attrs().read_array_shaped::<u16>(root.hid(), "grid", None, true).unwrap();
        assert_eq!(got.value, (vec![2, 3], values));
    }

    #[test]
    fn nd_shape_must_match_values() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        let err = f.attrs().write_array_nd(root.hid(), "grid", &[2, 2], &[1u8, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
        assert!(!f.attrs().exists(root.hid(), "grid").unwrap());
    }

    #[test]
    fn strings_variable_length() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        let names = vec!["alpha".to_string(), String::new(), "gamma".to_string()];
        f.attrs().write_strings(root.hid(), "names", &names).unwrap();
        let got = f.attrs().read_strings(root.hid(), "names", None, true).unwrap();
        assert_eq!(got.value, names);
    }

    #[test]
    fn string_scalar() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        f.attrs().write_string(root.hid(), "title", "run 7").unwrap();
        let got = f.attrs().read_string(root.hid(), "title", None, false).unwrap();
        assert_eq!(got, Outcome::ok("run 7".to_string()));
    }

    #[test]
    fn legacy_ascii_cells() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        let values = vec!["ab".to_string(), "cdef".to_string(), "é".to_string()];
        f.attrs().write_ascii_strings(root.hid(), "legacy", &values).unwrap();
        let attr = HandleGuard::wrap(&f.container, f.container.open_attribute(root.hid(), "legacy")).unwrap();
        assert_eq!(f.container.dataspace(attr.hid()).unwrap().dimensions, vec![3, 4]);
        drop(attr);
        let got = f.attrs().read_strings(root.hid(), "legacy", None, true).unwrap();
        assert_eq!(got.value, vec!["ab", "cdef", "?"]);
    }

    #[test]
    fn missing_optional_yields_default() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        let got = f.attrs().read_scalar::<f64>(root.hid(), "absent", None, false).unwrap();
        assert!(!got.success);
        assert_eq!(got.value, 0.0);
        let got = f.attrs().read_strings(root.hid(), "absent", None, false).unwrap();
        assert!(got.value.is_empty());
    }

    #[test]
    fn missing_mandatory_fails() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        let err = f
            .attrs()
            .read_scalar::<i64>(root.hid(), "absent", Some("older"), true)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SlotNotFound { ref name, fallback: Some(ref fb) } if name == "absent" && fb == "older"
        ));
    }

    #[test]
    fn throw_on_missing_name_makes_every_read_mandatory() {
        let f = Fixture::new(Settings::default().throw_on_missing_name(true));
        let root = f.root();
        assert!(f.attrs().read_scalar::<i64>(root.hid(), "absent", None, false).is_err());
    }

    #[test]
    fn fallback_name_is_read() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        f.attrs().write_scalar(root.hid(), "old_gain", &3u32).unwrap();
        let got = f.attrs().read_scalar::<u32>(root.hid(), "gain", Some("old_gain"), true).unwrap();
        assert_eq!(got.value, 3);
    }

    #[test]
    fn override_replaces_existing() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        f.attrs().write_scalar(root.hid(), "v", &1i32).unwrap();
        f.attrs().write_scalar(root.hid(), "v", &2.5f64).unwrap();
        let got = f.attrs().read_scalar::<f64>(root.hid(), "v", None, true).unwrap();
        assert_eq!(got.value, 2.5);
    }

    #[test]
    fn no_override_is_creation_error() {
        let f = Fixture::new(Settings::default().override_existing(false));
        let root = f.root();
        f.attrs().write_scalar(root.hid(), "v", &1i32).unwrap();
        let err = f.attrs().write_scalar(root.hid(), "v", &2i32).unwrap_err();
        assert!(matches!(err, Error::Creation { kind: "attribute", .. }));
        assert_eq!(f.attrs().read_scalar::<i32>(root.hid(), "v", None, true).unwrap().value, 1);
    }

    #[test]
    fn incompatible_read_is_conversion_error() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        f.attrs().write_scalar(root.hid(), "v", &1i32).unwrap();
        let err = f.attrs().read_scalar::<u64>(root.hid(), "v", None, true).unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
    }

    #[test]
    fn unsupported_type_fails_before_creation() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        let err = f.attrs().write_scalar(root.hid(), "c", &'x').unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(_)));
        assert!(!f.attrs().exists(root.hid(), "c").unwrap());
    }

    #[test]
    fn datetime_attribute() {
        let f = Fixture::new(Settings::default());
        let root = f.root();
        let t: DateTime<Utc> = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        f.attrs().write_scalar(root.hid(), "created", &t).unwrap();
        let got = f.attrs().read_scalar::<DateTime<Utc>>(root.hid(), "created", None, true).unwrap();
        assert_eq!(got.value, t);
    }

    #[test]
    fn handles_released_after_failures() {
        let f = Fixture::new(Settings::default().override_existing(false));
        {
            let root = f.root();
            f.attrs().write_scalar(root.hid(), "v", &1i32).unwrap();
            let _ = f.attrs().write_scalar(root.hid(), "v", &1i32);
            let _ = f.attrs().read_scalar::<u8>(root.hid(), "v", None, true);
            let _ = f.attrs().read_scalar::<u8>(root.hid(), "missing", None, true);
        }
        assert_eq!(f.container.open_handle_count(), 0);
    }
}
