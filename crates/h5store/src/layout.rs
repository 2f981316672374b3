//! Mapping from scalar semantic types to binary layouts.
//!
//! [`layout_of`] derives a [`Descriptor`] from a [`SemanticType`] and the
//! string/date policies of [`Settings`]. [`H5Scalar`] ties a Rust type to its
//! semantic type and provides the pure encode/decode steps.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};
use h5store_format::{CharacterSet, Datatype, StringPadding};

use crate::error::{Error, Result};
use crate::settings::{Charset, DateTimeEncoding, Padding, Settings};

/// Ticks between 0001-01-01 and the Unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

const TICKS_PER_SECOND: i64 = 10_000_000;

/// Scalar semantic type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    DateTime,
    String,
    /// A type with no layout; carries the type name for error messages.
    Unsupported(&'static str),
}

/// Binary layout of a semantic type under a given set of settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub semantic: SemanticType,
    /// Bytes per element in a raw buffer (for strings, the descriptor size).
    pub binary_width: usize,
    pub datatype: Datatype,
    pub variable_length: bool,
    pub charset: CharacterSet,
    pub padding: StringPadding,
    pub time_encoding: DateTimeEncoding,
}

pub(crate) fn charset_of(settings: &Settings) -> CharacterSet {
    match settings.charset {
        Charset::Ascii => CharacterSet::Ascii,
        Charset::Utf8 => CharacterSet::Utf8,
    }
}

pub(crate) fn padding_of(settings: &Settings) -> StringPadding {
    match settings.padding {
        Padding::NullTerminate => StringPadding::NullTerminate,
        Padding::NullPad => StringPadding::NullPad,
        Padding::SpacePad => StringPadding::SpacePad,
    }
}

/// Derive the layout of a semantic type.
pub fn layout_of(semantic: SemanticType, settings: &Settings) -> Result<Descriptor> {
    let charset = charset_of(settings);
    let padding = padding_of(settings);
    let datatype = match semantic {
        SemanticType::I8 => Datatype::fixed(1, true),
        SemanticType::I16 => Datatype::fixed(2, true),
        SemanticType::I32 => Datatype::fixed(4, true),
        SemanticType::I64 | SemanticType::DateTime => Datatype::fixed(8, true),
        SemanticType::U8 | SemanticType::Bool => Datatype::fixed(1, false),
        SemanticType::U16 => Datatype::fixed(2, false),
        SemanticType::U32 => Datatype::fixed(4, false),
        SemanticType::U64 => Datatype::fixed(8, false),
        SemanticType::F32 => Datatype::float(4),
        SemanticType::F64 => Datatype::float(8),
        SemanticType::String => Datatype::vlen_string(charset, padding),
        SemanticType::Unsupported(name) => return Err(Error::UnsupportedType(name.to_string())),
    };
    Ok(Descriptor {
        semantic,
        binary_width: datatype.type_size() as usize,
        variable_length: datatype.is_variable_length(),
        datatype,
        charset,
        padding,
        time_encoding: settings.date_time,
    })
}

/// A value with a scalar semantic type.
pub trait H5Scalar: Sized + Default + Clone {
    const SEMANTIC: SemanticType;

    /// Append the encoded value. Fixed-width types write exactly
    /// `desc.binary_width` bytes; strings write their character payload.
    fn encode_into(&self, desc: &Descriptor, out: &mut Vec<u8>) -> Result<()>;

    /// Decode one value from exactly the bytes `encode_into` produced.
    fn decode_from(bytes: &[u8], desc: &Descriptor) -> Result<Self>;
}

/// Encode a single value.
pub fn encode<T: H5Scalar>(value: &T, desc: &Descriptor) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(desc.binary_width);
    value.encode_into(desc, &mut out)?;
    Ok(out)
}

/// Decode a single value.
pub fn decode<T: H5Scalar>(bytes: &[u8], desc: &Descriptor) -> Result<T> {
    T::decode_from(bytes, desc)
}

fn check_width(bytes: &[u8], width: usize, what: &str) -> Result<()> {
    if bytes.len() != width {
        return Err(Error::Conversion {
            name: what.to_string(),
            reason: format!("expected {width} bytes, got {}", bytes.len()),
        });
    }
    Ok(())
}

macro_rules! impl_int_scalar {
    ($($ty:ty => $sem:ident, $width:expr, $write:ident, $read:ident);* $(;)?) => {$(
        impl H5Scalar for $ty {
            const SEMANTIC: SemanticType = SemanticType::$sem;

            fn encode_into(&self, _desc: &Descriptor, out: &mut Vec<u8>) -> Result<()> {
                let mut buf = [0u8; $width];
                LittleEndian::$write(&mut buf, *self);
                out.extend_from_slice(&buf);
                Ok(())
            }

            fn decode_from(bytes: &[u8], _desc: &Descriptor) -> Result<Self> {
                check_width(bytes, $width, stringify!($ty))?;
                Ok(LittleEndian::$read(bytes))
            }
        }
    )*};
}

impl_int_scalar! {
    i16 => I16, 2, write_i16, read_i16;
    i32 => I32, 4, write_i32, read_i32;
    i64 => I64, 8, write_i64, read_i64;
    u16 => U16, 2, write_u16, read_u16;
    u32 => U32, 4, write_u32, read_u32;
    u64 => U64, 8, write_u64, read_u64;
    f32 => F32, 4, write_f32, read_f32;
    f64 => F64, 8, write_f64, read_f64;
}

impl H5Scalar for i8 {
    const SEMANTIC: SemanticType = SemanticType::I8;

    fn encode_into(&self, _desc: &Descriptor, out: &mut Vec<u8>) -> Result<()> {
        out.push(*self as u8);
        Ok(())
    }

    fn decode_from(bytes: &[u8], _desc: &Descriptor) -> Result<Self> {
        check_width(bytes, 1, "i8")?;
        Ok(bytes[0] as i8)
    }
}

impl H5Scalar for u8 {
    const SEMANTIC: SemanticType = SemanticType::U8;

    fn encode_into(&self, _desc: &Descriptor, out: &mut Vec<u8>) -> Result<()> {
        out.push(*self);
        Ok(())
    }

    fn decode_from(bytes: &[u8], _desc: &Descriptor) -> Result<Self> {
        check_width(bytes, 1, "u8")?;
        Ok(bytes[0])
    }
}

impl H5Scalar for bool {
    const SEMANTIC: SemanticType = SemanticType::Bool;

    fn encode_into(&self, _desc: &Descriptor, out: &mut Vec<u8>) -> Result<()> {
        out.push(u8::from(*self));
        Ok(())
    }

    fn decode_from(bytes: &[u8], _desc: &Descriptor) -> Result<Self> {
        check_width(bytes, 1, "bool")?;
        Ok(bytes[0] != 0)
    }
}

impl H5Scalar for DateTime<Utc> {
    const SEMANTIC: SemanticType = SemanticType::DateTime;

    fn encode_into(&self, desc: &Descriptor, out: &mut Vec<u8>) -> Result<()> {
        let raw = match desc.time_encoding {
            DateTimeEncoding::Ticks => self
                .timestamp()
                .checked_mul(TICKS_PER_SECOND)
                .and_then(|t| t.checked_add(i64::from(self.timestamp_subsec_nanos() / 100)))
                .and_then(|t| t.checked_add(UNIX_EPOCH_TICKS))
                .ok_or_else(|| Error::Conversion {
                    name: self.to_rfc3339(),
                    reason: "out of tick range".into(),
                })?,
            DateTimeEncoding::UnixSeconds => self.timestamp(),
            DateTimeEncoding::UnixMilliseconds => self.timestamp_millis(),
        };
        out.extend_from_slice(&raw.to_le_bytes());
        Ok(())
    }

    fn decode_from(bytes: &[u8], desc: &Descriptor) -> Result<Self> {
        check_width(bytes, 8, "datetime")?;
        let raw = LittleEndian::read_i64(bytes);
        let decoded = match desc.time_encoding {
            DateTimeEncoding::Ticks => raw.checked_sub(UNIX_EPOCH_TICKS).and_then(|since_epoch| {
                let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
                let nanos = (since_epoch.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
                DateTime::from_timestamp(secs, nanos)
            }),
            DateTimeEncoding::UnixSeconds => DateTime::from_timestamp(raw, 0),
            DateTimeEncoding::UnixMilliseconds => DateTime::from_timestamp_millis(raw),
        };
        decoded.ok_or_else(|| Error::Conversion {
            name: "datetime".into(),
            reason: format!("{raw} is out of range"),
        })
    }
}

impl H5Scalar for String {
    const SEMANTIC: SemanticType = SemanticType::String;

    fn encode_into(&self, desc: &Descriptor, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&string_bytes(self, desc.charset));
        Ok(())
    }

    fn decode_from(bytes: &[u8], desc: &Descriptor) -> Result<Self> {
        Ok(decode_padded(bytes, desc.padding))
    }
}

macro_rules! impl_unsupported_scalar {
    ($($ty:ty),*) => {$(
        impl H5Scalar for $ty {
            const SEMANTIC: SemanticType = SemanticType::Unsupported(stringify!($ty));

            fn encode_into(&self, _desc: &Descriptor, _out: &mut Vec<u8>) -> Result<()> {
                Err(Error::UnsupportedType(stringify!($ty).to_string()))
            }

            fn decode_from(_bytes: &[u8], _desc: &Descriptor) -> Result<Self> {
                Err(Error::UnsupportedType(stringify!($ty).to_string()))
            }
        }
    )*};
}

impl_unsupported_scalar!(char, i128, u128);

/// Character payload of a string: ASCII maps every non-ASCII char to `?`.
pub(crate) fn string_bytes(s: &str, charset: CharacterSet) -> Vec<u8> {
    match charset {
        CharacterSet::Utf8 => s.as_bytes().to_vec(),
        CharacterSet::Ascii => s
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect(),
    }
}

/// Strip padding from a stored string payload.
pub(crate) fn decode_padded(bytes: &[u8], padding: StringPadding) -> String {
    let end = match padding {
        StringPadding::NullTerminate => bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len()),
        StringPadding::NullPad => bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1),
        StringPadding::SpacePad => bytes
            .iter()
            .rposition(|&b| b != b' ' && b != 0)
            .map_or(0, |i| i + 1),
    };
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Encode a string into a fixed-size cell, truncating on a char boundary.
pub(crate) fn encode_fixed(s: &str, size: usize, charset: CharacterSet, padding: StringPadding) -> Vec<u8> {
    let payload = string_bytes(s, charset);
    // NullTerminate keeps room for the terminator.
    let room = match padding {
        StringPadding::NullTerminate => size.saturating_sub(1),
        _ => size,
    };
    let mut take = payload.len().min(room);
    if charset == CharacterSet::Utf8 {
        while take > 0 && !s.is_char_boundary(take) {
            take -= 1;
        }
    }
    let fill = if padding == StringPadding::SpacePad { b' ' } else { 0 };
    let mut cell = payload[..take].to_vec();
    cell.resize(size, fill);
    cell
}
