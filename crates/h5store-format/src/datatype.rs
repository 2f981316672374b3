//! Datatype descriptors and their binary message encoding.
//!
//! The encoding follows the HDF5 datatype message layout for the classes the
//! container stores: fixed-point (0), floating-point (1), fixed-length string
//! (3), compound (6), variable-length (9) and array (10).

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// Byte order of numeric data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatatypeByteOrder {
    LittleEndian,
    BigEndian,
}

/// String padding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringPadding {
    NullTerminate,
    NullPad,
    SpacePad,
}

/// Character set encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterSet {
    Ascii,
    Utf8,
}

/// A member of a compound datatype.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundMember {
    /// Member name.
    pub name: String,
    /// Byte offset within the compound.
    pub byte_offset: u64,
    /// Member datatype.
    pub datatype: Datatype,
}

/// A stored datatype.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    /// Class 0: Fixed-point (integer) types.
    FixedPoint {
        size: u32,
        byte_order: DatatypeByteOrder,
        signed: bool,
        bit_offset: u16,
        bit_precision: u16,
    },
    /// Class 1: Floating-point types.
    FloatingPoint {
        size: u32,
        byte_order: DatatypeByteOrder,
        bit_offset: u16,
        bit_precision: u16,
        exponent_location: u8,
        exponent_size: u8,
        mantissa_location: u8,
        mantissa_size: u8,
        exponent_bias: u32,
    },
    /// Class 3: Fixed-length string.
    String {
        size: u32,
        padding: StringPadding,
        charset: CharacterSet,
    },
    /// Class 6: Compound type.
    Compound {
        size: u32,
        members: Vec<CompoundMember>,
    },
    /// Class 9: Variable-length type.
    VariableLength {
        is_string: bool,
        padding: Option<StringPadding>,
        charset: Option<CharacterSet>,
        base_type: Box<Datatype>,
    },
    /// Class 10: Array type.
    Array {
        base_type: Box<Datatype>,
        dimensions: Vec<u32>,
    },
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

fn parse_string_padding(val: u8) -> Result<StringPadding, FormatError> {
    match val {
        0 => Ok(StringPadding::NullTerminate),
        1 => Ok(StringPadding::NullPad),
        2 => Ok(StringPadding::SpacePad),
        _ => Err(FormatError::InvalidStringPadding(val)),
    }
}

fn parse_charset(val: u8) -> Result<CharacterSet, FormatError> {
    match val {
        0 => Ok(CharacterSet::Ascii),
        1 => Ok(CharacterSet::Utf8),
        _ => Err(FormatError::InvalidCharacterSet(val)),
    }
}

fn padding_bits(padding: StringPadding) -> u8 {
    match padding {
        StringPadding::NullTerminate => 0,
        StringPadding::NullPad => 1,
        StringPadding::SpacePad => 2,
    }
}

fn charset_bits(charset: CharacterSet) -> u8 {
    match charset {
        CharacterSet::Ascii => 0,
        CharacterSet::Utf8 => 1,
    }
}

/// Read a null-terminated string from `data` starting at `offset`.
/// Returns (string, bytes_consumed including the null terminator).
fn read_null_terminated_string(data: &[u8], offset: usize) -> Result<(String, usize), FormatError> {
    ensure_len(data, offset, 1)?;
    let remaining = &data[offset..];
    let null_pos = remaining
        .iter()
        .position(|&b| b == 0)
        .ok_or(FormatError::UnexpectedEof {
            expected: offset + remaining.len() + 1,
            available: data.len(),
        })?;
    let name = String::from_utf8_lossy(&remaining[..null_pos]).into_owned();
    Ok((name, null_pos + 1))
}

/// Determine how many bytes are needed to encode `compound_size` as a byte offset (v3).
fn offset_bytes_for_size(compound_size: u32) -> usize {
    if compound_size <= 0xFF {
        1
    } else if compound_size <= 0xFFFF {
        2
    } else {
        4
    }
}

/// Read an unsigned integer of 1, 2 or 4 bytes (LE).
fn read_uint(data: &[u8], offset: usize, nbytes: usize) -> Result<u64, FormatError> {
    ensure_len(data, offset, nbytes)?;
    let slice = &data[offset..offset + nbytes];
    Ok(match nbytes {
        1 => slice[0] as u64,
        2 => LittleEndian::read_u16(slice) as u64,
        _ => LittleEndian::read_u32(slice) as u64,
    })
}

fn write_uint(buf: &mut Vec<u8>, value: u64, nbytes: usize) {
    buf.extend_from_slice(&value.to_le_bytes()[..nbytes]);
}

impl Datatype {
    /// Little-endian integer of `size` bytes.
    pub fn fixed(size: u32, signed: bool) -> Datatype {
        Datatype::FixedPoint {
            size,
            byte_order: DatatypeByteOrder::LittleEndian,
            signed,
            bit_offset: 0,
            bit_precision: (size * 8) as u16,
        }
    }

    /// Little-endian IEEE 754 float of 4 or 8 bytes.
    pub fn float(size: u32) -> Datatype {
        let (exponent_location, exponent_size, mantissa_size, exponent_bias) = if size == 4 {
            (23, 8, 23, 127)
        } else {
            (52, 11, 52, 1023)
        };
        Datatype::FloatingPoint {
            size,
            byte_order: DatatypeByteOrder::LittleEndian,
            bit_offset: 0,
            bit_precision: (size * 8) as u16,
            exponent_location,
            exponent_size,
            mantissa_location: 0,
            mantissa_size,
            exponent_bias,
        }
    }

    /// Fixed-length string of `size` bytes.
    pub fn fixed_string(size: u32, charset: CharacterSet, padding: StringPadding) -> Datatype {
        Datatype::String {
            size,
            padding,
            charset,
        }
    }

    /// Variable-length string.
    pub fn vlen_string(charset: CharacterSet, padding: StringPadding) -> Datatype {
        Datatype::VariableLength {
            is_string: true,
            padding: Some(padding),
            charset: Some(charset),
            base_type: Box::new(Datatype::fixed_string(1, charset, padding)),
        }
    }

    /// Whether elements of this type have a variable size.
    pub fn is_variable_length(&self) -> bool {
        matches!(self, Datatype::VariableLength { .. })
    }

    /// Whether two types share class, width, byte order and signedness.
    ///
    /// Raw buffers are never byte-swapped, so numeric types of different
    /// byte order are incompatible. Bit offsets, precision details and
    /// string padding are ignored;
    /// compound members must match by name, offset and compatible type.
    pub fn is_compatible_with(&self, other: &Datatype) -> bool {
        match (self, other) {
            (
                Datatype::FixedPoint { size: a, signed: sa, byte_order: oa, .. },
                Datatype::FixedPoint { size: b, signed: sb, byte_order: ob, .. },
            ) => a == b && sa == sb && oa == ob,
            (
                Datatype::FloatingPoint { size: a, byte_order: oa, .. },
                Datatype::FloatingPoint { size: b, byte_order: ob, .. },
            ) => a == b && oa == ob,
            (Datatype::String { size: a, .. }, Datatype::String { size: b, .. }) => a == b,
            (
                Datatype::VariableLength { is_string: a, .. },
                Datatype::VariableLength { is_string: b, .. },
            ) => a == b,
            (
                Datatype::Compound { size: a, members: ma },
                Datatype::Compound { size: b, members: mb },
            ) => {
                a == b
                    && ma.len() == mb.len()
                    && ma.iter().zip(mb).all(|(x, y)| {
                        x.name == y.name
                            && x.byte_offset == y.byte_offset
                            && x.datatype.is_compatible_with(&y.datatype)
                    })
            }
            (
                Datatype::Array { base_type: a, dimensions: da },
                Datatype::Array { base_type: b, dimensions: db },
            ) => da == db && a.is_compatible_with(b),
            _ => false,
        }
    }

    /// Parse a datatype message from raw bytes.
    ///
    /// Returns `(Datatype, bytes_consumed)` for recursive parsing.
    pub fn parse(data: &[u8]) -> Result<(Datatype, usize), FormatError> {
        // class_and_version + 3-byte bit field + 4-byte size
        ensure_len(data, 0, 8)?;

        let class_and_version = data[0];
        let class_id = class_and_version & 0x0F;
        let version = (class_and_version >> 4) & 0x0F;

        let bf0 = data[1];
        let bf1 = data[2];

        let size = LittleEndian::read_u32(&data[4..8]);
        let mut pos = 8;

        match class_id {
            0 => {
                ensure_len(data, pos, 4)?;
                let byte_order = if bf0 & 0x01 == 0 {
                    DatatypeByteOrder::LittleEndian
                } else {
                    DatatypeByteOrder::BigEndian
                };
                let signed = (bf0 >> 3) & 0x01 == 1;
                let bit_offset = LittleEndian::read_u16(&data[pos..pos + 2]);
                let bit_precision = LittleEndian::read_u16(&data[pos + 2..pos + 4]);
                pos += 4;
                Ok((
                    Datatype::FixedPoint {
                        size,
                        byte_order,
                        signed,
                        bit_offset,
                        bit_precision,
                    },
                    pos,
                ))
            }
            1 => {
                ensure_len(data, pos, 12)?;
                let byte_order = if bf0 & 0x01 == 0 {
                    DatatypeByteOrder::LittleEndian
                } else {
                    DatatypeByteOrder::BigEndian
                };
                let bit_offset = LittleEndian::read_u16(&data[pos..pos + 2]);
                let bit_precision = LittleEndian::read_u16(&data[pos + 2..pos + 4]);
                let exponent_location = data[pos + 4];
                let exponent_size = data[pos + 5];
                let mantissa_location = data[pos + 6];
                let mantissa_size = data[pos + 7];
                let exponent_bias = LittleEndian::read_u32(&data[pos + 8..pos + 12]);
                pos += 12;
                Ok((
                    Datatype::FloatingPoint {
                        size,
                        byte_order,
                        bit_offset,
                        bit_precision,
                        exponent_location,
                        exponent_size,
                        mantissa_location,
                        mantissa_size,
                        exponent_bias,
                    },
                    pos,
                ))
            }
            3 => {
                let padding = parse_string_padding(bf0 & 0x0F)?;
                let charset = parse_charset((bf0 >> 4) & 0x0F)?;
                Ok((Datatype::String { size, padding, charset }, pos))
            }
            6 => {
                if version != 3 {
                    return Err(FormatError::InvalidDatatypeVersion {
                        class: class_id,
                        version,
                    });
                }
                let num_members = (bf0 as u16) | ((bf1 as u16) << 8);
                let mut members = Vec::with_capacity(num_members as usize);
                let ob = offset_bytes_for_size(size);
                for _ in 0..num_members {
                    let (name, name_len) = read_null_terminated_string(data, pos)?;
                    pos += name_len;
                    let byte_offset = read_uint(data, pos, ob)?;
                    pos += ob;
                    let (member_dt, consumed) = Datatype::parse(&data[pos..])?;
                    pos += consumed;
                    members.push(CompoundMember {
                        name,
                        byte_offset,
                        datatype: member_dt,
                    });
                }
                Ok((Datatype::Compound { size, members }, pos))
            }
            9 => {
                let is_string = bf0 & 0x0F == 1;
                let padding = if is_string {
                    Some(parse_string_padding((bf0 >> 4) & 0x0F)?)
                } else {
                    None
                };
                let charset = if is_string {
                    Some(parse_charset(bf1 & 0x0F)?)
                } else {
                    None
                };
                let (base_type, consumed) = Datatype::parse(&data[pos..])?;
                pos += consumed;
                Ok((
                    Datatype::VariableLength {
                        is_string,
                        padding,
                        charset,
                        base_type: Box::new(base_type),
                    },
                    pos,
                ))
            }
            10 => {
                if version != 3 {
                    return Err(FormatError::InvalidDatatypeVersion {
                        class: class_id,
                        version,
                    });
                }
                ensure_len(data, pos, 1)?;
                let ndims = data[pos] as usize;
                pos += 1;
                ensure_len(data, pos, ndims * 4)?;
                let mut dimensions = Vec::with_capacity(ndims);
                for _ in 0..ndims {
                    dimensions.push(LittleEndian::read_u32(&data[pos..pos + 4]));
                    pos += 4;
                }
                let (base_type, consumed) = Datatype::parse(&data[pos..])?;
                pos += consumed;
                Ok((
                    Datatype::Array {
                        base_type: Box::new(base_type),
                        dimensions,
                    },
                    pos,
                ))
            }
            _ => Err(FormatError::InvalidDatatypeClass(class_id)),
        }
    }

    /// Serialize the datatype to message bytes.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Datatype::FixedPoint { size, byte_order, signed, bit_offset, bit_precision } => {
                let mut bf0 = 0u8;
                if *byte_order == DatatypeByteOrder::BigEndian {
                    bf0 |= 0x01;
                }
                if *signed {
                    bf0 |= 0x08;
                }
                let mut buf = build_header(0, 1, [bf0, 0, 0], *size);
                buf.extend_from_slice(&bit_offset.to_le_bytes());
                buf.extend_from_slice(&bit_precision.to_le_bytes());
                buf
            }
            Datatype::FloatingPoint {
                size,
                byte_order,
                bit_offset,
                bit_precision,
                exponent_location,
                exponent_size,
                mantissa_location,
                mantissa_size,
                exponent_bias,
            } => {
                // bit 5: IEEE sign location; bf1: mantissa normalization
                let mut bf0 = 0x20u8;
                if *byte_order == DatatypeByteOrder::BigEndian {
                    bf0 |= 0x01;
                }
                let mut buf = build_header(1, 1, [bf0, 0x3f, 0], *size);
                buf.extend_from_slice(&bit_offset.to_le_bytes());
                buf.extend_from_slice(&bit_precision.to_le_bytes());
                buf.push(*exponent_location);
                buf.push(*exponent_size);
                buf.push(*mantissa_location);
                buf.push(*mantissa_size);
                buf.extend_from_slice(&exponent_bias.to_le_bytes());
                buf
            }
            Datatype::String { size, padding, charset } => {
                let bf0 = padding_bits(*padding) | (charset_bits(*charset) << 4);
                build_header(3, 1, [bf0, 0, 0], *size)
            }
            Datatype::Compound { size, members } => {
                let n = members.len() as u16;
                let mut buf = build_header(6, 3, [n as u8, (n >> 8) as u8, 0], *size);
                let ob = offset_bytes_for_size(*size);
                for m in members {
                    buf.extend_from_slice(m.name.as_bytes());
                    buf.push(0);
                    write_uint(&mut buf, m.byte_offset, ob);
                    buf.extend_from_slice(&m.datatype.serialize());
                }
                buf
            }
            Datatype::VariableLength { is_string, padding, charset, base_type } => {
                let mut bf0 = if *is_string { 0x01u8 } else { 0x00 };
                let mut bf1 = 0u8;
                if *is_string {
                    if let Some(p) = padding {
                        bf0 |= padding_bits(*p) << 4;
                    }
                    if let Some(c) = charset {
                        bf1 = charset_bits(*c);
                    }
                }
                let mut buf = build_header(9, 1, [bf0, bf1, 0], 16);
                buf.extend_from_slice(&base_type.serialize());
                buf
            }
            Datatype::Array { base_type, dimensions } => {
                let mut buf = build_header(10, 3, [0, 0, 0], self.type_size());
                buf.push(dimensions.len() as u8);
                for d in dimensions {
                    buf.extend_from_slice(&d.to_le_bytes());
                }
                buf.extend_from_slice(&base_type.serialize());
                buf
            }
        }
    }

    /// Return the size in bytes of one element of this type.
    ///
    /// Variable-length types report the size of their in-file descriptor.
    pub fn type_size(&self) -> u32 {
        match self {
            Datatype::FixedPoint { size, .. } => *size,
            Datatype::FloatingPoint { size, .. } => *size,
            Datatype::String { size, .. } => *size,
            Datatype::Compound { size, .. } => *size,
            Datatype::VariableLength { .. } => 16,
            Datatype::Array { base_type, dimensions } => {
                let elem_count: u32 = dimensions.iter().product();
                base_type.type_size() * elem_count
            }
        }
    }
}

fn build_header(class: u8, version: u8, bf: [u8; 3], size: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    buf[0] = (class & 0x0F) | ((version & 0x0F) << 4);
    buf[1] = bf[0];
    buf[2] = bf[1];
    buf[3] = bf[2];
    LittleEndian::write_u32(&mut buf[4..8], size);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_u8_message() {
        let bytes = Datatype::fixed(1, false).serialize();
        assert_eq!(bytes.len(), 12);
        let (dt, consumed) = Datatype::parse(&bytes).unwrap();
        assert_eq!(consumed, 12);
        assert_eq!(
            dt,
            Datatype::FixedPoint {
                size: 1,
                byte_order: DatatypeByteOrder::LittleEndian,
                signed: false,
                bit_offset: 0,
                bit_precision: 8,
            }
        );
    }

    #[test]
    fn big_endian_is_kept_and_not_compatible() {
        let big = Datatype::FixedPoint {
            size: 4,
            byte_order: DatatypeByteOrder::BigEndian,
            signed: true,
            bit_offset: 0,
            bit_precision: 32,
        };
        let bytes = big.serialize();
        assert_eq!(bytes[1] & 0x01, 0x01);
        assert_eq!(Datatype::parse(&bytes).unwrap().0, big);
        assert!(!big.is_compatible_with(&Datatype::fixed(4, true)));
        assert!(big.is_compatible_with(&big));

        let mut big_float = Datatype::float(8);
        if let Datatype::FloatingPoint { byte_order, .. } = &mut big_float {
            *byte_order = DatatypeByteOrder::BigEndian;
        }
        assert_eq!(Datatype::parse(&big_float.serialize()).unwrap().0, big_float);
        assert!(!big_float.is_compatible_with(&Datatype::float(8)));
    }

    #[test]
    fn signed_flag_is_bit_three() {
        let bytes = Datatype::fixed(2, true).serialize();
        assert_eq!(bytes[1] & 0x08, 0x08);
        let (dt, _) = Datatype::parse(&bytes).unwrap();
        assert!(matches!(dt, Datatype::FixedPoint { size: 2, signed: true, .. }));
    }

    #[test]
    fn float_parameters_survive() {
        for size in [4u32, 8] {
            let dt = Datatype::float(size);
            let (parsed, consumed) = Datatype::parse(&dt.serialize()).unwrap();
            assert_eq!(consumed, 20);
            assert_eq!(parsed, dt);
        }
    }

    #[test]
    fn string_padding_and_charset_bits() {
        let dt = Datatype::fixed_string(2, CharacterSet::Utf8, StringPadding::SpacePad);
        let bytes = dt.serialize();
        assert_eq!(bytes[1], 0x12);
        assert_eq!(Datatype::parse(&bytes).unwrap().0, dt);
    }

    #[test]
    fn vlen_string_message() {
        let dt = Datatype::vlen_string(CharacterSet::Utf8, StringPadding::NullPad);
        let (parsed, _) = Datatype::parse(&dt.serialize()).unwrap();
        assert_eq!(parsed, dt);
        assert!(parsed.is_variable_length());
        assert_eq!(parsed.type_size(), 16);
    }

    #[test]
    fn compound_with_nested_array() {
        let dt = Datatype::Compound {
            size: 28,
            members: vec![
                CompoundMember {
                    name: "index".into(),
                    byte_offset: 0,
                    datatype: Datatype::fixed(4, true),
                },
                CompoundMember {
                    name: "coords".into(),
                    byte_offset: 4,
                    datatype: Datatype::Array {
                        base_type: Box::new(Datatype::float(8)),
                        dimensions: vec![3],
                    },
                },
            ],
        };
        let bytes = dt.serialize();
        let (parsed, consumed) = Datatype::parse(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, dt);
        assert_eq!(parsed.type_size(), 28);
    }

    #[test]
    fn compatibility_ignores_padding_but_not_width() {
        let a = Datatype::fixed_string(8, CharacterSet::Ascii, StringPadding::NullPad);
        let b = Datatype::fixed_string(8, CharacterSet::Utf8, StringPadding::SpacePad);
        assert!(a.is_compatible_with(&b));
        assert!(!Datatype::fixed(4, true).is_compatible_with(&Datatype::fixed(4, false)));
        assert!(!Datatype::fixed(4, true).is_compatible_with(&Datatype::float(4)));
    }

    #[test]
    fn error_invalid_class() {
        let mut bytes = Datatype::fixed(4, true).serialize();
        bytes[0] = 0x1F;
        assert!(matches!(
            Datatype::parse(&bytes),
            Err(FormatError::InvalidDatatypeClass(15))
        ));
    }

    #[test]
    fn error_truncated_data() {
        let bytes = Datatype::float(8).serialize();
        assert!(matches!(
            Datatype::parse(&bytes[..10]),
            Err(FormatError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn error_invalid_string_padding() {
        let bytes = build_header(3, 1, [0x07, 0, 0], 4);
        assert!(matches!(
            Datatype::parse(&bytes),
            Err(FormatError::InvalidStringPadding(7))
        ));
    }
}
