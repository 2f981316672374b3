//! Fixed-layout records for growable datasets.
//!
//! `#[derive(H5Record)]` lists a struct's fields as [`RecordField`]s and
//! implements field-by-field encoding. [`RecordLayout`] turns that list into
//! a compound datatype with packed offsets under the current [`Settings`].

use h5store_format::{CompoundMember, Datatype};

use crate::error::{Error, Result};
use crate::layout::{decode_padded, encode_fixed, layout_of, Descriptor, H5Scalar, SemanticType};
use crate::settings::Settings;

/// Shape of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Scalar,
    /// `[T; N]`
    Array(usize),
    /// A string stored in a cell of this many bytes.
    FixedString(usize),
}

/// Static description of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordField {
    pub name: &'static str,
    pub semantic: SemanticType,
    pub shape: FieldShape,
}

/// A struct stored as one compound element per record. Usually derived.
pub trait H5Record: Sized {
    fn fields() -> &'static [RecordField];

    fn encode_fields(&self, encoder: &mut RecordEncoder<'_>) -> Result<()>;

    fn decode_fields(decoder: &mut RecordDecoder<'_>) -> Result<Self>;
}

#[derive(Debug, Clone, PartialEq)]
struct ResolvedField {
    field: RecordField,
    desc: Descriptor,
    offset: usize,
    width: usize,
}

/// Packed binary layout of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    fields: Vec<ResolvedField>,
    size: usize,
    datatype: Datatype,
}

impl RecordLayout {
    /// Resolve the layout of `R`.
    ///
    /// Variable-length strings cannot live inside a record; string fields
    /// need a fixed cell length.
    pub fn of<R: H5Record>(settings: &Settings) -> Result<Self> {
        let mut fields = Vec::with_capacity(R::fields().len());
        let mut members = Vec::with_capacity(R::fields().len());
        let mut offset = 0usize;
        for field in R::fields() {
            let desc = layout_of(field.semantic, settings)?;
            let (datatype, width) = match field.shape {
                FieldShape::FixedString(len) if field.semantic == SemanticType::String => (
                    Datatype::fixed_string(len as u32, desc.charset, desc.padding),
                    len,
                ),
                FieldShape::FixedString(_) => {
                    return Err(Error::UnsupportedType(format!(
                        "field `{}` has a string length but is not a string",
                        field.name
                    )))
                }
                _ if desc.variable_length => {
                    return Err(Error::UnsupportedType(format!(
                        "variable-length field `{}` in a record",
                        field.name
                    )))
                }
                FieldShape::Scalar => (desc.datatype.clone(), desc.binary_width),
                FieldShape::Array(n) => (
                    Datatype::Array {
                        base_type: Box::new(desc.datatype.clone()),
                        dimensions: vec![n as u32],
                    },
                    n * desc.binary_width,
                ),
            };
            members.push(CompoundMember {
                name: field.name.to_string(),
                byte_offset: offset as u64,
                datatype,
            });
            fields.push(ResolvedField {
                field: *field,
                desc,
                offset,
                width,
            });
            offset += width;
        }
        Ok(RecordLayout {
            fields,
            size: offset,
            datatype: Datatype::Compound {
                size: offset as u32,
                members,
            },
        })
    }

    /// Bytes per record.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The compound datatype of a record.
    pub fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    /// Encode records back to back.
    pub fn encode<R: H5Record>(&self, records: &[R]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(records.len() * self.size);
        for record in records {
            let start = out.len();
            let mut encoder = RecordEncoder {
                layout: self,
                next: 0,
                out: &mut out,
            };
            record.encode_fields(&mut encoder)?;
            if out.len() - start != self.size {
                return Err(Error::Conversion {
                    name: "record".into(),
                    reason: format!("encoded {} bytes, layout has {}", out.len() - start, self.size),
                });
            }
        }
        Ok(out)
    }

    /// Decode every record in a buffer.
    pub fn decode<R: H5Record>(&self, bytes: &[u8]) -> Result<Vec<R>> {
        if self.size == 0 || bytes.len() % self.size != 0 {
            return Err(Error::Conversion {
                name: "record".into(),
                reason: format!("{} bytes is not a whole number of {}-byte records", bytes.len(), self.size),
            });
        }
        bytes
            .chunks_exact(self.size)
            .map(|record| {
                R::decode_fields(&mut RecordDecoder {
                    layout: self,
                    next: 0,
                    record,
                })
            })
            .collect()
    }
}

/// Field sink handed to [`H5Record::encode_fields`]. Fields must be
/// written in declaration order.
pub struct RecordEncoder<'a> {
    layout: &'a RecordLayout,
    next: usize,
    out: &'a mut Vec<u8>,
}

impl RecordEncoder<'_> {
    fn advance(&mut self) -> Result<ResolvedField> {
        let field = self.layout.fields.get(self.next).cloned().ok_or_else(|| Error::Conversion {
            name: "record".into(),
            reason: "more fields encoded than declared".into(),
        })?;
        self.next += 1;
        Ok(field)
    }

    pub fn scalar<T: H5Scalar>(&mut self, value: &T) -> Result<()> {
        let field = self.advance()?;
        value.encode_into(&field.desc, self.out)
    }

    pub fn array<T: H5Scalar, const N: usize>(&mut self, values: &[T; N]) -> Result<()> {
        let field = self.advance()?;
        for value in values {
            value.encode_into(&field.desc, self.out)?;
        }
        Ok(())
    }

    pub fn fixed_string(&mut self, value: &str) -> Result<()> {
        let field = self.advance()?;
        self.out.extend_from_slice(&encode_fixed(
            value,
            field.width,
            field.desc.charset,
            field.desc.padding,
        ));
        Ok(())
    }
}

/// Field source handed to [`H5Record::decode_fields`].
pub struct RecordDecoder<'a> {
    layout: &'a RecordLayout,
    next: usize,
    record: &'a [u8],
}

impl<'a> RecordDecoder<'a> {
    fn advance(&mut self) -> Result<(&'a ResolvedField, &'a [u8])> {
        let layout: &'a RecordLayout = self.layout;
        let record: &'a [u8] = self.record;
        let field = layout.fields.get(self.next).ok_or_else(|| Error::Conversion {
            name: "record".into(),
            reason: "more fields decoded than declared".into(),
        })?;
        self.next += 1;
        Ok((field, &record[field.offset..field.offset + field.width]))
    }

    pub fn scalar<T: H5Scalar>(&mut self) -> Result<T> {
        let (field, bytes) = self.advance()?;
        T::decode_from(bytes, &field.desc)
    }

    pub fn array<T: H5Scalar, const N: usize>(&mut self) -> Result<[T; N]> {
        let (field, bytes) = self.advance()?;
        let width = field.desc.binary_width;
        let values = bytes
            .chunks_exact(width)
            .map(|b| T::decode_from(b, &field.desc))
            .collect::<Result<Vec<T>>>()?;
        values.try_into().map_err(|v: Vec<T>| Error::Conversion {
            name: field.field.name.to_string(),
            reason: format!("expected {N} elements, found {}", v.len()),
        })
    }

    pub fn fixed_string(&mut self) -> Result<String> {
        let (field, bytes) = self.advance()?;
        Ok(decode_padded(bytes, field.desc.padding))
    }
}
