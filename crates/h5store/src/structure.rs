//! Enumeration of a container's groups and datasets, with attribute values.

use byteorder::{ByteOrder, LittleEndian};
use h5store_format::{Container, Datatype, DataspaceType, Hid, SlotKind};
use serde::Serialize;

use crate::codec::AttributeCodec;
use crate::error::{Error, Result};
use crate::handle::HandleGuard;
use crate::settings::Settings;

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    I64Array(Vec<i64>),
    U64Array(Vec<u64>),
    F64Array(Vec<f64>),
    StringArray(Vec<String>),
    /// A layout with no decoded form; holds the datatype class.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeEntry {
    pub name: String,
    pub value: AttrValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Group,
    Dataset,
}

/// A group or dataset in the container tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub name: String,
    /// Absolute path.
    pub path: String,
    pub kind: ElementKind,
    pub attributes: Vec<AttributeEntry>,
    /// Empty in flat listings and for datasets.
    pub children: Vec<Element>,
}

fn class_name(datatype: &Datatype) -> &'static str {
    match datatype {
        Datatype::FixedPoint { .. } => "fixed_point",
        Datatype::FloatingPoint { .. } => "floating_point",
        Datatype::String { .. } => "string",
        Datatype::Compound { .. } => "compound",
        Datatype::VariableLength { .. } => "variable_length",
        Datatype::Array { .. } => "array",
    }
}

fn widen_signed(bytes: &[u8]) -> i64 {
    match bytes.len() {
        1 => i64::from(bytes[0] as i8),
        2 => i64::from(LittleEndian::read_i16(bytes)),
        4 => i64::from(LittleEndian::read_i32(bytes)),
        _ => LittleEndian::read_i64(bytes),
    }
}

fn widen_unsigned(bytes: &[u8]) -> u64 {
    match bytes.len() {
        1 => u64::from(bytes[0]),
        2 => u64::from(LittleEndian::read_u16(bytes)),
        4 => u64::from(LittleEndian::read_u32(bytes)),
        _ => LittleEndian::read_u64(bytes),
    }
}

fn widen_float(bytes: &[u8]) -> f64 {
    match bytes.len() {
        4 => f64::from(LittleEndian::read_f32(bytes)),
        _ => LittleEndian::read_f64(bytes),
    }
}

/// Decode the attribute `name` of `owner` into an [`AttrValue`].
///
/// Integers widen to 64 bits and floats to `f64`; scalar dataspaces give
/// scalar values.
pub fn read_attribute_value(
    container: &Container,
    settings: &Settings,
    owner: Hid,
    name: &str,
) -> Result<AttrValue> {
    let attr = HandleGuard::wrap(container, container.open_attribute(owner, name))?;
    let datatype = container.datatype(attr.hid())?;
    let scalar = container.dataspace(attr.hid())?.space_type == DataspaceType::Scalar;

    let value = match &datatype {
        Datatype::FixedPoint { size, signed, .. } if matches!(*size, 1 | 2 | 4 | 8) => {
            let raw = container.read_raw(attr.hid(), None)?;
            let cells = raw.chunks_exact(*size as usize);
            match (*signed, scalar) {
                (true, true) => AttrValue::I64(cells.map(widen_signed).next().unwrap_or_default()),
                (true, false) => AttrValue::I64Array(cells.map(widen_signed).collect()),
                (false, true) => AttrValue::U64(cells.map(widen_unsigned).next().unwrap_or_default()),
                (false, false) => AttrValue::U64Array(cells.map(widen_unsigned).collect()),
            }
        }
        Datatype::FloatingPoint { size, .. } if matches!(*size, 4 | 8) => {
            let raw = container.read_raw(attr.hid(), None)?;
            let cells = raw.chunks_exact(*size as usize);
            if scalar {
                AttrValue::F64(cells.map(widen_float).next().unwrap_or_default())
            } else {
                AttrValue::F64Array(cells.map(widen_float).collect())
            }
        }
        Datatype::String { .. } | Datatype::VariableLength { is_string: true, .. } => {
            drop(attr);
            // `name` is a stored name already.
            let verbatim = Settings {
                lower_case_naming: false,
                ..settings.clone()
            };
            let strings = AttributeCodec::new(container, &verbatim)
                .read_strings(owner, name, None, true)?
                .into_value();
            if scalar {
                AttrValue::String(strings.into_iter().next().unwrap_or_default())
            } else {
                AttrValue::StringArray(strings)
            }
        }
        other => AttrValue::Other(class_name(other).to_string()),
    };
    Ok(value)
}

/// Write an [`AttrValue`] as the attribute `name` of `owner`.
pub fn write_attribute_value(
    container: &Container,
    settings: &Settings,
    owner: Hid,
    name: &str,
    value: &AttrValue,
) -> Result<()> {
    let codec = AttributeCodec::new(container, settings);
    match value {
        AttrValue::I64(v) => codec.write_scalar(owner, name, v),
        AttrValue::U64(v) => codec.write_scalar(owner, name, v),
        AttrValue::F64(v) => codec.write_scalar(owner, name, v),
        AttrValue::String(v) => codec.write_string(owner, name, v),
        AttrValue::I64Array(v) => codec.write_array(owner, name, v),
        AttrValue::U64Array(v) => codec.write_array(owner, name, v),
        AttrValue::F64Array(v) => codec.write_array(owner, name, v),
        AttrValue::StringArray(v) => codec.write_strings(owner, name, v),
        AttrValue::Other(class) => Err(Error::UnsupportedType(class.clone())),
    }
}

/// Every attribute of a group or dataset, in name order.
pub fn read_attributes(container: &Container, settings: &Settings, owner: Hid) -> Result<Vec<AttributeEntry>> {
    container
        .attribute_names(owner)?
        .into_iter()
        .map(|name| {
            let value = read_attribute_value(container, settings, owner, &name)?;
            Ok(AttributeEntry { name, value })
        })
        .collect()
}

fn element(
    container: &Container,
    settings: &Settings,
    hid: Hid,
    name: &str,
    kind: ElementKind,
    with_attributes: bool,
) -> Result<Element> {
    Ok(Element {
        name: name.to_string(),
        path: container.path_of(hid)?,
        kind,
        attributes: if with_attributes {
            read_attributes(container, settings, hid)?
        } else {
            Vec::new()
        },
        children: Vec::new(),
    })
}

fn open_child<'c>(container: &'c Container, group: Hid, name: &str, kind: SlotKind) -> Result<HandleGuard<'c>> {
    let hid = match kind {
        SlotKind::Dataset => container.open_dataset(group, name),
        _ => container.open_group(group, name),
    };
    Ok(HandleGuard::wrap(container, hid)?)
}

fn walk_tree(
    container: &Container,
    settings: &Settings,
    group: Hid,
    name: &str,
    with_attributes: bool,
) -> Result<Element> {
    let mut node = element(container, settings, group, name, ElementKind::Group, with_attributes)?;
    for (child_name, kind) in container.children(group)? {
        let child = open_child(container, group, &child_name, kind)?;
        node.children.push(match kind {
            SlotKind::Dataset => element(
                container,
                settings,
                child.hid(),
                &child_name,
                ElementKind::Dataset,
                with_attributes,
            )?,
            _ => walk_tree(container, settings, child.hid(), &child_name, with_attributes)?,
        });
    }
    Ok(node)
}

fn walk_flat(
    container: &Container,
    settings: &Settings,
    group: Hid,
    with_attributes: bool,
    out: &mut Vec<Element>,
) -> Result<()> {
    for (child_name, kind) in container.children(group)? {
        let child = open_child(container, group, &child_name, kind)?;
        match kind {
            SlotKind::Dataset => out.push(element(
                container,
                settings,
                child.hid(),
                &child_name,
                ElementKind::Dataset,
                with_attributes,
            )?),
            _ => {
                out.push(element(
                    container,
                    settings,
                    child.hid(),
                    &child_name,
                    ElementKind::Group,
                    with_attributes,
                )?);
                walk_flat(container, settings, child.hid(), with_attributes, out)?;
            }
        }
    }
    Ok(())
}

/// The whole container as a tree rooted at `/`.
pub fn read_tree(container: &Container, settings: &Settings, with_attributes: bool) -> Result<Element> {
    let root = HandleGuard::wrap(container, container.open_root())?;
    walk_tree(container, settings, root.hid(), "/", with_attributes)
}

/// Every group and dataset, root first, parents before their children.
pub fn read_flat(container: &Container, settings: &Settings, with_attributes: bool) -> Result<Vec<Element>> {
    let root = HandleGuard::wrap(container, container.open_root())?;
    let mut out = vec![element(container, settings, root.hid(), "/", ElementKind::Group, with_attributes)?];
    walk_flat(container, settings, root.hid(), with_attributes, &mut out)?;
    Ok(out)
}
