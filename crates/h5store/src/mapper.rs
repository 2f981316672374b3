//! Whole-object persistence driven by a per-type member policy.
//!
//! `#[derive(H5Object)]` builds a static [`MemberPolicy`] for a struct and
//! implements [`H5Object`] so that [`write_object`] and [`read_object`] can
//! walk its members. Each member has a [`Direction`] and a [`Storage`]:
//! values go through [`AttributeCodec`] or [`DatasetCodec`], and composite
//! members recurse into a nested group named after the member.

use std::borrow::Cow;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use h5store_format::{Container, Hid, SlotKind};
use tracing::{debug, error, warn};

use crate::codec::{AttributeCodec, DatasetCodec, SlotAccess, SlotCodec};
use crate::error::{Error, Result};
use crate::groups::{create_group_recursively, open_group_path};
use crate::layout::H5Scalar;
use crate::naming::normalize;
use crate::settings::{Outcome, Settings};

/// Which way a member travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    ReadWrite,
    /// Populated on read, never written.
    ReadOnly,
    /// Written, never populated on read.
    WriteOnly,
    /// Never touches the container.
    Skip,
}

impl Direction {
    pub fn reads(self) -> bool {
        matches!(self, Direction::ReadWrite | Direction::ReadOnly)
    }

    pub fn writes(self) -> bool {
        matches!(self, Direction::ReadWrite | Direction::WriteOnly)
    }
}

/// Where a member lives relative to the object's group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    #[default]
    Attribute,
    Dataset,
    /// A nested object in a child group.
    Group,
}

impl Storage {
    /// Attributes and links are separate namespaces.
    fn namespace(self) -> SlotKind {
        match self {
            Storage::Attribute => SlotKind::Attribute,
            Storage::Dataset | Storage::Group => SlotKind::Dataset,
        }
    }
}

/// One declared member of a mapped type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberDescriptor {
    /// The field name.
    pub canonical: &'static str,
    /// Name override from `#[h5(name = "...")]`.
    pub rename: Option<&'static str>,
    /// Older name tried when the slot is missing.
    pub fallback: Option<&'static str>,
    pub direction: Direction,
    pub storage: Storage,
    pub mandatory: bool,
}

impl MemberDescriptor {
    /// Name before case normalization.
    pub fn slot_name(&self) -> &'static str {
        self.rename.unwrap_or(self.canonical)
    }
}

/// The member table of one type, built once per type.
#[derive(Debug)]
pub struct MemberPolicy {
    type_name: &'static str,
    members: &'static [MemberDescriptor],
    /// First colliding pair per naming mode (plain, lower-cased), found on
    /// first use.
    collisions: [OnceLock<Option<(usize, usize)>>; 2],
}

impl MemberPolicy {
    pub const fn new(type_name: &'static str, members: &'static [MemberDescriptor]) -> Self {
        MemberPolicy {
            type_name,
            members,
            collisions: [OnceLock::new(), OnceLock::new()],
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn members(&self) -> &'static [MemberDescriptor] {
        self.members
    }

    pub fn member(&self, index: usize) -> &'static MemberDescriptor {
        &self.members[index]
    }

    /// On-disk name of a member under the naming policy.
    pub fn effective_name(&self, index: usize, settings: &Settings) -> Cow<'static, str> {
        normalize(self.members[index].slot_name(), settings)
    }

    fn find_collision(&self, settings: &Settings) -> Option<(usize, usize)> {
        let active = |m: &MemberDescriptor| m.direction != Direction::Skip;
        for (ai, a) in self.members.iter().enumerate().filter(|(_, m)| active(m)) {
            for (bi, b) in self.members.iter().enumerate().skip(ai + 1).filter(|(_, m)| active(m)) {
                if a.storage.namespace() != b.storage.namespace() {
                    continue;
                }
                let shared = (a.direction.reads() && b.direction.reads())
                    || (a.direction.writes() && b.direction.writes());
                if shared && self.effective_name(ai, settings) == self.effective_name(bi, settings) {
                    return Some((ai, bi));
                }
            }
        }
        None
    }

    /// Reject two members that share an on-disk slot in a shared direction.
    ///
    /// A write-only and a read-only member may share a slot; two writers or
    /// two readers may not. The check runs once per naming mode.
    pub fn validate(&self, settings: &Settings) -> Result<()> {
        let mode = usize::from(settings.lower_case_naming);
        let Some((ai, bi)) = *self.collisions[mode].get_or_init(|| self.find_collision(settings)) else {
            return Ok(());
        };
        let (a, b) = (&self.members[ai], &self.members[bi]);
        let name = self.effective_name(ai, settings);
        error!(
            type_name = self.type_name,
            first = a.canonical,
            second = b.canonical,
            slot = %name,
            "members collide"
        );
        Err(Error::MemberCollision {
            type_name: self.type_name,
            first: a.canonical,
            second: b.canonical,
            slot: name.into_owned(),
        })
    }
}

/// A type whose members map to slots. Usually derived.
pub trait H5Object: Default {
    fn policy() -> &'static MemberPolicy;

    /// Write every member whose direction writes.
    fn write_members(&self, writer: &mut ObjectWriter<'_>) -> Result<()>;

    /// Populate every member whose direction reads.
    fn read_members(&mut self, reader: &mut ObjectReader<'_>) -> Result<()>;
}

/// A member value that maps to one attribute or dataset slot.
pub trait H5Value: Sized {
    fn write_to<R: SlotAccess>(&self, codec: &SlotCodec<'_, R>, parent: Hid, name: &str) -> Result<()>;

    fn read_from<R: SlotAccess>(
        codec: &SlotCodec<'_, R>,
        parent: Hid,
        name: &str,
        fallback: Option<&str>,
        mandatory: bool,
    ) -> Result<Outcome<Self>>;
}

macro_rules! impl_scalar_value {
    ($($ty:ty),* $(,)?) => {$(
        impl H5Value for $ty {
            fn write_to<R: SlotAccess>(&self, codec: &SlotCodec<'_, R>, parent: Hid, name: &str) -> Result<()> {
                codec.write_scalar(parent, name, self)
            }

            fn read_from<R: SlotAccess>(
                codec: &SlotCodec<'_, R>,
                parent: Hid,
                name: &str,
                fallback: Option<&str>,
                mandatory: bool,
            ) -> Result<Outcome<Self>> {
                codec.read_scalar(parent, name, fallback, mandatory)
            }
        }

        impl H5Value for Vec<$ty> {
            fn write_to<R: SlotAccess>(&self, codec: &SlotCodec<'_, R>, parent: Hid, name: &str) -> Result<()> {
                codec.write_array(parent, name, self)
            }

            fn read_from<R: SlotAccess>(
                codec: &SlotCodec<'_, R>,
                parent: Hid,
                name: &str,
                fallback: Option<&str>,
                mandatory: bool,
            ) -> Result<Outcome<Self>> {
                codec.read_array(parent, name, fallback, mandatory)
            }
        }
    )*};
}

impl_scalar_value!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool, DateTime<Utc>);

/// Unsupported scalars fail when written or read, naming the type.
macro_rules! impl_unsupported_value {
    ($($ty:ty),*) => {$(
        impl H5Value for $ty {
            fn write_to<R: SlotAccess>(&self, codec: &SlotCodec<'_, R>, parent: Hid, name: &str) -> Result<()> {
                codec.write_scalar(parent, name, self)
            }

            fn read_from<R: SlotAccess>(
                codec: &SlotCodec<'_, R>,
                parent: Hid,
                name: &str,
                fallback: Option<&str>,
                mandatory: bool,
            ) -> Result<Outcome<Self>> {
                crate::layout::layout_of(<$ty as H5Scalar>::SEMANTIC, codec.settings())?;
                codec.read_scalar(parent, name, fallback, mandatory)
            }
        }
    )*};
}

impl_unsupported_value!(char, i128, u128);

impl H5Value for String {
    fn write_to<R: SlotAccess>(&self, codec: &SlotCodec<'_, R>, parent: Hid, name: &str) -> Result<()> {
        codec.write_string(parent, name, self)
    }

    fn read_from<R: SlotAccess>(
        codec: &SlotCodec<'_, R>,
        parent: Hid,
        name: &str,
        fallback: Option<&str>,
        mandatory: bool,
    ) -> Result<Outcome<Self>> {
        codec.read_string(parent, name, fallback, mandatory)
    }
}

impl H5Value for Vec<String> {
    fn write_to<R: SlotAccess>(&self, codec: &SlotCodec<'_, R>, parent: Hid, name: &str) -> Result<()> {
        codec.write_strings(parent, name, self)
    }

    fn read_from<R: SlotAccess>(
        codec: &SlotCodec<'_, R>,
        parent: Hid,
        name: &str,
        fallback: Option<&str>,
        mandatory: bool,
    ) -> Result<Outcome<Self>> {
        codec.read_strings(parent, name, fallback, mandatory)
    }
}

/// Member sink handed to [`H5Object::write_members`].
pub struct ObjectWriter<'a> {
    container: &'a Container,
    settings: &'a Settings,
    group: Hid,
    policy: &'static MemberPolicy,
}

impl<'a> ObjectWriter<'a> {
    /// Write a value member.
    pub fn value<V: H5Value>(&mut self, index: usize, value: &V) -> Result<()> {
        let member = self.policy.member(index);
        let name = member.slot_name();
        match member.storage {
            Storage::Attribute => {
                value.write_to(&AttributeCodec::new(self.container, self.settings), self.group, name)
            }
            Storage::Dataset => {
                value.write_to(&DatasetCodec::new(self.container, self.settings), self.group, name)
            }
            Storage::Group => Err(Error::UnsupportedType(format!(
                "{}::{} is stored as a group but is not an object",
                self.policy.type_name(),
                member.canonical
            ))),
        }
    }

    /// Write a composite member into a child group.
    pub fn object<O: H5Object>(&mut self, index: usize, value: &O) -> Result<()> {
        let name = self.policy.member(index).slot_name();
        write_object(self.container, self.settings, self.group, name, value)
    }
}

/// Member source handed to [`H5Object::read_members`].
pub struct ObjectReader<'a> {
    container: &'a Container,
    settings: &'a Settings,
    group: Hid,
    policy: &'static MemberPolicy,
}

impl<'a> ObjectReader<'a> {
    /// Populate a value member. A missing optional member keeps its value.
    pub fn value<V: H5Value>(&mut self, index: usize, slot: &mut V) -> Result<()> {
        let member = self.policy.member(index);
        let name = member.slot_name();
        let outcome = match member.storage {
            Storage::Attribute => V::read_from(
                &AttributeCodec::new(self.container, self.settings),
                self.group,
                name,
                member.fallback,
                member.mandatory,
            )?,
            Storage::Dataset => V::read_from(
                &DatasetCodec::new(self.container, self.settings),
                self.group,
                name,
                member.fallback,
                member.mandatory,
            )?,
            Storage::Group => {
                return Err(Error::UnsupportedType(format!(
                    "{}::{} is stored as a group but is not an object",
                    self.policy.type_name(),
                    member.canonical
                )))
            }
        };
        if outcome.success {
            *slot = outcome.value;
        }
        Ok(())
    }

    /// Populate a composite member from its child group.
    pub fn object<O: H5Object>(&mut self, index: usize, slot: &mut O) -> Result<()> {
        let member = self.policy.member(index);
        let name = member.slot_name();
        match open_group_path(self.container, self.settings, self.group, name)? {
            Some(group) => read_members_of(self.container, self.settings, group.hid(), slot),
            None if member.mandatory || self.settings.throw_on_missing_name => {
                error!(group = name, "mandatory group not found");
                Err(Error::SlotNotFound {
                    name: normalize(name, self.settings).into_owned(),
                    fallback: None,
                })
            }
            None => {
                warn!(group = name, "group not found, using default");
                Ok(())
            }
        }
    }
}

/// Write every writable member of `value` into the group at `path` under
/// `parent`, creating missing groups on the way.
pub fn write_object<T: H5Object>(
    container: &Container,
    settings: &Settings,
    parent: Hid,
    path: &str,
    value: &T,
) -> Result<()> {
    let policy = T::policy();
    policy.validate(settings)?;
    let group = create_group_recursively(container, settings, parent, path)?;
    debug!(type_name = policy.type_name(), path, "writing object");
    let mut writer = ObjectWriter {
        container,
        settings,
        group: group.hid(),
        policy,
    };
    value.write_members(&mut writer)
}

/// Read a default-constructed `T` from the group at `path` under `parent`.
pub fn read_object<T: H5Object>(
    container: &Container,
    settings: &Settings,
    parent: Hid,
    path: &str,
) -> Result<T> {
    let mut value = T::default();
    read_object_into(container, settings, parent, path, &mut value)?;
    Ok(value)
}

/// Populate the readable members of an existing instance.
pub fn read_object_into<T: H5Object>(
    container: &Container,
    settings: &Settings,
    parent: Hid,
    path: &str,
    value: &mut T,
) -> Result<()> {
    match open_group_path(container, settings, parent, path)? {
        Some(group) => read_members_of(container, settings, group.hid(), value),
        None => {
            error!(path, "object group not found");
            Err(Error::SlotNotFound {
                name: path.to_string(),
                fallback: None,
            })
        }
    }
}

fn read_members_of<T: H5Object>(
    container: &Container,
    settings: &Settings,
    group: Hid,
    value: &mut T,
) -> Result<()> {
    let policy = T::policy();
    policy.validate(settings)?;
    let mut reader = ObjectReader {
        container,
        settings,
        group,
        policy,
    };
    value.read_members(&mut reader)
}
