//! File-level entry points.
//!
//! [`H5File`] pairs a [`Container`] with the [`Settings`] every call uses.
//! The `*_by_path` functions open a file, do one thing, and close it again;
//! they never fail, reporting problems through [`Outcome`] instead.

use std::path::Path;

use h5store_format::{Container, SlotKind};
use tracing::{debug, error};

use crate::chunked::ChunkedAppendStore;
use crate::codec::{AttributeCodec, DatasetCodec};
use crate::error::{Error, Result};
use crate::groups;
use crate::handle::HandleGuard;
use crate::mapper::{self, H5Object};
use crate::record::H5Record;
use crate::settings::{Outcome, Settings};
use crate::structure::{self, AttrValue, AttributeEntry, Element};

/// An open container and its settings.
#[derive(Debug)]
pub struct H5File {
    container: Container,
    settings: Settings,
}

impl H5File {
    /// Create (or truncate) a file.
    pub fn create(path: impl AsRef<Path>, settings: Settings) -> Result<Self> {
        let path = path.as_ref();
        let container = Container::create(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "cannot create file");
            Error::Creation {
                name: path.display().to_string(),
                kind: "file",
                reason: e.to_string(),
            }
        })?;
        debug!(path = %path.display(), "created file");
        Ok(H5File { container, settings })
    }

    /// Open an existing file.
    pub fn open(path: impl AsRef<Path>, read_only: bool, settings: Settings) -> Result<Self> {
        let path = path.as_ref();
        let container = Container::open(path, read_only).map_err(|e| {
            error!(path = %path.display(), error = %e, "cannot open file");
            e
        })?;
        debug!(path = %path.display(), read_only, "opened file");
        Ok(H5File { container, settings })
    }

    /// A file that lives only in memory.
    pub fn in_memory(settings: Settings) -> Self {
        H5File {
            container: Container::in_memory(),
            settings,
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings used by later calls.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn root(&self) -> Result<HandleGuard<'_>> {
        Ok(HandleGuard::wrap(&self.container, self.container.open_root())?)
    }

    pub fn attributes(&self) -> AttributeCodec<'_> {
        AttributeCodec::new(&self.container, &self.settings)
    }

    pub fn datasets(&self) -> DatasetCodec<'_> {
        DatasetCodec::new(&self.container, &self.settings)
    }

    /// Write an object into the group at `path`.
    pub fn write_object<T: H5Object>(&self, path: &str, value: &T) -> Result<()> {
        let root = self.root()?;
        mapper::write_object(&self.container, &self.settings, root.hid(), path, value)
    }

    /// Read an object from the group at `path`.
    pub fn read_object<T: H5Object>(&self, path: &str) -> Result<T> {
        let root = self.root()?;
        mapper::read_object(&self.container, &self.settings, root.hid(), path)
    }

    pub fn create_group_recursively(&self, path: &str) -> Result<HandleGuard<'_>> {
        let root = self.root()?;
        groups::create_group_recursively(&self.container, &self.settings, root.hid(), path)
    }

    /// Open the group at `path`; a missing group is [`Error::SlotNotFound`].
    pub fn open_group(&self, path: &str) -> Result<HandleGuard<'_>> {
        let root = self.root()?;
        groups::open_group_path(&self.container, &self.settings, root.hid(), path)?.ok_or_else(|| {
            Error::SlotNotFound {
                name: path.to_string(),
                fallback: None,
            }
        })
    }

    pub fn item_exists(&self, path: &str, kind: SlotKind) -> Result<bool> {
        let root = self.root()?;
        groups::item_exists(&self.container, &self.settings, root.hid(), path, kind)
    }

    /// A new append store for `group_path/name`.
    pub fn append_store<R: H5Record>(&self, group_path: &str, name: &str) -> Result<ChunkedAppendStore<'_, R>> {
        ChunkedAppendStore::new(&self.container, &self.settings, group_path, name)
    }

    /// Resume appending to an existing growable dataset.
    pub fn open_append_store<R: H5Record>(
        &self,
        group_path: &str,
        name: &str,
    ) -> Result<ChunkedAppendStore<'_, R>> {
        ChunkedAppendStore::open_existing(&self.container, &self.settings, group_path, name)
    }

    pub fn read_tree(&self, with_attributes: bool) -> Result<Element> {
        structure::read_tree(&self.container, &self.settings, with_attributes)
    }

    pub fn read_flat(&self, with_attributes: bool) -> Result<Vec<Element>> {
        structure::read_flat(&self.container, &self.settings, with_attributes)
    }

    pub fn flush(&self) -> Result<()> {
        Ok(self.container.flush()?)
    }

    /// Flush and close, compacting a file that is mostly superseded blocks.
    pub fn close(self) -> Result<()> {
        Ok(self.container.close_file()?)
    }
}

fn settle_quietly<T: Default>(context: &str, result: Result<T>) -> Outcome<T> {
    match result {
        Ok(value) => Outcome::ok(value),
        Err(e) => {
            error!(%context, error = %e, "by-path operation failed");
            Outcome::failed()
        }
    }
}

fn with_group<T>(
    file: &Path,
    read_only: bool,
    group_path: &str,
    settings: &Settings,
    f: impl FnOnce(&H5File, &HandleGuard<'_>) -> Result<T>,
) -> Result<T> {
    let h5 = H5File::open(file, read_only, settings.clone())?;
    let result = {
        let group = if read_only {
            h5.open_group(group_path)?
        } else {
            h5.create_group_recursively(group_path)?
        };
        f(&h5, &group)
    };
    let closed = h5.close();
    let value = result?;
    closed?;
    Ok(value)
}

/// Read one attribute of the group at `group_path` in `file`.
pub fn read_attribute_by_path(file: impl AsRef<Path>, group_path: &str, name: &str, settings: &Settings) -> Outcome<AttrValue> {
    let result = with_group(file.as_ref(), true, group_path, settings, |h5, group| {
        let name = crate::naming::normalize(name, h5.settings());
        structure::read_attribute_value(h5.container(), h5.settings(), group.hid(), &name)
    });
    match result {
        Ok(value) => Outcome::ok(value),
        Err(e) => {
            error!(group = group_path, attribute = name, error = %e, "cannot read attribute by path");
            Outcome {
                success: false,
                value: AttrValue::Other(String::new()),
            }
        }
    }
}

/// Read every attribute of the group at `group_path` in `file`.
pub fn read_attributes_by_path(file: impl AsRef<Path>, group_path: &str, settings: &Settings) -> Outcome<Vec<AttributeEntry>> {
    settle_quietly(
        "read_attributes_by_path",
        with_group(file.as_ref(), true, group_path, settings, |h5, group| {
            structure::read_attributes(h5.container(), h5.settings(), group.hid())
        }),
    )
}

/// Write one attribute on the group at `group_path`, creating the group
/// when needed.
pub fn write_attribute_by_path(
    file: impl AsRef<Path>,
    group_path: &str,
    name: &str,
    value: &AttrValue,
    settings: &Settings,
) -> Outcome<()> {
    settle_quietly(
        "write_attribute_by_path",
        with_group(file.as_ref(), false, group_path, settings, |h5, group| {
            structure::write_attribute_value(h5.container(), h5.settings(), group.hid(), name, value)
        }),
    )
}

/// Write several attributes on the group at `group_path`. Attributes
/// written before a failure stay written.
pub fn write_attributes_by_path(
    file: impl AsRef<Path>,
    group_path: &str,
    entries: &[AttributeEntry],
    settings: &Settings,
) -> Outcome<()> {
    settle_quietly(
        "write_attributes_by_path",
        with_group(file.as_ref(), false, group_path, settings, |h5, group| {
            entries.iter().try_for_each(|entry| {
                structure::write_attribute_value(h5.container(), h5.settings(), group.hid(), &entry.name, &entry.value)
            })
        }),
    )
}
