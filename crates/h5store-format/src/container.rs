//! The container runtime: a hierarchical store of groups, datasets and
//! attributes addressed through integer handles.
//!
//! Every object, dataspace and datatype the caller touches is reached through
//! a [`Hid`]. Handles stay valid until [`Container::close`] releases them;
//! [`Container::open_handle_count`] reports how many are outstanding.
//!
//! ```ignore
//! use h5store_format::{Container, Datatype, Dataspace, DatasetCreateProps};
//!
//! let c = Container::create("data.h5s")?;
//! let root = c.open_root()?;
//! let ds = c.create_dataset(root, "values", &Datatype::fixed(4, true),
//!     &Dataspace::simple(&[3]), &DatasetCreateProps::new())?;
//! c.write_raw(ds, None, &[1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0])?;
//! c.close(ds)?;
//! c.close(root)?;
//! c.close_file()?;
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::image::{decode_tree, encode_tree, Superblock, SUPERBLOCK_SIZE};
use crate::node::{join_path, AttributeNode, Block, DatasetNode, GroupNode, Layout, Node};
use crate::property_list::DatasetCreateProps;
use crate::selection::Selection;
use crate::vl;

/// Handle to an open object, dataspace or datatype.
pub type Hid = u64;

/// Kind of named slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Group,
    Dataset,
    Attribute,
}

#[derive(Debug, Clone)]
enum Handle {
    Group(String),
    Dataset(String),
    Attribute { owner: String, name: String },
    Space { space: Dataspace, selection: Selection },
    Type(Datatype),
}

struct Inner {
    root: GroupNode,
    handles: HashMap<Hid, Handle>,
    next_hid: Hid,
    file: Option<File>,
    eof: u64,
    modified: bool,
}

/// A container file (or an in-memory container).
///
/// The container is single-threaded: methods take `&self` and mutate
/// through interior state, so several handles and guards may borrow the
/// same container at once.
pub struct Container {
    inner: RefCell<Inner>,
    path: Option<PathBuf>,
    read_only: bool,
}

/// Names are stored with a 16-bit length prefix.
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

fn validate_name(name: &str) -> Result<(), FormatError> {
    if name.is_empty() || name.contains('/') || name == "." || name.len() > MAX_NAME_LEN {
        Err(FormatError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

fn wrong_kind(handle: Hid, expected: &'static str) -> FormatError {
    FormatError::WrongHandleKind { handle, expected }
}

fn attr_path(owner: &str, name: &str) -> String {
    format!("{owner}@{name}")
}

/// Rows of a contiguous buffer.
fn slice_rows(data: &[u8], rows: Range<u64>, row_bytes: usize) -> &[u8] {
    &data[rows.start as usize * row_bytes..rows.end as usize * row_bytes]
}

fn attribute_row_bytes(attr: &AttributeNode) -> usize {
    let trailing: u64 = attr.dataspace.dimensions.iter().skip(1).product();
    trailing as usize * attr.datatype.type_size() as usize
}

impl Inner {
    fn empty(file: Option<File>) -> Self {
        Inner {
            root: GroupNode::default(),
            handles: HashMap::new(),
            next_hid: 1,
            file,
            eof: SUPERBLOCK_SIZE as u64,
            modified: true,
        }
    }

    fn insert(&mut self, handle: Handle) -> Hid {
        let hid = self.next_hid;
        self.next_hid += 1;
        self.handles.insert(hid, handle);
        hid
    }

    fn get(&self, hid: Hid) -> Result<&Handle, FormatError> {
        self.handles.get(&hid).ok_or(FormatError::InvalidHandle(hid))
    }

    fn group_path(&self, hid: Hid) -> Result<String, FormatError> {
        match self.get(hid)? {
            Handle::Group(path) => Ok(path.clone()),
            _ => Err(wrong_kind(hid, "group")),
        }
    }

    /// Path of a group or dataset (anything that can carry attributes).
    fn object_path(&self, hid: Hid) -> Result<String, FormatError> {
        match self.get(hid)? {
            Handle::Group(path) | Handle::Dataset(path) => Ok(path.clone()),
            _ => Err(wrong_kind(hid, "group or dataset")),
        }
    }

    fn selection(&self, space: Option<Hid>) -> Result<Selection, FormatError> {
        match space {
            None => Ok(Selection::All),
            Some(hid) => match self.get(hid)? {
                Handle::Space { selection, .. } => Ok(selection.clone()),
                _ => Err(wrong_kind(hid, "dataspace")),
            },
        }
    }

    fn attribute(&self, owner: &str, name: &str) -> Result<&AttributeNode, FormatError> {
        self.root
            .attrs(owner)?
            .get(name)
            .ok_or_else(|| FormatError::NotFound(attr_path(owner, name)))
    }

    fn attribute_mut(&mut self, owner: &str, name: &str) -> Result<&mut AttributeNode, FormatError> {
        self.root
            .attrs_mut(owner)?
            .get_mut(name)
            .ok_or_else(|| FormatError::NotFound(attr_path(owner, name)))
    }
}

/// Append every dirty block at `eof` and record its new address.
fn persist_blocks(group: &mut GroupNode, file: &mut File, eof: &mut u64) -> Result<(), FormatError> {
    for child in group.children.values_mut() {
        match child {
            Node::Group(g) => persist_blocks(g, file, eof)?,
            Node::Dataset(ds) => {
                let blocks: Vec<_> = match &mut ds.layout {
                    Layout::Contiguous(block) => vec![block],
                    Layout::Chunked { chunks, .. } => chunks.iter_mut().collect(),
                };
                for block in blocks.into_iter().filter(|b| b.dirty) {
                    file.seek(SeekFrom::Start(*eof))?;
                    file.write_all(&block.data)?;
                    block.address = *eof;
                    block.dirty = false;
                    *eof += block.data.len() as u64;
                }
            }
        }
    }
    Ok(())
}

fn for_each_block(group: &mut GroupNode, f: &mut impl FnMut(&mut Block)) {
    for child in group.children.values_mut() {
        match child {
            Node::Group(g) => for_each_block(g, f),
            Node::Dataset(ds) => match &mut ds.layout {
                Layout::Contiguous(block) => f(block),
                Layout::Chunked { chunks, .. } => chunks.iter_mut().for_each(&mut *f),
            },
        }
    }
}

impl Container {
    /// Create a new container file, truncating any existing file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Container, FormatError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let container = Container {
            inner: RefCell::new(Inner::empty(Some(file))),
            path: Some(path.to_path_buf()),
            read_only: false,
        };
        container.flush()?;
        Ok(container)
    }

    /// Open an existing container file.
    ///
    /// The whole image is loaded eagerly. With `read_only` every mutation
    /// fails with [`FormatError::ReadOnly`].
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Container, FormatError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let sb = Superblock::parse(&data)?;
        let start = sb.metadata_address as usize;
        let end = start + sb.metadata_length as usize;
        if end > data.len() {
            return Err(FormatError::UnexpectedEof {
                expected: end,
                available: data.len(),
            });
        }
        let root = decode_tree(&data[start..end], &data)?;
        let file = if read_only {
            None
        } else {
            Some(OpenOptions::new().read(true).write(true).open(path)?)
        };
        Ok(Container {
            inner: RefCell::new(Inner {
                root,
                handles: HashMap::new(),
                next_hid: 1,
                file,
                eof: data.len() as u64,
                modified: false,
            }),
            path: Some(path.to_path_buf()),
            read_only,
        })
    }

    /// A container with no backing file. [`Container::flush`] is a no-op.
    pub fn in_memory() -> Container {
        Container {
            inner: RefCell::new(Inner::empty(None)),
            path: None,
            read_only: false,
        }
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn check_writable(&self) -> Result<(), FormatError> {
        if self.read_only {
            Err(FormatError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Open a handle to the root group.
    pub fn open_root(&self) -> Result<Hid, FormatError> {
        Ok(self.inner.borrow_mut().insert(Handle::Group("/".to_string())))
    }

    /// Absolute path of the object behind a group, dataset or attribute handle.
    pub fn path_of(&self, hid: Hid) -> Result<String, FormatError> {
        let inner = self.inner.borrow();
        match inner.get(hid)? {
            Handle::Group(p) | Handle::Dataset(p) => Ok(p.clone()),
            Handle::Attribute { owner, name } => Ok(attr_path(owner, name)),
            _ => Err(wrong_kind(hid, "object")),
        }
    }

    // ---------------------------------------------------------------
    // Groups and datasets
    // ---------------------------------------------------------------

    /// Create a child group. Fails if any link named `name` already exists.
    pub fn create_group(&self, parent: Hid, name: &str) -> Result<Hid, FormatError> {
        self.check_writable()?;
        validate_name(name)?;
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let parent_path = inner.group_path(parent)?;
        let path = join_path(&parent_path, name);
        let group = inner.root.group_mut(&parent_path)?;
        if group.children.contains_key(name) {
            return Err(FormatError::AlreadyExists(path));
        }
        group
            .children
            .insert(name.to_string(), Node::Group(GroupNode::default()));
        inner.modified = true;
        Ok(inner.insert(Handle::Group(path)))
    }

    pub fn open_group(&self, parent: Hid, name: &str) -> Result<Hid, FormatError> {
        let mut inner = self.inner.borrow_mut();
        let path = join_path(&inner.group_path(parent)?, name);
        inner.root.group(&path)?;
        Ok(inner.insert(Handle::Group(path)))
    }

    /// Open the child group, creating it when absent.
    pub fn create_or_open_group(&self, parent: Hid, name: &str) -> Result<Hid, FormatError> {
        if self.exists(parent, name, SlotKind::Group)? {
            self.open_group(parent, name)
        } else {
            self.create_group(parent, name)
        }
    }

    /// Create a dataset under `parent`, zero-filled to its initial extent.
    pub fn create_dataset(
        &self,
        parent: Hid,
        name: &str,
        datatype: &Datatype,
        dataspace: &Dataspace,
        props: &DatasetCreateProps,
    ) -> Result<Hid, FormatError> {
        self.check_writable()?;
        validate_name(name)?;
        let node = DatasetNode::new(datatype.clone(), dataspace.clone(), props)?;
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let parent_path = inner.group_path(parent)?;
        let path = join_path(&parent_path, name);
        let group = inner.root.group_mut(&parent_path)?;
        if group.children.contains_key(name) {
            return Err(FormatError::AlreadyExists(path));
        }
        group.children.insert(name.to_string(), Node::Dataset(node));
        inner.modified = true;
        Ok(inner.insert(Handle::Dataset(path)))
    }

    pub fn open_dataset(&self, parent: Hid, name: &str) -> Result<Hid, FormatError> {
        let mut inner = self.inner.borrow_mut();
        let path = join_path(&inner.group_path(parent)?, name);
        inner.root.dataset(&path)?;
        Ok(inner.insert(Handle::Dataset(path)))
    }

    // ---------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------

    /// Create an attribute on a group or dataset, zero-filled.
    pub fn create_attribute(
        &self,
        owner: Hid,
        name: &str,
        datatype: &Datatype,
        dataspace: &Dataspace,
    ) -> Result<Hid, FormatError> {
        self.check_writable()?;
        validate_name(name)?;
        let node = AttributeNode::new(datatype.clone(), dataspace.clone())?;
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let owner_path = inner.object_path(owner)?;
        let attrs = inner.root.attrs_mut(&owner_path)?;
        if attrs.contains_key(name) {
            return Err(FormatError::AlreadyExists(attr_path(&owner_path, name)));
        }
        attrs.insert(name.to_string(), node);
        inner.modified = true;
        Ok(inner.insert(Handle::Attribute {
            owner: owner_path,
            name: name.to_string(),
        }))
    }

    pub fn open_attribute(&self, owner: Hid, name: &str) -> Result<Hid, FormatError> {
        let mut inner = self.inner.borrow_mut();
        let owner_path = inner.object_path(owner)?;
        inner.attribute(&owner_path, name)?;
        Ok(inner.insert(Handle::Attribute {
            owner: owner_path,
            name: name.to_string(),
        }))
    }

    // ---------------------------------------------------------------
    // Existence, enumeration, deletion
    // ---------------------------------------------------------------

    /// Whether `parent` holds a slot of the given kind named `name`.
    ///
    /// For [`SlotKind::Attribute`], `parent` may be a group or a dataset.
    pub fn exists(&self, parent: Hid, name: &str, kind: SlotKind) -> Result<bool, FormatError> {
        let inner = self.inner.borrow();
        match kind {
            SlotKind::Attribute => {
                let owner = inner.object_path(parent)?;
                Ok(inner.root.attrs(&owner)?.contains_key(name))
            }
            SlotKind::Group | SlotKind::Dataset => {
                let path = inner.group_path(parent)?;
                let child = inner.root.group(&path)?.children.get(name);
                Ok(matches!(
                    (kind, child),
                    (SlotKind::Group, Some(Node::Group(_)))
                        | (SlotKind::Dataset, Some(Node::Dataset(_)))
                ))
            }
        }
    }

    /// Children of a group, in name order.
    pub fn children(&self, group: Hid) -> Result<Vec<(String, SlotKind)>, FormatError> {
        let inner = self.inner.borrow();
        let path = inner.group_path(group)?;
        Ok(inner
            .root
            .group(&path)?
            .children
            .iter()
            .map(|(name, node)| {
                let kind = match node {
                    Node::Group(_) => SlotKind::Group,
                    Node::Dataset(_) => SlotKind::Dataset,
                };
                (name.clone(), kind)
            })
            .collect())
    }

    /// Attribute names of a group or dataset, in name order.
    pub fn attribute_names(&self, owner: Hid) -> Result<Vec<String>, FormatError> {
        let inner = self.inner.borrow();
        let path = inner.object_path(owner)?;
        Ok(inner.root.attrs(&path)?.keys().cloned().collect())
    }

    /// Remove a child group or dataset.
    pub fn delete_link(&self, parent: Hid, name: &str) -> Result<(), FormatError> {
        self.check_writable()?;
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let parent_path = inner.group_path(parent)?;
        if inner.root.group_mut(&parent_path)?.children.remove(name).is_none() {
            return Err(FormatError::NotFound(join_path(&parent_path, name)));
        }
        inner.modified = true;
        Ok(())
    }

    pub fn delete_attribute(&self, owner: Hid, name: &str) -> Result<(), FormatError> {
        self.check_writable()?;
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let owner_path = inner.object_path(owner)?;
        if inner.root.attrs_mut(&owner_path)?.remove(name).is_none() {
            return Err(FormatError::NotFound(attr_path(&owner_path, name)));
        }
        inner.modified = true;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Types and spaces
    // ---------------------------------------------------------------

    /// Open a datatype handle describing a dataset or attribute.
    pub fn type_of(&self, slot: Hid) -> Result<Hid, FormatError> {
        let datatype = self.datatype(slot)?;
        Ok(self.inner.borrow_mut().insert(Handle::Type(datatype)))
    }

    /// Open a dataspace handle (selecting everything) for a dataset or attribute.
    pub fn space_of(&self, slot: Hid) -> Result<Hid, FormatError> {
        let space = self.dataspace(slot)?;
        Ok(self.inner.borrow_mut().insert(Handle::Space {
            space,
            selection: Selection::All,
        }))
    }

    /// Open a standalone dataspace handle.
    pub fn create_space(&self, space: &Dataspace) -> Hid {
        self.inner.borrow_mut().insert(Handle::Space {
            space: space.clone(),
            selection: Selection::All,
        })
    }

    /// The datatype behind a datatype, dataset or attribute handle.
    pub fn datatype(&self, hid: Hid) -> Result<Datatype, FormatError> {
        let inner = self.inner.borrow();
        match inner.get(hid)? {
            Handle::Type(t) => Ok(t.clone()),
            Handle::Dataset(path) => Ok(inner.root.dataset(path)?.datatype.clone()),
            Handle::Attribute { owner, name } => Ok(inner.attribute(owner, name)?.datatype.clone()),
            _ => Err(wrong_kind(hid, "datatype")),
        }
    }

    /// The dataspace behind a dataspace, dataset or attribute handle.
    pub fn dataspace(&self, hid: Hid) -> Result<Dataspace, FormatError> {
        let inner = self.inner.borrow();
        match inner.get(hid)? {
            Handle::Space { space, .. } => Ok(space.clone()),
            Handle::Dataset(path) => Ok(inner.root.dataset(path)?.dataspace.clone()),
            Handle::Attribute { owner, name } => {
                Ok(inner.attribute(owner, name)?.dataspace.clone())
            }
            _ => Err(wrong_kind(hid, "dataspace")),
        }
    }

    /// Chunk dimensions of a dataset, `None` for contiguous storage.
    pub fn chunk_dims(&self, dataset: Hid) -> Result<Option<Vec<u64>>, FormatError> {
        let inner = self.inner.borrow();
        match inner.get(dataset)? {
            Handle::Dataset(path) => Ok(match &inner.root.dataset(path)?.layout {
                Layout::Contiguous(_) => None,
                Layout::Chunked { chunk_dims, .. } => Some(chunk_dims.clone()),
            }),
            _ => Err(wrong_kind(dataset, "dataset")),
        }
    }

    /// Current selection of a dataspace handle.
    pub fn selection(&self, space: Hid) -> Result<Selection, FormatError> {
        self.inner.borrow().selection(Some(space))
    }

    /// Restrict a dataspace handle to a contiguous block.
    pub fn select_hyperslab(
        &self,
        space: Hid,
        start: &[u64],
        count: &[u64],
    ) -> Result<(), FormatError> {
        let mut inner = self.inner.borrow_mut();
        match inner.handles.get_mut(&space) {
            Some(Handle::Space { space: ds, selection }) => {
                let dims = &ds.dimensions;
                if start.len() != dims.len() || count.len() != dims.len() {
                    return Err(FormatError::InvalidSelection(format!(
                        "rank {} does not match dataspace rank {}",
                        start.len(),
                        dims.len()
                    )));
                }
                let out_of_range = |d: usize| {
                    start[d]
                        .checked_add(count[d])
                        .map_or(true, |end| end > dims[d])
                };
                if let Some(d) = (0..dims.len()).find(|&d| out_of_range(d)) {
                    return Err(FormatError::InvalidSelection(format!(
                        "dimension {d} exceeds extent {}",
                        dims[d]
                    )));
                }
                *selection = Selection::Hyperslab {
                    start: start.to_vec(),
                    count: count.to_vec(),
                };
                Ok(())
            }
            Some(_) => Err(wrong_kind(space, "dataspace")),
            None => Err(FormatError::InvalidHandle(space)),
        }
    }

    // ---------------------------------------------------------------
    // Raw I/O
    // ---------------------------------------------------------------

    /// Read raw element bytes from a dataset or attribute.
    ///
    /// `file_space` restricts the read to the selection of a dataspace
    /// handle; `None` reads everything. Variable-length slots return a
    /// buffer in the [`crate::vl`] layout and do not accept hyperslabs.
    pub fn read_raw(&self, slot: Hid, file_space: Option<Hid>) -> Result<Vec<u8>, FormatError> {
        let inner = self.inner.borrow();
        let selection = inner.selection(file_space)?;
        match inner.get(slot)? {
            Handle::Dataset(path) => {
                let ds = inner.root.dataset(path)?;
                if ds.datatype.is_variable_length() {
                    if selection != Selection::All {
                        return Err(FormatError::VariableLengthSelection);
                    }
                    return Ok(ds.contiguous().map(|b| b.data.clone()).unwrap_or_default());
                }
                let rows = selection.row_range(&ds.dataspace.dimensions)?;
                Ok(ds.read_rows(rows))
            }
            Handle::Attribute { owner, name } => {
                let attr = inner.attribute(owner, name)?;
                if attr.datatype.is_variable_length() {
                    if selection != Selection::All {
                        return Err(FormatError::VariableLengthSelection);
                    }
                    return Ok(attr.data.clone());
                }
                let rows = selection.row_range(&attr.dataspace.dimensions)?;
                Ok(slice_rows(&attr.data, rows, attribute_row_bytes(attr)).to_vec())
            }
            _ => Err(wrong_kind(slot, "dataset or attribute")),
        }
    }

    /// Write raw element bytes to a dataset or attribute.
    ///
    /// The buffer must hold exactly the selected elements. Nothing is
    /// modified when validation fails.
    pub fn write_raw(&self, slot: Hid, file_space: Option<Hid>, data: &[u8]) -> Result<(), FormatError> {
        self.check_writable()?;
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let selection = inner.selection(file_space)?;
        match inner.get(slot)?.clone() {
            Handle::Dataset(path) => {
                let ds = inner.root.dataset_mut(&path)?;
                if ds.datatype.is_variable_length() {
                    if selection != Selection::All {
                        return Err(FormatError::VariableLengthSelection);
                    }
                    let expected = ds.dataspace.num_elements();
                    let actual = vl::count_elements(data)?;
                    if actual != expected {
                        return Err(FormatError::ElementCountMismatch { expected, actual });
                    }
                    if let Some(block) = ds.contiguous_mut() {
                        block.data = data.to_vec();
                        block.dirty = true;
                    }
                } else {
                    let rows = selection.row_range(&ds.dataspace.dimensions)?;
                    let expected = (rows.end - rows.start) as usize * ds.row_bytes();
                    if data.len() != expected {
                        return Err(FormatError::SizeMismatch {
                            expected,
                            actual: data.len(),
                        });
                    }
                    ds.write_rows(rows, data);
                }
            }
            Handle::Attribute { owner, name } => {
                let attr = inner.attribute_mut(&owner, &name)?;
                if attr.datatype.is_variable_length() {
                    if selection != Selection::All {
                        return Err(FormatError::VariableLengthSelection);
                    }
                    let expected = attr.dataspace.num_elements();
                    let actual = vl::count_elements(data)?;
                    if actual != expected {
                        return Err(FormatError::ElementCountMismatch { expected, actual });
                    }
                    attr.data = data.to_vec();
                } else {
                    let rows = selection.row_range(&attr.dataspace.dimensions)?;
                    let rb = attribute_row_bytes(attr);
                    let expected = (rows.end - rows.start) as usize * rb;
                    if data.len() != expected {
                        return Err(FormatError::SizeMismatch {
                            expected,
                            actual: data.len(),
                        });
                    }
                    attr.data[rows.start as usize * rb..rows.end as usize * rb]
                        .copy_from_slice(data);
                }
            }
            _ => return Err(wrong_kind(slot, "dataset or attribute")),
        }
        inner.modified = true;
        Ok(())
    }

    /// Change the current extent of a chunked dataset.
    pub fn set_extent(&self, dataset: Hid, dims: &[u64]) -> Result<(), FormatError> {
        self.check_writable()?;
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let path = match inner.get(dataset)? {
            Handle::Dataset(path) => path.clone(),
            _ => return Err(wrong_kind(dataset, "dataset")),
        };
        inner.root.dataset_mut(&path)?.set_extent(&path, dims)?;
        inner.modified = true;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Handle and file lifecycle
    // ---------------------------------------------------------------

    /// Release a handle.
    pub fn close(&self, hid: Hid) -> Result<(), FormatError> {
        self.inner
            .borrow_mut()
            .handles
            .remove(&hid)
            .map(|_| ())
            .ok_or(FormatError::InvalidHandle(hid))
    }

    /// Number of handles not yet closed.
    pub fn open_handle_count(&self) -> usize {
        self.inner.borrow().handles.len()
    }

    /// Persist pending changes to the backing file.
    pub fn flush(&self) -> Result<(), FormatError> {
        if self.read_only {
            return Ok(());
        }
        let mut guard = self.inner.borrow_mut();
        let Inner {
            root,
            file,
            eof,
            modified,
            ..
        } = &mut *guard;
        let Some(file) = file.as_mut() else {
            *modified = false;
            return Ok(());
        };
        if !*modified {
            return Ok(());
        }

        let mut end = (*eof).max(SUPERBLOCK_SIZE as u64);
        persist_blocks(root, file, &mut end)?;

        let meta = encode_tree(root);
        file.seek(SeekFrom::Start(end))?;
        file.write_all(&meta)?;
        let metadata_address = end;
        end += meta.len() as u64;

        let sb = Superblock::new(metadata_address, meta.len() as u64, end);
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&sb.serialize())?;
        file.flush()?;

        *eof = end;
        *modified = false;
        Ok(())
    }

    /// Bytes the current tree needs on disk: superblock, live data blocks
    /// and one metadata block.
    pub fn live_size(&self) -> u64 {
        let mut guard = self.inner.borrow_mut();
        let mut data = 0u64;
        for_each_block(&mut guard.root, &mut |block: &mut Block| data += block.data.len() as u64);
        SUPERBLOCK_SIZE as u64 + data + encode_tree(&guard.root).len() as u64
    }

    /// Current end of the file image, including space left behind by
    /// earlier flushes.
    pub fn file_size(&self) -> u64 {
        self.inner.borrow().eof
    }

    /// Rewrite the file with only the live blocks.
    ///
    /// Every flush appends dirty blocks and a fresh metadata block, leaving
    /// the superseded copies unreferenced. Compaction writes the whole tree
    /// again from the superblock onwards and truncates the rest.
    pub fn compact(&self) -> Result<(), FormatError> {
        if self.read_only {
            return Ok(());
        }
        {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let Some(file) = inner.file.as_mut() else {
                return Ok(());
            };
            for_each_block(&mut inner.root, &mut |block: &mut Block| block.dirty = true);
            file.set_len(SUPERBLOCK_SIZE as u64)?;
            inner.eof = SUPERBLOCK_SIZE as u64;
            inner.modified = true;
        }
        self.flush()
    }

    /// Flush and close the container, compacting the file when more than
    /// half of it is unreferenced.
    pub fn close_file(self) -> Result<(), FormatError> {
        self.flush()?;
        if !self.read_only && self.file_size() > 2 * self.live_size() {
            self.compact()?;
        }
        Ok(())
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .field("open_handles", &self.open_handle_count())
            .finish()
    }
}
