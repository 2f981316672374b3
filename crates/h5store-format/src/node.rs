//! In-memory object tree: groups, datasets, attributes and their raw storage.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::dataspace::{Dataspace, DataspaceType};
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::property_list::DatasetCreateProps;
use crate::vl;

/// A run of raw bytes together with where it last landed on disk.
#[derive(Debug, Clone)]
pub(crate) struct Block {
    pub data: Vec<u8>,
    /// File offset of the last persisted copy (0 when never written).
    pub address: u64,
    pub dirty: bool,
}

impl Block {
    pub fn zeroed(len: usize) -> Self {
        Block {
            data: vec![0u8; len],
            address: 0,
            dirty: true,
        }
    }

    pub fn loaded(data: Vec<u8>, address: u64) -> Self {
        Block {
            data,
            address,
            dirty: false,
        }
    }
}

/// Raw storage of a dataset.
#[derive(Debug, Clone)]
pub(crate) enum Layout {
    Contiguous(Block),
    /// Chunks split the leading dimension; each chunk spans every trailing
    /// dimension in full.
    Chunked { chunk_dims: Vec<u64>, chunks: Vec<Block> },
}

#[derive(Debug, Clone)]
pub(crate) struct AttributeNode {
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    pub data: Vec<u8>,
}

impl AttributeNode {
    pub fn new(datatype: Datatype, dataspace: Dataspace) -> Result<Self, FormatError> {
        if dataspace.has_unlimited() {
            return Err(FormatError::UnlimitedRequiresChunking);
        }
        let data = zero_fill(&datatype, dataspace.num_elements());
        Ok(AttributeNode {
            datatype,
            dataspace,
            data,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DatasetNode {
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    pub attrs: BTreeMap<String, AttributeNode>,
    pub layout: Layout,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct GroupNode {
    pub attrs: BTreeMap<String, AttributeNode>,
    pub children: BTreeMap<String, Node>,
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Group(GroupNode),
    Dataset(DatasetNode),
}

fn zero_fill(datatype: &Datatype, n: u64) -> Vec<u8> {
    if datatype.is_variable_length() {
        vl::empty_elements(n)
    } else {
        vec![0u8; n as usize * datatype.type_size() as usize]
    }
}

fn check_extent(dataspace: &Dataspace) -> Result<(), FormatError> {
    if let Some(max) = &dataspace.max_dimensions {
        if max.len() != dataspace.rank() {
            return Err(FormatError::InvalidExtent(format!(
                "max rank {} differs from rank {}",
                max.len(),
                dataspace.rank()
            )));
        }
        if let Some((d, (cur, m))) = dataspace
            .dimensions
            .iter()
            .zip(max)
            .enumerate()
            .find(|(_, (cur, m))| cur > m)
        {
            return Err(FormatError::InvalidExtent(format!(
                "dimension {d}: {cur} exceeds maximum {m}"
            )));
        }
    }
    Ok(())
}

/// Leading-dimension row count (a scalar is one row).
fn row_count(dataspace: &Dataspace) -> u64 {
    match dataspace.space_type {
        DataspaceType::Scalar => 1,
        DataspaceType::Simple => dataspace.dimensions.first().copied().unwrap_or(0),
    }
}

/// Bytes per leading-dimension row.
fn row_bytes(datatype: &Datatype, dataspace: &Dataspace) -> usize {
    let trailing: u64 = dataspace.dimensions.iter().skip(1).product();
    trailing as usize * datatype.type_size() as usize
}

impl DatasetNode {
    pub fn new(
        datatype: Datatype,
        dataspace: Dataspace,
        props: &DatasetCreateProps,
    ) -> Result<Self, FormatError> {
        check_extent(&dataspace)?;
        let layout = match &props.chunk_dims {
            None => {
                if dataspace.has_unlimited() {
                    return Err(FormatError::UnlimitedRequiresChunking);
                }
                Layout::Contiguous(Block::zeroed(0))
            }
            Some(chunk) => {
                if datatype.is_variable_length() {
                    return Err(FormatError::VariableLengthChunking);
                }
                let dims = &dataspace.dimensions;
                let spans_rows = chunk.len() == dims.len()
                    && !chunk.is_empty()
                    && chunk[0] > 0
                    && chunk[1..] == dims[1..];
                if !spans_rows {
                    return Err(FormatError::UnsupportedChunkShape {
                        chunk: chunk.clone(),
                        dims: dims.clone(),
                    });
                }
                Layout::Chunked {
                    chunk_dims: chunk.clone(),
                    chunks: Vec::new(),
                }
            }
        };
        let mut node = DatasetNode {
            datatype,
            dataspace,
            attrs: BTreeMap::new(),
            layout,
        };
        node.allocate();
        Ok(node)
    }

    /// Size contiguous storage or chunk list to the current extent.
    fn allocate(&mut self) {
        let rows = row_count(&self.dataspace);
        let row_bytes = row_bytes(&self.datatype, &self.dataspace);
        match &mut self.layout {
            Layout::Contiguous(block) => {
                block.data = zero_fill(&self.datatype, self.dataspace.num_elements());
                block.dirty = true;
            }
            Layout::Chunked { chunk_dims, chunks } => {
                let chunk_rows = chunk_dims[0];
                let needed = rows.div_ceil(chunk_rows) as usize;
                let chunk_bytes = chunk_rows as usize * row_bytes;
                chunks.truncate(needed);
                while chunks.len() < needed {
                    chunks.push(Block::zeroed(chunk_bytes));
                }
            }
        }
    }

    pub fn rows(&self) -> u64 {
        row_count(&self.dataspace)
    }

    pub fn row_bytes(&self) -> usize {
        row_bytes(&self.datatype, &self.dataspace)
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.layout, Layout::Chunked { .. })
    }

    /// Whole contiguous buffer (variable-length data lives here).
    pub fn contiguous(&self) -> Option<&Block> {
        match &self.layout {
            Layout::Contiguous(block) => Some(block),
            Layout::Chunked { .. } => None,
        }
    }

    pub fn contiguous_mut(&mut self) -> Option<&mut Block> {
        match &mut self.layout {
            Layout::Contiguous(block) => Some(block),
            Layout::Chunked { .. } => None,
        }
    }

    /// Copy the given leading-dimension rows out of storage.
    pub fn read_rows(&self, rows: Range<u64>) -> Vec<u8> {
        let rb = self.row_bytes();
        match &self.layout {
            Layout::Contiguous(block) => {
                block.data[rows.start as usize * rb..rows.end as usize * rb].to_vec()
            }
            Layout::Chunked { chunk_dims, chunks } => {
                let chunk_rows = chunk_dims[0];
                let mut out = Vec::with_capacity((rows.end - rows.start) as usize * rb);
                let mut row = rows.start;
                while row < rows.end {
                    let ci = (row / chunk_rows) as usize;
                    let local = row % chunk_rows;
                    let take = (chunk_rows - local).min(rows.end - row);
                    let start = local as usize * rb;
                    out.extend_from_slice(&chunks[ci].data[start..start + take as usize * rb]);
                    row += take;
                }
                out
            }
        }
    }

    /// Overwrite the given rows; `data` must hold exactly those rows.
    pub fn write_rows(&mut self, rows: Range<u64>, data: &[u8]) {
        let rb = self.row_bytes();
        match &mut self.layout {
            Layout::Contiguous(block) => {
                block.data[rows.start as usize * rb..rows.end as usize * rb].copy_from_slice(data);
                block.dirty = true;
            }
            Layout::Chunked { chunk_dims, chunks } => {
                let chunk_rows = chunk_dims[0];
                let mut row = rows.start;
                let mut src = 0usize;
                while row < rows.end {
                    let ci = (row / chunk_rows) as usize;
                    let local = row % chunk_rows;
                    let take = (chunk_rows - local).min(rows.end - row);
                    let start = local as usize * rb;
                    let len = take as usize * rb;
                    let chunk = &mut chunks[ci];
                    chunk.data[start..start + len].copy_from_slice(&data[src..src + len]);
                    chunk.dirty = true;
                    src += len;
                    row += take;
                }
            }
        }
    }

    /// Change the current extent within the maximum extent.
    ///
    /// Shrinking discards the rows that fall outside the new extent; growing
    /// exposes zero-filled rows.
    pub fn set_extent(&mut self, name: &str, dims: &[u64]) -> Result<(), FormatError> {
        let not_extendable = || FormatError::NotExtendable {
            name: name.to_string(),
            requested: dims.to_vec(),
            max: self.dataspace.max_or_current().to_vec(),
        };
        if dims.len() != self.dataspace.rank() {
            return Err(not_extendable());
        }
        if dims == self.dataspace.dimensions.as_slice() {
            return Ok(());
        }
        let max = self.dataspace.max_or_current();
        let within = dims.iter().zip(max).all(|(d, m)| d <= m);
        let trailing_kept = dims[1..] == self.dataspace.dimensions[1..];
        if !self.is_chunked() || !within || !trailing_kept {
            return Err(not_extendable());
        }

        let old_rows = self.rows();
        self.dataspace.dimensions = dims.to_vec();
        let new_rows = self.rows();
        let rb = self.row_bytes();
        self.allocate();

        if new_rows < old_rows {
            if let Layout::Chunked { chunk_dims, chunks } = &mut self.layout {
                let local = (new_rows % chunk_dims[0]) as usize;
                if local != 0 {
                    if let Some(last) = chunks.last_mut() {
                        last.data[local * rb..].fill(0);
                        last.dirty = true;
                    }
                }
            }
        }
        Ok(())
    }
}

impl GroupNode {
    /// Walk `path` (absolute, `/`-separated) down to a group.
    pub fn group(&self, path: &str) -> Result<&GroupNode, FormatError> {
        let mut current = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = match current.children.get(part) {
                Some(Node::Group(g)) => g,
                _ => return Err(FormatError::NotFound(path.to_string())),
            };
        }
        Ok(current)
    }

    pub fn group_mut(&mut self, path: &str) -> Result<&mut GroupNode, FormatError> {
        let mut current = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = match current.children.get_mut(part) {
                Some(Node::Group(g)) => g,
                _ => return Err(FormatError::NotFound(path.to_string())),
            };
        }
        Ok(current)
    }

    pub fn dataset(&self, path: &str) -> Result<&DatasetNode, FormatError> {
        let (parent, name) = split_path(path);
        match self.group(parent)?.children.get(name) {
            Some(Node::Dataset(d)) => Ok(d),
            _ => Err(FormatError::NotFound(path.to_string())),
        }
    }

    pub fn dataset_mut(&mut self, path: &str) -> Result<&mut DatasetNode, FormatError> {
        let (parent, name) = split_path(path);
        match self.group_mut(parent)?.children.get_mut(name) {
            Some(Node::Dataset(d)) => Ok(d),
            _ => Err(FormatError::NotFound(path.to_string())),
        }
    }

    /// Attribute table of the group or dataset at `path`.
    pub fn attrs(&self, path: &str) -> Result<&BTreeMap<String, AttributeNode>, FormatError> {
        match self.group(path) {
            Ok(g) => Ok(&g.attrs),
            Err(_) => Ok(&self.dataset(path)?.attrs),
        }
    }

    pub fn attrs_mut(
        &mut self,
        path: &str,
    ) -> Result<&mut BTreeMap<String, AttributeNode>, FormatError> {
        if self.group(path).is_ok() {
            Ok(&mut self.group_mut(path)?.attrs)
        } else {
            Ok(&mut self.dataset_mut(path)?.attrs)
        }
    }
}

/// Split an absolute path into parent path and final component.
pub(crate) fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("/", path),
    }
}

/// Append a child name to a group path.
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}
