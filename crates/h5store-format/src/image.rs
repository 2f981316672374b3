//! On-disk image: superblock, metadata block and raw data blocks.
//!
//! ```text
//! offset 0   superblock (48 bytes)
//!            data blocks, appended as they are flushed
//!            metadata block (serialized object tree + checksum)
//! ```
//!
//! Every flush appends the dirty data blocks and a fresh metadata block, then
//! rewrites the superblock to point at the new metadata. Blocks that were
//! superseded stay in the file as unreferenced space.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::checksum::jenkins_lookup3;
use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::node::{AttributeNode, Block, DatasetNode, GroupNode, Layout, Node};

/// File signature.
pub const SIGNATURE: [u8; 8] = *b"\x89H5S\r\n\x1a\n";

/// Size of the fixed superblock at offset 0.
pub const SUPERBLOCK_SIZE: usize = 48;

const SUPERBLOCK_VERSION: u8 = 1;

const TAG_GROUP: u8 = 0;
const TAG_DATASET: u8 = 1;

const LAYOUT_CONTIGUOUS: u8 = 0;
const LAYOUT_CHUNKED: u8 = 1;

/// Parsed superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub version: u8,
    pub metadata_address: u64,
    pub metadata_length: u64,
    pub eof: u64,
}

impl Superblock {
    pub fn parse(data: &[u8]) -> Result<Superblock, FormatError> {
        if data.len() < SUPERBLOCK_SIZE {
            return Err(FormatError::UnexpectedEof {
                expected: SUPERBLOCK_SIZE,
                available: data.len(),
            });
        }
        if data[..8] != SIGNATURE {
            return Err(FormatError::SignatureNotFound);
        }
        let version = data[8];
        if version != SUPERBLOCK_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let mut cur = Cursor::new(&data[16..44]);
        let metadata_address = cur.read_u64::<LittleEndian>()?;
        let metadata_length = cur.read_u64::<LittleEndian>()?;
        let eof = cur.read_u64::<LittleEndian>()?;
        let stored = cur.read_u32::<LittleEndian>()?;
        let computed = jenkins_lookup3(&data[..40]);
        if stored != computed {
            return Err(FormatError::ChecksumMismatch {
                expected: stored,
                computed,
            });
        }
        Ok(Superblock {
            version,
            metadata_address,
            metadata_length,
            eof,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SUPERBLOCK_SIZE);
        buf.extend_from_slice(&SIGNATURE);
        buf.push(self.version);
        buf.extend_from_slice(&[0u8; 7]);
        buf.extend_from_slice(&self.metadata_address.to_le_bytes());
        buf.extend_from_slice(&self.metadata_length.to_le_bytes());
        buf.extend_from_slice(&self.eof.to_le_bytes());
        let checksum = jenkins_lookup3(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        buf
    }

    pub fn new(metadata_address: u64, metadata_length: u64, eof: u64) -> Superblock {
        Superblock {
            version: SUPERBLOCK_VERSION,
            metadata_address,
            metadata_length,
            eof,
        }
    }
}

/// Serialize the object tree. Block addresses must already be assigned.
pub(crate) fn encode_tree(root: &GroupNode) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_group(&mut buf, root);
    let checksum = jenkins_lookup3(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

/// Rebuild the object tree from a metadata block, loading data blocks from `file`.
pub(crate) fn decode_tree(meta: &[u8], file: &[u8]) -> Result<GroupNode, FormatError> {
    if meta.len() < 4 {
        return Err(FormatError::UnexpectedEof {
            expected: 4,
            available: meta.len(),
        });
    }
    let (payload, tail) = meta.split_at(meta.len() - 4);
    let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let computed = jenkins_lookup3(payload);
    if stored != computed {
        return Err(FormatError::ChecksumMismatch {
            expected: stored,
            computed,
        });
    }
    let mut cur = Cursor::new(payload);
    match decode_node(&mut cur, file)? {
        Node::Group(g) => Ok(g),
        Node::Dataset(_) => Err(FormatError::InvalidNodeTag(TAG_DATASET)),
    }
}

fn encode_name(buf: &mut Vec<u8>, name: &str) {
    // Writes into a Vec cannot fail.
    let _ = buf.write_u16::<LittleEndian>(name.len() as u16);
    buf.extend_from_slice(name.as_bytes());
}

fn encode_blob(buf: &mut Vec<u8>, blob: &[u8]) {
    let _ = buf.write_u32::<LittleEndian>(blob.len() as u32);
    buf.extend_from_slice(blob);
}

fn encode_attrs(buf: &mut Vec<u8>, attrs: &BTreeMap<String, AttributeNode>) {
    let _ = buf.write_u32::<LittleEndian>(attrs.len() as u32);
    for (name, attr) in attrs {
        encode_name(buf, name);
        encode_blob(buf, &attr.datatype.serialize());
        encode_blob(buf, &attr.dataspace.serialize());
        encode_blob(buf, &attr.data);
    }
}

fn encode_group(buf: &mut Vec<u8>, group: &GroupNode) {
    buf.push(TAG_GROUP);
    encode_attrs(buf, &group.attrs);
    let _ = buf.write_u32::<LittleEndian>(group.children.len() as u32);
    for (name, child) in &group.children {
        encode_name(buf, name);
        match child {
            Node::Group(g) => encode_group(buf, g),
            Node::Dataset(d) => encode_dataset(buf, d),
        }
    }
}

fn encode_dataset(buf: &mut Vec<u8>, ds: &DatasetNode) {
    buf.push(TAG_DATASET);
    encode_attrs(buf, &ds.attrs);
    encode_blob(buf, &ds.datatype.serialize());
    encode_blob(buf, &ds.dataspace.serialize());
    match &ds.layout {
        Layout::Contiguous(block) => {
            buf.push(LAYOUT_CONTIGUOUS);
            let _ = buf.write_u64::<LittleEndian>(block.address);
            let _ = buf.write_u64::<LittleEndian>(block.data.len() as u64);
        }
        Layout::Chunked { chunk_dims, chunks } => {
            buf.push(LAYOUT_CHUNKED);
            buf.push(chunk_dims.len() as u8);
            for d in chunk_dims {
                let _ = buf.write_u64::<LittleEndian>(*d);
            }
            let _ = buf.write_u32::<LittleEndian>(chunks.len() as u32);
            for chunk in chunks {
                let _ = buf.write_u64::<LittleEndian>(chunk.address);
            }
        }
    }
}

fn decode_name(cur: &mut Cursor<&[u8]>) -> Result<String, FormatError> {
    let len = cur.read_u16::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| FormatError::InvalidName(e.to_string()))
}

fn decode_blob(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>, FormatError> {
    let len = cur.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn decode_type_and_space(cur: &mut Cursor<&[u8]>) -> Result<(Datatype, Dataspace), FormatError> {
    let (datatype, _) = Datatype::parse(&decode_blob(cur)?)?;
    let (dataspace, _) = Dataspace::parse(&decode_blob(cur)?)?;
    Ok((datatype, dataspace))
}

fn decode_attrs(cur: &mut Cursor<&[u8]>) -> Result<BTreeMap<String, AttributeNode>, FormatError> {
    let count = cur.read_u32::<LittleEndian>()?;
    let mut attrs = BTreeMap::new();
    for _ in 0..count {
        let name = decode_name(cur)?;
        let (datatype, dataspace) = decode_type_and_space(cur)?;
        let data = decode_blob(cur)?;
        attrs.insert(
            name,
            AttributeNode {
                datatype,
                dataspace,
                data,
            },
        );
    }
    Ok(attrs)
}

fn load_block(file: &[u8], address: u64, len: usize) -> Result<Block, FormatError> {
    let start = address as usize;
    if start + len > file.len() {
        return Err(FormatError::UnexpectedEof {
            expected: start + len,
            available: file.len(),
        });
    }
    Ok(Block::loaded(file[start..start + len].to_vec(), address))
}

fn decode_node(cur: &mut Cursor<&[u8]>, file: &[u8]) -> Result<Node, FormatError> {
    let tag = cur.read_u8()?;
    match tag {
        TAG_GROUP => {
            let attrs = decode_attrs(cur)?;
            let count = cur.read_u32::<LittleEndian>()?;
            let mut children = BTreeMap::new();
            for _ in 0..count {
                let name = decode_name(cur)?;
                children.insert(name, decode_node(cur, file)?);
            }
            Ok(Node::Group(GroupNode { attrs, children }))
        }
        TAG_DATASET => {
            let attrs = decode_attrs(cur)?;
            let (datatype, dataspace) = decode_type_and_space(cur)?;
            let layout = match cur.read_u8()? {
                LAYOUT_CONTIGUOUS => {
                    let address = cur.read_u64::<LittleEndian>()?;
                    let len = cur.read_u64::<LittleEndian>()? as usize;
                    Layout::Contiguous(load_block(file, address, len)?)
                }
                LAYOUT_CHUNKED => {
                    let rank = cur.read_u8()? as usize;
                    let mut chunk_dims = Vec::with_capacity(rank);
                    for _ in 0..rank {
                        chunk_dims.push(cur.read_u64::<LittleEndian>()?);
                    }
                    let trailing: u64 = dataspace.dimensions.iter().skip(1).product();
                    let chunk_bytes = (chunk_dims.first().copied().unwrap_or(0) * trailing)
                        as usize
                        * datatype.type_size() as usize;
                    let count = cur.read_u32::<LittleEndian>()?;
                    let mut chunks = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        let address = cur.read_u64::<LittleEndian>()?;
                        chunks.push(load_block(file, address, chunk_bytes)?);
                    }
                    Layout::Chunked { chunk_dims, chunks }
                }
                other => return Err(FormatError::InvalidNodeTag(other)),
            };
            Ok(Node::Dataset(DatasetNode {
                datatype,
                dataspace,
                attrs,
                layout,
            }))
        }
        other => Err(FormatError::InvalidNodeTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superblock_layout() {
        let sb = Superblock::new(48, 120, 168);
        let bytes = sb.serialize();
        assert_eq!(bytes.len(), SUPERBLOCK_SIZE);
        assert_eq!(&bytes[..8], &SIGNATURE);
        assert_eq!(Superblock::parse(&bytes).unwrap(), sb);
    }

    #[test]
    fn superblock_corruption_detected() {
        let mut bytes = Superblock::new(48, 10, 58).serialize();
        bytes[20] ^= 0xFF;
        assert!(matches!(
            Superblock::parse(&bytes),
            Err(FormatError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn wrong_signature() {
        let bytes = vec![0u8; SUPERBLOCK_SIZE];
        assert!(matches!(
            Superblock::parse(&bytes),
            Err(FormatError::SignatureNotFound)
        ));
    }

    #[test]
    fn tree_with_attribute_and_group() {
        let mut root = GroupNode::default();
        let attr = AttributeNode::new(Datatype::fixed(8, true), Dataspace::scalar()).unwrap();
        root.attrs.insert("count".into(), attr);
        root.children
            .insert("sub".into(), Node::Group(GroupNode::default()));

        let meta = encode_tree(&root);
        let decoded = decode_tree(&meta, &[]).unwrap();
        assert_eq!(decoded.attrs.len(), 1);
        assert_eq!(decoded.attrs["count"].data, vec![0u8; 8]);
        assert!(matches!(decoded.children.get("sub"), Some(Node::Group(_))));
    }

    #[test]
    fn metadata_checksum_checked() {
        let mut meta = encode_tree(&GroupNode::default());
        meta[0] = 7;
        assert!(matches!(
            decode_tree(&meta, &[]),
            Err(FormatError::ChecksumMismatch { .. })
        ));
    }
}
