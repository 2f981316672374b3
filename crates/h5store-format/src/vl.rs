//! Variable-length element buffers.
//!
//! Raw I/O on a variable-length slot exchanges one buffer holding every
//! element in order, each as `length(4 LE) + bytes`. A zero-filled buffer of
//! `4 * n` bytes is therefore `n` empty elements.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// Encode elements into a variable-length buffer.
pub fn encode_elements<T: AsRef<[u8]>>(elements: &[T]) -> Vec<u8> {
    let total: usize = elements.iter().map(|e| 4 + e.as_ref().len()).sum();
    let mut buf = Vec::with_capacity(total);
    for e in elements {
        let bytes = e.as_ref();
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
    }
    buf
}

/// Split a variable-length buffer into its elements.
pub fn decode_elements(buf: &[u8]) -> Result<Vec<Vec<u8>>, FormatError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        if pos + 4 > buf.len() {
            return Err(FormatError::UnexpectedEof {
                expected: pos + 4,
                available: buf.len(),
            });
        }
        let len = LittleEndian::read_u32(&buf[pos..pos + 4]) as usize;
        pos += 4;
        if pos + len > buf.len() {
            return Err(FormatError::UnexpectedEof {
                expected: pos + len,
                available: buf.len(),
            });
        }
        out.push(buf[pos..pos + len].to_vec());
        pos += len;
    }
    Ok(out)
}

/// Number of elements in a well-formed buffer.
pub fn count_elements(buf: &[u8]) -> Result<u64, FormatError> {
    let mut count = 0u64;
    let mut pos = 0;
    while pos < buf.len() {
        if pos + 4 > buf.len() {
            return Err(FormatError::UnexpectedEof {
                expected: pos + 4,
                available: buf.len(),
            });
        }
        pos += 4 + LittleEndian::read_u32(&buf[pos..pos + 4]) as usize;
        count += 1;
    }
    if pos != buf.len() {
        return Err(FormatError::UnexpectedEof {
            expected: pos,
            available: buf.len(),
        });
    }
    Ok(count)
}

/// A buffer of `n` empty elements.
pub fn empty_elements(n: u64) -> Vec<u8> {
    vec![0u8; n as usize * 4]
}
