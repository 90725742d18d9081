//! Named binary blobs produced by `serialize` and consumed by `deserialize`.
//!
//! # Blob framing
//!
//! Every blob written by a backend is framed by [`seal`]:
//!
//! ```text
//! magic: [u8; 4] "ANXB"
//! version: i32 (little-endian)
//! payload_len: u64 (little-endian)
//! payload: bincode bytes
//! crc32c: u32 (little-endian, versions >= 2 only)
//! ```
//!
//! # Set encoding
//!
//! [`BinarySet::to_bytes`] flattens a whole set into one buffer:
//!
//! ```text
//! magic: [u8; 4] "ANXS"
//! count: u32
//! repeated count times:
//!   name_len: u32, name: utf-8 bytes
//!   data_len: u64, data
//! crc32c: u32 over everything above
//! ```

use crate::version::{Version, VersionRange};
use crate::{IndexError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

const BLOB_MAGIC: &[u8; 4] = b"ANXB";
const SET_MAGIC: &[u8; 4] = b"ANXS";
const BLOB_HEADER_SIZE: usize = 4 + 4 + 8;

/// Ordered map of blob name to bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinarySet {
    blobs: BTreeMap<String, Bytes>,
}

impl BinarySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a blob.
    pub fn append(&mut self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.blobs.insert(name.into(), data.into());
    }

    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.blobs.get(name)
    }

    /// Like [`BinarySet::get`], failing with `Serialization` when absent.
    pub fn require(&self, name: &str) -> Result<&Bytes> {
        self.blobs
            .get(name)
            .ok_or_else(|| IndexError::Serialization(format!("missing blob {:?}", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Sum of blob sizes in bytes.
    pub fn total_size(&self) -> usize {
        self.blobs.values().map(Bytes::len).sum()
    }

    /// Encode the whole set into one checksummed buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.total_size() + 64);
        buf.put_slice(SET_MAGIC);
        buf.put_u32_le(self.blobs.len() as u32);
        for (name, data) in &self.blobs {
            buf.put_u32_le(name.len() as u32);
            buf.put_slice(name.as_bytes());
            buf.put_u64_le(data.len() as u64);
            buf.put_slice(data);
        }
        let crc = crc32c::crc32c(&buf);
        buf.put_u32_le(crc);
        buf.freeze()
    }

    /// Decode a buffer produced by [`BinarySet::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `Serialization` on bad magic, truncation or checksum mismatch.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < SET_MAGIC.len() + 4 + 4 || &data[..4] != SET_MAGIC {
            return Err(IndexError::Serialization(
                "not a binary set: bad magic".to_string(),
            ));
        }

        let body_len = data.len() - 4;
        let expected = u32::from_le_bytes([
            data[body_len],
            data[body_len + 1],
            data[body_len + 2],
            data[body_len + 3],
        ]);
        let actual = crc32c::crc32c(&data[..body_len]);
        if expected != actual {
            return Err(IndexError::Serialization(format!(
                "binary set checksum mismatch: expected {:#010x}, got {:#010x}",
                expected, actual
            )));
        }

        let mut cursor = &data[4..body_len];
        let count = cursor.get_u32_le() as usize;
        let mut blobs = BTreeMap::new();

        for _ in 0..count {
            let name_len = read_len(&mut cursor, 4)?;
            let name = take(&mut cursor, name_len)?;
            let name = String::from_utf8(name.to_vec())
                .map_err(|e| IndexError::Serialization(format!("blob name: {}", e)))?;

            let data_len = read_len(&mut cursor, 8)?;
            let blob = take(&mut cursor, data_len)?;
            blobs.insert(name, Bytes::copy_from_slice(blob));
        }

        if !cursor.is_empty() {
            return Err(IndexError::Serialization(format!(
                "{} trailing bytes after binary set",
                cursor.len()
            )));
        }

        Ok(Self { blobs })
    }
}

fn read_len(cursor: &mut &[u8], width: usize) -> Result<usize> {
    if cursor.len() < width {
        return Err(IndexError::Serialization("truncated binary set".to_string()));
    }
    let len = if width == 4 {
        cursor.get_u32_le() as u64
    } else {
        cursor.get_u64_le()
    };
    usize::try_from(len).map_err(|_| IndexError::Serialization("blob too large".to_string()))
}

fn take<'a>(cursor: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if cursor.len() < len {
        return Err(IndexError::Serialization("truncated binary set".to_string()));
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}

/// Frame `payload` as a blob written under `version`.
pub fn seal<T: Serialize>(version: Version, payload: &T) -> Result<Bytes> {
    let body = bincode::serialize(payload)?;
    let mut buf = BytesMut::with_capacity(BLOB_HEADER_SIZE + body.len() + 4);
    buf.put_slice(BLOB_MAGIC);
    buf.put_i32_le(version.number());
    buf.put_u64_le(body.len() as u64);
    buf.put_slice(&body);
    if version.has_checksums() {
        let crc = crc32c::crc32c(&buf);
        buf.put_u32_le(crc);
    }
    Ok(buf.freeze())
}

/// Open a blob framed by [`seal`].
///
/// The blob's version must lie in `supported` and must not be newer than
/// `current`, the version of the index loading it.
///
/// # Errors
///
/// Returns `Serialization` on bad framing, checksum mismatch, an
/// incompatible version, or a payload bincode cannot decode.
pub fn unseal<T: DeserializeOwned>(
    data: &[u8],
    supported: VersionRange,
    current: Version,
) -> Result<(Version, T)> {
    if data.len() < BLOB_HEADER_SIZE || &data[..4] != BLOB_MAGIC {
        return Err(IndexError::Serialization("bad blob magic".to_string()));
    }

    let mut cursor = &data[4..];
    let version = Version::new(cursor.get_i32_le());
    if !supported.contains(version) || version > current {
        return Err(IndexError::Serialization(format!(
            "blob written under {} cannot be loaded by a {} index (supported {}..={})",
            version, current, supported.min, supported.max
        )));
    }

    let payload_len = usize::try_from(cursor.get_u64_le())
        .map_err(|_| IndexError::Serialization("blob too large".to_string()))?;
    let trailer = if version.has_checksums() { 4 } else { 0 };
    let expected_len = BLOB_HEADER_SIZE
        .checked_add(payload_len)
        .and_then(|n| n.checked_add(trailer));
    if expected_len != Some(data.len()) {
        return Err(IndexError::Serialization(format!(
            "blob length {} does not match header",
            data.len()
        )));
    }

    let body_end = BLOB_HEADER_SIZE + payload_len;
    if version.has_checksums() {
        let expected = u32::from_le_bytes([
            data[body_end],
            data[body_end + 1],
            data[body_end + 2],
            data[body_end + 3],
        ]);
        let actual = crc32c::crc32c(&data[..body_end]);
        if expected != actual {
            return Err(IndexError::Serialization(format!(
                "blob checksum mismatch: expected {:#010x}, got {:#010x}",
                expected, actual
            )));
        }
    }

    let payload = bincode::deserialize(&data[BLOB_HEADER_SIZE..body_end])?;
    Ok((version, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_versions() -> VersionRange {
        VersionRange::since(Version::minimal())
    }

    #[test]
    fn test_seal_unseal() {
        let payload = (7u32, vec![1.0f32, 2.0]);
        let blob = seal(Version::current(), &payload).unwrap();

        let (version, decoded): (Version, (u32, Vec<f32>)) =
            unseal(&blob, all_versions(), Version::current()).unwrap();
        assert_eq!(version, Version::current());
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_v1_has_no_trailer() {
        let v1 = seal(Version::new(1), &42u64).unwrap();
        let v2 = seal(Version::new(2), &42u64).unwrap();
        assert_eq!(v1.len() + 4, v2.len());

        let (_, value): (_, u64) = unseal(&v1, all_versions(), Version::current()).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_corruption_detected() {
        let blob = seal(Version::current(), &vec![0u8; 32]).unwrap();
        let mut corrupt = blob.to_vec();
        corrupt[BLOB_HEADER_SIZE + 10] ^= 0xFF;

        let err = unseal::<Vec<u8>>(&corrupt, all_versions(), Version::current()).unwrap_err();
        assert!(matches!(err, IndexError::Serialization(_)));

        let truncated = &blob[..blob.len() - 1];
        assert!(unseal::<Vec<u8>>(truncated, all_versions(), Version::current()).is_err());
    }

    #[test]
    fn test_newer_blob_rejected() {
        let blob = seal(Version::new(3), &1u8).unwrap();
        assert!(unseal::<u8>(&blob, all_versions(), Version::new(2)).is_err());

        let old = seal(Version::new(1), &1u8).unwrap();
        let since_v2 = VersionRange::since(Version::new(2));
        assert!(unseal::<u8>(&old, since_v2, Version::current()).is_err());
    }

    #[test]
    fn test_set_encoding() {
        let mut set = BinarySet::new();
        set.append("FLAT", Bytes::from_static(b"vectors"));
        set.append("meta", vec![1u8, 2, 3]);
        assert_eq!(set.total_size(), 10);

        let encoded = set.to_bytes();
        let decoded = BinarySet::from_bytes(&encoded).unwrap();
        assert_eq!(decoded, set);
        assert_eq!(decoded.names().collect::<Vec<_>>(), vec!["FLAT", "meta"]);
        assert!(decoded.require("missing").is_err());
    }

    #[test]
    fn test_set_corruption() {
        let mut set = BinarySet::new();
        set.append("a", vec![9u8; 16]);
        let mut encoded = set.to_bytes().to_vec();
        encoded[12] ^= 1;
        assert!(BinarySet::from_bytes(&encoded).is_err());
        assert!(BinarySet::from_bytes(b"junk").is_err());
    }
}
