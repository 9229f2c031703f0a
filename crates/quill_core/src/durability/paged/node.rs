//! On-page encodings: the meta pages and checksummed node runs.
//!
//! ```text
//! meta (pages 0 and 1, written alternately by sequence)
//! | magic (8) | version (2) | reserved (2) | page_size (4) |
//! | sequence (8) | root_start (8) | root_pages (8) | crc32 (4) |
//!
//! node (one or more contiguous pages)
//! | kind (1) | reserved (3) | payload_len (4) | crc32 (4) | payload ... |
//! ```
//!
//! All integers are little-endian. Payloads are CBOR.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use quill_storage::PageId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const MAGIC: [u8; 8] = *b"QUILLPG\0";
const FORMAT_VERSION: u16 = 1;
const META_LEN: usize = 44;

/// Pages at the front of the store holding the two meta copies.
pub(super) const META_PAGES: u64 = 2;

/// Bytes in front of every node payload.
pub(super) const NODE_HEADER: usize = 12;

/// A run of contiguous pages holding one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct PageRun {
    pub(super) start: PageId,
    pub(super) pages: u64,
}

impl PageRun {
    pub(super) fn page_ids(self) -> impl Iterator<Item = PageId> {
        self.start..self.start + self.pages
    }
}

/// What a node holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(super) enum NodeKind {
    Root = 1,
    TableLeaf = 2,
    IndexLeaf = 3,
}

/// Contents of a meta page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Meta {
    pub(super) page_size: u32,
    pub(super) sequence: SequenceNumber,
    pub(super) root: Option<PageRun>,
}

impl Meta {
    /// Meta page this version is written to. Consecutive commits alternate,
    /// so the previous version's copy is never overwritten.
    pub(super) fn slot(&self) -> PageId {
        self.sequence.as_u64() % META_PAGES
    }

    pub(super) fn encode(&self) -> Vec<u8> {
        let (root_start, root_pages) = self.root.map_or((0, 0), |run| (run.start, run.pages));

        let mut buf = Vec::with_capacity(META_LEN);
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&[0u8; 2]);
        buf.extend_from_slice(&self.page_size.to_le_bytes());
        buf.extend_from_slice(&self.sequence.as_u64().to_le_bytes());
        buf.extend_from_slice(&root_start.to_le_bytes());
        buf.extend_from_slice(&root_pages.to_le_bytes());
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    pub(super) fn decode(page: &[u8]) -> CoreResult<Self> {
        if page.len() < META_LEN {
            return Err(CoreError::corrupted("meta page truncated"));
        }
        if page[..8] != MAGIC {
            return Err(CoreError::corrupted("meta page has bad magic"));
        }

        let body = &page[..META_LEN - 4];
        let stored = u32::from_le_bytes(array(&page[META_LEN - 4..META_LEN]));
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(CoreError::corrupted(format!(
                "meta checksum mismatch: expected {stored:08x}, got {computed:08x}"
            )));
        }

        let version = u16::from_le_bytes(array(&page[8..10]));
        if version != FORMAT_VERSION {
            return Err(CoreError::corrupted(format!(
                "unsupported format version {version}"
            )));
        }

        let page_size = u32::from_le_bytes(array(&page[12..16]));
        let sequence = SequenceNumber::new(u64::from_le_bytes(array(&page[16..24])));
        let root_start = u64::from_le_bytes(array(&page[24..32]));
        let root_pages = u64::from_le_bytes(array(&page[32..40]));
        let root = (root_pages > 0).then_some(PageRun {
            start: root_start,
            pages: root_pages,
        });

        Ok(Self {
            page_size,
            sequence,
            root,
        })
    }
}

/// Wraps `payload` in a node header.
pub(super) fn encode_node(kind: NodeKind, payload: &[u8]) -> CoreResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::codec(format!("node payload of {} bytes", payload.len())))?;

    let mut buf = Vec::with_capacity(NODE_HEADER + payload.len());
    buf.push(kind as u8);
    buf.extend_from_slice(&[0u8; 3]);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Validates a node run and returns its payload.
pub(super) fn decode_node(kind: NodeKind, bytes: &[u8]) -> CoreResult<&[u8]> {
    if bytes.len() < NODE_HEADER {
        return Err(CoreError::corrupted("node header truncated"));
    }
    if bytes[0] != kind as u8 {
        return Err(CoreError::corrupted(format!(
            "expected {kind:?} node, found kind {}",
            bytes[0]
        )));
    }

    let len = u32::from_le_bytes(array(&bytes[4..8])) as usize;
    let stored = u32::from_le_bytes(array(&bytes[8..12]));
    let payload = bytes
        .get(NODE_HEADER..NODE_HEADER + len)
        .ok_or_else(|| CoreError::corrupted("node payload extends past its run"))?;

    let computed = crc32fast::hash(payload);
    if stored != computed {
        return Err(CoreError::corrupted(format!(
            "{kind:?} node checksum mismatch: expected {stored:08x}, got {computed:08x}"
        )));
    }
    Ok(payload)
}

/// Encodes one value as CBOR.
pub(super) fn encode_cbor<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::codec(e.to_string()))?;
    Ok(buf)
}

/// Decodes one CBOR value.
pub(super) fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::codec(e.to_string()))
}

/// Decodes a payload made of back-to-back CBOR cells.
pub(super) fn decode_cells<T: DeserializeOwned>(mut payload: &[u8]) -> CoreResult<Vec<T>> {
    let mut cells = Vec::new();
    while !payload.is_empty() {
        let cell = ciborium::from_reader(&mut payload).map_err(|e| CoreError::codec(e.to_string()))?;
        cells.push(cell);
    }
    Ok(cells)
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_encodes_and_decodes() {
        let meta = Meta {
            page_size: 4096,
            sequence: SequenceNumber::new(42),
            root: Some(PageRun { start: 7, pages: 2 }),
        };
        let mut page = meta.encode();
        page.resize(4096, 0);
        assert_eq!(Meta::decode(&page).unwrap(), meta);

        let empty = Meta {
            page_size: 512,
            sequence: SequenceNumber::default(),
            root: None,
        };
        assert_eq!(Meta::decode(&empty.encode()).unwrap().root, None);
    }

    #[test]
    fn consecutive_sequences_use_different_slots() {
        let meta = |n| Meta {
            page_size: 512,
            sequence: SequenceNumber::new(n),
            root: None,
        };
        assert_eq!(meta(0).slot(), 0);
        assert_eq!(meta(1).slot(), 1);
        assert_eq!(meta(2).slot(), 0);
        assert_ne!(meta(41).slot(), meta(42).slot());
    }

    #[test]
    fn meta_detects_corruption() {
        let meta = Meta {
            page_size: 4096,
            sequence: SequenceNumber::new(1),
            root: None,
        };
        let mut page = meta.encode();
        page[20] ^= 0xff;
        assert!(matches!(
            Meta::decode(&page),
            Err(CoreError::Corrupted { .. })
        ));

        assert!(Meta::decode(&[0u8; 64]).is_err());
    }

    #[test]
    fn node_roundtrip_ignores_page_padding() {
        let mut run = encode_node(NodeKind::TableLeaf, b"payload").unwrap();
        run.resize(512, 0);
        assert_eq!(decode_node(NodeKind::TableLeaf, &run).unwrap(), b"payload");
    }

    #[test]
    fn node_kind_and_checksum_are_checked() {
        let mut run = encode_node(NodeKind::IndexLeaf, b"entries").unwrap();
        assert!(decode_node(NodeKind::Root, &run).is_err());

        let last = run.len() - 1;
        run[last] ^= 0x01;
        assert!(matches!(
            decode_node(NodeKind::IndexLeaf, &run),
            Err(CoreError::Corrupted { .. })
        ));
    }

    #[test]
    fn back_to_back_cells_decode_in_order() {
        let mut payload = encode_cbor(&(1u64, "a")).unwrap();
        payload.extend(encode_cbor(&(2u64, "b")).unwrap());

        let cells: Vec<(u64, String)> = decode_cells(&payload).unwrap();
        assert_eq!(cells, vec![(1, "a".to_owned()), (2, "b".to_owned())]);
    }
}
