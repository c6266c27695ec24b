//! All-in-one binary image of a memory-mode store.
//!
//! The archive packs the inverted-index byte image (opaque to this module)
//! together with the store's flat `(hash, index, path, doc)` records into a
//! single frame, using the same `size + crc` convention as the per-page
//! position frames. The document snapshot carries page numbers and page
//! texts only; position records stay in the per-page frames.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{PinpointError, Result};
use crate::store::doc::DocPositions;
use crate::store::state::{FileDesc, PositionsStore};

/// Flat snapshot of one document: enough to rebuild a memory-mode
/// [`DocPositions`] for text reads.
#[derive(Debug, Clone, PartialEq)]
pub struct DocSnapshot {
    pub path: String,
    pub doc_idx: u64,
    pub page_nums: Vec<u32>,
    pub page_texts: Vec<String>,
}

/// One store entry in flat form.
#[derive(Debug, Clone, PartialEq)]
pub struct HashIndexPathDoc {
    pub hash: String,
    pub index: u64,
    pub path: String,
    pub doc: DocSnapshot,
}

/// The decoded archive: corpus counts, the opaque index image and the
/// flat store records.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexArchive {
    pub num_files: u32,
    pub num_pages: u32,
    pub index_image: Vec<u8>,
    pub hipds: Vec<HashIndexPathDoc>,
}

impl IndexArchive {
    /// Assemble the archive for a memory-mode store, embedding the index
    /// engine's byte image. The store's hashed contents always travel
    /// with the image.
    pub fn from_store(store: &PositionsStore, index_image: Vec<u8>) -> Self {
        let hipds = store.to_hipds();
        let num_pages = hipds.iter().map(|h| h.doc.page_nums.len() as u32).sum();
        IndexArchive {
            num_files: store.len() as u32,
            num_pages,
            index_image,
            hipds,
        }
    }
}

impl PositionsStore {
    /// Convert the whole memory-mode store to its flat record list,
    /// ordered by document index.
    pub fn to_hipds(&self) -> Vec<HashIndexPathDoc> {
        let mut hipds = Vec::with_capacity(self.len());
        for (i, fd) in self.file_list().iter().enumerate() {
            let doc_idx = i as u64;
            let (page_nums, page_texts) = match self.mem_doc_snapshot(doc_idx) {
                Some(parts) => parts,
                None => (Vec::new(), Vec::new()),
            };
            hipds.push(HashIndexPathDoc {
                hash: fd.hash.clone(),
                index: doc_idx,
                path: fd.in_path.clone(),
                doc: DocSnapshot {
                    path: fd.in_path.clone(),
                    doc_idx,
                    page_nums,
                    page_texts,
                },
            });
        }
        hipds
    }

    /// Rebuild a memory-mode store from flat records.
    pub fn from_hipds(mut hipds: Vec<HashIndexPathDoc>) -> Result<Self> {
        hipds.sort_by_key(|h| h.index);
        let mut store = PositionsStore::open(None, false)?;
        for (i, hipd) in hipds.into_iter().enumerate() {
            if hipd.index != i as u64 {
                return Err(PinpointError::bad_format(format!(
                    "non-contiguous document index {} at position {i}",
                    hipd.index
                )));
            }
            let fd = FileDesc {
                in_path: hipd.path.clone(),
                hash: hipd.hash.clone(),
                size_mb: 0.0,
            };
            let doc = store.create_doc(&fd)?;
            debug_assert_eq!(doc.doc_idx(), hipd.index);
            drop(doc);
            store.finish_doc(DocPositions::from_snapshot(
                &hipd.doc.path,
                hipd.index,
                hipd.doc.page_nums,
                hipd.doc.page_texts,
            ))?;
        }
        Ok(store)
    }
}

/// Write the archive as one length+CRC frame.
pub fn write_archive<W: Write>(writer: &mut W, archive: &IndexArchive) -> Result<()> {
    let mut payload = Vec::new();
    payload.write_u32::<LittleEndian>(archive.num_files).unwrap();
    payload.write_u32::<LittleEndian>(archive.num_pages).unwrap();
    write_bytes(&mut payload, &archive.index_image);
    payload
        .write_u32::<LittleEndian>(archive.hipds.len() as u32)
        .unwrap();
    for hipd in &archive.hipds {
        write_str(&mut payload, &hipd.hash);
        payload.write_u64::<LittleEndian>(hipd.index).unwrap();
        write_str(&mut payload, &hipd.path);
        write_str(&mut payload, &hipd.doc.path);
        payload.write_u64::<LittleEndian>(hipd.doc.doc_idx).unwrap();
        payload
            .write_u32::<LittleEndian>(hipd.doc.page_nums.len() as u32)
            .unwrap();
        for &num in &hipd.doc.page_nums {
            payload.write_u32::<LittleEndian>(num).unwrap();
        }
        payload
            .write_u32::<LittleEndian>(hipd.doc.page_texts.len() as u32)
            .unwrap();
        for text in &hipd.doc.page_texts {
            write_str(&mut payload, text);
        }
    }

    writer.write_u32::<LittleEndian>(payload.len() as u32)?;
    writer.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Read an archive frame back, validating its CRC.
pub fn read_archive<R: Read>(reader: &mut R) -> Result<IndexArchive> {
    let size = reader.read_u32::<LittleEndian>()? as usize;
    let check = reader.read_u32::<LittleEndian>()?;
    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload)?;
    if crc32fast::hash(&payload) != check {
        return Err(PinpointError::BadChecksum);
    }

    let mut cursor = &payload[..];
    let num_files = cursor.read_u32::<LittleEndian>()?;
    let num_pages = cursor.read_u32::<LittleEndian>()?;
    let index_image = read_bytes(&mut cursor)?;
    let hipd_count = cursor.read_u32::<LittleEndian>()? as usize;
    let mut hipds = Vec::with_capacity(hipd_count);
    for _ in 0..hipd_count {
        let hash = read_str(&mut cursor)?;
        let index = cursor.read_u64::<LittleEndian>()?;
        let path = read_str(&mut cursor)?;
        let doc_path = read_str(&mut cursor)?;
        let doc_idx = cursor.read_u64::<LittleEndian>()?;
        let num_count = cursor.read_u32::<LittleEndian>()? as usize;
        let mut page_nums = Vec::with_capacity(num_count);
        for _ in 0..num_count {
            page_nums.push(cursor.read_u32::<LittleEndian>()?);
        }
        let text_count = cursor.read_u32::<LittleEndian>()? as usize;
        let mut page_texts = Vec::with_capacity(text_count);
        for _ in 0..text_count {
            page_texts.push(read_str(&mut cursor)?);
        }
        hipds.push(HashIndexPathDoc {
            hash,
            index,
            path,
            doc: DocSnapshot {
                path: doc_path,
                doc_idx,
                page_nums,
                page_texts,
            },
        });
    }
    Ok(IndexArchive {
        num_files,
        num_pages,
        index_image,
        hipds,
    })
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.write_u32::<LittleEndian>(bytes.len() as u32).unwrap();
    buf.extend_from_slice(bytes);
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_bytes(buf, s.as_bytes());
}

fn read_bytes(cursor: &mut &[u8]) -> Result<Vec<u8>> {
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    if cursor.len() < len {
        return Err(PinpointError::bad_format(format!(
            "archive string of {len} bytes overruns payload"
        )));
    }
    let (head, tail) = cursor.split_at(len);
    let out = head.to_vec();
    *cursor = tail;
    Ok(out)
}

fn read_str(cursor: &mut &[u8]) -> Result<String> {
    String::from_utf8(read_bytes(cursor)?)
        .map_err(|e| PinpointError::bad_format(format!("archive string not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_archive() -> IndexArchive {
        IndexArchive {
            num_files: 2,
            num_pages: 3,
            index_image: vec![1, 2, 3, 4, 5],
            hipds: vec![
                HashIndexPathDoc {
                    hash: "aa".to_string(),
                    index: 0,
                    path: "a.pdf".to_string(),
                    doc: DocSnapshot {
                        path: "a.pdf".to_string(),
                        doc_idx: 0,
                        page_nums: vec![1, 2],
                        page_texts: vec!["one".to_string(), "two".to_string()],
                    },
                },
                HashIndexPathDoc {
                    hash: "bb".to_string(),
                    index: 1,
                    path: "b.pdf".to_string(),
                    doc: DocSnapshot {
                        path: "b.pdf".to_string(),
                        doc_idx: 1,
                        page_nums: vec![1],
                        page_texts: vec!["three".to_string()],
                    },
                },
            ],
        }
    }

    #[test]
    fn test_archive_round_trip() {
        let archive = sample_archive();
        let mut buf = Vec::new();
        write_archive(&mut buf, &archive).unwrap();
        let read_back = read_archive(&mut buf.as_slice()).unwrap();
        assert_eq!(read_back, archive);
    }

    #[test]
    fn test_archive_bit_flip_fails() {
        let mut buf = Vec::new();
        write_archive(&mut buf, &sample_archive()).unwrap();
        let mid = buf.len() / 2;
        buf[mid] ^= 0x40;
        match read_archive(&mut buf.as_slice()) {
            Err(PinpointError::BadChecksum) => {}
            other => panic!("expected BadChecksum, got {other:?}"),
        }
    }

    #[test]
    fn test_archive_from_store_counts() {
        let mut store = PositionsStore::open(None, false).unwrap();
        let fd = FileDesc::from_bytes("a.pdf", b"doc a");
        let mut doc = store.create_doc(&fd).unwrap();
        doc.add_page(1, Default::default(), "one").unwrap();
        doc.add_page(2, Default::default(), "two").unwrap();
        store.finish_doc(doc).unwrap();

        let archive = IndexArchive::from_store(&store, vec![0xAA; 16]);
        assert_eq!(archive.num_files, 1);
        assert_eq!(archive.num_pages, 2);
        assert_eq!(archive.index_image.len(), 16);

        let mut buf = Vec::new();
        write_archive(&mut buf, &archive).unwrap();
        assert_eq!(read_archive(&mut buf.as_slice()).unwrap(), archive);
    }

    #[test]
    fn test_store_hipd_round_trip() {
        let mut store = PositionsStore::open(None, false).unwrap();
        for (path, content, text) in [
            ("a.pdf", b"doc a".as_slice(), "alpha page"),
            ("b.pdf", b"doc b".as_slice(), "beta page"),
        ] {
            let fd = FileDesc::from_bytes(path, content);
            let mut doc = store.create_doc(&fd).unwrap();
            doc.add_page(1, Default::default(), text).unwrap();
            store.finish_doc(doc).unwrap();
        }

        let hipds = store.to_hipds();
        assert_eq!(hipds.len(), 2);
        assert_eq!(hipds[0].path, "a.pdf");
        assert_eq!(hipds[1].doc.page_texts, vec!["beta page".to_string()]);

        let rebuilt = PositionsStore::from_hipds(hipds).unwrap();
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt.read_doc_page_text(0, 0).unwrap(), "alpha page");
        assert_eq!(rebuilt.read_doc_page_text(1, 0).unwrap(), "beta page");
    }
}
