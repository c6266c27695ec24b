//! The positions store: a catalog of documents keyed by content hash, plus
//! the lifecycle of their per-document position containers.
//!
//! A store is either in-memory (no root directory) or persistent. The
//! persistent layout under `root` is:
//!
//! ```text
//! <root>/
//!   file_list.json     manifest: format version + catalog of FileDesc
//!   index/             opaque directory of the inverted-index engine
//!   positions/         per-document position files (see store::doc)
//! ```
//!
//! A document's identity is the SHA-256 of its bytes, never its path.
//! Document indices are assigned by append order and never reused.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{PinpointError, Result};
use crate::frame::FORMAT_VERSION;
use crate::locations::DocPageLocations;
use crate::store::doc::{DocPaths, DocPositions};
use crate::util;

/// Period between opportunistic catalog flushes.
const FLUSH_PERIOD: Duration = Duration::from_secs(60);

/// Name of the catalog manifest, which doubles as the sentinel that marks
/// a directory as a positions store.
const FILE_LIST_NAME: &str = "file_list.json";

/// Directory prefix that is always safe to force-remove, even without the
/// sentinel.
const SAFE_DIR_PREFIX: &str = "store.";

/// One catalog row: a submitted PDF file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDesc {
    /// Full path the file was first submitted under.
    #[serde(rename = "InPath")]
    pub in_path: String,
    /// SHA-256 of the file contents, lowercase hex.
    #[serde(rename = "Hash")]
    pub hash: String,
    /// Size of the file on disk in MB.
    #[serde(rename = "SizeMB")]
    pub size_mb: f64,
}

impl FileDesc {
    /// Describe a file by hashing `bytes` read from `in_path`.
    pub fn from_bytes(in_path: &str, bytes: &[u8]) -> Self {
        FileDesc {
            in_path: in_path.to_string(),
            hash: util::sha256_hex(bytes),
            size_mb: bytes.len() as f64 / 1024.0 / 1024.0,
        }
    }
}

/// Catalog manifest written to `file_list.json`. `version` locks the frame
/// byte layout; readers reject anything but the current version.
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    #[serde(rename = "Version")]
    version: u8,
    #[serde(rename = "Files")]
    files: Vec<FileDesc>,
}

/// Tracks the wall clock since the last catalog flush.
#[derive(Debug)]
struct FlushTimer {
    last_flush: Instant,
    period: Duration,
}

impl FlushTimer {
    fn new(period: Duration) -> Self {
        FlushTimer {
            last_flush: Instant::now(),
            period,
        }
    }

    fn due(&self) -> bool {
        self.last_flush.elapsed() > self.period
    }

    fn reset(&mut self) {
        self.last_flush = Instant::now();
    }
}

/// The top-level store: ordered catalog plus derived hash/index mappings.
#[derive(Debug)]
pub struct PositionsStore {
    root: Option<PathBuf>,
    file_list: Vec<FileDesc>,
    hash_index: HashMap<String, u64>,
    index_hash: HashMap<u64, String>,
    hash_path: HashMap<String, String>,
    /// Memory mode only: closed documents keyed by hash.
    hash_doc: HashMap<String, DocPositions>,
    flush_timer: FlushTimer,
    dump_positions: bool,
}

impl PositionsStore {
    /// Open a store rooted at `root`, or an in-memory store when `root` is
    /// `None`. With `force_create`, an existing persistent root is removed
    /// first; removal is refused unless the root carries the manifest
    /// sentinel or sits in a safe-prefixed directory.
    pub fn open(root: Option<&Path>, force_create: bool) -> Result<Self> {
        let mut store = PositionsStore {
            root: root.map(Path::to_path_buf),
            file_list: Vec::new(),
            hash_index: HashMap::new(),
            index_hash: HashMap::new(),
            hash_path: HashMap::new(),
            hash_doc: HashMap::new(),
            flush_timer: FlushTimer::new(FLUSH_PERIOD),
            dump_positions: false,
        };
        let Some(root) = root else {
            return Ok(store);
        };

        if force_create {
            store.remove_store_dir(root)?;
        }
        let manifest_path = root.join(FILE_LIST_NAME);
        if manifest_path.exists() {
            let manifest: Manifest = serde_json::from_str(&fs::read_to_string(&manifest_path)?)?;
            if manifest.version != FORMAT_VERSION {
                return Err(PinpointError::bad_format(format!(
                    "unsupported store version {} (expected {FORMAT_VERSION})",
                    manifest.version
                )));
            }
            store.file_list = manifest.files;
            for (i, fd) in store.file_list.iter().enumerate() {
                store.hash_index.insert(fd.hash.clone(), i as u64);
                store.index_hash.insert(i as u64, fd.hash.clone());
                store.hash_path.insert(fd.hash.clone(), fd.in_path.clone());
            }
        }
        log::debug!(
            "opened store root={} files={}",
            root.display(),
            store.file_list.len()
        );
        Ok(store)
    }

    /// Enable writing the human-readable `.dpl.json` dump next to each
    /// document's data file.
    pub fn set_dump_positions(&mut self, dump: bool) {
        self.dump_positions = dump;
    }

    pub fn is_mem(&self) -> bool {
        self.root.is_none()
    }

    /// Number of catalogued documents.
    pub fn len(&self) -> usize {
        self.file_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_list.is_empty()
    }

    /// The catalog rows in document-index order.
    pub fn file_list(&self) -> &[FileDesc] {
        &self.file_list
    }

    /// Hash and first-submitted path for a document index.
    pub fn doc_hash_path(&self, doc_idx: u64) -> Option<(&str, &str)> {
        let hash = self.index_hash.get(&doc_idx)?;
        let path = self.hash_path.get(hash)?;
        Some((hash.as_str(), path.as_str()))
    }

    fn positions_dir(&self) -> Option<PathBuf> {
        self.root.as_ref().map(|r| r.join("positions"))
    }

    /// Directory the inverted-index engine keeps its files in.
    pub fn index_dir(root: &Path) -> PathBuf {
        root.join("index")
    }

    fn manifest_path(&self) -> Option<PathBuf> {
        self.root.as_ref().map(|r| r.join(FILE_LIST_NAME))
    }

    /// Add `fd` to the catalog and create its document for writing.
    /// Fails with `DuplicatePdf` when the content hash is already present;
    /// the error message carries the path the content was first seen under.
    pub fn create_doc(&mut self, fd: &FileDesc) -> Result<DocPositions> {
        if let Some(&idx) = self.hash_index.get(&fd.hash) {
            let first = self
                .hash_path
                .get(&fd.hash)
                .cloned()
                .unwrap_or_else(|| format!("doc {idx}"));
            return Err(PinpointError::DuplicatePdf(first));
        }
        let doc_idx = self.file_list.len() as u64;
        self.file_list.push(fd.clone());
        self.hash_index.insert(fd.hash.clone(), doc_idx);
        self.index_hash.insert(doc_idx, fd.hash.clone());
        self.hash_path.insert(fd.hash.clone(), fd.in_path.clone());
        self.maybe_flush()?;

        if self.is_mem() {
            return Ok(DocPositions::new_memory(&fd.in_path, doc_idx));
        }
        // The positions subtree is created lazily by the document itself,
        // so a run that extracts nothing leaves no tree behind.
        let positions_dir = self.positions_dir().expect("persistent store has a root");
        Ok(DocPositions::create_persistent(
            &fd.in_path,
            doc_idx,
            DocPaths::new(&positions_dir, &fd.hash),
            self.dump_positions,
        ))
    }

    /// Close `doc` and, in memory mode, retain it for later reads.
    pub fn finish_doc(&mut self, mut doc: DocPositions) -> Result<()> {
        doc.close()?;
        if self.is_mem() {
            if let Some(hash) = self.index_hash.get(&doc.doc_idx()) {
                self.hash_doc.insert(hash.clone(), doc);
            }
        }
        Ok(())
    }

    /// Open the document at `doc_idx` for reading. Persistent mode only;
    /// memory-mode reads go through the `read_doc_page_*` methods.
    pub fn open_doc(&self, doc_idx: u64) -> Result<DocPositions> {
        let fd = self
            .file_list
            .get(doc_idx as usize)
            .ok_or(PinpointError::OutOfRange)?;
        let positions_dir = self
            .positions_dir()
            .ok_or_else(|| PinpointError::bad_format("open_doc on a memory store"))?;
        DocPositions::open_persistent(
            &fd.in_path,
            doc_idx,
            DocPaths::new(&positions_dir, &fd.hash),
        )
    }

    /// Resolve `(in_path, page_num, dpl)` for a document page.
    pub fn read_doc_page_positions(
        &self,
        doc_idx: u64,
        page_idx: u32,
    ) -> Result<(String, u32, DocPageLocations)> {
        if self.is_mem() {
            let doc = self.mem_doc(doc_idx)?;
            let (page_num, dpl) = doc.read_page_positions(page_idx)?;
            return Ok((doc.in_path().to_string(), page_num, dpl));
        }
        let mut doc = self.open_doc(doc_idx)?;
        let (page_num, dpl) = doc.read_page_positions(page_idx)?;
        doc.close()?;
        Ok((doc.in_path().to_string(), page_num, dpl))
    }

    /// Read the plain text of a document page.
    pub fn read_doc_page_text(&self, doc_idx: u64, page_idx: u32) -> Result<String> {
        if self.is_mem() {
            return self.mem_doc(doc_idx)?.read_page_text(page_idx);
        }
        let mut doc = self.open_doc(doc_idx)?;
        let text = doc.read_page_text(page_idx)?;
        doc.close()?;
        Ok(text)
    }

    /// Page numbers and texts of a retained memory-mode document, for the
    /// flat snapshot form.
    pub(crate) fn mem_doc_snapshot(&self, doc_idx: u64) -> Option<(Vec<u32>, Vec<String>)> {
        let doc = self.mem_doc(doc_idx).ok()?;
        Some((doc.page_nums(), doc.page_texts()?.to_vec()))
    }

    fn mem_doc(&self, doc_idx: u64) -> Result<&DocPositions> {
        let hash = self
            .index_hash
            .get(&doc_idx)
            .ok_or(PinpointError::OutOfRange)?;
        self.hash_doc.get(hash).ok_or(PinpointError::OutOfRange)
    }

    /// Rewrite the catalog manifest if the flush period has elapsed.
    /// Called on every catalog mutation; no background timers.
    fn maybe_flush(&mut self) -> Result<()> {
        if !self.is_mem() && self.flush_timer.due() {
            self.flush()?;
        }
        Ok(())
    }

    /// Rewrite the catalog manifest atomically (write temp, then rename).
    /// A no-op in memory mode.
    pub fn flush(&mut self) -> Result<()> {
        let Some(manifest_path) = self.manifest_path() else {
            return Ok(());
        };
        let root = self.root.as_ref().expect("persistent store has a root");
        fs::create_dir_all(root)?;
        let manifest = Manifest {
            version: FORMAT_VERSION,
            files: self.file_list.clone(),
        };
        let tmp_path = manifest_path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(&manifest)?)?;
        fs::rename(&tmp_path, &manifest_path)?;
        self.flush_timer.reset();
        log::debug!("flushed {} catalog entries", self.file_list.len());
        Ok(())
    }

    /// Remove an existing store tree before force-creation. Refuses when
    /// `root` exists but neither carries the manifest sentinel nor lives
    /// in a safe-prefixed directory.
    fn remove_store_dir(&self, root: &Path) -> Result<()> {
        if !root.exists() {
            return Ok(());
        }
        let has_sentinel = root.join(FILE_LIST_NAME).exists();
        let safe_name = root
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(SAFE_DIR_PREFIX))
            .unwrap_or(false);
        if !has_sentinel && !safe_name {
            return Err(PinpointError::corrupt(format!(
                "{} does not look like a positions store (no {FILE_LIST_NAME})",
                root.display()
            )));
        }
        fs::remove_dir_all(root)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locations::TextLocation;
    use tempfile::TempDir;

    fn desc(path: &str, content: &[u8]) -> FileDesc {
        FileDesc::from_bytes(path, content)
    }

    fn one_run_dpl(page: u32) -> DocPageLocations {
        DocPageLocations {
            doc: 0,
            page,
            locations: vec![TextLocation {
                start: 0,
                end: 0,
                llx: 1.0,
                lly: 1.0,
                urx: 9.0,
                ury: 9.0,
            }],
        }
    }

    #[test]
    fn test_duplicate_rejection_keeps_len() {
        let mut store = PositionsStore::open(None, false).unwrap();
        let fd = desc("a.pdf", b"same bytes");
        let doc = store.create_doc(&fd).unwrap();
        store.finish_doc(doc).unwrap();
        assert_eq!(store.len(), 1);

        // Same content under a different path.
        let fd2 = desc("elsewhere/b.pdf", b"same bytes");
        match store.create_doc(&fd2) {
            Err(PinpointError::DuplicatePdf(first)) => assert_eq!(first, "a.pdf"),
            other => panic!("expected DuplicatePdf, got {other:?}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_flush_and_reopen_round_trips_catalog() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store.test");

        let mut store = PositionsStore::open(Some(&root), true).unwrap();
        let fd = desc("a.pdf", b"contents of a");
        let mut doc = store.create_doc(&fd).unwrap();
        doc.add_page(1, one_run_dpl(1), "page text").unwrap();
        store.finish_doc(doc).unwrap();
        store.flush().unwrap();
        let before = store.file_list().to_vec();
        drop(store);

        let reopened = PositionsStore::open(Some(&root), false).unwrap();
        assert_eq!(reopened.file_list(), before.as_slice());
        assert_eq!(reopened.len(), 1);

        let (in_path, page_num, dpl) = reopened.read_doc_page_positions(0, 0).unwrap();
        assert_eq!(in_path, "a.pdf");
        assert_eq!(page_num, 1);
        assert_eq!(dpl.locations.len(), 1);
        assert_eq!(reopened.read_doc_page_text(0, 0).unwrap(), "page text");
    }

    #[test]
    fn test_force_create_refuses_foreign_directory() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("precious-data");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("keep.txt"), b"do not remove").unwrap();

        match PositionsStore::open(Some(&root), true) {
            Err(PinpointError::Corrupt(_)) => {}
            other => panic!("expected Corrupt, got {other:?}"),
        }
        assert!(root.join("keep.txt").exists());
    }

    #[test]
    fn test_force_create_removes_safe_prefixed_directory() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store.old");
        fs::create_dir_all(root.join("junk")).unwrap();

        let store = PositionsStore::open(Some(&root), true).unwrap();
        assert_eq!(store.len(), 0);
        assert!(!root.join("junk").exists());
    }

    #[test]
    fn test_out_of_range_doc_idx() {
        let store = PositionsStore::open(None, false).unwrap();
        assert!(matches!(
            store.read_doc_page_text(3, 0),
            Err(PinpointError::OutOfRange)
        ));
    }
}
