//! Per-document page position container.
//!
//! A [`DocPositions`] accumulates the positional record and plain text of
//! every indexed page of one document, either in memory or backed by files
//! on disk. Page indices are 0-based and assigned strictly in the order
//! pages are added; the PDF page number (1-based) is preserved alongside.
//!
//! On-disk layout per document hash `H` under the store's `positions/`
//! directory:
//!
//! ```text
//! <H>.dat        append-only stream of position frames, one per page
//! <H>.idx.json   JSON array of FrameHeader, written on close
//! <H>.pages/     NNN.txt plain text of page with 0-based index NNN
//! <H>.dpl.json   optional human-readable dump of the page records
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use crate::error::{PinpointError, Result};
use crate::frame::{self, FrameHeader};
use crate::locations::DocPageLocations;

/// File paths of one document's persistent backing.
#[derive(Debug, Clone)]
pub struct DocPaths {
    pub data_path: PathBuf,
    pub spans_path: PathBuf,
    pub text_dir: PathBuf,
    pub dump_path: PathBuf,
}

impl DocPaths {
    /// Derive the four backing paths from `positions_dir/<hash>`.
    pub fn new(positions_dir: &std::path::Path, hash: &str) -> Self {
        let base = positions_dir.join(hash);
        DocPaths {
            data_path: base.with_extension("dat"),
            spans_path: base.with_extension("idx.json"),
            text_dir: base.with_extension("pages"),
            dump_path: base.with_extension("dpl.json"),
        }
    }
}

/// Backing state: exactly one of the two modes is live per document.
#[derive(Debug)]
enum DocBacking {
    /// Everything stays in process memory.
    Memory {
        page_nums: Vec<u32>,
        page_texts: Vec<String>,
    },
    /// Frames in a data file, offsets in a JSON sidecar, text in files.
    Persistent {
        data_file: Option<File>,
        spans: Vec<FrameHeader>,
        paths: DocPaths,
        writable: bool,
        closed: bool,
    },
}

/// The positional data of one document while it is being written or read.
#[derive(Debug)]
pub struct DocPositions {
    in_path: String,
    doc_idx: u64,
    backing: DocBacking,
    /// Page records by page number, for memory-mode reads and for the
    /// diagnostic dump in persistent mode (kept only when dumping).
    page_dpls: BTreeMap<u32, DocPageLocations>,
    keep_dpls: bool,
}

impl DocPositions {
    /// Create a memory-mode document.
    pub fn new_memory(in_path: &str, doc_idx: u64) -> Self {
        DocPositions {
            in_path: in_path.to_string(),
            doc_idx,
            backing: DocBacking::Memory {
                page_nums: Vec::new(),
                page_texts: Vec::new(),
            },
            page_dpls: BTreeMap::new(),
            keep_dpls: true,
        }
    }

    /// Create a persistent document for writing. The data file and the
    /// page-text directory are created lazily, on the first page actually
    /// added, so a document that extracts nothing leaves no files behind.
    /// The sidecar is written on close.
    pub fn create_persistent(in_path: &str, doc_idx: u64, paths: DocPaths, dump: bool) -> Self {
        DocPositions {
            in_path: in_path.to_string(),
            doc_idx,
            backing: DocBacking::Persistent {
                data_file: None,
                spans: Vec::new(),
                paths,
                writable: true,
                closed: false,
            },
            page_dpls: BTreeMap::new(),
            keep_dpls: dump,
        }
    }

    /// Open a persistent document for reading: the data file is opened
    /// read-only and the sidecar loaded.
    pub fn open_persistent(in_path: &str, doc_idx: u64, paths: DocPaths) -> Result<Self> {
        let data_file = File::open(&paths.data_path)?;
        let sidecar = fs::read_to_string(&paths.spans_path)?;
        let spans: Vec<FrameHeader> = serde_json::from_str(&sidecar)?;
        Ok(DocPositions {
            in_path: in_path.to_string(),
            doc_idx,
            backing: DocBacking::Persistent {
                data_file: Some(data_file),
                spans,
                paths,
                writable: false,
                closed: false,
            },
            page_dpls: BTreeMap::new(),
            keep_dpls: false,
        })
    }

    /// Reconstitute a memory-mode document from page numbers and texts
    /// (the flat snapshot form; position records are not part of it).
    pub fn from_snapshot(
        in_path: &str,
        doc_idx: u64,
        page_nums: Vec<u32>,
        page_texts: Vec<String>,
    ) -> Self {
        DocPositions {
            in_path: in_path.to_string(),
            doc_idx,
            backing: DocBacking::Memory {
                page_nums,
                page_texts,
            },
            page_dpls: BTreeMap::new(),
            keep_dpls: true,
        }
    }

    pub fn in_path(&self) -> &str {
        &self.in_path
    }

    pub fn doc_idx(&self) -> u64 {
        self.doc_idx
    }

    pub fn is_mem(&self) -> bool {
        matches!(self.backing, DocBacking::Memory { .. })
    }

    /// Number of pages added to (or present in) this document.
    pub fn len(&self) -> usize {
        match &self.backing {
            DocBacking::Memory { page_nums, .. } => page_nums.len(),
            DocBacking::Persistent { spans, .. } => spans.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Page numbers in page-index order.
    pub fn page_nums(&self) -> Vec<u32> {
        match &self.backing {
            DocBacking::Memory { page_nums, .. } => page_nums.clone(),
            DocBacking::Persistent { spans, .. } => spans.iter().map(|s| s.page_num).collect(),
        }
    }

    /// Page texts in page-index order. Memory mode only.
    pub fn page_texts(&self) -> Option<&[String]> {
        match &self.backing {
            DocBacking::Memory { page_texts, .. } => Some(page_texts),
            DocBacking::Persistent { .. } => None,
        }
    }

    /// Append one page and return its 0-based page index.
    pub fn add_page(&mut self, page_num: u32, dpl: DocPageLocations, text: &str) -> Result<u32> {
        if page_num == 0 {
            return Err(PinpointError::ZeroPageNumber);
        }
        match &mut self.backing {
            DocBacking::Memory {
                page_nums,
                page_texts,
            } => {
                self.page_dpls.insert(page_num, dpl);
                page_nums.push(page_num);
                page_texts.push(text.to_string());
                Ok(page_nums.len() as u32 - 1)
            }
            DocBacking::Persistent {
                data_file,
                spans,
                paths,
                writable,
                closed,
            } => {
                if *closed || !*writable {
                    return Err(PinpointError::bad_format(
                        "add_page on a closed or read-only document",
                    ));
                }
                if data_file.is_none() {
                    // First successful page: materialise the backing files.
                    if let Some(parent) = paths.data_path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::create_dir_all(&paths.text_dir)?;
                    *data_file = Some(File::create(&paths.data_path)?);
                }
                let file = data_file.as_ref().expect("data file just created");
                let mut writer: &File = file;
                let header = frame::write(&mut writer, &dpl)?;
                spans.push(header);
                let page_idx = spans.len() as u32 - 1;

                let text_path = page_text_path(&paths.text_dir, page_idx);
                let mut text_file = File::create(&text_path)?;
                text_file.write_all(text.as_bytes())?;

                if self.keep_dpls {
                    self.page_dpls.insert(page_num, dpl);
                }
                Ok(page_idx)
            }
        }
    }

    /// Read the page number and position record for the page at `page_idx`.
    pub fn read_page_positions(&self, page_idx: u32) -> Result<(u32, DocPageLocations)> {
        match &self.backing {
            DocBacking::Memory { page_nums, .. } => {
                let page_num = *page_nums
                    .get(page_idx as usize)
                    .ok_or(PinpointError::OutOfRange)?;
                let dpl = self.page_dpls.get(&page_num).cloned().unwrap_or_default();
                Ok((page_num, dpl))
            }
            DocBacking::Persistent {
                data_file, spans, ..
            } => {
                let header = spans
                    .get(page_idx as usize)
                    .ok_or(PinpointError::OutOfRange)?;
                if header.page_num == 0 {
                    return Err(PinpointError::bad_format(format!(
                        "bad span at page_idx={page_idx}: {header:?}"
                    )));
                }
                let file = data_file
                    .as_ref()
                    .ok_or_else(|| PinpointError::bad_format("document already closed"))?;
                let mut reader: &File = file;
                let dpl = frame::read_at(&mut reader, header)?;
                Ok((header.page_num, dpl))
            }
        }
    }

    /// Read the plain text of the page at `page_idx`.
    pub fn read_page_text(&self, page_idx: u32) -> Result<String> {
        match &self.backing {
            DocBacking::Memory { page_texts, .. } => page_texts
                .get(page_idx as usize)
                .cloned()
                .ok_or(PinpointError::OutOfRange),
            DocBacking::Persistent { spans, paths, .. } => {
                if page_idx as usize >= spans.len() {
                    return Err(PinpointError::OutOfRange);
                }
                Ok(fs::read_to_string(page_text_path(
                    &paths.text_dir,
                    page_idx,
                ))?)
            }
        }
    }

    /// Flush the sidecar (and diagnostic dump, if kept) and close the data
    /// file. Idempotent; a no-op in memory mode, read mode, and for a
    /// written document that never received a page.
    pub fn close(&mut self) -> Result<()> {
        let DocBacking::Persistent {
            data_file,
            spans,
            paths,
            writable,
            closed,
        } = &mut self.backing
        else {
            return Ok(());
        };
        *closed = true;
        let Some(file) = data_file.take() else {
            return Ok(());
        };
        if !*writable {
            return Ok(());
        }
        if self.keep_dpls {
            let dump: Vec<&DocPageLocations> = self.page_dpls.values().collect();
            fs::write(&paths.dump_path, serde_json::to_string_pretty(&dump)?)?;
        }
        fs::write(&paths.spans_path, serde_json::to_string_pretty(&spans)?)?;
        file.sync_all()?;
        Ok(())
    }
}

fn page_text_path(text_dir: &std::path::Path, page_idx: u32) -> PathBuf {
    text_dir.join(format!("{page_idx:03}.txt"))
}
