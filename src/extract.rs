//! The PDF text-extraction seam.
//!
//! The indexing pipeline only needs one thing from a PDF backend: the
//! plain text of every page together with the bounding box of each text
//! run. [`Extractor`] captures that as a per-page callback over one
//! document, which keeps backend-specific lifetimes (pdfium documents
//! borrow their library handle) inside a single call.
//!
//! [`StaticExtractor`] is a deterministic in-memory implementation used by
//! the tests and by tooling that replays canned corpora.

use std::collections::HashMap;

use crate::error::{PinpointError, Result};

/// Axis-aligned bounding box in PDF user-space points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

/// One extracted text run: a contiguous group of glyphs with a single
/// bounding box and a byte offset into the page's plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Byte offset of the run in the page text.
    pub offset: u32,
    /// The run's text.
    pub text: String,
    pub bbox: BoundingBox,
}

/// Callback invoked once per page with `(page_num, text, runs)`.
/// `page_num` is 1-based. Runs arrive in ascending offset order.
pub type PageSink<'a> = dyn FnMut(u32, String, Vec<TextRun>) -> Result<()> + 'a;

/// A PDF backend that can walk the pages of one document.
pub trait Extractor {
    /// Invoke `on_page` for every page of the document in `bytes`.
    /// `in_path` is the submitted name, used for diagnostics only.
    fn process_pages(&self, in_path: &str, bytes: &[u8], on_page: &mut PageSink) -> Result<()>;
}

/// Canned page content for one document, keyed by the submitted path.
pub type StaticPages = Vec<(String, Vec<TextRun>)>;

/// An extractor over fixed in-memory content. Unknown paths fail the way
/// an unreadable PDF would.
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    docs: HashMap<String, StaticPages>,
}

impl StaticExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the pages returned for `in_path`.
    pub fn insert(&mut self, in_path: &str, pages: StaticPages) {
        self.docs.insert(in_path.to_string(), pages);
    }
}

impl Extractor for StaticExtractor {
    fn process_pages(&self, in_path: &str, _bytes: &[u8], on_page: &mut PageSink) -> Result<()> {
        let pages = self
            .docs
            .get(in_path)
            .ok_or_else(|| PinpointError::extract(format!("no canned pages for {in_path}")))?;
        for (i, (text, runs)) in pages.iter().enumerate() {
            on_page(i as u32 + 1, text.clone(), runs.clone())?;
        }
        Ok(())
    }
}

/// A run covering `text` at byte `offset` with the given box. Convenience
/// for building canned corpora.
pub fn run(offset: u32, text: &str, llx: f64, lly: f64, urx: f64, ury: f64) -> TextRun {
    TextRun {
        offset,
        text: text.to_string(),
        bbox: BoundingBox { llx, lly, urx, ury },
    }
}
