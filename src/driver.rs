//! Per-document extraction driver.
//!
//! Drives one PDF end-to-end: content hash, duplicate check against the
//! store catalog, page-by-page extraction, conversion of extractor runs to
//! position records, frame appends, and collection of the `(id, text)`
//! pairs the inverted index needs.
//!
//! Per-page extraction failures are logged and the page skipped; they never
//! abort the document. Per-document failures (unreadable file, duplicate
//! content) surface to the caller, who decides whether to continue with the
//! rest of the corpus.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{PinpointError, Result};
use crate::extract::{Extractor, TextRun};
use crate::locations::{DocPageLocations, TextLocation};
use crate::store::{FileDesc, PositionsStore};

/// Driver knobs.
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    /// Let extractor panics propagate instead of converting them to
    /// per-document errors.
    pub expose_errors: bool,
    /// Write the human-readable `.dpl.json` dump next to each document.
    pub dump_positions: bool,
}

/// The text of one successfully extracted page, with the identifiers the
/// index sink needs.
#[derive(Debug, Clone)]
pub struct DocPageText {
    /// Document index (0-based) into the store catalog.
    pub doc_idx: u64,
    /// Page index (0-based) assigned by the positions document.
    pub page_idx: u32,
    /// PDF page number (1-based).
    pub page_num: u32,
    /// Extracted page text.
    pub text: String,
}

/// Run `f` with the recovery shim applied: extractor panics become an
/// `Extract` error for the document, unless `expose_errors` asks for them
/// to propagate. A corrupt PDF must not take the whole pipeline down.
pub fn guard_extractor<T>(
    config: &DriverConfig,
    in_path: &str,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    if config.expose_errors {
        return f();
    }
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "extractor panicked".to_string());
            log::error!("recovered from extractor panic for {in_path}: {msg}");
            Err(PinpointError::extract(msg))
        }
    }
}

/// The pure extraction half: walk the pages of `bytes` and collect
/// `(page_num, text, runs)` triples, skipping empty pages. Safe to run on
/// any thread; does not touch the store.
pub fn extract_pages(
    extractor: &dyn Extractor,
    config: &DriverConfig,
    in_path: &str,
    bytes: &[u8],
) -> Result<Vec<(u32, String, Vec<TextRun>)>> {
    let mut pages = Vec::new();
    guard_extractor(config, in_path, || {
        extractor.process_pages(in_path, bytes, &mut |page_num, text, runs| {
            if text.is_empty() {
                return Ok(());
            }
            pages.push((page_num, text, runs));
            Ok(())
        })
    })?;
    Ok(pages)
}

/// Convert extractor runs to a page's position record. Degenerate boxes on
/// non-whitespace runs are reported but do not fail the page.
pub fn runs_to_page_locations(
    doc_idx: u64,
    page_num: u32,
    in_path: &str,
    runs: &[TextRun],
) -> DocPageLocations {
    let mut dpl = DocPageLocations::new(doc_idx, page_num);
    for run in runs {
        let loc = TextLocation {
            start: run.offset,
            end: 0,
            llx: run.bbox.llx as f32,
            lly: run.bbox.lly as f32,
            urx: run.bbox.urx as f32,
            ury: run.bbox.ury as f32,
        };
        if loc.is_degenerate() && !run.text.trim().is_empty() {
            log::warn!(
                "degenerate bbox for run {:?} at offset {} on {in_path} page {page_num}",
                run.text,
                run.offset
            );
        }
        dpl.locations.push(loc);
    }
    dpl
}

fn append_pages(
    store: &mut PositionsStore,
    mut doc: crate::store::DocPositions,
    in_path: &str,
    pages: Vec<(u32, String, Vec<TextRun>)>,
) -> Result<Vec<DocPageText>> {
    let doc_idx = doc.doc_idx();
    let mut doc_pages = Vec::with_capacity(pages.len());
    for (page_num, text, runs) in pages {
        let dpl = runs_to_page_locations(doc_idx, page_num, in_path, &runs);
        let page_idx = doc.add_page(page_num, dpl, &text)?;
        doc_pages.push(DocPageText {
            doc_idx,
            page_idx,
            page_num,
            text,
        });
    }
    log::debug!(
        "stored {} pages of {in_path} as doc {doc_idx}",
        doc_pages.len()
    );
    store.finish_doc(doc)?;
    Ok(doc_pages)
}

/// Catalogue already-extracted pages: create the positions document,
/// append every page, and return the `(id, text)` material for the index
/// sink. This is the aggregator half of the concurrent pipeline and must
/// run on the thread that owns the store.
pub fn store_extracted_doc(
    store: &mut PositionsStore,
    fd: &FileDesc,
    pages: Vec<(u32, String, Vec<TextRun>)>,
) -> Result<Vec<DocPageText>> {
    let doc = store.create_doc(fd)?;
    append_pages(store, doc, &fd.in_path, pages)
}

/// Run the whole extract-and-store pipeline for one document's bytes.
///
/// The document is catalogued before extraction, so a duplicate is
/// rejected without paying the extraction cost. If extraction then fails
/// wholesale, the catalog entry remains with zero pages (and, in
/// persistent mode, no backing files).
pub fn extract_doc_positions(
    store: &mut PositionsStore,
    extractor: &dyn Extractor,
    config: &DriverConfig,
    in_path: &str,
    bytes: &[u8],
) -> Result<Vec<DocPageText>> {
    let fd = FileDesc::from_bytes(in_path, bytes);
    let doc = store.create_doc(&fd)?;
    match extract_pages(extractor, config, in_path, bytes) {
        Ok(pages) => append_pages(store, doc, in_path, pages),
        Err(err) => {
            store.finish_doc(doc)?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{run, StaticExtractor};

    fn extractor_with(path: &str, pages: Vec<(String, Vec<TextRun>)>) -> StaticExtractor {
        let mut extractor = StaticExtractor::new();
        extractor.insert(path, pages);
        extractor
    }

    #[test]
    fn test_empty_pages_skipped_and_indices_contiguous() {
        let extractor = extractor_with(
            "a.pdf",
            vec![
                ("page one".to_string(), vec![run(0, "page", 0.0, 0.0, 9.0, 9.0)]),
                (String::new(), vec![]),
                ("page three".to_string(), vec![run(0, "page", 0.0, 0.0, 9.0, 9.0)]),
            ],
        );
        let mut store = PositionsStore::open(None, false).unwrap();
        let pages = extract_doc_positions(
            &mut store,
            &extractor,
            &DriverConfig::default(),
            "a.pdf",
            b"bytes of a",
        )
        .unwrap();

        // The empty page is skipped and does not consume a page index.
        assert_eq!(pages.len(), 2);
        assert_eq!(
            pages.iter().map(|p| p.page_idx).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(
            pages.iter().map(|p| p.page_num).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn test_duplicate_document_rejected() {
        let pages = vec![("text".to_string(), vec![])];
        let extractor = {
            let mut e = extractor_with("a.pdf", pages.clone());
            e.insert("copy-of-a.pdf", pages);
            e
        };
        let mut store = PositionsStore::open(None, false).unwrap();
        let config = DriverConfig::default();

        extract_doc_positions(&mut store, &extractor, &config, "a.pdf", b"identical").unwrap();
        let second = extract_doc_positions(
            &mut store,
            &extractor,
            &config,
            "copy-of-a.pdf",
            b"identical",
        );
        assert!(matches!(second, Err(PinpointError::DuplicatePdf(_))));
        assert_eq!(store.len(), 1);
    }

    struct PanickingExtractor;

    impl Extractor for PanickingExtractor {
        fn process_pages(
            &self,
            _in_path: &str,
            _bytes: &[u8],
            _on_page: &mut crate::extract::PageSink,
        ) -> Result<()> {
            panic!("parser blew up");
        }
    }

    #[test]
    fn test_extractor_panic_recovered() {
        let mut store = PositionsStore::open(None, false).unwrap();
        let result = extract_doc_positions(
            &mut store,
            &PanickingExtractor,
            &DriverConfig::default(),
            "bad.pdf",
            b"corrupt",
        );
        match result {
            Err(PinpointError::Extract(msg)) => assert!(msg.contains("parser blew up")),
            other => panic!("expected Extract, got {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "parser blew up")]
    fn test_extractor_panic_exposed() {
        let mut store = PositionsStore::open(None, false).unwrap();
        let config = DriverConfig {
            expose_errors: true,
            ..Default::default()
        };
        let _ = extract_doc_positions(&mut store, &PanickingExtractor, &config, "bad.pdf", b"x");
    }

    #[test]
    fn test_extractor_error_surfaces() {
        let extractor = StaticExtractor::new();
        let mut store = PositionsStore::open(None, false).unwrap();
        let result = extract_doc_positions(
            &mut store,
            &extractor,
            &DriverConfig::default(),
            "unknown.pdf",
            b"whatever",
        );
        assert!(matches!(result, Err(PinpointError::Extract(_))));
        // The catalog entry remains, with zero pages behind it.
        assert_eq!(store.len(), 1);
        assert!(matches!(
            store.read_doc_page_text(0, 0),
            Err(PinpointError::OutOfRange)
        ));
    }
}
