//! Search over an indexed corpus, joined back to page geometry.
//!
//! The inverted index stores only `(id, text)` pages. A hit's `id` decodes
//! to `(doc_idx, page_idx)`, which the positions store resolves to the
//! input path, PDF page number, page text and position record. From the
//! matched byte range this module derives the line number, the line text
//! and, on demand, the rectangle envelope for highlighting.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{PinpointError, Result};
use crate::index::SearchIndex;
use crate::locations::{self, DocPageLocations, TextLocation};
use crate::store::PositionsStore;

/// One search match, fully resolved against the positions store.
#[derive(Debug, Clone)]
pub struct PdfMatch {
    /// Path the document was first submitted under.
    pub in_path: String,
    /// PDF page number (1-based).
    pub page_num: u32,
    /// Line number (1-based) containing the start of the match.
    pub line_num: usize,
    /// Text of that line.
    pub line: String,
    /// The page's position record.
    pub dpl: DocPageLocations,
    /// Document index in the store catalog.
    pub doc_idx: u64,
    /// Page index within the document.
    pub page_idx: u32,
    pub score: f32,
    /// Highlighted fragment from the index engine.
    pub fragment: String,
    /// Matched byte range `[start, end)` in the page text.
    pub start: u32,
    pub end: u32,
}

impl PdfMatch {
    /// The smallest rectangle enclosing the runs covering the matched
    /// range.
    pub fn bounding_rect(&self) -> TextLocation {
        locations::position_envelope(&self.dpl.locations, self.start, self.end)
    }
}

/// An ordered set of matches plus corpus-level counters.
#[derive(Debug, Clone, Default)]
pub struct PdfMatchSet {
    /// Total candidates reported by the engine, independent of the
    /// result-size cap and of dropped unresolvable hits.
    pub total_matches: usize,
    pub search_duration: Duration,
    pub matches: Vec<PdfMatch>,
}

impl PdfMatchSet {
    /// Keep at most `max_per_file` matches per unique input path,
    /// preserving order.
    pub fn filter(&self, max_per_file: usize) -> PdfMatchSet {
        let mut file_counts: HashMap<&str, usize> = HashMap::new();
        let mut matches = Vec::new();
        for m in &self.matches {
            let count = file_counts.entry(m.in_path.as_str()).or_insert(0);
            *count += 1;
            if *count <= max_per_file {
                matches.push(m.clone());
            }
        }
        PdfMatchSet {
            total_matches: self.total_matches,
            search_duration: self.search_duration,
            matches,
        }
    }

    /// The unique input paths, in first-match order.
    pub fn files(&self) -> Vec<String> {
        let mut seen: HashMap<&str, ()> = HashMap::new();
        let mut files = Vec::new();
        for m in &self.matches {
            if seen.insert(m.in_path.as_str(), ()).is_none() {
                files.push(m.in_path.clone());
            }
        }
        files
    }
}

impl fmt::Display for PdfMatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total_matches == 0 {
            return write!(f, "No matches");
        }
        writeln!(
            f,
            "{} matches, showing {}, search took {:.1?}",
            self.total_matches,
            self.matches.len(),
            self.search_duration
        )?;
        for (i, m) in self.matches.iter().enumerate() {
            writeln!(f, "--------------------------------------------------")?;
            writeln!(f, "{}: {m}", i + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PdfMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "path={:?} page={} line={} (score={:.3}) match={:?}\n{}",
            self.in_path, self.page_num, self.line_num, self.score, self.line, self.fragment
        )
    }
}

/// Encode a `(doc_idx, page_idx)` pair as the stored identifier.
pub fn encode_id(doc_idx: u64, page_idx: u32) -> String {
    format!("{doc_idx:04X}.{page_idx}")
}

/// Decode a stored identifier back into `(doc_idx, page_idx)`.
pub fn decode_id(id: &str) -> Result<(u64, u32)> {
    let (doc_part, page_part) = id
        .split_once('.')
        .ok_or_else(|| PinpointError::bad_format(format!("bad id {id:?}")))?;
    let doc_idx = u64::from_str_radix(doc_part, 16)
        .map_err(|e| PinpointError::bad_format(format!("bad doc index in id {id:?}: {e}")))?;
    let page_idx = page_part
        .parse::<u32>()
        .map_err(|e| PinpointError::bad_format(format!("bad page index in id {id:?}: {e}")))?;
    Ok((doc_idx, page_idx))
}

/// Run `term` against the index and resolve every hit through the store.
///
/// Hits that cannot be resolved to a byte range are dropped from the match
/// list; the total count is unaffected.
pub fn search(
    store: &PositionsStore,
    index: &SearchIndex,
    term: &str,
    max_results: usize,
) -> Result<PdfMatchSet> {
    if store.is_empty() {
        return Ok(PdfMatchSet::default());
    }
    let results = index.search(term, max_results)?;
    log::debug!(
        "search term={term:?} total={} hits={}",
        results.total,
        results.hits.len()
    );

    let mut matches = Vec::with_capacity(results.hits.len());
    for hit in &results.hits {
        match resolve_hit(store, hit) {
            Ok(m) => matches.push(m),
            Err(PinpointError::NoMatch) => {
                log::debug!("dropping unresolvable hit {:?}", hit.id);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(PdfMatchSet {
        total_matches: results.total,
        search_duration: results.duration,
        matches,
    })
}

/// Resolve one engine hit to a [`PdfMatch`], looking up everything the
/// engine deliberately does not store.
fn resolve_hit(store: &PositionsStore, hit: &crate::index::IndexHit) -> Result<PdfMatch> {
    let (doc_idx, page_idx) = decode_id(&hit.id)?;
    let range = hit.term_ranges.first().ok_or(PinpointError::NoMatch)?;
    let (start, end) = (range.start as u32, range.end as u32);

    let (in_path, page_num, dpl) = store.read_doc_page_positions(doc_idx, page_idx)?;
    let text = store.read_doc_page_text(doc_idx, page_idx)?;
    let (line_num, line) = locations::line_number(&text, start).ok_or(PinpointError::NoMatch)?;

    Ok(PdfMatch {
        in_path,
        page_num,
        line_num,
        line,
        dpl,
        doc_idx,
        page_idx,
        score: hit.score,
        fragment: hit.fragment.clone(),
        start,
        end,
    })
}
