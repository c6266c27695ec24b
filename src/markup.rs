//! Builds the plan for a highlight output PDF.
//!
//! A [`MarkupList`] collects match rectangles grouped by
//! `(input path, page number)`, capping the number of distinct pages and
//! the rectangles kept per page, then hands the ordered plan to a
//! [`PdfComposer`] to stamp pages and draw borders.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use crate::error::{PinpointError, Result};
use crate::search::PdfMatch;

/// Rectangles kept per output page; later matches on the same page are
/// dropped.
const MAX_RECTS_PER_PAGE: usize = 3;

/// A rectangle to draw, in PDF user-space points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkupRect {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl MarkupRect {
    /// A box thinner than a point in either axis cannot be drawn.
    pub fn is_degenerate(&self) -> bool {
        (self.urx - self.llx).abs() < 1.0 || (self.ury - self.lly).abs() < 1.0
    }
}

/// One output page: a source page and the rectangles to draw on it.
#[derive(Debug, Clone)]
pub struct MarkupPage {
    pub in_path: String,
    /// PDF page number (1-based) in the source document.
    pub page_num: u32,
    pub rects: Vec<MarkupRect>,
}

/// Backend that stamps source pages into a fresh document and draws the
/// bordered rectangles. One composer instance handles the whole plan so
/// PDF objects can be reused across pages.
pub trait PdfComposer {
    fn compose(&self, pages: &[MarkupPage], out_path: &Path) -> Result<()>;
}

/// Ordered collection of pages to mark up.
#[derive(Debug, Default)]
pub struct MarkupList {
    max_pages: usize,
    sources: Vec<(String, u32)>,
    source_set: HashSet<(String, u32)>,
    contents: HashMap<(String, u32), Vec<MarkupRect>>,
}

impl MarkupList {
    /// A list that keeps at most `max_pages` distinct source pages.
    pub fn new(max_pages: usize) -> Self {
        MarkupList {
            max_pages,
            ..Default::default()
        }
    }

    /// Number of distinct source pages collected so far.
    pub fn num_pages(&self) -> usize {
        self.sources.len()
    }

    /// Add one rectangle for `(in_path, page_num)`. Silently drops the
    /// rectangle once the page cap or the per-page rectangle cap is hit.
    pub fn add_rect(&mut self, in_path: &str, page_num: u32, rect: MarkupRect) {
        let key = (in_path.to_string(), page_num);
        if !self.source_set.contains(&key) {
            if self.source_set.len() >= self.max_pages {
                log::info!("markup page cap of {} reached, dropping {in_path}:{page_num}", self.max_pages);
                return;
            }
            self.source_set.insert(key.clone());
            self.sources.push(key.clone());
        }
        let rects = self.contents.entry(key).or_default();
        if rects.len() >= MAX_RECTS_PER_PAGE {
            return;
        }
        rects.push(rect);
    }

    /// Add the bounding rectangle of a resolved match. Matches whose
    /// rectangle could not be resolved are skipped with a warning.
    pub fn add_match(&mut self, m: &PdfMatch) {
        let rect = m.bounding_rect();
        if rect.is_zero() {
            log::warn!(
                "no rectangle for match on {}:{} at {}..{}",
                m.in_path,
                m.page_num,
                m.start,
                m.end
            );
            return;
        }
        self.add_rect(
            &m.in_path,
            m.page_num,
            MarkupRect {
                llx: rect.llx as f64,
                lly: rect.lly as f64,
                urx: rect.urx as f64,
                ury: rect.ury as f64,
            },
        );
    }

    /// The pages in first-seen order.
    pub fn plan(&self) -> Vec<MarkupPage> {
        self.sources
            .iter()
            .map(|key| MarkupPage {
                in_path: key.0.clone(),
                page_num: key.1,
                rects: self.contents.get(key).cloned().unwrap_or_default(),
            })
            .collect()
    }

    /// Validate the plan and write the output PDF through `composer`.
    pub fn save_output_pdf(&self, composer: &dyn PdfComposer, out_path: &Path) -> Result<()> {
        let pages = self.plan();
        for page in &pages {
            if page.page_num == 0 {
                return Err(PinpointError::ZeroPageNumber);
            }
            for rect in &page.rects {
                if rect.is_degenerate() {
                    return Err(PinpointError::bad_format(format!(
                        "degenerate rectangle {rect:?} on {}:{}",
                        page.in_path, page.page_num
                    )));
                }
            }
        }
        log::info!("writing {} marked-up pages to {}", pages.len(), out_path.display());
        composer.compose(&pages, out_path)
    }
}

impl fmt::Display for MarkupList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "max_pages: {}", self.max_pages)?;
        for (i, (path, page_num)) in self.sources.iter().enumerate() {
            writeln!(f, "{i:6}: {path:?}:{page_num}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(llx: f64, lly: f64, urx: f64, ury: f64) -> MarkupRect {
        MarkupRect { llx, lly, urx, ury }
    }

    #[test]
    fn test_page_cap_applies_to_distinct_pages() {
        let mut list = MarkupList::new(2);
        list.add_rect("a.pdf", 1, rect(0.0, 0.0, 10.0, 10.0));
        list.add_rect("a.pdf", 2, rect(0.0, 0.0, 10.0, 10.0));
        list.add_rect("b.pdf", 1, rect(0.0, 0.0, 10.0, 10.0)); // over the cap
        list.add_rect("a.pdf", 1, rect(5.0, 5.0, 20.0, 20.0)); // existing page: fine
        assert_eq!(list.num_pages(), 2);
        let plan = list.plan();
        assert_eq!(plan[0].rects.len(), 2);
    }

    #[test]
    fn test_per_page_rect_cap() {
        let mut list = MarkupList::new(10);
        for i in 0..5 {
            list.add_rect("a.pdf", 1, rect(0.0, 0.0, 10.0 + i as f64, 10.0));
        }
        assert_eq!(list.plan()[0].rects.len(), MAX_RECTS_PER_PAGE);
    }

    #[test]
    fn test_plan_preserves_first_seen_order() {
        let mut list = MarkupList::new(10);
        list.add_rect("b.pdf", 7, rect(0.0, 0.0, 10.0, 10.0));
        list.add_rect("a.pdf", 1, rect(0.0, 0.0, 10.0, 10.0));
        list.add_rect("b.pdf", 7, rect(1.0, 1.0, 11.0, 11.0));
        let plan = list.plan();
        assert_eq!(plan.len(), 2);
        assert_eq!((plan[0].in_path.as_str(), plan[0].page_num), ("b.pdf", 7));
        assert_eq!((plan[1].in_path.as_str(), plan[1].page_num), ("a.pdf", 1));
    }

    struct NullComposer;
    impl PdfComposer for NullComposer {
        fn compose(&self, _pages: &[MarkupPage], _out_path: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_degenerate_rect_rejected_at_save() {
        let mut list = MarkupList::new(10);
        list.add_rect("a.pdf", 1, rect(5.0, 5.0, 5.2, 50.0));
        match list.save_output_pdf(&NullComposer, Path::new("out.pdf")) {
            Err(PinpointError::BadFormat(_)) => {}
            other => panic!("expected BadFormat, got {other:?}"),
        }
    }
}
