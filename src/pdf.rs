//! pdfium glue: the PDF-backed [`Extractor`] and [`PdfComposer`].
//!
//! This is the only module that names pdfium types. Extraction walks the
//! character stream of each page and groups consecutive characters into
//! runs at whitespace boundaries, unioning the per-character boxes; the
//! page text is built from the same stream, so run offsets are byte
//! offsets into exactly the text that gets indexed.
//!
//! pdfium is not safe to share across threads, so the concurrent pipeline
//! constructs one [`PdfiumExtractor`] per worker via [`extractor_factory`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use pdfium_render::prelude::*;

use crate::error::{PinpointError, Result};
use crate::extract::{BoundingBox, Extractor, PageSink, TextRun};
use crate::markup::{MarkupPage, PdfComposer};
use crate::pipeline::ExtractorFactory;

/// Border drawn around each match rectangle.
const BORDER_WIDTH_PT: f32 = 1.0;

fn bind_pdfium() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| PinpointError::extract(format!("could not bind pdfium: {e}")))?;
    Ok(Pdfium::new(bindings))
}

/// Text-with-geometry extraction backed by pdfium.
pub struct PdfiumExtractor {
    pdfium: Pdfium,
}

impl PdfiumExtractor {
    pub fn new() -> Result<Self> {
        Ok(PdfiumExtractor {
            pdfium: bind_pdfium()?,
        })
    }
}

impl Extractor for PdfiumExtractor {
    fn process_pages(&self, in_path: &str, bytes: &[u8], on_page: &mut PageSink) -> Result<()> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PinpointError::extract(format!("could not open {in_path}: {e}")))?;
        let num_pages = document.pages().len();
        for index in 0..num_pages {
            let page = match document.pages().get(index) {
                Ok(page) => page,
                Err(e) => {
                    log::error!("could not load {in_path} page {}: {e}", index + 1);
                    continue;
                }
            };
            let (text, runs) = match page_text_runs(&page) {
                Ok(extracted) => extracted,
                Err(e) => {
                    log::error!("could not extract {in_path} page {}: {e}", index + 1);
                    continue;
                }
            };
            on_page(u32::from(index) + 1, text, runs)?;
        }
        Ok(())
    }
}

/// An extractor factory for the concurrent pipeline: each worker binds its
/// own pdfium instance.
pub fn extractor_factory() -> Arc<ExtractorFactory> {
    Arc::new(|| PdfiumExtractor::new().map(|e| Box::new(e) as Box<dyn Extractor>))
}

struct RunBuilder {
    offset: u32,
    text: String,
    whitespace: bool,
    bbox: Option<BoundingBox>,
}

impl RunBuilder {
    fn finish(self) -> TextRun {
        TextRun {
            offset: self.offset,
            text: self.text,
            bbox: self.bbox.unwrap_or_default(),
        }
    }
}

fn union(bbox: Option<BoundingBox>, rect: &PdfRect) -> Option<BoundingBox> {
    let (llx, lly, urx, ury) = (
        rect.left.value as f64,
        rect.bottom.value as f64,
        rect.right.value as f64,
        rect.top.value as f64,
    );
    Some(match bbox {
        None => BoundingBox { llx, lly, urx, ury },
        Some(b) => BoundingBox {
            llx: b.llx.min(llx),
            lly: b.lly.min(lly),
            urx: b.urx.max(urx),
            ury: b.ury.max(ury),
        },
    })
}

/// Rebuild the page text from the character stream and group characters
/// into runs at whitespace boundaries.
fn page_text_runs(page: &PdfPage) -> Result<(String, Vec<TextRun>)> {
    let text_page = page
        .text()
        .map_err(|e| PinpointError::extract(format!("no text object: {e}")))?;

    let mut text = String::new();
    let mut runs: Vec<TextRun> = Vec::new();
    let mut current: Option<RunBuilder> = None;

    for ch in text_page.chars().iter() {
        let Some(c) = ch.unicode_char() else {
            continue;
        };
        // pdfium reports line breaks as \r\n pairs.
        if c == '\r' {
            continue;
        }
        let whitespace = c.is_whitespace();
        let boundary = match &current {
            Some(run) => run.whitespace != whitespace,
            None => true,
        };
        if boundary {
            if let Some(run) = current.take() {
                runs.push(run.finish());
            }
            current = Some(RunBuilder {
                offset: text.len() as u32,
                text: String::new(),
                whitespace,
                bbox: None,
            });
        }
        let run = current.as_mut().expect("run just created");
        run.text.push(c);
        text.push(c);
        // Whitespace often has no usable bounds; a zero box is permitted.
        if let Ok(bounds) = ch.loose_bounds() {
            run.bbox = union(run.bbox.take(), &bounds);
        }
    }
    if let Some(run) = current.take() {
        runs.push(run.finish());
    }
    Ok((text, runs))
}

/// Highlight-output composer backed by pdfium: stamps each source page
/// into a fresh document and strokes a blue border per rectangle.
pub struct PdfiumComposer {
    pdfium: Pdfium,
}

impl PdfiumComposer {
    pub fn new() -> Result<Self> {
        Ok(PdfiumComposer {
            pdfium: bind_pdfium()?,
        })
    }
}

impl PdfComposer for PdfiumComposer {
    fn compose(&self, pages: &[MarkupPage], out_path: &Path) -> Result<()> {
        let mut output = self
            .pdfium
            .create_new_pdf()
            .map_err(|e| PinpointError::extract(format!("could not create output pdf: {e}")))?;
        let mut sources: HashMap<&str, PdfDocument> = HashMap::new();

        for (dest_index, page) in pages.iter().enumerate() {
            if !sources.contains_key(page.in_path.as_str()) {
                let document = self
                    .pdfium
                    .load_pdf_from_file(&page.in_path, None)
                    .map_err(|e| {
                        PinpointError::extract(format!("could not open {}: {e}", page.in_path))
                    })?;
                sources.insert(page.in_path.as_str(), document);
            }
            let source = sources
                .get(page.in_path.as_str())
                .expect("source just inserted");

            output
                .pages_mut()
                .copy_page_from_document(
                    source,
                    page.page_num as u16 - 1,
                    dest_index as u16,
                )
                .map_err(|e| {
                    PinpointError::extract(format!(
                        "could not stamp {}:{}: {e}",
                        page.in_path, page.page_num
                    ))
                })?;
            let mut dest_page = output
                .pages()
                .get(dest_index as u16)
                .map_err(|e| PinpointError::extract(format!("no stamped page: {e}")))?;

            for rect in &page.rects {
                log::debug!(
                    "drawing {rect:?} on {}:{} -> output page {dest_index}",
                    page.in_path,
                    page.page_num
                );
                let outline = PdfPagePathObject::new_rect(
                    &output,
                    PdfRect::new(
                        PdfPoints::new(rect.lly as f32),
                        PdfPoints::new(rect.llx as f32),
                        PdfPoints::new(rect.ury as f32),
                        PdfPoints::new(rect.urx as f32),
                    ),
                    Some(PdfColor::new(0, 0, 255, 255)),
                    Some(PdfPoints::new(BORDER_WIDTH_PT)),
                    None,
                )
                .map_err(|e| PinpointError::extract(format!("could not build rectangle: {e}")))?;
                dest_page
                    .objects_mut()
                    .add_path_object(outline)
                    .map_err(|e| PinpointError::extract(format!("could not draw rectangle: {e}")))?;
            }
        }

        output
            .save_to_file(out_path)
            .map_err(|e| PinpointError::extract(format!("could not save {}: {e}", out_path.display())))?;
        Ok(())
    }
}
