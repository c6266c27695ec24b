//! The exterior, synchronous API: index a corpus, search it, reuse an
//! existing store, and emit highlight PDFs.
//!
//! These calls block until the whole corpus is indexed or the query
//! completes. Inside the concurrent variants, workers only extract;
//! catalog mutation and the index sink stay on the calling thread.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::bounded;

use crate::driver::{self, DriverConfig};
use crate::error::{PinpointError, Result};
use crate::extract::Extractor;
use crate::index::SearchIndex;
use crate::markup::{MarkupList, PdfComposer};
use crate::pipeline::{
    complete_page_jobs, ExtractDocQueue, ExtractPageQueue, ExtractorFactory, Granularity,
};
use crate::search::{self, encode_id, PdfMatchSet};
use crate::store::{DocPositions, PositionsStore};

/// Default cap on distinct pages in a highlight output PDF.
pub const DEFAULT_MARKUP_PAGES: usize = 50;

/// How and where to build the index.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Store root; `None` keeps everything in memory.
    pub store_dir: Option<PathBuf>,
    /// Remove any existing store first.
    pub force_create: bool,
    /// Append to an existing index instead of refusing.
    pub allow_append: bool,
    pub driver: DriverConfig,
}

/// Progress callback, called once per submitted document.
pub type ReportFn<'a> = dyn Fn(&str) + 'a;

fn open_outputs(options: &IndexOptions) -> Result<(PositionsStore, SearchIndex)> {
    let mut store = PositionsStore::open(options.store_dir.as_deref(), options.force_create)?;
    store.set_dump_positions(options.driver.dump_positions);
    let index = match options.store_dir.as_deref() {
        None => SearchIndex::create_in_ram()?,
        Some(dir) => {
            fs::create_dir_all(dir)?;
            SearchIndex::create_in_dir(
                &PositionsStore::index_dir(dir),
                options.force_create,
                options.allow_append,
            )?
        }
    };
    Ok((store, index))
}

/// Feed one extracted document's pages to the index sink.
fn index_doc_pages(index: &mut SearchIndex, pages: &[driver::DocPageText]) -> Result<usize> {
    for page in pages {
        index.add_page(&encode_id(page.doc_idx, page.page_idx), &page.text)?;
    }
    Ok(pages.len())
}

/// Index the PDF files in `paths` sequentially.
///
/// Documents that turn out to be duplicates or that fail extraction are
/// logged and skipped; the rest of the corpus is still indexed. Returns
/// the store, the index (committed), and the number of pages indexed.
pub fn index_files(
    paths: &[String],
    options: &IndexOptions,
    extractor: &dyn Extractor,
    report: Option<&ReportFn>,
) -> Result<(PositionsStore, SearchIndex, usize)> {
    log::info!("indexing {} PDF files", paths.len());
    let (mut store, mut index) = open_outputs(options)?;
    let mut total_pages = 0;

    for (i, in_path) in paths.iter().enumerate() {
        if let Some(report) = report {
            report(&format!("{:3} of {}: {in_path:?}", i + 1, paths.len()));
        }
        let bytes = match fs::read(in_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("could not read {in_path}: {err}");
                continue;
            }
        };
        match driver::extract_doc_positions(&mut store, extractor, &options.driver, in_path, &bytes)
        {
            Ok(pages) => total_pages += index_doc_pages(&mut index, &pages)?,
            Err(err) if err.is_document_local() => {
                log::warn!("skipping {in_path}: {err}");
            }
            Err(err) => return Err(err),
        }
    }

    index.commit()?;
    store.flush()?;
    Ok((store, index, total_pages))
}

/// Index PDF content supplied as open readers, named by the corresponding
/// entry of `paths`.
pub fn index_readers<R: Read>(
    paths: &[String],
    readers: Vec<R>,
    options: &IndexOptions,
    extractor: &dyn Extractor,
    report: Option<&ReportFn>,
) -> Result<(PositionsStore, SearchIndex, usize)> {
    let (mut store, mut index) = open_outputs(options)?;
    let mut total_pages = 0;

    for (i, (in_path, mut reader)) in paths.iter().zip(readers).enumerate() {
        if let Some(report) = report {
            report(&format!("{:3} of {}: {in_path:?}", i + 1, paths.len()));
        }
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        match driver::extract_doc_positions(&mut store, extractor, &options.driver, in_path, &bytes)
        {
            Ok(pages) => total_pages += index_doc_pages(&mut index, &pages)?,
            Err(err) if err.is_document_local() => {
                log::warn!("skipping {in_path}: {err}");
            }
            Err(err) => return Err(err),
        }
    }

    index.commit()?;
    store.flush()?;
    Ok((store, index, total_pages))
}

/// Index the PDF files in `paths` across `workers` worker threads.
///
/// Each worker builds its own extractor via `factory`. Results are folded
/// into the store and the index on the calling thread, in completion
/// order.
pub fn index_files_concurrent(
    paths: &[String],
    options: &IndexOptions,
    workers: usize,
    granularity: Granularity,
    factory: Arc<ExtractorFactory>,
    report: Option<&ReportFn>,
) -> Result<(PositionsStore, SearchIndex, usize)> {
    log::info!(
        "indexing {} PDF files with {workers} workers ({granularity:?} granularity)",
        paths.len()
    );
    let (mut store, mut index) = open_outputs(options)?;
    let total_pages = match granularity {
        Granularity::Doc => {
            run_doc_pipeline(paths, options, workers, factory, report, &mut store, &mut index)?
        }
        Granularity::Page => {
            run_page_pipeline(paths, options, workers, factory, report, &mut store, &mut index)?
        }
    };
    index.commit()?;
    store.flush()?;
    Ok((store, index, total_pages))
}

fn run_doc_pipeline(
    paths: &[String],
    options: &IndexOptions,
    workers: usize,
    factory: Arc<ExtractorFactory>,
    report: Option<&ReportFn>,
    store: &mut PositionsStore,
    index: &mut SearchIndex,
) -> Result<usize> {
    // Result capacity covers the whole corpus so no worker ever stalls
    // on a send.
    let (result_tx, result_rx) = bounded(paths.len().max(1));
    let queue = ExtractDocQueue::new(workers, factory, options.driver.clone(), result_tx);
    for (i, in_path) in paths.iter().enumerate() {
        queue.queue(i, in_path)?;
    }

    let mut total_pages = 0;
    for done in 0..paths.len() {
        let result = result_rx
            .recv()
            .map_err(|_| PinpointError::extract("extraction workers exited early"))?;
        if let Some(report) = report {
            report(&format!(
                "{:3} of {}: {:?} (submitted {})",
                done + 1,
                paths.len(),
                result.in_path,
                result.idx
            ));
        }
        let extracted = match result.result {
            Ok(extracted) => extracted,
            Err(err) => {
                log::warn!("skipping {}: {err}", result.in_path);
                continue;
            }
        };
        match driver::store_extracted_doc(store, &extracted.fd, extracted.pages) {
            Ok(pages) => total_pages += index_doc_pages(index, &pages)?,
            Err(err) if err.is_document_local() => {
                log::warn!("skipping {}: {err}", result.in_path);
            }
            Err(err) => return Err(err),
        }
    }
    queue.close();
    Ok(total_pages)
}

enum DocSlot {
    Active(DocPositions),
    Skipped,
}

fn run_page_pipeline(
    paths: &[String],
    options: &IndexOptions,
    workers: usize,
    factory: Arc<ExtractorFactory>,
    report: Option<&ReportFn>,
    store: &mut PositionsStore,
    index: &mut SearchIndex,
) -> Result<usize> {
    let (page_tx, page_rx) = bounded(workers.max(1) * 4);
    let (jobs_tx, jobs_rx) = bounded(paths.len().max(1));
    let queue = ExtractPageQueue::new(workers, factory, options.driver.clone(), page_tx, jobs_tx);

    let mut docs: HashMap<usize, DocSlot> = HashMap::new();
    let mut total_pages = 0;
    // Feed the work queue from its own thread: with the page channel
    // bounded, queueing and draining from one thread would deadlock.
    let completions = std::thread::scope(|scope| {
        scope.spawn(|| {
            for (i, in_path) in paths.iter().enumerate() {
                if let Err(err) = queue.queue(i, in_path) {
                    log::error!("could not queue {in_path}: {err}");
                    break;
                }
            }
        });
        complete_page_jobs(paths.len(), page_rx, jobs_rx, |page| {
            let slot = match docs.entry(page.idx) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let slot = match store.create_doc(&page.fd) {
                        Ok(doc) => DocSlot::Active(doc),
                        Err(PinpointError::DuplicatePdf(first)) => {
                            log::warn!(
                                "{:?} is the same PDF as {first:?}, ignoring",
                                page.fd.in_path
                            );
                            DocSlot::Skipped
                        }
                        Err(err) => return Err(err),
                    };
                    entry.insert(slot)
                }
            };
            let DocSlot::Active(doc) = slot else {
                return Ok(());
            };
            let dpl = driver::runs_to_page_locations(
                doc.doc_idx(),
                page.page_num,
                &page.fd.in_path,
                &page.runs,
            );
            let page_idx = doc.add_page(page.page_num, dpl, &page.text)?;
            index.add_page(&encode_id(doc.doc_idx(), page_idx), &page.text)?;
            total_pages += 1;
            Ok(())
        })
    })?;
    queue.close();

    for completion in &completions {
        if let Some(report) = report {
            report(&format!(
                "{:?}: {} pages",
                completion.in_path,
                completion.page_nums.len()
            ));
        }
        if let Some(err) = &completion.error {
            log::warn!("document {:?} failed: {err}", completion.in_path);
        }
    }
    for (_, slot) in docs.drain() {
        if let DocSlot::Active(doc) = slot {
            store.finish_doc(doc)?;
        }
    }
    Ok(total_pages)
}

/// Reopen an existing persistent store and its index for appending.
pub fn reuse_index(store_dir: &Path) -> Result<(PositionsStore, SearchIndex)> {
    let store = PositionsStore::open(Some(store_dir), false)?;
    let index = SearchIndex::create_in_dir(&PositionsStore::index_dir(store_dir), false, true)?;
    Ok((store, index))
}

/// Search an existing persistent store.
pub fn search_pdf_index(store_dir: &Path, term: &str, max_results: usize) -> Result<PdfMatchSet> {
    let store = PositionsStore::open(Some(store_dir), false)?;
    let index = SearchIndex::open_in_dir(&PositionsStore::index_dir(store_dir))?;
    search::search(&store, &index, term, max_results)
}

/// Write a highlight PDF for `matches`, drawing every match rectangle on
/// a copy of its source page.
pub fn markup_results(
    matches: &PdfMatchSet,
    composer: &dyn PdfComposer,
    out_path: &Path,
    max_pages: usize,
) -> Result<()> {
    let mut list = MarkupList::new(max_pages);
    for m in &matches.matches {
        list.add_match(m);
    }
    list.save_output_pdf(composer, out_path)
}
