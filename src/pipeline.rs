//! Concurrent extraction pipeline.
//!
//! Two granularities over the same worker-pool shape: whole documents, or
//! individual pages streamed as they are extracted. In both, workers do
//! only the pure work (read bytes, hash, extract); the store and the index
//! sink stay on the caller's thread, fed in completion order.
//!
//! Cancellation is a `done` channel every worker selects on: dropping its
//! sender wakes all workers, which finish the item in flight and exit on
//! their next channel read.

use std::fs;
use std::io;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::driver::{extract_pages, DriverConfig};
use crate::error::{PinpointError, Result};
use crate::extract::{Extractor, TextRun};
use crate::store::FileDesc;

/// Builds one extractor per worker thread. Backends like pdfium are not
/// safe to share across threads, so every worker gets its own instance.
pub type ExtractorFactory = dyn Fn() -> Result<Box<dyn Extractor>> + Send + Sync;

/// Dispatch unit of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// One work item per document; results arrive per document.
    Doc,
    /// One work item per document; results stream per page.
    Page,
}

/// A document's worth of extraction output.
#[derive(Debug)]
pub struct ExtractedDoc {
    pub fd: FileDesc,
    pub pages: Vec<(u32, String, Vec<TextRun>)>,
}

/// Result of one document-granularity job, in completion order.
#[derive(Debug)]
pub struct DocResult {
    /// Submission index, for callers comparing submission to completion.
    pub idx: usize,
    pub in_path: String,
    pub result: Result<ExtractedDoc>,
}

/// One streamed page from a page-granularity job.
#[derive(Debug)]
pub struct PageResult {
    pub idx: usize,
    pub fd: FileDesc,
    pub page_num: u32,
    pub text: String,
    pub runs: Vec<TextRun>,
}

/// End-of-document marker for a page-granularity job, carrying the page
/// numbers that were streamed so the aggregator knows when it is done.
#[derive(Debug)]
pub struct JobCompletion {
    pub idx: usize,
    pub in_path: String,
    pub page_nums: Vec<u32>,
    pub error: Option<PinpointError>,
}

struct DocWork {
    idx: usize,
    in_path: String,
}

fn channel_closed(what: &str) -> PinpointError {
    PinpointError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("{what} channel closed"),
    ))
}

/// A pool of workers extracting whole documents.
pub struct ExtractDocQueue {
    work_tx: Option<Sender<DocWork>>,
    done_tx: Option<Sender<()>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl ExtractDocQueue {
    /// Start `num_workers` workers sending one [`DocResult`] per queued
    /// document to `results`.
    pub fn new(
        num_workers: usize,
        factory: Arc<ExtractorFactory>,
        config: DriverConfig,
        results: Sender<DocResult>,
    ) -> Self {
        let (work_tx, work_rx) = bounded::<DocWork>(num_workers.max(1));
        let (done_tx, done_rx) = bounded::<()>(0);
        let mut handles = Vec::with_capacity(num_workers);
        for i in 0..num_workers.max(1) {
            let work_rx = work_rx.clone();
            let done_rx = done_rx.clone();
            let results = results.clone();
            let factory = Arc::clone(&factory);
            let config = config.clone();
            let handle = thread::Builder::new()
                .name(format!("extract-doc-{i}"))
                .spawn(move || {
                    let extractor = match factory() {
                        Ok(extractor) => extractor,
                        Err(err) => {
                            log::error!("worker {i}: could not build extractor: {err}");
                            return;
                        }
                    };
                    loop {
                        select! {
                            recv(work_rx) -> msg => {
                                let Ok(work) = msg else { break };
                                let result =
                                    extract_doc_work(extractor.as_ref(), &config, &work.in_path);
                                let sent = results.send(DocResult {
                                    idx: work.idx,
                                    in_path: work.in_path,
                                    result,
                                });
                                if sent.is_err() {
                                    break;
                                }
                            }
                            recv(done_rx) -> _ => break,
                        }
                    }
                })
                .expect("spawn extraction worker");
            handles.push(handle);
        }
        ExtractDocQueue {
            work_tx: Some(work_tx),
            done_tx: Some(done_tx),
            handles,
        }
    }

    /// Enqueue one document. Blocks when all workers are busy and the
    /// work channel is full.
    pub fn queue(&self, idx: usize, in_path: &str) -> Result<()> {
        self.work_tx
            .as_ref()
            .ok_or_else(|| channel_closed("work"))?
            .send(DocWork {
                idx,
                in_path: in_path.to_string(),
            })
            .map_err(|_| channel_closed("work"))
    }

    /// Signal cancellation: workers drop pending work at their next read.
    pub fn cancel(&mut self) {
        self.done_tx.take();
    }

    /// Stop accepting work and wait for the workers to drain and exit.
    pub fn close(mut self) {
        self.work_tx.take();
        self.done_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn extract_doc_work(
    extractor: &dyn Extractor,
    config: &DriverConfig,
    in_path: &str,
) -> Result<ExtractedDoc> {
    let bytes = fs::read(in_path)?;
    let fd = FileDesc::from_bytes(in_path, &bytes);
    let pages = extract_pages(extractor, config, in_path, &bytes)?;
    Ok(ExtractedDoc { fd, pages })
}

/// A pool of workers streaming pages as they are extracted.
pub struct ExtractPageQueue {
    work_tx: Option<Sender<DocWork>>,
    done_tx: Option<Sender<()>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl ExtractPageQueue {
    /// Start `num_workers` workers. Every successfully extracted page goes
    /// to `pages`; one [`JobCompletion`] per document goes to `jobs`.
    pub fn new(
        num_workers: usize,
        factory: Arc<ExtractorFactory>,
        config: DriverConfig,
        pages: Sender<PageResult>,
        jobs: Sender<JobCompletion>,
    ) -> Self {
        let (work_tx, work_rx) = bounded::<DocWork>(num_workers.max(1));
        let (done_tx, done_rx) = bounded::<()>(0);
        let mut handles = Vec::with_capacity(num_workers);
        for i in 0..num_workers.max(1) {
            let work_rx = work_rx.clone();
            let done_rx = done_rx.clone();
            let pages = pages.clone();
            let jobs = jobs.clone();
            let factory = Arc::clone(&factory);
            let config = config.clone();
            let handle = thread::Builder::new()
                .name(format!("extract-page-{i}"))
                .spawn(move || {
                    let extractor = match factory() {
                        Ok(extractor) => extractor,
                        Err(err) => {
                            log::error!("worker {i}: could not build extractor: {err}");
                            return;
                        }
                    };
                    loop {
                        select! {
                            recv(work_rx) -> msg => {
                                let Ok(work) = msg else { break };
                                let completion =
                                    extract_page_work(extractor.as_ref(), &config, &work, &pages);
                                if jobs.send(completion).is_err() {
                                    break;
                                }
                            }
                            recv(done_rx) -> _ => break,
                        }
                    }
                })
                .expect("spawn extraction worker");
            handles.push(handle);
        }
        ExtractPageQueue {
            work_tx: Some(work_tx),
            done_tx: Some(done_tx),
            handles,
        }
    }

    /// Enqueue one document.
    pub fn queue(&self, idx: usize, in_path: &str) -> Result<()> {
        self.work_tx
            .as_ref()
            .ok_or_else(|| channel_closed("work"))?
            .send(DocWork {
                idx,
                in_path: in_path.to_string(),
            })
            .map_err(|_| channel_closed("work"))
    }

    /// Signal cancellation: workers drop pending work at their next read.
    pub fn cancel(&mut self) {
        self.done_tx.take();
    }

    /// Stop accepting work and wait for the workers to drain and exit.
    pub fn close(mut self) {
        self.work_tx.take();
        self.done_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn extract_page_work(
    extractor: &dyn Extractor,
    config: &DriverConfig,
    work: &DocWork,
    pages: &Sender<PageResult>,
) -> JobCompletion {
    let bytes = match fs::read(&work.in_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            return JobCompletion {
                idx: work.idx,
                in_path: work.in_path.clone(),
                page_nums: Vec::new(),
                error: Some(err.into()),
            }
        }
    };
    let fd = FileDesc::from_bytes(&work.in_path, &bytes);

    // Stream pages out as the extractor produces them; the buffered
    // extract_pages is deliberately not reused here.
    let idx = work.idx;
    let mut page_nums = Vec::new();
    let result = crate::driver::guard_extractor(config, &work.in_path, || {
        extractor.process_pages(&work.in_path, &bytes, &mut |page_num, text, runs| {
            if text.is_empty() {
                return Ok(());
            }
            pages
                .send(PageResult {
                    idx,
                    fd: fd.clone(),
                    page_num,
                    text,
                    runs,
                })
                .map_err(|_| channel_closed("page"))?;
            page_nums.push(page_num);
            Ok(())
        })
    });
    JobCompletion {
        idx: work.idx,
        in_path: work.in_path.clone(),
        page_nums,
        error: result.err(),
    }
}

/// Drive the aggregation side of the page-granularity pipeline: run
/// `on_page` for every streamed page until every queued job has completed
/// and every page it reported has been seen.
pub fn complete_page_jobs(
    num_jobs: usize,
    pages: Receiver<PageResult>,
    jobs: Receiver<JobCompletion>,
    mut on_page: impl FnMut(PageResult) -> Result<()>,
) -> Result<Vec<JobCompletion>> {
    let mut completions = Vec::with_capacity(num_jobs);
    let mut jobs_done = 0usize;
    let mut pages_done = 0usize;
    let mut pages_expected = 0usize;
    while jobs_done < num_jobs || pages_done < pages_expected {
        select! {
            recv(jobs) -> msg => {
                let completion = msg.map_err(|_| channel_closed("jobs"))?;
                jobs_done += 1;
                pages_expected += completion.page_nums.len();
                completions.push(completion);
            }
            recv(pages) -> msg => {
                let page = msg.map_err(|_| channel_closed("page"))?;
                on_page(page)?;
                pages_done += 1;
            }
        }
    }
    Ok(completions)
}

/// Default worker count: one per CPU, leaving one core for the driver.
pub fn default_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}
