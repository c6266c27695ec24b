//! Inverted-index glue.
//!
//! [`SearchIndex`] is the only module that talks to the index engine
//! (tantivy). The schema is deliberately tiny, just `{id, text}`, so the
//! engine never carries bounding boxes; those stay in the positions store
//! and are joined back in at query time via the `id`.
//!
//! A query returns, per hit, the stored `id`, the BM25 score, a highlighted
//! fragment, and the byte ranges of the matched terms inside the page text.
//! The ranges are recovered by running the field's own tokenizer over the
//! stored text and matching tokens against the parsed query's terms, so
//! they agree with whatever analysis the engine applied at indexing time.

use std::collections::HashSet;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::time::{Duration, Instant};

use tantivy::collector::{Count, TopDocs};
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::snippet::SnippetGenerator;
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexWriter, TantivyDocument, Term};

use crate::error::{PinpointError, Result};

/// Heap budget for the index writer.
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// One hit as returned by the engine, before store resolution.
#[derive(Debug, Clone)]
pub struct IndexHit {
    /// The stored composite identifier (`"{doc_idx:04X}.{page_idx}"`).
    pub id: String,
    pub score: f32,
    /// Highlighted fragment of the page text.
    pub fragment: String,
    /// Byte ranges of matched terms within the page text, ascending.
    pub term_ranges: Vec<Range<usize>>,
}

/// Raw result of one engine query.
#[derive(Debug, Clone)]
pub struct IndexSearchResults {
    /// Total candidate count, independent of the result size cap.
    pub total: usize,
    pub duration: Duration,
    pub hits: Vec<IndexHit>,
}

/// Wrapper around one tantivy index with the `{id, text}` page schema.
pub struct SearchIndex {
    index: Index,
    id_field: Field,
    text_field: Field,
    writer: Option<IndexWriter>,
}

fn page_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("text", TEXT | STORED);
    builder.build()
}

impl SearchIndex {
    /// Create (or, with `allow_append`, reopen) an on-disk index in `dir`.
    /// With `force_create` any existing index is removed first.
    pub fn create_in_dir(dir: &Path, force_create: bool, allow_append: bool) -> Result<Self> {
        if force_create && dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        let exists = dir.join("meta.json").exists();
        if exists {
            if !allow_append {
                return Err(PinpointError::index(format!(
                    "index already exists in {} (use force or append)",
                    dir.display()
                )));
            }
            return Self::open_in_dir(dir);
        }
        fs::create_dir_all(dir)?;
        let index = Index::create_in_dir(dir, page_schema())?;
        Self::from_index(index)
    }

    /// Create a RAM-resident index.
    pub fn create_in_ram() -> Result<Self> {
        Self::from_index(Index::create_in_ram(page_schema()))
    }

    /// Open an existing on-disk index.
    pub fn open_in_dir(dir: &Path) -> Result<Self> {
        let index = Index::open_in_dir(dir)?;
        Self::from_index(index)
    }

    fn from_index(index: Index) -> Result<Self> {
        let schema = index.schema();
        let id_field = schema.get_field("id")?;
        let text_field = schema.get_field("text")?;
        Ok(SearchIndex {
            index,
            id_field,
            text_field,
            writer: None,
        })
    }

    fn writer(&mut self) -> Result<&mut IndexWriter> {
        if self.writer.is_none() {
            self.writer = Some(self.index.writer(WRITER_HEAP_BYTES)?);
        }
        Ok(self.writer.as_mut().expect("writer just created"))
    }

    /// Add one page document under `id`.
    pub fn add_page(&mut self, id: &str, text: &str) -> Result<()> {
        let id_field = self.id_field;
        let text_field = self.text_field;
        self.writer()?
            .add_document(doc!(id_field => id, text_field => text))?;
        Ok(())
    }

    /// Commit pending additions so they become visible to searches.
    pub fn commit(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.commit()?;
        }
        Ok(())
    }

    /// Number of committed page documents.
    pub fn doc_count(&self) -> Result<u64> {
        Ok(self.index.reader()?.searcher().num_docs())
    }

    /// Run a match query against the page text.
    pub fn search(&self, term: &str, max_results: usize) -> Result<IndexSearchResults> {
        let searcher = self.index.reader()?.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let query = parser.parse_query(term)?;

        let started = Instant::now();
        // The collector rejects a zero limit; a zero-size request still
        // reports the total.
        let limit = max_results.max(1);
        let (mut top_docs, total) = searcher.search(&query, &(TopDocs::with_limit(limit), Count))?;
        top_docs.truncate(max_results);

        let snippet_gen = SnippetGenerator::create(&searcher, &*query, self.text_field)?;

        // Terms the analyzer produced for this query, for offset recovery.
        let mut terms: HashSet<String> = HashSet::new();
        query.query_terms(&mut |term: &Term, _need_positions| {
            if term.field() == self.text_field {
                if let Some(s) = term.value().as_str() {
                    terms.insert(s.to_string());
                }
            }
        });
        let mut analyzer = self.index.tokenizer_for_field(self.text_field)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let id = doc
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let text = doc
                .get_first(self.text_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default();

            let fragment = snippet_gen.snippet_from_doc(&doc).to_html();

            let mut term_ranges = Vec::new();
            let mut stream = analyzer.token_stream(text);
            while stream.advance() {
                let token = stream.token();
                if terms.contains(&token.text) {
                    term_ranges.push(token.offset_from..token.offset_to);
                }
            }

            hits.push(IndexHit {
                id,
                score,
                fragment,
                term_ranges,
            });
        }

        Ok(IndexSearchResults {
            total,
            duration: started.elapsed(),
            hits,
        })
    }

    /// Commit and release the writer. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.commit()?;
            writer.wait_merging_threads()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("writer_open", &self.writer.is_some())
            .finish()
    }
}
