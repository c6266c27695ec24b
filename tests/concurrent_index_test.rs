//! End-to-end runs of the concurrent pipeline at both granularities.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use pinpoint::api::{self, IndexOptions};
use pinpoint::extract::{run, Extractor, StaticExtractor};
use pinpoint::pipeline::{ExtractorFactory, Granularity};
use pinpoint::search;

fn build_corpus(tmp: &TempDir, num_docs: usize) -> (StaticExtractor, Vec<String>) {
    let mut extractor = StaticExtractor::new();
    let mut paths = Vec::new();
    for d in 0..num_docs {
        let name = format!("doc-{d}.pdf");
        let path = tmp.path().join(&name);
        fs::write(&path, name.as_bytes()).unwrap();
        let path = path.to_string_lossy().into_owned();
        let pages = (0..=d)
            .map(|p| {
                (
                    format!("shared token plus doc{d} page{p}"),
                    vec![
                        run(0, "shared", 0.0, 0.0, 40.0, 10.0),
                        run(6, " ", 40.0, 0.0, 40.0, 10.0),
                        run(7, "token", 41.0, 0.0, 70.0, 10.0),
                    ],
                )
            })
            .collect();
        extractor.insert(&path, pages);
        paths.push(path);
    }
    (extractor, paths)
}

fn factory_for(extractor: StaticExtractor) -> Arc<ExtractorFactory> {
    Arc::new(move || Ok(Box::new(extractor.clone()) as Box<dyn Extractor>))
}

#[test]
fn test_doc_granularity_indexes_whole_corpus() {
    let tmp = TempDir::new().unwrap();
    let (extractor, paths) = build_corpus(&tmp, 5);
    // 1 + 2 + 3 + 4 + 5 pages.
    let expected_pages = 15;

    let (store, index, total_pages) = api::index_files_concurrent(
        &paths,
        &IndexOptions::default(),
        3,
        Granularity::Doc,
        factory_for(extractor),
        None,
    )
    .unwrap();

    assert_eq!(store.len(), 5);
    assert_eq!(total_pages, expected_pages);
    assert_eq!(index.doc_count().unwrap(), expected_pages as u64);

    // Every page is reachable through search and resolves cleanly.
    let results = search::search(&store, &index, "shared", 100).unwrap();
    assert_eq!(results.total_matches, expected_pages);
    assert_eq!(results.matches.len(), expected_pages);
    for m in &results.matches {
        assert!(m.line.starts_with("shared token"));
        assert_eq!((m.start, m.end), (0, 6));
    }

    // Document indices were assigned exactly once each.
    let mut doc_indices: Vec<u64> = results.matches.iter().map(|m| m.doc_idx).collect();
    doc_indices.sort_unstable();
    doc_indices.dedup();
    assert_eq!(doc_indices.len(), 5);
}

#[test]
fn test_page_granularity_indexes_whole_corpus() {
    let tmp = TempDir::new().unwrap();
    let (extractor, paths) = build_corpus(&tmp, 4);
    let expected_pages = 1 + 2 + 3 + 4;

    let (store, index, total_pages) = api::index_files_concurrent(
        &paths,
        &IndexOptions::default(),
        2,
        Granularity::Page,
        factory_for(extractor),
        None,
    )
    .unwrap();

    assert_eq!(store.len(), 4);
    assert_eq!(total_pages, expected_pages);
    assert_eq!(index.doc_count().unwrap(), expected_pages as u64);

    let results = search::search(&store, &index, "token", 100).unwrap();
    assert_eq!(results.matches.len(), expected_pages);

    // Page indices within each document are 0..N-1.
    for doc_idx in 0..4u64 {
        let mut page_indices: Vec<u32> = results
            .matches
            .iter()
            .filter(|m| m.doc_idx == doc_idx)
            .map(|m| m.page_idx)
            .collect();
        page_indices.sort_unstable();
        let expected: Vec<u32> = (0..page_indices.len() as u32).collect();
        assert_eq!(page_indices, expected);
    }
}

#[test]
fn test_unreadable_document_does_not_abort_corpus() {
    let tmp = TempDir::new().unwrap();
    let (extractor, mut paths) = build_corpus(&tmp, 2);
    // A path with no file behind it fails in the worker.
    paths.push(tmp.path().join("missing.pdf").to_string_lossy().into_owned());

    let (store, _index, total_pages) = api::index_files_concurrent(
        &paths,
        &IndexOptions::default(),
        2,
        Granularity::Doc,
        factory_for(extractor),
        None,
    )
    .unwrap();

    assert_eq!(store.len(), 2);
    assert_eq!(total_pages, 3);
}

#[test]
fn test_concurrent_persistent_store() {
    let tmp = TempDir::new().unwrap();
    let (extractor, paths) = build_corpus(&tmp, 3);
    let store_dir = tmp.path().join("store.concurrent");

    let options = IndexOptions {
        store_dir: Some(store_dir.clone()),
        force_create: true,
        ..Default::default()
    };
    let (_store, mut index, _) = api::index_files_concurrent(
        &paths,
        &options,
        2,
        Granularity::Doc,
        factory_for(extractor),
        None,
    )
    .unwrap();
    index.close().unwrap();

    let results = api::search_pdf_index(&store_dir, "shared", 100).unwrap();
    assert_eq!(results.matches.len(), 6);
    for m in &results.matches {
        assert!(!m.bounding_rect().is_zero());
    }
}
