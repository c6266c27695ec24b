//! Small helpers: content hashing, glob expansion, file-size ordering.

use std::fs;

use sha2::{Digest, Sha256};

use crate::error::Result;

/// SHA-256 of `bytes` as lowercase hex, the identity of a document.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// `filename` with a leading `~` replaced by the user's home directory.
pub fn expand_user(filename: &str) -> String {
    if let Some(rest) = filename.strip_prefix('~') {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}{rest}", home.to_string_lossy());
        }
    }
    filename.to_string()
}

/// Expand glob patterns to the existing files they match, deduplicated.
/// With `sort_by_size`, paths are ordered by ascending file size so a long
/// indexing run shows progress on the small files first.
pub fn patterns_to_paths(patterns: &[String], sort_by_size: bool) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let pattern = expand_user(pattern);
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(err) => {
                log::error!("bad pattern {pattern:?}: {err}");
                continue;
            }
        };
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => paths.push(path.to_string_lossy().into_owned()),
                Ok(path) => log::debug!("not a regular file: {}", path.display()),
                Err(err) => log::error!("could not read {pattern:?} entry: {err}"),
            }
        }
    }
    let mut seen = std::collections::HashSet::new();
    paths.retain(|path| seen.insert(path.clone()));
    if sort_by_size {
        paths = sort_file_size(paths, -1, -1);
    }
    Ok(paths)
}

/// Sort `paths` by ascending file size, breaking ties by name. Files
/// smaller than `min_size` or larger than `max_size` are dropped when the
/// respective bound is non-negative. Unreadable paths are dropped.
pub fn sort_file_size(paths: Vec<String>, min_size: i64, max_size: i64) -> Vec<String> {
    let mut sized: Vec<(i64, String)> = paths
        .into_iter()
        .filter_map(|path| match fs::metadata(&path) {
            Ok(meta) => Some((meta.len() as i64, path)),
            Err(err) => {
                log::error!("could not stat {path:?}: {err}");
                None
            }
        })
        .collect();
    sized.sort();
    sized
        .into_iter()
        .filter(|(size, _)| min_size < 0 || *size >= min_size)
        .filter(|(size, _)| max_size < 0 || *size <= max_size)
        .map(|(_, path)| path)
        .collect()
}
