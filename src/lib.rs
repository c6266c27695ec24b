//! # pinpoint
//!
//! Positional PDF full-text search: index a corpus of PDF files and answer
//! queries that return, for each hit, not only the matching page and
//! snippet but the geometric rectangles on the page where the matched
//! words physically appear, enough to draw highlight boxes on the
//! original PDF.
//!
//! ## Architecture
//!
//! - A **positions store** keeps, per document, a CRC-framed binary record
//!   of every text run's bounding box per page, plus the page text
//!   ([`store`], [`frame`], [`locations`]).
//! - The **indexing pipeline** hashes and dedupes documents, drives PDF
//!   extraction, writes position frames and feeds `(id, text)` pages to an
//!   inverted index ([`driver`], [`pipeline`], [`index`]).
//! - The **lookup layer** decodes search hits back to `(document, page)`,
//!   resolves the matched byte range to a rectangle envelope, and can emit
//!   a marked-up PDF ([`search`], [`markup`], [`pdf`]).

pub mod api;
pub mod cli;
pub mod driver;
pub mod error;
pub mod extract;
pub mod frame;
pub mod index;
pub mod locations;
pub mod markup;
pub mod pdf;
pub mod pipeline;
pub mod search;
pub mod store;
pub mod util;

pub use error::{PinpointError, Result};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
