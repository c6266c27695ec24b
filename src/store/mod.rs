//! The positions store: per-document page position containers, the
//! content-hash catalog that owns them, and the all-in-one archive form.

pub mod archive;
pub mod doc;
pub mod state;

pub use archive::{read_archive, write_archive, DocSnapshot, HashIndexPathDoc, IndexArchive};
pub use doc::{DocPaths, DocPositions};
pub use state::{FileDesc, PositionsStore};
