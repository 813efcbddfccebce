//! Bibliographic document indexing and synchronization engine.
//!
//! A database is a root directory of per-document subdirectories (each
//! holding the document files, a JSON bibliographic record, and a tag
//! file) kept in lockstep with a full-text search index. The directories
//! are the durable record; the index and the docid watermark can always
//! be rebuilt from them with [`restore::restore`].

pub mod bib;
pub mod cli;
pub mod database;
pub mod document;
pub mod error;
pub mod extract;
pub mod import;
pub mod meta;
pub mod query;
pub mod restore;
pub mod schema;
pub mod source;

pub use bib::BibRecord;
pub use database::{Database, Documents, Mode, Sort};
pub use document::Document;
pub use error::{Error, Result};
pub use extract::{NoExtract, PlainText, TextExtractor};
pub use import::{AddOptions, ImportReport, add_item, import_records};
pub use restore::{RestoreReport, restore};
pub use source::{Sid, SourcePlugin, SourceRegistry};
