//! Adding documents: single items and batch imports.
//!
//! Batch import is continue-on-error: every record gets a full attempt,
//! failures are collected per item, and the caller decides the exit
//! status afterwards. Identity conflicts (one record's key and source ids
//! matching distinct existing documents) are recorded and the import
//! proceeds with the first match; nothing is ever merged.

use std::path::{Path, PathBuf};

use crate::{
    bib::BibRecord,
    database::Database,
    error::{Error, Result},
    extract::TextExtractor,
    source::SourceRegistry,
};

/// One incoming record whose identities pointed at more than one
/// existing document.
#[derive(Debug)]
pub struct ImportConflict {
    pub key: String,
    /// The docid the record was applied to.
    pub kept: u64,
    /// The other matching docids, left untouched.
    pub others: Vec<u64>,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: usize,
    pub conflicts: Vec<ImportConflict>,
    pub failures: Vec<(String, Error)>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Import a batch of bibliographic records, tagging each imported
/// document with `tags`.
pub fn import_records(
    db: &mut Database,
    registry: &SourceRegistry,
    extractor: &dyn TextExtractor,
    mut records: Vec<BibRecord>,
    tags: &[String],
) -> Result<ImportReport> {
    records.sort_by(|a, b| a.key.cmp(&b.key));

    let mut report = ImportReport::default();
    for record in records {
        let key = record.key.clone();
        tracing::info!(%key, "importing record");
        match import_one(db, registry, extractor, record, tags, &mut report) {
            Ok(()) => report.imported += 1,
            Err(e) => {
                tracing::warn!(%key, error = %e, "import failed");
                report.failures.push((key, e));
            }
        }
    }
    Ok(report)
}

fn import_one(
    db: &mut Database,
    registry: &SourceRegistry,
    extractor: &dyn TextExtractor,
    record: BibRecord,
    tags: &[String],
    report: &mut ImportReport,
) -> Result<()> {
    // Identity resolution: bibliographic key first, then scanned sids.
    let mut matches: Vec<u64> = Vec::new();
    if let Some(doc) = db.doc_for_bib(&record.key)?
        && let Some(docid) = doc.docid()
    {
        matches.push(docid);
    }
    for sid in registry.scan_record(&record) {
        if let Some(doc) = db.doc_for_source(&sid)?
            && let Some(docid) = doc.docid()
            && !matches.contains(&docid)
        {
            matches.push(docid);
        }
    }

    let mut doc = match matches.first() {
        Some(&docid) => db
            .get_document(docid)?
            .ok_or(Error::DocNotFound(docid))?,
        None => db.new_document()?,
    };

    if matches.len() > 1 {
        tracing::warn!(key = %record.key, ?matches, "record identities span multiple documents");
        report.conflicts.push(ImportConflict {
            key: record.key.clone(),
            kept: matches[0],
            others: matches[1..].to_vec(),
        });
    }

    if let Some(fileref) = record.file().map(str::to_string) {
        let path = Path::new(&fileref);
        if path.is_file() {
            doc.add_file(extractor, path)?;
        } else {
            tracing::debug!(key = %record.key, file = %fileref, "file reference not readable");
        }
    }

    doc.add_bib_record(registry, record);
    doc.add_tags(tags);
    doc.sync(db)
}

/// What to add to the database as one new (or updated) document.
#[derive(Debug, Default)]
pub struct AddOptions {
    pub file: Option<PathBuf>,
    /// URL or `name:id` string resolved through the source registry.
    pub source: Option<String>,
    pub record: Option<BibRecord>,
    pub tags: Vec<String>,
}

/// Add a single item, reusing an existing document when its source id or
/// bibliographic key already points at one. Returns the docid.
pub fn add_item(
    db: &mut Database,
    registry: &SourceRegistry,
    extractor: &dyn TextExtractor,
    opts: AddOptions,
) -> Result<u64> {
    if opts.file.is_none() && opts.source.is_none() && opts.record.is_none() {
        return Err(Error::NothingToAdd);
    }

    let sid = opts
        .source
        .as_deref()
        .map(|s| registry.match_source(s))
        .transpose()?;

    let mut existing = None;
    if let Some(sid) = &sid {
        existing = db.doc_for_source(sid)?;
    }
    if existing.is_none()
        && let Some(record) = &opts.record
    {
        existing = db.doc_for_bib(&record.key)?;
    }

    let mut doc = match existing {
        Some(doc) => doc,
        None => db.new_document()?,
    };

    if let Some(path) = &opts.file {
        doc.add_file(extractor, path)?;
    }
    if let Some(sid) = &sid {
        doc.add_sid(sid);
    }
    if let Some(record) = opts.record {
        doc.add_bib_record(registry, record);
    }
    doc.add_tags(&opts.tags);

    doc.sync(db)?;
    doc.docid().ok_or(Error::NoDocid)
}
