//! Rebuild the index from the document directory tree.
//!
//! The per-document directories are the durable record; the index and the
//! metadata store can both be regenerated from them. Replays each
//! directory's bibliographic record, tag file, and document files through
//! the normal mutation path.

use std::path::Path;

use crate::{
    database::Database,
    document::{BIB_FILE, TAG_FILE},
    error::Result,
    extract::TextExtractor,
    source::SourceRegistry,
};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
}

/// Walk the database root and re-sync every document directory.
///
/// Entries that are not directories, not named with a zero-padded docid,
/// or empty are skipped. Docids found on disk raise the allocation
/// watermark, so restore into a fresh store never reassigns them.
pub fn restore(
    db: &mut Database,
    registry: &SourceRegistry,
    extractor: &dyn TextExtractor,
) -> Result<RestoreReport> {
    let root = db.root().to_path_buf();
    let mut report = RestoreReport::default();

    let mut docids = Vec::new();
    for entry in std::fs::read_dir(&root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        match parse_docdir_name(&name) {
            Some(docid) => docids.push(docid),
            None => {
                tracing::debug!(%name, "skipping non-document directory");
                report.skipped += 1;
            }
        }
    }
    docids.sort_unstable();

    for docid in docids {
        let docdir = root.join(format!("{docid:010}"));
        if std::fs::read_dir(&docdir)?.next().is_none() {
            tracing::debug!(docid, "skipping empty document directory");
            report.skipped += 1;
            continue;
        }
        restore_one(db, registry, extractor, docid, &docdir)?;
        report.restored += 1;
    }

    tracing::info!(report.restored, report.skipped, "restore finished");
    Ok(report)
}

fn parse_docdir_name(name: &str) -> Option<u64> {
    let docid = name.parse().ok()?;
    // The canonical directory name is the only accepted spelling.
    (name == format!("{docid:010}")).then_some(docid)
}

fn restore_one(
    db: &mut Database,
    registry: &SourceRegistry,
    extractor: &dyn TextExtractor,
    docid: u64,
    docdir: &Path,
) -> Result<()> {
    tracing::info!(docid, "restoring document");

    let mut doc = match db.get_document(docid)? {
        Some(doc) => doc,
        None => db.new_document_with_id(docid)?,
    };

    // Derived file state is regenerated from the directory contents, so
    // whatever a loaded index record carried must not accumulate.
    doc.reset_files();
    doc.update_from_bib_file(registry)?;

    let tagpath = docdir.join(TAG_FILE);
    if tagpath.is_file() {
        let tags = std::fs::read_to_string(&tagpath)?;
        doc.add_tags(tags.lines().map(str::trim).filter(|t| !t.is_empty()));
    }

    for entry in std::fs::read_dir(docdir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == BIB_FILE || name == TAG_FILE {
            continue;
        }
        doc.add_file(extractor, &entry.path())?;
    }

    doc.sync(db)
}
