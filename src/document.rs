//! A single document: an in-memory, mutable view bound to one docid.
//!
//! Mutations accumulate in memory (term bag, text fields, staged file
//! blobs) and reach disk and the index only through [`Document::sync`].

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use tantivy::{TantivyDocument, schema::Value};

use crate::{
    bib::BibRecord,
    database::Database,
    error::{Error, Result},
    extract::TextExtractor,
    schema::{self, SchemaFields},
    source::{Sid, SourceRegistry},
};

/// Name of the per-document bibliographic record file.
pub const BIB_FILE: &str = "bib.json";
/// Name of the per-document tag list file (one tag per line).
pub const TAG_FILE: &str = "tags";

const SUMMARY_CHARS: usize = 997;

pub struct Document {
    docid: Option<u64>,
    docdir: PathBuf,
    /// Prefixed boolean/internal index terms.
    terms: BTreeSet<String>,
    title: Option<String>,
    authors: Option<String>,
    year: Option<u64>,
    /// Accumulated extracted text (ranked, whole-corpus searchable).
    text: String,
    /// Preview summary blob.
    data: String,
    bib: Option<BibRecord>,
    /// File blobs staged for the next sync.
    infiles: BTreeMap<String, Vec<u8>>,
    score: Option<f32>,
}

impl Document {
    pub(crate) fn fresh(root: &Path, docid: u64) -> Self {
        let mut terms = BTreeSet::new();
        terms.insert(format!("Q{docid}"));
        Self {
            docid: Some(docid),
            docdir: docdir_path(root, docid),
            terms,
            title: None,
            authors: None,
            year: None,
            text: String::new(),
            data: String::new(),
            bib: None,
            infiles: BTreeMap::new(),
            score: None,
        }
    }

    pub(crate) fn from_stored(
        root: &Path,
        fields: SchemaFields,
        stored: &TantivyDocument,
        score: Option<f32>,
    ) -> Self {
        let docid = stored
            .get_first(fields.docid)
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let terms = stored
            .get_all(fields.term)
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        Self {
            docid: Some(docid),
            docdir: docdir_path(root, docid),
            terms,
            title: get_text(stored, fields.title),
            authors: get_text(stored, fields.author),
            year: stored.get_first(fields.year).and_then(|v| v.as_u64()),
            text: get_text(stored, fields.text).unwrap_or_default(),
            data: get_text(stored, fields.data).unwrap_or_default(),
            bib: None,
            infiles: BTreeMap::new(),
            score,
        }
    }

    /// The document id, or `None` once purged.
    pub fn docid(&self) -> Option<u64> {
        self.docid
    }

    /// The on-disk directory owned by this document.
    pub fn docdir(&self) -> &Path {
        &self.docdir
    }

    /// Match score when this document came from a ranked search.
    pub fn match_score(&self) -> Option<f32> {
        self.score
    }

    // -- term bag --

    fn add_term(&mut self, prefix: &str, value: impl std::fmt::Display) {
        self.terms.insert(format!("{prefix}{value}"));
    }

    /// Removing an absent term is a no-op.
    fn remove_term(&mut self, prefix: &str, value: &str) {
        self.terms.remove(&format!("{prefix}{value}"));
    }

    fn purge_prefix(&mut self, prefix: &str) {
        self.terms.retain(|t| !t.starts_with(prefix));
    }

    /// Values of all terms under a logical field name, prefix stripped.
    pub fn term_iter(&self, name: &str) -> impl Iterator<Item = &str> {
        let prefix = schema::find_prefix(name).unwrap_or(name).to_string();
        self.terms_with_prefix(prefix)
    }

    fn terms_with_prefix(&self, prefix: String) -> impl Iterator<Item = &str> {
        let len = prefix.len();
        self.terms
            .iter()
            .filter(move |t| t.starts_with(&prefix))
            .map(move |t| &t[len..])
    }

    // -- metadata fields --

    /// Replace the title; no stale title terms survive.
    pub fn set_title(&mut self, title: &str) {
        self.title = Some(title.to_string());
    }

    /// Replace the author list, as one text string.
    pub fn set_authors(&mut self, authors: &str) {
        self.authors = Some(authors.to_string());
    }

    /// Replace the year. Stored both as a boolean `Y` term (exact
    /// filtering) and in the numeric slot (range queries, sort-by-year).
    pub fn set_year(&mut self, year: u64) {
        self.purge_prefix("Y");
        self.add_term("Y", year);
        self.year = Some(year);
    }

    pub fn get_title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn get_authors(&self) -> Option<&str> {
        self.authors.as_deref()
    }

    pub fn get_year(&self) -> Option<u64> {
        self.year
    }

    /// The preview summary blob.
    pub fn get_data(&self) -> &str {
        &self.data
    }

    // -- sources --

    /// Associate a source id, overwriting any existing id for the same
    /// source name: a document carries at most one id per source.
    pub fn add_sid(&mut self, sid: &Sid) {
        self.purge_prefix(&schema::source_prefix(&sid.source));
        self.add_term("XSOURCE|", &sid.source);
        self.add_term(&schema::source_prefix(&sid.source), &sid.id);
    }

    pub fn get_sids(&self) -> Vec<Sid> {
        let sources: Vec<String> = self.term_iter("source").map(str::to_string).collect();
        let mut sids = Vec::new();
        for source in sources {
            let prefix = schema::source_prefix(&source);
            for id in self.terms_with_prefix(prefix) {
                sids.push(Sid::new(source.clone(), id));
            }
        }
        sids
    }

    /// URLs for this document's source ids, where the plugin provides a
    /// template, plus any URL fields in the bibliographic record.
    pub fn get_urls(&self, registry: &SourceRegistry) -> Vec<String> {
        let mut urls: Vec<String> = self
            .get_sids()
            .iter()
            .filter_map(|sid| {
                let source = registry.get(&sid.source)?;
                source.item_url(&sid.id).ok()
            })
            .collect();
        if let Some(bib) = &self.bib {
            for field in ["url", "adsurl"] {
                if let Some(url) = bib.field(field) {
                    urls.push(url.to_string());
                }
            }
        }
        urls
    }

    // -- tags --

    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            self.add_term("K", tag.as_ref());
        }
    }

    pub fn remove_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            self.remove_term("K", tag.as_ref());
        }
    }

    pub fn get_tags(&self) -> BTreeSet<String> {
        self.term_iter("tag").map(str::to_string).collect()
    }

    // -- files --

    /// Stage a file for this document.
    ///
    /// The bytes are handed to the extraction collaborator; the resulting
    /// text is indexed and its head becomes the preview summary. Nothing
    /// is written to disk until [`Document::sync`].
    pub fn add_file_data(
        &mut self,
        extractor: &dyn TextExtractor,
        name: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let text = extractor.extract(name, &data)?;

        let summary: String = text.chars().take(SUMMARY_CHARS).collect();
        self.data = format!("{summary}...");

        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(&text);

        self.add_term("P", name);
        self.infiles.insert(name.to_string(), data);
        Ok(())
    }

    /// Stage a file read from disk, keeping its base name.
    pub fn add_file(&mut self, extractor: &dyn TextExtractor, path: &Path) -> Result<()> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Extraction {
                name: path.display().to_string(),
                reason: "path has no file name".to_string(),
            })?;
        self.add_file_data(extractor, &name, data)
    }

    /// Drop all indexed file state: file terms, extracted text, the
    /// summary blob, and staged bytes. Lets files be replayed from the
    /// document directory without accumulating text from a loaded
    /// index record.
    pub fn reset_files(&mut self) {
        self.purge_prefix("P");
        self.text.clear();
        self.data.clear();
        self.infiles.clear();
    }

    /// Names of files recorded for this document.
    pub fn get_files(&self) -> Vec<String> {
        self.term_iter("file").map(str::to_string).collect()
    }

    /// Full paths of files under the document directory.
    pub fn get_fullpaths(&self) -> Vec<PathBuf> {
        self.get_files()
            .iter()
            .map(|name| {
                // A file term may carry a path; only the base name
                // lives in the document directory.
                let base = Path::new(name)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone());
                self.docdir.join(base)
            })
            .collect()
    }

    // -- bibliographic record --

    /// Replace the bibliographic key; unique per document by convention
    /// (collisions across documents are the caller's to resolve).
    pub fn set_bibkey(&mut self, key: &str) {
        self.purge_prefix("XBIB|");
        self.add_term("XBIB|", key);
    }

    pub fn get_bibkey(&self) -> Option<String> {
        self.term_iter("key").next().map(str::to_string)
    }

    /// Attach a bibliographic record and index its fields: title, year,
    /// authors, any source ids it carries, and the key.
    pub fn add_bib_record(&mut self, registry: &SourceRegistry, record: BibRecord) {
        if let Some(title) = record.field("title") {
            self.set_title(title);
        }
        if let Some(year) = record.field("year") {
            match year.parse() {
                Ok(y) => self.set_year(y),
                Err(_) => tracing::debug!(key = %record.key, year, "non-numeric year not indexed"),
            }
        }
        if !record.authors.is_empty() {
            self.set_authors(&record.authors.join(" "));
        }
        for sid in registry.scan_record(&record) {
            self.add_sid(&sid);
        }
        self.set_bibkey(&record.key);
        self.bib = Some(record);
    }

    /// Path of this document's bibliographic record file.
    pub fn bibpath(&self) -> PathBuf {
        self.docdir.join(BIB_FILE)
    }

    /// The bibliographic record, loading it from the document directory
    /// if not yet in memory.
    pub fn bib(&mut self) -> Result<Option<&BibRecord>> {
        self.load_bib()?;
        Ok(self.bib.as_ref())
    }

    fn load_bib(&mut self) -> Result<()> {
        if self.bib.is_some() {
            return Ok(());
        }
        let bibpath = self.bibpath();
        if bibpath.is_file() {
            self.bib = Some(BibRecord::from_file(&bibpath)?);
        }
        Ok(())
    }

    /// Re-index metadata from the persisted bibliographic record.
    pub fn update_from_bib_file(&mut self, registry: &SourceRegistry) -> Result<()> {
        self.load_bib()?;
        if let Some(record) = self.bib.take() {
            self.add_bib_record(registry, record);
        }
        Ok(())
    }

    /// One-line summary for listings.
    pub fn summary_line(&self) -> String {
        let sids: Vec<String> = self.get_sids().iter().map(Sid::to_string).collect();
        let tags: Vec<String> = self.get_tags().into_iter().collect();
        format!(
            "id:{} [{}] {{{}}} ({}) \"{}\"",
            self.docid.map(|d| d.to_string()).unwrap_or_default(),
            sids.join(" "),
            self.get_bibkey().unwrap_or_default(),
            tags.join(" "),
            self.get_title().unwrap_or_default(),
        )
    }

    // -- synchronization protocol --

    /// Commit the document's pending state: directory, staged files,
    /// bibliographic record file, tag file, then one atomic index-record
    /// replace. A failure in the directory steps removes the directory
    /// before the error propagates, leaving the document as it was before
    /// the call.
    pub fn sync(&mut self, db: &mut Database) -> Result<()> {
        let docid = self.docid.ok_or(Error::NoDocid)?;

        let staged = (|| -> Result<()> {
            self.make_docdir()?;
            self.write_files()?;
            self.write_bibfile()?;
            self.write_tagfile()?;
            Ok(())
        })();

        let result = staged.and_then(|()| {
            let record = self.to_index_record(db.fields());
            db.replace_document(docid, record)
        });

        if let Err(e) = result {
            if let Err(rm) = self.rm_docdir() {
                tracing::warn!(docid, error = %rm, "rollback of document directory failed");
            }
            return Err(e);
        }

        self.infiles.clear();
        tracing::debug!(docid, "synced document");
        Ok(())
    }

    /// Remove the document from the index and delete its directory. The
    /// index record may already be absent. Afterwards the document
    /// reports no valid docid.
    pub fn purge(&mut self, db: &mut Database) -> Result<()> {
        if let Some(docid) = self.docid {
            db.delete_document(docid)?;
        }
        self.rm_docdir()?;
        self.docid = None;
        Ok(())
    }

    fn make_docdir(&self) -> Result<()> {
        if self.docdir.exists() {
            if !self.docdir.is_dir() {
                return Err(Error::DocdirObstructed(self.docdir.clone()));
            }
            return Ok(());
        }
        std::fs::create_dir_all(&self.docdir)?;
        Ok(())
    }

    fn write_files(&self) -> Result<()> {
        for (name, data) in &self.infiles {
            std::fs::write(self.docdir.join(name), data)?;
        }
        Ok(())
    }

    fn write_bibfile(&mut self) -> Result<()> {
        let paths = self.get_fullpaths();
        if !paths.is_empty() {
            self.load_bib()?;
        }
        let bibpath = self.bibpath();
        if let Some(bib) = &mut self.bib {
            // The record carries a reference to the first persisted file.
            if let Some(first) = paths.first()
                && bib.file().is_none()
            {
                bib.set_file(&first.to_string_lossy());
            }
            bib.to_file(&bibpath)?;
        }
        Ok(())
    }

    fn write_tagfile(&self) -> Result<()> {
        let mut out = String::new();
        for tag in self.get_tags() {
            out.push_str(&tag);
            out.push('\n');
        }
        std::fs::write(self.docdir.join(TAG_FILE), out)?;
        Ok(())
    }

    fn rm_docdir(&self) -> Result<()> {
        if self.docdir.is_dir() {
            std::fs::remove_dir_all(&self.docdir)?;
        }
        Ok(())
    }

    fn to_index_record(&self, fields: SchemaFields) -> TantivyDocument {
        let mut record = TantivyDocument::new();
        if let Some(docid) = self.docid {
            record.add_u64(fields.docid, docid);
        }
        for term in &self.terms {
            record.add_text(fields.term, term);
        }
        if let Some(title) = &self.title {
            record.add_text(fields.title, title);
        }
        if let Some(authors) = &self.authors {
            record.add_text(fields.author, authors);
        }
        if let Some(year) = self.year {
            record.add_u64(fields.year, year);
        }
        if !self.text.is_empty() {
            record.add_text(fields.text, &self.text);
        }
        if !self.data.is_empty() {
            record.add_text(fields.data, &self.data);
        }
        record
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("docid", &self.docid)
            .field("docdir", &self.docdir)
            .finish_non_exhaustive()
    }
}

fn docdir_path(root: &Path, docid: u64) -> PathBuf {
    root.join(format!("{docid:010}"))
}

fn get_text(stored: &TantivyDocument, field: tantivy::schema::Field) -> Option<String> {
    stored
        .get_first(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PlainText;

    fn doc() -> Document {
        Document::fresh(Path::new("/tmp/bibdex-test"), 7)
    }

    #[test]
    fn fresh_document_carries_id_term() {
        let d = doc();
        assert_eq!(d.docid(), Some(7));
        assert!(d.terms.contains("Q7"));
        assert_eq!(d.docdir(), Path::new("/tmp/bibdex-test/0000000007"));
    }

    #[test]
    fn source_id_overwrites_previous() {
        let mut d = doc();
        d.add_sid(&Sid::new("arxiv", "1"));
        d.add_sid(&Sid::new("arxiv", "2"));

        let sids = d.get_sids();
        assert_eq!(sids, vec![Sid::new("arxiv", "2")]);
        assert!(!d.terms.contains("XARXIV|1"));
        assert!(d.terms.contains("XARXIV|2"));
        assert!(d.terms.contains("XSOURCE|arxiv"));
    }

    #[test]
    fn distinct_sources_coexist() {
        let mut d = doc();
        d.add_sid(&Sid::new("arxiv", "1801.00001"));
        d.add_sid(&Sid::new("doi", "10.1000/x"));
        assert_eq!(d.get_sids().len(), 2);
    }

    #[test]
    fn tags_are_idempotent() {
        let mut d = doc();
        d.remove_tags(["x"]);
        assert!(d.get_tags().is_empty());

        d.add_tags(["x", "x"]);
        assert_eq!(d.get_tags().len(), 1);

        d.remove_tags(["x"]);
        assert!(d.get_tags().is_empty());
    }

    #[test]
    fn year_replaces_term_and_slot() {
        let mut d = doc();
        d.set_year(1999);
        d.set_year(2001);
        assert!(!d.terms.contains("Y1999"));
        assert!(d.terms.contains("Y2001"));
        assert_eq!(d.get_year(), Some(2001));
    }

    #[test]
    fn bibkey_replaces() {
        let mut d = doc();
        d.set_bibkey("old99");
        d.set_bibkey("new01");
        assert_eq!(d.get_bibkey(), Some("new01".to_string()));
        assert!(!d.terms.contains("XBIB|old99"));
    }

    #[test]
    fn file_data_stages_without_disk_writes() {
        let mut d = doc();
        d.add_file_data(&PlainText, "paper.txt", b"quantum widgets and more".to_vec())
            .unwrap();

        assert_eq!(d.get_files(), vec!["paper.txt".to_string()]);
        assert!(d.get_data().starts_with("quantum widgets"));
        assert!(d.get_data().ends_with("..."));
        assert!(!d.docdir().exists());
    }

    #[test]
    fn reset_then_replay_does_not_accumulate_text() {
        let mut d = doc();
        d.add_file_data(&PlainText, "paper.txt", b"entangled widgets".to_vec())
            .unwrap();
        d.reset_files();
        assert!(d.get_files().is_empty());
        assert!(d.get_data().is_empty());

        d.add_file_data(&PlainText, "paper.txt", b"entangled widgets".to_vec())
            .unwrap();
        assert_eq!(d.text, "entangled widgets");
        assert_eq!(d.get_files(), vec!["paper.txt".to_string()]);
    }

    #[test]
    fn bib_record_indexes_fields() {
        let reg = SourceRegistry::builtin();
        let mut rec = BibRecord::new("smith99");
        rec.set_field("title", "On Widget Entanglement");
        rec.set_field("year", "1999");
        rec.set_field("eprint", "1801.00001");
        rec.authors = vec!["Jo Smith".to_string(), "Ann Jones".to_string()];

        let mut d = doc();
        d.add_bib_record(&reg, rec);

        assert_eq!(d.get_title(), Some("On Widget Entanglement"));
        assert_eq!(d.get_year(), Some(1999));
        assert_eq!(d.get_authors(), Some("Jo Smith Ann Jones"));
        assert_eq!(d.get_bibkey(), Some("smith99".to_string()));
        assert_eq!(d.get_sids(), vec![Sid::new("arxiv", "1801.00001")]);
    }

    #[test]
    fn non_numeric_year_is_skipped() {
        let reg = SourceRegistry::builtin();
        let mut rec = BibRecord::new("k");
        rec.set_field("year", "in press");

        let mut d = doc();
        d.add_bib_record(&reg, rec);
        assert_eq!(d.get_year(), None);
    }

    #[test]
    fn urls_from_sids() {
        let reg = SourceRegistry::builtin();
        let mut d = doc();
        d.add_sid(&Sid::new("arxiv", "1801.00001"));
        assert_eq!(
            d.get_urls(&reg),
            vec!["https://arxiv.org/abs/1801.00001".to_string()]
        );
    }

    #[test]
    fn summary_line_format() {
        let mut d = doc();
        d.set_title("A Title");
        d.set_bibkey("k99");
        d.add_tags(["new"]);
        assert_eq!(d.summary_line(), "id:7 [] {k99} (new) \"A Title\"");
    }
}
