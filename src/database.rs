//! The database: an index store under a root directory full of per-document
//! subdirectories.
//!
//! Wraps the tantivy index (search, exact-term lookup, record replace), the
//! metadata store (docid watermark), and the registered source names that
//! extend the query language.

use std::path::{Path, PathBuf};

use tantivy::{
    Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term,
    collector::{Count, TopDocs},
    query::TermQuery,
    schema::IndexRecordOption,
};

use crate::{
    document::Document,
    error::{Error, Result},
    meta::MetaDb,
    query,
    schema::{self, SchemaFields, build_schema, register_tokenizers},
    source::Sid,
};

const STORE_DIR: &str = ".bibdex";
const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Session mode against the index store.
///
/// At most one read-write session may exist across all processes; a second
/// writable open fails immediately with [`Error::Lock`]. Read-only
/// sessions observe a fixed snapshot until [`Database::reopen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

/// Result ordering for [`Database::search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sort {
    /// Text-match score, ties broken by descending year.
    #[default]
    Relevance,
    /// Descending year, ties broken by relevance.
    Year,
}

impl std::str::FromStr for Sort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relevance" => Ok(Sort::Relevance),
            "year" => Ok(Sort::Year),
            other => Err(Error::InvalidSort(other.to_string())),
        }
    }
}

pub struct Database {
    root: PathBuf,
    index: Index,
    reader: IndexReader,
    writer: Option<IndexWriter>,
    meta: Option<MetaDb>,
    fields: SchemaFields,
    source_names: Vec<String>,
}

impl Database {
    /// Open an existing database under `root`.
    ///
    /// `source_names` is the set of available source plugins; each name
    /// becomes a boolean filter keyword in the query language, so it must
    /// be final before any query is parsed.
    pub fn open(root: &Path, mode: Mode, source_names: &[String]) -> Result<Self> {
        Self::open_at(root, mode, false, false, source_names)
    }

    /// Create (or open) a writable database under `root`.
    ///
    /// Creating inside an existing non-empty directory that holds no
    /// database requires `force`, to guard against typo'd roots.
    pub fn create(root: &Path, force: bool, source_names: &[String]) -> Result<Self> {
        Self::open_at(root, Mode::ReadWrite, true, force, source_names)
    }

    fn open_at(
        root: &Path,
        mode: Mode,
        create: bool,
        force: bool,
        source_names: &[String],
    ) -> Result<Self> {
        let root = root.to_path_buf();
        let store_dir = root.join(STORE_DIR);

        if !store_dir.is_dir() {
            if !create {
                if root.is_dir() && std::fs::read_dir(&root)?.next().is_some() {
                    return Err(Error::InitializationConflict(root));
                }
                return Err(Error::Uninitialized(root));
            }
            if root.is_dir() && std::fs::read_dir(&root)?.next().is_some() && !force {
                return Err(Error::InitializationConflict(root));
            }
            std::fs::create_dir_all(&store_dir)?;
        }

        let index_dir = store_dir.join("tantivy");
        std::fs::create_dir_all(&index_dir)?;

        let (schema, fields) = build_schema();
        let mmap_dir = tantivy::directory::MmapDirectory::open(&index_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let exists = Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if exists {
            Index::open(mmap_dir)?
        } else if mode == Mode::ReadWrite {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())?
        } else {
            return Err(Error::Uninitialized(root));
        };

        register_tokenizers(&index);
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        // Acquiring the writer takes the index lockfile; contention
        // surfaces here as Error::Lock with no retry.
        let (writer, meta) = match mode {
            Mode::ReadWrite => {
                let writer = index.writer(WRITER_MEMORY_BUDGET)?;
                let meta = MetaDb::open(&store_dir.join("meta.redb"))?;
                (Some(writer), Some(meta))
            }
            Mode::ReadOnly => (None, None),
        };

        tracing::debug!(root = %root.display(), ?mode, "opened database");

        Ok(Self {
            root,
            index,
            reader,
            writer,
            meta,
            fields,
            source_names: source_names.to_vec(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn fields(&self) -> SchemaFields {
        self.fields
    }

    /// Number of documents in the current snapshot.
    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Pick up changes committed by another session. A session always
    /// observes its own commits without this.
    pub fn reopen(&self) -> Result<()> {
        self.reader.reload()?;
        Ok(())
    }

    // -- docid allocation --

    fn meta(&self) -> Result<&MetaDb> {
        self.meta.as_ref().ok_or(Error::ReadOnly)
    }

    pub(crate) fn next_docid(&self) -> Result<u64> {
        self.meta()?.allocate_docid()
    }

    /// Create a new empty document with a freshly allocated docid.
    pub fn new_document(&mut self) -> Result<Document> {
        let docid = self.next_docid()?;
        Ok(Document::fresh(&self.root, docid))
    }

    /// Create a new empty document with an explicit docid (restore path).
    pub fn new_document_with_id(&mut self, docid: u64) -> Result<Document> {
        if self.contains(docid)? {
            return Err(Error::DocidInUse(docid));
        }
        self.meta()?.note_docid(docid)?;
        Ok(Document::fresh(&self.root, docid))
    }

    // -- lookups --

    /// Fetch a document by docid.
    pub fn get_document(&self, docid: u64) -> Result<Option<Document>> {
        let term = Term::from_field_u64(self.fields.docid, docid);
        self.lookup(term, &format!("docid {docid}"))
    }

    pub fn contains(&self, docid: u64) -> Result<bool> {
        Ok(self.get_document(docid)?.is_some())
    }

    /// Exact-term lookup primitive: at most one document may carry the
    /// term; two or more is an [`Error::AmbiguousMatch`].
    pub(crate) fn doc_for_term(&self, term_text: &str) -> Result<Option<Document>> {
        let term = Term::from_field_text(self.fields.term, term_text);
        self.lookup(term, term_text)
    }

    fn lookup(&self, term: Term, display: &str) -> Result<Option<Document>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let top = searcher.search(&query, &TopDocs::with_limit(2))?;
        match top.as_slice() {
            [] => Ok(None),
            [(_, addr)] => {
                let stored: TantivyDocument = searcher.doc(*addr)?;
                Ok(Some(Document::from_stored(
                    &self.root,
                    self.fields,
                    &stored,
                    None,
                )))
            }
            _ => Err(Error::AmbiguousMatch {
                term: display.to_string(),
            }),
        }
    }

    /// Document holding the given file path, if any.
    pub fn doc_for_path(&self, path: &str) -> Result<Option<Document>> {
        self.doc_for_term(&format!("P{path}"))
    }

    /// Document holding the given source id, if any.
    pub fn doc_for_source(&self, sid: &Sid) -> Result<Option<Document>> {
        let prefix = schema::source_prefix(&sid.source);
        self.doc_for_term(&format!("{prefix}{}", sid.id))
    }

    /// Document holding the given bibliographic key, if any.
    pub fn doc_for_bib(&self, key: &str) -> Result<Option<Document>> {
        self.doc_for_term(&format!("XBIB|{key}"))
    }

    // -- search --

    /// Search for documents matching a query string.
    ///
    /// Returns the ranked result window as a finite, forward-only
    /// iterator; `limit` caps the window size.
    pub fn search(&self, query_str: &str, sort: Sort, limit: Option<usize>) -> Result<Documents> {
        let searcher = self.reader.searcher();
        let query = query::build_query(&self.index, self.fields, &self.source_names, query_str)?;

        // Fetch every match, order with explicit tie-breakers, then cut
        // the window. Collections here are personal-library sized.
        let fetch = (searcher.num_docs() as usize).max(1);
        let top = searcher.search(&query, &TopDocs::with_limit(fetch))?;

        let mut hits = Vec::with_capacity(top.len());
        for (score, addr) in top {
            let segment = searcher.segment_reader(addr.segment_ord);
            let year = segment
                .fast_fields()
                .u64(schema::fields::YEAR)?
                .first(addr.doc_id)
                .unwrap_or(0);
            let docid = segment
                .fast_fields()
                .u64(schema::fields::DOCID)?
                .first(addr.doc_id)
                .unwrap_or(0);
            hits.push(Hit {
                score,
                year,
                docid,
                addr,
            });
        }

        match sort {
            Sort::Relevance => hits.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then(b.year.cmp(&a.year))
                    .then(b.docid.cmp(&a.docid))
            }),
            Sort::Year => hits.sort_by(|a, b| {
                b.year
                    .cmp(&a.year)
                    .then(b.score.total_cmp(&a.score))
                    .then(b.docid.cmp(&a.docid))
            }),
        }

        if let Some(limit) = limit {
            hits.truncate(limit);
        }

        Ok(Documents {
            root: self.root.clone(),
            fields: self.fields,
            searcher,
            hits: hits.into_iter(),
        })
    }

    /// Count documents matching a query string. May be an engine estimate
    /// for large result sets.
    pub fn count(&self, query_str: &str) -> Result<usize> {
        let searcher = self.reader.searcher();
        let query = query::build_query(&self.index, self.fields, &self.source_names, query_str)?;
        Ok(searcher.search(&query, &Count)?)
    }

    // -- term iteration --

    /// All distinct values under a logical field name, prefix stripped.
    ///
    /// Unrecognized names are treated as a raw prefix, matching none if
    /// no such terms exist.
    pub fn term_iter(&self, name: &str) -> Result<Vec<String>> {
        let prefix = schema::find_prefix(name).unwrap_or(name);
        self.terms_with_prefix(prefix)
    }

    /// All tags present in the database.
    pub fn get_tags(&self) -> Result<Vec<String>> {
        self.term_iter("tag")
    }

    /// All source ids present in the database.
    pub fn get_sids(&self) -> Result<Vec<Sid>> {
        let mut sids = Vec::new();
        for source in self.term_iter("source")? {
            for id in self.terms_with_prefix(&schema::source_prefix(&source))? {
                sids.push(Sid::new(source.clone(), id));
            }
        }
        Ok(sids)
    }

    fn terms_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let searcher = self.reader.searcher();
        let mut values = std::collections::BTreeSet::new();
        for segment in searcher.segment_readers() {
            let inverted = segment.inverted_index(self.fields.term)?;
            let dict = inverted.terms();
            let mut stream = dict.range().ge(prefix.as_bytes()).into_stream()?;
            while stream.advance() {
                let key = stream.key();
                if !key.starts_with(prefix.as_bytes()) {
                    break;
                }
                values.insert(String::from_utf8_lossy(&key[prefix.len()..]).into_owned());
            }
        }
        Ok(values.into_iter().collect())
    }

    // -- record mutation --

    /// Replace the index record for `docid` in a single engine commit.
    pub(crate) fn replace_document(&mut self, docid: u64, record: TantivyDocument) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::ReadOnly)?;
        writer.delete_term(Term::from_field_u64(self.fields.docid, docid));
        writer.add_document(record)?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Delete the index record for `docid`. Absence is tolerated.
    pub(crate) fn delete_document(&mut self, docid: u64) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::ReadOnly)?;
        writer.delete_term(Term::from_field_u64(self.fields.docid, docid));
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("root", &self.root)
            .field("writable", &self.writer.is_some())
            .finish_non_exhaustive()
    }
}

struct Hit {
    score: f32,
    year: u64,
    docid: u64,
    addr: tantivy::DocAddress,
}

/// The ranked result window of a search: a finite, forward-only pass.
/// Documents are materialized lazily as the iterator advances.
pub struct Documents {
    root: PathBuf,
    fields: SchemaFields,
    searcher: Searcher,
    hits: std::vec::IntoIter<Hit>,
}

impl Iterator for Documents {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        let hit = self.hits.next()?;
        let stored: Result<TantivyDocument> =
            self.searcher.doc(hit.addr).map_err(Error::from);
        Some(stored.map(|doc| {
            Document::from_stored(&self.root, self.fields, &doc, Some(hit.score))
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.hits.size_hint()
    }
}

impl ExactSizeIterator for Documents {}

impl std::fmt::Debug for Documents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Documents")
            .field("remaining", &self.hits.len())
            .finish_non_exhaustive()
    }
}
