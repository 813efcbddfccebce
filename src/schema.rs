//! Term schema registry: the mapping from logical field names to index
//! term prefixes, and the tantivy schema that backs it.
//!
//! Boolean and internal terms are stored verbatim, prefix included, in the
//! raw multi-valued `term` field. Ranked fields (title, author, extracted
//! text) live in their own stemmed text fields so the engine produces both
//! field-scoped and whole-corpus stem terms from the same source text.

use tantivy::{
    Index,
    schema::{FAST, Field, INDEXED, STORED, STRING, Schema, TextFieldIndexing, TextOptions},
    tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer},
};

/// Prefixes for single-valued boolean fields.
/// Modeled on the Omega term prefix conventions.
pub const BOOLEAN_PREFIX: &[(&str, &str)] = &[
    ("id", "Q"),
    ("key", "XBIB|"),
    ("source", "XSOURCE|"),
    ("year", "Y"),
    ("y", "Y"),
];

/// Boolean prefixes for which there can be multiple terms per document.
/// Repeated filters on these combine with AND, so `tag:a tag:b` requires
/// both tags.
pub const BOOLEAN_PREFIX_MULTI: &[(&str, &str)] = &[("tag", "K")];

/// Purely internal prefixes, not exposed to the query language.
pub const BOOLEAN_PREFIX_INTERNAL: &[(&str, &str)] = &[("file", "P"), ("type", "T")];

/// Ranked (probabilistic) fields, matched via stemmed relevance scoring.
pub const PROBABILISTIC_PREFIX: &[(&str, &str)] = &[
    ("title", "S"),
    ("t", "S"),
    ("author", "A"),
    ("a", "A"),
];

/// Numeric value slot for year, used for range queries and sort-by-year.
pub const YEAR_SLOT: u64 = 0;

const NUMBER_VALUE_FACET: &[(&str, u64)] = &[("year", YEAR_SLOT), ("y", YEAR_SLOT)];

/// Look up the term prefix for a logical field name.
///
/// Categories are checked in a fixed precedence order: boolean, then
/// multi-valued boolean, then internal, then ranked.
pub fn find_prefix(name: &str) -> Option<&'static str> {
    for table in [
        BOOLEAN_PREFIX,
        BOOLEAN_PREFIX_MULTI,
        BOOLEAN_PREFIX_INTERNAL,
        PROBABILISTIC_PREFIX,
    ] {
        if let Some((_, prefix)) = table.iter().find(|(n, _)| *n == name) {
            return Some(prefix);
        }
    }
    None
}

/// Look up the numeric value slot for a logical field name.
pub fn find_facet(name: &str) -> Option<u64> {
    NUMBER_VALUE_FACET
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, slot)| *slot)
}

/// Derive the dynamic term prefix for a source name.
pub fn source_prefix(source: &str) -> String {
    format!("X{}|", source.to_uppercase())
}

/// True if `name` is recognized by the query language as a ranked field.
pub fn is_ranked(name: &str) -> bool {
    PROBABILISTIC_PREFIX.iter().any(|(n, _)| *n == name)
}

/// Engine field names.
pub mod fields {
    pub const DOCID: &str = "docid";
    pub const TERM: &str = "term";
    pub const TITLE: &str = "title";
    pub const AUTHOR: &str = "author";
    pub const TEXT: &str = "text";
    pub const YEAR: &str = "year";
    pub const DATA: &str = "data";
}

/// Resolved field handles for the engine schema.
#[derive(Clone, Copy)]
pub struct SchemaFields {
    pub docid: Field,
    pub term: Field,
    pub title: Field,
    pub author: Field,
    pub text: Field,
    pub year: Field,
    pub data: Field,
}

pub(crate) fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let docid = builder.add_u64_field(fields::DOCID, INDEXED | STORED | FAST);

    // Prefixed boolean/internal terms, stored verbatim so a document's
    // term bag can be reconstructed from its index record.
    let term = builder.add_text_field(fields::TERM, STRING | STORED);

    let ranked = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("en_stem")
                .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    let title = builder.add_text_field(fields::TITLE, ranked.clone());
    let author = builder.add_text_field(fields::AUTHOR, ranked.clone());
    // Extracted text is stored so re-syncing a loaded document does not
    // lose its full-text terms on the whole-record replace.
    let text = builder.add_text_field(fields::TEXT, ranked);

    let year = builder.add_u64_field(fields::YEAR, INDEXED | STORED | FAST);

    // Preview summary blob, retrievable without reopening files.
    let data = builder.add_text_field(fields::DATA, TextOptions::default().set_stored());

    let schema = builder.build();
    let fields = SchemaFields {
        docid,
        term,
        title,
        author,
        text,
        year,
        data,
    };

    (schema, fields)
}

pub(crate) fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register("en_stem", en_stem);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_lookup() {
        assert_eq!(find_prefix("id"), Some("Q"));
        assert_eq!(find_prefix("key"), Some("XBIB|"));
        assert_eq!(find_prefix("source"), Some("XSOURCE|"));
        assert_eq!(find_prefix("tag"), Some("K"));
        assert_eq!(find_prefix("file"), Some("P"));
        assert_eq!(find_prefix("type"), Some("T"));
        assert_eq!(find_prefix("title"), Some("S"));
        assert_eq!(find_prefix("t"), Some("S"));
        assert_eq!(find_prefix("author"), Some("A"));
        assert_eq!(find_prefix("a"), Some("A"));
        assert_eq!(find_prefix("year"), Some("Y"));
        assert_eq!(find_prefix("nosuchfield"), None);
    }

    #[test]
    fn facet_lookup() {
        assert_eq!(find_facet("year"), Some(YEAR_SLOT));
        assert_eq!(find_facet("y"), Some(YEAR_SLOT));
        assert_eq!(find_facet("tag"), None);
    }

    #[test]
    fn source_prefix_uppercases() {
        assert_eq!(source_prefix("arxiv"), "XARXIV|");
        assert_eq!(source_prefix("doi"), "XDOI|");
    }

    #[test]
    fn prefix_namespace_is_injective() {
        let mut seen = std::collections::HashSet::new();
        for table in [
            BOOLEAN_PREFIX,
            BOOLEAN_PREFIX_MULTI,
            BOOLEAN_PREFIX_INTERNAL,
            PROBABILISTIC_PREFIX,
        ] {
            for (name, prefix) in table {
                // Aliases share a prefix; distinct fields must not.
                if seen.insert(*prefix) {
                    continue;
                }
                assert!(
                    matches!(*name, "y" | "t" | "a"),
                    "prefix {prefix} reused by non-alias field {name}"
                );
            }
        }
    }
}
