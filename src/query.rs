//! Query-language surface.
//!
//! Builds an engine query from a query string: boolean field filters
//! (`tag:`, `key:`, `id:`, `year:`, registered source names), a numeric
//! range form on `year:`, ranked field filters (`title:`/`t:`,
//! `author:`/`a:`), free-text terms combined with AND, and the literal
//! wildcard `*`. Internal prefixes (`file`, `type`) are not recognized
//! here.

use std::ops::Bound;

use tantivy::{
    Index, Term,
    query::{AllQuery, BooleanQuery, EmptyQuery, Occur, Query, QueryParser, RangeQuery, TermQuery},
    schema::IndexRecordOption,
};

use crate::{
    error::{Error, Result},
    schema::{self, SchemaFields},
};

pub(crate) fn build_query(
    index: &Index,
    fields: SchemaFields,
    source_names: &[String],
    query_str: &str,
) -> Result<Box<dyn Query>> {
    let query = parse(index, fields, source_names, query_str)?;

    // Debugging escape hatch: echo what the string parsed into.
    if std::env::var_os("BIBDEX_DEBUG_QUERY").is_some() {
        eprintln!("query string: {query_str}");
        eprintln!("final query: {query:?}");
    }

    Ok(query)
}

fn parse(
    index: &Index,
    fields: SchemaFields,
    source_names: &[String],
    query_str: &str,
) -> Result<Box<dyn Query>> {
    if query_str.trim() == "*" {
        return Ok(Box::new(AllQuery));
    }

    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
    let mut free_text: Vec<String> = Vec::new();

    for token in query_str.split_whitespace() {
        let Some((name, value)) = split_filter(token) else {
            free_text.push(token.to_string());
            continue;
        };

        let lname = name.to_lowercase();
        if schema::is_ranked(&lname) {
            // Hand ranked filters to the engine parser under the
            // canonical field name.
            free_text.push(format!("{}:{}", canonical_ranked(&lname), value));
        } else if lname == "year" || lname == "y" {
            clauses.push((Occur::Must, year_query(fields, value)?));
        } else if let Some(prefix) = boolean_prefix(&lname) {
            clauses.push((Occur::Must, term_query(fields, prefix, value)));
        } else if source_names.iter().any(|s| s == &lname) {
            let prefix = schema::source_prefix(&lname);
            clauses.push((Occur::Must, term_query(fields, &prefix, value)));
        } else {
            // Unknown field name; treat the whole token as text.
            free_text.push(token.to_string());
        }
    }

    if !free_text.is_empty() {
        let mut parser =
            QueryParser::for_index(index, vec![fields.title, fields.author, fields.text]);
        parser.set_conjunction_by_default();
        let text_query = parser.parse_query(&free_text.join(" "))?;
        clauses.push((Occur::Must, text_query));
    }

    if clauses.is_empty() {
        return Ok(Box::new(EmptyQuery));
    }
    if clauses.len() == 1 {
        return Ok(clauses.remove(0).1);
    }
    Ok(Box::new(BooleanQuery::new(clauses)))
}

/// Split a `name:value` filter token. Values must be non-empty, and the
/// name must look like a field name rather than, say, a bare URL.
fn split_filter(token: &str) -> Option<(&str, &str)> {
    let (name, value) = token.split_once(':')?;
    if name.is_empty()
        || value.is_empty()
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }
    Some((name, value))
}

fn canonical_ranked(name: &str) -> &'static str {
    match name {
        "t" | "title" => "title",
        _ => "author",
    }
}

fn boolean_prefix(name: &str) -> Option<&'static str> {
    schema::BOOLEAN_PREFIX
        .iter()
        .chain(schema::BOOLEAN_PREFIX_MULTI)
        .find(|(n, _)| *n == name)
        .map(|(_, p)| *p)
}

fn term_query(fields: SchemaFields, prefix: &str, value: &str) -> Box<dyn Query> {
    let term = Term::from_field_text(fields.term, &format!("{prefix}{value}"));
    Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}

/// `year:1999` matches the boolean `Y` term; `year:1990..2000` is a range
/// over the numeric slot. Either range end may be omitted.
fn year_query(fields: SchemaFields, value: &str) -> Result<Box<dyn Query>> {
    let Some((lo, hi)) = value.split_once("..") else {
        return Ok(term_query(fields, "Y", value));
    };

    let lower = match lo {
        "" => Bound::Unbounded,
        _ => Bound::Included(Term::from_field_u64(fields.year, parse_year(lo)?)),
    };
    let upper = match hi {
        "" => Bound::Unbounded,
        _ => Bound::Included(Term::from_field_u64(fields.year, parse_year(hi)?)),
    };

    Ok(Box::new(RangeQuery::new(lower, upper)))
}

fn parse_year(s: &str) -> Result<u64> {
    s.parse()
        .map_err(|_| Error::Query(format!("invalid year in range: '{s}'")))
}
