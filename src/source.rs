//! External bibliographic sources.
//!
//! A source is a remote repository (arXiv, DOI resolvers, ...) identified
//! by a short name, from which documents carry per-item external ids. Each
//! plugin declares its capabilities explicitly; asking for one it lacks is
//! a typed [`Error::SourceCapability`], never a panic. Network fetch
//! implementations are collaborators supplied by the embedding
//! application.

use std::{collections::BTreeSet, fmt, sync::LazyLock};

use regex::Regex;

use crate::{
    bib::BibRecord,
    error::{Error, Result},
};

/// A (source name, external id) pair, rendered as `name:id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sid {
    pub source: String,
    pub id: String,
}

impl Sid {
    pub fn new(source: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            source: source.into().to_lowercase(),
            id: id.into(),
        }
    }

    /// Parse a `name:id` string.
    pub fn parse(s: &str) -> Option<Self> {
        let (source, id) = s.split_once(':')?;
        if source.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(source, id))
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

/// A source plugin. Only `name` and `description` are required; every
/// other capability is optional and checked at call time.
pub trait SourcePlugin {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// URL template with a `%s` placeholder for the item id.
    fn url_template(&self) -> Option<&str> {
        None
    }

    /// Pattern matching a URL for this source; capture group 1 is the id.
    fn url_pattern(&self) -> Option<&Regex> {
        None
    }

    /// Pattern for scanning document text for ids; capture group 1 is the
    /// id.
    fn scan_pattern(&self) -> Option<&Regex> {
        None
    }

    /// Fetch the bibliographic record bytes for an item.
    fn fetch_record(&self, _id: &str) -> Result<Vec<u8>> {
        Err(Error::SourceCapability {
            name: self.name().to_string(),
            capability: "a fetch_record() function",
        })
    }

    /// Fetch the document file for an item, returning (name, bytes).
    fn fetch_file(&self, _id: &str) -> Result<(String, Vec<u8>)> {
        Err(Error::SourceCapability {
            name: self.name().to_string(),
            capability: "a fetch_file() function",
        })
    }

    /// The item URL for an id, from the URL template.
    fn item_url(&self, id: &str) -> Result<String> {
        match self.url_template() {
            Some(template) => Ok(template.replace("%s", id)),
            None => Err(Error::SourceCapability {
                name: self.name().to_string(),
                capability: "a URL template",
            }),
        }
    }
}

// -- Builtin source descriptors --

static ARXIV_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://arxiv\.org/(?:abs|pdf|format)/([^/]+)").expect("valid regex")
});
static ARXIV_SCAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"arXiv:([0-9]{4}\.[0-9]{4,5})(?:v[0-9]+)?").expect("valid regex")
});

/// The arXiv preprint archive.
#[derive(Debug, Default)]
pub struct Arxiv;

impl SourcePlugin for Arxiv {
    fn name(&self) -> &str {
        "arxiv"
    }

    fn description(&self) -> &str {
        "Open access e-print service"
    }

    fn url_template(&self) -> Option<&str> {
        Some("https://arxiv.org/abs/%s")
    }

    fn url_pattern(&self) -> Option<&Regex> {
        Some(&ARXIV_URL)
    }

    fn scan_pattern(&self) -> Option<&Regex> {
        Some(&ARXIV_SCAN)
    }
}

static DOI_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:dx\.)?doi\.org/(10\.\d{4,}[\w:.\-/]+)").expect("valid regex")
});
static DOI_SCAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:doi|DOI)[\s.:]{0,2}(10\.\d{4,}[\w:.\-/]+)").expect("valid regex")
});

/// Digital Object Identifiers.
#[derive(Debug, Default)]
pub struct Doi;

impl SourcePlugin for Doi {
    fn name(&self) -> &str {
        "doi"
    }

    fn description(&self) -> &str {
        "Digital Object Identifier"
    }

    fn url_template(&self) -> Option<&str> {
        Some("https://dx.doi.org/%s")
    }

    fn url_pattern(&self) -> Option<&Regex> {
        Some(&DOI_URL)
    }

    fn scan_pattern(&self) -> Option<&Regex> {
        Some(&DOI_SCAN)
    }
}

static IACR_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://eprint\.iacr\.org/(\d{4,}/\d{3,})").expect("valid regex")
});

/// The Cryptology ePrint Archive. Submissions carry no in-text
/// identifier, so there is no scan pattern.
#[derive(Debug, Default)]
pub struct CryptoEprint;

impl SourcePlugin for CryptoEprint {
    fn name(&self) -> &str {
        "cryptoeprint"
    }

    fn description(&self) -> &str {
        "Cryptology ePrint Archive"
    }

    fn url_template(&self) -> Option<&str> {
        Some("https://eprint.iacr.org/%s")
    }

    fn url_pattern(&self) -> Option<&Regex> {
        Some(&IACR_URL)
    }
}

// -- Registry --

/// The set of available source plugins.
///
/// Must be assembled before the database query parser is configured, since
/// every source name becomes a boolean filter keyword.
pub struct SourceRegistry {
    sources: Vec<Box<dyn SourcePlugin>>,
}

impl SourceRegistry {
    /// Registry with the builtin descriptors.
    pub fn builtin() -> Self {
        Self {
            sources: vec![Box::new(Arxiv), Box::new(Doi), Box::new(CryptoEprint)],
        }
    }

    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Register an additional plugin. A plugin with the same name replaces
    /// the builtin one.
    pub fn register(&mut self, plugin: Box<dyn SourcePlugin>) {
        self.sources.retain(|s| s.name() != plugin.name());
        self.sources.push(plugin);
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn SourcePlugin> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(Box::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn SourcePlugin> {
        self.sources.iter().map(Box::as_ref)
    }

    /// Resolve a URL or `name:id` string to a [`Sid`].
    pub fn match_source(&self, s: &str) -> Result<Sid> {
        if s.starts_with("http://") || s.starts_with("https://") {
            for source in self.iter() {
                if let Some(pattern) = source.url_pattern()
                    && let Some(caps) = pattern.captures(s)
                    && let Some(id) = caps.get(1)
                {
                    return Ok(Sid::new(source.name(), id.as_str()));
                }
            }
        } else if let Some(sid) = Sid::parse(s)
            && self.contains(&sid.source)
        {
            return Ok(sid);
        }
        Err(Error::SourceMatch(s.to_string()))
    }

    /// Scan document text for source identifiers.
    pub fn scan_text(&self, text: &str) -> Vec<Sid> {
        let mut found = BTreeSet::new();
        for source in self.iter() {
            let Some(pattern) = source.scan_pattern() else {
                continue;
            };
            for caps in pattern.captures_iter(text) {
                if let Some(id) = caps.get(1) {
                    found.insert(Sid::new(source.name(), id.as_str()));
                }
            }
        }
        found.into_iter().collect()
    }

    /// Scan a bibliographic record for source identifiers. Field names
    /// matching a source name are taken as ids; `eprint` is an arXiv
    /// alias.
    pub fn scan_record(&self, record: &BibRecord) -> Vec<Sid> {
        let mut found = BTreeSet::new();
        for (field, value) in &record.fields {
            let field = field.to_lowercase();
            if self.contains(&field) {
                found.insert(Sid::new(field, value.clone()));
            }
        }
        if let Some(eprint) = record.field("eprint")
            && self.contains("arxiv")
        {
            found.insert(Sid::new("arxiv", eprint));
        }
        found.into_iter().collect()
    }
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sid_display_and_parse() {
        let sid = Sid::new("arxiv", "1234.5678");
        assert_eq!(sid.to_string(), "arxiv:1234.5678");
        assert_eq!(Sid::parse("arxiv:1234.5678"), Some(sid));
        assert_eq!(Sid::parse("noseparator"), None);
    }

    #[test]
    fn sid_parse_keeps_colons_in_id() {
        let sid = Sid::parse("doi:10.1000/a:b").unwrap();
        assert_eq!(sid.id, "10.1000/a:b");
    }

    #[test]
    fn match_source_url() {
        let reg = SourceRegistry::builtin();
        let sid = reg
            .match_source("https://arxiv.org/abs/1234.5678")
            .unwrap();
        assert_eq!(sid, Sid::new("arxiv", "1234.5678"));

        let sid = reg
            .match_source("https://dx.doi.org/10.1000/xyz123")
            .unwrap();
        assert_eq!(sid, Sid::new("doi", "10.1000/xyz123"));
    }

    #[test]
    fn match_source_cryptoeprint_url() {
        let reg = SourceRegistry::builtin();
        let sid = reg
            .match_source("https://eprint.iacr.org/2019/1234")
            .unwrap();
        assert_eq!(sid, Sid::new("cryptoeprint", "2019/1234"));
        assert_eq!(
            CryptoEprint.item_url("2019/1234").unwrap(),
            "https://eprint.iacr.org/2019/1234"
        );
        // No in-text identifier to scan for.
        assert!(CryptoEprint.scan_pattern().is_none());
    }

    #[test]
    fn match_source_sid_form() {
        let reg = SourceRegistry::builtin();
        let sid = reg.match_source("arxiv:1234.5678").unwrap();
        assert_eq!(sid, Sid::new("arxiv", "1234.5678"));
    }

    #[test]
    fn match_source_unknown_errors() {
        let reg = SourceRegistry::builtin();
        let err = reg.match_source("gopher://nowhere").unwrap_err();
        assert!(matches!(err, Error::SourceMatch(_)));
        let err = reg.match_source("nosuchsource:42").unwrap_err();
        assert!(matches!(err, Error::SourceMatch(_)));
    }

    #[test]
    fn scan_text_finds_ids() {
        let reg = SourceRegistry::builtin();
        let text = "see arXiv:1801.00001v2 and doi:10.1000/xyz123 for details";
        let sids = reg.scan_text(text);
        assert!(sids.contains(&Sid::new("arxiv", "1801.00001")));
        assert!(sids.contains(&Sid::new("doi", "10.1000/xyz123")));
    }

    #[test]
    fn scan_record_field_names_and_eprint_alias() {
        let reg = SourceRegistry::builtin();
        let mut rec = BibRecord::new("k");
        rec.set_field("doi", "10.1000/xyz123");
        rec.set_field("eprint", "1801.00001");
        let sids = reg.scan_record(&rec);
        assert!(sids.contains(&Sid::new("doi", "10.1000/xyz123")));
        assert!(sids.contains(&Sid::new("arxiv", "1801.00001")));
    }

    #[test]
    fn missing_capability_is_typed() {
        let err = Arxiv.fetch_record("1234.5678").unwrap_err();
        assert!(matches!(err, Error::SourceCapability { .. }));
        assert_eq!(
            err.to_string(),
            "source 'arxiv' does not provide a fetch_record() function"
        );
        let err = Doi.fetch_file("10.1000/x").unwrap_err();
        assert!(matches!(err, Error::SourceCapability { .. }));
    }

    #[test]
    fn item_url_from_template() {
        assert_eq!(
            Arxiv.item_url("1234.5678").unwrap(),
            "https://arxiv.org/abs/1234.5678"
        );
    }
}
