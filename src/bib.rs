//! Bibliographic records.
//!
//! The bibliographic text parser itself is an external collaborator; what
//! it produces (and what this crate persists per document) is a record of
//! {key, field map, author list}, serialized as JSON.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One bibliographic entry: a citation key, a map of non-author fields,
/// and an author-name list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibRecord {
    pub key: String,
    #[serde(default = "default_entry_type")]
    pub entry_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

fn default_entry_type() -> String {
    "article".to_string()
}

impl BibRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entry_type: default_entry_type(),
            fields: BTreeMap::new(),
            authors: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// File path reference, if the record carries one.
    ///
    /// Accepts either a plain path or the Mendeley/JabRef colon form
    /// (`:path:type`).
    pub fn file(&self) -> Option<&str> {
        let raw = self.field("file")?;
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() > 1 {
            Some(parts[1])
        } else {
            Some(parts[0])
        }
    }

    /// Record a file path reference in the Mendeley/JabRef colon form.
    pub fn set_file(&mut self, path: &str) {
        self.fields.insert("file".to_string(), format!(":{path}:pdf"));
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Parse a JSON array of records, e.g. an exported bibliography.
    pub fn list_from_json(data: &[u8]) -> Result<Vec<Self>> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_reference_plain_and_colon_form() {
        let mut rec = BibRecord::new("smith99");
        assert_eq!(rec.file(), None);

        rec.set_field("file", "/tmp/paper.pdf");
        assert_eq!(rec.file(), Some("/tmp/paper.pdf"));

        rec.set_file("/tmp/paper.pdf");
        assert_eq!(rec.file(), Some("/tmp/paper.pdf"));
    }

    #[test]
    fn json_round_trip() {
        let mut rec = BibRecord::new("smith99");
        rec.set_field("title", "On Things");
        rec.set_field("year", "1999");
        rec.authors.push("Jo Smith".to_string());

        let json = serde_json::to_vec(&rec).unwrap();
        let back = BibRecord::from_json(&json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn missing_optional_fields_default() {
        let rec = BibRecord::from_json(br#"{"key":"k1"}"#).unwrap();
        assert_eq!(rec.key, "k1");
        assert_eq!(rec.entry_type, "article");
        assert!(rec.fields.is_empty());
        assert!(rec.authors.is_empty());
    }

    #[test]
    fn file_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bib.json");

        let mut rec = BibRecord::new("smith99");
        rec.set_field("title", "On Things");
        rec.to_file(&path).unwrap();

        let back = BibRecord::from_file(&path).unwrap();
        assert_eq!(back.key, "smith99");
        assert_eq!(back.field("title"), Some("On Things"));
    }
}
