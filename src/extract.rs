//! Text extraction seam: file bytes in, plain text out.
//!
//! Real extractors (PDF, etc.) plug in behind [`TextExtractor`]; the
//! indexing core only ever sees the extracted text.

use crate::error::{Error, Result};

pub trait TextExtractor {
    /// Extract plain text from raw file bytes. `name` is the file name,
    /// used for error reporting and format sniffing.
    fn extract(&self, name: &str, data: &[u8]) -> Result<String>;
}

/// Treats file bytes as UTF-8 text, replacing invalid sequences.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainText;

impl TextExtractor for PlainText {
    fn extract(&self, _name: &str, data: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}

/// An extractor that always fails, for callers that stage files without
/// wanting any text indexed from them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExtract;

impl TextExtractor for NoExtract {
    fn extract(&self, name: &str, _data: &[u8]) -> Result<String> {
        Err(Error::Extraction {
            name: name.to_string(),
            reason: "no extractor configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_roundtrip() {
        let text = PlainText.extract("a.txt", b"hello world").unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn plain_text_lossy() {
        let text = PlainText.extract("a.txt", &[0x68, 0x69, 0xff]).unwrap();
        assert!(text.starts_with("hi"));
    }

    #[test]
    fn no_extract_is_an_extraction_error() {
        let err = NoExtract.extract("a.pdf", b"%PDF").unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }
}
