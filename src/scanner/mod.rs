//! Contract document scanner
//!
//! Asset contracts are PDF-like documents published by the issuer. Before
//! a contract is trusted every top-level object is parsed and checked for
//! embedded files or URLs; anything the parser cannot make sense of is a
//! rejection.

mod embedded;
mod object;
mod parser;

pub use embedded::Embedded;
pub use object::{ObjectKind, PdfObject};
pub use parser::{Parser, MAX_DEPTH};

use serde::{Deserialize, Serialize};

/// Verdict on an asset contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractState {
    #[default]
    Unknown,
    CannotParse,
    PossibleEmbeddedUrl,
    EmbeddedUrl,
    Ok,
}

impl ContractState {
    pub fn is_ok(&self) -> bool {
        *self == ContractState::Ok
    }
}

/// Scan a whole contract document from offset 0
pub fn scan_contract(contents: &[u8]) -> ContractState {
    if contents.is_empty() {
        return ContractState::CannotParse;
    }
    let parser = Parser::new(contents);
    for obj in parser.objects() {
        if obj.is_strange() {
            log::debug!("Contract: cannot parse object at offset {}", obj.offset);
            return ContractState::CannotParse;
        }
        let state = match parser.embedded_content(&obj) {
            Embedded::None => continue,
            Embedded::Strange => ContractState::CannotParse,
            Embedded::File | Embedded::Unclear => ContractState::PossibleEmbeddedUrl,
            Embedded::Url => ContractState::EmbeddedUrl,
        };
        log::info!(
            "Contract: embedded content in object at offset {}: {:?}",
            obj.offset,
            state
        );
        return state;
    }
    ContractState::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &[u8] = b"%PDF-1.4\n\
1 0 obj\n<</Type /Catalog /Pages 2 0 R>>\nendobj\n\
2 0 obj\n<</Type /Pages /Kids [3 0 R] /Count 1>>\nendobj\n\
3 0 obj\n<</Type /Page /Parent 2 0 R /Contents 4 0 R>>\nendobj\n\
4 0 obj\n<</Length 5 0 R>>\nstream\nBT /F1 12 Tf (Terms) Tj ET\nendstream\nendobj\n\
5 0 obj\n26\nendobj\n\
trailer\n<</Size 6 /Root 1 0 R>>\n%%EOF\n";

    #[test]
    fn test_clean_contract() {
        assert_eq!(scan_contract(MINIMAL), ContractState::Ok);
    }

    #[test]
    fn test_empty_contract() {
        assert_eq!(scan_contract(b""), ContractState::CannotParse);
    }

    #[test]
    fn test_embedded_file_contract() {
        let doc = b"1 0 obj\n<</Type /Filespec /F (a.exe) /EF <</F 2 0 R>> >>\nendobj\n";
        assert_eq!(scan_contract(doc), ContractState::PossibleEmbeddedUrl);
    }

    #[test]
    fn test_url_contract() {
        let doc = b"1 0 obj\n<</FS /URL /F (http://phish.example)>>\nendobj\n";
        assert_eq!(scan_contract(doc), ContractState::EmbeddedUrl);
    }

    #[test]
    fn test_garbage_contract() {
        assert_eq!(scan_contract(b"\x89PNG\r\n\x1a\n"), ContractState::CannotParse);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&ContractState::PossibleEmbeddedUrl).unwrap();
        assert_eq!(json, "\"POSSIBLE_EMBEDDED_URL\"");
    }
}
