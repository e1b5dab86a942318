//! Canonicalisation of SELECT bindings for delta detection
//!
//! Two result sets hash equal iff they contain the same rows, independent of
//! row order and of in-row column order. Encoding per term:
//! `<I|L|B><tab>lexical<tab>datatypeIRI<tab>lang`, rows joined by newline.

use crate::graph::{Row, TermKind, TermValue};
use sha2::{Digest, Sha256};

fn encode_term(term: &TermValue) -> String {
    let tag = match term.kind {
        TermKind::Iri => 'I',
        TermKind::Literal => 'L',
        TermKind::Blank => 'B',
    };
    format!(
        "{}\t{}\t{}\t{}",
        tag,
        term.lexical,
        term.datatype.as_deref().unwrap_or(""),
        term.lang.as_deref().unwrap_or("")
    )
}

/// Encode a full result set into its stable byte string
pub fn canonicalise(rows: &[Row]) -> String {
    let mut encoded: Vec<String> = rows
        .iter()
        .map(|row| {
            let mut cells: Vec<(String, String)> = row
                .iter()
                .map(|(var, term)| (var.clone(), encode_term(term)))
                .collect();
            cells.sort();
            cells
                .into_iter()
                .map(|(var, term)| format!("{}\u{1}{}", var, term))
                .collect::<Vec<_>>()
                .join("\u{2}")
        })
        .collect();
    encoded.sort();
    encoded.join("\n")
}

/// SHA-256 hash (hex) over the canonical encoding of a result set
pub fn result_hash(rows: &[Row]) -> String {
    let canonical = canonicalise(rows);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
