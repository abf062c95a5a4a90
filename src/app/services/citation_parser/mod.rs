//! Citation XML parser for MEDLINE/PubMed batch documents
//!
//! This module turns one PubMed article-set XML document into a tolerant
//! tagged value and provides the pure field extractors that normalize its
//! irregular substructures (optional fields, one-or-many elements,
//! string-vs-mapping ambiguity, alternate date encodings).
//!
//! ## Architecture
//!
//! - [`reader`] - Event-driven XML parsing into a generic tagged value
//! - [`extractors`] - Pure field normalization functions over that value
//!
//! The tagged-value conventions match what the rest of the pipeline expects:
//! attributes become `"@name"` keys, mixed content text becomes `"#text"`,
//! repeated sibling elements collapse into arrays, and empty elements are
//! null. All shape branching lives in the extractors, never at call sites.

pub mod extractors;
pub mod reader;

#[cfg(test)]
pub mod tests;

// Re-export main entry points for easy access
pub use reader::{citation_records, parse_document};
