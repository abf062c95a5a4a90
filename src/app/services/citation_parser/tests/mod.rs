//! Tests for the citation XML parser and field extractors


use serde_json::Value;

/// Parse an XML snippet and return the tagged document value
pub fn parse(xml: &str) -> Value {
    super::reader::parse_document(xml, "test.xml").expect("test XML should parse")
}

/// Parse an XML snippet wrapped in a root element and return the root's value
pub fn parse_fragment(inner: &str) -> Value {
    let document = parse(&format!("<Root>{inner}</Root>"));
    document
        .get("Root")
        .cloned()
        .expect("wrapped fragment should have a Root element")
}
