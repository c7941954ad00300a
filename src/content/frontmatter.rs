//! Front-matter parsing
//!
//! A header is recognized only when the very first line of the document is
//! an explicit `---` marker. A YAML document that merely *could* be read as
//! a mapping is never taken as front matter.

use thiserror::Error;

use crate::value::{Fields, Value};

/// Opening and closing marker
const MARKER: &str = "---";
/// Alternative YAML end-of-document marker accepted as a closing line
const END_MARKER: &str = "...";

/// Malformed front matter. "No header" is not an error.
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("front matter opened with '---' but never closed")]
    Unterminated,

    #[error("front matter must be a mapping, found a {0}")]
    NotAMapping(&'static str),

    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Split a document into header fields and the remaining text.
///
/// Text without an opening marker is returned untouched with empty fields.
/// The closing marker and any blank lines after it are stripped from the
/// returned body.
pub fn parse_header(text: &str) -> Result<(Fields, &str), HeaderError> {
    let content = text.strip_prefix('\u{feff}').unwrap_or(text);

    let (first, mut offset) = next_line(content, 0);
    if first.trim_end() != MARKER {
        return Ok((Fields::new(), text));
    }

    let block_start = offset;
    let block_end = loop {
        if offset >= content.len() {
            return Err(HeaderError::Unterminated);
        }
        let (line, next) = next_line(content, offset);
        let line = line.trim_end();
        if line == MARKER || line == END_MARKER {
            let end = offset;
            offset = next;
            break end;
        }
        offset = next;
    };

    // Skip blank lines between the header and the body
    while offset < content.len() {
        let (line, next) = next_line(content, offset);
        if !line.trim().is_empty() {
            break;
        }
        offset = next;
    }

    let fields = parse_block(&content[block_start..block_end])?;
    Ok((fields, &content[offset..]))
}

/// Whether the text opens with a header marker
pub fn has_header(text: &str) -> bool {
    let content = text.strip_prefix('\u{feff}').unwrap_or(text);
    next_line(content, 0).0.trim_end() == MARKER
}

fn parse_block(block: &str) -> Result<Fields, HeaderError> {
    if block.trim().is_empty() {
        return Ok(Fields::new());
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(block)?;
    match Value::from_yaml(yaml) {
        Value::Map(fields) => Ok(fields),
        Value::Null => Ok(Fields::new()),
        other => Err(HeaderError::NotAMapping(other.type_name())),
    }
}

/// The line starting at `start` without its terminator, and the offset of
/// the following line
fn next_line(text: &str, start: usize) -> (&str, usize) {
    match text[start..].find('\n') {
        Some(pos) => {
            let line = &text[start..start + pos];
            (line.strip_suffix('\r').unwrap_or(line), start + pos + 1)
        }
        None => (&text[start..], text.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_frontmatter() {
        let content = r#"---
title: Hello World
date: 2024-01-15 10:30:00
tags:
  - rust
  - cms
---

This is the content.
"#;

        let (fields, remaining) = parse_header(content).unwrap();
        assert_eq!(fields.get_str("title"), Some("Hello World"));
        assert_eq!(fields.get("tags").and_then(Value::as_list).map(|t| t.len()), Some(2));
        assert_eq!(remaining, "This is the content.\n");
    }

    #[test]
    fn test_no_marker_returns_text_unchanged() {
        for text in [
            "",
            "plain text",
            "title: looks like yaml\nbut: is not a header\n",
            "\n---\ntitle: x\n---\n",
            " ---\ntitle: x\n---\n",
            "----\nx: 1\n----\n",
        ] {
            let (fields, remaining) = parse_header(text).unwrap();
            assert!(fields.is_empty(), "unexpected fields for {:?}", text);
            assert_eq!(remaining, text);
        }
    }

    #[test]
    fn test_block_and_body_round_trip() {
        let block = "title: Guide\nweight: 3\nauthor:\n  name: Ada";
        let body = "# Heading\n\nText.\n";
        let text = format!("---\n{}\n---\n{}", block, body);

        let (fields, remaining) = parse_header(&text).unwrap();
        assert_eq!(remaining, body);

        let expected: serde_yaml::Value = serde_yaml::from_str(block).unwrap();
        assert_eq!(Value::Map(fields), Value::from_yaml(expected));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let (fields, _) = parse_header("---\nLayout: post\nTitle: X\n---\nbody").unwrap();
        assert_eq!(fields.get_str("layout"), Some("post"));
        assert_eq!(fields.get_str("TITLE"), Some("X"));
    }

    #[test]
    fn test_empty_header() {
        let (fields, remaining) = parse_header("---\n---\nbody").unwrap();
        assert!(fields.is_empty());
        assert_eq!(remaining, "body");
    }

    #[test]
    fn test_crlf_and_dot_terminator() {
        let (fields, remaining) = parse_header("---\r\ntitle: Win\r\n...\r\n\r\nBody\r\n").unwrap();
        assert_eq!(fields.get_str("title"), Some("Win"));
        assert_eq!(remaining, "Body\r\n");
    }

    #[test]
    fn test_byte_order_mark() {
        let (fields, remaining) = parse_header("\u{feff}---\ntitle: Bom\n---\nBody").unwrap();
        assert_eq!(fields.get_str("title"), Some("Bom"));
        assert_eq!(remaining, "Body");
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let err = parse_header("---\ntitle: [unclosed\n---\nbody").unwrap_err();
        assert!(matches!(err, HeaderError::Yaml(_)));
    }

    #[test]
    fn test_unterminated_header_is_an_error() {
        let err = parse_header("---\ntitle: x\nbody without end").unwrap_err();
        assert!(matches!(err, HeaderError::Unterminated));
    }

    #[test]
    fn test_non_mapping_header_is_an_error() {
        let err = parse_header("---\n- a\n- b\n---\nbody").unwrap_err();
        assert!(matches!(err, HeaderError::NotAMapping("list")));
    }

    #[test]
    fn test_has_header() {
        assert!(has_header("---\nx: 1\n---\n"));
        assert!(!has_header("<html></html>"));
    }
}
