//! Tolerant payload parsing.
//!
//! The gateway's XML is not always well formed, so extraction is lenient:
//! individually broken records are skipped while the rest of the payload
//! still parses. The strategy sits behind [`PayloadParser`] so callers never
//! depend on the regex implementation directly.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

/// One extracted record: element attributes merged with named child values.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    fields: HashMap<String, String>,
}

impl RawRecord {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Errors for structurally unparseable payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("payload is structurally unparseable: {message}")]
    Unparseable { message: String },
}

/// Extraction seam; the matching strategy is swappable without touching
/// callers.
pub trait PayloadParser: Send + Sync {
    /// Extract every repeated `element` block from `raw`.
    ///
    /// Fails only when the whole payload is structurally unparseable;
    /// individually broken blocks are skipped.
    fn extract_records(&self, raw: &str, element: &str) -> Result<Vec<RawRecord>, ParseError>;
}

/// Regex-based tolerant extractor.
pub struct RegexXmlParser {
    attribute_re: Regex,
    child_tag_re: Regex,
    child_self_closing_re: Regex,
}

impl RegexXmlParser {
    pub fn new() -> Self {
        Self {
            attribute_re: Regex::new(r#"([A-Za-z_][\w\-]*)\s*=\s*"([^"]*)""#)
                .expect("attribute regex is valid"),
            // The regex crate has no backreferences; opening/closing tag
            // names are compared manually after capture.
            child_tag_re: Regex::new(r"(?s)<([A-Za-z_]\w*)\b[^>/]*>([^<]*)</([A-Za-z_]\w*)>")
                .expect("child tag regex is valid"),
            child_self_closing_re: Regex::new(r#"<([A-Za-z_]\w*)\s+(?:Value|V)="([^"]*)"[^>]*/>"#)
                .expect("self-closing child regex is valid"),
        }
    }

    fn strip_noise(raw: &str) -> String {
        let mut text = raw.trim_start_matches('\u{feff}').to_string();

        // XML declaration
        if let Some(end) = text.find("?>")
            && text.trim_start().starts_with("<?xml")
        {
            text = text[end + 2..].to_string();
        }

        // Unwrap CDATA sections in place.
        while let Some(start) = text.find("<![CDATA[") {
            match text[start..].find("]]>") {
                Some(offset) => {
                    let inner = text[start + 9..start + offset].to_string();
                    text.replace_range(start..start + offset + 3, &inner);
                }
                None => break,
            }
        }

        text.trim().to_string()
    }

    fn parse_block(&self, attributes: &str, body: Option<&str>) -> RawRecord {
        let mut record = RawRecord::default();

        for captures in self.attribute_re.captures_iter(attributes) {
            record.insert(&captures[1], &captures[2]);
        }

        if let Some(body) = body {
            for captures in self.child_tag_re.captures_iter(body) {
                // Mismatched opening/closing names mean a broken child;
                // skip it, keep the rest of the record.
                if captures[1] == captures[3] {
                    record.insert(&captures[1], captures[2].trim());
                }
            }
            for captures in self.child_self_closing_re.captures_iter(body) {
                record.insert(&captures[1], &captures[2]);
            }
        }

        record
    }
}

impl Default for RegexXmlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadParser for RegexXmlParser {
    fn extract_records(&self, raw: &str, element: &str) -> Result<Vec<RawRecord>, ParseError> {
        let text = Self::strip_noise(raw);

        if text.is_empty() || !text.contains('<') {
            return Err(ParseError::Unparseable {
                message: "payload contains no XML elements".to_string(),
            });
        }

        // Self-closing and block forms of the repeated element.
        let block_re = Regex::new(&format!(
            r"(?s)<{el}\b([^>]*?)/>|<{el}\b([^>]*?)>(.*?)</{el}>",
            el = regex::escape(element)
        ))
        .map_err(|e| ParseError::Unparseable {
            message: format!("invalid element name {element}: {e}"),
        })?;

        let mut records = Vec::new();
        for captures in block_re.captures_iter(&text) {
            let record = match (captures.get(1), captures.get(2), captures.get(3)) {
                (Some(attrs), _, _) => self.parse_block(attrs.as_str(), None),
                (None, Some(attrs), body) => {
                    self.parse_block(attrs.as_str(), body.map(|m| m.as_str()))
                }
                _ => continue,
            };

            if record.is_empty() {
                tracing::debug!(element, "Skipping empty {element} block in payload");
                continue;
            }
            records.push(record);
        }

        Ok(records)
    }
}
