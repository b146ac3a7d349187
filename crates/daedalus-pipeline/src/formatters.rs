//! Output formatters and `Accept` negotiation.

use bytes::Bytes;
use mime::Mime;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Writes a value in one media type.
pub trait OutputFormatter: Send + Sync + fmt::Debug {
    /// Content type written by this formatter.
    fn content_type(&self) -> &Mime;

    /// Whether this formatter can satisfy the accepted media type.
    fn can_write_type(&self, accepted: &Mime) -> bool;

    /// Whether this formatter can write `value`.
    fn can_write_value(&self, _value: &serde_json::Value) -> bool {
        true
    }

    /// Serializes `value`.
    fn write(&self, value: &serde_json::Value) -> PipelineResult<Bytes>;
}

fn matches_range(accepted: &Mime, candidate: &Mime) -> bool {
    let type_ok = accepted.type_() == mime::STAR || accepted.type_() == candidate.type_();
    let subtype_ok = accepted.subtype() == mime::STAR || accepted.subtype() == candidate.subtype();
    type_ok && subtype_ok
}

/// `application/json`, `text/json` and `application/*+json`.
#[derive(Debug, Clone)]
pub struct JsonOutputFormatter {
    content_type: Mime,
}

impl Default for JsonOutputFormatter {
    fn default() -> Self {
        Self {
            content_type: mime::APPLICATION_JSON,
        }
    }
}

impl OutputFormatter for JsonOutputFormatter {
    fn content_type(&self) -> &Mime {
        &self.content_type
    }

    fn can_write_type(&self, accepted: &Mime) -> bool {
        matches_range(accepted, &self.content_type)
            || (accepted.type_() == mime::TEXT && accepted.subtype() == mime::JSON)
            || accepted.suffix() == Some(mime::JSON)
    }

    fn write(&self, value: &serde_json::Value) -> PipelineResult<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| PipelineError::result(format!("JSON serialization failed: {e}")))
    }
}

/// `text/plain` for string values.
#[derive(Debug, Clone)]
pub struct PlainTextOutputFormatter {
    content_type: Mime,
}

impl Default for PlainTextOutputFormatter {
    fn default() -> Self {
        Self {
            content_type: mime::TEXT_PLAIN_UTF_8,
        }
    }
}

impl OutputFormatter for PlainTextOutputFormatter {
    fn content_type(&self) -> &Mime {
        &self.content_type
    }

    fn can_write_type(&self, accepted: &Mime) -> bool {
        matches_range(accepted, &self.content_type)
    }

    fn can_write_value(&self, value: &serde_json::Value) -> bool {
        value.is_string()
    }

    fn write(&self, value: &serde_json::Value) -> PipelineResult<Bytes> {
        value
            .as_str()
            .map(|s| Bytes::copy_from_slice(s.as_bytes()))
            .ok_or_else(|| PipelineError::result("plain text formatter requires a string value"))
    }
}

/// One parsed `Accept` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaTypeQuality {
    /// Media range.
    pub media_type: Mime,
    /// Quality factor in `[0, 1]`.
    pub quality: f32,
}

/// Parses an `Accept` header, dropping unparseable entries and `q=0`,
/// ordered by descending quality with header order breaking ties.
#[must_use]
pub fn parse_accept(header: &str) -> Vec<MediaTypeQuality> {
    let mut entries: Vec<MediaTypeQuality> = header
        .split(',')
        .filter_map(|part| part.trim().parse::<Mime>().ok())
        .map(|media_type| {
            let quality = media_type
                .get_param("q")
                .and_then(|q| q.as_str().parse::<f32>().ok())
                .unwrap_or(1.0)
                .clamp(0.0, 1.0);
            MediaTypeQuality { media_type, quality }
        })
        .filter(|entry| entry.quality > 0.0)
        .collect();
    entries.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    entries
}

/// Chooses an output formatter for a response.
#[derive(Debug, Clone)]
pub struct OutputFormatterSelector {
    formatters: Vec<Arc<dyn OutputFormatter>>,
    return_http_not_acceptable: bool,
}

impl Default for OutputFormatterSelector {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(JsonOutputFormatter::default()),
            Arc::new(PlainTextOutputFormatter::default()),
        ])
    }
}

impl OutputFormatterSelector {
    /// Creates a selector over `formatters` in preference order.
    #[must_use]
    pub fn new(formatters: Vec<Arc<dyn OutputFormatter>>) -> Self {
        Self {
            formatters,
            return_http_not_acceptable: false,
        }
    }

    /// Answer 406 instead of falling back when nothing matches `Accept`.
    #[must_use]
    pub fn return_http_not_acceptable(mut self, enabled: bool) -> Self {
        self.return_http_not_acceptable = enabled;
        self
    }

    /// Registered formatters.
    #[must_use]
    pub fn formatters(&self) -> &[Arc<dyn OutputFormatter>] {
        &self.formatters
    }

    /// Selects a formatter for `value` given the request's `Accept` header.
    ///
    /// Returns `None` only when no formatter can write the value, or when
    /// nothing matches `Accept` and 406 responses are enabled.
    pub fn select(
        &self,
        accept: Option<&str>,
        value: &serde_json::Value,
    ) -> Option<Arc<dyn OutputFormatter>> {
        let accepted = accept.map(parse_accept).unwrap_or_default();
        for entry in &accepted {
            if let Some(formatter) = self
                .formatters
                .iter()
                .find(|f| f.can_write_type(&entry.media_type) && f.can_write_value(value))
            {
                return Some(Arc::clone(formatter));
            }
        }
        if !accepted.is_empty() && self.return_http_not_acceptable {
            debug!(accept = ?accept, "no output formatter matches Accept");
            return None;
        }
        self.formatters
            .iter()
            .find(|f| f.can_write_value(value))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_accept_orders_by_quality() {
        let entries = parse_accept("text/plain;q=0.5, application/json, */*;q=0.1, bogus, text/html;q=0");
        let types: Vec<String> = entries.iter().map(|e| e.media_type.essence_str().to_string()).collect();
        assert_eq!(types, vec!["application/json", "text/plain", "*/*"]);
    }

    #[test]
    fn test_equal_quality_keeps_header_order() {
        let entries = parse_accept("text/plain, application/json");
        assert_eq!(entries[0].media_type.essence_str(), "text/plain");
    }

    #[test]
    fn test_select_by_accept() {
        let selector = OutputFormatterSelector::default();
        let text = selector.select(Some("text/plain"), &json!("hi")).expect("formatter");
        assert_eq!(text.content_type().essence_str(), "text/plain");

        // Plain text cannot write objects; falls back to JSON.
        let object = selector.select(Some("text/plain"), &json!({"a": 1})).expect("formatter");
        assert_eq!(object.content_type().essence_str(), "application/json");

        let problem = selector
            .select(Some("application/problem+json"), &json!({}))
            .expect("formatter");
        assert_eq!(problem.content_type().essence_str(), "application/json");
    }

    #[test]
    fn test_no_accept_uses_first() {
        let selector = OutputFormatterSelector::default();
        let formatter = selector.select(None, &json!("hi")).expect("formatter");
        assert_eq!(formatter.content_type().essence_str(), "application/json");
    }

    #[test]
    fn test_not_acceptable() {
        let selector = OutputFormatterSelector::default().return_http_not_acceptable(true);
        assert!(selector.select(Some("application/xml"), &json!(1)).is_none());
        assert!(selector.select(Some("*/*"), &json!(1)).is_some());
    }

    #[test]
    fn test_plain_text_write() {
        let formatter = PlainTextOutputFormatter::default();
        assert_eq!(formatter.write(&json!("hello")).expect("bytes"), Bytes::from_static(b"hello"));
        assert!(formatter.write(&json!(1)).is_err());
    }
}
