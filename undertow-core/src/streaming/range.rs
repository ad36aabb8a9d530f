//! HTTP range negotiation
//!
//! Turns an inbound `Range` header and an object's size into the response
//! status, the response headers, and the inclusive byte window the range
//! reader must serve. Everything here happens before any body byte is
//! written, so every failure can still become its own error response.

use axum::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};

use crate::object::{DEFAULT_CONTENT_TYPE, RemoteObjectHandle};

/// Inclusive byte window `[start, end]` inside an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteWindow {
    start: u64,
    end: u64,
}

impl ByteWindow {
    /// Creates a window inside an object of `size` bytes.
    ///
    /// # Errors
    /// - `RangeError::InvalidWindow` - `start > end` or `end >= size`
    pub fn new(start: u64, end: u64, size: u64) -> Result<Self, RangeError> {
        if start > end || end >= size {
            return Err(RangeError::InvalidWindow { start, end, size });
        }
        Ok(Self { start, end })
    }

    /// Window spanning the whole object.
    ///
    /// # Errors
    /// - `RangeError::EmptyObject` - Object has no bytes to serve
    pub fn full(size: u64) -> Result<Self, RangeError> {
        if size == 0 {
            return Err(RangeError::EmptyObject);
        }
        Ok(Self {
            start: 0,
            end: size - 1,
        })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes in the window.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A window always holds at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// One parsed range clause, already clamped to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRange {
    pub start: u64,
    pub length: u64,
}

/// Whether the response body is meant for inline playback or download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    #[default]
    Inline,
    Attachment,
}

/// Errors produced while negotiating a range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("malformed range header: {header}")]
    Malformed { header: String },

    #[error("no requested range overlaps the {size} byte object")]
    NotSatisfiable { size: u64 },

    #[error("object is empty")]
    EmptyObject,

    #[error("window {start}-{end} does not fit an object of {size} bytes")]
    InvalidWindow { start: u64, end: u64, size: u64 },
}

impl RangeError {
    /// Status a handler should answer with when it has no better choice.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::RANGE_NOT_SATISFIABLE
    }
}

/// Outcome of range negotiation.
#[derive(Debug, Clone)]
pub struct RangeNegotiation {
    pub status: StatusCode,
    pub window: ByteWindow,
    pub headers: HeaderMap,
}

impl RangeNegotiation {
    pub fn is_partial(&self) -> bool {
        self.status == StatusCode::PARTIAL_CONTENT
    }
}

/// Parses a `Range` header value against an object of `size` bytes.
///
/// Supports `bytes=a-b`, open ended `bytes=a-` and suffix `bytes=-n`
/// clauses, separated by commas. Clauses starting past the end of the object
/// are dropped; ends past the object are clamped. An empty value yields no
/// ranges.
///
/// # Errors
/// - `RangeError::Malformed` - Syntax error in any clause
/// - `RangeError::NotSatisfiable` - Every clause starts past the object
pub fn parse_range_header(value: &str, size: u64) -> Result<Vec<HttpRange>, RangeError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }

    let malformed = || RangeError::Malformed {
        header: value.to_string(),
    };
    let spec = value.strip_prefix("bytes=").ok_or_else(malformed)?;

    let mut ranges = Vec::new();
    let mut no_overlap = false;

    for clause in spec.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let (start_str, end_str) = clause.split_once('-').ok_or_else(malformed)?;
        let (start_str, end_str) = (start_str.trim(), end_str.trim());

        if start_str.is_empty() {
            // Suffix range: the last `n` bytes.
            let suffix: u64 = end_str.parse().map_err(|_| malformed())?;
            if end_str.starts_with('+') {
                return Err(malformed());
            }
            let suffix = suffix.min(size);
            if suffix == 0 {
                no_overlap = true;
                continue;
            }
            ranges.push(HttpRange {
                start: size - suffix,
                length: suffix,
            });
            continue;
        }

        if start_str.starts_with('+') {
            return Err(malformed());
        }
        let start: u64 = start_str.parse().map_err(|_| malformed())?;
        if start >= size {
            no_overlap = true;
            continue;
        }

        let length = if end_str.is_empty() {
            size - start
        } else {
            if end_str.starts_with('+') {
                return Err(malformed());
            }
            let end: u64 = end_str.parse().map_err(|_| malformed())?;
            if start > end {
                return Err(malformed());
            }
            end.min(size - 1) - start + 1
        };
        ranges.push(HttpRange { start, length });
    }

    if ranges.is_empty() && no_overlap {
        return Err(RangeError::NotSatisfiable { size });
    }
    Ok(ranges)
}

/// Negotiates status, headers and window for one response.
///
/// An absent or empty header selects the whole object with `200 OK`. A
/// present header selects the first clause only with `206 Partial Content`.
///
/// # Errors
/// - `RangeError::EmptyObject` - The object has no bytes
/// - `RangeError::Malformed` - The header cannot be parsed
/// - `RangeError::NotSatisfiable` - No clause overlaps the object
pub fn negotiate(
    range_header: Option<&str>,
    object: &RemoteObjectHandle,
    disposition: Disposition,
) -> Result<RangeNegotiation, RangeError> {
    let size = object.size();
    if size == 0 {
        return Err(RangeError::EmptyObject);
    }

    let first = match range_header {
        Some(value) => parse_range_header(value, size)?.into_iter().next(),
        None => None,
    };

    let (status, window) = match first {
        None => (StatusCode::OK, ByteWindow::full(size)?),
        Some(range) => {
            let end = (range.start + range.length - 1).min(size - 1);
            (
                StatusCode::PARTIAL_CONTENT,
                ByteWindow::new(range.start, end, size)?,
            )
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(object.content_type())
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(window.len()));
    if status == StatusCode::PARTIAL_CONTENT {
        headers.insert(
            CONTENT_RANGE,
            content_range_value(&format!(
                "bytes {}-{}/{}",
                window.start(),
                window.end(),
                size
            )),
        );
    }
    if disposition == Disposition::Attachment {
        headers.insert(CONTENT_DISPOSITION, attachment_value(object.name()));
    }

    tracing::debug!(
        location = %object.location(),
        status = status.as_u16(),
        start = window.start(),
        end = window.end(),
        size,
        "Negotiated range"
    );

    Ok(RangeNegotiation {
        status,
        window,
        headers,
    })
}

/// `Content-Range` value for a `416` answer.
pub fn unsatisfied_content_range(size: u64) -> HeaderValue {
    content_range_value(&format!("bytes */{size}"))
}

fn content_range_value(value: &str) -> HeaderValue {
    // Built only from digits and ASCII punctuation.
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("bytes */0"))
}

fn attachment_value(name: &str) -> HeaderValue {
    let cleaned: String = name
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    HeaderValue::from_bytes(format!("attachment; filename=\"{cleaned}\"").as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectLocation;

    fn object(size: u64, mime: Option<&str>) -> RemoteObjectHandle {
        RemoteObjectHandle::new(
            ObjectLocation::new("loc"),
            size,
            mime.map(str::to_string),
            "movie night.mp4",
        )
    }

    fn header<'a>(negotiation: &'a RangeNegotiation, name: &str) -> Option<&'a str> {
        negotiation
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    #[test]
    fn test_absent_header_serves_whole_object() {
        let negotiation = negotiate(None, &object(1000, Some("video/mp4")), Disposition::Inline)
            .unwrap();

        assert_eq!(negotiation.status, StatusCode::OK);
        assert_eq!(negotiation.window, ByteWindow::full(1000).unwrap());
        assert_eq!(header(&negotiation, "content-length"), Some("1000"));
        assert_eq!(header(&negotiation, "accept-ranges"), Some("bytes"));
        assert_eq!(header(&negotiation, "content-type"), Some("video/mp4"));
        assert!(header(&negotiation, "content-range").is_none());
        assert!(header(&negotiation, "content-disposition").is_none());
    }

    #[test]
    fn test_empty_header_is_treated_as_absent() {
        let negotiation = negotiate(Some(""), &object(1000, None), Disposition::Inline).unwrap();
        assert_eq!(negotiation.status, StatusCode::OK);
        assert!(!negotiation.is_partial());
    }

    #[test]
    fn test_bounded_range() {
        let negotiation =
            negotiate(Some("bytes=100-199"), &object(1000, None), Disposition::Inline).unwrap();

        assert_eq!(negotiation.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(header(&negotiation, "content-range"), Some("bytes 100-199/1000"));
        assert_eq!(header(&negotiation, "content-length"), Some("100"));
        assert_eq!(negotiation.window.start(), 100);
        assert_eq!(negotiation.window.end(), 199);
    }

    #[test]
    fn test_range_past_end_is_clamped() {
        let negotiation =
            negotiate(Some("bytes=900-2000"), &object(1000, None), Disposition::Inline).unwrap();

        assert_eq!(header(&negotiation, "content-range"), Some("bytes 900-999/1000"));
        assert_eq!(header(&negotiation, "content-length"), Some("100"));
    }

    #[test]
    fn test_open_ended_and_suffix_ranges() {
        let open = negotiate(Some("bytes=500-"), &object(1000, None), Disposition::Inline).unwrap();
        assert_eq!(header(&open, "content-range"), Some("bytes 500-999/1000"));

        let suffix =
            negotiate(Some("bytes=-200"), &object(1000, None), Disposition::Inline).unwrap();
        assert_eq!(header(&suffix, "content-range"), Some("bytes 800-999/1000"));

        let oversized =
            negotiate(Some("bytes=-5000"), &object(1000, None), Disposition::Inline).unwrap();
        assert_eq!(header(&oversized, "content-range"), Some("bytes 0-999/1000"));
    }

    #[test]
    fn test_only_first_clause_is_honoured() {
        let negotiation = negotiate(
            Some("bytes=10-19, 50-59"),
            &object(1000, None),
            Disposition::Inline,
        )
        .unwrap();
        assert_eq!(header(&negotiation, "content-range"), Some("bytes 10-19/1000"));
    }

    #[test]
    fn test_malformed_headers_are_rejected() {
        for value in [
            "items=0-1",
            "bytes=abc-",
            "bytes=5-1",
            "bytes=1",
            "bytes=--3",
            "bytes=+1-2",
        ] {
            let result = negotiate(Some(value), &object(1000, None), Disposition::Inline);
            assert!(
                matches!(result, Err(RangeError::Malformed { .. })),
                "{value} should be malformed"
            );
        }
    }

    #[test]
    fn test_range_beyond_object_is_not_satisfiable() {
        let result = negotiate(Some("bytes=1000-1100"), &object(1000, None), Disposition::Inline);
        assert_eq!(result.unwrap_err(), RangeError::NotSatisfiable { size: 1000 });
    }

    #[test]
    fn test_empty_object_is_rejected() {
        let result = negotiate(None, &object(0, None), Disposition::Inline);
        assert_eq!(result.unwrap_err(), RangeError::EmptyObject);
    }

    #[test]
    fn test_attachment_disposition() {
        let negotiation = negotiate(None, &object(10, None), Disposition::Attachment).unwrap();
        assert_eq!(
            header(&negotiation, "content-disposition"),
            Some("attachment; filename=\"movie night.mp4\"")
        );
        assert_eq!(
            header(&negotiation, "content-type"),
            Some("application/octet-stream")
        );
    }

    #[test]
    fn test_attachment_value_strips_quotes() {
        let value = attachment_value("bad\"name\r\n.mkv");
        assert_eq!(value.to_str().unwrap(), "attachment; filename=\"badname.mkv\"");
    }

    #[test]
    fn test_window_validation() {
        assert!(ByteWindow::new(5, 4, 10).is_err());
        assert!(ByteWindow::new(0, 10, 10).is_err());
        assert_eq!(ByteWindow::new(3, 3, 10).unwrap().len(), 1);
    }
}
