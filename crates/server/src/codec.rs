//! Wire-level request/response codec
//!
//! Inbound payloads are either an HTTP-like envelope (request line, headers,
//! blank line, body) or a bare body; the body is everything after the first
//! blank-line boundary. Decoding is tiered: a JSON object with a `"features"`
//! array is the canonical format, and a plain numeric scan of the body is the
//! legacy fallback. The tier that produced the vector is reported so callers
//! can log it.
//!
//! Responses are framed as HTTP/1.1 with a JSON body whose keys follow the
//! model's declared output order and whose values are printed with fixed
//! 6-decimal precision, so encoding the same outputs is byte-identical.

use crate::model::OutputMap;
use finserve_common::{FinserveError, Result};
use std::fmt;
use std::fmt::Write as _;

/// Which decoding tier produced the feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    /// Canonical tier: JSON object with a `"features"` array
    FeaturesField,

    /// Legacy tier: numeric literals scanned out of the body text
    NumericScan,
}

impl fmt::Display for DecodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodePath::FeaturesField => write!(f, "features-field"),
            DecodePath::NumericScan => write!(f, "numeric-scan"),
        }
    }
}

/// A decoded prediction request
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRequest {
    /// The feature vector, in order of appearance
    pub features: Vec<f32>,

    /// Which tier decoded it
    pub path: DecodePath,
}

/// Extract the body from an HTTP-like envelope.
///
/// Returns everything after the first blank line; without one, the whole
/// payload is the body.
fn extract_body(text: &str) -> &str {
    let crlf = text.find("\r\n\r\n").map(|i| i + 4);
    let lf = text.find("\n\n").map(|i| i + 2);

    match (crlf, lf) {
        (Some(a), Some(b)) => &text[a.min(b)..],
        (Some(a), None) => &text[a..],
        (None, Some(b)) => &text[b..],
        (None, None) => text,
    }
}

/// Scan body text for numeric literals, in order of appearance.
///
/// Accepts integers, decimals, leading sign, and exponent notation.
fn scan_numbers(text: &str) -> Vec<f32> {
    let bytes = text.as_bytes();
    let mut values = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let mut j = i;

        if bytes[j] == b'-' || bytes[j] == b'+' {
            j += 1;
        }

        let int_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        let int_len = j - int_start;

        let mut frac_len = 0;
        if j < bytes.len() && bytes[j] == b'.' {
            let frac_start = j + 1;
            let mut k = frac_start;
            while k < bytes.len() && bytes[k].is_ascii_digit() {
                k += 1;
            }
            frac_len = k - frac_start;
            if frac_len > 0 || int_len > 0 {
                j = k;
            }
        }

        if int_len == 0 && frac_len == 0 {
            // No digits at this position; advance past the candidate start.
            i = start + 1;
            continue;
        }

        // Exponent is only consumed when at least one digit follows it.
        if j < bytes.len() && (bytes[j] == b'e' || bytes[j] == b'E') {
            let mut k = j + 1;
            if k < bytes.len() && (bytes[k] == b'-' || bytes[k] == b'+') {
                k += 1;
            }
            let exp_start = k;
            while k < bytes.len() && bytes[k].is_ascii_digit() {
                k += 1;
            }
            if k > exp_start {
                j = k;
            }
        }

        if let Ok(value) = text[start..j].parse::<f64>() {
            values.push(value as f32);
        }
        i = j.max(start + 1);
    }

    values
}

/// Decode raw request bytes into a feature vector.
///
/// The canonical tier requires a JSON body with a numeric `"features"`
/// array; a present-but-invalid `"features"` key is rejected outright rather
/// than falling through to the scan.
pub fn decode_request(raw: &[u8]) -> Result<DecodedRequest> {
    let text = String::from_utf8_lossy(raw);
    let body = extract_body(&text);
    let trimmed = body.trim();

    if trimmed.is_empty() {
        return Err(FinserveError::malformed("empty request body"));
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(features) = value.get("features") {
            let array = features.as_array().ok_or_else(|| {
                FinserveError::malformed("\"features\" must be an array of numbers")
            })?;

            let mut parsed = Vec::with_capacity(array.len());
            for element in array {
                let number = element.as_f64().ok_or_else(|| {
                    FinserveError::malformed("non-numeric value in \"features\" array")
                })?;
                parsed.push(number as f32);
            }

            return Ok(DecodedRequest {
                features: parsed,
                path: DecodePath::FeaturesField,
            });
        }
    }

    let scanned = scan_numbers(body);
    if scanned.is_empty() {
        return Err(FinserveError::malformed(
            "no numeric values in request body",
        ));
    }

    Ok(DecodedRequest {
        features: scanned,
        path: DecodePath::NumericScan,
    })
}

/// Encode named output vectors as a JSON object.
///
/// Keys follow the map's declaration order and values are printed with fixed
/// 6-decimal precision; identical inputs encode byte-identically.
pub fn encode_response(outputs: &OutputMap) -> String {
    let mut body = String::from("{");
    for (idx, (name, values)) in outputs.iter().enumerate() {
        if idx > 0 {
            body.push_str(", ");
        }
        write!(body, "\"{}\": [", name).expect("string write");
        for (j, value) in values.iter().enumerate() {
            if j > 0 {
                body.push_str(", ");
            }
            write!(body, "{:.6}", value).expect("string write");
        }
        body.push(']');
    }
    body.push('}');
    body
}

/// Frame a JSON body as a success response
pub fn http_ok(body: &str) -> String {
    http_response("200 OK", body)
}

/// Frame an error message as a 500 response with a JSON error body
pub fn http_error(message: &str) -> String {
    let body = serde_json::json!({ "error": message }).to_string();
    http_response("500 Internal Server Error", &body)
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}
