use std::io::Write;

use axum::http::HeaderMap;
use axum::http::header::ACCEPT_ENCODING;
use flate2::Compression;
use flate2::write::GzEncoder;

/// Parse quality value from Accept-Encoding part (e.g., "gzip;q=0.5" -> 0.5)
fn parse_quality(part: &str) -> f32 {
    part.split(';')
        .nth(1)
        .and_then(|s| s.trim().strip_prefix("q="))
        .and_then(|s| s.parse::<f32>().ok())
        .unwrap_or(1.0)
}

/// Check if the client accepts gzip with a non-zero quality.
///
/// An explicit `gzip` entry decides on its own; `*` only applies when
/// gzip is not named.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    let mut wildcard = None;

    let parts = headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','));

    for part in parts {
        let encoding = part.split(';').next().unwrap_or("").trim();
        if encoding.eq_ignore_ascii_case("gzip") {
            return parse_quality(part) > 0.0;
        }
        if encoding == "*" && wildcard.is_none() {
            wildcard = Some(parse_quality(part) > 0.0);
        }
    }

    wildcard.unwrap_or(false)
}

/// Gzip-compress a response body
pub fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}
