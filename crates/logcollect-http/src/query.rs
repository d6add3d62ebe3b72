//! Strict query string decoding
//!
//! Unlike lenient decoders, a `%` that is not followed by two hex digits,
//! or bytes that do not form UTF-8, are rejected.

use percent_encoding::percent_decode;

use crate::error::HttpError;

/// Decode one form-encoded query component (`+` means space)
pub fn decode_component(raw: &str) -> Result<String, HttpError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(HttpError::InvalidQuery(format!(
                    "invalid escape {:?}",
                    String::from_utf8_lossy(&bytes[i..end])
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let spaced = raw.replace('+', " ");
    percent_decode(spaced.as_bytes())
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| HttpError::InvalidQuery("decoded value is not UTF-8".into()))
}

/// Find `name` in a raw query string and decode its value.
///
/// Returns `Ok(None)` when the parameter is absent. Only the first
/// occurrence is decoded.
pub fn query_param(raw_query: Option<&str>, name: &str) -> Result<Option<String>, HttpError> {
    let Some(raw_query) = raw_query else {
        return Ok(None);
    };

    for pair in raw_query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == name {
            return decode_component(value).map(Some);
        }
    }

    Ok(None)
}
