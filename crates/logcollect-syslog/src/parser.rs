//! Syslog wire parser
//!
//! Turns one raw record into [`LogParts`]. RFC 5424 is recognised by the
//! version digit after the PRI, anything else is read as RFC 3164.
//! Parsing never fails: what cannot be understood ends up in `content`.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;

use logcollect_types::{LogParts, fields};

/// Highest valid PRI value (facility 23, severity 7)
const MAX_PRIORITY: u64 = 191;

/// RFC 5424 nil value
const NIL: &str = "-";

/// BSD timestamp, e.g. `Jan  5 10:30:00 `
static RFC3164_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][a-z]{2}) ([ \d]?\d) (\d{2}:\d{2}:\d{2}) ").expect("valid regex")
});

/// BSD tag with optional pid, e.g. `sshd[42]: `
static RFC3164_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([^\s:\[\]]{1,48})(?:\[([^\]]*)\])?:\s?(.*)$").expect("valid regex")
});

/// Parse a raw record. Invalid UTF-8 is replaced, not rejected.
pub fn parse(raw: &[u8]) -> LogParts {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(['\r', '\n', '\0']);

    let Some((priority, rest)) = split_priority(text) else {
        return content_only(text);
    };

    let mut parts = LogParts::new();
    parts.insert(fields::PRIORITY.into(), Value::from(priority));
    parts.insert(fields::FACILITY.into(), Value::from(priority >> 3));
    parts.insert(fields::SEVERITY.into(), Value::from(priority & 7));

    match rest.strip_prefix("1 ") {
        Some(body) => parse_rfc5424(body, &mut parts),
        None => parse_rfc3164(rest, &mut parts),
    }

    parts
}

/// Split `<PRI>` off the front of a record
fn split_priority(text: &str) -> Option<(u64, &str)> {
    let inner = text.strip_prefix('<')?;
    let close = inner.find('>')?;
    let digits = &inner[..close];
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let priority: u64 = digits.parse().ok()?;
    if priority > MAX_PRIORITY {
        return None;
    }
    Some((priority, &inner[close + 1..]))
}

fn content_only(text: &str) -> LogParts {
    let mut parts = LogParts::new();
    parts.insert(fields::CONTENT.into(), Value::from(text));
    parts
}

// ============================================================================
// RFC 3164
// ============================================================================

fn parse_rfc3164(body: &str, parts: &mut LogParts) {
    let Some(caps) = RFC3164_TIMESTAMP.captures(body) else {
        // No header: stamp with the receive time and keep everything as content
        parts.insert(fields::TIMESTAMP.into(), Value::from(Utc::now().to_rfc3339()));
        parts.insert(fields::CONTENT.into(), Value::from(body.trim_start()));
        return;
    };

    let header_len = caps[0].len();
    let timestamp = bsd_timestamp(&caps[1], &caps[2], &caps[3], Utc::now().year())
        .unwrap_or_else(|| caps[0].trim_end().to_string());
    parts.insert(fields::TIMESTAMP.into(), Value::from(timestamp));

    let rest = &body[header_len..];
    let (hostname, rest) = rest.split_once(' ').unwrap_or((rest, ""));
    parts.insert(fields::HOSTNAME.into(), Value::from(hostname));

    match RFC3164_TAG.captures(rest) {
        Some(caps) => {
            parts.insert(fields::TAG.into(), Value::from(&caps[1]));
            if let Some(pid) = caps.get(2) {
                parts.insert(fields::PROC_ID.into(), Value::from(pid.as_str()));
            }
            parts.insert(fields::CONTENT.into(), Value::from(&caps[3]));
        }
        None => {
            parts.insert(fields::TAG.into(), Value::from(""));
            parts.insert(fields::CONTENT.into(), Value::from(rest));
        }
    }
}

/// BSD timestamps carry no year; assume `year`
fn bsd_timestamp(month: &str, day: &str, time: &str, year: i32) -> Option<String> {
    let stamp = format!("{year} {month} {} {time}", day.trim());
    NaiveDateTime::parse_from_str(&stamp, "%Y %b %d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().to_rfc3339())
}

// ============================================================================
// RFC 5424
// ============================================================================

fn parse_rfc5424(body: &str, parts: &mut LogParts) {
    parts.insert(fields::VERSION.into(), Value::from(1));

    let mut rest = body;
    let mut header = [NIL; 5];
    for slot in header.iter_mut() {
        let (token, tail) = rest.split_once(' ').unwrap_or((rest, ""));
        *slot = token;
        rest = tail;
    }
    let [timestamp, hostname, app_name, proc_id, msg_id] = header;

    let timestamp = match DateTime::parse_from_rfc3339(timestamp) {
        Ok(ts) => Value::from(ts.to_rfc3339()),
        Err(_) => nil_or(timestamp),
    };
    parts.insert(fields::TIMESTAMP.into(), timestamp);
    parts.insert(fields::HOSTNAME.into(), nil_or(hostname));
    parts.insert(fields::APP_NAME.into(), nil_or(app_name));
    parts.insert(fields::PROC_ID.into(), nil_or(proc_id));
    parts.insert(fields::MSG_ID.into(), nil_or(msg_id));

    let (structured_data, message) = split_structured_data(rest);
    parts.insert(fields::STRUCTURED_DATA.into(), nil_or(structured_data));

    let message = message.strip_prefix('\u{feff}').unwrap_or(message);
    parts.insert(fields::MESSAGE.into(), Value::from(message));
}

fn nil_or(token: &str) -> Value {
    if token == NIL || token.is_empty() {
        Value::Null
    } else {
        Value::from(token)
    }
}

/// Split `[id k="v"][id2 ...] msg` into the SD elements and the message
fn split_structured_data(rest: &str) -> (&str, &str) {
    if let Some(msg) = rest.strip_prefix(NIL) {
        return (NIL, msg.strip_prefix(' ').unwrap_or(msg));
    }

    let bytes = rest.as_bytes();
    let mut end = 0;
    while bytes.get(end) == Some(&b'[') {
        let mut in_quotes = false;
        let mut escaped = false;
        let mut close = None;

        for (offset, &b) in bytes[end + 1..].iter().enumerate() {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_quotes = !in_quotes,
                b']' if !in_quotes => {
                    close = Some(end + 1 + offset);
                    break;
                }
                _ => {}
            }
        }

        match close {
            Some(pos) => end = pos + 1,
            // Unterminated element: treat the rest as message
            None => break,
        }
    }

    let (sd, msg) = rest.split_at(end);
    (sd, msg.strip_prefix(' ').unwrap_or(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rfc3164_full() {
        let parts = parse(b"<34>Oct 11 22:14:15 mymachine su[123]: 'su root' failed\n");

        assert_eq!(parts["priority"], json!(34));
        assert_eq!(parts["facility"], json!(4));
        assert_eq!(parts["severity"], json!(2));
        assert_eq!(parts["hostname"], json!("mymachine"));
        assert_eq!(parts["tag"], json!("su"));
        assert_eq!(parts["proc_id"], json!("123"));
        assert_eq!(parts["content"], json!("'su root' failed"));

        let ts = parts["timestamp"].as_str().unwrap();
        assert!(ts.contains("-10-11T22:14:15"), "{ts}");
    }

    #[test]
    fn test_rfc3164_single_digit_day() {
        let parts = parse(b"<13>Jan  5 01:02:03 host app: hello");
        let ts = parts["timestamp"].as_str().unwrap();
        assert!(ts.contains("-01-05T01:02:03"), "{ts}");
        assert_eq!(parts["tag"], json!("app"));
        assert_eq!(parts["content"], json!("hello"));
    }

    #[test]
    fn test_rfc3164_without_tag() {
        let parts = parse(b"<13>Jan 15 01:02:03 host just some text");
        assert_eq!(parts["tag"], json!(""));
        assert_eq!(parts["content"], json!("just some text"));
    }

    #[test]
    fn test_rfc3164_without_header() {
        let parts = parse(b"<13>free form message");
        assert_eq!(parts["content"], json!("free form message"));
        assert!(parts["timestamp"].is_string());
        assert!(!parts.contains_key("hostname"));
    }

    #[test]
    fn test_rfc5424_full() {
        let raw = b"<165>1 2003-10-11T22:14:15.003Z mymachine.example.com evntslog - ID47 \
[exampleSDID@32473 iut=\"3\" eventSource=\"Application\"] An application event";
        let parts = parse(raw);

        assert_eq!(parts["severity"], json!(5));
        assert_eq!(parts["facility"], json!(20));
        assert_eq!(parts["version"], json!(1));
        assert_eq!(parts["hostname"], json!("mymachine.example.com"));
        assert_eq!(parts["app_name"], json!("evntslog"));
        assert_eq!(parts["proc_id"], Value::Null);
        assert_eq!(parts["msg_id"], json!("ID47"));
        assert_eq!(
            parts["structured_data"],
            json!("[exampleSDID@32473 iut=\"3\" eventSource=\"Application\"]")
        );
        assert_eq!(parts["message"], json!("An application event"));
        assert_eq!(parts["timestamp"], json!("2003-10-11T22:14:15.003+00:00"));
    }

    #[test]
    fn test_rfc5424_nil_structured_data_and_bom() {
        let parts = parse("<14>1 - host app 99 - - \u{feff}hello".as_bytes());
        assert_eq!(parts["timestamp"], Value::Null);
        assert_eq!(parts["proc_id"], json!("99"));
        assert_eq!(parts["structured_data"], Value::Null);
        assert_eq!(parts["message"], json!("hello"));
    }

    #[test]
    fn test_structured_data_with_escaped_bracket() {
        let (sd, msg) = split_structured_data(r#"[a x="1\]2"][b] tail"#);
        assert_eq!(sd, r#"[a x="1\]2"][b]"#);
        assert_eq!(msg, "tail");
    }

    #[test]
    fn test_invalid_priority_is_content() {
        for raw in ["no pri", "<>x", "<999>x", "<1a>x", "<12"] {
            let parts = parse(raw.as_bytes());
            assert_eq!(parts.len(), 1);
            assert!(parts.contains_key("content"));
        }
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let parts = parse(b"<13>Jan 15 01:02:03 host app: bad \xff byte");
        assert_eq!(parts["content"], json!("bad \u{fffd} byte"));
    }
}
