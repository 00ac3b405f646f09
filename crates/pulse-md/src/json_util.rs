//! Shared JSON parsing helpers for stream messages and catalog responses.
//!
//! Feeds are loose about numeric encoding: the same field may arrive as a
//! JSON number (`51000.5`) or a numeric string (`"51000.5"`).

/// Parse a JSON value (string or number) as `f64`.
#[inline]
pub fn parse_str_f64(v: Option<&serde_json::Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        fast_float2::parse(s).ok()
    } else {
        v.as_f64()
    }
}

/// Parse a JSON value (string or number) as `i64`.
#[inline]
pub fn parse_str_i64(v: Option<&serde_json::Value>) -> Option<i64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        s.trim().parse().ok()
    } else {
        v.as_i64()
    }
}

/// Parse a named field on a JSON object as `f64` (string or number).
#[inline]
pub fn parse_f64_field(v: &serde_json::Value, key: &str) -> Option<f64> {
    parse_str_f64(v.get(key))
}

/// Parse a named field on a JSON object as `i64` (string or number).
#[inline]
pub fn parse_i64_field(v: &serde_json::Value, key: &str) -> Option<i64> {
    parse_str_i64(v.get(key))
}
