//! Price stream message decoder.
//!
//! Turns one raw text frame into a [`PriceMap`]. Two payload shapes are
//! accepted:
//!
//! - keyed: `{"data": {"BTC-USD": {"id": "BTC-USD", "price": 51000.0, "type": 1}}}`
//! - listed: `{"data": [{"symbol": "BTC-USD", "price": 51000.0, "type": 1}]}`
//!   (a bare top-level array is treated the same way)
//!
//! Only records whose `type` equals [`PRICE_UPDATE_TYPE`] are kept. Anything
//! that does not parse yields an empty map; a bad frame never stops the stream.

use pulse_core::PriceMap;
use tracing::debug;

use crate::json_util::{parse_f64_field, parse_i64_field};

/// `type` value marking a price-update record.
pub const PRICE_UPDATE_TYPE: i64 = 1;

/// One decoded record, before type filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub symbol: String,
    pub price: f64,
    pub update_type: i64,
}

/// Build the subscription message for `topic`.
pub fn build_subscribe(topic: &str) -> String {
    serde_json::json!({
        "op": "subscribe",
        "args": [topic]
    })
    .to_string()
}

/// Decode a frame into the full replacement price map for that frame.
pub fn parse_message(text: &str) -> PriceMap {
    parse_records(text)
        .into_iter()
        .filter(|r| r.update_type == PRICE_UPDATE_TYPE)
        .map(|r| (r.symbol, r.price))
        .collect()
}

/// Decode every well-formed record in a frame, regardless of type.
pub fn parse_records(text: &str) -> Vec<PriceRecord> {
    let v: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!("[decoder] dropping unparsable frame: {e}");
            return Vec::new();
        }
    };

    let payload = if v.is_array() {
        &v
    } else {
        v.get("data").unwrap_or(&serde_json::Value::Null)
    };

    match payload {
        serde_json::Value::Object(entries) => entries
            .iter()
            .filter_map(|(key, entry)| parse_record(entry, Some(key.as_str())))
            .collect(),
        serde_json::Value::Array(entries) => entries
            .iter()
            .filter_map(|entry| parse_record(entry, None))
            .collect(),
        _ => {
            debug!("[decoder] frame without price data");
            Vec::new()
        }
    }
}

fn parse_record(entry: &serde_json::Value, key: Option<&str>) -> Option<PriceRecord> {
    let symbol = entry
        .get("id")
        .or_else(|| entry.get("symbol"))
        .and_then(|s| s.as_str())
        .or(key)
        .filter(|s| !s.is_empty())?;

    let price = parse_f64_field(entry, "price").filter(|p| p.is_finite())?;
    let update_type = parse_i64_field(entry, "type")?;

    Some(PriceRecord {
        symbol: symbol.to_string(),
        price,
        update_type,
    })
}
