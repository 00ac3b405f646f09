//! Display-side narrowing of a published snapshot.

use pulse_core::AggregatedSnapshot;

/// Keep only instruments whose symbol contains `query`, ignoring case.
///
/// A blank query returns the snapshot unchanged. Status, loading flag and
/// category are carried over as published.
pub fn project(snapshot: &AggregatedSnapshot, query: &str) -> AggregatedSnapshot {
    let needle = query.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return snapshot.clone();
    }

    AggregatedSnapshot {
        instruments: snapshot
            .instruments
            .iter()
            .filter(|i| i.symbol.to_ascii_lowercase().contains(&needle))
            .cloned()
            .collect(),
        ..snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use pulse_core::{Category, Instrument, MSG_STREAM_DISCONNECTED};

    use super::*;

    fn snapshot() -> AggregatedSnapshot {
        AggregatedSnapshot {
            selected_category: Category::Spot,
            instruments: vec![
                Instrument::new("BTC-USD", Category::Spot, 51000.0),
                Instrument::new("ETH-BTC", Category::Spot, 0.06),
                Instrument::new("ETH-USD", Category::Spot, 3000.0),
            ],
            is_loading: true,
            error: Some(MSG_STREAM_DISCONNECTED.to_string()),
        }
    }

    #[test]
    fn filters_case_insensitively_and_keeps_order() {
        let out = project(&snapshot(), " btc ");
        let symbols: Vec<&str> = out.instruments.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(symbols, ["BTC-USD", "ETH-BTC"]);
        assert!(out.is_loading);
        assert_eq!(out.error.as_deref(), Some(MSG_STREAM_DISCONNECTED));
    }

    #[test]
    fn blank_query_is_identity() {
        assert_eq!(project(&snapshot(), "  "), snapshot());
    }

    #[test]
    fn no_match_yields_empty_list() {
        assert!(project(&snapshot(), "doge").instruments.is_empty());
    }
}
