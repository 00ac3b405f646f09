//! Enumerations used throughout the market-feed system.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Instrument categories
// ---------------------------------------------------------------------------

/// Instrument classification.
///
/// The catalog endpoint is queried once per category (`?future=<bool>`), so
/// the category also names a cache partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Spot,
    Future,
}

impl Category {
    /// All categories, in display order.
    pub const ALL: [Category; 2] = [Category::Spot, Category::Future];

    /// Value of the `future` query parameter for this category.
    pub fn is_future(self) -> bool {
        matches!(self, Self::Future)
    }

    /// Category of a catalog entry from its `isFuture` flag.
    pub fn from_is_future(is_future: bool) -> Self {
        if is_future { Self::Future } else { Self::Spot }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spot => write!(f, "spot"),
            Self::Future => write!(f, "future"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            "future" | "futures" => Ok(Self::Future),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Stream connection state
// ---------------------------------------------------------------------------

/// Connection status of the price stream.
///
/// `Retrying` is the sub-state of connecting entered after a failure: the
/// transport is waiting out the backoff before attempt number `attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    Connecting,
    Retrying { attempt: u32 },
    Connected,
    #[default]
    Disconnected,
}

impl ConnectionState {
    /// `true` for `Connecting` and `Retrying`.
    pub fn is_connecting(self) -> bool {
        matches!(self, Self::Connecting | Self::Retrying { .. })
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_disconnected(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Retrying { attempt } => write!(f, "retrying (attempt {attempt})"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Network availability
// ---------------------------------------------------------------------------

/// Device-level network availability, produced outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkStatus {
    #[default]
    Available,
    Unavailable,
}

impl NetworkStatus {
    pub fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_query_flag() {
        assert!(!Category::Spot.is_future());
        assert!(Category::Future.is_future());
        assert_eq!(Category::from_is_future(true), Category::Future);
        assert_eq!(Category::from_is_future(false), Category::Spot);
    }

    #[test]
    fn category_parse() {
        assert_eq!("Spot".parse::<Category>().unwrap(), Category::Spot);
        assert_eq!("futures".parse::<Category>().unwrap(), Category::Future);
        assert!("options".parse::<Category>().is_err());
    }

    #[test]
    fn retrying_counts_as_connecting() {
        assert!(ConnectionState::Retrying { attempt: 2 }.is_connecting());
        assert!(ConnectionState::Connecting.is_connecting());
        assert!(!ConnectionState::Connected.is_connecting());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
