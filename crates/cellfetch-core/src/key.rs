//! Identities: the stable resource key and the volatile list position.

use crate::error::{CellFetchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Identity of a fetchable resource, derived from its URL.
///
/// Two keys are equal when their parsed URLs are equal. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey(Arc<Url>);

impl ResourceKey {
    /// Parse a key from a URL string.
    pub fn parse(url: &str) -> Result<Self> {
        Url::parse(url)
            .map(Self::from)
            .map_err(|e| CellFetchError::InvalidUrl {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    /// String form used as the persistent cache key.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<Url> for ResourceKey {
    fn from(url: Url) -> Self {
        Self(Arc::new(url))
    }
}

impl From<&Url> for ResourceKey {
    fn from(url: &Url) -> Self {
        Self(Arc::new(url.clone()))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical slot of a list row, independent of the view currently showing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId {
    pub section: u32,
    pub row: u32,
}

impl PositionId {
    pub const fn new(section: u32, row: u32) -> Self {
        Self { section, row }
    }

    /// Position in the first section.
    pub const fn row(row: u32) -> Self {
        Self { section: 0, row }
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.section, self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_equality_is_by_url() {
        let a = ResourceKey::parse("https://example.com/a.png").unwrap();
        let b = ResourceKey::parse("https://example.com/a.png").unwrap();
        let c = ResourceKey::parse("https://example.com/c.png").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_key_normalizes_url() {
        let key = ResourceKey::parse("HTTPS://Example.COM/a.png").unwrap();
        assert_eq!(key.as_str(), "https://example.com/a.png");
    }

    #[test]
    fn test_invalid_url() {
        let err = ResourceKey::parse("not a url").unwrap_err();
        assert!(matches!(err, CellFetchError::InvalidUrl { .. }));
    }

    #[test]
    fn test_position_display() {
        assert_eq!(PositionId::new(2, 7).to_string(), "2:7");
        assert_eq!(PositionId::row(3), PositionId::new(0, 3));
    }
}
