//! Canonical query strings.

use std::collections::BTreeMap;
use std::fmt;

use crate::dedup::QueryKey;

/// Query parameters in stable key order.
///
/// The serialized form doubles as the deduplication key, so two queries with
/// the same parameters always map to the same in-flight request regardless of
/// the order in which the parameters were set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalQuery {
    params: BTreeMap<&'static str, String>,
}

impl CanonicalQuery {
    /// An empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter.
    pub fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.insert(name, value.to_string());
        self
    }

    /// Set a parameter when `value` is present.
    pub fn with_opt<V: ToString>(self, name: &'static str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    /// Parameters in key order.
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.params.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Whether no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Deduplication key for this query against `endpoint`.
    pub fn key(&self, endpoint: &str) -> QueryKey {
        if self.is_empty() {
            QueryKey::new(endpoint)
        } else {
            QueryKey::new(format!("{}?{}", endpoint, self))
        }
    }
}

/// `name=value` pairs joined by `&`, unescaped.
impl fmt::Display for CanonicalQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_order_is_stable() {
        let a = CanonicalQuery::new()
            .with("start", "2024-06-01")
            .with("bbox", "71,51,72,52")
            .with("end", "2024-06-30");
        let b = CanonicalQuery::new()
            .with("end", "2024-06-30")
            .with("start", "2024-06-01")
            .with("bbox", "71,51,72,52");

        assert_eq!(a.key("/ndvi/hist"), b.key("/ndvi/hist"));
        assert_eq!(
            a.key("/ndvi/hist").as_str(),
            "/ndvi/hist?bbox=71,51,72,52&end=2024-06-30&start=2024-06-01"
        );
    }

    #[test]
    fn test_endpoint_is_part_of_key() {
        let q = CanonicalQuery::new().with("bbox", "1,2,3,4");
        assert_ne!(q.key("/ndvi/hist"), q.key("/ndvi/statistics"));
    }

    #[test]
    fn test_optional_params() {
        let q = CanonicalQuery::new()
            .with_opt("bins", None::<String>)
            .with_opt("agg", Some(10));
        assert_eq!(q.to_string(), "agg=10");
        assert_eq!(CanonicalQuery::new().key("/health").as_str(), "/health");
    }
}
