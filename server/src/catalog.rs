//! Read-only catalog of known third-party APIs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRecord {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub base_url: String,
    pub description: String,
    pub sample_endpoint: String,
    pub auth_type: String,
}

/// Lookup side of the catalog. Implementations are shared across requests.
pub trait CatalogStore: Send + Sync {
    fn lookup_by_id(&self, id: i64) -> Option<ApiRecord>;

    /// Exact, case-sensitive match on the category name.
    fn lookup_by_category(&self, category: &str) -> Vec<ApiRecord>;

    fn list_all(&self) -> Vec<ApiRecord>;

    /// Distinct categories, sorted.
    fn categories(&self) -> Vec<String> {
        self.list_all()
            .into_iter()
            .map(|r| r.category)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Immutable in-memory catalog.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    records: Vec<ApiRecord>,
}

impl StaticCatalog {
    pub fn new(records: Vec<ApiRecord>) -> Self {
        Self { records }
    }

    /// The sample APIs the explorer ships with. Ids start at 1.
    pub fn seeded() -> Self {
        let samples = [
            (
                "Open Meteo Weather API",
                "Weather",
                "https://api.open-meteo.com",
                "Free weather forecast API with historical data and forecasts. No API key required.",
                "/v1/forecast?latitude=52.52&longitude=13.41&current_weather=true",
            ),
            (
                "Cat Facts API",
                "Fun",
                "https://catfact.ninja",
                "Random cat facts API for fun applications. Returns interesting facts about cats.",
                "/fact",
            ),
            (
                "CoinGecko API",
                "Finance",
                "https://api.coingecko.com",
                "Cryptocurrency data API with prices, market data, and historical information.",
                "/api/v3/simple/price?ids=bitcoin&vs_currencies=usd",
            ),
            (
                "JSONPlaceholder",
                "Testing",
                "https://jsonplaceholder.typicode.com",
                "Fake REST API for testing and prototyping. Perfect for frontend development.",
                "/posts/1",
            ),
            (
                "Dog API",
                "Fun",
                "https://dog.ceo",
                "Random dog images API. Returns random dog pictures by breed.",
                "/api/breeds/image/random",
            ),
        ];

        let records = samples
            .into_iter()
            .zip(1..)
            .map(
                |((name, category, base_url, description, sample_endpoint), id)| ApiRecord {
                    id,
                    name: name.to_string(),
                    category: category.to_string(),
                    base_url: base_url.to_string(),
                    description: description.to_string(),
                    sample_endpoint: sample_endpoint.to_string(),
                    auth_type: "none".to_string(),
                },
            )
            .collect();
        Self::new(records)
    }
}

impl CatalogStore for StaticCatalog {
    fn lookup_by_id(&self, id: i64) -> Option<ApiRecord> {
        self.records.iter().find(|r| r.id == id).cloned()
    }

    fn lookup_by_category(&self, category: &str) -> Vec<ApiRecord> {
        self.records
            .iter()
            .filter(|r| r.category == category)
            .cloned()
            .collect()
    }

    fn list_all(&self) -> Vec<ApiRecord> {
        self.records.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_catalog_has_sequential_ids() {
        let catalog = StaticCatalog::seeded();
        let ids: Vec<i64> = catalog.list_all().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(catalog.lookup_by_id(4).unwrap().name, "JSONPlaceholder");
        assert!(catalog.lookup_by_id(0).is_none());
        assert!(catalog.lookup_by_id(6).is_none());
    }

    #[test]
    fn category_filter_is_exact() {
        let catalog = StaticCatalog::seeded();
        let fun = catalog.lookup_by_category("Fun");
        assert_eq!(fun.len(), 2);
        assert!(fun.iter().all(|r| r.category == "Fun"));
        assert!(catalog.lookup_by_category("fun").is_empty());
        assert!(catalog.lookup_by_category("Nope").is_empty());
    }

    #[test]
    fn categories_are_sorted_and_unique() {
        let catalog = StaticCatalog::seeded();
        assert_eq!(
            catalog.categories(),
            vec!["Finance", "Fun", "Testing", "Weather"]
        );
    }

    #[test]
    fn record_serializes_with_snake_case_fields() {
        let record = StaticCatalog::seeded().lookup_by_id(2).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 2);
        assert_eq!(json["base_url"], "https://catfact.ninja");
        assert_eq!(json["sample_endpoint"], "/fact");
        assert_eq!(json["auth_type"], "none");
    }
}
