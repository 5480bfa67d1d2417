// Price catalog - markets, categories and observations
//
// Built once by the parser through CatalogBuilder, then frozen.
// Everything after ingestion reads a shared &Catalog.

use crate::parser::{Currency, PriceFlag, PriceRecord, PriceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

// ============================================================================
// CORE TYPES
// ============================================================================

/// One priced commodity reading at a market on a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Sequential id, 1-based, in accepted-row order
    pub id: u64,
    pub name: String,
    pub price: f64,
    pub currency: Currency,
    pub price_flag: PriceFlag,
    pub price_type: PriceType,
    pub unit: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// Commodity id from the source file
    pub commodity_id: i64,
    /// Price in the reference currency (usdprice column)
    pub reference_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub long: f64,
}

/// Commodity category within one market (e.g. "cereals and tubers").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(rename = "foods")]
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub name: String,
    pub location: Location,
    #[serde(rename = "food_categories")]
    pub categories: Vec<Category>,
    /// Administrative region (admin1)
    #[serde(rename = "admin1")]
    pub region: String,
    /// Administrative sub-region / county (admin2)
    #[serde(rename = "admin2")]
    pub sub_region: String,
    /// Market id from the first source row seen for this market
    pub market_id: i64,
}

impl Market {
    /// "County, Region" label used by the front end
    pub fn location_label(&self) -> String {
        format!("{}, {}", self.sub_region, self.region)
    }

    pub fn key(&self) -> MarketKey {
        MarketKey {
            region: self.region.clone(),
            sub_region: self.sub_region.clone(),
            name: self.name.clone(),
        }
    }

    /// All observations in category order
    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.categories.iter().flat_map(|c| c.observations.iter())
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }
}

/// Market identity: (region, sub-region, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketKey {
    pub region: String,
    pub sub_region: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Data rows seen (header excluded)
    pub rows_read: usize,
    pub rows_accepted: usize,
    pub rows_skipped: usize,
}

/// A single (date, price) point of a commodity's history at one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: String,
    pub price: f64,
}

/// Catalog overview for the debug endpoint and CLI report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub total_markets: usize,
    pub total_commodities: usize,
    pub regions: Vec<String>,
    pub counties: Vec<String>,
    pub stats: IngestStats,
    pub fingerprint: String,
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// BUILDER
// ============================================================================

/// Mutable grouping state used during ingestion.
///
/// Markets are keyed by (region, sub-region, name) and kept in first-seen
/// order. Categories are found by a linear scan of the market's list.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    index: HashMap<MarketKey, usize>,
    markets: Vec<Market>,
    observations: Vec<Observation>,
    stats: IngestStats,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a validated row. Returns the new observation id.
    pub fn push(&mut self, row: PriceRecord) -> u64 {
        self.stats.rows_read += 1;
        self.stats.rows_accepted += 1;

        let key = MarketKey {
            region: row.region,
            sub_region: row.sub_region,
            name: row.market,
        };

        let market_idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                debug!(market = %key.name, region = %key.region, sub_region = %key.sub_region, "new market");
                self.markets.push(Market {
                    name: key.name.clone(),
                    location: Location {
                        lat: row.latitude,
                        long: row.longitude,
                    },
                    categories: Vec::new(),
                    region: key.region.clone(),
                    sub_region: key.sub_region.clone(),
                    market_id: row.market_id,
                });
                let idx = self.markets.len() - 1;
                self.index.insert(key, idx);
                idx
            }
        };

        let id = self.observations.len() as u64 + 1;
        let observation = Observation {
            id,
            name: row.commodity,
            price: row.price,
            currency: row.currency,
            price_flag: row.price_flag,
            price_type: row.price_type,
            unit: row.unit,
            date: row.date,
            commodity_id: row.commodity_id,
            reference_price: row.reference_price,
        };
        self.observations.push(observation.clone());

        let market = &mut self.markets[market_idx];
        match market.categories.iter_mut().find(|c| c.name == row.category) {
            Some(category) => category.observations.push(observation),
            None => market.categories.push(Category {
                name: row.category,
                observations: vec![observation],
            }),
        }

        id
    }

    /// Count a rejected row.
    pub fn record_skipped(&mut self) {
        self.stats.rows_read += 1;
        self.stats.rows_skipped += 1;
    }

    pub fn finish(self) -> Catalog {
        Catalog {
            markets: self.markets,
            observations: self.observations,
            stats: self.stats,
        }
    }
}

// ============================================================================
// CATALOG
// ============================================================================

/// Immutable set of markets and observations.
/// A selectable region (admin1) with a URL-safe id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
}

impl Region {
    /// `"Rift Valley"` gets id `"rift_valley"`.
    pub fn from_name(name: &str) -> Self {
        let mut id = String::with_capacity(name.len());
        for c in name.trim().chars() {
            if c.is_alphanumeric() {
                id.extend(c.to_lowercase());
            } else if !id.ends_with('_') {
                id.push('_');
            }
        }

        Region {
            id: id.trim_matches('_').to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Catalog {
    markets: Vec<Market>,
    observations: Vec<Observation>,
    stats: IngestStats,
}

impl Catalog {
    pub fn markets(&self) -> &[Market] {
        &self.markets
    }

    /// Flat list of every observation, in id order
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn market_by_key(&self, key: &MarketKey) -> Option<&Market> {
        self.markets.iter().find(|m| {
            m.region == key.region && m.sub_region == key.sub_region && m.name == key.name
        })
    }

    pub fn markets_in_region(&self, region: &str) -> Vec<&Market> {
        self.markets
            .iter()
            .filter(|m| eq_fold(&m.region, region))
            .collect()
    }

    pub fn markets_in_sub_region(&self, sub_region: &str) -> Vec<&Market> {
        self.markets
            .iter()
            .filter(|m| eq_fold(&m.sub_region, sub_region))
            .collect()
    }

    /// First market with this name, case-insensitive.
    pub fn market_named(&self, name: &str) -> Option<&Market> {
        self.markets.iter().find(|m| eq_fold(&m.name, name))
    }

    /// Observations whose commodity name contains `fragment` (case-insensitive).
    pub fn commodities_matching(&self, fragment: &str) -> Vec<&Observation> {
        let needle = fragment.to_lowercase();
        self.observations
            .iter()
            .filter(|o| o.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Observations of the named market whose commodity contains `fragment`.
    /// Unknown market yields an empty list.
    pub fn market_commodity_prices(&self, market: &str, fragment: &str) -> Vec<&Observation> {
        let needle = fragment.to_lowercase();
        match self.market_named(market) {
            Some(m) => m
                .observations()
                .filter(|o| o.name.to_lowercase().contains(&needle))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Dated prices for an exact (market, commodity) pair, oldest first.
    /// Both names compare case-insensitively; every market with that name
    /// contributes.
    pub fn price_history(&self, market: &str, commodity: &str) -> Vec<PricePoint> {
        let mut points: Vec<(&str, u64, f64)> = self
            .markets
            .iter()
            .filter(|m| eq_fold(&m.name, market))
            .flat_map(|m| m.observations())
            .filter(|o| eq_fold(&o.name, commodity))
            .map(|o| (o.date.as_str(), o.id, o.price))
            .collect();

        points.sort_by(|a, b| a.0.cmp(b.0).then(a.1.cmp(&b.1)));

        points
            .into_iter()
            .map(|(date, _, price)| PricePoint {
                date: date.to_string(),
                price,
            })
            .collect()
    }

    /// Distinct region labels, sorted
    pub fn regions(&self) -> Vec<String> {
        self.markets
            .iter()
            .map(|m| m.region.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct regions with their ids, sorted by name
    pub fn region_list(&self) -> Vec<Region> {
        self.regions().iter().map(|name| Region::from_name(name)).collect()
    }

    /// Region by id, or by name case-insensitively.
    pub fn region(&self, id: &str) -> Option<Region> {
        self.region_list()
            .into_iter()
            .find(|r| r.id == id || eq_fold(&r.name, id))
    }

    /// Distinct sub-region labels, sorted
    pub fn sub_regions(&self) -> Vec<String> {
        self.markets
            .iter()
            .map(|m| m.sub_region.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// SHA-256 over markets, categories and observations in catalog order.
    /// Two ingestions of the same source produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for market in &self.markets {
            hasher.update(format!(
                "M|{}|{}|{}|{}|{}|{}\n",
                market.region,
                market.sub_region,
                market.name,
                market.market_id,
                market.location.lat,
                market.location.long
            ));
            for category in &market.categories {
                hasher.update(format!("C|{}\n", category.name));
                for o in &category.observations {
                    hasher.update(format!(
                        "O|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}\n",
                        o.id,
                        o.name,
                        o.price,
                        o.currency.code(),
                        o.price_flag.name(),
                        o.price_type.name(),
                        o.unit,
                        o.date,
                        o.commodity_id,
                        o.reference_price
                    ));
                }
            }
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            total_markets: self.markets.len(),
            total_commodities: self.observations.len(),
            regions: self.regions(),
            counties: self.sub_regions(),
            stats: self.stats,
            fingerprint: self.fingerprint(),
            generated_at: Utc::now(),
        }
    }
}

fn eq_fold(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ingest, ingest_reader};
    use std::collections::HashSet;
    use std::path::Path;

    fn row(date: &str, region: &str, sub_region: &str, market: &str, category: &str, commodity: &str, price: f64) -> PriceRecord {
        PriceRecord {
            date: date.to_string(),
            region: region.to_string(),
            sub_region: sub_region.to_string(),
            market: market.to_string(),
            market_id: 1,
            latitude: 0.5,
            longitude: 37.0,
            category: category.to_string(),
            commodity: commodity.to_string(),
            commodity_id: 51,
            unit: "KG".to_string(),
            price_flag: PriceFlag::Actual,
            price_type: PriceType::Retail,
            currency: Currency::Local,
            price,
            reference_price: price / 130.0,
        }
    }

    fn fixture() -> Catalog {
        ingest(&Path::new(env!("CARGO_MANIFEST_DIR")).join("data/sample_prices.csv")).unwrap()
    }

    #[test]
    fn test_builder_groups_by_market_key() {
        let mut builder = CatalogBuilder::new();
        builder.push(row("2025-07-01", "Coast", "Mombasa", "Kongowea", "cereals", "Maize", 50.0));
        builder.push(row("2025-07-01", "Coast", "Mombasa", "Kongowea", "pulses", "Beans", 120.0));
        builder.push(row("2025-08-01", "Coast", "Mombasa", "Kongowea", "cereals", "Maize", 52.0));
        // Same market name in a different sub-region is a different market
        builder.push(row("2025-07-01", "Coast", "Kilifi", "Kongowea", "cereals", "Maize", 48.0));
        let catalog = builder.finish();

        assert_eq!(catalog.markets().len(), 2);
        assert_eq!(catalog.observations().len(), 4);

        let mombasa = &catalog.markets()[0];
        assert_eq!(mombasa.sub_region, "Mombasa");
        let names: Vec<&str> = mombasa.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["cereals", "pulses"]);
        assert_eq!(mombasa.category("cereals").unwrap().observations.len(), 2);
        assert_eq!(catalog.markets()[1].sub_region, "Kilifi");
    }

    #[test]
    fn test_builder_assigns_sequential_ids() {
        let mut builder = CatalogBuilder::new();
        let first = builder.push(row("2025-07-01", "Coast", "Mombasa", "Kongowea", "cereals", "Maize", 50.0));
        builder.record_skipped();
        let second = builder.push(row("2025-07-02", "Coast", "Mombasa", "Kongowea", "cereals", "Maize", 51.0));
        let catalog = builder.finish();

        assert_eq!((first, second), (1, 2));
        let ids: Vec<u64> = catalog.observations().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(
            catalog.stats(),
            IngestStats { rows_read: 3, rows_accepted: 2, rows_skipped: 1 }
        );
    }

    #[test]
    fn test_market_seeded_from_first_row() {
        let mut builder = CatalogBuilder::new();
        let mut first = row("2025-07-01", "Coast", "Mombasa", "Kongowea", "cereals", "Maize", 50.0);
        first.latitude = -4.04;
        first.market_id = 221;
        let mut second = row("2025-07-02", "Coast", "Mombasa", "Kongowea", "cereals", "Maize", 51.0);
        second.latitude = 9.9;
        second.market_id = 999;
        builder.push(first);
        builder.push(second);
        let catalog = builder.finish();

        let market = &catalog.markets()[0];
        assert_eq!(market.location.lat, -4.04);
        assert_eq!(market.market_id, 221);
    }

    #[test]
    fn test_every_observation_placed_once() {
        let catalog = fixture();

        let placed: usize = catalog.markets().iter().map(|m| m.observations().count()).sum();
        assert_eq!(placed, catalog.observations().len());

        let mut seen = HashSet::new();
        for market in catalog.markets() {
            for o in market.observations() {
                assert!(seen.insert(o.id), "observation {} placed twice", o.id);
            }
        }
    }

    #[test]
    fn test_market_count_matches_distinct_triples() {
        let catalog = fixture();
        let keys: HashSet<MarketKey> = catalog.markets().iter().map(|m| m.key()).collect();
        assert_eq!(keys.len(), catalog.markets().len());
        assert_eq!(keys.len(), 4);

        for key in &keys {
            let market = catalog.market_by_key(key).unwrap();
            assert_eq!(&market.key(), key);
        }

        let elsewhere = MarketKey {
            region: "Coast".to_string(),
            sub_region: "Kilifi".to_string(),
            name: "Kongowea".to_string(),
        };
        assert!(catalog.market_by_key(&elsewhere).is_none());
    }

    #[test]
    fn test_ingestion_is_idempotent() {
        let a = fixture();
        let b = fixture();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let header = "date,admin1,admin2,market,market_id,latitude,longitude,category,commodity,commodity_id,unit,priceflag,pricetype,currency,price,usdprice";
        let a = format!("{header}\n2025-07-01,Coast,Mombasa,Kongowea,1,-4.04,39.68,cereals,Maize,51,KG,actual,Retail,KES,50,0.39\n");
        let b = format!("{header}\n2025-07-01,Coast,Mombasa,Kongowea,1,-4.04,39.68,cereals,Maize,51,KG,actual,Retail,KES,51,0.39\n");
        let a = ingest_reader(a.as_bytes(), "a").unwrap();
        let b = ingest_reader(b.as_bytes(), "b").unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_region_and_county_queries() {
        let catalog = fixture();

        let coast = catalog.markets_in_region("coast");
        assert_eq!(coast.len(), 1);
        assert_eq!(coast[0].name, "Kongowea");

        let turkana = catalog.markets_in_sub_region("TURKANA");
        assert_eq!(turkana.len(), 1);
        assert_eq!(turkana[0].name, "Kakuma");

        assert!(catalog.markets_in_region("Western").is_empty());
    }

    #[test]
    fn test_region_list() {
        let catalog = fixture();
        let ids: Vec<String> = catalog.region_list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["coast", "nairobi", "north_eastern", "rift_valley"]);

        let rift = catalog.region("rift_valley").unwrap();
        assert_eq!(rift.name, "Rift Valley");
        assert_eq!(catalog.region("North Eastern").unwrap().id, "north_eastern");
        assert!(catalog.region("western").is_none());
    }

    #[test]
    fn test_region_id_from_name() {
        assert_eq!(Region::from_name("Rift Valley").id, "rift_valley");
        assert_eq!(Region::from_name(" Coast ").id, "coast");
        assert_eq!(Region::from_name("Nyanza / Western").id, "nyanza_western");
    }

    #[test]
    fn test_market_named() {
        let catalog = fixture();
        assert_eq!(catalog.market_named("kibra").unwrap().region, "Nairobi");
        assert!(catalog.market_named("Nowhere").is_none());
    }

    #[test]
    fn test_commodities_matching() {
        let catalog = fixture();
        let maize = catalog.commodities_matching("MAIZE");
        assert_eq!(maize.len(), 5);
        assert!(maize.iter().all(|o| o.name.to_lowercase().contains("maize")));
    }

    #[test]
    fn test_market_commodity_prices() {
        let catalog = fixture();
        assert_eq!(catalog.market_commodity_prices("Kongowea", "maize").len(), 2);
        assert_eq!(catalog.market_commodity_prices("Kongowea", "sorghum").len(), 0);
        assert!(catalog.market_commodity_prices("Nowhere", "maize").is_empty());
    }

    #[test]
    fn test_price_history_sorted() {
        let mut builder = CatalogBuilder::new();
        builder.push(row("2025-09-01", "Coast", "Mombasa", "Kongowea", "cereals", "Maize", 55.0));
        builder.push(row("2025-07-01", "Coast", "Mombasa", "Kongowea", "cereals", "Maize", 50.0));
        builder.push(row("2025-08-01", "Coast", "Mombasa", "Kongowea", "cereals", "Maize", 52.0));
        builder.push(row("2025-08-01", "Coast", "Mombasa", "Kongowea", "cereals", "Maize (white)", 60.0));
        let catalog = builder.finish();

        let history = catalog.price_history("kongowea", "maize");
        let dates: Vec<&str> = history.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-07-01", "2025-08-01", "2025-09-01"]);
        assert_eq!(history[2].price, 55.0);

        assert!(catalog.price_history("Kongowea", "Beans").is_empty());
    }

    #[test]
    fn test_summary() {
        let catalog = fixture();
        let summary = catalog.summary();

        assert_eq!(summary.total_markets, 4);
        assert_eq!(summary.total_commodities, 14);
        assert_eq!(summary.regions, vec!["Coast", "Nairobi", "North Eastern", "Rift Valley"]);
        assert_eq!(summary.counties, vec!["Garissa", "Mombasa", "Nairobi", "Turkana"]);
        assert_eq!(summary.stats.rows_skipped, 2);
        assert_eq!(summary.fingerprint.len(), 64);
    }

    #[test]
    fn test_market_serializes_with_front_end_names() {
        let catalog = fixture();
        let json = serde_json::to_value(&catalog.markets()[0]).unwrap();

        assert_eq!(json["admin1"], "Coast");
        assert_eq!(json["admin2"], "Mombasa");
        assert_eq!(json["food_categories"][0]["name"], "cereals and tubers");
        assert_eq!(json["food_categories"][0]["foods"][0]["currency"], "KES");
        assert_eq!(json["location"]["lat"], -4.04);
    }
}
