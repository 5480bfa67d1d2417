// Derived price metrics
//
// For every (market, commodity) pair that survives a PriceQuery:
// latest observation, unit-normalized price, trend against the previous
// observation, staleness and a display date.

use crate::catalog::{Catalog, Market, Observation};
use serde::{Deserialize, Serialize};

/// Trend threshold in percent. Changes within ±1% are "stable".
const TREND_THRESHOLD_PCT: f64 = 1.0;

/// Assumed volume when an "ML" unit carries no quantity.
const DEFAULT_ML_QUANTITY: f64 = 500.0;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// ============================================================================
// QUERY
// ============================================================================

/// Optional commodity and market filters.
///
/// Commodity filters match by case-insensitive containment, market filters
/// by case-insensitive equality. An empty list means "no filter".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceQuery {
    commodities: Vec<String>,
    markets: Vec<String>,
}

impl PriceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commodity(mut self, fragment: &str) -> Self {
        self.commodities.push(fragment.to_lowercase());
        self
    }

    pub fn with_market(mut self, name: &str) -> Self {
        self.markets.push(name.to_lowercase());
        self
    }

    /// Build from comma-separated query parameters, e.g.
    /// `commodities=maize,beans` and `markets=Kakuma,Dagahaley`.
    /// `markets=all` disables the market filter. Blank entries are dropped.
    pub fn from_params(commodities: Option<&str>, markets: Option<&str>) -> Self {
        let mut query = Self::new();

        for fragment in split_list(commodities.unwrap_or("")) {
            query = query.with_commodity(fragment);
        }

        let markets = markets.unwrap_or("");
        if !markets.trim().eq_ignore_ascii_case("all") {
            for name in split_list(markets) {
                query = query.with_market(name);
            }
        }

        query
    }

    pub fn matches_market(&self, name: &str) -> bool {
        if self.markets.is_empty() {
            return true;
        }
        let name = name.to_lowercase();
        self.markets.iter().any(|m| *m == name)
    }

    pub fn matches_commodity(&self, name: &str) -> bool {
        if self.commodities.is_empty() {
            return true;
        }
        let name = name.to_lowercase();
        self.commodities.iter().any(|c| name.contains(c.as_str()))
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// POLICIES
// ============================================================================

/// Observations dated before `cutoff_year` are stale.
///
/// The cutoff is a fixed policy value, not derived from the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessPolicy {
    pub cutoff_year: i32,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        StalenessPolicy { cutoff_year: 2026 }
    }
}

impl StalenessPolicy {
    pub fn new(cutoff_year: i32) -> Self {
        StalenessPolicy { cutoff_year }
    }

    /// A date without a readable year is stale.
    pub fn is_stale(&self, date: &str) -> bool {
        let parts: Vec<&str> = date.split('-').collect();
        if parts.len() != 3 {
            return true;
        }
        match parts[0].parse::<i32>() {
            Ok(year) => year < self.cutoff_year,
            Err(_) => true,
        }
    }
}

// ============================================================================
// UNIT NORMALIZATION
// ============================================================================

/// Rewrite a price onto a per-kg or per-unit basis.
///
/// | unit            | price               | unit out |
/// |-----------------|---------------------|----------|
/// | `<n> KG`        | price / n           | kg       |
/// | `L`, `LTR`      | unchanged (1 L≈1 kg)| kg       |
/// | `<n> ML`        | price * 1000 / n    | kg       |
/// | `ML`            | price * 2           | kg       |
/// | `UNIT`          | unchanged           | unit     |
/// | anything else   | unchanged           | lowercase|
pub fn normalize_price(price: f64, unit: &str) -> (f64, String) {
    let unit = unit.trim();
    let upper = unit.to_uppercase();

    if upper.contains("KG") && upper != "KG" {
        if let Some(quantity) = leading_quantity(unit) {
            return (price / quantity, "kg".to_string());
        }
    }

    if upper == "L" || upper == "LTR" {
        return (price, "kg".to_string());
    }

    if upper.contains("ML") {
        let quantity = leading_quantity(unit).unwrap_or(DEFAULT_ML_QUANTITY);
        return (price * (1000.0 / quantity), "kg".to_string());
    }

    if upper == "UNIT" {
        return (price, "unit".to_string());
    }

    (price, unit.to_lowercase())
}

/// Leading positive number of a unit string: "90 KG" -> 90, "500ML" -> 500.
fn leading_quantity(unit: &str) -> Option<f64> {
    let end = unit
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unit.len());
    unit[..end].parse::<f64>().ok().filter(|q| *q > 0.0)
}

// ============================================================================
// TREND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        }
    }
}

/// Classify `latest` against the previous observation of the same
/// commodity in the same market.
///
/// Returns the trend and its magnitude in percent (always >= 0). With no
/// earlier observation, or a zero previous price, the trend is stable/0.
pub fn calculate_trend(market: &Market, latest: &Observation) -> (Trend, f64) {
    let previous = market
        .observations()
        .filter(|o| o.name == latest.name && o.date < latest.date)
        .fold(None::<&Observation>, |best, o| match best {
            Some(b) if (b.date.as_str(), b.id) > (o.date.as_str(), o.id) => Some(b),
            _ => Some(o),
        });

    let previous_price = match previous {
        Some(p) if p.price != 0.0 => p.price,
        _ => return (Trend::Stable, 0.0),
    };

    let percent_change = (latest.price - previous_price) / previous_price * 100.0;

    if percent_change > TREND_THRESHOLD_PCT {
        (Trend::Up, percent_change)
    } else if percent_change < -TREND_THRESHOLD_PCT {
        (Trend::Down, -percent_change)
    } else {
        (Trend::Stable, 0.0)
    }
}

// ============================================================================
// DISPLAY
// ============================================================================

/// "2025-07-15" -> "15 Jul 2025". Malformed input passes through.
pub fn format_date(date: &str) -> String {
    let parts: Vec<&str> = date.split('-').collect();
    if parts.len() != 3 {
        return date.to_string();
    }

    match parts[1].parse::<usize>() {
        Ok(month) if (1..=12).contains(&month) => {
            format!("{} {} {}", parts[2], MONTHS[month - 1], parts[0])
        }
        _ => date.to_string(),
    }
}

// ============================================================================
// LATEST PRICES
// ============================================================================

/// One row of the latest-prices view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPriceSummary {
    /// Id of the latest observation
    pub id: String,
    pub market: String,
    pub location: String,
    pub product: String,
    pub price: f64,
    pub currency: String,
    pub unit: String,
    pub trend: Trend,
    pub trend_percent: f64,
    pub last_updated: String,
    pub is_stale: bool,
}

/// Latest normalized price per (market, commodity) pair.
///
/// The latest observation is the one with the greatest date; on equal dates
/// the one ingested later wins. Output follows catalog order: markets as
/// first seen, then commodities as first met within each market.
/// A filter that matches nothing yields an empty list.
pub fn latest_prices(
    catalog: &Catalog,
    query: &PriceQuery,
    policy: StalenessPolicy,
) -> Vec<MarketPriceSummary> {
    let mut response = Vec::new();

    for market in catalog.markets() {
        if !query.matches_market(&market.name) {
            continue;
        }

        let mut latest: Vec<&Observation> = Vec::new();
        for observation in market.observations() {
            if !query.matches_commodity(&observation.name) {
                continue;
            }

            match latest.iter_mut().find(|o| o.name == observation.name) {
                Some(current) => {
                    if (observation.date.as_str(), observation.id) > (current.date.as_str(), current.id) {
                        *current = observation;
                    }
                }
                None => latest.push(observation),
            }
        }

        for observation in latest {
            response.push(summarize(market, observation, policy));
        }
    }

    response
}

fn summarize(market: &Market, observation: &Observation, policy: StalenessPolicy) -> MarketPriceSummary {
    let (price, unit) = normalize_price(observation.price, &observation.unit);
    let (trend, trend_percent) = calculate_trend(market, observation);

    MarketPriceSummary {
        id: observation.id.to_string(),
        market: market.name.clone(),
        location: market.location_label(),
        product: observation.name.clone(),
        price,
        currency: observation.currency.code().to_string(),
        unit,
        trend,
        trend_percent,
        last_updated: format_date(&observation.date),
        is_stale: policy.is_stale(&observation.date),
    }
}
