// Market Advisory - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod parser;
pub mod catalog;
pub mod pricing;
pub mod pests;
pub mod config;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{ConfigError, IngestError, PestDataError, RowError};
pub use parser::{
    ingest, ingest_reader, validate_date,
    Currency, PriceFlag, PriceType, PriceRecord, MIN_COLUMNS,
};
pub use catalog::{
    Catalog, CatalogBuilder, CatalogSummary, Category, IngestStats,
    Location, Market, MarketKey, Observation, PricePoint, Region,
};
pub use pricing::{
    calculate_trend, format_date, latest_prices, normalize_price,
    MarketPriceSummary, PriceQuery, StalenessPolicy, Trend,
};
pub use pests::{Crop, Pest, PestDetails, PestLibrary, TreatmentOption};
pub use config::AppConfig;

use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
