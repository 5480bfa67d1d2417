// Price source parser
// Reads the WFP-style market price CSV row by row and feeds a CatalogBuilder.
//
// Column layout (positional, header ignored):
//   0 date | 1 admin1 | 2 admin2 | 3 market | 4 market_id | 5 latitude
//   6 longitude | 7 category | 8 commodity | 9 commodity_id | 10 unit
//   11 priceflag | 12 pricetype | 13 currency | 14 price | 15 usdprice

use crate::catalog::{Catalog, CatalogBuilder};
use crate::error::{IngestError, RowError};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Minimum number of fields a data row must carry.
pub const MIN_COLUMNS: usize = 16;

mod col {
    pub const DATE: usize = 0;
    pub const REGION: usize = 1;
    pub const SUB_REGION: usize = 2;
    pub const MARKET: usize = 3;
    pub const MARKET_ID: usize = 4;
    pub const LATITUDE: usize = 5;
    pub const LONGITUDE: usize = 6;
    pub const CATEGORY: usize = 7;
    pub const COMMODITY: usize = 8;
    pub const COMMODITY_ID: usize = 9;
    pub const UNIT: usize = 10;
    pub const PRICE_FLAG: usize = 11;
    pub const PRICE_TYPE: usize = 12;
    pub const CURRENCY: usize = 13;
    pub const PRICE: usize = 14;
    pub const REFERENCE_PRICE: usize = 15;
}

// ============================================================================
// ENUMERATED FIELDS
// ============================================================================
//
// Parsing is case-insensitive and never fails: anything unrecognized,
// including an empty string, falls back to a fixed default.
//
//   currency   : "USD" -> Reference, otherwise Local
//   price flag : actual | aggregate | composite, otherwise Aggregate
//   price type : "wholesale" -> Wholesale, otherwise Retail

/// Currency the price column is quoted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Local market currency (KES).
    #[serde(rename = "KES")]
    Local,
    /// Reference currency (USD).
    #[serde(rename = "USD")]
    Reference,
}

impl Currency {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("USD") {
            Currency::Reference
        } else {
            Currency::Local
        }
    }

    /// ISO code for display
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Local => "KES",
            Currency::Reference => "USD",
        }
    }
}

/// How the price was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceFlag {
    Actual,
    Aggregate,
    /// Both actual and aggregate readings
    Composite,
}

impl PriceFlag {
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "actual" => PriceFlag::Actual,
            "composite" => PriceFlag::Composite,
            _ => PriceFlag::Aggregate,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PriceFlag::Actual => "Actual",
            PriceFlag::Aggregate => "Aggregate",
            PriceFlag::Composite => "Composite",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceType {
    Wholesale,
    Retail,
}

impl PriceType {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("wholesale") {
            PriceType::Wholesale
        } else {
            PriceType::Retail
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PriceType::Wholesale => "Wholesale",
            PriceType::Retail => "Retail",
        }
    }
}

// ============================================================================
// ROW PARSING
// ============================================================================

/// One validated data row: observation fields plus placement keys.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub date: String,
    pub region: String,
    pub sub_region: String,
    pub market: String,
    pub market_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub category: String,
    pub commodity: String,
    pub commodity_id: i64,
    pub unit: String,
    pub price_flag: PriceFlag,
    pub price_type: PriceType,
    pub currency: Currency,
    pub price: f64,
    pub reference_price: f64,
}

impl PriceRecord {
    /// Parse a raw CSV record. Extra trailing columns are ignored.
    pub fn from_record(record: &StringRecord) -> Result<Self, RowError> {
        if record.len() < MIN_COLUMNS {
            return Err(RowError::ColumnCount {
                found: record.len(),
                expected: MIN_COLUMNS,
            });
        }

        let field = |i: usize| record.get(i).unwrap_or("");

        let date = field(col::DATE);
        validate_date(date)?;

        Ok(PriceRecord {
            date: date.to_string(),
            region: field(col::REGION).to_string(),
            sub_region: field(col::SUB_REGION).to_string(),
            market: field(col::MARKET).to_string(),
            market_id: parse_int("market_id", field(col::MARKET_ID))?,
            latitude: parse_float("latitude", field(col::LATITUDE))?,
            longitude: parse_float("longitude", field(col::LONGITUDE))?,
            category: field(col::CATEGORY).to_string(),
            commodity: field(col::COMMODITY).to_string(),
            commodity_id: parse_int("commodity_id", field(col::COMMODITY_ID))?,
            unit: field(col::UNIT).to_string(),
            price_flag: PriceFlag::parse(field(col::PRICE_FLAG)),
            price_type: PriceType::parse(field(col::PRICE_TYPE)),
            currency: Currency::parse(field(col::CURRENCY)),
            price: parse_float("price", field(col::PRICE))?,
            reference_price: parse_float("usd_price", field(col::REFERENCE_PRICE))?,
        })
    }
}

fn parse_int(field: &'static str, raw: &str) -> Result<i64, RowError> {
    raw.parse::<i64>().map_err(|_| RowError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

/// Finite values only: `NaN` and `inf` parse as f64 but are not prices.
fn parse_float(field: &'static str, raw: &str) -> Result<f64, RowError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RowError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

/// Dates must be zero-padded `YYYY-MM-DD` so string order equals
/// chronological order.
pub fn validate_date(raw: &str) -> Result<(), RowError> {
    if raw.len() != 10 || NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_err() {
        return Err(RowError::InvalidDate(raw.to_string()));
    }
    Ok(())
}

// ============================================================================
// INGESTION
// ============================================================================

/// Ingest a price CSV from disk.
pub fn ingest(path: &Path) -> Result<Catalog, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })?;

    ingest_reader(file, &path.display().to_string())
}

/// Ingest from any reader. `label` only appears in logs and errors.
///
/// Best effort: malformed rows are logged and skipped. Only an unreadable
/// header aborts.
pub fn ingest_reader<R: Read>(source: R, label: &str) -> Result<Catalog, IngestError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let header_len = match reader.headers() {
        Ok(header) if header.is_empty() => {
            return Err(IngestError::HeaderUnreadable {
                label: label.to_string(),
                reason: "source is empty".to_string(),
            })
        }
        Ok(header) => header.len(),
        Err(err) => {
            return Err(IngestError::HeaderUnreadable {
                label: label.to_string(),
                reason: err.to_string(),
            })
        }
    };

    if header_len < MIN_COLUMNS {
        warn!(
            source = label,
            columns = header_len,
            expected = MIN_COLUMNS,
            "header has fewer columns than a price row"
        );
    }

    let mut builder = CatalogBuilder::new();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(0);
                warn!(source = label, line, error = %RowError::Unreadable(err.to_string()), "skipping price row");
                builder.record_skipped();
                if err.is_io_error() {
                    break;
                }
                continue;
            }
        };

        match PriceRecord::from_record(&record) {
            Ok(row) => {
                builder.push(row);
            }
            Err(err) => {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                warn!(source = label, line, error = %err, "skipping price row");
                builder.record_skipped();
            }
        }
    }

    let catalog = builder.finish();
    info!(
        source = label,
        markets = catalog.markets().len(),
        observations = catalog.observations().len(),
        skipped = catalog.stats().rows_skipped,
        "price catalog loaded"
    );

    Ok(catalog)
}
