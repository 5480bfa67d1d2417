// HTTP API - axum router over the immutable catalog
//
// All handlers are read-only. State is cloned per request; the catalog and
// pest library sit behind Arc and are never locked.

use crate::catalog::{Catalog, Market, Region};
use crate::pests::{Crop, Pest, PestLibrary};
use crate::pricing::{latest_prices, MarketPriceSummary, PriceQuery, StalenessPolicy};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub pests: Arc<PestLibrary>,
    pub staleness: StalenessPolicy,
    /// Front-end build served for every non-API path
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(catalog: Catalog, pests: PestLibrary, staleness: StalenessPolicy, static_dir: PathBuf) -> Self {
        Self {
            catalog: Arc::new(catalog),
            pests: Arc::new(pests),
            staleness,
            static_dir,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, message)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    markets: usize,
    observations: usize,
}

#[derive(Debug, Deserialize)]
struct LatestParams {
    commodities: Option<String>,
    markets: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    product: Option<String>,
    market: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PestParams {
    crop: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetupRequest {
    region_id: String,
    #[serde(default)]
    crops: Vec<String>,
}

/// Everything the front end caches for offline use after onboarding.
#[derive(Serialize)]
struct SetupBundle<'a> {
    region: Option<Region>,
    crops: BTreeMap<String, Crop>,
    pests: Vec<&'a Pest>,
    markets: Vec<&'a Market>,
    prices: Vec<MarketPriceSummary>,
    generated_at: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /ping
async fn ping() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "pong" }))
}

/// GET /api/health
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
        markets: state.catalog.markets().len(),
        observations: state.catalog.observations().len(),
    })
}

/// GET /api/markets
async fn list_markets(State(state): State<AppState>) -> Response {
    Json(state.catalog.markets()).into_response()
}

/// GET /api/markets/region/:region
async fn markets_by_region(State(state): State<AppState>, Path(region): Path<String>) -> Response {
    Json(state.catalog.markets_in_region(&region)).into_response()
}

/// GET /api/markets/county/:county
async fn markets_by_county(State(state): State<AppState>, Path(county): Path<String>) -> Response {
    Json(state.catalog.markets_in_sub_region(&county)).into_response()
}

/// GET /api/market/:name
async fn market_by_name(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.catalog.market_named(&name) {
        Some(market) => Json(market).into_response(),
        None => not_found("Market not found"),
    }
}

/// GET /api/commodities
async fn list_commodities(State(state): State<AppState>) -> Response {
    Json(state.catalog.observations()).into_response()
}

/// GET /api/commodities/:name
async fn commodities_by_name(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    Json(state.catalog.commodities_matching(&name)).into_response()
}

/// GET /api/prices/:market/:commodity
async fn market_prices(
    State(state): State<AppState>,
    Path((market, commodity)): Path<(String, String)>,
) -> Response {
    Json(state.catalog.market_commodity_prices(&market, &commodity)).into_response()
}

/// GET /api/prices/latest?commodities=maize,beans&markets=all
async fn latest(State(state): State<AppState>, Query(params): Query<LatestParams>) -> Response {
    let query = PriceQuery::from_params(params.commodities.as_deref(), params.markets.as_deref());
    Json(latest_prices(&state.catalog, &query, state.staleness)).into_response()
}

/// GET /api/prices/history?product=Maize&market=Kongowea
async fn history(State(state): State<AppState>, Query(params): Query<HistoryParams>) -> Response {
    let points = match (params.market.as_deref(), params.product.as_deref()) {
        (Some(market), Some(product)) => state.catalog.price_history(market, product),
        _ => Vec::new(),
    };
    Json(points).into_response()
}

/// GET /api/pests?crop=maize
async fn list_pests(State(state): State<AppState>, Query(params): Query<PestParams>) -> Response {
    Json(state.pests.pests_for_crop(params.crop.as_deref())).into_response()
}

/// GET /api/pests/:id
async fn pest_details(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.pests.details(&id) {
        Some(details) => Json(details).into_response(),
        None => not_found("Pest not found"),
    }
}

/// GET /api/crops
async fn list_crops(State(state): State<AppState>) -> Response {
    Json(state.pests.crops()).into_response()
}

/// GET /api/regions
async fn list_regions(State(state): State<AppState>) -> Response {
    Json(state.catalog.region_list()).into_response()
}

/// POST /api/setup  {"region_id": "coast", "crops": ["maize"]}
///
/// Unknown region: `region` is null and no markets or prices are bundled.
/// No crops: every commodity sold in the region is priced.
async fn setup(State(state): State<AppState>, payload: Result<Json<SetupRequest>, JsonRejection>) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "rejected setup request");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request");
        }
    };

    let region = state.catalog.region(&request.region_id);
    let markets: Vec<&Market> = match &region {
        Some(region) => state.catalog.markets_in_region(&region.name),
        None => Vec::new(),
    };

    let crops: BTreeMap<String, Crop> = request
        .crops
        .iter()
        .filter_map(|id| state.pests.crop(id))
        .map(|crop| (crop.id.clone(), crop))
        .collect();

    let prices = if markets.is_empty() {
        Vec::new()
    } else {
        let query = request
            .crops
            .iter()
            .fold(PriceQuery::new(), |q, crop| q.with_commodity(crop));
        let query = markets.iter().fold(query, |q, m| q.with_market(&m.name));

        // Same-named markets elsewhere pass the name filter; keep the region's own
        latest_prices(&state.catalog, &query, state.staleness)
            .into_iter()
            .filter(|row| {
                markets
                    .iter()
                    .any(|m| m.name == row.market && m.location_label() == row.location)
            })
            .collect()
    };

    Json(SetupBundle {
        region,
        crops,
        pests: state.pests.pests_for_crops(&request.crops),
        markets,
        prices,
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
    .into_response()
}

/// GET /debug
async fn debug_summary(State(state): State<AppState>) -> Response {
    Json(state.catalog.summary()).into_response()
}

/// Unknown API paths get JSON 404; everything else is a front-end file,
/// with index.html for client-side routes.
async fn fallback(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return not_found("Not found");
    }

    let index = state.static_dir.join("index.html");
    let assets = ServeDir::new(&state.static_dir).fallback(ServeFile::new(index));

    match assets.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/markets", get(list_markets))
        .route("/markets/region/:region", get(markets_by_region))
        .route("/markets/county/:county", get(markets_by_county))
        .route("/market/:name", get(market_by_name))
        .route("/commodities", get(list_commodities))
        .route("/commodities/:name", get(commodities_by_name))
        .route("/prices/latest", get(latest))
        .route("/prices/history", get(history))
        .route("/prices/:market/:commodity", get(market_prices))
        .route("/pests", get(list_pests))
        .route("/pests/:id", get(pest_details))
        .route("/crops", get(list_crops))
        .route("/regions", get(list_regions))
        .route("/setup", post(setup));

    Router::new()
        .route("/ping", get(ping))
        .route("/debug", get(debug_summary))
        .nest("/api", api_routes)
        .fallback(fallback)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
