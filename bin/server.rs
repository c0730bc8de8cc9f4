// CFEM Choropleth Dashboard - Web Server
// REST API + embedded Leaflet/Plotly page with Axum

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use cfem_choropleth::{
    build_dashboard, default_selection, filter, aggregate, resolve_selection, ChoroplethMap,
    DashboardConfig, DashboardError, DatasetCache, Figure, FilterSelection, RemoteSource,
    RenderSettings, SelectorOptions, StateTotalsChart, TimeSeriesChart,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    cache: Arc<DatasetCache<RemoteSource>>,
    config: Arc<DashboardConfig>,
    settings: Arc<RenderSettings>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Selector values as sent by the page; absent fields fall back to defaults
#[derive(Debug, Default, Deserialize)]
struct SelectionQuery {
    year: Option<String>,
    substance: Option<String>,
    municipality: Option<String>,
}

impl SelectionQuery {
    fn resolve(&self, default: FilterSelection) -> FilterSelection {
        resolve_selection(
            default,
            self.year.as_deref(),
            self.substance.as_deref(),
            self.municipality.as_deref(),
        )
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    dataset_loaded_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct OptionsResponse {
    selection: FilterSelection,
    options: SelectorOptions,
}

/// Dashboard response with charts already in Plotly form
#[derive(Serialize)]
struct DashboardResponse {
    selection: FilterSelection,
    options: SelectorOptions,
    filtered_rows: usize,
    map: ChoroplethMap,
    state_chart: Figure,
    time_series: Figure,
}

// ============================================================================
// Render pass
// ============================================================================

fn error_response(e: &DashboardError) -> Response {
    let status = if e.is_network() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ApiResponse::<()>::err(e.to_string()))).into_response()
}

/// Run one synchronous pass off the async runtime. Failures abort the pass
/// and answer with the error; no partial visuals are returned.
async fn render_pass<T, F>(state: AppState, what: &'static str, pass: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&AppState) -> cfem_choropleth::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || pass(&state)).await {
        Ok(Ok(data)) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "{} failed", what);
            error_response(&e)
        }
        Err(e) => {
            error!(error = %e, "{} panicked", what);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::err(format!("{} failed", what))),
            )
                .into_response()
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "OK",
        version: cfem_choropleth::VERSION,
        dataset_loaded_at: state.cache.loaded_at(),
    }))
}

/// GET /api/options - Selector lists for the current selection
async fn get_options(State(state): State<AppState>, Query(query): Query<SelectionQuery>) -> Response {
    render_pass(state, "options", move |state| {
        let dataset = state.cache.distributions()?;
        let selection = query.resolve(default_selection(&dataset.records, &state.config));
        let options = SelectorOptions::build(&dataset.records, &selection);
        Ok(OptionsResponse { selection, options })
    })
    .await
}

/// GET /api/dashboard - Map, charts and selectors in one pass
async fn get_dashboard(State(state): State<AppState>, Query(query): Query<SelectionQuery>) -> Response {
    render_pass(state, "dashboard", move |state| {
        let dataset = state.cache.distributions()?;
        let boundaries = state.cache.boundaries()?;
        let selection = query.resolve(default_selection(&dataset.records, &state.config));

        let view = build_dashboard(&dataset.records, &boundaries, &selection, &state.settings);
        Ok(DashboardResponse {
            state_chart: view.state_chart.figure(),
            time_series: view.time_series.figure(),
            selection: view.selection,
            options: view.options,
            filtered_rows: view.filtered_rows,
            map: view.map,
        })
    })
    .await
}

/// GET /api/charts/states - By-state totals figure
async fn get_state_chart(State(state): State<AppState>, Query(query): Query<SelectionQuery>) -> Response {
    render_pass(state, "state chart", move |state| {
        let dataset = state.cache.distributions()?;
        let selection = query.resolve(default_selection(&dataset.records, &state.config));

        let aggregated = aggregate(&dataset.records);
        let filtered = filter(&aggregated, selection.year, selection.substance());
        let chart = StateTotalsChart::render(
            &filtered,
            selection.year,
            selection.substance(),
            &state.settings.currency,
        );
        Ok(chart.figure())
    })
    .await
}

/// Path segments arrive percent-decoded; placeholders mean none selected
fn municipality_from_path(Path(raw): Path<String>) -> Option<String> {
    cfem_choropleth::parse_choice(&raw)
}

/// GET /api/charts/timeseries/:municipality - Time series for one municipality
async fn get_time_series(
    State(state): State<AppState>,
    path: Path<String>,
    Query(query): Query<SelectionQuery>,
) -> Response {
    let municipality = municipality_from_path(path);

    render_pass(state, "time series", move |state| {
        let dataset = state.cache.distributions()?;
        let selection = query.resolve(default_selection(&dataset.records, &state.config));

        let aggregated = aggregate(&dataset.records);
        let chart = TimeSeriesChart::render(
            municipality.as_deref(),
            selection.substance(),
            &aggregated,
            &state.settings.currency,
        );
        Ok(chart.figure())
    })
    .await
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Main Server
// ============================================================================

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/options", get(get_options))
        .route("/dashboard", get(get_dashboard))
        .route("/charts/states", get(get_state_chart))
        .route("/charts/timeseries/:municipality", get(get_time_series))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cfem_choropleth::init_tracing();

    // Optional: --config <path>; otherwise CFEM_CONFIG or defaults
    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.get(1).map(String::as_str) {
        Some("--config") => Some(std::path::PathBuf::from(
            args.get(2)
                .ok_or_else(|| anyhow::anyhow!("--config requires a value"))?,
        )),
        Some(other) => anyhow::bail!("unknown argument {:?}", other),
        None => None,
    };

    let config = DashboardConfig::load(config_path.as_deref())?;
    let source = RemoteSource::from_config(&config)?;

    let state = AppState {
        cache: Arc::new(DatasetCache::new(source)),
        settings: Arc::new(RenderSettings::from_config(&config)),
        config: Arc::new(config.clone()),
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;

    info!(addr = %config.bind, "server running");
    info!("   API: http://{}/api/dashboard", config.bind);
    info!("   UI:  http://{}/", config.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
