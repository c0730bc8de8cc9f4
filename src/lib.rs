// CFEM Choropleth Dashboard - Core Library
// Exposes the pipeline for use in the CLI, the API server, and tests

pub mod aggregate;
pub mod charts;
pub mod choropleth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod geo;
pub mod loader;
pub mod money;

// Re-export commonly used types
pub use aggregate::{
    AggregatedRecord,
    aggregate, filter, municipality_options, substance_options, year_options,
};
pub use charts::{
    Figure, StateTotal, StateTotalsChart, TimeSeriesChart, TimeSeriesPoint,
    state_totals,
};
pub use choropleth::{ChoroplethMap, ColorScale, MapSettings};
pub use config::DashboardConfig;
pub use dashboard::{
    DashboardView, FilterSelection, RenderSettings, SelectorOptions,
    build_dashboard, default_selection, parse_choice, parse_year, resolve_selection,
    NO_MUNICIPALITY_LABEL, NO_SUBSTANCE_LABEL, NO_YEAR_LABEL,
};
pub use error::{DashboardError, Result};
pub use geo::{attach, normalize_names, parse_boundaries};
pub use loader::{
    Dataset, DatasetCache, DatasetSource, DistributionRecord, RemoteSource,
    parse_distributions,
};
pub use money::{CurrencyFormat, Money};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the fmt subscriber; RUST_LOG overrides the default `info` level
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
