// 🧭 Dashboard pipeline
//
// loader (cached) -> aggregate -> filter -> join -> renderers, recomputed in
// full for every selection. Nothing here holds state between calls.

use crate::aggregate::{aggregate, filter, municipality_options, substance_options, year_options};
use crate::charts::{StateTotalsChart, TimeSeriesChart};
use crate::choropleth::{self, ChoroplethMap, MapSettings};
use crate::config::DashboardConfig;
use crate::geo::attach;
use crate::loader::DistributionRecord;
use crate::money::CurrencyFormat;
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Selector placeholders meaning "none selected"
pub const NO_SUBSTANCE_LABEL: &str = "Selecione uma opção";
pub const NO_YEAR_LABEL: &str = "Selecione o ano de consulta";
pub const NO_MUNICIPALITY_LABEL: &str = "Selecione uma opção";

// ============================================================================
// SELECTION
// ============================================================================

/// Ephemeral UI state; None is the "none selected" sentinel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub year: Option<i32>,
    pub substance: Option<String>,
    pub municipality: Option<String>,
}

impl FilterSelection {
    pub fn new(year: Option<i32>, substance: Option<&str>, municipality: Option<&str>) -> Self {
        FilterSelection {
            year,
            substance: substance.map(str::to_string),
            municipality: municipality.map(str::to_string),
        }
    }

    pub fn substance(&self) -> Option<&str> {
        self.substance.as_deref()
    }

    pub fn municipality(&self) -> Option<&str> {
        self.municipality.as_deref()
    }
}

/// Selector text -> year; placeholders, blanks and junk mean none selected
pub fn parse_year(label: &str) -> Option<i32> {
    let label = label.trim();
    if label == NO_YEAR_LABEL {
        return None;
    }
    label.parse().ok()
}

/// Selector text -> choice; placeholders and blanks mean none selected
pub fn parse_choice(label: &str) -> Option<String> {
    let label = label.trim();
    if label.is_empty() || label == NO_SUBSTANCE_LABEL || label == NO_MUNICIPALITY_LABEL {
        None
    } else {
        Some(label.to_string())
    }
}

/// Apply selector labels over a default selection. Absent labels keep the
/// default; present ones replace it, placeholders included.
pub fn resolve_selection(
    default: FilterSelection,
    year: Option<&str>,
    substance: Option<&str>,
    municipality: Option<&str>,
) -> FilterSelection {
    FilterSelection {
        year: year.map_or(default.year, parse_year),
        substance: substance.map_or(default.substance, parse_choice),
        municipality: municipality.map_or(default.municipality, parse_choice),
    }
}

/// Initial selection: configured substance, configured or latest year
pub fn default_selection(records: &[DistributionRecord], config: &DashboardConfig) -> FilterSelection {
    let latest_year = records.iter().map(|r| r.year).max();

    FilterSelection {
        year: config.default_year.or(latest_year),
        substance: config.default_substance.clone(),
        municipality: None,
    }
}

// ============================================================================
// VIEW
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Placeholders {
    pub substance: &'static str,
    pub year: &'static str,
    pub municipality: &'static str,
}

impl Default for Placeholders {
    fn default() -> Self {
        Placeholders {
            substance: NO_SUBSTANCE_LABEL,
            year: NO_YEAR_LABEL,
            municipality: NO_MUNICIPALITY_LABEL,
        }
    }
}

/// The three dependent selectors
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SelectorOptions {
    pub substances: Vec<String>,
    pub years: Vec<i32>,
    pub municipalities: Vec<String>,
    pub placeholders: Placeholders,
}

impl SelectorOptions {
    pub fn build(records: &[DistributionRecord], selection: &FilterSelection) -> Self {
        let aggregated = aggregate(records);
        let filtered = filter(&aggregated, selection.year, selection.substance());
        Self::from_parts(records, &filtered)
    }

    fn from_parts(records: &[DistributionRecord], filtered: &[crate::aggregate::AggregatedRecord]) -> Self {
        SelectorOptions {
            substances: substance_options(records),
            years: year_options(records),
            municipalities: municipality_options(filtered),
            placeholders: Placeholders::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub map: MapSettings,
    pub currency: CurrencyFormat,
}

impl RenderSettings {
    pub fn from_config(config: &DashboardConfig) -> Self {
        RenderSettings {
            map: MapSettings::default(),
            currency: config.currency_format().unwrap_or_default(),
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            map: MapSettings::default(),
            currency: CurrencyFormat::pt_br(),
        }
    }
}

/// Everything one interaction renders
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub selection: FilterSelection,
    pub options: SelectorOptions,
    pub filtered_rows: usize,
    pub map: ChoroplethMap,
    pub state_chart: StateTotalsChart,
    pub time_series: TimeSeriesChart,
}

/// Run the full pipeline for one selection
pub fn build_dashboard(
    records: &[DistributionRecord],
    boundaries: &FeatureCollection,
    selection: &FilterSelection,
    settings: &RenderSettings,
) -> DashboardView {
    let started = Instant::now();

    let aggregated = aggregate(records);
    let filtered = filter(&aggregated, selection.year, selection.substance());
    let options = SelectorOptions::from_parts(records, &filtered);

    // A municipality missing from the refreshed options falls back to the placeholder
    let mut selection = selection.clone();
    let stale = selection
        .municipality()
        .is_some_and(|name| !options.municipalities.iter().any(|m| m == name));
    if stale {
        selection.municipality = None;
    }

    let joined = attach(boundaries, &filtered);
    let map = choropleth::render(&joined, &filtered, selection.year, &settings.map, &settings.currency);
    let state_chart = StateTotalsChart::render(&filtered, selection.year, selection.substance(), &settings.currency);
    let time_series = TimeSeriesChart::render(
        selection.municipality(),
        selection.substance(),
        &aggregated,
        &settings.currency,
    );

    debug!(
        aggregated = aggregated.len(),
        filtered = filtered.len(),
        colored = map.colored_feature_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "dashboard rebuilt"
    );

    DashboardView {
        selection,
        options,
        filtered_rows: filtered.len(),
        map,
        state_chart,
        time_series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{normalize_names, parse_boundaries};
    use crate::money::Money;
    use serde_json::json;

    fn records() -> Vec<DistributionRecord> {
        let rec = |year, substance, cents, entity, state| {
            DistributionRecord::new(year, substance, Money::from_cents(cents), entity, state)
        };
        vec![
            rec(2020, "Ouro", 10000, "X", "MG"),
            rec(2020, "Ouro", 5000, "X", "MG"),
            rec(2020, "Ouro", 10000, "FOZ DO IGUAÇU", "PR"),
            rec(2021, "Ouro", 700, "X", "MG"),
            rec(2021, "Ferro", 900, "Y", "PA"),
        ]
    }

    fn boundaries() -> FeatureCollection {
        let raw = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "description": "x" }, "geometry": null },
                { "type": "Feature", "properties": { "description": "foz do iguaçu" }, "geometry": null },
                { "type": "Feature", "properties": { "description": "Sem Dados" }, "geometry": null }
            ]
        })
        .to_string();
        let mut collection = parse_boundaries(raw.as_bytes()).unwrap();
        normalize_names(&mut collection);
        collection
    }

    #[test]
    fn test_parse_selector_labels() {
        assert_eq!(parse_year("2020"), Some(2020));
        assert_eq!(parse_year(NO_YEAR_LABEL), None);
        assert_eq!(parse_year(""), None);
        assert_eq!(parse_year("20x0"), None);

        assert_eq!(parse_choice("OURO"), Some("OURO".to_string()));
        assert_eq!(parse_choice(NO_SUBSTANCE_LABEL), None);
        assert_eq!(parse_choice("  "), None);
    }

    #[test]
    fn test_resolve_selection_overrides() {
        let default = FilterSelection::new(Some(2024), Some("FERRO"), None);

        let resolved = resolve_selection(default.clone(), None, Some("OURO"), Some("ITABIRA"));
        assert_eq!(resolved, FilterSelection::new(Some(2024), Some("OURO"), Some("ITABIRA")));

        let resolved = resolve_selection(default.clone(), Some(NO_YEAR_LABEL), Some(""), None);
        assert_eq!(resolved, FilterSelection::new(None, None, None));

        assert_eq!(resolve_selection(default.clone(), None, None, None), default);
    }

    #[test]
    fn test_default_selection() {
        let config = DashboardConfig::default();
        let selection = default_selection(&records(), &config);
        assert_eq!(selection, FilterSelection::new(Some(2021), None, None));

        let config = DashboardConfig {
            default_year: Some(2020),
            default_substance: Some("Ouro".to_string()),
            ..DashboardConfig::default()
        };
        let selection = default_selection(&records(), &config);
        assert_eq!(selection, FilterSelection::new(Some(2020), Some("Ouro"), None));

        assert_eq!(default_selection(&[], &DashboardConfig::default()).year, None);
    }

    #[test]
    fn test_build_dashboard_full_selection() {
        let selection = FilterSelection::new(Some(2020), Some("Ouro"), Some("X"));
        let view = build_dashboard(&records(), &boundaries(), &selection, &RenderSettings::default());

        assert_eq!(view.filtered_rows, 2);
        assert_eq!(view.options.substances, vec!["Ferro", "Ouro"]);
        assert_eq!(view.options.years, vec![2020, 2021]);
        assert_eq!(view.options.municipalities, vec!["FOZ DO IGUAÇU", "X"]);

        assert_eq!(view.map.colored_feature_count(), 2);
        assert_eq!(view.state_chart.bars.len(), 2);
        assert_eq!(view.state_chart.bars[0].total, Money::from_cents(15000));

        // Year selector does not restrict the time series
        let years: Vec<i32> = view.time_series.points.iter().map(|p| p.year).collect();
        assert_eq!(years, vec![2020, 2021]);
    }

    #[test]
    fn test_build_dashboard_empty_selection_renders() {
        let selection = FilterSelection::new(Some(2021), Some("Ouro"), None);
        let mut records = records();
        records.retain(|r| r.year == 2020);

        let view = build_dashboard(&records, &boundaries(), &selection, &RenderSettings::default());

        assert_eq!(view.filtered_rows, 0);
        assert_eq!(view.map.colored_feature_count(), 0);
        assert!(view.state_chart.is_empty());
        assert!(view.time_series.is_empty());
        assert!(view.options.municipalities.is_empty());
    }

    #[test]
    fn test_stale_municipality_resets_to_placeholder() {
        let records = vec![
            DistributionRecord::new(2020, "Ouro", Money::from_cents(100), "X", "MG"),
            DistributionRecord::new(2021, "Ferro", Money::from_cents(200), "Y", "PA"),
        ];
        let selection = FilterSelection::new(Some(2021), Some("Ouro"), Some("X"));
        let view = build_dashboard(&records, &boundaries(), &selection, &RenderSettings::default());

        assert!(view.options.municipalities.is_empty());
        assert_eq!(view.selection.municipality, None);
        assert!(view.time_series.is_empty());
        assert!(view.time_series.title.contains(NO_MUNICIPALITY_LABEL));

        // Still listed: kept
        let selection = FilterSelection::new(Some(2020), Some("Ouro"), Some("X"));
        let view = build_dashboard(&records, &boundaries(), &selection, &RenderSettings::default());
        assert_eq!(view.selection.municipality.as_deref(), Some("X"));
        assert_eq!(view.time_series.points.len(), 1);
    }

    #[test]
    fn test_selector_options_build() {
        let options = SelectorOptions::build(&records(), &FilterSelection::new(Some(2021), Some("Ferro"), None));
        assert_eq!(options.municipalities, vec!["Y"]);
        assert_eq!(options.placeholders.year, NO_YEAR_LABEL);
    }

    #[test]
    fn test_view_serializes() {
        let selection = FilterSelection::new(Some(2020), Some("Ouro"), None);
        let view = build_dashboard(&records(), &boundaries(), &selection, &RenderSettings::default());
        let value = serde_json::to_value(&view).unwrap();

        assert_eq!(value["selection"]["year"], json!(2020));
        assert_eq!(value["map"]["layer"]["type"], json!("FeatureCollection"));
        assert_eq!(value["map"]["layer"]["features"][2]["properties"]["Valor"], json!(0));
    }
}
