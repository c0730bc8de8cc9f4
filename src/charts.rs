// 📈 Charts - by-state totals and per-municipality time series
//
// Each renderer takes data by reference and returns a display artifact.
// `figure()` converts it to a Plotly-compatible JSON figure for the web page.

use crate::aggregate::AggregatedRecord;
use crate::dashboard::{NO_MUNICIPALITY_LABEL, NO_SUBSTANCE_LABEL, NO_YEAR_LABEL};
use crate::money::{CurrencyFormat, Money};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// PLOTLY FIGURE
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub x: Vec<JsonValue>,
    pub y: Vec<f64>,
    pub text: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hovertemplate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<LineStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<MarkerStyle>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LineStyle {
    pub color: String,
    pub width: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarkerStyle {
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Layout {
    pub title: String,
    pub xaxis: Axis,
    pub yaxis: Axis,
    pub showlegend: bool,
    pub plot_bgcolor: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Axis {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categoryorder: Option<String>,
}

impl Axis {
    fn titled(title: &str) -> Self {
        Axis {
            title: title.to_string(),
            categoryorder: None,
        }
    }
}

fn layout(title: String, x_title: &str, y_title: &str) -> Layout {
    Layout {
        title,
        xaxis: Axis::titled(x_title),
        yaxis: Axis::titled(y_title),
        showlegend: false,
        plot_bgcolor: "white".to_string(),
    }
}

// ============================================================================
// STATE TOTALS
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateTotal {
    pub state_code: String,
    pub total: Money,
}

/// Sum by state, sorted descending; ties keep first-occurrence order
pub fn state_totals(filtered: &[AggregatedRecord]) -> Vec<StateTotal> {
    let mut totals: Vec<StateTotal> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for row in filtered {
        match index.get(row.state_code.as_str()) {
            Some(&i) => totals[i].total += row.total_value,
            None => {
                index.insert(row.state_code.as_str(), totals.len());
                totals.push(StateTotal {
                    state_code: row.state_code.clone(),
                    total: row.total_value,
                });
            }
        }
    }

    // sort_by is stable
    totals.sort_by(|a, b| b.total.cmp(&a.total));
    totals
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateBar {
    pub state_code: String,
    pub total: Money,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateTotalsChart {
    pub title: String,
    pub bars: Vec<StateBar>,
}

impl StateTotalsChart {
    pub fn render(
        filtered: &[AggregatedRecord],
        year: Option<i32>,
        substance: Option<&str>,
        currency: &CurrencyFormat,
    ) -> Self {
        let year_label = year.map(|y| y.to_string()).unwrap_or_else(|| NO_YEAR_LABEL.to_string());
        let title = format!(
            "Distribuição CFEM por estado {} - {}",
            year_label,
            substance.unwrap_or(NO_SUBSTANCE_LABEL)
        );

        let bars = state_totals(filtered)
            .into_iter()
            .map(|t| StateBar {
                label: currency.format(t.total),
                state_code: t.state_code,
                total: t.total,
            })
            .collect();

        StateTotalsChart { title, bars }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn figure(&self) -> Figure {
        let mut layout = layout(self.title.clone(), "Estado", "Valor");
        layout.xaxis.categoryorder = Some("total descending".to_string());

        Figure {
            data: vec![Trace {
                kind: "bar".to_string(),
                name: self.title.clone(),
                x: self.bars.iter().map(|b| JsonValue::from(b.state_code.clone())).collect(),
                y: self.bars.iter().map(|b| b.total.as_f64()).collect(),
                text: self.bars.iter().map(|b| b.label.clone()).collect(),
                mode: None,
                hovertemplate: Some("<b>%{x}</b><br>Total: %{text}".to_string()),
                line: None,
                marker: None,
            }],
            layout,
        }
    }
}

// ============================================================================
// TIME SERIES
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimeSeriesPoint {
    pub year: i32,
    pub value: Money,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimeSeriesChart {
    pub title: String,
    pub points: Vec<TimeSeriesPoint>,
}

impl TimeSeriesChart {
    /// All years for one municipality and substance, ignoring the year selector.
    /// Homonymous entities in different states are summed into one point per year.
    pub fn render(
        municipality: Option<&str>,
        substance: Option<&str>,
        aggregated: &[AggregatedRecord],
        currency: &CurrencyFormat,
    ) -> Self {
        let title = format!(
            "Evolução multitemporal da distribuição da CFEM em {} - {}",
            municipality.unwrap_or(NO_MUNICIPALITY_LABEL),
            substance.unwrap_or(NO_SUBSTANCE_LABEL)
        );

        let (municipality, substance) = match (municipality, substance) {
            (Some(m), Some(s)) => (m, s),
            _ => return TimeSeriesChart { title, points: Vec::new() },
        };

        let mut by_year: BTreeMap<i32, Money> = BTreeMap::new();
        for row in aggregated {
            if row.entity_name == municipality && row.substance == substance {
                *by_year.entry(row.year).or_insert(Money::ZERO) += row.total_value;
            }
        }

        let points = by_year
            .into_iter()
            .map(|(year, value)| TimeSeriesPoint {
                year,
                value,
                label: format!("Ano: {}, {}", year, currency.format(value)),
            })
            .collect();

        TimeSeriesChart { title, points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn figure(&self) -> Figure {
        Figure {
            data: vec![Trace {
                kind: "scatter".to_string(),
                name: self.title.clone(),
                x: self.points.iter().map(|p| JsonValue::from(p.year)).collect(),
                y: self.points.iter().map(|p| p.value.as_f64()).collect(),
                text: self.points.iter().map(|p| p.label.clone()).collect(),
                mode: Some("lines+markers".to_string()),
                hovertemplate: None,
                line: Some(LineStyle {
                    color: "rgb(67,67,67)".to_string(),
                    width: 2,
                }),
                marker: Some(MarkerStyle { size: 8 }),
            }],
            layout: layout(self.title.clone(), "Ano", "Valor da CFEM"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(year: i32, substance: &str, entity: &str, state: &str, cents: i64) -> AggregatedRecord {
        AggregatedRecord::new(year, substance, entity, state, Money::from_cents(cents))
    }

    #[test]
    fn test_state_totals_sorted_descending_pa_last() {
        let filtered = vec![
            row(2020, "OURO", "A", "MG", 20000),
            row(2020, "OURO", "B", "PA", 10000),
            row(2020, "OURO", "C", "SP", 30000),
            row(2020, "OURO", "D", "MG", 10000),
        ];

        let totals = state_totals(&filtered);
        let codes: Vec<&str> = totals.iter().map(|t| t.state_code.as_str()).collect();

        assert_eq!(totals.len(), 3);
        assert_eq!(codes[2], "PA");
        // Tie keeps first occurrence
        assert_eq!(codes, vec!["MG", "SP", "PA"]);
        assert_eq!(totals[0].total, Money::from_cents(30000));
    }

    #[test]
    fn test_state_chart_labels_and_figure() {
        let filtered = vec![row(2020, "OURO", "A", "MG", 123456), row(2020, "OURO", "B", "PA", 100)];
        let chart = StateTotalsChart::render(&filtered, Some(2020), Some("OURO"), &CurrencyFormat::pt_br());

        assert_eq!(chart.title, "Distribuição CFEM por estado 2020 - OURO");
        assert_eq!(chart.bars[0].label, "R$ 1.234,56");

        let figure = chart.figure();
        let value = serde_json::to_value(&figure).unwrap();
        assert_eq!(value["data"][0]["type"], json!("bar"));
        assert_eq!(value["data"][0]["x"], json!(["MG", "PA"]));
        assert_eq!(value["data"][0]["y"], json!([1234.56, 1.0]));
        assert_eq!(value["layout"]["xaxis"]["categoryorder"], json!("total descending"));
        assert!(value["data"][0].get("mode").is_none());
    }

    #[test]
    fn test_state_chart_empty() {
        let chart = StateTotalsChart::render(&[], Some(2021), Some("OURO"), &CurrencyFormat::pt_br());
        assert!(chart.is_empty());
        assert!(chart.figure().data[0].x.is_empty());
    }

    #[test]
    fn test_time_series_all_years_ascending() {
        let aggregated = vec![
            row(2021, "OURO", "ITABIRA", "MG", 500),
            row(2019, "OURO", "ITABIRA", "MG", 300),
            row(2020, "FERRO", "ITABIRA", "MG", 999),
            row(2020, "OURO", "MARIANA", "MG", 111),
            row(2020, "OURO", "ITABIRA", "MG", 100),
        ];

        let chart = TimeSeriesChart::render(Some("ITABIRA"), Some("OURO"), &aggregated, &CurrencyFormat::pt_br());

        let years: Vec<i32> = chart.points.iter().map(|p| p.year).collect();
        assert_eq!(years, vec![2019, 2020, 2021]);
        assert_eq!(chart.points[1].label, "Ano: 2020, R$ 1,00");
        assert_eq!(chart.title, "Evolução multitemporal da distribuição da CFEM em ITABIRA - OURO");
    }

    #[test]
    fn test_time_series_sums_homonyms_per_year() {
        let aggregated = vec![
            row(2020, "OURO", "SANTA LUZIA", "MA", 100),
            row(2020, "OURO", "SANTA LUZIA", "MG", 200),
        ];
        let chart = TimeSeriesChart::render(Some("SANTA LUZIA"), Some("OURO"), &aggregated, &CurrencyFormat::pt_br());

        assert_eq!(chart.points.len(), 1);
        assert_eq!(chart.points[0].value, Money::from_cents(300));
    }

    #[test]
    fn test_time_series_sentinel_is_placeholder() {
        let aggregated = vec![row(2020, "OURO", "ITABIRA", "MG", 100)];
        let chart = TimeSeriesChart::render(None, Some("OURO"), &aggregated, &CurrencyFormat::pt_br());

        assert!(chart.is_empty());
        assert!(chart.title.contains(NO_MUNICIPALITY_LABEL));

        let figure = chart.figure();
        assert_eq!(figure.data[0].mode.as_deref(), Some("lines+markers"));
        assert_eq!(figure.layout.yaxis.title, "Valor da CFEM");
    }
}
