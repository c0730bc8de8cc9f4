// 🎨 Choropleth Renderer
//
// Colors joined municipality polygons by distributed value on a quantile
// RdYlGn scale and attaches tooltip values. The output serializes to the
// JSON the web client feeds into Leaflet.

use crate::aggregate::AggregatedRecord;
use crate::dashboard::NO_YEAR_LABEL;
use crate::geo::{feature_name, NAME_PROPERTY, VALUES_PROPERTY};
use crate::money::{CurrencyFormat, Money};
use geojson::{FeatureCollection, JsonValue};
use serde::Serialize;
use std::collections::HashMap;

/// ColorBrewer RdYlGn, 6 classes
pub const RDYLGN: [&str; 6] = ["#d73027", "#fc8d59", "#fee08b", "#d9ef8b", "#91cf60", "#1a9850"];
pub const MAX_BINS: usize = RDYLGN.len();

/// Per-feature fill color; null when the municipality has no data
pub const FILL_PROPERTY: &str = "fill_color";

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MapSettings {
    pub center: [f64; 2],
    pub zoom: u8,
    pub tiles: String,
    pub layer_name: String,
    pub fill_opacity: f64,
    pub line_color: String,
    pub line_opacity: f64,
    pub no_data_color: String,
}

impl Default for MapSettings {
    fn default() -> Self {
        MapSettings {
            center: [-16.39374927779391, -51.663956293293964],
            zoom: 4,
            tiles: "openstreetmap".to_string(),
            layer_name: "Mapa cloroplético completo".to_string(),
            fill_opacity: 0.7,
            line_color: "white".to_string(),
            line_opacity: 0.3,
            no_data_color: "black".to_string(),
        }
    }
}

// ============================================================================
// COLOR SCALE
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColorBin {
    pub lower: f64,
    pub upper: f64,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct ColorScale {
    pub bins: Vec<ColorBin>,
}

/// Quantile with linear interpolation between closest ranks
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl ColorScale {
    /// MAX_BINS quantile bins over the given values, fewer only when edges coincide
    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return ColorScale::default();
        }
        sorted.sort_by(f64::total_cmp);

        // Always MAX_BINS nominal bins; only coincident edges collapse
        let mut edges: Vec<f64> = (0..=MAX_BINS)
            .map(|i| quantile(&sorted, i as f64 / MAX_BINS as f64))
            .collect();
        edges.dedup();
        if edges.len() == 1 {
            edges.push(edges[0]);
        }

        let n = edges.len() - 1;
        let bins = edges
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let color_idx = if n == 1 { MAX_BINS - 1 } else { i * (MAX_BINS - 1) / (n - 1) };
                ColorBin {
                    lower: pair[0],
                    upper: pair[1],
                    color: RDYLGN[color_idx].to_string(),
                }
            })
            .collect();

        ColorScale { bins }
    }

    pub fn color_for(&self, value: f64) -> Option<&str> {
        let last = self.bins.last()?;
        let bin = self
            .bins
            .iter()
            .find(|bin| value <= bin.upper)
            .unwrap_or(last);
        Some(bin.color.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

// ============================================================================
// MAP
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Tooltip {
    pub fields: Vec<String>,
    pub aliases: Vec<String>,
}

impl Default for Tooltip {
    fn default() -> Self {
        Tooltip {
            fields: vec![NAME_PROPERTY.to_string(), VALUES_PROPERTY.to_string()],
            aliases: vec!["Município:".to_string(), "Valor de distribuição CFEM:".to_string()],
        }
    }
}

/// Display artifact for the map panel
#[derive(Debug, Clone, Serialize)]
pub struct ChoroplethMap {
    pub settings: MapSettings,
    pub legend_name: String,
    pub scale: ColorScale,
    pub tooltip: Tooltip,
    pub geocoder: bool,
    pub layer_control: bool,
    pub layer: FeatureCollection,
}

impl ChoroplethMap {
    /// Number of polygons that received a data color
    pub fn colored_feature_count(&self) -> usize {
        self.layer
            .features
            .iter()
            .filter(|f| matches!(f.property(FILL_PROPERTY), Some(JsonValue::String(_))))
            .count()
    }
}

/// Tooltip value: currency string when matched, bare 0 when not
pub fn tooltip_value(value: Option<Money>, currency: &CurrencyFormat) -> JsonValue {
    match value {
        Some(amount) => JsonValue::String(currency.format(amount)),
        None => JsonValue::from(0),
    }
}

/// Color and annotate a joined collection for the current filter
pub fn render(
    joined: &FeatureCollection,
    filtered: &[AggregatedRecord],
    year: Option<i32>,
    settings: &MapSettings,
    currency: &CurrencyFormat,
) -> ChoroplethMap {
    // Color key: name -> summed value; tooltip: first matching row
    let mut value_by_name: HashMap<&str, Money> = HashMap::new();
    let mut first_by_name: HashMap<&str, Money> = HashMap::new();
    for row in filtered {
        *value_by_name.entry(row.entity_name.as_str()).or_insert(Money::ZERO) += row.total_value;
        first_by_name.entry(row.entity_name.as_str()).or_insert(row.total_value);
    }

    let present: Vec<f64> = joined
        .features
        .iter()
        .filter_map(feature_name)
        .filter_map(|name| value_by_name.get(name))
        .map(Money::as_f64)
        .collect();
    let scale = ColorScale::from_values(&present);

    let mut layer = joined.clone();
    for feature in &mut layer.features {
        let name = feature_name(feature).unwrap_or_default().to_string();

        let fill = value_by_name
            .get(name.as_str())
            .and_then(|v| scale.color_for(v.as_f64()))
            .map(|c| JsonValue::String(c.to_string()))
            .unwrap_or(JsonValue::Null);

        feature.set_property(FILL_PROPERTY, fill);
        feature.set_property(
            VALUES_PROPERTY,
            tooltip_value(first_by_name.get(name.as_str()).copied(), currency),
        );
    }

    let legend_name = match year {
        Some(y) => format!("CFEM {}", y),
        None => format!("CFEM {}", NO_YEAR_LABEL),
    };

    ChoroplethMap {
        settings: settings.clone(),
        legend_name,
        scale,
        tooltip: Tooltip::default(),
        geocoder: true,
        layer_control: true,
        layer,
    }
}
