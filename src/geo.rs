// 🗺️ Geo Joiner - municipal boundaries + aggregated rows by name
//
// Features carry the municipality name in `properties.description`.
// Names are uppercased, then matched exactly against `entity_name`.

use crate::aggregate::AggregatedRecord;
use crate::error::{DashboardError, Result};
use geojson::{Feature, FeatureCollection, GeoJson, JsonValue};
use std::collections::HashMap;

pub const NAME_PROPERTY: &str = "description";
pub const YEARS_PROPERTY: &str = "Ano";
pub const SUBSTANCES_PROPERTY: &str = "Substância";
pub const STATES_PROPERTY: &str = "SiglaEstado";
pub const VALUES_PROPERTY: &str = "Valor";

/// Parse a FeatureCollection whose features all carry a string name
pub fn parse_boundaries(bytes: &[u8]) -> Result<FeatureCollection> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DashboardError::parse("boundary GeoJSON", e.to_string()))?;

    let geojson: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| DashboardError::parse("boundary GeoJSON", e.to_string()))?;

    let collection = FeatureCollection::try_from(geojson)
        .map_err(|e| DashboardError::parse("boundary GeoJSON", e.to_string()))?;

    if let Some(idx) = collection.features.iter().position(|f| feature_name(f).is_none()) {
        return Err(DashboardError::parse(
            "boundary GeoJSON",
            format!("feature {} has no string properties.{}", idx, NAME_PROPERTY),
        ));
    }

    Ok(collection)
}

pub fn feature_name(feature: &Feature) -> Option<&str> {
    feature.property(NAME_PROPERTY).and_then(JsonValue::as_str)
}

/// Uppercase every feature name in place
pub fn normalize_names(collection: &mut FeatureCollection) {
    for feature in &mut collection.features {
        if let Some(upper) = feature_name(feature).map(str::to_uppercase) {
            feature.set_property(NAME_PROPERTY, upper);
        }
    }
}

/// Attach per-feature year/substance/state/value arrays.
///
/// Returns a new collection; the input is untouched. Features with no match
/// get empty arrays. Repeated matches are appended in aggregated order.
pub fn attach(collection: &FeatureCollection, aggregated: &[AggregatedRecord]) -> FeatureCollection {
    let mut by_name: HashMap<&str, Vec<&AggregatedRecord>> = HashMap::new();
    for row in aggregated {
        by_name.entry(row.entity_name.as_str()).or_default().push(row);
    }

    let features = collection
        .features
        .iter()
        .map(|feature| {
            let mut joined = feature.clone();
            let name = feature_name(feature).map(str::to_uppercase).unwrap_or_default();
            let matches = by_name.get(name.as_str()).map(Vec::as_slice).unwrap_or(&[]);

            let years: Vec<JsonValue> = matches.iter().map(|r| r.year.into()).collect();
            let substances: Vec<JsonValue> = matches.iter().map(|r| r.substance.clone().into()).collect();
            let states: Vec<JsonValue> = matches.iter().map(|r| r.state_code.clone().into()).collect();
            let values: Vec<JsonValue> = matches.iter().map(|r| r.total_value.as_f64().into()).collect();

            joined.set_property(NAME_PROPERTY, name);
            joined.set_property(YEARS_PROPERTY, years);
            joined.set_property(SUBSTANCES_PROPERTY, substances);
            joined.set_property(STATES_PROPERTY, states);
            joined.set_property(VALUES_PROPERTY, values);
            joined
        })
        .collect();

    FeatureCollection {
        bbox: collection.bbox.clone(),
        features,
        foreign_members: collection.foreign_members.clone(),
    }
}
