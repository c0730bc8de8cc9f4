// 📥 Data Loader - CFEM distribution CSV + boundary GeoJSON
//
// Remote fetch (blocking reqwest), schema-checked CSV parsing, and a
// process-lifetime cache that initializes once and never invalidates.

use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::geo::{normalize_names, parse_boundaries};
use crate::money::Money;
use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Column names of the published CSV, in publication order
pub const EXPECTED_COLUMNS: [&str; 10] = [
    "NúmeroDeDistribuição",
    "Ano",
    "Mês",
    "Ente",
    "SiglaEstado",
    "NomeEnte",
    "TipoDistribuição",
    "Substância",
    "TipoAfetamento",
    "Valor",
];

// ============================================================================
// RECORDS
// ============================================================================

/// One disbursement, projected to the five columns the dashboard uses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionRecord {
    pub year: i32,
    pub substance: String,
    pub value: Money,
    pub entity_name: String,
    pub state_code: String,
}

impl DistributionRecord {
    pub fn new(
        year: i32,
        substance: &str,
        value: Money,
        entity_name: &str,
        state_code: &str,
    ) -> Self {
        DistributionRecord {
            year,
            substance: substance.to_string(),
            value,
            entity_name: entity_name.to_string(),
            state_code: state_code.to_string(),
        }
    }
}

/// Full CSV row. Every column is typed so a schema drift fails the load,
/// even for columns the projection drops.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawDistributionRow {
    #[serde(rename = "NúmeroDeDistribuição")]
    distribution_number: i64,
    #[serde(rename = "Ano")]
    year: i32,
    #[serde(rename = "Mês")]
    month: u32,
    #[serde(rename = "Ente")]
    entity_kind: String,
    #[serde(rename = "SiglaEstado")]
    state_code: String,
    #[serde(rename = "NomeEnte")]
    entity_name: String,
    #[serde(rename = "TipoDistribuição")]
    distribution_type: String,
    #[serde(rename = "Substância")]
    substance: String,
    #[serde(rename = "TipoAfetamento")]
    affectation_type: String,
    #[serde(rename = "Valor")]
    value: String,
}

/// Loaded dataset plus provenance
#[derive(Debug, Clone)]
pub struct Dataset {
    pub records: Vec<DistributionRecord>,
    pub loaded_at: DateTime<Utc>,
    pub source: String,
}

impl Dataset {
    pub fn new(records: Vec<DistributionRecord>, source: impl Into<String>) -> Self {
        Dataset {
            records,
            loaded_at: Utc::now(),
            source: source.into(),
        }
    }
}

// ============================================================================
// CSV PARSING
// ============================================================================

/// Decode as UTF-8 when valid, Latin-1 otherwise. Strips a leading BOM.
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| b as char).collect::<String>()),
    };

    match text {
        Cow::Borrowed(s) => Cow::Borrowed(s.trim_start_matches('\u{feff}')),
        Cow::Owned(s) => match s.strip_prefix('\u{feff}') {
            Some(stripped) => Cow::Owned(stripped.to_string()),
            None => Cow::Owned(s),
        },
    }
}

fn check_header(header: &csv::StringRecord) -> Result<()> {
    let found: Vec<&str> = header.iter().map(str::trim).collect();

    let missing: Vec<&str> = EXPECTED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !found.contains(col))
        .collect();
    let unexpected: Vec<&str> = found
        .iter()
        .copied()
        .filter(|col| !EXPECTED_COLUMNS.contains(col))
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }

    Err(DashboardError::parse(
        "distribution CSV header",
        format!(
            "missing columns [{}], unexpected columns [{}]",
            missing.join(", "),
            unexpected.join(", ")
        ),
    ))
}

/// Parse the distribution CSV (`;`-delimited, comma decimals)
pub fn parse_distributions(bytes: &[u8]) -> Result<Vec<DistributionRecord>> {
    let text = decode_text(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .quote(b'"')
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let header = reader
        .headers()
        .map_err(|e| DashboardError::parse("distribution CSV header", e.to_string()))?
        .clone();
    check_header(&header)?;

    let mut records = Vec::new();

    for (idx, result) in reader.deserialize::<RawDistributionRow>().enumerate() {
        let line = idx + 2; // 1-indexed + header row
        let row = result
            .map_err(|e| DashboardError::parse("distribution CSV", format!("line {}: {}", line, e)))?;

        let value = Money::parse_comma_decimal(&row.value).ok_or_else(|| {
            DashboardError::parse(
                "distribution CSV",
                format!("line {}: invalid Valor {:?}", line, row.value),
            )
        })?;

        records.push(DistributionRecord {
            year: row.year,
            substance: row.substance,
            value,
            entity_name: row.entity_name,
            state_code: row.state_code,
        });
    }

    debug!(rows = records.len(), "parsed distribution CSV");
    Ok(records)
}

// ============================================================================
// SOURCES
// ============================================================================

/// Where the dashboard gets its raw data
pub trait DatasetSource: Send + Sync {
    fn fetch_distributions(&self) -> Result<Vec<DistributionRecord>>;

    /// Boundary collection with names already uppercased
    fn fetch_boundaries(&self) -> Result<FeatureCollection>;

    /// Short label for logs and the health endpoint
    fn describe(&self) -> String;
}

/// HTTPS source for the published CSV and GeoJSON
pub struct RemoteSource {
    client: reqwest::blocking::Client,
    csv_url: String,
    geojson_url: String,
}

impl RemoteSource {
    pub fn new(csv_url: &str, geojson_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cfem-choropleth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| DashboardError::Network {
                url: csv_url.to_string(),
                source,
            })?;

        Ok(RemoteSource {
            client,
            csv_url: csv_url.to_string(),
            geojson_url: geojson_url.to_string(),
        })
    }

    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        Self::new(
            &config.csv_url,
            &config.geojson_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let started = Instant::now();
        info!(url, "fetching");

        let network = |source| DashboardError::Network {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(network)?;
        let body = response.bytes().map_err(network)?;

        info!(
            url,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched"
        );
        Ok(body.to_vec())
    }
}

impl DatasetSource for RemoteSource {
    fn fetch_distributions(&self) -> Result<Vec<DistributionRecord>> {
        let bytes = self.fetch_bytes(&self.csv_url)?;
        parse_distributions(&bytes)
    }

    fn fetch_boundaries(&self) -> Result<FeatureCollection> {
        let bytes = self.fetch_bytes(&self.geojson_url)?;
        let mut collection = parse_boundaries(&bytes)?;
        normalize_names(&mut collection);
        Ok(collection)
    }

    fn describe(&self) -> String {
        self.csv_url.clone()
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Process-lifetime cache with lazy single initialization.
///
/// Values live in `OnceLock`s, so readers never wait. Loads are serialized
/// by a separate init lock: concurrent first requests wait for the one
/// download instead of starting their own. Failed loads leave the slot empty.
pub struct DatasetCache<S: DatasetSource> {
    source: S,
    distributions: OnceLock<Arc<Dataset>>,
    boundaries: OnceLock<Arc<FeatureCollection>>,
    distributions_init: Mutex<()>,
    boundaries_init: Mutex<()>,
}

impl<S: DatasetSource> DatasetCache<S> {
    pub fn new(source: S) -> Self {
        DatasetCache {
            source,
            distributions: OnceLock::new(),
            boundaries: OnceLock::new(),
            distributions_init: Mutex::new(()),
            boundaries_init: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn distributions(&self) -> Result<Arc<Dataset>> {
        if let Some(dataset) = self.distributions.get() {
            return Ok(Arc::clone(dataset));
        }

        let _init = self
            .distributions_init
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Another caller may have finished while we waited
        if let Some(dataset) = self.distributions.get() {
            return Ok(Arc::clone(dataset));
        }

        let records = self.source.fetch_distributions().map_err(|e| {
            warn!(error = %e, "distribution load failed");
            e
        })?;
        let dataset = Arc::new(Dataset::new(records, self.source.describe()));
        info!(
            records = dataset.records.len(),
            source = %dataset.source,
            "distribution dataset cached"
        );

        Ok(Arc::clone(self.distributions.get_or_init(|| dataset)))
    }

    pub fn boundaries(&self) -> Result<Arc<FeatureCollection>> {
        if let Some(collection) = self.boundaries.get() {
            return Ok(Arc::clone(collection));
        }

        let _init = self
            .boundaries_init
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(collection) = self.boundaries.get() {
            return Ok(Arc::clone(collection));
        }

        let collection = Arc::new(self.source.fetch_boundaries().map_err(|e| {
            warn!(error = %e, "boundary load failed");
            e
        })?);
        info!(features = collection.features.len(), "boundary collection cached");

        Ok(Arc::clone(self.boundaries.get_or_init(|| collection)))
    }

    /// Load time of the cached dataset. Never fetches and never waits on a
    /// load in progress.
    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.distributions.get().map(|d| d.loaded_at)
    }
}

// ============================================================================
// TESTS
// ============================================================================
