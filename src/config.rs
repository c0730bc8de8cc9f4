// ⚙️ Dashboard configuration
// TOML file (optional) + environment overrides, with built-in defaults

use crate::error::{DashboardError, Result};
use crate::money::CurrencyFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_CSV_URL: &str =
    "https://app.anm.gov.br/DadosAbertos/ARRECADACAO/CFEM_Distribuicao.csv";
pub const DEFAULT_GEOJSON_URL: &str =
    "https://raw.githubusercontent.com/jonates/opendata/master/arquivos_geoespaciais/geojs-100-mun.json";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "CFEM_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Distribution CSV endpoint
    pub csv_url: String,

    /// Municipal boundaries GeoJSON endpoint
    pub geojson_url: String,

    /// Server listen address
    pub bind: String,

    /// HTTP timeout for both downloads
    pub request_timeout_secs: u64,

    /// Currency locale code ("pt-BR", "en-US")
    pub locale: String,

    /// Initial substance; none selected when absent
    pub default_substance: Option<String>,

    /// Initial year; latest year in the data when absent
    pub default_year: Option<i32>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            csv_url: DEFAULT_CSV_URL.to_string(),
            geojson_url: DEFAULT_GEOJSON_URL.to_string(),
            bind: DEFAULT_BIND.to_string(),
            request_timeout_secs: 120,
            locale: "pt-BR".to_string(),
            default_substance: None,
            default_year: None,
        }
    }
}

impl DashboardConfig {
    /// Load from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| DashboardError::Config {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DashboardConfig = toml::from_str(content).map_err(|e| DashboardError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration: explicit path, then CFEM_CONFIG, then defaults.
    /// Environment overrides are applied last.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var(CONFIG_ENV) {
                Ok(path) if !path.is_empty() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply CFEM_BIND / CFEM_CSV_URL / CFEM_GEOJSON_URL overrides
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("CFEM_BIND") {
            self.bind = bind;
        }
        if let Some(url) = lookup("CFEM_CSV_URL") {
            self.csv_url = url;
        }
        if let Some(url) = lookup("CFEM_GEOJSON_URL") {
            self.geojson_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.currency_format().is_none() {
            return Err(DashboardError::Config {
                message: format!("unsupported locale: {}", self.locale),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(DashboardError::Config {
                message: "request_timeout_secs must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn currency_format(&self) -> Option<CurrencyFormat> {
        CurrencyFormat::from_locale(&self.locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_point_at_public_endpoints() {
        let config = DashboardConfig::default();
        assert_eq!(config.csv_url, DEFAULT_CSV_URL);
        assert_eq!(config.geojson_url, DEFAULT_GEOJSON_URL);
        assert!(config.validate().is_ok());
        assert_eq!(config.currency_format(), Some(CurrencyFormat::pt_br()));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DashboardConfig::from_toml(
            r#"
            bind = "127.0.0.1:8080"
            default_substance = "OURO"
            default_year = 2023
            "#,
        )
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1:8080");
        assert_eq!(config.default_substance.as_deref(), Some("OURO"));
        assert_eq!(config.default_year, Some(2023));
        assert_eq!(config.csv_url, DEFAULT_CSV_URL);
    }

    #[test]
    fn test_rejects_unknown_locale() {
        let err = DashboardConfig::from_toml(r#"locale = "de-DE""#).unwrap_err();
        assert!(matches!(err, DashboardError::Config { .. }));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = DashboardConfig::from_toml("bind = ").unwrap_err();
        assert!(matches!(err, DashboardError::Config { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CFEM_BIND", "127.0.0.1:9000"),
            ("CFEM_CSV_URL", "http://localhost/cfem.csv"),
        ]
        .into_iter()
        .collect();

        let mut config = DashboardConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.csv_url, "http://localhost/cfem.csv");
        assert_eq!(config.geojson_url, DEFAULT_GEOJSON_URL);
    }
}
