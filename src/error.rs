// Error taxonomy for the dashboard pipeline
// Fetch and parse failures abort the render pass; empty selections are not errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    /// Remote endpoint unreachable, timed out, or answered with a failure status
    #[error("failed to fetch {url}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// CSV or GeoJSON content does not match the expected schema
    #[error("failed to parse {context}: {message}")]
    Parse { context: String, message: String },

    /// Configuration file could not be read or deserialized
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl DashboardError {
    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        DashboardError::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, DashboardError::Network { .. })
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
