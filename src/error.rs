use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the extraction engine and the request flows built on it.
#[derive(Error, Debug)]
pub enum RiskError {
    /// Unknown location, hazard type, analysis type, risk analysis or dimension.
    #[error("{0}")]
    NotFound(String),

    /// A dimension is associated with more than one axis (or none) for a risk analysis.
    #[error("Cannot query more than one axis for dimension '{dimension}' at the moment, got {count}")]
    AmbiguousAxis { dimension: String, count: usize },

    #[error("Risk analysis '{risk_analysis}' must have exactly one dimension on axis x, got {count}")]
    PrimaryDimension { risk_analysis: String, count: usize },

    #[error("Risk analysis '{risk_analysis}' has no feature layer associated with its dimensions")]
    MissingLayer { risk_analysis: String },

    #[error("Feature source error: {0}")]
    DataSource(#[from] DataSourceError),
}

impl RiskError {
    pub fn not_found(message: impl Into<String>) -> Self {
        RiskError::NotFound(message.into())
    }

    /// HTTP-equivalent status for the error.
    pub fn status(&self) -> u16 {
        match self {
            RiskError::NotFound(_) => 404,
            RiskError::DataSource(_) => 502,
            RiskError::AmbiguousAxis { .. }
            | RiskError::PrimaryDimension { .. }
            | RiskError::MissingLayer { .. } => 500,
        }
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            status: self.status(),
            errors: vec![self.to_string()],
        }
    }
}

/// Error-list body returned to clients instead of a partial table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub status: u16,
    pub errors: Vec<String>,
}

/// Failures of the external feature source. Never retried by the engine.
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feature source returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Feature source raised {code}: {message}")]
    ServiceException { code: String, message: String },

    #[error("Failed to decode feature collection: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Feature source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_payload() {
        let err = RiskError::not_found("Invalid location code");
        let payload = err.payload();
        assert_eq!(payload.status, 404);
        assert_eq!(payload.errors, vec!["Invalid location code".to_string()]);
    }

    #[test]
    fn test_data_source_status() {
        let err = RiskError::from(DataSourceError::Status {
            status: 503,
            body: "down".to_string(),
        });
        assert_eq!(err.status(), 502);
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn test_ambiguous_axis_message_names_count() {
        let err = RiskError::AmbiguousAxis {
            dimension: "Scenario".to_string(),
            count: 2,
        };
        assert_eq!(err.status(), 500);
        assert!(err.to_string().ends_with("got 2"));
    }
}
