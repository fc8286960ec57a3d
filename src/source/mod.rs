//! Access to the external geospatial feature source.

pub mod wfs;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::association::DimensionAssociationResolver;
use crate::catalog::Catalog;
use crate::error::{DataSourceError, RiskError};
use crate::model::{ContextKey, Dimension, RequestPath, RiskAnalysis};

/// Source-specific filter name -> value.
pub type QueryParams = BTreeMap<String, String>;

/// Request keys forwarded to the feature source, and the names it expects.
pub const FILTER_MAPPING: &[(ContextKey, &str)] = &[
    (ContextKey::Loc, "adm_code"),
    (ContextKey::Ht, "hazard_type"),
];

pub const RISK_ANALYSIS_PARAM: &str = "risk_analysis";

/// Measurement property of every feature.
pub const MEASUREMENT_FIELD: &str = "value";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<RawFeature>,
}

/// A GeoJSON feature; only its properties are read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFeature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl RawFeature {
    pub fn from_properties(properties: Map<String, Value>) -> Self {
        Self {
            id: None,
            properties: Some(properties),
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.as_ref().and_then(|p| p.get(name))
    }
}

/// Contract of the geospatial feature source.
pub trait FeatureSource {
    fn fetch_features(
        &self,
        layer: &str,
        primary_field: &str,
        params: &QueryParams,
    ) -> Result<FeatureCollection, DataSourceError>;
}

/// Rename the recognized request keys to the source's filter names; others are dropped.
pub fn filters_to_query_params(path: &RequestPath) -> QueryParams {
    FILTER_MAPPING
        .iter()
        .filter_map(|(key, name)| {
            path.get(*key)
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}

pub struct FeatureQueryAdapter<'a, S: FeatureSource + ?Sized> {
    resolver: DimensionAssociationResolver<'a>,
    source: &'a S,
}

impl<'a, S: FeatureSource + ?Sized> FeatureQueryAdapter<'a, S> {
    pub fn new(catalog: &'a Catalog, source: &'a S) -> Self {
        Self {
            resolver: DimensionAssociationResolver::new(catalog),
            source,
        }
    }

    /// Query the layer backing a risk analysis' dimensions.
    pub fn fetch(
        &self,
        risk_analysis: &RiskAnalysis,
        primary: &Dimension,
        dimensions: &[&Dimension],
        filters: &RequestPath,
    ) -> Result<FeatureCollection, RiskError> {
        let mapping = self
            .resolver
            .resolve_field_mapping(risk_analysis, primary, dimensions)?;

        let layer = mapping
            .layers
            .first()
            .ok_or_else(|| RiskError::MissingLayer {
                risk_analysis: risk_analysis.name.clone(),
            })?;
        if mapping.layers.len() > 1 {
            // TODO: decide how multi-layer dimension sets should be merged
            warn!(
                "Risk analysis {} spans {} layers, querying only {}",
                risk_analysis.name,
                mapping.layers.len(),
                layer
            );
        }

        let mut params = filters_to_query_params(filters);
        params.insert(RISK_ANALYSIS_PARAM.to_string(), risk_analysis.name.clone());

        let primary_field = mapping.fields[0];
        info!(
            "Fetching features of {} from layer {} (primary {})",
            risk_analysis.name, layer, primary_field
        );
        let features = self.source.fetch_features(layer, primary_field, &params)?;
        debug!("Feature source returned {} features", features.features.len());
        Ok(features)
    }
}
