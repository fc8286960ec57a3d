//! Navigation context of a request: the context token and the further
//! resources attached to the entities named by the request path.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::catalog::Catalog;
use crate::descriptor::{ResourceDescriptor, ToDescriptor};
use crate::error::RiskError;
use crate::model::{
    AdministrativeDivision, AnalysisType, ContextKey, Dimension, FurtherResource, HazardType,
    RequestPath, RiskAnalysis,
};

/// Keys contributing to the context token, in token order.
pub const CONTEXT_KEYS: [ContextKey; 4] = [
    ContextKey::Ht,
    ContextKey::At,
    ContextKey::An,
    ContextKey::Dym,
];

/// `k/v/.../` over the longest run of present [`CONTEXT_KEYS`], or `None` if the first is absent.
pub fn build_context_token(path: &RequestPath) -> Option<String> {
    let parts: Vec<String> = CONTEXT_KEYS
        .iter()
        .map_while(|key| path.get(*key).map(|value| format!("{}/{}", key.as_str(), value)))
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(format!("{}/", parts.join("/")))
    }
}

/// Further-resource groups, keyed by the names map clients read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResourceCategory {
    /// Linked to the requested analysis type.
    #[serde(rename = "analysisType")]
    AnalysisType,
    /// Linked to the requested dimension.
    #[serde(rename = "hazardSet")]
    Dimension,
    /// Linked to the hazard set of the requested risk analysis.
    #[serde(rename = "hazardType")]
    HazardSet,
}

pub type RelatedResources = BTreeMap<ResourceCategory, Vec<ResourceDescriptor>>;

/// Path keys resolved to catalog entities.
#[derive(Debug, Default)]
struct ContextInputs<'a> {
    hazard_type: Option<&'a HazardType>,
    analysis_type: Option<&'a AnalysisType>,
    risk_analysis: Option<&'a RiskAnalysis>,
    dimension: Option<&'a Dimension>,
    location: Option<&'a AdministrativeDivision>,
}

impl ContextInputs<'_> {
    fn region(&self) -> Option<&str> {
        self.location.and_then(|loc| loc.region.as_deref())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContextResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> ContextResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// One entry per category whose trigger key is present in `path`.
    pub fn gather_related_resources(&self, path: &RequestPath) -> Result<RelatedResources, RiskError> {
        let inputs = self.resolve_inputs(path)?;
        let region = inputs.region();
        let mut out = RelatedResources::new();

        if let Some(at) = inputs.analysis_type {
            let found = self.catalog.resources_for_analysis_type(
                &at.name,
                region,
                inputs.hazard_type.map(|ht| ht.mnemonic.as_str()),
            );
            out.insert(ResourceCategory::AnalysisType, export(found));
        }

        if let Some(dym) = inputs.dimension {
            let found = self.catalog.resources_for_dimension(
                dym.id,
                region,
                inputs.risk_analysis.map(|ra| ra.id),
            );
            out.insert(ResourceCategory::Dimension, export(found));
        }

        if let Some(ra) = inputs.risk_analysis {
            let found = match &ra.hazard_set {
                Some(hazard_set) => self.catalog.resources_for_hazard_set(hazard_set.id, region),
                None => Vec::new(),
            };
            out.insert(ResourceCategory::HazardSet, export(found));
        }

        debug!(
            "Further resources: {:?}",
            out.iter().map(|(k, v)| (*k, v.len())).collect::<Vec<_>>()
        );
        Ok(out)
    }

    fn resolve_inputs(&self, path: &RequestPath) -> Result<ContextInputs<'a>, RiskError> {
        let catalog = self.catalog;
        let mut inputs = ContextInputs::default();

        if let Some(ht) = path.get(ContextKey::Ht) {
            inputs.hazard_type = Some(
                catalog
                    .hazard_type(ht)
                    .ok_or_else(|| RiskError::not_found("Invalid hazard type"))?,
            );
        }
        if let Some(at) = path.get(ContextKey::At) {
            inputs.analysis_type = Some(
                catalog
                    .analysis_type(at)
                    .ok_or_else(|| RiskError::not_found("Invalid analysis type"))?,
            );
        }
        if let Some(an) = path.get(ContextKey::An) {
            inputs.risk_analysis = Some(
                an.parse()
                    .ok()
                    .and_then(|id| catalog.risk_analysis(id))
                    .ok_or_else(|| RiskError::not_found("Invalid risk analysis"))?,
            );
        }
        if let Some(dym) = path.get(ContextKey::Dym) {
            inputs.dimension = Some(
                dym.parse()
                    .ok()
                    .and_then(|id| catalog.dimension(id))
                    .ok_or_else(|| RiskError::not_found("Invalid dimension"))?,
            );
        }
        if let Some(loc) = path.get(ContextKey::Loc) {
            inputs.location = Some(
                catalog
                    .division(loc)
                    .ok_or_else(|| RiskError::not_found("Invalid location code"))?,
            );
        }

        Ok(inputs)
    }
}

fn export(resources: Vec<&FurtherResource>) -> Vec<ResourceDescriptor> {
    resources.into_iter().map(ToDescriptor::to_descriptor).collect()
}
