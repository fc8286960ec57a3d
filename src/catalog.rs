//! Read-only store of the risk entities the engine resolves against.
//!
//! The catalog is loaded once (from a JSON document) and shared by every
//! request; nothing in the engine mutates it.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::CatalogError;
use crate::model::{
    AdministrativeDivision, AnalysisType, Dimension, DimensionAssociation, DimensionId,
    FurtherResource, HazardSetId, HazardType, ResourceLink, RiskAnalysis, RiskAnalysisId,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub hazard_types: Vec<HazardType>,
    #[serde(default)]
    pub analysis_types: Vec<AnalysisType>,
    #[serde(default)]
    pub risk_analyses: Vec<RiskAnalysis>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub associations: Vec<DimensionAssociation>,
    #[serde(default)]
    pub divisions: Vec<AdministrativeDivision>,
    #[serde(default)]
    pub further_resources: Vec<FurtherResource>,
}

impl Catalog {
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let file = File::open(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog: Catalog = serde_json::from_reader(BufReader::new(file))?;
        debug!(
            "Loaded catalog from {:?}: {} risk analyses, {} dimensions, {} divisions",
            path,
            catalog.risk_analyses.len(),
            catalog.dimensions.len(),
            catalog.divisions.len()
        );
        Ok(catalog)
    }

    pub fn from_json_str(document: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn hazard_type(&self, mnemonic: &str) -> Option<&HazardType> {
        self.hazard_types.iter().find(|ht| ht.mnemonic == mnemonic)
    }

    pub fn analysis_type(&self, name: &str) -> Option<&AnalysisType> {
        self.analysis_types.iter().find(|at| at.name == name)
    }

    /// Analysis types of a hazard type, in the hazard type's order.
    pub fn analysis_types_for(&self, hazard_type: &HazardType) -> Vec<&AnalysisType> {
        hazard_type
            .analysis_types
            .iter()
            .filter_map(|name| {
                let found = self.analysis_type(name);
                if found.is_none() {
                    warn!(
                        "Hazard type {} references unknown analysis type {}",
                        hazard_type.mnemonic, name
                    );
                }
                found
            })
            .collect()
    }

    pub fn risk_analysis(&self, id: RiskAnalysisId) -> Option<&RiskAnalysis> {
        self.risk_analyses.iter().find(|ra| ra.id == id)
    }

    /// Risk analyses of a hazard type covering a location, optionally restricted to one analysis type.
    pub fn risk_analyses_for(
        &self,
        hazard_type: &str,
        analysis_type: Option<&str>,
        location_code: &str,
    ) -> Vec<&RiskAnalysis> {
        self.risk_analyses
            .iter()
            .filter(|ra| ra.hazard_type == hazard_type)
            .filter(|ra| analysis_type.map_or(true, |at| ra.analysis_type == at))
            .filter(|ra| ra.covers(location_code))
            .collect()
    }

    pub fn dimension(&self, id: DimensionId) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.id == id)
    }

    /// Distinct dimensions of a risk analysis, in order of their first association.
    pub fn dimensions_of(&self, risk_analysis: &RiskAnalysis) -> Vec<&Dimension> {
        let mut out: Vec<&Dimension> = Vec::new();
        for association in self
            .associations
            .iter()
            .filter(|a| a.risk_analysis == risk_analysis.id)
        {
            if out.iter().any(|d| d.id == association.dimension) {
                continue;
            }
            match self.dimension(association.dimension) {
                Some(dimension) => out.push(dimension),
                None => warn!(
                    "Risk analysis {} references unknown dimension {}",
                    risk_analysis.name, association.dimension
                ),
            }
        }
        out
    }

    pub fn associations(
        &self,
        risk_analysis: RiskAnalysisId,
        dimension: DimensionId,
    ) -> Vec<&DimensionAssociation> {
        self.associations
            .iter()
            .filter(|a| a.risk_analysis == risk_analysis && a.dimension == dimension)
            .collect()
    }

    pub fn division(&self, code: &str) -> Option<&AdministrativeDivision> {
        self.divisions.iter().find(|d| d.code == code)
    }

    pub fn resources_for_analysis_type(
        &self,
        analysis_type: &str,
        region: Option<&str>,
        hazard_type: Option<&str>,
    ) -> Vec<&FurtherResource> {
        self.resources_where(|link| match link {
            ResourceLink::AnalysisType {
                analysis_type: at,
                hazard_type: ht,
                region: r,
            } => at == analysis_type && narrows(ht.as_deref(), hazard_type) && narrows(r.as_deref(), region),
            _ => false,
        })
    }

    pub fn resources_for_dimension(
        &self,
        dimension: DimensionId,
        region: Option<&str>,
        risk_analysis: Option<RiskAnalysisId>,
    ) -> Vec<&FurtherResource> {
        self.resources_where(|link| match link {
            ResourceLink::Dimension {
                dimension: dym,
                risk_analysis: ra,
                region: r,
            } => *dym == dimension && narrows(ra.as_ref(), risk_analysis.as_ref()) && narrows(r.as_deref(), region),
            _ => false,
        })
    }

    pub fn resources_for_hazard_set(
        &self,
        hazard_set: HazardSetId,
        region: Option<&str>,
    ) -> Vec<&FurtherResource> {
        self.resources_where(|link| match link {
            ResourceLink::HazardSet {
                hazard_set: hs,
                region: r,
            } => *hs == hazard_set && narrows(r.as_deref(), region),
            _ => false,
        })
    }

    fn resources_where<F>(&self, matches: F) -> Vec<&FurtherResource>
    where
        F: Fn(&ResourceLink) -> bool,
    {
        self.further_resources
            .iter()
            .filter(|res| res.links.iter().any(&matches))
            .collect()
    }
}

/// A link attribute narrows a query only when set: unset matches anything.
fn narrows<T: PartialEq + ?Sized>(linked: Option<&T>, requested: Option<&T>) -> bool {
    match linked {
        None => true,
        Some(value) => requested == Some(value),
    }
}
