//! Request flows built on the engine: location overview, hazard overview and
//! data extraction. Each returns a typed payload or a [`RiskError`]; no flow
//! ever returns a partial table.

use serde::Serialize;
use tracing::info;

use crate::association::DimensionAssociationResolver;
use crate::catalog::Catalog;
use crate::context::{build_context_token, ContextResolver, RelatedResources};
use crate::descriptor::{
    AnalysisTypeDescriptor, HazardSetDescriptor, HazardTypeDescriptor, LocationDescriptor,
    RiskAnalysisDescriptor, ToDescriptor,
};
use crate::error::RiskError;
use crate::location::LocationHierarchyResolver;
use crate::model::{
    AdministrativeDivision, AnalysisType, ContextKey, Dimension, HazardType, RequestPath,
    RiskAnalysis,
};
use crate::reshape::{DimensionalReshaper, ReshapedTable};
use crate::source::{FeatureQueryAdapter, FeatureSource};

const INVALID_HAZARD_TYPE: &str = "Invalid hazard type";
const NO_ANALYSIS_TYPE: &str = "No analysis type available for location/hazard type";
const NO_RISK_ANALYSIS: &str = "No risk analysis found for given parameters";
const INVALID_DIMENSION: &str = "Invalid dimension";
const INVALID_RISK_ID: &str = "Invalid risk id";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardSummary {
    pub mnemonic: String,
    pub title: String,
    /// Risk analyses of this hazard type covering the location.
    pub risk_analysis: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationOverview {
    pub nav_items: Vec<LocationDescriptor>,
    pub context: Option<String>,
    pub further_resources: RelatedResources,
    pub overview: Vec<HazardSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardDetails {
    #[serde(flatten)]
    pub hazard_type: HazardTypeDescriptor,
    pub analysis_types: Vec<AnalysisTypeDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDetails {
    pub name: String,
    pub title: String,
    pub description: String,
    pub risk_analysis: Vec<RiskAnalysisDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardOverview {
    pub nav_items: Vec<LocationDescriptor>,
    pub overview: Vec<HazardSummary>,
    pub context: Option<String>,
    pub further_resources: RelatedResources,
    pub hazard_type: HazardDetails,
    pub analysis_type: AnalysisDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAnalysisData {
    pub name: String,
    pub descriptor_file: String,
    pub data_file: String,
    pub metadata_file: String,
    pub hazard_set: Option<HazardSetDescriptor>,
    pub data: ReshapedTable,
    /// `(id, typename)` pairs.
    pub additional_layers: Vec<(u64, String)>,
}

/// What a map client needs to render the extracted layer over WMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WmsDescriptor {
    pub style: Option<String>,
    pub viewparams: String,
    pub baseurl: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataExtraction {
    pub risk_analysis_data: RiskAnalysisData,
    pub context: Option<String>,
    pub wms: WmsDescriptor,
    pub further_resources: RelatedResources,
}

/// Typenames of the layers rendered alongside a risk analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskLayers {
    pub layers: Vec<String>,
}

pub struct RiskDataService<'a, S: FeatureSource + ?Sized> {
    catalog: &'a Catalog,
    source: &'a S,
    public_location: String,
}

impl<'a, S: FeatureSource + ?Sized> RiskDataService<'a, S> {
    /// `public_location` is the WMS base URL handed to clients.
    pub fn new(catalog: &'a Catalog, source: &'a S, public_location: impl Into<String>) -> Self {
        Self {
            catalog,
            source,
            public_location: public_location.into(),
        }
    }

    pub fn location_overview(&self, path: &RequestPath) -> Result<LocationOverview, RiskError> {
        let locations = self.locations(path)?;
        let location = last(&locations)?;
        info!("Location overview for {}", location.code);

        Ok(LocationOverview {
            nav_items: export_locations(&locations),
            context: build_context_token(path),
            further_resources: ContextResolver::new(self.catalog).gather_related_resources(path)?,
            overview: self.hazard_summaries(location),
        })
    }

    pub fn hazard_overview(&self, path: &RequestPath) -> Result<HazardOverview, RiskError> {
        let locations = self.locations(path)?;
        let location = last(&locations)?;
        let hazard_type = self.hazard_type(path)?;
        let analysis_type = self.analysis_type(hazard_type, path)?;
        info!(
            "Hazard overview for {}/{}/{}",
            location.code, hazard_type.mnemonic, analysis_type.name
        );

        let risk_analysis = self
            .catalog
            .risk_analyses_for(&hazard_type.mnemonic, Some(&analysis_type.name), &location.code)
            .into_iter()
            .map(ToDescriptor::to_descriptor)
            .collect();

        Ok(HazardOverview {
            nav_items: export_locations(&locations),
            overview: self.hazard_summaries(location),
            context: build_context_token(path),
            further_resources: ContextResolver::new(self.catalog).gather_related_resources(path)?,
            hazard_type: HazardDetails {
                hazard_type: hazard_type.to_descriptor(),
                analysis_types: self
                    .catalog
                    .analysis_types_for(hazard_type)
                    .into_iter()
                    .map(ToDescriptor::to_descriptor)
                    .collect(),
            },
            analysis_type: AnalysisDetails {
                name: analysis_type.name.clone(),
                title: analysis_type.title.clone(),
                description: analysis_type.description.clone(),
                risk_analysis,
            },
        })
    }

    /// Fetch, reshape and package the data of the risk analysis named by `path`.
    pub fn extract(&self, path: &RequestPath) -> Result<DataExtraction, RiskError> {
        let locations = self.locations(path)?;
        let location = last(&locations)?;
        let hazard_type = self.hazard_type(path)?;
        let analysis_type = self.analysis_type(hazard_type, path)?;
        let risk_analysis = self.risk_analysis(hazard_type, analysis_type, location, path)?;

        let dimensions = self.catalog.dimensions_of(risk_analysis);
        let primary = self.primary_dimension(risk_analysis, &dimensions, path)?;
        info!(
            "Extracting {} at {} (primary dimension {})",
            risk_analysis.name, location.code, primary.name
        );

        let features = FeatureQueryAdapter::new(self.catalog, self.source).fetch(
            risk_analysis,
            primary,
            &dimensions,
            path,
        )?;
        let data = DimensionalReshaper::new(self.catalog).reshape(
            risk_analysis,
            primary,
            &dimensions,
            &features.features,
        )?;

        Ok(DataExtraction {
            risk_analysis_data: RiskAnalysisData {
                name: risk_analysis.name.clone(),
                descriptor_file: risk_analysis.descriptor_file.clone(),
                data_file: risk_analysis.data_file.clone(),
                metadata_file: risk_analysis.metadata_file.clone(),
                hazard_set: risk_analysis
                    .hazard_set
                    .as_ref()
                    .map(ToDescriptor::to_descriptor),
                data,
                additional_layers: risk_analysis
                    .additional_layers
                    .iter()
                    .map(|layer| (layer.id, layer.typename.clone()))
                    .collect(),
            },
            context: build_context_token(path),
            wms: WmsDescriptor {
                style: None,
                viewparams: viewparams(risk_analysis, hazard_type, location),
                baseurl: self.public_location.clone(),
            },
            further_resources: ContextResolver::new(self.catalog).gather_related_resources(path)?,
        })
    }

    pub fn risk_layers(&self, risk_id: &str) -> Result<RiskLayers, RiskError> {
        let risk_analysis = risk_id
            .parse()
            .ok()
            .and_then(|id| self.catalog.risk_analysis(id))
            .ok_or_else(|| RiskError::not_found(INVALID_RISK_ID))?;

        Ok(RiskLayers {
            layers: risk_analysis
                .additional_layers
                .iter()
                .map(|layer| layer.typename.clone())
                .collect(),
        })
    }

    fn locations(&self, path: &RequestPath) -> Result<Vec<&'a AdministrativeDivision>, RiskError> {
        let code = path
            .get(ContextKey::Loc)
            .ok_or_else(|| RiskError::not_found(crate::location::INVALID_LOCATION))?;
        LocationHierarchyResolver::new(self.catalog).resolve(code)
    }

    fn hazard_summaries(&self, location: &AdministrativeDivision) -> Vec<HazardSummary> {
        self.catalog
            .hazard_types
            .iter()
            .map(|ht| HazardSummary {
                mnemonic: ht.mnemonic.clone(),
                title: ht.title.clone(),
                risk_analysis: self
                    .catalog
                    .risk_analyses_for(&ht.mnemonic, None, &location.code)
                    .len(),
            })
            .collect()
    }

    fn hazard_type(&self, path: &RequestPath) -> Result<&'a HazardType, RiskError> {
        path.get(ContextKey::Ht)
            .and_then(|ht| self.catalog.hazard_type(ht))
            .ok_or_else(|| RiskError::not_found(INVALID_HAZARD_TYPE))
    }

    /// The requested analysis type of the hazard, or its first one.
    fn analysis_type(
        &self,
        hazard_type: &HazardType,
        path: &RequestPath,
    ) -> Result<&'a AnalysisType, RiskError> {
        let available = self.catalog.analysis_types_for(hazard_type);
        let found = match path.get(ContextKey::At) {
            Some(name) => available.into_iter().find(|at| at.name == name),
            None => available.into_iter().next(),
        };
        found.ok_or_else(|| RiskError::not_found(NO_ANALYSIS_TYPE))
    }

    fn risk_analysis(
        &self,
        hazard_type: &HazardType,
        analysis_type: &AnalysisType,
        location: &AdministrativeDivision,
        path: &RequestPath,
    ) -> Result<&'a RiskAnalysis, RiskError> {
        let id: Option<u64> = path.get(ContextKey::An).and_then(|an| an.parse().ok());
        id.and_then(|id| {
            self.catalog
                .risk_analyses_for(&hazard_type.mnemonic, Some(&analysis_type.name), &location.code)
                .into_iter()
                .find(|ra| ra.id == id)
        })
        .ok_or_else(|| RiskError::not_found(NO_RISK_ANALYSIS))
    }

    fn primary_dimension(
        &self,
        risk_analysis: &RiskAnalysis,
        dimensions: &[&'a Dimension],
        path: &RequestPath,
    ) -> Result<&'a Dimension, RiskError> {
        match path.get(ContextKey::Dym) {
            Some(dym) => {
                let id: Option<u64> = dym.parse().ok();
                dimensions
                    .iter()
                    .copied()
                    .find(|d| Some(d.id) == id)
                    .ok_or_else(|| RiskError::not_found(INVALID_DIMENSION))
            }
            None => DimensionAssociationResolver::new(self.catalog)
                .primary_dimension(risk_analysis, dimensions),
        }
    }
}

/// WMS `viewparams` template; `d1`/`d2` are filled in by the map client.
pub fn viewparams(
    risk_analysis: &RiskAnalysis,
    hazard_type: &HazardType,
    location: &AdministrativeDivision,
) -> String {
    format!(
        "ra:{};ha:{};adm_code:{};d1:{{}};d2:{{}}",
        risk_analysis.name, hazard_type.mnemonic, location.code
    )
}

fn last<'d>(locations: &[&'d AdministrativeDivision]) -> Result<&'d AdministrativeDivision, RiskError> {
    locations
        .last()
        .copied()
        .ok_or_else(|| RiskError::not_found(crate::location::INVALID_LOCATION))
}

fn export_locations(locations: &[&AdministrativeDivision]) -> Vec<LocationDescriptor> {
    locations.iter().map(|loc| loc.to_descriptor()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Catalog {
        Catalog::from_json_str(include_str!("../tests/fixtures/catalog.json")).unwrap()
    }

    #[test]
    fn test_viewparams_template() {
        let catalog = fixture();
        let ra = catalog.risk_analysis(1).unwrap();
        let ht = catalog.hazard_type("EQ").unwrap();
        let loc = catalog.division("AF15").unwrap();
        assert_eq!(
            viewparams(ra, ht, loc),
            "ra:WP6_future_proj_Hospital;ha:EQ;adm_code:AF15;d1:{};d2:{}"
        );
    }
}
