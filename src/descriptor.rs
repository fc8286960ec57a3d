//! Fixed-shape, serializable views of the domain entities.

use serde::Serialize;

use crate::model::{
    AdministrativeDivision, AnalysisType, Dimension, DimensionId, FurtherResource, HazardSet,
    HazardType, RiskAnalysis, RiskAnalysisId,
};

/// Entities exposed to clients implement this to produce their descriptor.
pub trait ToDescriptor {
    type Descriptor: Serialize;

    fn to_descriptor(&self) -> Self::Descriptor;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionDescriptor {
    pub id: DimensionId,
    pub name: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub unit: String,
    pub values: Vec<String>,
}

impl ToDescriptor for Dimension {
    type Descriptor = DimensionDescriptor;

    fn to_descriptor(&self) -> DimensionDescriptor {
        DimensionDescriptor {
            id: self.id,
            name: self.name.clone(),
            abstract_text: self.abstract_text.clone(),
            unit: self.unit.clone(),
            values: self.values.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationDescriptor {
    pub code: String,
    pub label: String,
    pub level: u32,
}

impl ToDescriptor for AdministrativeDivision {
    type Descriptor = LocationDescriptor;

    fn to_descriptor(&self) -> LocationDescriptor {
        LocationDescriptor {
            code: self.code.clone(),
            label: self.name.clone(),
            level: self.level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HazardTypeDescriptor {
    pub mnemonic: String,
    pub title: String,
    pub description: String,
}

impl ToDescriptor for HazardType {
    type Descriptor = HazardTypeDescriptor;

    fn to_descriptor(&self) -> HazardTypeDescriptor {
        HazardTypeDescriptor {
            mnemonic: self.mnemonic.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisTypeDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
}

impl ToDescriptor for AnalysisType {
    type Descriptor = AnalysisTypeDescriptor;

    fn to_descriptor(&self) -> AnalysisTypeDescriptor {
        AnalysisTypeDescriptor {
            name: self.name.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HazardSetDescriptor {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub purpose: String,
    pub category: String,
    pub fa_icon: String,
}

impl ToDescriptor for HazardSet {
    type Descriptor = HazardSetDescriptor;

    fn to_descriptor(&self) -> HazardSetDescriptor {
        HazardSetDescriptor {
            title: self.title.clone(),
            abstract_text: self.abstract_text.clone(),
            purpose: self.purpose.clone(),
            category: self.category.clone(),
            fa_icon: self.fa_icon.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAnalysisDescriptor {
    pub id: RiskAnalysisId,
    pub name: String,
    pub hazard_set: Option<HazardSetDescriptor>,
}

impl ToDescriptor for RiskAnalysis {
    type Descriptor = RiskAnalysisDescriptor;

    fn to_descriptor(&self) -> RiskAnalysisDescriptor {
        RiskAnalysisDescriptor {
            id: self.id,
            name: self.name.clone(),
            hazard_set: self.hazard_set.as_ref().map(ToDescriptor::to_descriptor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceDescriptor {
    pub id: u64,
    pub title: String,
    pub text: String,
    pub url: Option<String>,
}

impl ToDescriptor for FurtherResource {
    type Descriptor = ResourceDescriptor;

    fn to_descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            id: self.id,
            title: self.title.clone(),
            text: self.text.clone(),
            url: self.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dimension_descriptor_shape() {
        let dimension = Dimension {
            id: 4,
            name: "Scenario".to_string(),
            abstract_text: "Pathway".to_string(),
            unit: "NA".to_string(),
            values: vec!["SSP1".to_string()],
        };
        let value = serde_json::to_value(dimension.to_descriptor()).unwrap();
        assert_eq!(
            value,
            json!({"id": 4, "name": "Scenario", "abstract": "Pathway", "unit": "NA", "values": ["SSP1"]})
        );
    }

    #[test]
    fn test_risk_analysis_descriptor_without_hazard_set() {
        let ra = RiskAnalysis {
            id: 2,
            name: "EQ_loss_AF".to_string(),
            hazard_type: "EQ".to_string(),
            analysis_type: "loss_impact".to_string(),
            divisions: vec![],
            hazard_set: None,
            descriptor_file: String::new(),
            data_file: String::new(),
            metadata_file: String::new(),
            additional_layers: vec![],
        };
        let value = serde_json::to_value(ra.to_descriptor()).unwrap();
        assert_eq!(value, json!({"id": 2, "name": "EQ_loss_AF", "hazardSet": null}));
    }
}
