use serde::{Deserialize, Serialize};

pub type DimensionId = u64;
pub type RiskAnalysisId = u64;
pub type HazardSetId = u64;

/// Pivot role of a dimension within a risk analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Dimension key used by the feature layers (`dim1` for x, `dim2` for y).
    pub fn dimension_key(self) -> &'static str {
        match self {
            Axis::X => "dim1",
            Axis::Y => "dim2",
        }
    }

    /// Feature property carrying the categorical value of this axis.
    pub fn value_field(self) -> String {
        format!("{}_value", self.dimension_key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub id: DimensionId,
    pub name: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub unit: String,
    /// Values used when a risk analysis carries no association rows for them.
    #[serde(default)]
    pub values: Vec<String>,
}

/// One categorical value of a dimension bound to a risk analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionAssociation {
    pub risk_analysis: RiskAnalysisId,
    pub dimension: DimensionId,
    pub axis: Axis,
    pub value: String,
    #[serde(default)]
    pub order: i64,
    /// Typename of the feature layer carrying this dimension.
    #[serde(default)]
    pub layer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardSet {
    pub id: HazardSetId,
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub fa_icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub id: u64,
    pub typename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub id: RiskAnalysisId,
    pub name: String,
    /// Mnemonic of the hazard type.
    pub hazard_type: String,
    /// Name of the analysis type.
    pub analysis_type: String,
    /// Codes of the administrative divisions covered.
    #[serde(default)]
    pub divisions: Vec<String>,
    #[serde(default)]
    pub hazard_set: Option<HazardSet>,
    #[serde(default)]
    pub descriptor_file: String,
    #[serde(default)]
    pub data_file: String,
    #[serde(default)]
    pub metadata_file: String,
    #[serde(default)]
    pub additional_layers: Vec<Layer>,
}

impl RiskAnalysis {
    pub fn covers(&self, location_code: &str) -> bool {
        self.divisions.iter().any(|code| code == location_code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardType {
    pub mnemonic: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Analysis type names, in presentation order.
    #[serde(default)]
    pub analysis_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisType {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdministrativeDivision {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FurtherResource {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub links: Vec<ResourceLink>,
}

/// What a further resource is attached to. Unset narrowing fields match any request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceLink {
    AnalysisType {
        analysis_type: String,
        #[serde(default)]
        hazard_type: Option<String>,
        #[serde(default)]
        region: Option<String>,
    },
    Dimension {
        dimension: DimensionId,
        #[serde(default)]
        risk_analysis: Option<RiskAnalysisId>,
        #[serde(default)]
        region: Option<String>,
    },
    HazardSet {
        hazard_set: HazardSetId,
        #[serde(default)]
        region: Option<String>,
    },
}

/// Keys a request path can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    Loc,
    Ht,
    At,
    An,
    Dym,
}

impl ContextKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextKey::Loc => "loc",
            ContextKey::Ht => "ht",
            ContextKey::At => "at",
            ContextKey::An => "an",
            ContextKey::Dym => "dym",
        }
    }
}

/// Parameters captured from a request path such as `loc/AF/ht/EQ/at/impact/an/1/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPath {
    pub loc: Option<String>,
    pub ht: Option<String>,
    pub at: Option<String>,
    pub an: Option<String>,
    pub dym: Option<String>,
}

impl RequestPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: ContextKey, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match key {
            ContextKey::Loc => self.loc = value,
            ContextKey::Ht => self.ht = value,
            ContextKey::At => self.at = value,
            ContextKey::An => self.an = value,
            ContextKey::Dym => self.dym = value,
        }
        self
    }

    /// Value for `key`; empty strings count as absent.
    pub fn get(&self, key: ContextKey) -> Option<&str> {
        let value = match key {
            ContextKey::Loc => &self.loc,
            ContextKey::Ht => &self.ht,
            ContextKey::At => &self.at,
            ContextKey::An => &self.an,
            ContextKey::Dym => &self.dym,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }
}
