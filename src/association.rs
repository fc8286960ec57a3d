//! Resolution of risk-analysis dimensions to feature-layer fields.
//!
//! A risk analysis binds each of its dimensions to one pivot axis through a set
//! of association rows (one row per categorical value). Everything downstream
//! works on a [`DimensionCube`]: the dimensions of one request in priority
//! order, each with its axis, feature field, rank table and layer.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::descriptor::{DimensionDescriptor, ToDescriptor};
use crate::error::RiskError;
use crate::model::{Axis, Dimension, DimensionAssociation, RiskAnalysis};

/// Rank given to values missing from a dimension's rank table.
pub const UNRANKED: i64 = 1000;

/// Categorical value -> sort rank for one dimension of one risk analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AxisOrderTable {
    entries: Vec<(String, i64)>,
    /// Position of each value in `entries`.
    index: HashMap<String, usize>,
}

impl AxisOrderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later pairs override earlier ones for the same value.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (value, rank) in pairs {
            table.insert(value, rank);
        }
        table
    }

    pub fn insert(&mut self, value: impl Into<String>, rank: i64) {
        let value = value.into();
        match self.index.get(&value) {
            Some(&pos) => self.entries[pos].1 = rank,
            None => {
                self.index.insert(value.clone(), self.entries.len());
                self.entries.push((value, rank));
            }
        }
    }

    pub fn rank(&self, value: &str) -> Option<i64> {
        self.index.get(value).map(|&pos| self.entries[pos].1)
    }

    pub fn rank_or_unranked(&self, value: Option<&str>) -> i64 {
        value.and_then(|v| self.rank(v)).unwrap_or(UNRANKED)
    }

    /// Values sorted by rank; equal ranks keep insertion order.
    pub fn values_in_order(&self) -> Vec<&str> {
        let mut sorted: Vec<&(String, i64)> = self.entries.iter().collect();
        sorted.sort_by_key(|(_, rank)| *rank);
        sorted.into_iter().map(|(v, _)| v.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Ordered dimension keys plus the layers referenced by non-primary dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    /// `dim1`/`dim2` keys, primary dimension first.
    pub fields: Vec<&'static str>,
    /// Distinct layer typenames, in discovery order.
    pub layers: Vec<String>,
}

/// One dimension of a [`DimensionCube`].
#[derive(Debug, Clone, PartialEq)]
pub struct CubeDimension<'d> {
    pub dimension: &'d Dimension,
    pub axis: Axis,
    /// Feature property holding this dimension's value.
    pub field: String,
    pub layer: Option<String>,
    pub order: AxisOrderTable,
}

impl ToDescriptor for CubeDimension<'_> {
    type Descriptor = DimensionDescriptor;

    fn to_descriptor(&self) -> DimensionDescriptor {
        let values = if self.order.is_empty() {
            self.dimension.values.clone()
        } else {
            self.order
                .values_in_order()
                .into_iter()
                .map(str::to_string)
                .collect()
        };
        DimensionDescriptor {
            id: self.dimension.id,
            name: self.dimension.name.clone(),
            abstract_text: self.dimension.abstract_text.clone(),
            unit: self.dimension.unit.clone(),
            values,
        }
    }
}

/// Dimensions of one request in priority order, primary first.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionCube<'d> {
    dimensions: Vec<CubeDimension<'d>>,
}

impl<'d> DimensionCube<'d> {
    pub fn new(dimensions: Vec<CubeDimension<'d>>) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> &[CubeDimension<'d>] {
        &self.dimensions
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }
}

/// Primary dimension first, then the rest in list order without repeating it.
pub fn ordered_dimensions<'d>(
    primary: &'d Dimension,
    dimensions: &[&'d Dimension],
) -> Vec<&'d Dimension> {
    let mut out = vec![primary];
    for &dimension in dimensions {
        if !out.iter().any(|d| d.id == dimension.id) {
            out.push(dimension);
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub struct DimensionAssociationResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> DimensionAssociationResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Representative association and the single axis of a dimension.
    pub fn resolve(
        &self,
        risk_analysis: &RiskAnalysis,
        dimension: &Dimension,
    ) -> Result<(&'a DimensionAssociation, Axis), RiskError> {
        let associations = self.catalog.associations(risk_analysis.id, dimension.id);
        let axes: BTreeSet<Axis> = associations.iter().map(|a| a.axis).collect();

        match (associations.first(), axes.len()) {
            (Some(first), 1) => Ok((*first, first.axis)),
            (_, count) => Err(RiskError::AmbiguousAxis {
                dimension: dimension.name.clone(),
                count,
            }),
        }
    }

    pub fn order_table(&self, risk_analysis: &RiskAnalysis, dimension: &Dimension) -> AxisOrderTable {
        AxisOrderTable::from_pairs(
            self.catalog
                .associations(risk_analysis.id, dimension.id)
                .into_iter()
                .map(|a| (a.value.as_str(), a.order)),
        )
    }

    pub fn resolve_field_mapping(
        &self,
        risk_analysis: &RiskAnalysis,
        primary: &Dimension,
        dimensions: &[&Dimension],
    ) -> Result<FieldMapping, RiskError> {
        let (_, primary_axis) = self.resolve(risk_analysis, primary)?;
        let mut fields = vec![primary_axis.dimension_key()];
        let mut layers: Vec<String> = Vec::new();

        for dimension in dimensions.iter().filter(|d| d.id != primary.id) {
            let (association, axis) = self.resolve(risk_analysis, dimension)?;
            if let Some(layer) = &association.layer {
                if !layers.contains(layer) {
                    layers.push(layer.clone());
                }
            }
            fields.push(axis.dimension_key());
        }

        debug!(
            "Field mapping for {}: fields={:?} layers={:?}",
            risk_analysis.name, fields, layers
        );
        Ok(FieldMapping { fields, layers })
    }

    /// The dimensions of a request together with everything needed to read and rank them.
    pub fn cube<'d>(
        &self,
        risk_analysis: &RiskAnalysis,
        primary: &'d Dimension,
        dimensions: &[&'d Dimension],
    ) -> Result<DimensionCube<'d>, RiskError> {
        let ordered = ordered_dimensions(primary, dimensions);
        let mut entries = Vec::with_capacity(ordered.len());

        for dimension in ordered {
            let (association, axis) = self.resolve(risk_analysis, dimension)?;
            let order = self.order_table(risk_analysis, dimension);
            if order.is_empty() {
                warn!(
                    "Dimension {} has no ranked values for {}",
                    dimension.name, risk_analysis.name
                );
            }
            entries.push(CubeDimension {
                dimension,
                axis,
                field: axis.value_field(),
                layer: association.layer.clone(),
                order,
            });
        }

        Ok(DimensionCube::new(entries))
    }

    /// The dimension associated on axis x, which drives the pivot by default.
    pub fn primary_dimension<'d>(
        &self,
        risk_analysis: &RiskAnalysis,
        dimensions: &[&'d Dimension],
    ) -> Result<&'d Dimension, RiskError> {
        let on_x: Vec<&'d Dimension> = dimensions
            .iter()
            .copied()
            .filter(|d| {
                self.catalog
                    .associations(risk_analysis.id, d.id)
                    .iter()
                    .any(|a| a.axis == Axis::X)
            })
            .collect();

        match on_x.as_slice() {
            [single] => Ok(*single),
            _ => Err(RiskError::PrimaryDimension {
                risk_analysis: risk_analysis.name.clone(),
                count: on_x.len(),
            }),
        }
    }
}
