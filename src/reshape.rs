//! Pivot raw features into an ordered, dimension-keyed table.
//!
//! Each feature becomes one row `[primary value, other values..., measurement]`.
//! Rows are ordered by an [`OrderKey`] holding one rank per dimension, primary
//! first, so the primary dimension dominates and each following dimension
//! breaks ties within the previous one's group.

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};
use std::borrow::Cow;
use tracing::{debug, warn};

use crate::association::{DimensionAssociationResolver, DimensionCube};
use crate::catalog::Catalog;
use crate::descriptor::{DimensionDescriptor, ToDescriptor};
use crate::error::RiskError;
use crate::model::{Dimension, RiskAnalysis};
use crate::source::{RawFeature, MEASUREMENT_FIELD};

/// Per-dimension ranks in priority order, compared lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey(Vec<i64>);

impl OrderKey {
    pub fn ranks(&self) -> &[i64] {
        &self.0
    }
}

/// Categorical values (primary first) followed by the measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ReshapedRow {
    pub values: Vec<Value>,
    pub measurement: Value,
}

impl Serialize for ReshapedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.values.len() + 1))?;
        for value in &self.values {
            seq.serialize_element(value)?;
        }
        seq.serialize_element(&self.measurement)?;
        seq.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReshapedTable {
    pub dimensions: Vec<DimensionDescriptor>,
    pub values: Vec<ReshapedRow>,
}

pub struct DimensionalReshaper<'a> {
    resolver: DimensionAssociationResolver<'a>,
}

impl<'a> DimensionalReshaper<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            resolver: DimensionAssociationResolver::new(catalog),
        }
    }

    pub fn reshape(
        &self,
        risk_analysis: &RiskAnalysis,
        primary: &Dimension,
        dimensions: &[&Dimension],
        features: &[RawFeature],
    ) -> Result<ReshapedTable, RiskError> {
        let cube = self.resolver.cube(risk_analysis, primary, dimensions)?;
        let table = reshape_with_cube(&cube, features);
        debug!(
            "Reshaped {} features of {} over {} dimensions",
            table.values.len(),
            risk_analysis.name,
            cube.len()
        );
        Ok(table)
    }
}

/// Reshape against an already resolved cube. Performs no lookups and cannot fail.
pub fn reshape_with_cube(cube: &DimensionCube<'_>, features: &[RawFeature]) -> ReshapedTable {
    let mut keyed: Vec<(OrderKey, ReshapedRow)> = features
        .iter()
        .map(|feature| {
            let row = row_for(cube, feature);
            (order_key(cube, &row), row)
        })
        .collect();

    // stable: equal keys keep feature order
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    ReshapedTable {
        dimensions: cube
            .dimensions()
            .iter()
            .map(ToDescriptor::to_descriptor)
            .collect(),
        values: keyed.into_iter().map(|(_, row)| row).collect(),
    }
}

fn row_for(cube: &DimensionCube<'_>, feature: &RawFeature) -> ReshapedRow {
    let values = cube
        .dimensions()
        .iter()
        .map(|dim| match feature.property(&dim.field) {
            Some(value) => value.clone(),
            None => {
                warn!("Feature {:?} has no {} property", feature.id, dim.field);
                Value::Null
            }
        })
        .collect();
    let measurement = feature
        .property(MEASUREMENT_FIELD)
        .cloned()
        .unwrap_or(Value::Null);

    ReshapedRow {
        values,
        measurement,
    }
}

pub fn order_key(cube: &DimensionCube<'_>, row: &ReshapedRow) -> OrderKey {
    OrderKey(
        cube.dimensions()
            .iter()
            .zip(&row.values)
            .map(|(dim, value)| dim.order.rank_or_unranked(category_label(value).as_deref()))
            .collect(),
    )
}

/// Text used to look a property value up in a rank table.
fn category_label(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(number_label(n))),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Whole floats (`100.0`) are keyed like the integer text `100`.
fn number_label(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < 1e15 => {
            format!("{:.0}", f)
        }
        _ => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::UNRANKED;
    use crate::model::{Axis, DimensionAssociation};
    use serde_json::{json, Map};

    fn dimension(id: u64, name: &str) -> Dimension {
        Dimension {
            id,
            name: name.to_string(),
            abstract_text: String::new(),
            unit: String::new(),
            values: vec![],
        }
    }

    fn association(dimension: u64, axis: Axis, value: &str, order: i64) -> DimensionAssociation {
        DimensionAssociation {
            risk_analysis: 9,
            dimension,
            axis,
            value: value.to_string(),
            order,
            layer: Some("geonode:cube".to_string()),
        }
    }

    /// D1 = {a: 1, b: 2} on x, D2 = {x: 1, y: 2} on y.
    fn two_axis_catalog() -> Catalog {
        let mut catalog =
            Catalog::from_json_str(include_str!("../tests/fixtures/catalog.json")).unwrap();
        let mut ra = catalog.risk_analyses[0].clone();
        ra.id = 9;
        ra.name = "cube".to_string();
        catalog.risk_analyses.push(ra);
        catalog.dimensions.push(dimension(21, "D1"));
        catalog.dimensions.push(dimension(22, "D2"));
        catalog.associations.extend([
            association(21, Axis::X, "a", 1),
            association(21, Axis::X, "b", 2),
            association(22, Axis::Y, "x", 1),
            association(22, Axis::Y, "y", 2),
        ]);
        catalog
    }

    fn feature(d1: Option<&str>, d2: Option<&str>, value: f64) -> RawFeature {
        let mut properties = Map::new();
        if let Some(d1) = d1 {
            properties.insert("dim1_value".to_string(), json!(d1));
        }
        if let Some(d2) = d2 {
            properties.insert("dim2_value".to_string(), json!(d2));
        }
        properties.insert("value".to_string(), json!(value));
        RawFeature::from_properties(properties)
    }

    fn reshape(catalog: &Catalog, features: &[RawFeature]) -> Result<ReshapedTable, RiskError> {
        let ra = catalog.risk_analysis(9).unwrap();
        let d1 = catalog.dimension(21).unwrap();
        let d2 = catalog.dimension(22).unwrap();
        DimensionalReshaper::new(catalog).reshape(ra, d1, &[d1, d2], features)
    }

    fn rows(table: &ReshapedTable) -> Value {
        serde_json::to_value(&table.values).unwrap()
    }

    #[test]
    fn test_primary_dominates_and_secondary_breaks_ties() {
        let catalog = two_axis_catalog();
        let features = vec![
            feature(Some("a"), Some("x"), 10.0),
            feature(Some("b"), Some("x"), 20.0),
            feature(Some("a"), Some("y"), 30.0),
        ];

        let table = reshape(&catalog, &features).unwrap();
        assert_eq!(
            rows(&table),
            json!([["a", "x", 10.0], ["a", "y", 30.0], ["b", "x", 20.0]])
        );
    }

    #[test]
    fn test_unknown_value_sorts_after_known_ranks() {
        let catalog = two_axis_catalog();
        let features = vec![
            feature(Some("zzz"), Some("x"), 1.0),
            feature(Some("b"), Some("y"), 2.0),
            feature(Some("a"), Some("unlisted"), 3.0),
            feature(Some("a"), Some("y"), 4.0),
        ];

        let table = reshape(&catalog, &features).unwrap();
        assert_eq!(
            rows(&table),
            json!([
                ["a", "y", 4.0],
                ["a", "unlisted", 3.0],
                ["b", "y", 2.0],
                ["zzz", "x", 1.0]
            ])
        );
    }

    #[test]
    fn test_mixed_rank_widths_order_numerically() {
        // 2 < 10 < sentinel, whatever their digit widths
        let mut catalog = two_axis_catalog();
        catalog.associations.push(association(21, Axis::X, "c", 10));
        let features = vec![
            feature(Some("c"), Some("x"), 1.0),
            feature(None, Some("x"), 2.0),
            feature(Some("b"), Some("y"), 3.0),
        ];

        let table = reshape(&catalog, &features).unwrap();
        assert_eq!(
            rows(&table),
            json!([["b", "y", 3.0], ["c", "x", 1.0], [null, "x", 2.0]])
        );
    }

    #[test]
    fn test_missing_property_yields_null_column() {
        let catalog = two_axis_catalog();
        let table = reshape(&catalog, &[feature(Some("a"), None, 5.0)]).unwrap();
        assert_eq!(rows(&table), json!([["a", null, 5.0]]));
    }

    #[test]
    fn test_equal_keys_keep_feature_order() {
        let catalog = two_axis_catalog();
        let features = vec![
            feature(Some("a"), Some("x"), 1.0),
            feature(Some("a"), Some("x"), 2.0),
            feature(Some("a"), Some("x"), 3.0),
        ];
        let table = reshape(&catalog, &features).unwrap();
        let measurements: Vec<_> = table.values.iter().map(|r| r.measurement.clone()).collect();
        assert_eq!(measurements, vec![json!(1.0), json!(2.0), json!(3.0)]);
    }

    #[test]
    fn test_primary_is_not_repeated_and_dimensions_exported() {
        let catalog = two_axis_catalog();
        let ra = catalog.risk_analysis(9).unwrap();
        let d1 = catalog.dimension(21).unwrap();
        let d2 = catalog.dimension(22).unwrap();

        let table = DimensionalReshaper::new(&catalog)
            .reshape(ra, d2, &[d1, d2, d1], &[feature(Some("b"), Some("y"), 1.0)])
            .unwrap();
        let names: Vec<_> = table.dimensions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["D2", "D1"]);
        assert_eq!(table.dimensions[0].values, vec!["x", "y"]);
        assert_eq!(rows(&table), json!([["y", "b", 1.0]]));
    }

    #[test]
    fn test_ambiguous_axis_aborts_reshape() {
        let mut catalog = two_axis_catalog();
        catalog.associations.push(association(22, Axis::X, "z", 3));
        let err = reshape(&catalog, &[feature(Some("a"), Some("x"), 1.0)]).unwrap_err();
        assert!(matches!(err, RiskError::AmbiguousAxis { count: 2, .. }));
    }

    #[test]
    fn test_numeric_categories_match_rank_table() {
        let catalog =
            Catalog::from_json_str(include_str!("../tests/fixtures/catalog.json")).unwrap();
        let ra = catalog.risk_analysis(1).unwrap();
        let resolver = DimensionAssociationResolver::new(&catalog);
        let dimensions = catalog.dimensions_of(ra);
        let cube = resolver.cube(ra, dimensions[1], &dimensions).unwrap();

        let mut properties = Map::new();
        properties.insert("dim2_value".to_string(), json!(100));
        let row = row_for(&cube, &RawFeature::from_properties(properties));
        assert_eq!(order_key(&cube, &row).ranks(), &[2, UNRANKED]);
    }

    #[test]
    fn test_float_encoded_periods_use_integer_ranks() {
        let catalog =
            Catalog::from_json_str(include_str!("../tests/fixtures/catalog.json")).unwrap();
        let ra = catalog.risk_analysis(1).unwrap();
        let scenario = catalog.dimension(1).unwrap();
        let period = catalog.dimension(2).unwrap();

        let features: Vec<RawFeature> = [
            (json!(1000.0), 1.0),
            (json!(10), 2.0),
            (json!("zzz"), 3.0),
            (json!(100.0), 4.0),
        ]
        .into_iter()
        .map(|(period, value)| {
            let mut properties = Map::new();
            properties.insert("dim1_value".to_string(), json!("SSP1"));
            properties.insert("dim2_value".to_string(), period);
            properties.insert("value".to_string(), json!(value));
            RawFeature::from_properties(properties)
        })
        .collect();

        let table = DimensionalReshaper::new(&catalog)
            .reshape(ra, scenario, &[scenario, period], &features)
            .unwrap();
        assert_eq!(
            rows(&table),
            json!([
                ["SSP1", 10, 2.0],
                ["SSP1", 100.0, 4.0],
                ["SSP1", 1000.0, 1.0],
                ["SSP1", "zzz", 3.0]
            ])
        );
    }

    #[test]
    fn test_fractional_numbers_keep_their_text() {
        assert_eq!(number_label(&Number::from_f64(2.5).unwrap()), "2.5");
        assert_eq!(number_label(&Number::from(42)), "42");
        assert_eq!(number_label(&Number::from_f64(-10.0).unwrap()), "-10");
    }
}
