use pyo3::exceptions::{PyIOError, PyLookupError, PyValueError};
use pyo3::prelude::*;
use risk_data::model::{ContextKey, RequestPath};
use risk_data::source::FeatureCollection;
use risk_data::{build_context_token, Catalog, DimensionAssociationResolver, DimensionalReshaper, RiskError};
use std::path::Path;

#[pymodule]
fn risk_data_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCatalog>()?;
    m.add_function(wrap_pyfunction!(reshape_features, m)?)?;
    m.add_function(wrap_pyfunction!(context_token, m)?)?;
    Ok(())
}

#[pyclass(name = "Catalog")]
pub struct PyCatalog {
    inner: Catalog,
}

#[pymethods]
impl PyCatalog {
    #[staticmethod]
    fn from_path(path: &str) -> PyResult<Self> {
        let inner = Catalog::from_path(Path::new(path))
            .map_err(|e| PyErr::new::<PyIOError, _>(format!("Failed to load catalog: {}", e)))?;
        Ok(Self { inner })
    }

    #[staticmethod]
    fn from_json(document: &str) -> PyResult<Self> {
        let inner = Catalog::from_json_str(document)
            .map_err(|e| PyErr::new::<PyValueError, _>(format!("Failed to parse catalog: {}", e)))?;
        Ok(Self { inner })
    }

    fn __repr__(&self) -> String {
        format!(
            "Catalog(hazard_types={}, risk_analyses={}, dimensions={})",
            self.inner.hazard_types.len(),
            self.inner.risk_analyses.len(),
            self.inner.dimensions.len()
        )
    }
}

/// Reshape a GeoJSON feature collection of a risk analysis into the
/// `{"dimensions": [...], "values": [...]}` document, returned as JSON text.
#[pyfunction]
#[pyo3(signature = (catalog, risk_analysis, features_json, dimension=None))]
pub fn reshape_features(
    catalog: PyRef<'_, PyCatalog>,
    risk_analysis: u64,
    features_json: &str,
    dimension: Option<u64>,
) -> PyResult<String> {
    let catalog = &catalog.inner;
    let ra = catalog
        .risk_analysis(risk_analysis)
        .ok_or_else(|| to_py_err(RiskError::not_found("Invalid risk analysis")))?;
    let dimensions = catalog.dimensions_of(ra);

    let primary = match dimension {
        Some(id) => dimensions
            .iter()
            .copied()
            .find(|d| d.id == id)
            .ok_or_else(|| to_py_err(RiskError::not_found("Invalid dimension")))?,
        None => DimensionAssociationResolver::new(catalog)
            .primary_dimension(ra, &dimensions)
            .map_err(to_py_err)?,
    };

    let features: FeatureCollection = serde_json::from_str(features_json).map_err(|e| {
        PyErr::new::<PyValueError, _>(format!("Failed to decode features: {}", e))
    })?;

    let table = DimensionalReshaper::new(catalog)
        .reshape(ra, primary, &dimensions, &features.features)
        .map_err(to_py_err)?;
    serde_json::to_string(&table)
        .map_err(|e| PyErr::new::<PyValueError, _>(format!("Failed to encode table: {}", e)))
}

#[pyfunction]
#[pyo3(signature = (ht=None, at=None, an=None, dym=None))]
pub fn context_token(
    ht: Option<String>,
    at: Option<String>,
    an: Option<String>,
    dym: Option<String>,
) -> Option<String> {
    let mut path = RequestPath::new();
    for (key, value) in [
        (ContextKey::Ht, ht),
        (ContextKey::At, at),
        (ContextKey::An, an),
        (ContextKey::Dym, dym),
    ] {
        if let Some(value) = value {
            path = path.with(key, value);
        }
    }
    build_context_token(&path)
}

fn to_py_err(err: RiskError) -> PyErr {
    match err {
        RiskError::NotFound(message) => PyErr::new::<PyLookupError, _>(message),
        other => PyErr::new::<PyValueError, _>(other.to_string()),
    }
}
