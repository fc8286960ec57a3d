pub mod association;
pub mod catalog;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod location;
pub mod model;
pub mod reshape;
pub mod service;
pub mod source;

pub use association::{AxisOrderTable, DimensionAssociationResolver, DimensionCube};
pub use catalog::Catalog;
pub use context::{build_context_token, ContextResolver, ResourceCategory};
pub use error::{DataSourceError, RiskError};
pub use location::LocationHierarchyResolver;
pub use model::{ContextKey, RequestPath};
pub use reshape::{DimensionalReshaper, OrderKey, ReshapedTable};
pub use service::RiskDataService;
pub use source::wfs::{FeatureSourceConfig, WfsFeatureSource};
pub use source::{FeatureQueryAdapter, FeatureSource};
