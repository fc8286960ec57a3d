use std::collections::HashSet;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::error::RiskError;
use crate::model::AdministrativeDivision;

pub const INVALID_LOCATION: &str = "Invalid location code";

#[derive(Debug, Clone, Copy)]
pub struct LocationHierarchyResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> LocationHierarchyResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Root-first chain of ancestors ending with the division itself.
    pub fn resolve(&self, code: &str) -> Result<Vec<&'a AdministrativeDivision>, RiskError> {
        let division = self
            .catalog
            .division(code)
            .ok_or_else(|| RiskError::not_found(INVALID_LOCATION))?;

        let mut chain = vec![division];
        let mut seen: HashSet<&str> = HashSet::from([division.code.as_str()]);
        let mut current = division;

        while let Some(parent_code) = current.parent.as_deref() {
            if !seen.insert(parent_code) {
                warn!("Parent cycle at division {} while resolving {}", parent_code, code);
                break;
            }
            match self.catalog.division(parent_code) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent;
                }
                None => {
                    warn!("Division {} references unknown parent {}", current.code, parent_code);
                    break;
                }
            }
        }

        chain.reverse();
        debug!("Location chain for {}: {} levels", code, chain.len());
        Ok(chain)
    }
}
