use std::sync::Arc;

use super::item::ResourceItem;
use crate::infrastructure::error::{ImportError, ImportResult};
use crate::infrastructure::resource_mapper::SchemaCatalog;

/// Decides the configuration resource type of an item
///
/// An empty result means "unresolved"; callers treat it as a skip marker.
#[derive(Clone)]
pub struct TypeResolver {
    catalog: Arc<dyn SchemaCatalog>,
}

impl TypeResolver {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self { catalog }
    }

    /// Resolve the type for `item` given what the user typed
    pub fn resolve(&self, item: &ResourceItem, user_input: &str) -> ImportResult<String> {
        let input = user_input.trim();
        if input.is_empty() {
            return Ok(self.recommendation(item).unwrap_or_default());
        }

        if !self.catalog.is_valid_type(input) {
            return Err(ImportError::InvalidType {
                resource_type: input.to_string(),
            });
        }

        Ok(input.to_string())
    }

    /// Recommended type for an item, if the catalog or discovery supplied one
    pub fn recommendation(&self, item: &ResourceItem) -> Option<String> {
        if let Some(rt) = item
            .cloud_kind
            .as_deref()
            .and_then(|kind| self.catalog.recommended_type(kind))
        {
            return Some(rt);
        }

        item.recommended_type
            .as_ref()
            .filter(|rt| self.catalog.is_valid_type(rt))
            .cloned()
    }
}
