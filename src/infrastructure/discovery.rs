use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::ImportResult;

/// How the resources of a session are selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A single resource by its cloud identifier
    Resource {
        id: String,
        /// Target name override for the resource
        name: Option<String>,
        /// Target type override for the resource
        resource_type: Option<String>,
    },
    /// Every resource in a resource group, plus the group itself
    ResourceGroup { name: String },
    /// Resources matched by a resource-graph predicate
    Query { predicate: String },
    /// Replay of a previously saved mapping file
    MappingFile { path: PathBuf },
}

impl Selector {
    /// Short label used in logs and output
    pub fn describe(&self) -> String {
        match self {
            Selector::Resource { id, .. } => format!("resource {}", id),
            Selector::ResourceGroup { name } => format!("resource group {}", name),
            Selector::Query { predicate } => format!("query \"{}\"", predicate),
            Selector::MappingFile { path } => format!("mapping file {}", path.display()),
        }
    }
}

/// A discovered candidate resource, before type resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// The cloud identifier (unique within a session)
    pub cloud_id: String,
    /// Human-readable name
    pub display_name: String,
    /// Cloud-side kind (e.g. Microsoft.Network/virtualNetworks)
    pub cloud_kind: Option<String>,
    /// Suggested configuration resource type
    pub recommended_type: Option<String>,
    /// Preset target name (mapping file or resource mode)
    pub target_name: Option<String>,
    /// Type chosen earlier (mapping file or resource mode), validated on use
    pub preset_type: Option<String>,
}

impl ResourceDescriptor {
    /// Create a descriptor with only an identifier
    pub fn new(cloud_id: impl Into<String>) -> Self {
        let cloud_id = cloud_id.into();
        let display_name = cloud_id
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(&cloud_id)
            .to_string();
        Self {
            cloud_id,
            display_name,
            cloud_kind: None,
            recommended_type: None,
            target_name: None,
            preset_type: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.cloud_kind = Some(kind.into());
        self
    }

    pub fn with_recommended_type(mut self, resource_type: impl Into<String>) -> Self {
        self.recommended_type = Some(resource_type.into());
        self
    }

    pub fn with_target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = Some(name.into());
        self
    }

    pub fn with_preset_type(mut self, resource_type: impl Into<String>) -> Self {
        self.preset_type = Some(resource_type.into());
        self
    }
}

/// Produces the candidate resources of a session
///
/// Called once per session; the returned order is the discovery order used
/// for display, scheduling and resume.
pub trait DiscoveryProvider: Send + Sync {
    fn discover(&self, selector: &Selector) -> ImportResult<Vec<ResourceDescriptor>>;
}

/// Discovery provider over a fixed list of descriptors
#[cfg(test)]
pub struct StaticDiscovery {
    resources: Vec<ResourceDescriptor>,
}

#[cfg(test)]
impl StaticDiscovery {
    pub fn new(resources: Vec<ResourceDescriptor>) -> Self {
        Self { resources }
    }
}

#[cfg(test)]
impl DiscoveryProvider for StaticDiscovery {
    fn discover(&self, _selector: &Selector) -> ImportResult<Vec<ResourceDescriptor>> {
        Ok(self.resources.clone())
    }
}
