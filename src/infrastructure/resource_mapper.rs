//! Resource Type Mapper
//!
//! Maps cloud resource kinds (format: `Namespace/type[/subtype]`) to
//! Terraform/OpenTofu resource types (format: `provider_resource_type`), and
//! holds the set of resource types the provider schema knows about.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use serde_json::Value;

use super::error::{ImportError, ImportResult};

/// Source of truth for valid configuration resource types
pub trait SchemaCatalog: Send + Sync {
    /// Check if a resource type exists in the provider schema
    fn is_valid_type(&self, resource_type: &str) -> bool;

    /// Recommended resource type for a cloud kind, if any
    fn recommended_type(&self, cloud_kind: &str) -> Option<String>;
}

/// Catalog backed by the built-in kind table, optionally extended with the
/// resource types of a provider schema document
pub struct ResourceCatalog {
    extra_types: HashSet<String>,
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ResourceCatalog {
    /// Catalog with only the built-in table
    pub fn builtin() -> Self {
        Self {
            extra_types: HashSet::new(),
        }
    }

    /// Extend the catalog with the output of `<engine> providers schema -json`
    pub fn with_provider_schema(mut self, schema_json: &str) -> ImportResult<Self> {
        let schema: Value = serde_json::from_str(schema_json)?;

        let providers = schema
            .get("provider_schemas")
            .and_then(|p| p.as_object())
            .ok_or_else(|| {
                ImportError::Serialization("provider schema has no provider_schemas".to_string())
            })?;

        for provider in providers.values() {
            if let Some(resources) = provider.get("resource_schemas").and_then(|r| r.as_object()) {
                self.extra_types.extend(resources.keys().cloned());
            }
        }

        Ok(self)
    }

    /// Number of types known beyond the built-in table
    pub fn extra_type_count(&self) -> usize {
        self.extra_types.len()
    }
}

impl SchemaCatalog for ResourceCatalog {
    fn is_valid_type(&self, resource_type: &str) -> bool {
        VALID_TYPES.contains(resource_type) || self.extra_types.contains(resource_type)
    }

    fn recommended_type(&self, cloud_kind: &str) -> Option<String> {
        KIND_MAP
            .get(cloud_kind.to_lowercase().as_str())
            .map(|t| t.to_string())
    }
}

/// Build the kind mapping (keys are lowercase)
fn build_kind_map() -> HashMap<&'static str, &'static str> {
    let mut m = HashMap::new();

    // Resources
    m.insert("microsoft.resources/resourcegroups", "azurerm_resource_group");

    // Network
    m.insert("microsoft.network/virtualnetworks", "azurerm_virtual_network");
    m.insert("microsoft.network/virtualnetworks/subnets", "azurerm_subnet");
    m.insert("microsoft.network/networksecuritygroups", "azurerm_network_security_group");
    m.insert("microsoft.network/publicipaddresses", "azurerm_public_ip");
    m.insert("microsoft.network/networkinterfaces", "azurerm_network_interface");
    m.insert("microsoft.network/loadbalancers", "azurerm_lb");
    m.insert("microsoft.network/routetables", "azurerm_route_table");
    m.insert("microsoft.network/privatednszones", "azurerm_private_dns_zone");
    m.insert("microsoft.network/dnszones", "azurerm_dns_zone");
    m.insert("microsoft.network/applicationgateways", "azurerm_application_gateway");

    // Compute (virtual machines have no single recommendation: linux or windows)
    m.insert("microsoft.compute/disks", "azurerm_managed_disk");
    m.insert("microsoft.compute/availabilitysets", "azurerm_availability_set");

    // Storage
    m.insert("microsoft.storage/storageaccounts", "azurerm_storage_account");

    // Database
    m.insert("microsoft.sql/servers", "azurerm_mssql_server");
    m.insert("microsoft.sql/servers/databases", "azurerm_mssql_database");
    m.insert("microsoft.dbforpostgresql/flexibleservers", "azurerm_postgresql_flexible_server");
    m.insert("microsoft.documentdb/databaseaccounts", "azurerm_cosmosdb_account");

    // Containers
    m.insert("microsoft.containerservice/managedclusters", "azurerm_kubernetes_cluster");
    m.insert("microsoft.containerregistry/registries", "azurerm_container_registry");

    // App Service (plans and sites split into linux/windows variants)
    m.insert("microsoft.web/serverfarms", "azurerm_service_plan");

    // Key Vault
    m.insert("microsoft.keyvault/vaults", "azurerm_key_vault");

    // Monitoring
    m.insert("microsoft.operationalinsights/workspaces", "azurerm_log_analytics_workspace");
    m.insert("microsoft.insights/components", "azurerm_application_insights");
    m.insert("microsoft.managedidentity/userassignedidentities", "azurerm_user_assigned_identity");

    m
}

fn build_valid_types() -> HashSet<&'static str> {
    let mut s: HashSet<&'static str> = KIND_MAP.values().copied().collect();

    // Types that are valid targets but never recommended on their own
    s.insert("azurerm_linux_virtual_machine");
    s.insert("azurerm_windows_virtual_machine");
    s.insert("azurerm_virtual_machine");
    s.insert("azurerm_linux_web_app");
    s.insert("azurerm_windows_web_app");
    s.insert("azurerm_linux_function_app");
    s.insert("azurerm_windows_function_app");
    s.insert("azurerm_app_service_plan");
    s.insert("azurerm_subnet_network_security_group_association");
    s.insert("azurerm_network_interface_security_group_association");

    s
}

lazy_static! {
    static ref KIND_MAP: HashMap<&'static str, &'static str> = build_kind_map();
    static ref VALID_TYPES: HashSet<&'static str> = build_valid_types();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommended_type_is_case_insensitive() {
        let catalog = ResourceCatalog::builtin();
        assert_eq!(
            catalog.recommended_type("Microsoft.Network/virtualNetworks"),
            Some("azurerm_virtual_network".to_string())
        );
        assert_eq!(
            catalog.recommended_type("microsoft.network/virtualnetworks"),
            Some("azurerm_virtual_network".to_string())
        );
    }

    #[test]
    fn test_virtual_machines_have_no_recommendation() {
        let catalog = ResourceCatalog::builtin();
        assert_eq!(
            catalog.recommended_type("Microsoft.Compute/virtualMachines"),
            None
        );
        assert!(catalog.is_valid_type("azurerm_linux_virtual_machine"));
        assert!(catalog.is_valid_type("azurerm_windows_virtual_machine"));
    }

    #[test]
    fn test_every_recommendation_is_a_valid_type() {
        let catalog = ResourceCatalog::builtin();
        for kind in KIND_MAP.keys() {
            let rt = catalog.recommended_type(kind).unwrap();
            assert!(catalog.is_valid_type(&rt), "{} is not valid", rt);
        }
    }

    #[test]
    fn test_provider_schema_extends_valid_types() {
        let schema = r#"{
            "format_version": "1.0",
            "provider_schemas": {
                "registry.terraform.io/hashicorp/azurerm": {
                    "resource_schemas": {
                        "azurerm_bastion_host": {},
                        "azurerm_firewall": {}
                    }
                }
            }
        }"#;

        let catalog = ResourceCatalog::builtin()
            .with_provider_schema(schema)
            .unwrap();

        assert_eq!(catalog.extra_type_count(), 2);
        assert!(catalog.is_valid_type("azurerm_firewall"));
        assert!(catalog.is_valid_type("azurerm_resource_group"));
        assert!(!catalog.is_valid_type("azurerm_nope"));
    }

    #[test]
    fn test_provider_schema_without_providers_is_rejected() {
        let result = ResourceCatalog::builtin().with_provider_schema(r#"{"format_version":"1.0"}"#);
        assert!(result.is_err());
    }
}
