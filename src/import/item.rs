use serde::{Deserialize, Serialize};
use std::fmt;

use crate::infrastructure::discovery::ResourceDescriptor;
use crate::infrastructure::error::{ImportError, ImportResult};

/// Lifecycle state of a discovered resource within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Recommended,
    Editing,
    Validated,
    Skipped,
    Importing,
    Imported,
    Errored,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Recommended => "recommended",
            ItemStatus::Editing => "editing",
            ItemStatus::Validated => "validated",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Importing => "importing",
            ItemStatus::Imported => "imported",
            ItemStatus::Errored => "errored",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        use ItemStatus::*;

        match (self, next) {
            (Pending, Recommended | Editing | Validated | Skipped) => true,
            (Recommended, Editing | Validated | Skipped) => true,
            // Confirm, reject, or Escape back to wherever the edit started
            (Editing, Pending | Recommended | Validated | Skipped | Errored) => true,
            (Validated, Importing | Editing | Skipped | Pending) => true,
            (Importing, Imported | Errored) => true,
            (Imported | Errored | Skipped, Editing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One discovered candidate resource and its binding
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceItem {
    pub cloud_id: String,
    pub display_name: String,
    pub cloud_kind: Option<String>,
    pub recommended_type: Option<String>,
    /// Type chosen in an earlier run or on the command line
    pub preset_type: Option<String>,
    /// Resource name part of the address
    pub target_name: String,
    /// Dotted path of the module the resource lives in; empty for the root module
    pub module_path: String,
    /// Full configuration address, `[module.<m>.]...<target_type>.<target_name>`
    pub target_address: String,
    pub target_type: String,
    pub status: ItemStatus,
    pub validation_error: Option<String>,
    pub import_error: Option<String>,
    /// True while the type is an unconfirmed suggestion
    pub is_recommended: bool,
    /// Incremented on every status change
    pub revision: u64,
}

impl ResourceItem {
    /// Build a pending item from a descriptor
    ///
    /// `index` is the discovery position, used to derive a name when the
    /// descriptor does not carry one.
    pub fn from_descriptor(desc: &ResourceDescriptor, index: usize, name_pattern: &str) -> Self {
        let target_name = desc
            .target_name
            .clone()
            .unwrap_or_else(|| format!("{}{}", name_pattern, index));

        Self {
            cloud_id: desc.cloud_id.clone(),
            display_name: desc.display_name.clone(),
            cloud_kind: desc.cloud_kind.clone(),
            recommended_type: desc.recommended_type.clone(),
            preset_type: desc.preset_type.clone(),
            target_address: String::new(),
            target_name,
            module_path: String::new(),
            target_type: String::new(),
            status: ItemStatus::Pending,
            validation_error: None,
            import_error: None,
            is_recommended: false,
            revision: 0,
        }
    }

    /// Place the item in the module at `module_path` (e.g. `network.hub`)
    pub fn in_module(mut self, module_path: &str) -> Self {
        self.module_path = module_path.to_string();
        self.target_address = address_for(&self.module_path, &self.target_type, &self.target_name);
        self
    }

    /// Set the target type and recompute the address
    pub fn set_target_type(&mut self, resource_type: &str) {
        self.target_type = resource_type.to_string();
        self.target_address = address_for(&self.module_path, resource_type, &self.target_name);
    }

    /// Move to `next`, bumping the revision
    pub fn set_status(&mut self, next: ItemStatus) -> ImportResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ImportError::IllegalTransition {
                cloud_id: self.cloud_id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        tracing::debug!(
            cloud_id = %self.cloud_id,
            from = %self.status,
            to = %next,
            revision = self.revision + 1,
            "item transition"
        );

        self.status = next;
        self.revision += 1;
        Ok(())
    }

    /// Whether the item should be handed to the import executor
    pub fn is_schedulable(&self) -> bool {
        self.status == ItemStatus::Validated && !self.target_type.is_empty()
    }

    /// Short label for list display
    pub fn label(&self) -> String {
        let target = if self.target_type.is_empty() {
            "(skip)".to_string()
        } else if self.is_recommended {
            format!("{} (recommended)", self.target_address)
        } else {
            self.target_address.clone()
        };

        let mut label = format!("[{}] {} -> {}", self.status, self.cloud_id, target);
        if let Some(err) = self.validation_error.as_ref().or(self.import_error.as_ref()) {
            label.push_str(&format!("  ! {}", err));
        }
        label
    }
}

/// Address of a resource of `resource_type` named `name` inside `module_path`
///
/// `module_path` is dot separated (`a.b`), giving `module.a.module.b.<type>.<name>`.
pub fn address_for(module_path: &str, resource_type: &str, name: &str) -> String {
    if resource_type.is_empty() {
        return String::new();
    }

    let mut address: String = module_path
        .split('.')
        .filter(|m| !m.is_empty())
        .map(|m| format!("module.{}.", m))
        .collect();
    address.push_str(resource_type);
    address.push('.');
    address.push_str(name);
    address
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ResourceItem {
        let desc = ResourceDescriptor::new("/subscriptions/1/resourceGroups/rg1");
        ResourceItem::from_descriptor(&desc, 3, "res-")
    }

    #[test]
    fn test_from_descriptor_derives_name_from_pattern() {
        let item = item();
        assert_eq!(item.target_name, "res-3");
        assert_eq!(item.status, ItemStatus::Pending);
        assert!(item.target_address.is_empty());
        assert_eq!(item.revision, 0);
    }

    #[test]
    fn test_from_descriptor_keeps_preset_name() {
        let desc = ResourceDescriptor::new("/a").with_target_name("main");
        let item = ResourceItem::from_descriptor(&desc, 0, "res-");
        assert_eq!(item.target_name, "main");
    }

    #[test]
    fn test_set_target_type_recomputes_address() {
        let mut item = item();
        item.set_target_type("azurerm_resource_group");
        assert_eq!(item.target_address, "azurerm_resource_group.res-3");

        item.set_target_type("");
        assert!(item.target_address.is_empty());
    }

    #[test]
    fn test_module_path_qualifies_address() {
        let mut item = item().in_module("network.hub");
        assert!(item.target_address.is_empty());

        item.set_target_type("azurerm_virtual_network");
        assert_eq!(
            item.target_address,
            "module.network.module.hub.azurerm_virtual_network.res-3"
        );

        item.set_target_type("");
        assert!(item.target_address.is_empty());
    }

    #[test]
    fn test_address_for_root_module() {
        assert_eq!(
            address_for("", "azurerm_subnet", "a"),
            "azurerm_subnet.a"
        );
        assert_eq!(address_for("m", "azurerm_subnet", "a"), "module.m.azurerm_subnet.a");
    }

    #[test]
    fn test_set_status_bumps_revision() {
        let mut item = item();
        item.set_status(ItemStatus::Editing).unwrap();
        item.set_status(ItemStatus::Validated).unwrap();
        assert_eq!(item.revision, 2);
        assert_eq!(item.status, ItemStatus::Validated);
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut item = item();
        let err = item.set_status(ItemStatus::Imported).unwrap_err();
        assert!(matches!(err, ImportError::IllegalTransition { .. }));
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.revision, 0);
    }

    #[test]
    fn test_imported_only_reachable_from_importing() {
        for from in [
            ItemStatus::Pending,
            ItemStatus::Recommended,
            ItemStatus::Editing,
            ItemStatus::Validated,
            ItemStatus::Skipped,
            ItemStatus::Errored,
        ] {
            assert!(!from.can_transition_to(ItemStatus::Imported), "{}", from);
        }
        assert!(ItemStatus::Importing.can_transition_to(ItemStatus::Imported));
    }

    #[test]
    fn test_label_shows_error() {
        let mut item = item();
        item.set_target_type("azurerm_resource_group");
        item.import_error = Some("boom".to_string());
        let label = item.label();
        assert!(label.contains("azurerm_resource_group.res-3"));
        assert!(label.contains("boom"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ItemStatus::Imported).unwrap();
        assert_eq!(json, "\"imported\"");
    }
}
