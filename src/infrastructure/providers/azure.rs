use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::infrastructure::discovery::{DiscoveryProvider, ResourceDescriptor, Selector};
use crate::infrastructure::error::{ImportError, ImportResult};
use crate::traits::CommandExecutor;

const AZ: &str = "az";
const RESOURCE_GROUP_KIND: &str = "Microsoft.Resources/resourceGroups";
/// Page size of resource-graph queries
const GRAPH_PAGE_SIZE: &str = "1000";

lazy_static! {
    static ref RESOURCE_GROUP_ID: Regex =
        Regex::new(r"(?i)^/subscriptions/[^/]+/resourceGroups/([^/]+)/?$").unwrap();
}

/// Resource as reported by `az resource` and `az group`
#[derive(Debug, Deserialize)]
struct AzResource {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

impl AzResource {
    fn into_descriptor(self) -> ResourceDescriptor {
        ResourceDescriptor::new(self.id)
            .with_display_name(self.name)
            .with_kind(self.kind)
    }
}

/// One page of `az graph query` output
#[derive(Debug, Deserialize)]
struct GraphResponse {
    data: Vec<AzResource>,
    /// Present while more pages follow
    #[serde(default, alias = "skipToken")]
    skip_token: Option<String>,
}

/// Azure discovery through the `az` command line
///
/// Requires an authenticated Azure CLI (`az login`). Resource-graph queries
/// also need the `resource-graph` extension.
pub struct AzureDiscovery {
    command: Arc<dyn CommandExecutor>,
    subscription_id: Option<String>,
    working_dir: PathBuf,
}

impl AzureDiscovery {
    pub fn new(command: Arc<dyn CommandExecutor>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            subscription_id: None,
            working_dir: working_dir.into(),
        }
    }

    /// Scope every call to a subscription
    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    fn az(&self, args: &[&str]) -> ImportResult<String> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["--output", "json"]);
        if let Some(sub) = &self.subscription_id {
            full.extend(["--subscription", sub.as_str()]);
        }

        tracing::debug!(args = ?full, "running az");
        let output = self
            .command
            .execute(AZ, &full, &self.working_dir)
            .map_err(|e| ImportError::Discovery(format!("{:#}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ImportError::Discovery(format!(
                "az {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn show_group(&self, name: &str) -> ImportResult<ResourceDescriptor> {
        let json = self.az(&["group", "show", "--name", name])?;
        let group: AzResource = serde_json::from_str(&json)?;
        Ok(ResourceDescriptor::new(group.id)
            .with_display_name(group.name)
            .with_kind(RESOURCE_GROUP_KIND))
    }

    fn show_resource(&self, id: &str) -> ImportResult<ResourceDescriptor> {
        if let Some(caps) = RESOURCE_GROUP_ID.captures(id) {
            return self.show_group(&caps[1]);
        }

        let json = self.az(&["resource", "show", "--ids", id])?;
        let resource: AzResource = serde_json::from_str(&json)?;
        Ok(resource.into_descriptor())
    }

    fn list_group(&self, name: &str) -> ImportResult<Vec<ResourceDescriptor>> {
        let mut found = vec![self.show_group(name)?];

        let json = self.az(&["resource", "list", "--resource-group", name])?;
        let resources: Vec<AzResource> = serde_json::from_str(&json)?;
        found.extend(resources.into_iter().map(AzResource::into_descriptor));
        Ok(found)
    }

    fn query(&self, predicate: &str) -> ImportResult<Vec<ResourceDescriptor>> {
        let query = format!(
            "Resources | where {} | project id, name, type | order by id asc",
            predicate
        );

        let mut found = Vec::new();
        let mut skip_token: Option<String> = None;
        loop {
            let mut args = vec!["graph", "query", "-q", query.as_str(), "--first", GRAPH_PAGE_SIZE];
            if let Some(token) = &skip_token {
                args.extend(["--skip-token", token.as_str()]);
            }

            let json = self.az(&args)?;
            let page: GraphResponse = serde_json::from_str(&json)?;
            found.extend(page.data.into_iter().map(AzResource::into_descriptor));

            match page.skip_token.filter(|t| !t.is_empty()) {
                Some(next) if skip_token.as_deref() == Some(next.as_str()) => {
                    return Err(ImportError::Discovery(
                        "resource graph returned the same page token twice".to_string(),
                    ));
                }
                Some(next) => {
                    tracing::debug!(count = found.len(), "fetching next resource graph page");
                    skip_token = Some(next);
                }
                None => return Ok(found),
            }
        }
    }
}

impl DiscoveryProvider for AzureDiscovery {
    fn discover(&self, selector: &Selector) -> ImportResult<Vec<ResourceDescriptor>> {
        match selector {
            Selector::Resource {
                id,
                name,
                resource_type,
            } => {
                let mut desc = self.show_resource(id)?;
                if let Some(name) = name {
                    desc = desc.with_target_name(name);
                }
                if let Some(rt) = resource_type {
                    desc = desc.with_preset_type(rt);
                }
                Ok(vec![desc])
            }
            Selector::ResourceGroup { name } => self.list_group(name),
            Selector::Query { predicate } => self.query(predicate),
            Selector::MappingFile { .. } => Err(ImportError::Discovery(
                "mapping files are not read through the Azure CLI".to_string(),
            )),
        }
    }
}
