use super::engine::{EngineError, IacEngine};
use crate::infrastructure::error::RejectReason;
use crate::traits::{CommandExecutor, FileSystem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// How long a command waits for the state lock held by a sibling import
const LOCK_TIMEOUT: &str = "-lock-timeout=300s";
/// Workspace sub-directory holding one import directory per worker
const IMPORT_DIR: &str = ".cloudport";
const STUB_FILE: &str = "import.tf";
const STATE_FILE: &str = "terraform.tfstate";
const STATE_BACKUP_FILE: &str = "terraform.tfstate.backup";

/// Parsed configuration address, `module.<m>.` repeated then `<type>.<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAddress {
    pub modules: Vec<String>,
    pub resource_type: String,
    pub name: String,
}

impl ResourceAddress {
    /// Parse `address`, which must name a resource of `resource_type`
    pub fn parse(address: &str, resource_type: &str) -> Option<Self> {
        let mut rest = address;
        let mut modules = Vec::new();
        while let Some(tail) = rest.strip_prefix("module.") {
            let (module, tail) = tail.split_once('.')?;
            if module.is_empty() {
                return None;
            }
            modules.push(module.to_string());
            rest = tail;
        }

        let name = rest.strip_prefix(resource_type)?.strip_prefix('.')?;
        if name.is_empty() || name.contains('.') {
            return None;
        }

        Some(Self {
            modules,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
        })
    }

    /// The same resource in the root module
    pub fn local(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}

/// Private directory one import runs in, with its own configuration and state
struct ImportSlot {
    dir: PathBuf,
    initialized: bool,
}

/// Terraform/OpenTofu engine driven through its CLI
///
/// Every import runs in an import directory of its own, so sibling imports
/// never read each other's stub configuration or wait on a shared state lock.
/// The imported resource is then moved into the workspace's local state at
/// its full address.
pub struct TerraformEngine {
    binary: String,
    working_dir: PathBuf,
    timeout: Duration,
    subscription_id: Option<String>,
    command: Arc<dyn CommandExecutor>,
    fs: Arc<dyn FileSystem>,
    idle_slots: Mutex<Vec<ImportSlot>>,
    slot_count: AtomicUsize,
}

impl TerraformEngine {
    pub fn new(
        binary: impl Into<String>,
        working_dir: &Path,
        timeout: Duration,
        command: Arc<dyn CommandExecutor>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.to_path_buf(),
            timeout,
            subscription_id: None,
            command,
            fs,
            idle_slots: Mutex::new(Vec::new()),
            slot_count: AtomicUsize::new(0),
        }
    }

    /// Subscription written into generated provider blocks
    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    fn provider_config(&self) -> String {
        let subscription = self
            .subscription_id
            .as_ref()
            .map(|id| format!("  subscription_id = \"{}\"\n", id))
            .unwrap_or_default();

        format!(
            r#"terraform {{
  required_providers {{
    azurerm = {{
      source = "hashicorp/azurerm"
    }}
  }}
}}

provider "azurerm" {{
  features {{}}
{}}}
"#,
            subscription
        )
    }

    /// Write a provider block if the directory has none, then run init
    pub fn init_workspace(&self) -> Result<()> {
        let provider_file = self.working_dir.join("provider.tf");
        if !self.fs.exists(&provider_file) {
            self.fs.write(&provider_file, &self.provider_config())?;
            tracing::info!(path = %provider_file.display(), "wrote provider configuration");
        }

        let output = self
            .command
            .execute(&self.binary, &["init", "-input=false"], &self.working_dir)
            .with_context(|| format!("Failed to execute {} init", self.binary))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} init failed: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn checkout_slot(&self) -> ImportSlot {
        if let Some(slot) = self.idle_slots.lock().await.pop() {
            return slot;
        }

        let n = self.slot_count.fetch_add(1, Ordering::SeqCst);
        ImportSlot {
            dir: self
                .working_dir
                .join(IMPORT_DIR)
                .join(format!("import-{}", n)),
            initialized: false,
        }
    }

    async fn prepare_slot(&self, slot: &mut ImportSlot) -> Result<(), EngineError> {
        if slot.initialized {
            return Ok(());
        }

        self.fs
            .create_dir_all(&slot.dir)
            .and_then(|_| self.fs.write(&slot.dir.join("provider.tf"), &self.provider_config()))
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        // Without a working provider no import in this session can succeed
        self.run(&["init", "-input=false"], &slot.dir)
            .await
            .map_err(|e| {
                EngineError::Unavailable(format!("init in {} failed: {}", slot.dir.display(), e))
            })?;

        tracing::debug!(dir = %slot.dir.display(), "prepared import directory");
        slot.initialized = true;
        Ok(())
    }

    async fn import_in(
        &self,
        slot: &mut ImportSlot,
        address: &ResourceAddress,
        full_address: &str,
        cloud_id: &str,
    ) -> Result<(), EngineError> {
        self.prepare_slot(slot).await?;

        let local = address.local();
        self.fs
            .write(
                &slot.dir.join(STUB_FILE),
                &format!(
                    "resource \"{}\" \"{}\" {{}}\n",
                    address.resource_type, address.name
                ),
            )
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        self.run(&["import", "-input=false", &local, cloud_id], &slot.dir)
            .await?;

        let state_in = format!("-state={}", slot.dir.join(STATE_FILE).display());
        let state_out = format!("-state-out={}", self.working_dir.join(STATE_FILE).display());
        self.run(
            &["state", "mv", LOCK_TIMEOUT, &state_in, &state_out, &local, full_address],
            &self.working_dir,
        )
        .await
    }

    /// Drop everything one import left in `slot`, keeping its initialized config
    fn clear_slot(&self, slot: &ImportSlot) {
        for file in [STUB_FILE, STATE_FILE, STATE_BACKUP_FILE] {
            let path = slot.dir.join(file);
            if !self.fs.exists(&path) {
                continue;
            }
            if let Err(e) = self.fs.remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to clean import directory");
            }
        }
    }

    async fn run(&self, args: &[&str], dir: &Path) -> Result<(), EngineError> {
        let output = self
            .command
            .execute_with_timeout(&self.binary, args, dir, self.timeout)
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        match output {
            None => Err(EngineError::Rejected(RejectReason::Timeout {
                seconds: self.timeout.as_secs(),
            })),
            Some(output) if output.status.success() => Ok(()),
            Some(output) => Err(EngineError::Rejected(RejectReason::Engine(
                failure_message(&output),
            ))),
        }
    }
}

fn failure_message(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exit status {}", output.status.code().unwrap_or(-1))
    } else {
        stderr
    }
}

#[async_trait]
impl IacEngine for TerraformEngine {
    fn get_name(&self) -> &str {
        &self.binary
    }

    fn check_installed(&self) -> bool {
        match self
            .command
            .execute(&self.binary, &["version"], &self.working_dir)
        {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn import(
        &self,
        address: &str,
        resource_type: &str,
        cloud_id: &str,
    ) -> Result<(), EngineError> {
        let parsed = ResourceAddress::parse(address, resource_type).ok_or_else(|| {
            EngineError::Rejected(RejectReason::Engine(format!(
                "address {} does not match type {}",
                address, resource_type
            )))
        })?;

        let mut slot = self.checkout_slot().await;
        let result = self.import_in(&mut slot, &parsed, address, cloud_id).await;
        self.clear_slot(&slot);
        self.idle_slots.lock().await.push(slot);

        result
    }

    fn remove_from_state(&self, address: &str) -> Result<(), EngineError> {
        let output = self
            .command
            .execute(
                &self.binary,
                &["state", "rm", LOCK_TIMEOUT, address],
                &self.working_dir,
            )
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(EngineError::Rejected(RejectReason::Engine(
                failure_message(&output),
            )))
        }
    }
}
