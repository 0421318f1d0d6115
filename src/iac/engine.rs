use async_trait::async_trait;

use crate::infrastructure::error::RejectReason;

/// Failure of a call into the IaC engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine process could not be started or reached
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    /// The engine ran but refused the operation
    #[error(transparent)]
    Rejected(RejectReason),
}

/// Trait for Infrastructure as Code engines (Terraform, OpenTofu)
///
/// Implementations are called from import workers, so `import` may run
/// concurrently for different addresses.
#[async_trait]
pub trait IacEngine: Send + Sync {
    /// Get the name of this engine (e.g., "terraform", "tofu")
    fn get_name(&self) -> &str;

    /// Check if the engine is installed and available
    fn check_installed(&self) -> bool;

    /// Import the cloud resource `cloud_id` into state at `address`
    async fn import(
        &self,
        address: &str,
        resource_type: &str,
        cloud_id: &str,
    ) -> Result<(), EngineError>;

    /// Remove `address` from state, reverting an earlier import
    fn remove_from_state(&self, address: &str) -> Result<(), EngineError>;
}
