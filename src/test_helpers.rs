//! Test helpers for building import sessions
//!
//! This module provides a scripted IaC engine and builders for discovered
//! resources so that session tests read like scenarios.

#![cfg(test)]

use async_trait::async_trait;

use crate::iac::{EngineError, IacEngine};
use crate::infrastructure::discovery::ResourceDescriptor;
use crate::infrastructure::error::RejectReason;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted result of one engine call
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Success,
    Unavailable,
    Rejected(&'static str),
    Timeout,
}

impl MockOutcome {
    fn into_result(self) -> Result<(), EngineError> {
        match self {
            MockOutcome::Success => Ok(()),
            MockOutcome::Unavailable => Err(EngineError::Unavailable(
                "engine binary not found".to_string(),
            )),
            MockOutcome::Rejected(msg) => {
                Err(EngineError::Rejected(RejectReason::Engine(msg.to_string())))
            }
            MockOutcome::Timeout => {
                Err(EngineError::Rejected(RejectReason::Timeout { seconds: 1 }))
            }
        }
    }
}

/// A call observed by the mock engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Import {
        address: String,
        resource_type: String,
        cloud_id: String,
    },
    RemoveFromState {
        address: String,
    },
}

/// Engine with per-resource scripted outcomes; unscripted calls succeed
pub struct MockEngine {
    import_outcomes: Mutex<HashMap<String, VecDeque<MockOutcome>>>,
    remove_outcomes: Mutex<HashMap<String, VecDeque<MockOutcome>>>,
    calls: Mutex<Vec<EngineCall>>,
    delay: Duration,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            import_outcomes: Mutex::new(HashMap::new()),
            remove_outcomes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    /// Queue an outcome for the next import of `cloud_id`
    pub fn with_outcome(self, cloud_id: &str, outcome: MockOutcome) -> Self {
        self.import_outcomes
            .lock()
            .unwrap()
            .entry(cloud_id.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Queue an outcome for the next state removal of `address`
    pub fn with_remove_outcome(self, address: &str, outcome: MockOutcome) -> Self {
        self.remove_outcomes
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Make every import take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Cloud identifiers passed to `import`, in call order
    pub fn import_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Import { cloud_id, .. } => Some(cloud_id),
                EngineCall::RemoveFromState { .. } => None,
            })
            .collect()
    }

    /// Highest number of imports observed running at once
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IacEngine for MockEngine {
    fn get_name(&self) -> &str {
        "mock"
    }

    fn check_installed(&self) -> bool {
        true
    }

    async fn import(
        &self,
        address: &str,
        resource_type: &str,
        cloud_id: &str,
    ) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(EngineCall::Import {
            address: address.to_string(),
            resource_type: resource_type.to_string(),
            cloud_id: cloud_id.to_string(),
        });

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        self.import_outcomes
            .lock()
            .unwrap()
            .get_mut(cloud_id)
            .and_then(|q| q.pop_front())
            .unwrap_or(MockOutcome::Success)
            .into_result()
    }

    fn remove_from_state(&self, address: &str) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(EngineCall::RemoveFromState {
            address: address.to_string(),
        });

        self.remove_outcomes
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(|q| q.pop_front())
            .unwrap_or(MockOutcome::Success)
            .into_result()
    }
}

/// Descriptor for a resource group recommended as `azurerm_resource_group`
pub fn resource_group(name: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(format!("/subscriptions/sub/resourceGroups/{}", name))
        .with_kind("Microsoft.Resources/resourceGroups")
}

/// Descriptor for a virtual machine, which has no recommended type
pub fn virtual_machine(rg: &str, name: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(format!(
        "/subscriptions/sub/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}",
        rg, name
    ))
    .with_kind("Microsoft.Compute/virtualMachines")
}

/// Descriptor for a virtual network recommended as `azurerm_virtual_network`
pub fn virtual_network(rg: &str, name: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(format!(
        "/subscriptions/sub/resourceGroups/{}/providers/Microsoft.Network/virtualNetworks/{}",
        rg, name
    ))
    .with_kind("Microsoft.Network/virtualNetworks")
}

/// Generic recommended resource identified only by `id`
pub fn recommended(id: &str, resource_type: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(id).with_recommended_type(resource_type)
}
