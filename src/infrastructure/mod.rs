//! Cloud-facing side of an import session
//!
//! - Discovering candidate resources (Azure CLI, or a saved mapping file)
//! - Mapping cloud resource kinds to configuration resource types
//! - The error type shared by the whole import pipeline
//!
//! # Usage
//!
//! ```bash
//! # Everything in a resource group
//! cloudport resource-group my-rg -o ./imported
//!
//! # Resources matching a resource-graph predicate, without prompts
//! cloudport query "type =~ 'microsoft.network/virtualnetworks'" -n -o ./imported
//!
//! # Replay an edited mapping file
//! cloudport mapping-file ./imported/cloudport_mapping.json -n -o ./imported
//! ```

pub mod discovery;
pub mod error;
pub mod providers;
pub mod resource_mapper;
