//! armtree
//!
//! Navigable in-memory model of an Azure resource hierarchy (management
//! groups, subscriptions, resource groups, resources) crawled from the
//! resource-manager REST API, with Terraform export for management groups.

pub mod arm;
pub mod config;
pub mod resource;
pub mod terraform;
