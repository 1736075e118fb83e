//! Resource hierarchy model
//!
//! Builds a navigable, id-keyed model of management groups, subscriptions,
//! resource groups and resources by crawling the resource-manager API.
//!
//! # Architecture
//!
//! - [`identity`] - ordered id classification and per-kind strategies
//! - [`versions`] - provider API-version cache (latest / stable)
//! - [`node`] - resolved nodes and child summaries
//! - [`cache`] - node cache keyed by id
//! - [`resolver`] - the resolution pipeline tying it all together
//!
//! # Example
//!
//! ```ignore
//! use armtree::resource::HierarchyResolver;
//!
//! async fn path_of(resolver: &mut HierarchyResolver<impl armtree::arm::RestClient>) -> anyhow::Result<String> {
//!     let node = resolver
//!         .resolve("/providers/Microsoft.Management/managementGroups/contoso")
//!         .await?;
//!     Ok(node.resource_path)
//! }
//! ```

pub mod cache;
pub mod identity;
pub mod node;
pub mod resolver;
pub mod versions;

pub use cache::NodeCache;
pub use identity::{classify, classify_node, ResourceKind};
pub use node::{ChildSummary, ResourceNode};
pub use resolver::{HierarchyResolver, DEFAULT_MAX_DEPTH};
pub use versions::{ProviderVersionCache, ProviderVersionEntry, Release};
