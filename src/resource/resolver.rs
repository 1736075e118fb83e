//! Hierarchy resolver
//!
//! Turns an id into a fully resolved [`ResourceNode`]: default fields,
//! provider, children, parent chain and derived paths. Ancestors are resolved
//! through the same pipeline, so every node on the way ends up in the node
//! cache.
//!
//! Resolution is depth-first and strictly sequential. The resolver owns both
//! caches and is driven through `&mut self`, which is the only writer.

use super::cache::NodeCache;
use super::identity::{self, ChildrenStrategy, ParentStrategy, ResourceKind};
use super::node::{value_at, ChildSummary, ResourceNode};
use super::versions::{ProviderVersionCache, Release};
use crate::arm::client::extract_items;
use crate::arm::error::is_fatal;
use crate::arm::{ArmClient, ArmError, RestClient};
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use serde_json::Value;

/// Upper bound on ancestor chains and nested resolutions
pub const DEFAULT_MAX_DEPTH: usize = 16;

pub struct HierarchyResolver<C> {
    client: ArmClient<C>,
    versions: ProviderVersionCache,
    nodes: NodeCache,
    /// Ambient subscription used for provider listings
    subscription: String,
    max_depth: usize,
    /// Ids whose resolution is currently on the stack
    in_progress: Vec<String>,
}

impl<C: RestClient> HierarchyResolver<C> {
    pub fn new(rest: C, subscription: &str) -> Self {
        Self {
            client: ArmClient::new(rest),
            versions: ProviderVersionCache::new(),
            nodes: NodeCache::new(),
            subscription: subscription.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            in_progress: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn client(&self) -> &ArmClient<C> {
        &self.client
    }

    pub fn nodes(&self) -> &NodeCache {
        &self.nodes
    }

    pub fn versions(&self) -> &ProviderVersionCache {
        &self.versions
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    // =========================================================================
    // Provider versions
    // =========================================================================

    /// Rebuild the version cache from the ambient subscription
    pub async fn refresh_versions(&mut self) -> Result<()> {
        self.versions.refresh(&self.client, &self.subscription).await
    }

    pub async fn get_version(&mut self, type_name: &str, release: Release) -> String {
        self.versions
            .get_version(&self.client, &self.subscription, type_name, release)
            .await
    }

    pub async fn version_params(&mut self, type_name: &str) -> String {
        self.versions
            .version_params(&self.client, &self.subscription, type_name)
            .await
    }

    /// `path` plus the stable api-version of whatever `path` classifies as
    async fn versioned_path(&mut self, path: &str) -> String {
        let type_name = identity::classify_node(path);
        let params = self.version_params(&type_name).await;
        format!("{}{}", path, params)
    }

    // =========================================================================
    // Resolution pipeline
    // =========================================================================

    /// Resolve `id`, answering from the node cache when possible
    pub fn resolve<'a>(&'a mut self, id: &'a str) -> BoxFuture<'a, Result<ResourceNode>> {
        Box::pin(async move {
            if let Some(node) = self.nodes.search(id) {
                tracing::debug!("Node cache hit for {}", id);
                return Ok(node.clone());
            }

            self.enter(id)?;
            let result = self.resolve_uncached(id).await;
            self.leave();

            let node = result?;
            if !self.nodes.insert_if_absent(node.clone()) {
                tracing::debug!("{} was registered during its own resolution", node.id);
            }
            Ok(self.nodes.search(&node.id).cloned().unwrap_or(node))
        })
    }

    /// Re-run the pipeline for a single resource, replacing its cache entry
    pub async fn update(&mut self, id: &str) -> Result<ResourceNode> {
        let payload = self.fetch_payload(id).await?;

        let count = payload
            .get("value")
            .and_then(|v| v.as_array())
            .map(|items| items.len());
        let payload = match count {
            Some(count) if count > 1 => {
                return Err(ArmError::MultipleResources {
                    id: id.to_string(),
                    count,
                }
                .into());
            }
            Some(_) => extract_items(&payload)
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("'{}' matched no resource", id))?,
            None => payload,
        };

        tracing::info!("Updating {}", id);

        self.enter(id)?;
        let result = self.build_node(id, &payload).await;
        self.leave();

        // The previous entry stays cached unless the new node was built
        let node = result?;
        self.nodes.remove(id);
        self.nodes.remove(&node.id);
        self.nodes.insert_if_absent(node.clone());
        Ok(node)
    }

    /// Re-resolve every cached id from scratch.
    ///
    /// Every previously cached id is attempted; a failing id is logged and
    /// the remaining ones are still rebuilt. Returns the number of ids
    /// rebuilt, or an error listing every id that failed.
    pub async fn rebuild_all(&mut self) -> Result<usize> {
        let ids = self.nodes.ids();
        tracing::info!("Rebuilding {} cached nodes", ids.len());

        self.nodes.clear();
        let mut failed = Vec::new();
        for id in &ids {
            if let Err(e) = self.resolve(id).await {
                tracing::error!("Failed to rebuild {}: {:#}", id, e);
                failed.push(format!("{}: {:#}", id, e));
            }
        }

        if !failed.is_empty() {
            return Err(anyhow!(
                "Failed to rebuild {} of {} nodes:\n{}",
                failed.len(),
                ids.len(),
                failed.join("\n")
            ));
        }
        Ok(ids.len())
    }

    /// Append children of one policy type to a resolved node
    pub async fn augment_children(&mut self, id: &str, child_type: &str) -> Result<ResourceNode> {
        if !ResourceKind::from_type(child_type).is_policy_child() {
            return Err(ArmError::UnsupportedChildType {
                child_type: child_type.to_string(),
            }
            .into());
        }

        let mut node = self.resolve(id).await?;
        let added = self.append_children_of_type(&mut node, child_type).await?;
        tracing::debug!("Added {} {} children to {}", added, child_type, node.id);

        if let Some(cached) = self.nodes.get_mut(&node.id) {
            cached.children = node.children.clone();
            cached.linked_resources = node.linked_resources.clone();
        }
        Ok(node)
    }

    fn enter(&mut self, id: &str) -> Result<()> {
        if self.in_progress.iter().any(|p| p.eq_ignore_ascii_case(id)) {
            return Err(ArmError::AncestorCycle { id: id.to_string() }.into());
        }
        if self.in_progress.len() >= self.max_depth {
            return Err(ArmError::AncestorDepthExceeded {
                id: id.to_string(),
                max_depth: self.max_depth,
            }
            .into());
        }
        self.in_progress.push(id.to_string());
        Ok(())
    }

    fn leave(&mut self) {
        self.in_progress.pop();
    }

    async fn fetch_payload(&mut self, id: &str) -> Result<Value> {
        let path = self.versioned_path(id).await;
        self.client
            .get(&path)
            .await
            .with_context(|| format!("Failed to fetch {}", id))
    }

    async fn resolve_uncached(&mut self, id: &str) -> Result<ResourceNode> {
        let payload = self.fetch_payload(id).await?;
        self.build_node(id, &payload).await
    }

    async fn build_node(&mut self, requested_id: &str, payload: &Value) -> Result<ResourceNode> {
        let payload_id = payload
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or(requested_id)
            .to_string();

        let name_field = if identity::is_subscription(&payload_id) {
            "displayName"
        } else {
            "name"
        };
        let classified = identity::classify_node(&payload_id);
        let mut node = ResourceNode::from_payload(payload, name_field, &classified);
        if node.id.is_empty() {
            node.id = payload_id;
        }

        node.provider = self.resolve_provider(&node.resource_type);

        let kind = ResourceKind::from_type(&node.resource_type);
        self.resolve_children(&mut node, kind).await?;

        node.parent = resolve_parent_field(payload, kind);
        node.parents = self.walk_ancestors(&node.id, &node.parent).await?;

        node.parent_path = node
            .parents
            .iter()
            .map(|p| identity::trailing_segment(p))
            .collect();
        node.resource_path = format!("{}/{}", node.parent_path, node.name);

        tracing::debug!("Resolved {} as {}", node.id, node.resource_path);
        Ok(node)
    }

    fn resolve_provider(&self, resource_type: &str) -> String {
        match self.versions.search_type(resource_type.trim_start_matches('/')) {
            Some(entry) => entry.provider.clone(),
            None => {
                tracing::warn!("No provider known for type '{}'", resource_type);
                String::new()
            }
        }
    }

    // =========================================================================
    // Children
    // =========================================================================

    async fn resolve_children(&mut self, node: &mut ResourceNode, kind: ResourceKind) -> Result<()> {
        match kind.children_strategy() {
            ChildrenStrategy::Descendants { child_types } => {
                let path = self.versioned_path(&format!("{}/descendants", node.id)).await;
                let descendants: Vec<ChildSummary> = self
                    .client
                    .list(&path)
                    .await
                    .with_context(|| format!("Failed to list descendants of {}", node.id))?
                    .iter()
                    .map(ChildSummary::from)
                    .collect();

                node.children = descendants
                    .iter()
                    .filter(|d| {
                        d.declared_parent()
                            .is_some_and(|p| p.eq_ignore_ascii_case(&node.id))
                    })
                    .cloned()
                    .collect();
                node.linked_resources = descendants;

                for child_kind in child_types {
                    let Some(child_type) = child_kind.type_tag() else {
                        continue;
                    };
                    if let Err(e) = self.append_children_of_type(node, child_type).await {
                        if is_fatal(&e) {
                            return Err(e);
                        }
                        tracing::error!(
                            "Skipping {} children of {}: {:#}",
                            child_type,
                            node.id,
                            e
                        );
                    }
                }
            }
            ChildrenStrategy::Collection(collection) => {
                let path = self
                    .versioned_path(&format!("{}/{}", node.id, collection))
                    .await;
                node.children = self
                    .client
                    .list(&path)
                    .await
                    .with_context(|| format!("Failed to list {} of {}", collection, node.id))?
                    .iter()
                    .map(ChildSummary::from)
                    .collect();
            }
            ChildrenStrategy::None => {
                node.children.clear();
                node.linked_resources.clear();
            }
        }
        Ok(())
    }

    /// Fetch `{id}/providers/{child_type}` and append what is new. Entries
    /// declared at this node's own scope become children; everything
    /// (inherited entries included) becomes a linked resource.
    async fn append_children_of_type(
        &mut self,
        node: &mut ResourceNode,
        child_type: &str,
    ) -> Result<usize> {
        let scope = format!("{}/providers/{}", node.id, child_type);
        let path = self.versioned_path(&scope).await;
        let items = self.client.list(&path).await?;

        let mut added = 0;
        for item in items.iter().map(ChildSummary::from) {
            if !node.has_child(&item.id) && identity::is_scoped_under(&item.id, &scope) {
                node.children.push(item.clone());
                added += 1;
            }
            if !node.has_linked(&item.id) {
                node.linked_resources.push(item);
            }
        }
        Ok(added)
    }

    // =========================================================================
    // Parents
    // =========================================================================

    /// Parent of an already known or resolvable node. Non-fatal failures
    /// (typically permission denials on an ancestor) read as "no parent".
    async fn get_parent(&mut self, id: &str) -> Result<String> {
        match self.resolve(id).await {
            Ok(node) => Ok(node.parent),
            Err(e) if is_fatal(&e) => Err(e),
            Err(e) => {
                tracing::warn!("Treating {} as having no parent: {:#}", id, e);
                Ok(String::new())
            }
        }
    }

    /// Ancestor ids of `id`, root-most first
    async fn walk_ancestors(&mut self, id: &str, first_parent: &str) -> Result<Vec<String>> {
        let mut chain: Vec<String> = Vec::new();
        let mut current = first_parent.to_string();

        while !current.is_empty() {
            if current.eq_ignore_ascii_case(id) || chain.iter().any(|c| c.eq_ignore_ascii_case(&current)) {
                return Err(ArmError::AncestorCycle { id: current }.into());
            }
            if chain.len() >= self.max_depth {
                return Err(ArmError::AncestorDepthExceeded {
                    id: id.to_string(),
                    max_depth: self.max_depth,
                }
                .into());
            }
            chain.push(current.clone());
            current = self.get_parent(&current).await?;
        }

        chain.reverse();
        Ok(chain)
    }
}

fn resolve_parent_field(payload: &Value, kind: ResourceKind) -> String {
    match kind.parent_strategy() {
        ParentStrategy::PayloadField(path) => value_at(payload, path).unwrap_or_default().to_string(),
        ParentStrategy::None => String::new(),
    }
}
