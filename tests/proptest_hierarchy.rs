//! Property-based tests for hierarchy resolution
//!
//! Random management-group chains are served from an in-memory backend; the
//! resolver must derive the same parents and paths whatever the depth, and
//! answer repeated lookups without touching the backend.

use anyhow::Result;
use armtree::arm::{RestClient, RestResponse};
use armtree::resource::HierarchyResolver;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

struct ChainBackend {
    routes: HashMap<String, Value>,
    calls: AtomicUsize,
}

impl ChainBackend {
    fn new(names: &[String]) -> Self {
        let mut routes = HashMap::new();
        routes.insert(
            "/subscriptions/amb/providers".to_string(),
            json!({"value": [{"namespace": "Microsoft.Management", "resourceTypes": [
                {"resourceType": "managementGroups", "apiVersions": ["2023-04-01"]}
            ]}]}),
        );

        for (i, name) in names.iter().enumerate() {
            let parent = i
                .checked_sub(1)
                .map(|p| json!({"id": mg_id(&names[p])}))
                .unwrap_or(Value::Null);
            routes.insert(
                mg_id(name),
                json!({
                    "id": mg_id(name),
                    "type": "Microsoft.Management/managementGroups",
                    "name": name,
                    "properties": {"displayName": name, "details": {"parent": parent}}
                }),
            );
            routes.insert(format!("{}/descendants", mg_id(name)), json!({"value": []}));
        }

        Self {
            routes,
            calls: AtomicUsize::new(0),
        }
    }
}

impl RestClient for ChainBackend {
    async fn get(&self, path: &str) -> Result<RestResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = path.split('?').next().unwrap_or(path);
        Ok(match self.routes.get(key) {
            Some(body) => RestResponse::json(200, body),
            None => RestResponse::json(
                404,
                &json!({"error": {"code": "NotFound", "message": key}}),
            ),
        })
    }
}

fn mg_id(name: &str) -> String {
    format!("/providers/Microsoft.Management/managementGroups/{}", name)
}

fn arb_chain() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("[a-z][a-z0-9]{2,10}", 1..7)
        .prop_map(|set| set.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn chain_paths_follow_ancestors(names in arb_chain()) {
        let leaf = names.last().cloned().unwrap();
        let mut resolver = HierarchyResolver::new(ChainBackend::new(&names), "amb");

        let node = tokio_test::block_on(resolver.resolve(&mg_id(&leaf))).unwrap();

        let expected_parents: Vec<String> =
            names[..names.len() - 1].iter().map(|n| mg_id(n)).collect();
        prop_assert_eq!(&node.parents, &expected_parents);
        prop_assert_eq!(node.resource_path, format!("/{}", names.join("/")));
        prop_assert_eq!(resolver.nodes().len(), names.len());
    }

    #[test]
    fn repeated_resolution_is_free(names in arb_chain()) {
        let mut resolver = HierarchyResolver::new(ChainBackend::new(&names), "amb");

        for name in &names {
            tokio_test::block_on(resolver.resolve(&mg_id(name))).unwrap();
        }
        let calls = resolver.client().rest().calls.load(Ordering::SeqCst);

        for name in names.iter().rev() {
            let first = resolver.nodes().search(&mg_id(name)).cloned().unwrap();
            let again = tokio_test::block_on(resolver.resolve(&mg_id(name))).unwrap();
            prop_assert_eq!(first, again);
        }
        prop_assert_eq!(resolver.client().rest().calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn rebuild_reproduces_nodes(names in arb_chain()) {
        let mut resolver = HierarchyResolver::new(ChainBackend::new(&names), "amb");
        let leaf = names.last().cloned().unwrap();
        tokio_test::block_on(resolver.resolve(&mg_id(&leaf))).unwrap();

        let before: Vec<_> = resolver.nodes().show_all().into_iter().cloned().collect();
        tokio_test::block_on(resolver.rebuild_all()).unwrap();

        for node in &before {
            prop_assert_eq!(resolver.nodes().search(&node.id), Some(node));
        }
    }
}
