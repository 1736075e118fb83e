//! Resource identity
//!
//! Classifies opaque resource-manager ids into `<namespace>/<resourceType>`
//! tags through an ordered rule table, and maps tags onto [`ResourceKind`],
//! which carries the per-type children and parent strategies.

use regex::Regex;
use std::sync::OnceLock;

pub const MANAGEMENT_GROUPS: &str = "Microsoft.Management/managementGroups";
pub const SUBSCRIPTIONS: &str = "Microsoft.Resources/subscriptions";
pub const RESOURCE_GROUPS: &str = "Microsoft.Resources/resourceGroups";
pub const RESOURCES: &str = "Microsoft.Resources/resources";
pub const POLICY_DEFINITIONS: &str = "Microsoft.Authorization/policyDefinitions";
pub const POLICY_SET_DEFINITIONS: &str = "Microsoft.Authorization/policySetDefinitions";
pub const POLICY_ASSIGNMENTS: &str = "Microsoft.Authorization/policyAssignments";

/// Type reported for subscriptions inside management-group descendant listings
const MANAGEMENT_GROUP_SUBSCRIPTIONS: &str = "Microsoft.Management/managementGroups/subscriptions";

/// What a matching rule yields
#[derive(Debug, Clone, Copy)]
enum Tag {
    /// `<namespace>/<resourceType>` from the two segments after the last
    /// match of the rule's pattern
    LastProvider,
    Fixed(&'static str),
}

struct Rule {
    pattern: Regex,
    tag: Tag,
}

/// Ordered classification table, first match wins.
///
/// The provider rule only looks at the last `/providers` segment, so an
/// extension resource nested under another resource classifies as the inner
/// type. When that segment is not followed by a namespace and a type the
/// rule does not match, even if an earlier `/providers/` would. The
/// collection rules only match when the collection is the final segment.
static RULES: OnceLock<Vec<Rule>> = OnceLock::new();

fn rules() -> &'static [Rule] {
    RULES.get_or_init(|| {
        let table: [(&str, Tag); 4] = [
            (r"(?i)/providers(?:/|$)", Tag::LastProvider),
            (r"(?i)/resources$", Tag::Fixed(RESOURCES)),
            (r"(?i)/resourceGroups$", Tag::Fixed(RESOURCE_GROUPS)),
            (r"(?i)/subscriptions$", Tag::Fixed(SUBSCRIPTIONS)),
        ];
        table
            .into_iter()
            .map(|(pattern, tag)| Rule {
                pattern: Regex::new(pattern)
                    .unwrap_or_else(|e| panic!("Invalid classification pattern {}: {}", pattern, e)),
                tag,
            })
            .collect()
    })
}

/// `<namespace>/<resourceType>` at the start of whatever follows `/providers/`
fn provider_segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([^/]+)/([^/]+)(?:/.*)?$")
            .unwrap_or_else(|e| panic!("Invalid provider segment pattern: {}", e))
    })
}

fn subscription_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^/subscriptions/[^/]+$")
            .unwrap_or_else(|e| panic!("Invalid subscription pattern: {}", e))
    })
}

/// Classify an id or request path. Returns an empty string when no rule
/// matches. Any query string is ignored.
pub fn classify(id: &str) -> String {
    let path = strip_query(id);

    for rule in rules() {
        match rule.tag {
            Tag::LastProvider => {
                let Some(last) = rule.pattern.find_iter(path).last() else {
                    continue;
                };
                let Some(caps) = provider_segment_pattern().captures(&path[last.end()..]) else {
                    continue;
                };
                return format!("{}/{}", &caps[1], &caps[2]);
            }
            Tag::Fixed(tag) => {
                if rule.pattern.is_match(path) {
                    return tag.to_string();
                }
            }
        }
    }

    String::new()
}

/// Classify a node id. Ids such as `/subscriptions/{id}` or
/// `/subscriptions/{id}/resourceGroups/{name}` match no rule themselves, so
/// their collection (the id minus its final segment) is classified instead.
pub fn classify_node(id: &str) -> String {
    let direct = classify(id);
    if !direct.is_empty() {
        return direct;
    }
    let path = strip_query(id).trim_end_matches('/');
    match path.rsplit_once('/') {
        Some((collection, _)) if !collection.is_empty() => classify(collection),
        _ => String::new(),
    }
}

/// `/subscriptions/{id}` exactly
pub fn is_subscription(id: &str) -> bool {
    subscription_pattern().is_match(strip_query(id))
}

/// Trailing segment of an id, with its leading slash
pub fn trailing_segment(id: &str) -> &str {
    let path = strip_query(id);
    match path.rfind('/') {
        Some(idx) => &path[idx..],
        None => path,
    }
}

/// Case-insensitive "is `id` lexically inside `scope`"
pub fn is_scoped_under(id: &str, scope: &str) -> bool {
    let scope = scope.trim_end_matches('/');
    id.len() > scope.len() + 1
        && id.is_char_boundary(scope.len())
        && id[..scope.len()].eq_ignore_ascii_case(scope)
        && id.as_bytes()[scope.len()] == b'/'
}

fn strip_query(id: &str) -> &str {
    id.split('?').next().unwrap_or(id)
}

/// Node types the resolver knows how to expand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ManagementGroup,
    Subscription,
    ResourceGroup,
    PolicyDefinition,
    PolicySetDefinition,
    PolicyAssignment,
    Generic,
}

/// How a node's children are discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildrenStrategy {
    /// `{id}/descendants`, direct children filtered by declared parent, then
    /// the listed policy child types appended
    Descendants {
        child_types: &'static [ResourceKind],
    },
    /// `{id}/{collection}`
    Collection(&'static str),
    None,
}

/// How a node's immediate parent is discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentStrategy {
    /// Dot-free JSON path into the payload
    PayloadField(&'static [&'static str]),
    None,
}

impl ResourceKind {
    /// Child types appended to management groups
    pub const POLICY_CHILD_KINDS: &'static [ResourceKind] = &[
        ResourceKind::PolicyDefinition,
        ResourceKind::PolicySetDefinition,
        ResourceKind::PolicyAssignment,
    ];

    pub fn from_type(resource_type: &str) -> Self {
        let t = resource_type.trim_start_matches('/');
        let known = [
            (MANAGEMENT_GROUPS, ResourceKind::ManagementGroup),
            (SUBSCRIPTIONS, ResourceKind::Subscription),
            (MANAGEMENT_GROUP_SUBSCRIPTIONS, ResourceKind::Subscription),
            (RESOURCE_GROUPS, ResourceKind::ResourceGroup),
            (POLICY_DEFINITIONS, ResourceKind::PolicyDefinition),
            (POLICY_SET_DEFINITIONS, ResourceKind::PolicySetDefinition),
            (POLICY_ASSIGNMENTS, ResourceKind::PolicyAssignment),
        ];
        known
            .iter()
            .find(|(tag, _)| tag.eq_ignore_ascii_case(t))
            .map(|(_, kind)| *kind)
            .unwrap_or(ResourceKind::Generic)
    }

    /// Canonical type tag, `None` for generic resources
    pub fn type_tag(&self) -> Option<&'static str> {
        match self {
            ResourceKind::ManagementGroup => Some(MANAGEMENT_GROUPS),
            ResourceKind::Subscription => Some(SUBSCRIPTIONS),
            ResourceKind::ResourceGroup => Some(RESOURCE_GROUPS),
            ResourceKind::PolicyDefinition => Some(POLICY_DEFINITIONS),
            ResourceKind::PolicySetDefinition => Some(POLICY_SET_DEFINITIONS),
            ResourceKind::PolicyAssignment => Some(POLICY_ASSIGNMENTS),
            ResourceKind::Generic => None,
        }
    }

    pub fn is_policy_child(&self) -> bool {
        Self::POLICY_CHILD_KINDS.contains(self)
    }

    pub fn children_strategy(&self) -> ChildrenStrategy {
        match self {
            ResourceKind::ManagementGroup => ChildrenStrategy::Descendants {
                child_types: Self::POLICY_CHILD_KINDS,
            },
            ResourceKind::Subscription => ChildrenStrategy::Collection("resourceGroups"),
            ResourceKind::ResourceGroup => ChildrenStrategy::Collection("resources"),
            _ => ChildrenStrategy::None,
        }
    }

    pub fn parent_strategy(&self) -> ParentStrategy {
        match self {
            ResourceKind::ManagementGroup => {
                ParentStrategy::PayloadField(&["properties", "details", "parent", "id"])
            }
            _ => ParentStrategy::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_rule() {
        assert_eq!(
            classify("/providers/Microsoft.Management/managementGroups/mg-a"),
            MANAGEMENT_GROUPS
        );
        assert_eq!(
            classify("/subscriptions/s1/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/sa"),
            "Microsoft.Storage/storageAccounts"
        );
    }

    #[test]
    fn test_last_providers_segment_wins() {
        assert_eq!(
            classify(
                "/providers/Microsoft.Management/managementGroups/mg/providers/Microsoft.Authorization/policyAssignments/pa"
            ),
            POLICY_ASSIGNMENTS
        );
        assert_eq!(
            classify("/providers/Microsoft.Management/managementGroups/mg/providers/Microsoft.Authorization/policyDefinitions?api-version=2021-06-01"),
            POLICY_DEFINITIONS
        );
    }

    #[test]
    fn test_incomplete_last_providers_segment_does_not_fall_back() {
        assert_eq!(
            classify("/providers/Microsoft.Management/managementGroups/mg/providers"),
            ""
        );
        assert_eq!(
            classify("/providers/Microsoft.A/typeB/x/providers/Microsoft.C"),
            ""
        );
        assert_eq!(
            classify("/providers/Microsoft.A/typeB/x/providers/Microsoft.C/resources"),
            "Microsoft.C/resources"
        );
        assert_eq!(
            classify("/providers/Microsoft.A/typeB/x/providers/"),
            ""
        );
    }

    #[test]
    fn test_collection_rules_need_final_segment() {
        assert_eq!(classify("/subscriptions/s1/resourceGroups"), RESOURCE_GROUPS);
        assert_eq!(classify("/subscriptions/s1/resourceGroups/rg"), "");
        assert_eq!(classify("/subscriptions/s1/resourceGroups/rg/resources"), RESOURCES);
        assert_eq!(classify("/subscriptions"), SUBSCRIPTIONS);
        assert_eq!(classify("/subscriptions/s1"), "");
    }

    #[test]
    fn test_provider_rule_beats_collection_rules() {
        assert_eq!(
            classify("/providers/Microsoft.Management/managementGroups/mg/subscriptions"),
            MANAGEMENT_GROUPS
        );
    }

    #[test]
    fn test_unknown_is_empty() {
        assert_eq!(classify(""), "");
        assert_eq!(classify("not-an-id"), "");
        assert_eq!(classify("/subscriptions/s1/providers"), "");
    }

    #[test]
    fn test_classify_node_falls_back_to_collection() {
        assert_eq!(classify_node("/subscriptions/s1"), SUBSCRIPTIONS);
        assert_eq!(classify_node("/subscriptions/s1/resourceGroups/rg"), RESOURCE_GROUPS);
        assert_eq!(
            classify_node("/providers/Microsoft.Management/managementGroups/root"),
            MANAGEMENT_GROUPS
        );
        assert_eq!(classify_node("nothing"), "");
    }

    #[test]
    fn test_is_subscription() {
        assert!(is_subscription("/subscriptions/s1"));
        assert!(is_subscription("/SUBSCRIPTIONS/s1?api-version=2022-12-01"));
        assert!(!is_subscription("/subscriptions/s1/resourceGroups/rg"));
        assert!(!is_subscription("/subscriptions"));
    }

    #[test]
    fn test_trailing_segment() {
        assert_eq!(
            trailing_segment("/providers/Microsoft.Management/managementGroups/root"),
            "/root"
        );
        assert_eq!(trailing_segment("plain"), "plain");
    }

    #[test]
    fn test_is_scoped_under() {
        let scope = "/providers/Microsoft.Management/managementGroups/mg/providers/Microsoft.Authorization/policyDefinitions";
        assert!(is_scoped_under(&format!("{}/pd1", scope), scope));
        assert!(is_scoped_under(&format!("{}/pd1", scope.to_lowercase()), scope));
        assert!(!is_scoped_under(scope, scope));
        assert!(!is_scoped_under(
            "/providers/Microsoft.Management/managementGroups/root/providers/Microsoft.Authorization/policyDefinitions/pd1",
            scope
        ));
    }

    #[test]
    fn test_kind_dispatch() {
        assert_eq!(
            ResourceKind::from_type("microsoft.management/managementgroups"),
            ResourceKind::ManagementGroup
        );
        assert_eq!(
            ResourceKind::from_type("Microsoft.Management/managementGroups/subscriptions"),
            ResourceKind::Subscription
        );
        assert_eq!(
            ResourceKind::from_type("Microsoft.Storage/storageAccounts"),
            ResourceKind::Generic
        );
        assert_eq!(
            ResourceKind::Subscription.children_strategy(),
            ChildrenStrategy::Collection("resourceGroups")
        );
        assert_eq!(ResourceKind::Generic.children_strategy(), ChildrenStrategy::None);
        assert_eq!(ResourceKind::ResourceGroup.parent_strategy(), ParentStrategy::None);
        assert!(ResourceKind::PolicyAssignment.is_policy_child());
        assert!(!ResourceKind::ManagementGroup.is_policy_child());
    }
}
