//! Select-map derivation and authorization pruning (spec §9 "Select-map
//! derivation": "the set of selected fields is derived recursively from the
//! schema ... fields blacklisted by authorization ... must be pruned from
//! the select-map by a second pass").

use std::collections::BTreeMap;

use serde_json::Value;

/// A tree of selected fields mirroring a contract schema's shape. `Leaf`
/// marks a field selected in full (scalar or opaque sub-document); `Object`
/// marks a field whose own sub-fields are individually tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectNode {
    /// Selected as a whole.
    Leaf,
    /// Selected with per-key children (`properties`, or the synthetic
    /// `links` key holding one child per verb).
    Object(BTreeMap<String, SelectNode>),
}

impl SelectNode {
    /// An empty object node, the identity element for [`merge`].
    fn empty_object() -> Self {
        SelectNode::Object(BTreeMap::new())
    }

    /// `true` if this node selects nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, SelectNode::Object(m) if m.is_empty())
    }

    /// Look up a child by key, if this is an `Object` node.
    pub fn get(&self, key: &str) -> Option<&SelectNode> {
        match self {
            SelectNode::Object(m) => m.get(key),
            SelectNode::Leaf => None,
        }
    }
}

/// Union two select-map trees. A `Leaf` absorbs an `Object` (the broader
/// selection wins); two `Object`s merge key-by-key.
pub fn merge(a: SelectNode, b: SelectNode) -> SelectNode {
    match (a, b) {
        (SelectNode::Leaf, _) | (_, SelectNode::Leaf) => SelectNode::Leaf,
        (SelectNode::Object(mut am), SelectNode::Object(bm)) => {
            for (k, v) in bm {
                am.entry(k)
                    .and_modify(|existing| {
                        let taken = std::mem::replace(existing, SelectNode::empty_object());
                        *existing = merge(taken, v.clone());
                    })
                    .or_insert(v);
            }
            SelectNode::Object(am)
        }
    }
}

fn merge_all(nodes: impl IntoIterator<Item = SelectNode>) -> SelectNode {
    nodes.into_iter().fold(SelectNode::empty_object(), merge)
}

/// Derive the select-map a schema implies: every `properties` key (recursed),
/// every branch of `allOf`/`anyOf`/`oneOf`/`not`, and every `$$links` verb
/// (recursed into its own target schema, nested under the synthetic `links`
/// key).
pub fn derive(schema: &Value) -> SelectNode {
    let Value::Object(obj) = schema else {
        return SelectNode::empty_object();
    };

    let mut node = SelectNode::empty_object();

    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        let mut m = BTreeMap::new();
        for (key, sub) in props {
            m.insert(key.clone(), derive(sub));
        }
        node = merge(node, SelectNode::Object(m));
    }

    for combinator in ["allOf", "anyOf", "oneOf"] {
        if let Some(subs) = obj.get(combinator).and_then(Value::as_array) {
            node = merge(node, merge_all(subs.iter().map(derive)));
        }
    }

    if let Some(not_schema) = obj.get("not") {
        node = merge(node, derive(not_schema));
    }

    if let Some(link_map) = obj.get("$$links").and_then(Value::as_object) {
        let mut links = BTreeMap::new();
        for (verb, target_schema) in link_map {
            links.insert(verb.clone(), derive(target_schema));
        }
        node = merge(node, SelectNode::Object(BTreeMap::from([("links".to_string(), SelectNode::Object(links))])));
    }

    // A schema with no structural keywords (e.g. a bare `{"const": ...}`
    // leaf) selects its own position wholesale.
    if node.is_empty() && !obj.is_empty() {
        return SelectNode::Leaf;
    }

    node
}

/// Prune `select` to only the fields also reachable from `authorized_schema`
/// (spec §9: "fields blacklisted by authorization ... must be pruned from
/// the select-map"). Where the authorization tree permits a field only as a
/// `Leaf`, the full requested subtree beneath it is kept; where it's absent
/// entirely, the field (and everything beneath it) is dropped.
pub fn prune(select: &SelectNode, authorized_schema: &Value) -> SelectNode {
    let authorized = derive(authorized_schema);
    prune_tree(select, &authorized)
}

fn prune_tree(select: &SelectNode, authorized: &SelectNode) -> SelectNode {
    match (select, authorized) {
        (_, SelectNode::Leaf) => select.clone(),
        (SelectNode::Leaf, SelectNode::Object(_)) => SelectNode::Leaf,
        (SelectNode::Object(sm), SelectNode::Object(am)) => {
            let mut out = BTreeMap::new();
            for (k, v) in sm {
                if let Some(allowed) = am.get(k) {
                    out.insert(k.clone(), prune_tree(v, allowed));
                }
            }
            SelectNode::Object(out)
        }
    }
}

/// Project `value` through `select`, keeping only the fields the select-map
/// names (used to build a session's filtered view of an already-fetched
/// contract, spec §4.3 patch step 2).
pub fn project(value: &Value, select: &SelectNode) -> Value {
    match select {
        SelectNode::Leaf => value.clone(),
        SelectNode::Object(m) => match value {
            Value::Object(obj) => {
                let mut out = serde_json::Map::new();
                for (key, child) in m {
                    if let Some(v) = obj.get(key) {
                        out.insert(key.clone(), project(v, child));
                    }
                }
                Value::Object(out)
            }
            other => other.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derives_nested_properties() {
        let schema = json!({"properties": {"data": {"properties": {"email": {"type": "string"}}}}});
        let node = derive(&schema);
        let data = node.get("data").unwrap();
        assert!(data.get("email").is_some());
    }

    #[test]
    fn derives_links_under_synthetic_key() {
        let schema = json!({"$$links": {"is attached to": {"properties": {"name": {"type": "string"}}}}});
        let node = derive(&schema);
        let links = node.get("links").unwrap();
        let verb = links.get("is attached to").unwrap();
        assert!(verb.get("name").is_some());
    }

    #[test]
    fn merges_any_of_branches() {
        let schema = json!({"anyOf": [
            {"properties": {"a": {"type": "string"}}},
            {"properties": {"b": {"type": "string"}}}
        ]});
        let node = derive(&schema);
        assert!(node.get("a").is_some());
        assert!(node.get("b").is_some());
    }

    #[test]
    fn prune_drops_unauthorized_field() {
        let requested = json!({"properties": {"data": {"properties": {
            "email": {"type": "string"},
            "ssn": {"type": "string"}
        }}}});
        let authorized = json!({"properties": {"data": {"properties": {
            "email": {"type": "string"}
        }}}});
        let select = derive(&requested);
        let pruned = prune(&select, &authorized);
        let data = pruned.get("data").unwrap();
        assert!(data.get("email").is_some());
        assert!(data.get("ssn").is_none());
    }

    #[test]
    fn prune_keeps_full_subtree_when_authorized_as_leaf() {
        let requested = json!({"properties": {"data": {"properties": {
            "nested": {"properties": {"x": {"type": "string"}}}
        }}}});
        let authorized = json!({"properties": {"data": {"const": "whole-thing-allowed"}}});
        let select = derive(&requested);
        let pruned = prune(&select, &authorized);
        assert_eq!(pruned.get("data"), select.get("data"));
    }

    #[test]
    fn project_keeps_only_selected_fields() {
        let schema = json!({"properties": {"data": {"properties": {"email": {"type": "string"}}}}});
        let select = derive(&schema);
        let value = json!({"data": {"email": "a@example.com", "hash": "secret"}, "active": true});
        let projected = project(&value, &select);
        assert_eq!(projected, json!({"data": {"email": "a@example.com"}}));
    }
}
