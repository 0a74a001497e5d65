//! Link masking (spec §4.2 "Link masking": "at every `$$links[verb]`, the
//! authorization schema is conjoined with the link's target sub-schema.
//! Every `properties`, `allOf`, `anyOf`, `contains`, `items`, `not` branch is
//! descended.").

use serde_json::{json, Map, Value};

/// Recursively mask `query_schema`: every `$$links[verb]` target sub-schema
/// is conjoined with `auth_schema`, including targets reached through
/// further nested `$$links` (preventing escalation through an arbitrarily
/// deep traversal).
fn mask(query_schema: &Value, auth_schema: &Value) -> Value {
    let Value::Object(map) = query_schema else {
        return query_schema.clone();
    };

    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        let masked_value = match key.as_str() {
            "$$links" => {
                let Value::Object(links) = value else { continue };
                let mut masked_links = Map::with_capacity(links.len());
                for (verb, target) in links {
                    let masked_target = mask(target, auth_schema);
                    masked_links.insert(verb.clone(), json!({"allOf": [masked_target, auth_schema.clone()]}));
                }
                Value::Object(masked_links)
            }
            "properties" => {
                let Value::Object(props) = value else { continue };
                Value::Object(props.iter().map(|(k, v)| (k.clone(), mask(v, auth_schema))).collect())
            }
            "allOf" | "anyOf" => {
                let Value::Array(subs) = value else { continue };
                Value::Array(subs.iter().map(|s| mask(s, auth_schema)).collect())
            }
            "contains" | "items" | "not" => mask(value, auth_schema),
            _ => value.clone(),
        };
        out.insert(key.clone(), masked_value);
    }
    Value::Object(out)
}

/// Gate `query_schema` by `auth_schema`: the root is conjoined directly, and
/// every `$$links` traversal is separately re-gated (spec §4.2). The result
/// is what the query compiler receives.
pub fn gate_query(query_schema: &Value, auth_schema: &Value) -> Value {
    let masked = mask(query_schema, auth_schema);
    json!({"allOf": [masked, auth_schema.clone()]})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conjoins_auth_schema_at_link_target() {
        let query = json!({
            "$$links": {"is attached to": {"properties": {"slug": {"const": "thread-1"}}}}
        });
        let auth = json!({"properties": {"type": {"const": "thread@1.0.0"}}});
        let gated = gate_query(&query, &auth);
        let target = &gated["allOf"][0]["$$links"]["is attached to"];
        assert_eq!(target["allOf"][1], auth);
    }

    #[test]
    fn masks_links_nested_inside_combinators() {
        let query = json!({
            "anyOf": [
                {"$$links": {"verb": {"properties": {"active": {"const": true}}}}}
            ]
        });
        let auth = json!({"properties": {"markers": {"maxItems": 0}}});
        let gated = gate_query(&query, &auth);
        let target = &gated["allOf"][0]["anyOf"][0]["$$links"]["verb"];
        assert_eq!(target["allOf"][1], auth);
    }

    #[test]
    fn root_is_gated_directly() {
        let query = json!({"properties": {"active": {"const": true}}});
        let auth = json!({"properties": {"type": {"const": "card@1.0.0"}}});
        let gated = gate_query(&query, &auth);
        assert_eq!(gated["allOf"][1], auth);
    }
}
