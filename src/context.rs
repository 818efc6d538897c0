use serde_json::{Map, Value};

/// Working set of records eligible for this cycle's selection, keyed by a
/// unique record id. Retraction removes entries; nothing here is persisted.
pub type Pool = Map<String, Value>;

/// A context is a field-name → value mapping used to render one candidate.
/// Values may be nested records or scalars derived by a pattern's update step.
pub type Context = Map<String, Value>;

/// Merge the global extra context with a record-specific one. Global values
/// go in first, so record values shadow them on key collision.
pub fn merge_contexts(extra: &Value, ctx: &Value) -> Context {
    let mut merged = Context::new();
    if let Value::Object(map) = extra {
        merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Value::Object(map) = ctx {
        merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// How a value reads once substituted into a message. Strings drop their
/// quotes; everything else keeps its JSON form.
pub fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Enrich every record with the fields all patterns agree on: `uuid`
/// defaults to the record's pool key and `url` to the service's report page.
/// Existing values are left alone.
pub fn annotate_pool(pool: &mut Pool, service_url: &str) {
    let ids: Vec<String> = pool.keys().cloned().collect();
    for id in ids {
        if let Some(Value::Object(record)) = pool.get_mut(&id) {
            record
                .entry("uuid".to_string())
                .or_insert_with(|| Value::String(id.clone()));
            let url = format!("{service_url}/report/{id}");
            record
                .entry("url".to_string())
                .or_insert_with(|| Value::String(url));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn record_values_shadow_globals() {
        let extra = json!({"service_url": "reports.example.org", "name": "global"});
        let ctx = json!({"name": "octo"});
        let merged = merge_contexts(&extra, &ctx);
        assert_eq!(merged.get("name"), Some(&json!("octo")));
        assert_eq!(merged.get("service_url"), Some(&json!("reports.example.org")));
    }

    #[test]
    fn annotate_fills_only_missing_fields() {
        let mut pool = match json!({
            "org/a": {"name": "a"},
            "org/b": {"name": "b", "url": "short.io/b", "uuid": "custom"},
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        annotate_pool(&mut pool, "reports.example.org");
        assert_eq!(pool["org/a"]["uuid"], json!("org/a"));
        assert_eq!(pool["org/a"]["url"], json!("reports.example.org/report/org/a"));
        assert_eq!(pool["org/b"]["uuid"], json!("custom"));
        assert_eq!(pool["org/b"]["url"], json!("short.io/b"));
    }

    #[test]
    fn display_form_drops_string_quotes() {
        assert_eq!(value_to_display(&json!("octo")), "octo");
        assert_eq!(value_to_display(&json!(51)), "51");
        assert_eq!(value_to_display(&json!(true)), "true");
    }
}
