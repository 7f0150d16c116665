//! Dotted-path access into JSON value trees.
//!
//! Paths look like `task.payload.env` and may contain `[]` segments that fan
//! out over every element of a list, e.g. `jobs[].worker.env`.

use serde_json::Value;

/// Fetch the value at `dotted` below `root`, or `None` when any segment is
/// missing. `[]` segments are not supported here; use [`visit_path`] for
/// fan-out.
pub fn get_path<'a>(root: &'a Value, dotted: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in dotted.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set the value at `dotted` below `root`, creating intermediate objects.
pub fn set_path(root: &mut Value, dotted: &str, new_value: Value) {
    let mut current = root;
    let segments: Vec<&str> = dotted.split('.').collect();
    for (index, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let map = current.as_object_mut().expect("object ensured above");
        if index == segments.len() - 1 {
            map.insert((*segment).to_string(), new_value);
            return;
        }
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

/// Visit every value addressed by `dotted`, fanning out over `name[]` list
/// segments, and apply `visit` mutably. Missing segments are skipped.
pub fn visit_path<F>(root: &mut Value, dotted: &str, visit: &mut F)
where
    F: FnMut(&mut Value),
{
    fn walk<F>(current: &mut Value, segments: &[&str], visit: &mut F)
    where
        F: FnMut(&mut Value),
    {
        let Some((head, rest)) = segments.split_first() else {
            visit(current);
            return;
        };
        if let Some(list_key) = head.strip_suffix("[]") {
            let target = if list_key.is_empty() {
                Some(current)
            } else {
                current.as_object_mut().and_then(|map| map.get_mut(list_key))
            };
            if let Some(Value::Array(items)) = target {
                for item in items {
                    walk(item, rest, visit);
                }
            }
        } else if let Some(next) = current.as_object_mut().and_then(|map| map.get_mut(*head)) {
            walk(next, rest, visit);
        }
    }

    let segments: Vec<&str> = dotted.split('.').collect();
    walk(root, &segments, visit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_path_walks_nested_objects() {
        let value = json!({"task": {"payload": {"image": "debian"}}});
        assert_eq!(get_path(&value, "task.payload.image"), Some(&json!("debian")));
        assert_eq!(get_path(&value, "task.payload.missing"), None);
    }

    #[test]
    fn set_path_creates_intermediates() {
        let mut value = json!({});
        set_path(&mut value, "worker.env.CI", json!("1"));
        assert_eq!(value, json!({"worker": {"env": {"CI": "1"}}}));
    }

    #[test]
    fn visit_path_fans_out_over_lists() {
        let mut value = json!({"jobs": [{"name": "a"}, {"name": "b"}]});
        let mut seen = Vec::new();
        visit_path(&mut value, "jobs[].name", &mut |item| {
            seen.push(item.clone());
            *item = json!("x");
        });
        assert_eq!(seen, vec![json!("a"), json!("b")]);
        assert_eq!(value, json!({"jobs": [{"name": "x"}, {"name": "x"}]}));
    }
}
