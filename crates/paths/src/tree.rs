//! Dot-path access into a JSON settings tree.

use serde_json::{Map, Value};

use crate::error::{PathError, Result};
use crate::scope::join_path;

fn tokens(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|token| !token.is_empty())
}

fn parse_index(path: &str, token: &str) -> Result<usize> {
    token.parse().map_err(|_| PathError::InvalidIndex {
        path: path.to_string(),
        token: token.to_string(),
    })
}

pub fn get_path<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    tokens(path).try_fold(tree, |node, token| match node {
        Value::Object(map) => map.get(token),
        Value::Array(items) => items.get(token.parse::<usize>().ok()?),
        _ => None,
    })
}

pub fn get_path_mut<'a>(tree: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    tokens(path).try_fold(tree, |node, token| match node {
        Value::Object(map) => map.get_mut(token),
        Value::Array(items) => items.get_mut(token.parse::<usize>().ok()?),
        _ => None,
    })
}

/// Write `value` at `path`, creating missing object keys on the way.
///
/// Arrays are never grown; addressing past their end fails.
pub fn set_path(tree: &mut Value, path: &str, value: Value) -> Result<()> {
    let mut node = tree;
    for token in tokens(path) {
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map.entry(token).or_insert(Value::Null),
            Value::Array(items) => {
                let index = parse_index(path, token)?;
                let len = items.len();
                items
                    .get_mut(index)
                    .ok_or_else(|| PathError::IndexOutOfBounds {
                        path: path.to_string(),
                        index,
                        len,
                    })?
            }
            _ => {
                return Err(PathError::NotAContainer {
                    path: path.to_string(),
                    segment: token.to_string(),
                })
            }
        };
    }
    *node = value;
    Ok(())
}

fn array_at<'a>(tree: &'a mut Value, path: &str) -> Result<&'a mut Vec<Value>> {
    match get_path_mut(tree, path) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(PathError::NotAContainer {
            path: path.to_string(),
            segment: path.rsplit('.').next().unwrap_or(path).to_string(),
        }),
    }
}

/// Insert an element into the array at `path`; `None` appends. Returns the
/// position the element landed at.
pub fn insert_array_element(
    tree: &mut Value,
    path: &str,
    index: Option<usize>,
    value: Value,
) -> Result<usize> {
    let items = array_at(tree, path)?;
    let len = items.len();
    let index = index.unwrap_or(len);
    if index > len {
        return Err(PathError::IndexOutOfBounds {
            path: path.to_string(),
            index,
            len,
        });
    }
    items.insert(index, value);
    Ok(index)
}

pub fn remove_array_element(tree: &mut Value, path: &str, index: usize) -> Result<Value> {
    let items = array_at(tree, path)?;
    let len = items.len();
    if index >= len {
        return Err(PathError::IndexOutOfBounds {
            path: path.to_string(),
            index,
            len,
        });
    }
    Ok(items.remove(index))
}

pub fn move_array_element(tree: &mut Value, path: &str, from: usize, to: usize) -> Result<()> {
    let items = array_at(tree, path)?;
    let len = items.len();
    for index in [from, to] {
        if index >= len {
            return Err(PathError::IndexOutOfBounds {
                path: path.to_string(),
                index,
                len,
            });
        }
    }
    let element = items.remove(from);
    items.insert(to, element);
    Ok(())
}

/// Paths at which `after` differs from `before`, as deep as both sides
/// keep the same shape. A replaced subtree or a resized array is reported
/// once at its own path; the root is reported as the empty path.
pub fn changed_paths(before: &Value, after: &Value) -> Vec<String> {
    let mut changed = Vec::new();
    collect_changes(before, after, "", &mut changed);
    changed
}

fn collect_changes(before: &Value, after: &Value, path: &str, out: &mut Vec<String>) {
    if before == after {
        return;
    }
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            let added = new.keys().filter(|key| !old.contains_key(*key));
            for key in old.keys().chain(added) {
                let child = join_path(&[path, key.as_str()]);
                match (old.get(key), new.get(key)) {
                    (Some(old), Some(new)) => collect_changes(old, new, &child, out),
                    _ => out.push(child),
                }
            }
        }
        (Value::Array(old), Value::Array(new)) if old.len() == new.len() => {
            for (index, (old, new)) in old.iter().zip(new).enumerate() {
                let index = index.to_string();
                collect_changes(old, new, &join_path(&[path, index.as_str()]), out);
            }
        }
        _ => out.push(path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn reads_through_objects_and_arrays() {
        let tree = json!({"model": {"rows": [{"a": 1}, {"a": 2}]}});
        assert_eq!(get_path(&tree, "model.rows.1.a"), Some(&json!(2)));
        assert_eq!(get_path(&tree, "model.rows.5.a"), None);
        assert_eq!(get_path(&tree, "model.rows.x"), None);
        assert_eq!(get_path(&tree, ""), Some(&tree));
    }

    #[test]
    fn writes_create_missing_keys() {
        let mut tree = json!({"model": null});
        set_path(&mut tree, "model.secondSetting", json!("updated")).unwrap();
        assert_eq!(tree, json!({"model": {"secondSetting": "updated"}}));
    }

    #[test]
    fn writes_never_grow_arrays() {
        let mut tree = json!({"rows": [1]});
        let err = set_path(&mut tree, "rows.3", json!(2)).unwrap_err();
        assert_eq!(
            err,
            PathError::IndexOutOfBounds {
                path: "rows.3".into(),
                index: 3,
                len: 1
            }
        );
    }

    #[test]
    fn writing_below_a_scalar_fails() {
        let mut tree = json!({"a": 1});
        assert!(matches!(
            set_path(&mut tree, "a.b", json!(2)),
            Err(PathError::NotAContainer { .. })
        ));
    }

    #[test]
    fn edits_array_elements() {
        let mut tree = json!({"rows": ["a", "b", "c"]});
        assert_eq!(insert_array_element(&mut tree, "rows", None, json!("d")).unwrap(), 3);
        assert_eq!(remove_array_element(&mut tree, "rows", 0).unwrap(), json!("a"));
        move_array_element(&mut tree, "rows", 2, 0).unwrap();
        assert_eq!(tree, json!({"rows": ["d", "b", "c"]}));
    }

    #[test]
    fn reports_changed_leaves_and_reshaped_subtrees() {
        let before = json!({
            "list": [1],
            "model": {"a": 1, "b": 2, "gone": 0},
            "rows": [{"v": 1}, {"v": 2}]
        });
        let after = json!({
            "list": [1, 2],
            "model": {"a": 1, "b": 3, "new": true},
            "rows": [{"v": 1}, {"v": 5}]
        });
        assert_eq!(
            changed_paths(&before, &after),
            vec!["list", "model.b", "model.gone", "model.new", "rows.1.v"]
        );
        assert!(changed_paths(&before, &before).is_empty());
        assert_eq!(changed_paths(&json!(1), &json!(2)), vec![""]);
    }
}
