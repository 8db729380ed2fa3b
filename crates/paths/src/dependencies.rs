//! Reading dependency values out of, and locating write targets in, the
//! settings tree.
//!
//! Both directions walk the data-path segments of a scope. At each array
//! boundary the walk either follows a fixed index (when the caller supplied
//! one for that level) or fans out over every current element.

use dialog_protocol::{DependencyMap, IndexRef, IndexedValue};
use serde_json::Value;

use crate::error::Result;
use crate::identity::ArrayIdentityRegistry;
use crate::scope::{join_path, scope_to_data_paths};
use crate::tree::get_path;

/// Where a walk currently stands: a sub-tree, its concrete path and the
/// array positions taken to reach it.
#[derive(Debug, Clone)]
struct TreeCursor<'a> {
    node: &'a Value,
    path: String,
    positions: Vec<usize>,
}

impl<'a> TreeCursor<'a> {
    fn root(tree: &'a Value) -> Self {
        Self {
            node: tree,
            path: String::new(),
            positions: Vec::new(),
        }
    }

    fn level(&self) -> usize {
        self.positions.len()
    }

    fn segment_path(&self, segment: &str) -> String {
        join_path(&[&self.path, segment])
    }

    fn descend(&self, segment: &str, element: &'a Value, position: usize) -> Self {
        let mut positions = self.positions.clone();
        positions.push(position);
        Self {
            node: element,
            path: join_path(&[&self.path, segment, &position.to_string()]),
            positions,
        }
    }

    /// Elements of the array at `segment` to continue with.
    fn elements(&self, segment: &str, fixed: Option<&usize>) -> Vec<(usize, &'a Value)> {
        let Some(Value::Array(items)) = get_path(self.node, segment) else {
            return Vec::new();
        };
        match fixed {
            Some(&position) => items
                .get(position)
                .map(|item| vec![(position, item)])
                .unwrap_or_default(),
            None => items.iter().enumerate().collect(),
        }
    }
}

/// Current value(s) at `scope`, one entry per concrete array traversal,
/// tagged with the ids of the traversed elements.
///
/// `indices` pins the leading array levels (e.g. the element a trigger was
/// fired from); deeper levels fan out over all elements.
pub fn get_dependency_values(
    tree: &Value,
    scope: &str,
    indices: &[usize],
    registry: &mut ArrayIdentityRegistry,
) -> Result<Vec<IndexedValue>> {
    let data_paths = scope_to_data_paths(scope)?;
    let mut values = Vec::new();
    collect_values(
        TreeCursor::root(tree),
        &data_paths,
        indices,
        registry,
        &mut values,
    );
    Ok(values)
}

fn collect_values(
    cursor: TreeCursor<'_>,
    data_paths: &[String],
    fixed: &[usize],
    registry: &mut ArrayIdentityRegistry,
    out: &mut Vec<IndexedValue>,
) {
    let level = cursor.level();
    let segment = &data_paths[level];
    if level + 1 == data_paths.len() {
        let ids = registry.to_index_ids(data_paths, &cursor.positions);
        let value = get_path(cursor.node, segment)
            .cloned()
            .unwrap_or(Value::Null);
        out.push(IndexedValue::new(
            ids.into_iter().map(IndexRef::from).collect(),
            value,
        ));
        return;
    }
    for (position, element) in cursor.elements(segment, fixed.get(level)) {
        collect_values(
            cursor.descend(segment, element, position),
            data_paths,
            fixed,
            registry,
            out,
        );
    }
}

/// Dependency values for every scope, keyed by scope.
pub fn collect_dependencies(
    tree: &Value,
    scopes: &[String],
    indices: &[usize],
    registry: &mut ArrayIdentityRegistry,
) -> Result<DependencyMap> {
    let mut map = DependencyMap::new();
    for scope in scopes {
        let values = get_dependency_values(tree, scope, indices, registry)?;
        map.insert(scope.clone(), values);
    }
    Ok(map)
}

/// A concrete leaf path a value update writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTarget {
    pub path: String,
    pub positions: Vec<usize>,
    pub data_paths: Vec<String>,
}

/// Concrete paths an update for `scope` at `positions` writes to. Array
/// levels beyond the given positions fan out over the current elements.
pub fn write_targets(tree: &Value, scope: &str, positions: &[usize]) -> Result<Vec<WriteTarget>> {
    let data_paths = scope_to_data_paths(scope)?;
    let mut targets = Vec::new();
    collect_targets(TreeCursor::root(tree), &data_paths, positions, &mut targets);
    Ok(targets)
}

fn collect_targets(
    cursor: TreeCursor<'_>,
    data_paths: &[String],
    fixed: &[usize],
    out: &mut Vec<WriteTarget>,
) {
    let level = cursor.level();
    let segment = &data_paths[level];
    if level + 1 == data_paths.len() {
        out.push(WriteTarget {
            path: cursor.segment_path(segment),
            positions: cursor.positions.clone(),
            data_paths: data_paths.to_vec(),
        });
        return;
    }
    for (position, element) in cursor.elements(segment, fixed.get(level)) {
        collect_targets(cursor.descend(segment, element, position), data_paths, fixed, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ids(registry: &ArrayIdentityRegistry, value: &IndexedValue) -> Vec<usize> {
        registry
            .resolve_refs(&value.indices)
            .expect("ids resolve")
    }

    #[test]
    fn plain_scope_yields_single_entry() {
        let tree = json!({"model": {"a": 5}});
        let mut registry = ArrayIdentityRegistry::new();
        let values =
            get_dependency_values(&tree, "#/properties/model/properties/a", &[], &mut registry)
                .unwrap();
        assert_eq!(values, vec![IndexedValue::unindexed(json!(5))]);
    }

    #[test]
    fn missing_leaf_reads_as_null() {
        let tree = json!({"model": {}});
        let mut registry = ArrayIdentityRegistry::new();
        let values =
            get_dependency_values(&tree, "#/properties/model/properties/a", &[], &mut registry)
                .unwrap();
        assert_eq!(values, vec![IndexedValue::unindexed(Value::Null)]);
    }

    #[test]
    fn fans_out_over_nested_arrays() {
        let tree = json!({"model": {"outer": [
            {"inner": [{"v": 1}, {"v": 2}]},
            {"inner": []},
            {"inner": [{"v": 3}]}
        ]}});
        let scope = "#/properties/model/properties/outer/items/properties/inner/items/properties/v";
        let mut registry = ArrayIdentityRegistry::new();
        let values = get_dependency_values(&tree, scope, &[], &mut registry).unwrap();

        let found: Vec<(Vec<usize>, Value)> = values
            .iter()
            .map(|v| (ids(&registry, v), v.value.clone()))
            .collect();
        assert_eq!(
            found,
            vec![
                (vec![0, 0], json!(1)),
                (vec![0, 1], json!(2)),
                (vec![2, 0], json!(3)),
            ]
        );
    }

    #[test]
    fn fixed_indices_pin_leading_levels() {
        let tree = json!({"rows": [{"v": "a"}, {"v": "b"}, {"v": "c"}]});
        let mut registry = ArrayIdentityRegistry::new();
        let values = get_dependency_values(
            &tree,
            "#/properties/rows/items/properties/v",
            &[1],
            &mut registry,
        )
        .unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, json!("b"));
        assert_eq!(ids(&registry, &values[0]), vec![1]);
    }

    #[test]
    fn fixed_index_of_a_deleted_element_yields_nothing() {
        let tree = json!({"rows": [{"v": "a"}]});
        let mut registry = ArrayIdentityRegistry::new();
        let values = get_dependency_values(
            &tree,
            "#/properties/rows/items/properties/v",
            &[4],
            &mut registry,
        )
        .unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn write_targets_fan_out_in_write_direction() {
        let tree = json!({"rows": [{"v": "a"}, {"v": "b"}]});
        let scope = "#/properties/rows/items/properties/v";
        let all: Vec<String> = write_targets(&tree, scope, &[])
            .unwrap()
            .into_iter()
            .map(|t| t.path)
            .collect();
        assert_eq!(all, vec!["rows.0.v".to_string(), "rows.1.v".to_string()]);

        let one = write_targets(&tree, scope, &[1]).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].path, "rows.1.v");
        assert_eq!(one[0].positions, vec![1]);
    }

    #[test]
    fn collects_dependency_map_per_scope() {
        let tree = json!({"model": {"a": 1, "b": 2}});
        let mut registry = ArrayIdentityRegistry::new();
        let scopes = vec![
            "#/properties/model/properties/a".to_string(),
            "#/properties/model/properties/b".to_string(),
        ];
        let map = collect_dependencies(&tree, &scopes, &[], &mut registry).unwrap();
        assert_eq!(map[&scopes[1]], vec![IndexedValue::unindexed(json!(2))]);
    }
}
