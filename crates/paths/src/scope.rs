//! Conversion between JSON-schema scopes and dot-separated data paths.
//!
//! A scope such as `#/properties/foo/items/properties/bar` is split at every
//! `items` token into data-path segments (`["foo", "bar"]`). Joining the
//! segments with concrete array indices yields a lookup path into the
//! settings tree (`foo.2.bar`).

use crate::error::{PathError, Result};

const PROPERTIES: &str = "properties";
const ITEMS: &str = "items";

/// Split a scope into one data-path segment per array nesting level, plus
/// the trailing segment (which may be empty).
pub fn scope_to_data_paths(scope: &str) -> Result<Vec<String>> {
    let body = scope.strip_prefix('#').unwrap_or(scope);
    let mut tokens = body.split('/').filter(|token| !token.is_empty());
    let mut data_paths = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    while let Some(token) = tokens.next() {
        match token {
            PROPERTIES => {
                let name = tokens
                    .next()
                    .ok_or_else(|| PathError::MissingPropertyName {
                        scope: scope.to_string(),
                    })?;
                current.push(name);
            }
            ITEMS => data_paths.push(std::mem::take(&mut current).join(".")),
            other => {
                return Err(PathError::UnexpectedToken {
                    scope: scope.to_string(),
                    token: other.to_string(),
                })
            }
        }
    }
    data_paths.push(current.join("."));
    Ok(data_paths)
}

/// Merge the leading segments with the given indices.
///
/// `[foo, bar, baz]` with `[1]` gives `[foo.1.bar, baz]`: every index glues
/// two neighbouring segments together, segments beyond the last index stay
/// separate entries. Surplus indices are ignored.
pub fn combine_data_paths_with_indices(data_paths: &[String], indices: &[usize]) -> Vec<String> {
    let Some((first, rest)) = data_paths.split_first() else {
        return Vec::new();
    };
    let used = indices.len().min(rest.len());
    let mut head = first.clone();
    for (index, segment) in indices.iter().zip(rest) {
        head = join_path(&[&head, &index.to_string(), segment]);
    }

    let mut combined = Vec::with_capacity(1 + rest.len() - used);
    combined.push(head);
    combined.extend(rest[used..].iter().cloned());
    combined
}

pub fn combine_scope_with_indices(scope: &str, indices: &[usize]) -> Result<Vec<String>> {
    Ok(combine_data_paths_with_indices(
        &scope_to_data_paths(scope)?,
        indices,
    ))
}

/// Join path parts with dots, skipping empty parts.
pub fn join_path(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".")
}

/// The data-path candidate a concrete path matched, and the array indices
/// read off the concrete path on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedMatch {
    pub indices: Vec<usize>,
    pub data_paths: Vec<String>,
}

/// Reverse of [`combine_data_paths_with_indices`]: find which candidate a
/// concrete path belongs to and which of its tokens are array indices.
///
/// When several candidates match, the one yielding the most indices wins.
pub fn get_indices_from_data_paths(
    candidates: &[Vec<String>],
    path: &str,
) -> Option<IndexedMatch> {
    let mut best: Option<IndexedMatch> = None;
    for candidate in candidates {
        let Some(indices) = match_candidate(candidate, path) else {
            continue;
        };
        if best
            .as_ref()
            .is_some_and(|current| current.indices.len() >= indices.len())
        {
            continue;
        }
        best = Some(IndexedMatch {
            indices,
            data_paths: candidate.clone(),
        });
    }
    best
}

fn match_candidate(candidate: &[String], path: &str) -> Option<Vec<usize>> {
    let indices = match_segments(candidate, path)?;
    if indices.is_empty() && candidate.len() > 1 {
        return None;
    }
    Some(indices)
}

fn match_segments(segments: &[String], path: &str) -> Option<Vec<usize>> {
    let (first, rest) = segments.split_first()?;
    let remainder = strip_segment(path, first)?;
    if rest.is_empty() || remainder.is_empty() {
        return Some(Vec::new());
    }

    let (index, tail) = split_index(remainder)?;
    let mut indices = vec![index];
    if !tail.is_empty() {
        indices.extend(match_segments(rest, tail)?);
    }
    Some(indices)
}

/// Strip `segment` from the front of `path` at a token boundary.
pub fn strip_segment<'a>(path: &'a str, segment: &str) -> Option<&'a str> {
    if segment.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(segment)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('.')
    }
}

/// Split a leading integer token off a path remainder.
pub fn split_index(remainder: &str) -> Option<(usize, &str)> {
    let (token, tail) = remainder.split_once('.').unwrap_or((remainder, ""));
    Some((token.parse().ok()?, tail))
}
