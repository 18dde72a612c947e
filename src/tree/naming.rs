//! Naming and placement checks.

use std::collections::HashSet;

use super::index::TreeIndex;
use super::node::{NodeId, NodeKind};
use super::MAX_NAME_LENGTH;
use crate::{FallcrateError, Result};

/// Default bound on `" (n)"` candidates tried by [`unique_name_for`].
pub const DEFAULT_MAX_SUFFIX_ATTEMPTS: u32 = 100;

/// Check if a sibling under `parent`, other than `exclude`, already uses `name`.
///
/// Comparison is case-sensitive.
pub fn has_name_conflict(
    name: &str,
    exclude: Option<&NodeId>,
    parent: Option<&NodeId>,
    index: &TreeIndex,
) -> bool {
    index
        .children(parent)
        .any(|n| n.name == name && Some(&n.id) != exclude)
}

/// Find a name that does not collide with any sibling.
///
/// Returns `name` untouched when it is free. Otherwise appends `" (n)"`
/// before the extension for the smallest `n` that clears the conflict,
/// replacing an existing `" (k)"` suffix. If no candidate within
/// `max_attempts` is free, the original name is returned and the caller
/// reports the conflict.
pub fn unique_name_for<'a, I>(name: &str, siblings: I, max_attempts: u32) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: HashSet<&str> = siblings.into_iter().collect();
    if !taken.contains(name) {
        return name.to_string();
    }

    let (stem, ext) = split_extension(name);
    let base = strip_counter(stem);

    for n in 1..=max_attempts {
        let candidate = format!("{base} ({n}){ext}");
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
    }

    name.to_string()
}

/// Check if `candidate` is `node` itself or one of its ancestors.
///
/// Walks parent links from `node` up to the root. Moving `candidate` under
/// `node` is circular exactly when this returns true.
pub fn is_ancestor(candidate: &NodeId, node: Option<&NodeId>, index: &TreeIndex) -> bool {
    let mut current = node;
    let mut steps = 0;

    while let Some(id) = current {
        if id == candidate {
            return true;
        }
        steps += 1;
        if steps > index.len() {
            break;
        }
        current = index.get(id).and_then(|n| n.parent.as_ref());
    }

    false
}

/// Check if `parent` can hold children: the root, or an existing directory.
pub fn is_type_compatible(parent: Option<&NodeId>, index: &TreeIndex) -> bool {
    match parent {
        None => true,
        Some(id) => index
            .get(id)
            .is_some_and(|n| n.kind == NodeKind::Directory),
    }
}

/// Validate a display name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(FallcrateError::Validation("name must not be empty".to_string()));
    }
    if name.contains('/') {
        return Err(FallcrateError::Validation(format!(
            "name \"{name}\" must not contain '/'"
        )));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(FallcrateError::Validation(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Split `report.txt` into `("report", ".txt")`. Dotfiles keep their dot.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

/// Strip a trailing `" (k)"` counter.
fn strip_counter(stem: &str) -> &str {
    let Some(body) = stem.strip_suffix(')') else {
        return stem;
    };
    let Some(open) = body.rfind(" (") else {
        return stem;
    };
    let digits = &body[open + 2..];
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        &stem[..open]
    } else {
        stem
    }
}
