//! Logical path helpers.
//!
//! Logical paths are relative, `/`-separated and never climb above the
//! project root. They are independent of the host platform's separators.

use path_clean::PathClean;
use std::path::{Component, Path};

/// Normalizes a logical path, resolving `.` and `..` segments.
///
/// Returns `None` if the path climbs above the root or is empty.
#[must_use]
pub fn normalize(path: &str) -> Option<String> {
    logical(&path_clean::clean(path.trim_start_matches('/')))
}

/// Joins cleaned path components with `/`, whatever the host separator.
fn logical(cleaned: &Path) -> Option<String> {
    let mut segments = Vec::new();
    for component in cleaned.components() {
        match component {
            Component::Normal(part) => segments.push(part.to_str()?),
            Component::CurDir => {}
            // A leading `..` survives cleaning only when the path leaves its root.
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Returns true if the path is relative and stays inside its root.
#[must_use]
pub fn is_safe_relative(path: &str) -> bool {
    !path.starts_with('/')
        && !path.contains('\\')
        && !has_drive_prefix(path)
        && normalize(path).is_some()
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Returns the directory part of a logical path (`""` for top-level files).
#[must_use]
pub fn dirname(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..idx])
}

/// Returns true if the reference points outside the project (scheme, `//`, fragment-only).
#[must_use]
pub fn is_external(reference: &str) -> bool {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') || reference.starts_with("//") {
        return true;
    }
    match reference.find(':') {
        Some(idx) => {
            let scheme = &reference[..idx];
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Resolves a reference found in `document` to a logical path.
///
/// Root-relative references (`/x`) resolve against the project root. Query
/// strings and fragments are dropped. External references resolve to `None`.
#[must_use]
pub fn resolve(document: &str, reference: &str) -> Option<String> {
    if is_external(reference) {
        return None;
    }
    let reference = reference.trim();
    let end = reference.find(['?', '#']).unwrap_or(reference.len());
    let reference = &reference[..end];
    if let Some(rooted) = reference.strip_prefix('/') {
        return normalize(rooted);
    }
    logical(&Path::new(dirname(document)).join(reference).clean())
}

/// Computes the href that reaches `target` from inside `document`.
#[must_use]
pub fn relative(document: &str, target: &str) -> String {
    let from: Vec<&str> = dirname(document).split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();

    let to_dir = &to[..to.len().saturating_sub(1)];
    let common = from
        .iter()
        .zip(to_dir.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = std::iter::repeat("..").take(from.len() - common).collect();
    parts.extend(&to[common..]);
    parts.join("/")
}

/// Converts a filesystem path under `root` into a logical path.
#[must_use]
pub fn from_fs_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => segments.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}
