// src/path.rs
//! Path helpers used to disambiguate homonyms.
//!
//! Paths are kept *reversed*: the object's own name comes first, followed by
//! its parent, grandparent and so on. A reversed path is turned into a name by
//! joining it back to front with `/`, so `["Ok button", "Dialog"]` becomes
//! `"Dialog/Ok button"`.

pub const SEPARATOR: char = '/';

/// Join a reversed path into a qualified name. An empty path gives "".
pub fn reversed_path_as_name<S: AsRef<str>>(reversed_path: &[S]) -> String {
    let mut name = String::new();
    for (i, component) in reversed_path.iter().rev().enumerate() {
        if i > 0 {
            name.push(SEPARATOR);
        }
        name.push_str(component.as_ref());
    }
    name
}

/// Index of the last occurrence of `name` at or before `from` (the whole
/// path when `from` is `None`).
pub fn last_index_of<S: AsRef<str>>(path: &[S], name: &str, from: Option<usize>) -> Option<usize> {
    let end = from.map_or(path.len(), |i| (i + 1).min(path.len()));
    path[..end].iter().rposition(|component| component.as_ref() == name)
}

/// Whether `candidate` tells its object apart from the one at `reference`.
///
/// The qualifiers of `candidate` (every component but its own name) are looked
/// up in `reference` from the outermost one inwards, each lookup starting at
/// the previous match. If every qualifier is found, resolving `candidate`
/// top-down could also reach the reference object, so it is not unique.
///
/// The test is not symmetric: swapping the arguments may change the result.
pub fn is_unique_path<S: AsRef<str>, T: AsRef<str>>(candidate: &[S], reference: &[T]) -> bool {
    let mut anchor = None;
    for component in candidate.iter().skip(1).rev() {
        match last_index_of(reference, component.as_ref(), anchor) {
            Some(index) => anchor = Some(index),
            None => return true,
        }
    }
    false
}

/// Whether `candidate` is unique against every path in `references`.
pub fn is_unique_among<S: AsRef<str>, T: AsRef<str>>(candidate: &[S], references: &[Vec<T>]) -> bool {
    references
        .iter()
        .all(|reference| is_unique_path(candidate, reference))
}

/// Whether `ancestor` is missing from every path in `paths`.
pub fn ancestor_not_in_paths<T: AsRef<str>>(ancestor: &str, paths: &[Vec<T>]) -> bool {
    !paths
        .iter()
        .any(|path| path.iter().any(|component| component.as_ref() == ancestor))
}
