//! Group path helpers: recursive creation, lookup and existence checks.
//!
//! Paths are `/`-separated and relative to a parent handle; empty segments
//! are ignored, so `""` and `"/"` name the parent itself. Every segment goes
//! through the naming policy.

use h5store_format::{Container, FormatError, Hid, SlotKind};
use tracing::debug;

use crate::error::{Error, Result};
use crate::handle::HandleGuard;
use crate::naming::normalize;
use crate::settings::Settings;

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn reopen(container: &Container, hid: Hid) -> std::result::Result<Hid, FormatError> {
    // Any group handle can be re-opened through its own path from the root.
    let root = HandleGuard::wrap(container, container.open_root())?;
    let path = container.path_of(hid)?;
    if path == "/" {
        return container.open_root();
    }
    container.open_group(root.hid(), path.trim_start_matches('/'))
}

/// Create every missing group along `path` and return the last one.
pub fn create_group_recursively<'c>(
    container: &'c Container,
    settings: &Settings,
    parent: Hid,
    path: &str,
) -> Result<HandleGuard<'c>> {
    let mut current = HandleGuard::wrap(container, reopen(container, parent))?;
    for segment in segments(path) {
        let name = normalize(segment, settings);
        if container.exists(current.hid(), &name, SlotKind::Group)? {
            debug!(group = %name, "group already exists");
        }
        let next = container
            .create_or_open_group(current.hid(), &name)
            .map_err(|e| Error::Creation {
                name: name.to_string(),
                kind: "group",
                reason: e.to_string(),
            })?;
        current = HandleGuard::new(container, next);
    }
    Ok(current)
}

/// Open the group at `path`, or `None` when any segment is missing.
pub fn open_group_path<'c>(
    container: &'c Container,
    settings: &Settings,
    parent: Hid,
    path: &str,
) -> Result<Option<HandleGuard<'c>>> {
    let mut current = HandleGuard::wrap(container, reopen(container, parent))?;
    for segment in segments(path) {
        let name = normalize(segment, settings);
        if !container.exists(current.hid(), &name, SlotKind::Group)? {
            return Ok(None);
        }
        current = HandleGuard::wrap(container, container.open_group(current.hid(), &name))?;
    }
    Ok(Some(current))
}

/// Whether `path` names an existing item of the given kind.
///
/// For attributes, the last segment is the attribute name and the rest is
/// the owning group.
pub fn item_exists(
    container: &Container,
    settings: &Settings,
    parent: Hid,
    path: &str,
    kind: SlotKind,
) -> Result<bool> {
    let trimmed = path.trim_end_matches('/');
    let (owner, name) = match trimmed.rsplit_once('/') {
        Some((owner, name)) => (owner, name),
        None => ("", trimmed),
    };
    if name.is_empty() {
        return Ok(kind == SlotKind::Group);
    }
    let Some(owner) = open_group_path(container, settings, parent, owner)? else {
        return Ok(false);
    };
    let name = normalize(name, settings);
    Ok(container.exists(owner.hid(), &name, kind)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_nested_groups() {
        let c = Container::in_memory();
        let s = Settings::default();
        let root = HandleGuard::wrap(&c, c.open_root()).unwrap();
        {
            let g = create_group_recursively(&c, &s, root.hid(), "/A/B/C").unwrap();
            assert_eq!(c.path_of(g.hid()).unwrap(), "/A/B/C");
        }
        assert!(item_exists(&c, &s, root.hid(), "A/B", SlotKind::Group).unwrap());
        assert!(item_exists(&c, &s, root.hid(), "/A/B/C", SlotKind::Group).unwrap());
        assert!(!item_exists(&c, &s, root.hid(), "A/X/C", SlotKind::Group).unwrap());
        drop(root);
        assert_eq!(c.open_handle_count(), 0);
    }

    #[test]
    fn recreating_is_idempotent() {
        let c = Container::in_memory();
        let s = Settings::default();
        let root = HandleGuard::wrap(&c, c.open_root()).unwrap();
        drop(create_group_recursively(&c, &s, root.hid(), "a/b").unwrap());
        drop(create_group_recursively(&c, &s, root.hid(), "a/b/c").unwrap());
        assert_eq!(c.children(root.hid()).unwrap().len(), 1);
    }

    #[test]
    fn empty_path_is_parent() {
        let c = Container::in_memory();
        let s = Settings::default();
        let root = HandleGuard::wrap(&c, c.open_root()).unwrap();
        let g = open_group_path(&c, &s, root.hid(), "/").unwrap().unwrap();
        assert_eq!(c.path_of(g.hid()).unwrap(), "/");
    }

    #[test]
    fn segments_follow_naming_policy() {
        let c = Container::in_memory();
        let s = Settings::default().lower_case_naming(true);
        let root = HandleGuard::wrap(&c, c.open_root()).unwrap();
        drop(create_group_recursively(&c, &s, root.hid(), "Top/Inner").unwrap());
        let plain = Settings::default();
        assert!(item_exists(&c, &plain, root.hid(), "top/inner", SlotKind::Group).unwrap());
        assert!(!item_exists(&c, &plain, root.hid(), "Top/Inner", SlotKind::Group).unwrap());
    }

    #[test]
    fn attribute_existence() {
        let c = Container::in_memory();
        let s = Settings::default();
        let root = HandleGuard::wrap(&c, c.open_root()).unwrap();
        let g = create_group_recursively(&c, &s, root.hid(), "meta").unwrap();
        let a = c
            .create_attribute(
                g.hid(),
                "unit",
                &h5store_format::Datatype::fixed(4, true),
                &h5store_format::Dataspace::scalar(),
            )
            .unwrap();
        c.close(a).unwrap();
        assert!(item_exists(&c, &s, root.hid(), "meta/unit", SlotKind::Attribute).unwrap());
        assert!(!item_exists(&c, &s, root.hid(), "meta/other", SlotKind::Attribute).unwrap());
    }
}
