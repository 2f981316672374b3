//! Slot name normalization and primary/fallback lookup.

use std::borrow::Cow;

use h5store_format::{Container, Hid, SlotKind};

use crate::error::Result;
use crate::settings::Settings;

/// Apply the case policy to a logical name.
pub fn normalize<'a>(name: &'a str, settings: &Settings) -> Cow<'a, str> {
    if settings.lower_case_naming && name.chars().any(char::is_uppercase) {
        Cow::Owned(name.to_lowercase())
    } else {
        Cow::Borrowed(name)
    }
}

/// Find the first of `primary`, then `fallback`, that exists under `parent`.
///
/// Both names are normalized first. Returns the normalized name that was
/// found, or `None` when neither exists.
pub fn resolve(
    container: &Container,
    parent: Hid,
    primary: &str,
    fallback: Option<&str>,
    kind: SlotKind,
    settings: &Settings,
) -> Result<Option<String>> {
    let primary = normalize(primary, settings);
    if container.exists(parent, &primary, kind)? {
        return Ok(Some(primary.into_owned()));
    }
    if let Some(fallback) = fallback.filter(|f| !f.is_empty()) {
        let fallback = normalize(fallback, settings);
        if container.exists(parent, &fallback, kind)? {
            return Ok(Some(fallback.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_identity_by_default() {
        let s = Settings::default();
        assert!(matches!(normalize("IntReadWrite", &s), Cow::Borrowed("IntReadWrite")));
    }

    #[test]
    fn normalize_lower_cases_when_enabled() {
        let s = Settings::default().lower_case_naming(true);
        assert_eq!(normalize("IntReadWrite", &s), "intreadwrite");
        assert!(matches!(normalize("already", &s), Cow::Borrowed(_)));
    }

    #[test]
    fn resolve_prefers_primary() {
        let c = Container::in_memory();
        let root = c.open_root().unwrap();
        c.create_group(root, "new_name").unwrap();
        c.create_group(root, "old_name").unwrap();
        let s = Settings::default();
        let found = resolve(&c, root, "new_name", Some("old_name"), SlotKind::Group, &s).unwrap();
        assert_eq!(found.as_deref(), Some("new_name"));
    }

    #[test]
    fn resolve_falls_back() {
        let c = Container::in_memory();
        let root = c.open_root().unwrap();
        c.create_group(root, "old_name").unwrap();
        let s = Settings::default();
        let found = resolve(&c, root, "new_name", Some("old_name"), SlotKind::Group, &s).unwrap();
        assert_eq!(found.as_deref(), Some("old_name"));
        let none = resolve(&c, root, "new_name", None, SlotKind::Group, &s).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn resolve_normalizes_both_names() {
        let c = Container::in_memory();
        let root = c.open_root().unwrap();
        c.create_group(root, "legacy").unwrap();
        let s = Settings::default().lower_case_naming(true);
        let found = resolve(&c, root, "Current", Some("LEGACY"), SlotKind::Group, &s).unwrap();
        assert_eq!(found.as_deref(), Some("legacy"));
    }
}
